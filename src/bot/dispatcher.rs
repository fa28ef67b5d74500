//! Update schema.
//!
//! Converts Telegram updates into [`InboundEvent`]s and hands them to the
//! engine. Each event is dispatched on its own task so a slow handler never
//! stalls the update stream.

use teloxide::adaptors::Throttle;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{ChatMember, ChatMemberUpdated, MessageReactionUpdated, ReactionType};
use tracing::debug;

use crate::engine::{
    Dispatcher as Engine, InboundEvent, MembershipChange, MessageId, ThreadId, UserId,
};

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Build the teloxide dispatcher around the engine.
pub fn build_dispatcher(
    bot: ThrottledBot,
    engine: Engine,
) -> Dispatcher<ThrottledBot, anyhow::Error, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
}

fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_message_reaction_updated().endpoint(on_reaction))
        .branch(Update::filter_chat_member().endpoint(on_member))
}

async fn on_message(msg: Message, engine: Engine) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }
    let Some(body) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    let mut event = InboundEvent::message(
        UserId(user.id.0),
        ThreadId(msg.chat.id.0),
        MessageId(msg.id.0),
        body,
    )
    .with_sender_name(user.full_name());
    if let Some(parent) = msg.reply_to_message() {
        event = event.replying_to(MessageId(parent.id.0));
    }

    engine.spawn(event);
    Ok(())
}

async fn on_reaction(update: MessageReactionUpdated, engine: Engine) -> anyhow::Result<()> {
    // Anonymous admins react as the chat and cannot be authorized.
    let Some(user) = update.user.as_ref() else {
        return Ok(());
    };
    let Some(emoji) = added_emoji(&update.old_reaction, &update.new_reaction) else {
        debug!("Reaction update on {} removed reactions only", update.message_id.0);
        return Ok(());
    };

    engine.spawn(InboundEvent::reaction(
        UserId(user.id.0),
        ThreadId(update.chat.id.0),
        MessageId(update.message_id.0),
        emoji,
    ));
    Ok(())
}

async fn on_member(update: ChatMemberUpdated, engine: Engine) -> anyhow::Result<()> {
    let Some(change) = membership_change(&update.old_chat_member, &update.new_chat_member) else {
        return Ok(());
    };

    let member = &update.new_chat_member.user;
    engine.spawn(
        InboundEvent::membership(UserId(member.id.0), ThreadId(update.chat.id.0), change)
            .with_sender_name(member.full_name()),
    );
    Ok(())
}

/// First plain emoji present in `new` but not in `old`.
fn added_emoji(old: &[ReactionType], new: &[ReactionType]) -> Option<String> {
    new.iter()
        .filter(|reaction| !old.contains(reaction))
        .find_map(|reaction| match reaction {
            ReactionType::Emoji { emoji } => Some(emoji.clone()),
            _ => None,
        })
}

fn membership_change(old: &ChatMember, new: &ChatMember) -> Option<MembershipChange> {
    match (old.is_present(), new.is_present()) {
        (false, true) => Some(MembershipChange::Joined),
        (true, false) => Some(MembershipChange::Left),
        _ if old.is_privileged() != new.is_privileged() => Some(MembershipChange::AdminsChanged),
        _ => None,
    }
}
