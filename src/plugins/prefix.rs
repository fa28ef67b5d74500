//! Prefix command plugin.
//!
//! `prefix` shows the thread's prefix, `prefix reset` restores the default,
//! and `prefix <value>` asks for confirmation first: the requester either
//! replies "yes" or reacts to the confirmation message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::engine::{
    ContinuationKind, ContinuationToken, Handler, HandlerContext, Invocable, PrefixError,
    PrefixResolver, Reactable, Repliable,
};

const CONFIRM_WORDS: &[&str] = &["yes", "y", "ok", "confirm"];

pub struct Prefix;

pub fn build(_options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Prefix))
}

impl Handler for Prefix {
    fn invocable(&self) -> Option<&dyn Invocable> {
        Some(self)
    }

    fn repliable(&self) -> Option<&dyn Repliable> {
        Some(self)
    }

    fn reactable(&self) -> Option<&dyn Reactable> {
        Some(self)
    }
}

#[async_trait]
impl Invocable for Prefix {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let prefixes = &ctx.state.prefixes;

        let Some(value) = args.first() else {
            let text = ctx.state.format(
                "prefix.current",
                &[("prefix", &ctx.prefix), ("default", prefixes.default_prefix())],
            );
            ctx.reply(&text).await?;
            return Ok(());
        };

        if value.eq_ignore_ascii_case("reset") {
            let text = match prefixes.reset(ctx.thread()).await {
                Ok(()) => ctx.state.format("prefix.reset", &[("prefix", prefixes.default_prefix())]),
                Err(e) => failure_text(ctx, &e),
            };
            ctx.reply(&text).await?;
            return Ok(());
        }

        if let Err(e) = PrefixResolver::validate(value) {
            ctx.reply(&failure_text(ctx, &e)).await?;
            return Ok(());
        }

        let confirm = ctx.state.format("prefix.confirm", &[("prefix", value)]);
        let anchor = ctx.reply(&confirm).await?;
        let token = ctx.continuation(anchor).with_payload(json!({ "prefix": value }));
        ctx.expect_reply(token.clone());
        ctx.expect_reaction(token);
        Ok(())
    }
}

#[async_trait]
impl Repliable for Prefix {
    async fn on_reply(&self, ctx: &HandlerContext, token: &ContinuationToken) -> anyhow::Result<()> {
        ctx.state
            .continuations
            .cancel(ContinuationKind::Reaction, token.thread, token.anchor);

        let answer = ctx.event.text().unwrap_or_default().trim().to_lowercase();
        if CONFIRM_WORDS.contains(&answer.as_str()) {
            apply(ctx, token).await
        } else {
            ctx.reply(&ctx.text("prefix.cancelled")).await?;
            Ok(())
        }
    }
}

#[async_trait]
impl Reactable for Prefix {
    async fn on_reaction(&self, ctx: &HandlerContext, token: &ContinuationToken) -> anyhow::Result<()> {
        ctx.state
            .continuations
            .cancel(ContinuationKind::Reply, token.thread, token.anchor);
        apply(ctx, token).await
    }
}

async fn apply(ctx: &HandlerContext, token: &ContinuationToken) -> anyhow::Result<()> {
    let value = token.payload["prefix"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("confirmation token carries no prefix"))?;

    let text = match ctx.state.prefixes.set(ctx.thread(), value).await {
        Ok(()) => ctx.state.format("prefix.changed", &[("prefix", value)]),
        Err(e) => failure_text(ctx, &e),
    };
    ctx.reply(&text).await?;
    Ok(())
}

fn failure_text(ctx: &HandlerContext, error: &PrefixError) -> String {
    match error {
        PrefixError::Store(e) => {
            warn!("Prefix store failed for thread {}: {:#}", ctx.thread(), e);
            ctx.text("prefix.store_failed")
        }
        invalid => ctx.state.format("prefix.invalid", &[("reason", &invalid.to_string())]),
    }
}
