//! Greets members who join a thread and notes those who leave.
//!
//! Texts default to the locale's `welcome.join` / `welcome.leave`; a
//! manifest may override either, and an empty string turns it off.
//! `{name}` and `{prefix}` are filled in.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::{
    Handler, HandlerContext, MembershipChange, MembershipListener, parse_options,
};
use crate::i18n;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WelcomeOptions {
    #[serde(default)]
    join: Option<String>,
    #[serde(default)]
    leave: Option<String>,
}

pub struct Welcome {
    options: WelcomeOptions,
}

pub fn build(options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Welcome {
        options: parse_options(options)?,
    }))
}

impl Welcome {
    fn template(&self, ctx: &HandlerContext, change: MembershipChange) -> Option<String> {
        let (custom, key) = match change {
            MembershipChange::Joined => (&self.options.join, "welcome.join"),
            MembershipChange::Left => (&self.options.leave, "welcome.leave"),
            MembershipChange::AdminsChanged => return None,
        };
        let template = custom.clone().unwrap_or_else(|| ctx.text(key));
        (!template.trim().is_empty()).then_some(template)
    }
}

impl Handler for Welcome {
    fn membership(&self) -> Option<&dyn MembershipListener> {
        Some(self)
    }
}

#[async_trait]
impl MembershipListener for Welcome {
    async fn on_membership(&self, ctx: &HandlerContext, change: MembershipChange) -> anyhow::Result<()> {
        let Some(template) = self.template(ctx, change) else {
            return Ok(());
        };

        let fallback = ctx.text("welcome.someone");
        let name = ctx.event.sender_name.as_deref().unwrap_or(&fallback);
        let text = i18n::fill(&template, &[("name", name), ("prefix", ctx.prefix.as_str())]);
        ctx.send(&text).await?;
        Ok(())
    }
}
