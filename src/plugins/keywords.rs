//! Keyword auto-responder.
//!
//! A passive handler that answers plain chat matching one of its rules.
//! Rules come from the manifest:
//!
//! ```toml
//! [[options.keywords]]
//! triggers = ["hi", "hello"]
//! response = "Hello! Try {prefix}help."
//! ```

use std::sync::Arc;

use anyhow::ensure;
use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::{Handler, HandlerContext, Passive, parse_options};
use crate::i18n;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeywordOptions {
    #[serde(default)]
    keywords: Vec<KeywordRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeywordRule {
    triggers: Vec<String>,
    response: String,
}

pub struct Keywords {
    rules: Vec<KeywordRule>,
}

pub fn build(options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    let options: KeywordOptions = parse_options(options)?;

    let mut rules = Vec::with_capacity(options.keywords.len());
    for (i, mut rule) in options.keywords.into_iter().enumerate() {
        rule.triggers = rule
            .triggers
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        ensure!(!rule.triggers.is_empty(), "keyword rule {} has no triggers", i + 1);
        rules.push(rule);
    }

    Ok(Arc::new(Keywords { rules }))
}

impl Keywords {
    fn matching(&self, text: &str) -> Option<&KeywordRule> {
        let text = text.trim().to_lowercase();
        self.rules.iter().find(|rule| {
            rule.triggers.iter().any(|trigger| {
                text == *trigger
                    || text
                        .strip_prefix(trigger.as_str())
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
            })
        })
    }
}

impl Handler for Keywords {
    fn passive(&self) -> Option<&dyn Passive> {
        Some(self)
    }
}

#[async_trait]
impl Passive for Keywords {
    async fn on_chat(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        let Some(text) = ctx.event.text() else {
            return Ok(());
        };
        // Commands are not chat.
        if text.starts_with(&ctx.prefix) {
            return Ok(());
        }

        if let Some(rule) = self.matching(text) {
            ctx.reply(&i18n::fill(&rule.response, &[("prefix", ctx.prefix.as_str())])).await?;
        }
        Ok(())
    }
}
