//! Help command plugin.
//!
//! Lists commands grouped by category, or details for one command.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{Handler, HandlerContext, HandlerDescriptor, Invocable};
use crate::permissions::{AuthorizationLevel, RoutingClass};

pub struct Help;

pub fn build(_options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Help))
}

impl Handler for Help {
    fn invocable(&self) -> Option<&dyn Invocable> {
        Some(self)
    }
}

#[async_trait]
impl Invocable for Help {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let text = match args.first() {
            Some(command) => match ctx.state.registry.resolve(command) {
                Some(descriptor) => detail(ctx, &descriptor),
                None => ctx.state.format("help.unknown", &[("command", command)]),
            },
            None => overview(ctx),
        };
        ctx.reply(&text).await?;
        Ok(())
    }
}

fn overview(ctx: &HandlerContext) -> String {
    let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for descriptor in ctx.state.registry.list() {
        if descriptor.handler.invocable().is_some() {
            categories
                .entry(descriptor.category.clone())
                .or_default()
                .push(descriptor.name.clone());
        }
    }

    let mut text = ctx.text("help.header");
    for (category, names) in categories {
        text.push_str(&format!("\n\n[{}]\n- {}", category, names.join(", ")));
    }
    text.push_str("\n\n");
    text.push_str(&ctx.state.format("help.footer", &[("prefix", &ctx.prefix)]));
    text
}

fn detail(ctx: &HandlerContext, descriptor: &HandlerDescriptor) -> String {
    let usage = descriptor.usage_for(&ctx.prefix);
    let mut lines = vec![ctx.state.format(
        "help.detail",
        &[
            ("name", &descriptor.name),
            ("description", &descriptor.description),
            ("usage", &usage),
        ],
    )];

    if !descriptor.aliases.is_empty() {
        lines.push(ctx.state.format("help.aliases", &[("aliases", &descriptor.aliases.join(", "))]));
    }
    let role = descriptor.required_role(RoutingClass::Run);
    if role > AuthorizationLevel::Everyone {
        lines.push(ctx.state.format("help.role", &[("role", role.as_str())]));
    }
    if !descriptor.cooldown.is_zero() {
        let seconds = descriptor.cooldown.as_secs().to_string();
        lines.push(ctx.state.format("help.cooldown", &[("seconds", &seconds)]));
    }
    lines.join("\n")
}
