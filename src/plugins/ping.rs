//! Ping command plugin.
//!
//! Measures how long sending a message takes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::engine::{Handler, HandlerContext, Invocable};

pub struct Ping;

pub fn build(_options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Ping))
}

impl Handler for Ping {
    fn invocable(&self) -> Option<&dyn Invocable> {
        Some(self)
    }
}

#[async_trait]
impl Invocable for Ping {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        let start = Instant::now();
        ctx.reply(&ctx.text("ping.pong")).await?;
        let ms = start.elapsed().as_millis();

        // Choose emoji based on latency
        let emoji = if ms < 100 {
            "🟢"
        } else if ms < 300 {
            "🟡"
        } else {
            "🔴"
        };

        let latency = ctx.state.format("ping.latency", &[("ms", &ms.to_string())]);
        ctx.send(&format!("{emoji} {latency}")).await?;
        Ok(())
    }
}
