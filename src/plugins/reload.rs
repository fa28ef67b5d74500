//! Reload command plugin.
//!
//! `reload` rebuilds the whole registry; `reload <unit>` re-reads one unit.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{Handler, HandlerContext, Invocable, UnitId};

pub struct Reload;

pub fn build(_options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Reload))
}

impl Handler for Reload {
    fn invocable(&self) -> Option<&dyn Invocable> {
        Some(self)
    }
}

#[async_trait]
impl Invocable for Reload {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let registry = Arc::clone(&ctx.state.registry);

        let text = match args.first() {
            Some(unit) => {
                let unit = if unit.ends_with(".toml") {
                    UnitId::new(unit.as_str())
                } else {
                    UnitId::new(format!("{unit}.toml"))
                };
                match tokio::task::spawn_blocking(move || registry.reload_one(&unit)).await? {
                    Ok(descriptor) => ctx.state.format(
                        "reload.unit_done",
                        &[("name", &descriptor.name), ("unit", descriptor.unit.as_str())],
                    ),
                    Err(e) => ctx.state.format("reload.failed", &[("error", &e.to_string())]),
                }
            }
            None => match tokio::task::spawn_blocking(move || registry.load()).await? {
                Ok(report) => {
                    let mut text =
                        ctx.state.format("reload.done", &[("loaded", &report.loaded.to_string())]);
                    if !report.failures.is_empty() {
                        text.push('\n');
                        text.push_str(&ctx.state.format(
                            "reload.skipped",
                            &[("count", &report.failures.len().to_string())],
                        ));
                        for failure in &report.failures {
                            text.push_str(&format!("\n- {failure}"));
                        }
                    }
                    text
                }
                Err(e) => ctx.state.format("reload.failed", &[("error", &e.to_string())]),
            },
        };

        ctx.reply(&text).await?;
        Ok(())
    }
}
