//! Stats command plugin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::{Handler, HandlerContext, Invocable, parse_options};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatsOptions {
    #[serde(default = "default_top")]
    top: usize,
}

fn default_top() -> usize {
    5
}

pub struct Stats {
    top: usize,
}

pub fn build(options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    let options: StatsOptions = parse_options(options)?;
    Ok(Arc::new(Stats { top: options.top }))
}

impl Handler for Stats {
    fn invocable(&self) -> Option<&dyn Invocable> {
        Some(self)
    }
}

#[async_trait]
impl Invocable for Stats {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        let state = &ctx.state;
        let stats = state.stats.snapshot(self.top);
        let throttle = state.throttle.snapshot();

        let mut lines = vec![
            state.text("stats.header"),
            state.format("stats.uptime", &[("uptime", &format_uptime(stats.uptime))]),
            state.format("stats.handlers", &[("count", &state.registry.len().to_string())]),
            state.format(
                "stats.events",
                &[
                    ("admitted", &stats.admitted.to_string()),
                    ("dropped", &stats.dropped.to_string()),
                ],
            ),
            state.format(
                "stats.today",
                &[
                    ("count", &throttle.daily_count.to_string()),
                    ("max", &throttle.max_daily_messages.to_string()),
                ],
            ),
            state.format(
                "stats.commands",
                &[
                    ("commands", &stats.commands.to_string()),
                    ("denied", &stats.denied.to_string()),
                    ("failures", &stats.failures.to_string()),
                ],
            ),
        ];

        if let Some(until) = throttle.break_until {
            lines.push(state.format("stats.on_break", &[("until", &until.format("%H:%M").to_string())]));
        }

        if !stats.top_commands.is_empty() {
            lines.push(state.text("stats.top"));
            lines.extend(
                stats
                    .top_commands
                    .iter()
                    .enumerate()
                    .map(|(i, (name, count))| format!("{}. {} ({})", i + 1, name, count)),
            );
        }

        ctx.reply(&lines.join("\n")).await?;
        Ok(())
    }
}

/// `1d 2h 3m 4s`, leading zero units omitted.
fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if days > 0 || hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds}s"));
    out
}
