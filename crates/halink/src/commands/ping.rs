//! Liveness probe handler.

use std::fmt::Write;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use halink_core::Controller;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct PingReport {
    alive: bool,
    latency_ms: u64,
    state: String,
    session: Option<String>,
    entities: usize,
    last_refresh: Option<DateTime<Utc>>,
}

pub async fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let session = controller.session_id();
    let started = Instant::now();
    let alive = controller.verify_connection().await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if !alive {
        return Err(CliError::ConnectionFailed {
            reason: format!(
                "no pong within {}ms",
                controller.config().ping_timeout.as_millis()
            ),
        });
    }

    let report = PingReport {
        alive,
        latency_ms,
        state: controller.state().to_string(),
        session: session.map(|id| id.to_string()),
        entities: controller.store().entity_count(),
        last_refresh: controller.store().last_full_refresh(),
    };
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "{} in {}ms",
                output::paint_connection(controller.state(), color),
                r.latency_ms
            );
            if let Some(ref session) = r.session {
                let _ = writeln!(out, "Session:      {session}");
            }
            let _ = writeln!(out, "Entities:     {}", r.entities);
            let _ = write!(
                out,
                "Last refresh: {}",
                util::format_timestamp(r.last_refresh)
            );
            out
        },
        |r| r.latency_ms.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
