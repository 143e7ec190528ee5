//! `watch`: stream entity changes and act as the session's health trigger.
//!
//! A periodic tick calls `check_and_reconnect`, the same hook a foregrounded
//! app would call; drops reported by the session are picked up immediately.

use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use halink_core::{ConnectionState, Controller, EntityChange};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ChangeLine<'a> {
    entity_id: &'a str,
    from: Option<&'a str>,
    to: &'a str,
    at: String,
}

fn print_change(change: &EntityChange, global: &GlobalOpts, color: bool) {
    let entity = &change.entity;
    let previous = change.previous.as_deref();
    let line = match global.output {
        OutputFormat::Table | OutputFormat::Plain => format!(
            "{} {} {} -> {}",
            Local::now().format("%H:%M:%S"),
            entity.entity_id,
            previous.unwrap_or("?"),
            output::paint_state(&entity.state, color),
        ),
        _ => {
            let change = ChangeLine {
                entity_id: &entity.entity_id,
                from: previous,
                to: &entity.state,
                at: Local::now().to_rfc3339(),
            };
            match serde_json::to_string(&change) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot encode change");
                    return;
                }
            }
        }
    };
    output::print_output(&line, global.quiet);
}

fn spawn_health_check(controller: &Controller) {
    let controller = controller.clone();
    tokio::spawn(async move { controller.check_and_reconnect().await });
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    if !args.entities.is_empty() {
        controller.update_subscription(&args.entities).await?;
    }

    let mut changes = controller.entity_changes(&args.entities);
    let mut state = controller.connection_state();

    if !global.quiet {
        eprintln!(
            "Watching {} entities ({}), Ctrl-C to stop",
            if args.entities.is_empty() {
                changes.known()
            } else {
                args.entities.len()
            },
            output::paint_connection(controller.state(), color)
        );
    }

    let mut tick = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                controller.cancel_reconnect();
                break;
            }

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if !global.quiet {
                    eprintln!("connection: {}", output::paint_connection(current, color));
                }
                match current {
                    ConnectionState::AuthFailed => {
                        return Err(CliError::AuthFailed {
                            message: "token rejected while reconnecting".into(),
                        });
                    }
                    ConnectionState::ReconnectFailed => {
                        return Err(CliError::ConnectionFailed {
                            reason: format!(
                                "gave up after {} reconnect attempts",
                                controller.config().reconnect.max_attempts
                            ),
                        });
                    }
                    ConnectionState::Disconnected => spawn_health_check(controller),
                    _ => {}
                }
            }

            change = changes.next_change() => {
                let Some(change) = change else { break };
                print_change(&change, global, color);
            }

            _ = tick.tick() => spawn_health_check(controller),
        }
    }

    Ok(())
}
