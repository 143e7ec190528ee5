//! Scheduler component command handlers.

use serde_json::Value;
use tabled::Tabled;

use halink_core::{Controller, Schedule};

use crate::cli::{GlobalOpts, SchedulesArgs, SchedulesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ScheduleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Days")]
    weekdays: String,
    #[tabled(rename = "Slots")]
    timeslots: String,
}

impl From<&Schedule> for ScheduleRow {
    fn from(s: &Schedule) -> Self {
        let weekdays = s
            .extra
            .get("weekdays")
            .and_then(Value::as_array)
            .map(|days| {
                days.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let timeslots = s
            .extra
            .get("timeslots")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        Self {
            id: s.schedule_id.clone(),
            name: s.display_name().to_owned(),
            enabled: if s.enabled { "yes" } else { "no" }.into(),
            weekdays,
            timeslots: timeslots.to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: SchedulesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SchedulesCommand::List => {
            controller.load_schedules().await?;
            let schedules = controller.schedules_snapshot();
            let out = output::render_list(
                &global.output,
                schedules.as_slice(),
                |s| ScheduleRow::from(s),
                |s| s.schedule_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SchedulesCommand::Add { from_file } => {
            let body = util::read_json_file(&from_file)?;
            let created = controller.add_schedule(&body).await?;
            finish(controller, &created, "Schedule created", global).await
        }

        SchedulesCommand::Edit { id, from_file } => {
            let body = util::read_json_file(&from_file)?;
            let updated = controller.edit_schedule(&id, &body).await?;
            finish(controller, &updated, &format!("Schedule {id} updated"), global).await
        }

        SchedulesCommand::Delete { id } => {
            let removed = controller.delete_schedule(&id).await?;
            finish(controller, &removed, &format!("Schedule {id} deleted"), global).await
        }
    }
}

/// Refresh the mirror after a mutation and report the component's reply.
async fn finish(
    controller: &Controller,
    reply: &Value,
    message: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Err(e) = controller.load_schedules().await {
        tracing::warn!(error = %e, "schedule refresh after mutation failed");
    }
    util::report_reply(reply, message, global)
}
