//! Service call handlers: toggle, set-number, raw call.

use serde_json::{Value, json};

use halink_core::{Controller, CoreError};

use crate::cli::{CallArgs, GlobalOpts, Power, SetNumberArgs, ToggleArgs};
use crate::error::CliError;

use super::util;

pub async fn toggle(
    controller: &Controller,
    args: &ToggleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let on = args.state == Power::On;
    let result = controller
        .toggle_entity(&args.entity_id, on, args.domain.as_deref())
        .await?;
    util::report_reply(
        &result,
        &format!(
            "{} turned {}",
            args.entity_id,
            if on { "on" } else { "off" }
        ),
        global,
    )
}

pub async fn set_number(
    controller: &Controller,
    args: &SetNumberArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = controller
        .set_number(&args.entity_id, &args.value)
        .await
        .map_err(|e| match e {
            CoreError::Validation { message } => CliError::Validation {
                field: "value".into(),
                reason: message,
            },
            other => other.into(),
        })?;
    util::report_reply(
        &result,
        &format!("{} set to {}", args.entity_id, args.value.trim()),
        global,
    )
}

pub async fn call(
    controller: &Controller,
    args: &CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (domain, service) = util::parse_service(&args.service)?;

    let data = match args.data {
        Some(ref raw) => {
            let value: Value = serde_json::from_str(raw).map_err(|e| CliError::Validation {
                field: "data".into(),
                reason: format!("invalid JSON: {e}"),
            })?;
            if !value.is_object() {
                return Err(CliError::Validation {
                    field: "data".into(),
                    reason: "service data must be a JSON object".into(),
                });
            }
            Some(value)
        }
        None => None,
    };
    let target = (!args.entities.is_empty()).then(|| json!({ "entity_id": args.entities }));

    let result = controller
        .call_service(domain, service, data, target)
        .await?;
    util::report_reply(&result, &format!("{domain}.{service} called"), global)
}
