//! Entity state command handlers.

use std::fmt::Write;
use std::sync::Arc;

use tabled::Tabled;

use halink_core::{Controller, Entity};

use crate::cli::{GlobalOpts, StatesArgs, StatesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl EntityRow {
    fn new(entity: &Entity, color: bool) -> Self {
        let state = match entity.unit_of_measurement() {
            Some(unit) => format!("{} {unit}", entity.state),
            None => entity.state.clone(),
        };
        Self {
            entity_id: entity.entity_id.clone(),
            name: entity.name.clone(),
            state: output::paint_state(&state, color),
            area: entity.area_id.clone().unwrap_or_default(),
            updated: util::format_timestamp(entity.last_updated),
        }
    }
}

fn detail(entity: &Entity, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entity:   {}", entity.entity_id);
    let _ = writeln!(out, "Name:     {}", entity.name);
    let _ = writeln!(
        out,
        "State:    {}",
        output::paint_state(&entity.state, color)
    );
    if let Some(ref area) = entity.area_id {
        let _ = writeln!(out, "Area:     {area}");
    }
    if !entity.labels.is_empty() {
        let _ = writeln!(out, "Labels:   {}", entity.labels.join(", "));
    }
    let _ = writeln!(
        out,
        "Changed:  {}",
        util::format_timestamp(entity.last_changed)
    );
    let _ = writeln!(
        out,
        "Updated:  {}",
        util::format_timestamp(entity.last_updated)
    );
    if !entity.attributes.is_empty() {
        let _ = writeln!(out, "Attributes:");
        for (key, value) in &entity.attributes {
            let _ = writeln!(out, "  {key}: {value}");
        }
    }
    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    controller: &Controller,
    args: StatesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        StatesCommand::List { domain, area } => {
            let entities: Vec<Arc<Entity>> = match area {
                Some(ref area_id) => {
                    if !controller
                        .areas_snapshot()
                        .iter()
                        .any(|a| &a.area_id == area_id)
                    {
                        return Err(CliError::NotFound {
                            resource_type: "area".into(),
                            identifier: area_id.clone(),
                            list_command: "areas".into(),
                        });
                    }
                    controller.store().entities_in_area(area_id)
                }
                None => controller.entities_snapshot().iter().cloned().collect(),
            };
            let mut entities: Vec<Arc<Entity>> = entities
                .into_iter()
                .filter(|e| domain.as_deref().is_none_or(|d| e.domain() == d))
                .collect();
            entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

            let out = output::render_list(
                &global.output,
                &entities,
                |e| EntityRow::new(e, color),
                |e| e.entity_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StatesCommand::Get { entity_id } => {
            let entity = controller
                .entity(&entity_id)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "entity".into(),
                    identifier: entity_id.clone(),
                    list_command: "states list".into(),
                })?;
            let out = output::render_single(
                &global.output,
                entity.as_ref(),
                |e| detail(e, color),
                |e| e.state.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
