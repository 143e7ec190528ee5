//! Floor and area command handlers.

use tabled::Tabled;

use halink_core::{Area, Controller, Floor};

use crate::cli::{AreasArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct FloorRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Level")]
    level: i64,
}

impl From<&Floor> for FloorRow {
    fn from(f: &Floor) -> Self {
        Self {
            id: f.floor_id.clone(),
            name: f.name.clone(),
            level: f.level,
        }
    }
}

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Floor")]
    floor: String,
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn handle_floors(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let floors = controller.floors_snapshot();
    let out = output::render_list(
        &global.output,
        floors.as_slice(),
        |f| FloorRow::from(f),
        |f| f.floor_id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Areas, optionally narrowed to one floor. Selecting a floor also picks
/// its default area, marked with `*`.
pub fn handle_areas(
    controller: &Controller,
    args: &AreasArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let areas: Vec<Area> = match args.floor {
        Some(ref floor_id) => {
            if !controller
                .floors_snapshot()
                .iter()
                .any(|f| &f.floor_id == floor_id)
            {
                return Err(CliError::NotFound {
                    resource_type: "floor".into(),
                    identifier: floor_id.clone(),
                    list_command: "floors".into(),
                });
            }
            controller.select_floor(floor_id);
            controller.store().areas_on_floor(floor_id)
        }
        None => controller.areas_snapshot().to_vec(),
    };

    let active = controller.store().active_area();
    let out = output::render_list(
        &global.output,
        &areas,
        |a| AreaRow {
            active: if active.as_deref() == Some(a.area_id.as_str()) {
                "*"
            } else {
                ""
            },
            id: a.area_id.clone(),
            name: a.name.clone(),
            floor: a.floor_id.clone().unwrap_or_default(),
        },
        |a| a.area_id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
