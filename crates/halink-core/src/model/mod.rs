// ── Domain model ──
//
// Canonical representation of the mirrored Home Assistant topology and
// entity state, as consumed by the CLI. Built from the raw wire models in
// `halink_api::models`.

pub mod entity;
pub mod schedule;
pub mod topology;

pub use entity::Entity;
pub use schedule::Schedule;
pub use topology::{Area, Floor};
