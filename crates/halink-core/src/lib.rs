//! Connection lifecycle and reactive state mirror between `halink-api` and
//! the CLI.
//!
//! - **[`Controller`]** — Owns the one live [`Session`](halink_api::Session):
//!   [`init_connection()`](Controller::init_connection) for a first connect,
//!   a serialized backoff loop in [`reconnect()`](Controller::reconnect),
//!   ping-based zombie detection in
//!   [`verify_connection()`](Controller::verify_connection), and
//!   [`check_and_reconnect()`](Controller::check_and_reconnect) for
//!   resume/network-change recovery.
//!
//! - **[`SyncEngine`]** — Cold start vs. hot reconnect population of the
//!   mirror, push event merging, and the dashboard/scheduler subscriptions.
//!
//! - **[`DataStore`]** — Lock-free reactive storage built on
//!   `EntityCollection<T>` (`DashMap` + `tokio::sync::watch` channels) with
//!   floor/area selection.
//!
//! - **[`ConnectionState`]** — Observable state machine; stale transitions
//!   are rejected rather than applied.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod model;
pub mod state;
pub mod store;
pub mod stream;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConnectionConfig, Credentials, ReconnectPolicy, TlsVerification};
pub use controller::Controller;
pub use credentials::{CredentialError, CredentialStore, MemoryCredentialStore};
pub use error::CoreError;
pub use model::{Area, Entity, Floor, Schedule};
pub use state::{ConnectionState, Transition};
pub use store::DataStore;
pub use stream::{EntityChange, EntityChanges};
pub use sync::{LoadKind, SyncEngine};
