// halink-api: Async Rust client for the Home Assistant websocket API

pub mod commands;
pub mod error;
pub mod event;
pub mod mock;
pub mod models;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use commands::Subscription;
pub use error::Error;
pub use event::{SessionEvent, StateChange};
pub use scheduler::SchedulerClient;
pub use session::Session;
pub use transport::{TlsMode, TransportConfig};
