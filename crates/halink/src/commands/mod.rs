//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod login;
pub mod ping;
pub mod schedules;
pub mod services;
pub mod states;
pub mod topology;
pub mod util;
pub mod watch;

use halink_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::States(args) => states::handle(controller, args, global),
        Command::Floors => topology::handle_floors(controller, global),
        Command::Areas(args) => topology::handle_areas(controller, &args, global),
        Command::Watch(args) => watch::handle(controller, args, global).await,
        Command::Ping => ping::handle(controller, global).await,
        Command::Toggle(args) => services::toggle(controller, &args, global).await,
        Command::SetNumber(args) => services::set_number(controller, &args, global).await,
        Command::Call(args) => services::call(controller, &args, global).await,
        Command::Schedules(args) => schedules::handle(controller, args, global).await,
        // Config, Completions and Login are handled before dispatch
        Command::Config(_) | Command::Completions(_) | Command::Login(_) => unreachable!(),
    }
}
