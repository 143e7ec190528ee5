//! Clap derive structures for the `halink` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// halink -- keep a live session with a Home Assistant instance
#[derive(Debug, Parser)]
#[command(
    name = "halink",
    version,
    about = "Control and watch Home Assistant from the command line",
    long_about = "A CLI over the Home Assistant websocket API.\n\n\
        Authenticates with a long-lived access token, mirrors entity state,\n\
        floors, areas and schedules, and keeps the session alive across drops.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Instance profile to use
    #[arg(long, short = 'p', env = "HALINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Instance URL (overrides profile)
    #[arg(long, short = 'u', env = "HALINK_URL", global = true)]
    pub url: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HALINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HALINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HALINK_INSECURE", global = true)]
    pub insecure: bool,

    /// HTTP request timeout in seconds (overrides profile)
    #[arg(long, env = "HALINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Power {
    On,
    Off,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate against an instance and store the token
    Login(LoginArgs),

    /// Inspect mirrored entity states
    #[command(alias = "st")]
    States(StatesArgs),

    /// List floors
    Floors,

    /// List areas
    Areas(AreasArgs),

    /// Stream state changes and keep the session healthy
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Probe the session with a ping
    Ping,

    /// Turn an entity on or off
    Toggle(ToggleArgs),

    /// Set the value of an input_number entity
    SetNumber(SetNumberArgs),

    /// Call an arbitrary service
    Call(CallArgs),

    /// Manage scheduler component entries
    #[command(alias = "sched")]
    Schedules(SchedulesArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Save the token in the config file instead of the system keyring
    #[arg(long)]
    pub no_keyring: bool,
}

// ── States ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatesArgs {
    #[command(subcommand)]
    pub command: StatesCommand,
}

#[derive(Debug, Subcommand)]
pub enum StatesCommand {
    /// List entities
    #[command(alias = "ls")]
    List {
        /// Only entities of this domain (light, switch, ...)
        #[arg(long, short = 'd')]
        domain: Option<String>,

        /// Only entities in this area
        #[arg(long, short = 'a')]
        area: Option<String>,
    },

    /// Show one entity
    Get {
        /// Entity id (e.g. light.kitchen)
        entity_id: String,
    },
}

// ── Topology ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AreasArgs {
    /// Only areas on this floor
    #[arg(long, short = 'f')]
    pub floor: Option<String>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Health check interval in seconds
    #[arg(long, short = 'i', default_value = "30")]
    pub interval: u64,

    /// Narrow the push subscription to these entities
    #[arg(long = "entity", short = 'e')]
    pub entities: Vec<String>,
}

// ── Services ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ToggleArgs {
    /// Entity id (e.g. switch.porch)
    pub entity_id: String,

    /// Desired state
    pub state: Power,

    /// Service domain (defaults to the entity id prefix)
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct SetNumberArgs {
    /// input_number entity id
    pub entity_id: String,

    /// New value
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service as domain.service (e.g. light.turn_on)
    pub service: String,

    /// Service data as a JSON object
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Target entity ids
    #[arg(long = "entity", short = 'e')]
    pub entities: Vec<String>,
}

// ── Schedules ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SchedulesArgs {
    #[command(subcommand)]
    pub command: SchedulesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SchedulesCommand {
    /// List schedules
    #[command(alias = "ls")]
    List,

    /// Create a schedule from a JSON file
    Add {
        #[arg(long, short = 'F')]
        from_file: PathBuf,
    },

    /// Replace a schedule from a JSON file
    Edit {
        /// Schedule id
        id: String,

        #[arg(long, short = 'F')]
        from_file: PathBuf,
    },

    /// Delete a schedule
    #[command(alias = "rm")]
    Delete {
        /// Schedule id
        id: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Show the effective configuration (tokens redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store a token for the active profile in the system keyring
    SetToken,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
