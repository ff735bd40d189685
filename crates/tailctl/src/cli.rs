//! Clap derive structures for the `tailctl` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tailctl -- tailnet control-plane operations from the command line
#[derive(Debug, Parser)]
#[command(
    name = "tailctl",
    version,
    about = "Operate a Tailscale tailnet from the command line",
    long_about = "Invokes tailnet operations (devices, network, policy, security, reporting)\n\
        against the Tailscale control-plane API.\n\n\
        Run `tailctl tools` to list every tool, operation and parameter.",
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
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "TAILCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Tailnet name (overrides profile; `-` for the key's own tailnet)
    #[arg(long, short = 't', env = "TAILCTL_TAILNET", global = true)]
    pub tailnet: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, env = "TAILCTL_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// API key (overrides profile, env and keyring)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "TAILCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to the config's `defaults.output`)
    #[arg(long, short = 'o', env = "TAILCTL_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Request timeout, e.g. `10s` or `1m`
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub timeout: Option<Duration>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "TAILCTL_LOG_JSON", global = true)]
    pub log_json: bool,

    /// Print request and dispatch counters to stderr when done
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Invoke one operation of a tool
    #[command(alias = "i")]
    Invoke(InvokeArgs),

    /// List tools, their operations and parameters
    Tools(ToolsArgs),

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Invoke ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InvokeArgs {
    /// Tool name (device, network, policy, security, reporting)
    pub tool: String,

    /// Operation name, e.g. `list` or `tag_batch`
    pub operation: String,

    /// String parameter, repeatable: `-P device_id=n123`
    #[arg(long = "param", short = 'P', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// JSON-typed parameter, repeatable: `-J limit=10`, `-J tags='["tag:web"]'`
    #[arg(long = "json", short = 'J', value_name = "KEY=JSON")]
    pub json_params: Vec<String>,

    /// All parameters as one JSON object; `@path` reads a file, `-` stdin
    #[arg(long, value_name = "JSON|@FILE|-")]
    pub params_json: Option<String>,
}

// ── Tools ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ToolsArgs {
    /// Show only this tool
    pub tool: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's API key in the system keyring
    SetKey {
        /// Read the key from this environment variable instead of stdin
        #[arg(long, value_name = "VAR")]
        from_env: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
