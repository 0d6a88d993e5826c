use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "playpen")]
#[clap(version, about = "Sandboxed JavaScript playground")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "PLAYPEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a script file once and print the captured console
    Run(RunArgs),

    /// Execute an inline snippet once
    Eval(EvalArgs),

    /// Watch a script file and re-run it on every change
    Watch(WatchArgs),

    /// Inspect or clear the persisted scratch script
    Scratch(ScratchArgs),

    /// Initialize a new playpen configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Execution Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the script file
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// JavaScript source to execute
    pub code: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Path to the script file to watch
    pub file: PathBuf,

    /// Quiet period after an edit before the re-run fires (overrides config)
    #[clap(long)]
    pub debounce_ms: Option<u64>,
}

// ============================================================================
// Scratch Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct ScratchArgs {
    #[clap(subcommand)]
    pub action: ScratchAction,
}

#[derive(Subcommand, Debug)]
pub enum ScratchAction {
    /// Print the saved scratch script
    Show,
    /// Show the scratch file path
    Path,
    /// Delete the saved scratch script
    Clear,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
