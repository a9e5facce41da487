//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG;

/// Autoheal: heal broken UI test locators and keep mapping files in sync
#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG, global = true)]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one heal cycle for a failing test
    Heal(HealArgs),

    /// Run the demo pipeline on a CI event JSON
    Run(RunArgs),

    /// Rename text in the tests repo and optionally open a PR
    HealTextRename(TextRenameArgs),

    /// Update a logical name across all module mappings
    UpdateMappingsByName(MappingsByNameArgs),

    /// Extract identifiers from the app repo, then update mappings
    UpdateMappingsFromApp(MappingsFromAppArgs),
}

/// Arguments for the heal command
#[derive(Parser, Debug)]
pub struct HealArgs {
    /// Test identifier passed to the test command
    #[arg(long)]
    pub test: String,

    /// UI snapshot captured at failure (HTML or accessibility XML)
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Locator that no longer matches
    #[arg(long)]
    pub old: String,

    /// Platform of the failing test
    #[arg(long, default_value = "web")]
    pub platform: PlatformArg,

    /// Test source to patch, overriding the configured default
    #[arg(long)]
    pub target: Option<PathBuf>,

    /// Directory the test command runs in
    #[arg(long, default_value = "tests")]
    pub tests_dir: PathBuf,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// CI event JSON
    #[arg(long)]
    pub event: PathBuf,

    /// Workspace the patch applies to
    #[arg(long)]
    pub workspace: PathBuf,
}

/// Arguments shared by commands that may open a pull request
#[derive(clap::Args, Debug)]
pub struct PublishArgs {
    /// Branch to push changes to
    #[arg(long)]
    pub branch: String,

    /// GitHub token; falls back to `vcs.github_token`, and without either
    /// the changes stay local
    #[arg(long)]
    pub github_token: Option<String>,
}

/// Arguments for the heal-text-rename command
#[derive(Parser, Debug)]
pub struct TextRenameArgs {
    /// Application repository (git history grounds the provider)
    #[arg(long)]
    pub app_repo: Option<PathBuf>,

    /// Tests repository to rewrite
    #[arg(long)]
    pub tests_repo: PathBuf,

    /// Text to replace
    #[arg(long)]
    pub old: String,

    /// Replacement text
    #[arg(long)]
    pub new: String,

    /// Publishing options
    #[command(flatten)]
    pub publish: PublishArgs,
}

/// Arguments for the update-mappings-by-name command
#[derive(Parser, Debug)]
pub struct MappingsByNameArgs {
    /// Tests repository holding the module mappings
    #[arg(long)]
    pub tests_repo: PathBuf,

    /// Logical name to update
    #[arg(long)]
    pub logical: String,

    /// New Android identifier (empty leaves Android alone)
    #[arg(long, default_value = "")]
    pub android_id: String,

    /// New iOS identifier (empty leaves iOS alone)
    #[arg(long, default_value = "")]
    pub ios_id: String,

    /// Publishing options
    #[command(flatten)]
    pub publish: PublishArgs,
}

/// Arguments for the update-mappings-from-app command
#[derive(Parser, Debug)]
pub struct MappingsFromAppArgs {
    /// Application repository to scan
    #[arg(long)]
    pub app_repo: PathBuf,

    /// Tests repository holding the module mappings
    #[arg(long)]
    pub tests_repo: PathBuf,

    /// Only apply updates for this logical name
    #[arg(long, default_value = "")]
    pub logical: String,

    /// Publishing options
    #[command(flatten)]
    pub publish: PublishArgs,
}

/// Test platform
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlatformArg {
    /// Browser test with an HTML snapshot
    #[default]
    Web,
    /// iOS test with an accessibility XML snapshot
    Ios,
    /// Android test (needs a registered strategy)
    Android,
}

impl From<PlatformArg> for autoheal::Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Web => Self::Web,
            PlatformArg::Ios => Self::Ios,
            PlatformArg::Android => Self::Android,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
