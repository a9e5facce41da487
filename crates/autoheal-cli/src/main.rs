//! Autoheal CLI: self-healing UI test locators
//!
//! ## Usage
//!
//! ```bash
//! autoheal heal --test failing_test --snapshot snap.html --old btnCheckout
//! autoheal run --event event.json --workspace ./tests
//! autoheal update-mappings-by-name --tests-repo ../e2e --logical us.mappings.cart.checkout \
//!     --android-id "//*[@resource-id='checkout']" --branch autoheal/checkout
//! ```

use autoheal_cli::{
    handlers::{execute_heal, execute_mappings_by_name, execute_mappings_from_app, execute_run, execute_text_rename},
    Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, Context, Status, Verbosity,
};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "AUTOHEAL_LOG_LEVEL";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    let ctx = Context::load(&config)?;
    init_tracing(config.verbosity, &ctx.config.logging.level);

    let payload = match &cli.command {
        Commands::Heal(args) => execute_heal(&ctx, args)?,
        Commands::Run(args) => {
            let payload = execute_run(&ctx, args)?;
            if payload.status == Status::Failed {
                payload.print()?;
                let reason = payload.message.unwrap_or_else(|| "patch rejected".to_string());
                return Err(CliError::validation_failed(reason));
            }
            payload
        }
        Commands::HealTextRename(args) => execute_text_rename(&ctx, args)?,
        Commands::UpdateMappingsByName(args) => execute_mappings_by_name(&ctx, args)?,
        Commands::UpdateMappingsFromApp(args) => execute_mappings_from_app(&ctx, args)?,
    };
    payload.print()?;
    Ok(())
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_config_path(cli.config.clone())
}

/// Filter from `AUTOHEAL_LOG_LEVEL`, else the `-v`/`-q` flags, else `logging.level`
fn init_tracing(verbosity: Verbosity, configured: &str) {
    let fallback = match verbosity {
        Verbosity::Normal if !configured.is_empty() => configured,
        _ => verbosity.default_filter(),
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
