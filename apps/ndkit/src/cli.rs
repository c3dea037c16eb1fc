// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};
use schemars::schema_for;
use tracing::{error, info, warn};

use crate::config;

type LogInitFn = fn(
    &config::LogConfig,
)
    -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ndkit.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the simulated detector and its plugin chain
    Run(RunArgs),
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Stop the detector after this many frames (overrides `detector.frame_count`)
    #[arg(long)]
    pub frames: Option<u64>,
    /// Stop after this many seconds (overrides `run.duration_secs`)
    #[arg(long)]
    pub duration: Option<f64>,
    /// Print the final counters as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a default config file and print it to stdout
    Default,
    /// Generate a JSON schema for the config and print it to stdout
    Schema,
}

fn apply_overrides(config: &mut config::Config, args: &RunArgs) {
    if let Some(frames) = args.frames {
        config.detector.frame_count = Some(frames);
    }
    if let Some(duration) = args.duration {
        config.run.duration_secs = Some(duration);
    }
}

fn log_startup_info(config_path: &str, config: &config::Config) {
    let plugins: Vec<&str> = config.plugins.iter().map(|p| p.driver.name.as_str()).collect();
    info!(
        config_path,
        detector = %config.detector.port,
        ?plugins,
        log_file = ?config.log.file_enable.then_some(config.log.file_path.as_str()),
        "Starting ndkit"
    );
}

/// Loads the config, applies flag overrides and runs one acquisition.
///
/// Any failure exits the process with status 1. Errors before logging is up go to stderr.
#[allow(clippy::disallowed_macros)]
async fn handle_run_command(config_path: &str, args: &RunArgs, init_logging: LogInitFn) {
    let mut config_result = match config::load(config_path) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        },
    };
    apply_overrides(&mut config_result.config, args);

    let _log_guard = match init_logging(&config_result.config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Some(missing_file) = &config_result.file_missing {
        warn!(config_path = %missing_file, "Config file not found, using defaults");
    }

    log_startup_info(config_path, &config_result.config);

    match crate::runner::run(&config_result.config).await {
        Ok(summary) if args.json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "Failed to serialize run summary");
                std::process::exit(1);
            },
        },
        Ok(_) => {},
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run failed");
            std::process::exit(1);
        },
    }
}

/// Prints the default config as TOML, or the config's JSON schema.
// stdout is the command's output
#[allow(clippy::disallowed_macros)]
fn handle_config_command(command: &ConfigCommands) {
    let rendered = match command {
        ConfigCommands::Default => config::generate_default()
            .map(|toml| format!("# Default ndkit configuration file\n{toml}"))
            .map_err(|e| e.to_string()),
        ConfigCommands::Schema => {
            serde_json::to_string_pretty(&schema_for!(config::Config)).map_err(|e| e.to_string())
        },
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Failed to render {command:?} config: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle CLI commands. Without a subcommand, runs with the config file's settings.
pub async fn handle_command(cli: &Cli, init_logging: LogInitFn) {
    match cli.command.as_ref() {
        None => {
            handle_run_command(&cli.config, &RunArgs::default(), init_logging).await;
        },
        Some(Commands::Run(args)) => {
            handle_run_command(&cli.config, args, init_logging).await;
        },
        Some(Commands::Config(command)) => handle_config_command(command),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let cli =
            Cli::try_parse_from(["ndkit", "-c", "lab.toml", "run", "--frames", "25", "--json"])
                .unwrap();
        assert_eq!(cli.config, "lab.toml");
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert!(args.json);

        let mut config = config::Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.detector.frame_count, Some(25));
        assert!(config.run.duration_secs.is_none());
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["ndkit", "config", "schema"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config(ConfigCommands::Schema))));
        assert!(Cli::try_parse_from(["ndkit"]).unwrap().command.is_none());
    }
}
