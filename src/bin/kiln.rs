//! `kiln` binary: parses flags, installs logging and runs one command.

use clap::Parser;
use kiln::cli::{exit_code, map_error, Cli, RunContext};
use kiln::config::ConfigLoader;
use kiln::error::ApiError;
use kiln::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(Some(&build_logging_config(&cli))) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }
    info!(version = env!("CARGO_PKG_VERSION"), "kiln starting");

    let outcome = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .map_err(|e| {
            error!(error = %e, "Could not prepare run context");
            e
        })
        .and_then(|context| context.execute(&cli.command));

    match outcome {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{}", output),
        Err(e) => exit_with(&e),
    }
}

fn exit_with(e: &ApiError) -> ! {
    error!(error = %e, "Command failed");
    eprintln!("{}", map_error(e));
    process::exit(exit_code(e))
}

/// Logging settings from the config file, overridden by command-line flags.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    config.enabled &= !cli.quiet;
    if cli.verbose {
        config.level = "debug".to_string();
        // file-only output gains a stderr mirror; --log-output below still wins
        if config.output == "file" {
            config.output = "both".to_string();
        }
    }
    let overrides = [
        (&cli.log_level, &mut config.level),
        (&cli.log_format, &mut config.format),
        (&cli.log_output, &mut config.output),
    ];
    for (flag, slot) in overrides {
        if let Some(value) = flag {
            *slot = value.clone();
        }
    }
    if let Some(file) = &cli.log_file {
        config.file = file.clone();
    }
    if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }
    config
}
