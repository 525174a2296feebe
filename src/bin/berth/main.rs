//! Berth CLI - recipe-driven configuration resolver and patcher

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use berth::core::recipe::TargetError;
use berth::registry::RegistryError;
use berth::resolver::SelectError;
use berth::util::diagnostic::{emit, Diagnostic};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let color = !std::env::args().any(|a| a == "--no-color")
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stderr().is_terminal();

    if let Err(e) = run() {
        match diagnostic_for(&e) {
            Some(diag) => emit(&diag, color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

/// Rich diagnostic for the errors users can act on.
fn diagnostic_for(err: &anyhow::Error) -> Option<Diagnostic> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<SelectError>() {
            Some(e.to_diagnostic())
        } else if let Some(e) = cause.downcast_ref::<TargetError>() {
            Some(e.to_diagnostic())
        } else {
            cause.downcast_ref::<RegistryError>().map(|e| e.to_diagnostic())
        }
    })
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("berth=debug")
    } else {
        EnvFilter::new("berth=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::List(args) => commands::list::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Select(args) => commands::select::execute(args),
        Commands::Resolve(args) => commands::resolve::execute(args),
        Commands::Env(args) => commands::env::execute(args),
        Commands::Build(args) => commands::build::execute(args, cli.verbose),
        Commands::Lint(args) => commands::lint::execute(args, !cli.no_color),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
