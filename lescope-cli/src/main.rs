mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Log records always go to stderr; RUST_LOG overrides the level
    env_logger::Builder::new()
        .filter_module("lescope", log_level(cli.global.json, cli.global.verbose))
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match &cli.command {
        Command::Info { path } => commands::info::run(path, &cli.global),
        Command::Symbols { path, exe, base } => {
            commands::symbols::run(path, exe.as_deref(), base.as_deref(), &cli.global)
        }
        Command::Disasm(args) => commands::disasm::run(args, &cli.global),
    }
}

/// Level of `lescope` log records. `--json` keeps stderr to warnings such as unresolved far
/// targets, `--verbose` enables debug output.
fn log_level(json: bool, verbose: bool) -> log::LevelFilter {
    match (json, verbose) {
        (_, true) => log::LevelFilter::Debug,
        (true, false) => log::LevelFilter::Warn,
        (false, false) => log::LevelFilter::Info,
    }
}
