mod cli;
mod commands;
mod config;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Validate { file } => commands::documents::validate(&ctx, &file),
        Command::Info { file } => commands::documents::info(&ctx, &file),
        Command::Diff(args) => commands::diff::run(&ctx, &args, &Config::load()?),
        Command::Apply(args) => commands::documents::apply(&ctx, &args),
        Command::Merge(args) => commands::documents::merge(&ctx, &args, &Config::load()?),
        Command::Deploy(args) => commands::deploy::run(&ctx, &args, &Config::load()?),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rabbitdef", &mut io::stdout());
            Ok(())
        }
    }
}
