mod commands;
mod config;
mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, replay, CheckArgs, ReplayArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Frond CLI - mirror a document as a state tree and drive edits on it
#[derive(Parser, Debug)]
#[command(name = "frond")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log controller activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Controller config (defaults to ./frond.config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror a document, print its state tree and verify it
    Check(CheckArgs),

    /// Apply a script of commands to a document
    Replay(ReplayArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot get current directory")?;
    let config = config::load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Command::Check(args) => check(args, config),
        Command::Replay(args) => replay(args, config),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
