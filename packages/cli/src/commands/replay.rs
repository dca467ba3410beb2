use super::build_controller;
use crate::script::load_script;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use frond_controller::ControllerConfig;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Document to mirror (JSON)
    pub tree: PathBuf,

    /// Script of commands to apply (JSON array)
    pub script: PathBuf,

    /// Schema the document must conform to
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Undo everything afterwards
    #[arg(long)]
    pub undo_all: bool,

    /// Print the resulting document
    #[arg(long)]
    pub print_tree: bool,
}

pub fn replay(args: ReplayArgs, config: ControllerConfig) -> Result<()> {
    println!(
        "▶️  {} {} on {}",
        "Replaying".green().bold(),
        args.script.display(),
        args.tree.display()
    );

    let commands = load_script(&args.script)?;
    let mut controller = build_controller(&args.tree, args.schema.as_deref(), config)?;

    let events = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&events);
    controller.observers_mut().on_any(move |event| {
        counter.set(counter.get() + 1);
        println!("     {} {}", "·".dimmed(), event);
    });

    for (i, command) in commands.iter().enumerate() {
        println!("   {} {}", "→".blue(), command);
        debug!(step = i, command = command.name(), "Applying command");
        command
            .apply(&mut controller)
            .with_context(|| format!("Command {} ({}) failed", i, command.name()))?;
    }

    if args.undo_all {
        let mut undone = 0;
        while controller.undo()? {
            undone += 1;
        }
        println!("   {} undid {} levels", "↩".blue(), undone);
    }

    controller
        .verify()
        .map_err(|message| anyhow!("Invariant violated: {}", message))?;

    println!();
    println!("✨ {} Replay complete", "Done".green().bold());
    println!("   Commands:    {}", commands.len());
    println!("   Events:      {}", events.get());
    println!("   Undo levels: {}", controller.history().undo_levels());
    println!("   States:      {}", controller.state_count());

    if args.print_tree {
        println!();
        println!("{}", serde_json::to_string_pretty(controller.document())?);
    }

    Ok(())
}
