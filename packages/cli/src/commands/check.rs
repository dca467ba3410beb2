use super::{build_controller, TreeHelper};
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use frond_controller::{
    Controller, ControllerConfig, Event, EventLog, Lifecycle, ObserverRegistry, StateId,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Document to mirror (JSON)
    pub tree: PathBuf,

    /// Schema the document must conform to
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
}

pub fn check(args: CheckArgs, config: ControllerConfig) -> Result<()> {
    println!(
        "🔍 {} {}",
        "Checking".green().bold(),
        args.tree.display()
    );

    let controller = build_controller(&args.tree, args.schema.as_deref(), config)?;

    let log = EventLog::new();
    let mut registry = ObserverRegistry::new();
    log.record(&mut registry);
    controller.attach(&mut registry);

    for event in log.events() {
        match event {
            Event::NodeStateCreated { state, .. } => print_state(&controller, state),
            Event::BlockStateCreated { inner, block } => {
                let owner = controller
                    .path_of(inner.owner)
                    .map(|path| path.depth())
                    .unwrap_or(0);
                println!(
                    "{:>6} {}{} {}",
                    "",
                    "  ".repeat(owner + 1),
                    format!("{}[{}]", inner.property, block).dimmed(),
                    "block".magenta()
                );
            }
            _ => {}
        }
    }

    controller
        .verify()
        .map_err(|message| anyhow!("Invariant violated: {}", message))?;

    println!(
        "\n✨ {} {} states",
        "Done".green().bold(),
        controller.state_count()
    );
    Ok(())
}

fn print_state(controller: &Controller<TreeHelper>, state: StateId) {
    let Ok(path) = controller.path_of(state) else {
        return;
    };
    let label = match path.last() {
        Some(step) => format!("{}{}", step.property, step.slot),
        None => "/".to_string(),
    };
    let indent = "  ".repeat(path.depth());

    let unassigned = controller
        .state(state)
        .map(|s| s.lifecycle() == Lifecycle::Unassigned)
        .unwrap_or(false);
    if unassigned {
        println!(
            "{} {}{} {}",
            format!("{:>6}", state.to_string()).dimmed(),
            indent,
            label,
            "unassigned".yellow()
        );
        return;
    }

    let kind = controller
        .node(state)
        .map(|node| node.kind.as_str())
        .unwrap_or("?");
    println!(
        "{} {}{} {}",
        format!("{:>6}", state.to_string()).dimmed(),
        indent,
        label,
        kind.cyan()
    );
}
