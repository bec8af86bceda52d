use std::path::PathBuf;

use anyhow::Result;
use boxcut::commands::{
    graph_command, init_plan_command, partition_command, type_cost_command, PlanArgs,
};
use boxcut_core::analysis::DEFAULT_POINTER_UNIT_COST;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Weighted call-graph partitioning for binary compartmentalization.
///
/// This CLI is a thin wrapper around `boxcut-core`; all substantive logic
/// lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "boxcut",
    version,
    about = "Split a program's call graph into isolated compartments",
    long_about = None
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the weighted graph, partition it and emit the gate manifest.
    Partition {
        #[command(flatten)]
        plan: PlanArgs,

        /// Write the manifest JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print a human-readable summary instead of JSON.
        #[arg(long, default_value_t = false)]
        summary: bool,
    },

    /// Build and emit the weighted call graph only.
    Graph {
        #[command(flatten)]
        plan: PlanArgs,

        /// Write the graph JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the boundary-crossing cost of a type descriptor.
    TypeCost {
        /// Type descriptor, e.g. `i32*`, `[4 x i64]`, `(i32)(i8*, i64)`.
        descriptor: String,

        #[arg(long, default_value_t = DEFAULT_POINTER_UNIT_COST)]
        pointer_unit_cost: u64,

        /// Emit JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Write a plan template.
    InitPlan {
        #[arg(long, default_value = "boxcut.yaml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Partition { plan, out, summary } => {
            partition_command(&plan, out.as_deref(), summary)?
        }
        Command::Graph { plan, out } => graph_command(&plan, out.as_deref())?,
        Command::TypeCost { descriptor, pointer_unit_cost, json } => {
            type_cost_command(&descriptor, pointer_unit_cost, json)?
        }
        Command::InitPlan { path, force } => init_plan_command(&path, force)?,
    }

    Ok(())
}
