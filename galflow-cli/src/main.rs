//! galflow - persistent galaxy identifiers over merger trees
//! Command-line interface for the two tracing phases and their output

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::*;
use galflow_core::{
    AssignSummary, FADED_CODE, JsonStore, MergerTree, PropagateSummary, TraceStep, Tracer, TracerConfig,
    TracingStore, UNRESOLVED_CODE, trace_object,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "galflow.toml";

#[derive(Parser)]
#[command(name = "galflow")]
#[command(author = "Galflow Contributors")]
#[command(version = galflow_core::VERSION)]
#[command(about = "galflow - persistent galaxy identity tracing over merger trees", long_about = None)]
struct Cli {
    /// Run configuration (default: ./galflow.toml if present)
    #[arg(short, long, global = true, value_name = "FILE", env = "GALFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign object IDs and build carrier maps
    Run {
        /// Merger tree (JSON)
        #[arg(value_name = "TREE")]
        tree: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Assign object IDs and linkage only
    Assign {
        /// Merger tree (JSON)
        #[arg(value_name = "TREE")]
        tree: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Build carrier maps from a previous `assign`
    Carriers {
        /// Tracing output directory
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Process only the first N snapshots
        #[arg(short = 'n', long, value_name = "N")]
        snapshots: Option<usize>,
    },

    /// Show the forward history of one object ID
    Trace {
        /// Object ID to follow
        #[arg(value_name = "OBJECT_ID")]
        object_id: u32,

        /// Tracing output directory
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Print the history as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show information about galflow
    Info,
}

#[derive(Args)]
struct OutputArgs {
    /// Tracing output directory
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Process only the first N snapshots
    #[arg(short = 'n', long, value_name = "N")]
    snapshots: Option<usize>,

    /// Write indented JSON
    #[arg(long)]
    pretty: bool,

    /// Overwrite instead of moving a previous output to <DIR>.old
    #[arg(long)]
    no_backup: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Commands::Info = cli.command {
        print_info();
        return;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Commands::Run { tree, output } => run_command(&tree, &output, config),
        Commands::Assign { tree, output } => assign_command(&tree, &output, config),
        Commands::Carriers { out, snapshots } => carriers_command(out, snapshots, config),
        Commands::Trace { object_id, out, json } => trace_command(object_id, out, json, config),
        Commands::Info => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<TracerConfig> {
    match path {
        Some(path) => Ok(TracerConfig::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG).is_file() => Ok(TracerConfig::from_file(Path::new(DEFAULT_CONFIG))?),
        None => Ok(TracerConfig::default()),
    }
}

/// `GALFLOW_LOG` overrides the filter from the config file
fn init_logging(config: &TracerConfig) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("GALFLOW_LOG").unwrap_or_else(|_| config.logging.filter.as_str().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn apply_output_args(config: &mut TracerConfig, output: &OutputArgs) {
    if let Some(out) = &output.out {
        config.output.dir = out.clone();
    }
    if output.snapshots.is_some() {
        config.run.num_snapshots = output.snapshots;
    }
    if output.pretty {
        config.output.pretty = true;
    }
    if output.no_backup {
        config.output.backup_existing = false;
    }
}

fn load_tree(path: &Path) -> Result<MergerTree> {
    println!("{} merger tree {}", "Loading".green().bold(), path.display().to_string().cyan());
    MergerTree::from_file(path).with_context(|| format!("cannot load merger tree {}", path.display()))
}

// ============================================================================
// Tracing commands
// ============================================================================

fn run_command(tree_path: &Path, output: &OutputArgs, mut config: TracerConfig) -> Result<()> {
    apply_output_args(&mut config, output);
    config.validate()?;
    let tree = load_tree(tree_path)?;

    let mut store = JsonStore::create(&config.output.dir, config.output.store_options())?;
    tracing::info!(
        tree = %tree_path.display(),
        out = %store.root().display(),
        snapshots = ?config.run.num_snapshots,
        "galflow run starting"
    );
    let summary = Tracer::from_config(&config).run(&tree, &mut store)?;
    tracing::info!(
        snapshots = summary.propagate.snapshots,
        total_ids = summary.propagate.total_ids,
        "galflow run finished"
    );

    print_assign_summary(&summary.assign);
    print_propagate_summary(&summary.propagate);
    print_written(store.root());
    Ok(())
}

fn assign_command(tree: &Path, output: &OutputArgs, mut config: TracerConfig) -> Result<()> {
    apply_output_args(&mut config, output);
    config.validate()?;
    let tree = load_tree(tree)?;

    let mut store = JsonStore::create(&config.output.dir, config.output.store_options())?;
    tracing::info!(out = %store.root().display(), "galflow assign starting");
    let summary = Tracer::from_config(&config).assign_all(&tree, &mut store)?;
    tracing::info!(total_ids = summary.total_ids, "galflow assign finished");

    print_assign_summary(&summary);
    print_written(store.root());
    println!();
    println!("Run {} to build carrier maps.", format!("galflow carriers --out {}", store.root().display()).bold());
    Ok(())
}

fn carriers_command(out: Option<PathBuf>, snapshots: Option<usize>, mut config: TracerConfig) -> Result<()> {
    if let Some(out) = out {
        config.output.dir = out;
    }
    if snapshots.is_some() {
        config.run.num_snapshots = snapshots;
    }
    config.validate()?;

    let mut store = JsonStore::open(&config.output.dir)?.with_pretty(config.output.pretty);
    if store.snapshot_count()? == 0 {
        bail!("no object ID tables in {} (run `galflow assign` first)", config.output.dir.display());
    }
    tracing::info!(out = %store.root().display(), "galflow carriers starting");
    let summary = Tracer::from_config(&config).propagate_all(&mut store)?;
    tracing::info!(snapshots = summary.snapshots, "galflow carriers finished");

    print_propagate_summary(&summary);
    print_written(store.root());
    Ok(())
}

fn trace_command(object_id: u32, out: Option<PathBuf>, json: bool, mut config: TracerConfig) -> Result<()> {
    if let Some(out) = out {
        config.output.dir = out;
    }
    let store = JsonStore::open(&config.output.dir)?;
    let history = trace_object(&store, object_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        bail!("object ID {} was never assigned in {}", object_id, config.output.dir.display());
    }
    print_history(object_id, &history);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_assign_summary(summary: &AssignSummary) {
    println!(
        "{} {} object IDs over {} snapshots",
        "Assigned".green().bold(),
        summary.total_ids.to_string().cyan(),
        summary.snapshots
    );
    println!("   max pending tables: {}", summary.max_window);
    if summary.empty_snapshots > 0 {
        println!("   {} {} empty snapshots", "note:".yellow().bold(), summary.empty_snapshots);
    }
}

fn print_propagate_summary(summary: &PropagateSummary) {
    println!(
        "{} carrier maps for {} snapshots ({} object IDs)",
        "Propagated".green().bold(),
        summary.snapshots,
        summary.total_ids.to_string().cyan()
    );
    println!("   max live carrier maps: {}", summary.max_window);
    if let Some(stats) = summary.final_stats {
        println!(
            "   snapshot {}: {} independent, {} merged, {} faded",
            stats.snapshot,
            stats.independent.to_string().green(),
            stats.merged.to_string().yellow(),
            stats.faded.to_string().red()
        );
    }
}

fn print_written(root: &Path) {
    println!("{} {}", "   Written".green().bold(), root.display().to_string().cyan());
}

fn print_history(object_id: u32, history: &[TraceStep]) {
    println!("{} {}", "Object".bold(), object_id.to_string().cyan());
    println!("  {:>8}  {:>8}  {:>10}  {:>12}", "snapshot", "node", "carrier", "carrier node");
    for step in history {
        let node = step.node.map_or("-".to_string(), |n| n.to_string());
        let carrier_node = step.carrier_node.map_or("-".to_string(), |n| n.to_string());
        let carrier = match step.carrier.object() {
            Some(c) if c == object_id => c.to_string().green(),
            Some(c) => c.to_string().yellow(),
            None => step.carrier.to_string().red(),
        };
        println!("  {:>8}  {:>8}  {:>10}  {:>12}", step.snapshot, node, carrier, carrier_node);
    }
}

fn print_info() {
    println!("{}", "galflow - persistent galaxy identity tracing".bold());
    println!();
    println!("Tracks galaxies across halo catalogs linked by a merger tree, tolerating");
    println!("snapshot gaps and contractions.");
    println!();
    println!("{}", "Pipeline:".bold());
    println!("  Merger tree (JSON)");
    println!("       ↓  assign");
    println!("  ObjIDs/ObjIDs_NNNN.json + Linkage/Linkage_NNNN.json");
    println!("       ↓  carriers");
    println!("  MergeLists/CarrierIDs_NNNN.json + VRIndices/VRIndices_NNNN.json");
    println!();
    println!("{}", "Encodings:".bold());
    println!("  carrier = object ID      galaxy is part of that object");
    println!("  carrier = {:<14} galaxy has faded", FADED_CODE);
    println!("  carrier = {:<14} object ID not assigned yet (padding)", UNRESOLVED_CODE);
    println!("  VRIndices = -1           object not present in the snapshot");
    println!();
    println!("{}", "Commands:".bold());
    println!("  galflow run tree.json --out tracing        # Both phases");
    println!("  galflow assign tree.json --out tracing     # Object IDs only");
    println!("  galflow carriers --out tracing             # Carrier maps only");
    println!("  galflow trace 42 --out tracing             # History of object 42");
    println!();
    println!("{}", "Configuration:".bold());
    println!("  galflow.toml ([run], [output], [logging]); GALFLOW_LOG overrides the log filter");
    println!();
    println!("version {}", galflow_core::VERSION);
}
