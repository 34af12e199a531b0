//! tensile CLI - force-directed layout for graphs stored as JSON edge lists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tensile_core::{GraphDocument, LayoutGraph, NodeId, Positions, Topology};
use tensile_layout::{
    LayoutRegistry, LayoutService, LayoutSession, ServiceConfig, ServiceEvent, ServiceListener,
    StaticLayout, StaticLayoutParameters,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

/// tensile - lay out graphs with springs, repulsion and a cooling schedule.
#[derive(Parser, Debug)]
#[command(
    name = "tensile",
    author,
    version,
    about = "Force-directed graph layout",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a whole-graph layout and write the positions as JSON.
    Layout {
        /// Graph document (`{"directed", "nodes", "edges"}`).
        graph: PathBuf,

        /// Registered algorithm name.
        #[arg(short, long, default_value = "spring")]
        algorithm: String,

        /// JSON layout parameters file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Drive the iterative layout with the periodic service and print the
    /// energy of every tick.
    Simulate {
        /// Graph document (`{"directed", "nodes", "edges"}`).
        graph: PathBuf,

        /// Number of ticks to run.
        #[arg(long, default_value_t = 100)]
        ticks: u64,

        /// Delay between ticks in milliseconds.
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,

        /// Layout steps per tick.
        #[arg(long, default_value_t = 1)]
        steps_per_tick: usize,

        /// JSON layout parameters file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the final positions to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the registered layout algorithms.
    Algorithms,
}

/// JSON written by `layout` and `simulate`.
#[derive(Debug, Serialize)]
struct LayoutOutput {
    positions: BTreeMap<u64, [f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    converged: Option<bool>,
}

impl LayoutOutput {
    fn new(positions: &Positions<NodeId>) -> Self {
        Self {
            positions: positions
                .iter()
                .map(|(id, p)| (id.0, [p.x, p.y]))
                .collect(),
            steps: None,
            final_energy: None,
            converged: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Layout {
            graph,
            algorithm,
            config,
            output,
        } => {
            let config = Config::load(config.as_deref())?;
            let graph = load_graph(&graph)?;
            let result = run_layout(graph, algorithm, config.params).await?;
            write_output(&result, output.as_deref())?;
        }

        Commands::Simulate {
            graph,
            ticks,
            interval_ms,
            steps_per_tick,
            config,
            output,
        } => {
            let config = Config::load(config.as_deref())?;
            let graph = load_graph(&graph)?;
            let service = ServiceConfig {
                interval: Duration::from_millis(interval_ms),
                steps_per_tick,
            };
            let positions = simulate(graph, config.params, service, ticks).await?;
            if let Some(path) = output {
                write_output(&LayoutOutput::new(&positions), Some(&path))?;
            }
        }

        Commands::Algorithms => {
            for name in LayoutRegistry::<NodeId>::builtin().names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn load_graph(path: &Path) -> Result<LayoutGraph<NodeId>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph from {}", path.display()))?;
    let document = GraphDocument::from_json(&contents)
        .with_context(|| format!("Failed to parse graph document {}", path.display()))?;
    let graph = document.to_graph();
    info!(
        nodes = graph.order(),
        edges = graph.edge_count(),
        directed = document.directed,
        "graph loaded"
    );
    Ok(graph)
}

/// Run the layout on a blocking worker; Ctrl-C cancels it.
async fn run_layout(
    graph: LayoutGraph<NodeId>,
    algorithm: String,
    params: StaticLayoutParameters,
) -> Result<LayoutOutput> {
    let registry = LayoutRegistry::<NodeId>::builtin();
    if !registry.contains(&algorithm) {
        anyhow::bail!(
            "Unknown algorithm `{algorithm}`. Available: {}",
            registry.names().join(", ")
        );
    }

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, canceling layout");
                token.cancel();
            }
        })
    };

    let task = tokio::task::spawn_blocking(move || -> Result<LayoutOutput> {
        let hints: Positions<NodeId> = Positions::new();
        if algorithm == "spring" {
            let report = StaticLayout::<NodeId>::new()
                .layout_with_cancel(&graph, &hints, &params, &token)?;
            let mut output = LayoutOutput::new(&report.positions);
            output.steps = Some(report.steps);
            output.final_energy = Some(report.final_energy);
            output.converged = Some(report.converged);
            Ok(output)
        } else {
            let positions = registry.layout(&algorithm, &graph, &hints, &params, &token)?;
            Ok(LayoutOutput::new(&positions))
        }
    });

    let result = task.await.context("Layout task panicked")?;
    interrupt.abort();
    result.context("Layout failed")
}

/// Tick the periodic service `ticks` times, printing `tick<TAB>energy` lines.
async fn simulate(
    graph: LayoutGraph<NodeId>,
    params: StaticLayoutParameters,
    config: ServiceConfig,
    ticks: u64,
) -> Result<Positions<NodeId>> {
    let session = Arc::new(LayoutSession::<NodeId, _>::new(graph, params.layout)?);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener: ServiceListener = Box::new(move |event: &ServiceEvent| {
        let _ = tx.send(event.clone());
    });
    let service = LayoutService::spawn(Arc::clone(&session), config, Some(listener))?;

    let mut seen = 0;
    let mut failure = None;
    while seen < ticks {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ServiceEvent::Tick { tick, energy }) => {
                    println!("{tick}\t{energy:.6}");
                    seen += 1;
                }
                Some(ServiceEvent::Failed { error, .. }) => {
                    failure = Some(error);
                    break;
                }
                Some(ServiceEvent::Stopped { .. }) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, stopping simulation");
                break;
            }
        }
    }

    let status = tokio::task::spawn_blocking(move || service.stop_and_join())
        .await
        .context("Layout service panicked")?;
    info!(ticks = seen, ?status, "simulation finished");

    if let Some(error) = failure {
        return Err(error).context("Layout service failed");
    }
    Ok(session.positions_copy())
}

fn write_output(output: &LayoutOutput, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(output)?;
    match path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write layout to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
