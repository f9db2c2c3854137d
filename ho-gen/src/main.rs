#![deny(
    clippy::nursery,
    clippy::pedantic,
    missing_docs,
    clippy::missing_docs_in_private_items,
)]
//! Handover trace generator command line interface.
//!
//! Generates one or more closed-loop handover traces and writes each into its own directory: one
//! `tx_unit{n}.csv` per execution unit, `tx_params.csv`, and `metadata.json`.
//! See binary --help for more information

use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use ho_gen::output::{
    create_timestamped_output_dir,
    write_metadata,
    write_params,
    CsvSink,
};
use ho_gen::{
    generate,
    Topology,
    TraceConfig,
    TraceStats,
};
use indicatif::{
    ParallelProgressIterator,
    ProgressFinish,
    ProgressStyle,
};
use rand::Rng;
use rayon::prelude::*;
use tracing::{
    info,
    instrument,
};

/// ho-gen command-line interface to generate handover traces for sharded-system benchmarks
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of nodes; units are split evenly between them.
    #[arg(long)]
    nodes: usize,

    /// Number of execution units (threads), each with its own trace.
    #[arg(short, long)]
    units: usize,

    /// Number of UEs, divisible by the number of units.
    #[arg(short, long)]
    entities: usize,

    /// Number of eNodeBs, divisible by the number of units with at least two per unit.
    #[arg(short, long)]
    access_points: usize,

    /// Fraction of transactions that are handovers (range 0.0–1.0).
    #[arg(long, value_parser = parse_probability)]
    p_handovers: f64,

    /// Fraction of handovers that cross unit boundaries (range 0.0–1.0).
    #[arg(long, value_parser = parse_probability)]
    p_remote: f64,

    /// Fraction of each unit's UEs that may migrate (range 0.0–1.0).
    #[arg(long, value_parser = parse_probability)]
    p_moving: f64,

    /// Number of transactions in each generated trace.
    #[arg(short = 'n', long)]
    tx_total: usize,

    /// Seed for the first run; run `i` uses `seed + i`. Drawn at random when omitted.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of independent traces to generate (at least one).
    #[arg(short, long, default_value_t = 1, value_parser = parse_run_count)]
    runs: usize,

    /// Directory to write into; defaults to a timestamped directory under `runs/`.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Logging verbosity level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

impl Cli {
    /// The library configuration for one run seeded with `seed`.
    fn trace_config(&self, seed: u64) -> TraceConfig {
        TraceConfig {
            node_total: self.nodes,
            unit_total: self.units,
            entity_total: self.entities,
            access_point_total: self.access_points,
            p_handovers: self.p_handovers,
            p_remote: self.p_remote,
            p_moving_fraction: self.p_moving,
            tx_total: self.tx_total,
            seed: Some(seed),
        }
    }
}

/// Custom parser for the probability flags to enforce range [0.0, 1.0]
fn parse_probability(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("'{s}' isn't a valid float number"))?;
    if (0.0..=1.0).contains(&val) {
        Ok(val)
    } else {
        Err(format!("value must be between 0.0 and 1.0, got: {val}"))
    }
}

/// Custom parser for `--runs`: at least one trace must be generated
fn parse_run_count(s: &str) -> Result<usize, String> {
    let val: usize = s.parse().map_err(|_| format!("'{s}' isn't a valid run count"))?;
    if val == 0 {
        return Err("at least one run is required".into());
    }
    Ok(val)
}

/// Generates a single trace into `dir`.
#[instrument(skip(config), fields(seed = config.seed))]
fn generate_run(config: &TraceConfig, dir: &Path) -> Result<TraceStats> {
    std::fs::create_dir_all(dir)?;

    let sink = CsvSink::create(dir, config.unit_total)
        .with_context(|| format!("opening traces in {}", dir.display()))?;
    let stats = generate(config, sink)?;

    write_params(dir, config)?;
    write_metadata(dir, config, &stats)?;
    info!(
        records = stats.total(),
        handover_ratio = stats.handover_ratio(),
        remote_ratio = stats.remote_ratio(),
        "trace written to {}",
        dir.display()
    );
    Ok(stats)
}

/// Validate the configuration, then generate every requested run.
fn main() -> Result<()> {
    let args = Cli::parse();

    ho_core::logging::setup(&args.verbosity);

    let base_seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let base_config = args.trace_config(base_seed);
    Topology::new(&base_config).context("invalid trace configuration")?;

    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => create_timestamped_output_dir(Path::new("runs"))?,
    };
    info!(runs = args.runs, seed = base_seed, "writing traces to {}", output_dir.display());

    if args.runs == 1 {
        generate_run(&base_config, &output_dir)?;
        return Ok(());
    }

    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} traces ({percent}%) {msg}")?;

    let stats = (0..args.runs)
        .into_par_iter()
        .progress_count(args.runs as u64)
        .with_style(style)
        .with_message(format!("Generating traces ({} transactions each)", args.tx_total))
        .with_finish(ProgressFinish::AndLeave)
        .map(|run| {
            let config = TraceConfig { seed: Some(base_seed.wrapping_add(run as u64)), ..base_config.clone() };
            generate_run(&config, &output_dir.join(format!("run_{run}")))
        })
        .collect::<Result<Vec<_>>>()?;

    #[allow(clippy::cast_precision_loss)]
    let mean_handover_ratio = stats.iter().map(TraceStats::handover_ratio).sum::<f64>() / stats.len() as f64;
    info!(runs = stats.len(), mean_handover_ratio, "all traces generated");
    Ok(())
}
