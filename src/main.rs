//! DGA-GNN CLI - fraud detection training from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Train with an experiment file, keep the model and group history
//! dga-gnn train --config configs/elliptic.json --checkpoint model.bin --history groups.json
//!
//! # Sweep learning rate and hidden size
//! dga-gnn tune --config configs/elliptic.json --output runs.json
//!
//! # Rank transactions by PageRank
//! dga-gnn centrality --config configs/elliptic.json --metric pagerank --top 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dga_gnn::features::{centrality, CentralityMetric};
use dga_gnn::graph;
use dga_gnn::monitoring::{init_logging, LogFormat, LogLevel, LoggerConfig};
use dga_gnn::training::{
    best_run, run_grid, save_history, save_model, FeedbackTrainer, ParamGrid, TrainerConfig,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "dga-gnn")]
#[command(about = "Dynamic group-aware GNN for transaction fraud detection", long_about = None)]
struct Cli {
    /// Minimum log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value_t = LevelArg::Info)]
    log_level: LevelArg,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = FormatArg::Text)]
    log_format: FormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model with the feedback loop
    Train {
        /// Experiment file (JSON)
        #[arg(long, default_value = "configs/elliptic.json")]
        config: PathBuf,

        /// Write the trained model here (bincode)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Write the per-epoch group history here (JSON)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Write the training report here (JSON)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Grid search over learning rate and hidden dimension
    Tune {
        /// Base experiment file (JSON)
        #[arg(long, default_value = "configs/elliptic.json")]
        config: PathBuf,

        /// Write all run results here (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute a centrality score for every node
    Centrality {
        /// Experiment file naming the dataset (JSON)
        #[arg(long, default_value = "configs/elliptic.json")]
        config: PathBuf,

        /// Centrality measure
        #[arg(long, value_enum, default_value_t = MetricArg::Pagerank)]
        metric: MetricArg,

        /// Number of top nodes to show
        #[arg(short, long, default_value = "20")]
        top: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Trace => LogLevel::Trace,
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warn => LogLevel::Warn,
            LevelArg::Error => LogLevel::Error,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => LogFormat::Text,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    /// (in + out) / (n - 1)
    Degree,
    /// Power-iteration PageRank
    Pagerank,
}

impl From<MetricArg> for CentralityMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Degree => CentralityMetric::Degree,
            MetricArg::Pagerank => CentralityMetric::PageRank,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(
        &LoggerConfig::default()
            .with_level(cli.log_level.into())
            .with_format(cli.log_format.into()),
    )?;

    match cli.command {
        Commands::Train {
            config,
            checkpoint,
            history,
            report,
        } => cmd_train(&config, checkpoint.as_deref(), history.as_deref(), report.as_deref()),
        Commands::Tune { config, output } => cmd_tune(&config, output.as_deref()),
        Commands::Centrality { config, metric, top } => cmd_centrality(&config, metric.into(), top),
    }
}

fn load_config(path: &Path) -> Result<TrainerConfig> {
    let config = TrainerConfig::load(path)
        .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn load_dataset(config: &TrainerConfig) -> Result<graph::Dataset> {
    graph::load(&config.data_path, config.dataset_name, config.split())
        .with_context(|| format!("Failed to load dataset from {}", config.data_path.display()))
}

fn cmd_train(
    config_path: &Path,
    checkpoint: Option<&Path>,
    history: Option<&Path>,
    report: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_dataset(&config)?;

    let start = Instant::now();
    let outcome = FeedbackTrainer::new(config, dataset)?.run()?;

    println!("Training Summary");
    println!("================");
    println!("Run:            {}", outcome.report.run_id);
    println!("Epochs:         {}", outcome.report.epochs);
    println!("Elapsed:        {:.2?}", start.elapsed());
    if let Some(loss) = outcome.report.final_loss {
        println!("Final loss:     {loss:.4}");
    }
    if let Some(acc) = outcome.report.final_val_accuracy {
        println!("Val accuracy:   {acc:.4}");
    }
    if let Some(test) = outcome.evaluation.test {
        println!("Test accuracy:  {:.4}", test.accuracy);
        println!("Test precision: {:.4}", test.precision);
        println!("Test recall:    {:.4}", test.recall);
        println!("Test F1:        {:.4}", test.f1);
    }

    if let Some(path) = checkpoint {
        save_model(&outcome.model, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = history {
        save_history(&outcome.history, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = report {
        outcome
            .report
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

fn cmd_tune(config_path: &Path, output: Option<&Path>) -> Result<()> {
    let base = load_config(config_path)?;
    let dataset = load_dataset(&base)?;
    let runs = run_grid(&base, &dataset, &ParamGrid::default())?;

    println!("{:>8} {:>8} {:>7} {:>10} {:>8}", "lr", "hidden", "epochs", "val_acc", "test_f1");
    for run in &runs {
        println!(
            "{:>8} {:>8} {:>7} {:>10} {:>8}",
            run.params.lr,
            run.params.hidden_dim,
            run.params.epochs,
            run.final_val_accuracy
                .map_or_else(|| "-".to_string(), |a| format!("{a:.4}")),
            run.test.map_or_else(|| "-".to_string(), |m| format!("{:.4}", m.f1)),
        );
    }
    if let Some(best) = best_run(&runs) {
        println!(
            "\nBest: lr={} hidden_dim={} epochs={}",
            best.params.lr, best.params.hidden_dim, best.params.epochs
        );
    }

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&runs)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

fn cmd_centrality(config_path: &Path, metric: CentralityMetric, top: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_dataset(&config)?;

    let start = Instant::now();
    let scores = centrality(&dataset.graph, metric)?;
    println!("Computed {metric} in {:.2?}", start.elapsed());

    let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!("\nTop {} nodes by {metric}:", top.min(ranked.len()));
    for (i, (node, score)) in ranked.iter().take(top).enumerate() {
        println!("{:3}. {:<10} {:.6}", i + 1, node, score);
    }
    Ok(())
}
