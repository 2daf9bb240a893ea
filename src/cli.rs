use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

use lccde::dataset::DatasetLoader;
use lccde::ml::DecisionPath;
use lccde::{Dataset, ExperimentConfig, ExperimentOutcome, ExperimentRunner, ReportFormat};

#[derive(Parser)]
#[command(name = "lccde")]
#[command(author, version, about = "Leader-class and confidence decision ensemble for intrusion detection")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the three learners on a CSV dataset and evaluate the ensemble
    Run {
        /// Encoded dataset with a header row
        #[arg(long)]
        dataset: PathBuf,

        /// Name of the label column
        #[arg(long, default_value = "Label")]
        label_column: String,

        /// Report format (text, markdown, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write per-sample fused predictions as CSV
        #[arg(long)]
        predictions: Option<PathBuf>,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured train fraction
        #[arg(long)]
        train_size: Option<f64>,

        /// Disable oversampling regardless of configuration
        #[arg(long)]
        no_smote: bool,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for model summary
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Time (ms)")]
    time: String,
}

/// Table row for per-class F1 and leaders
#[derive(Tabled)]
struct LeaderRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "A")]
    a: String,
    #[tabled(rename = "B")]
    b: String,
    #[tabled(rename = "C")]
    c: String,
    #[tabled(rename = "Leader")]
    leader: String,
}

/// One line of the predictions file
#[derive(Serialize)]
struct PredictionRecord<'a> {
    row: usize,
    truth: String,
    predicted: String,
    winner: &'a str,
    path: &'a str,
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    match cli.command {
        Commands::Run {
            dataset,
            label_column,
            format,
            output,
            predictions,
            seed,
            train_size,
            no_smote,
        } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.random_state = seed;
            }
            if let Some(train_size) = train_size {
                config.train_size = train_size;
            }
            if no_smote {
                config.smote_enabled = false;
            }
            let format: ReportFormat = format.parse()?;
            cmd_run(config, &dataset, &label_column, format, output, predictions)
        }
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn cmd_run(
    config: ExperimentConfig,
    dataset_path: &Path,
    label_column: &str,
    format: ReportFormat,
    output: Option<PathBuf>,
    predictions: Option<PathBuf>,
) -> Result<()> {
    let dataset = DatasetLoader::new()
        .with_label_column(label_column)
        .load(dataset_path)
        .with_context(|| format!("Failed to load dataset: {}", dataset_path.display()))?;

    let runner = ExperimentRunner::new(config).context("Invalid experiment configuration")?;
    let outcome = runner.run(&dataset).context("Experiment failed")?;

    if let Some(path) = &predictions {
        write_predictions(path, &dataset, &outcome)
            .with_context(|| format!("Failed to write predictions: {}", path.display()))?;
        eprintln!("Predictions written to {}", path.display());
    }

    let rendered = outcome.render(format)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            print_summary(&outcome);
            println!("\nReport written to {}", path.display());
        }
        None if format == ReportFormat::Text => {
            print_summary(&outcome);
            println!("\n{}", rendered);
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn print_summary(outcome: &ExperimentOutcome) {
    println!("{}", "=== LCCDE Experiment ===".bold());
    println!();
    println!(
        "Dataset: {} rows, {} features, {} classes",
        outcome.dataset.rows,
        outcome.dataset.features,
        outcome.dataset.classes.len()
    );
    println!(
        "Split:   {} train ({} after oversampling), {} test",
        outcome.dataset.train_rows, outcome.dataset.train_rows_resampled, outcome.dataset.test_rows
    );

    let rows: Vec<ModelRow> = outcome
        .reports()
        .map(|r| ModelRow {
            model: r.model.clone(),
            accuracy: format!("{:.4}", r.accuracy),
            precision: format!("{:.4}", r.precision),
            recall: format!("{:.4}", r.recall),
            f1: format!("{:.4}", r.f1),
            time: format!("{:.1}", r.total_time_ms()),
        })
        .collect();
    println!("\n{}", "Models:".bold());
    println!("{}", Table::new(rows));

    let rows: Vec<LeaderRow> = outcome
        .dataset
        .classes
        .iter()
        .enumerate()
        .map(|(label, class)| {
            let [a, b, c] = outcome.scores.column(label).map(|s| format!("{:.4}", s));
            LeaderRow {
                class: class.clone(),
                a,
                b,
                c,
                leader: outcome.leaders.leader(label).to_string(),
            }
        })
        .collect();
    println!("\n{}", "Per-class F1 and leaders:".bold());
    println!("{}", Table::new(rows));

    println!("\n{}", "Decisions:".bold());
    for path in DecisionPath::ALL {
        let count = outcome.decision_stats.count(path);
        let count = if count > 0 && path != DecisionPath::Unanimous {
            count.to_string().yellow()
        } else {
            count.to_string().normal()
        };
        println!("  {:<20} {}", path.name(), count);
    }

    println!(
        "\nLCCDE accuracy: {}  weighted F1: {}",
        format!("{:.4}", outcome.lccde.accuracy).green().bold(),
        format!("{:.4}", outcome.lccde.f1).green().bold()
    );
}

fn write_predictions(path: &Path, dataset: &Dataset, outcome: &ExperimentOutcome) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (&row, fused) in outcome.test_indices.iter().zip(&outcome.predictions) {
        let winner = fused.winner.to_string();
        writer.serialize(PredictionRecord {
            row,
            truth: dataset.label_set.name(dataset.labels[row]),
            predicted: dataset.label_set.name(fused.label),
            winner: &winner,
            path: fused.path.name(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = ExperimentConfig::default();
    let toml_str = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &toml_str)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml_str);
        }
    }

    Ok(())
}
