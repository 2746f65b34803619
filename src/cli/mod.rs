//! Command-line interface for adaptive clustering selection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::{
    load_centroids_csv, load_embeddings_csv, load_labels_csv, load_scores_csv,
};
use crate::core::writers::{write_json, write_labels_csv};
use crate::core::LabelAssignment;
use crate::processors::{
    CandidateKind, CandidateSet, ClusteringAlgorithm, DbscanClustering, EvaluationReport,
    PrecomputedClustering, QualityMetricsCalculator, QualityScorer, SelectionPolicy,
};
use crate::SelectorConfig;

/// File name of the selection record written by `select`.
pub const SELECTION_FILE: &str = "adaptive_clustering_selection.json";
/// File name of the chosen labels written by `select`.
pub const SELECTED_LABELS_FILE: &str = "selected_labels.csv";

#[derive(Parser)]
#[command(name = "adaptive-clustering")]
#[command(about = "Adaptive clustering selection and quality evaluation", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Choose between density and centroid clustering of an embedding set
    Select {
        /// Embeddings CSV (header row, one column per dimension)
        embeddings: PathBuf,
        /// Labels from the centroid (k-means) run
        #[arg(long)]
        centroid_labels: PathBuf,
        /// Centroids from the centroid run (derived from labels when absent)
        #[arg(long)]
        centroid_centroids: Option<PathBuf>,
        /// Labels from an external density run; DBSCAN runs when absent
        #[arg(long)]
        density_labels: Option<PathBuf>,
        /// Output directory for the selection record and labels
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Evaluate a labeling (separation, coherence, balance)
    Evaluate {
        /// Embeddings CSV
        embeddings: PathBuf,
        /// Labels CSV with a `label` column
        labels: PathBuf,
        /// Auxiliary per-item scores CSV with a `score` column
        #[arg(long)]
        scores: Option<PathBuf>,
        /// Write the evaluation record to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print validity indices and the composite score of a labeling
    Metrics {
        /// Embeddings CSV
        embeddings: PathBuf,
        /// Labels CSV with a `label` column
        labels: PathBuf,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination YAML file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Select {
            embeddings,
            centroid_labels,
            centroid_centroids,
            density_labels,
            output_dir,
        } => cmd_select(
            &embeddings,
            &centroid_labels,
            centroid_centroids.as_deref(),
            density_labels.as_deref(),
            output_dir,
            &config,
        ),
        Commands::Evaluate {
            embeddings,
            labels,
            scores,
            output,
        } => cmd_evaluate(&embeddings, &labels, scores.as_deref(), output.as_deref(), &config),
        Commands::Metrics { embeddings, labels } => cmd_metrics(&embeddings, &labels, &config),
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    });

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<SelectorConfig> {
    match path {
        Some(path) => {
            let config = SelectorConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(SelectorConfig::default()),
    }
}

fn load_labels(path: &Path, n: usize) -> Result<LabelAssignment> {
    let raw = load_labels_csv(path)
        .with_context(|| format!("Failed to load labels from {}", path.display()))?;
    LabelAssignment::new(raw, n).with_context(|| format!("Invalid labels in {}", path.display()))
}

fn cmd_select(
    embeddings_path: &Path,
    centroid_labels: &Path,
    centroid_centroids: Option<&Path>,
    density_labels: Option<&Path>,
    output_dir: Option<PathBuf>,
    config: &SelectorConfig,
) -> Result<()> {
    let start = Instant::now();

    let embeddings = load_embeddings_csv(embeddings_path)
        .with_context(|| format!("Failed to load embeddings from {}", embeddings_path.display()))?;
    let n = embeddings.len();

    let labels = load_labels_csv(centroid_labels)
        .with_context(|| format!("Failed to load labels from {}", centroid_labels.display()))?;
    let mut centroid = PrecomputedClustering::new("k-means", CandidateKind::Centroid, labels)
        .with_expected_clusters(config.centroid.k_for(n));
    if let Some(path) = centroid_centroids {
        let centroids = load_centroids_csv(path)
            .with_context(|| format!("Failed to load centroids from {}", path.display()))?;
        centroid = centroid.with_centroids(centroids);
    }

    let density: Box<dyn ClusteringAlgorithm> = match density_labels {
        Some(path) => {
            let labels = load_labels_csv(path)
                .with_context(|| format!("Failed to load labels from {}", path.display()))?;
            Box::new(PrecomputedClustering::new(
                "HDBSCAN",
                CandidateKind::Density,
                labels,
            ))
        }
        None => Box::new(DbscanClustering::new(
            config.density.eps,
            config.density.min_samples_for(n),
        )),
    };

    let effective_output_dir = output_dir.unwrap_or_else(|| {
        embeddings_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    println!("Running adaptive clustering selection...");
    println!("Input: {} ({} samples, {} dims)", embeddings_path.display(), n, embeddings.dim());
    println!("Output directory: {}", effective_output_dir.display());

    let spinner = create_spinner("Comparing clustering candidates...");
    let policy = SelectionPolicy::new(config.clone())?;
    let decision = policy.select(&embeddings, &CandidateSet::new(density.as_ref(), &centroid));
    spinner.finish_and_clear();
    let decision = decision.context("Selection failed")?;

    let record_path = effective_output_dir.join(SELECTION_FILE);
    let labels_path = effective_output_dir.join(SELECTED_LABELS_FILE);
    write_json(&record_path, &decision)?;
    write_labels_csv(&labels_path, decision.chosen.labels.as_slice())?;

    let mut items = vec![
        ("Selected method", decision.chosen.method.clone()),
        ("Quality score", format!("{:.3}", decision.chosen.composite_score())),
        ("Clusters", decision.chosen.metrics.cluster_count.to_string()),
        ("Noise ratio", format!("{:.3}", decision.chosen.noise_ratio())),
    ];
    for entry in decision.comparison.iter().filter(|e| e.method != decision.chosen.method) {
        items.push(("Runner-up", format!("{} ({:.3})", entry.method, entry.quality_score)));
    }
    for failure in &decision.failures {
        items.push(("Not compared", format!("{}: {}", failure.method, failure.reason)));
    }
    items.push(("Record", record_path.display().to_string()));
    items.push(("Labels", labels_path.display().to_string()));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Selection Complete", &items);
    println!("{}", decision.justification);
    Ok(())
}

fn cmd_evaluate(
    embeddings_path: &Path,
    labels_path: &Path,
    scores_path: Option<&Path>,
    output: Option<&Path>,
    config: &SelectorConfig,
) -> Result<()> {
    let start = Instant::now();

    let embeddings = load_embeddings_csv(embeddings_path)
        .with_context(|| format!("Failed to load embeddings from {}", embeddings_path.display()))?;
    let labels = load_labels(labels_path, embeddings.len())?;
    let scores = match scores_path {
        Some(path) => Some(
            load_scores_csv(path)
                .with_context(|| format!("Failed to load scores from {}", path.display()))?,
        ),
        None => None,
    };

    let spinner = create_spinner("Evaluating clustering...");
    let result = EvaluationReport::new(config.evaluation.clone()).evaluate(
        &embeddings,
        &labels,
        scores.as_deref(),
    );
    spinner.finish_and_clear();
    let result = result.context("Evaluation failed")?;

    if let Some(path) = output {
        write_json(path, &result)?;
        info!("Evaluation written to {}", path.display());
    }

    let mut items = vec![
        ("Clusters", result.cluster_count.to_string()),
        ("Noise points", result.noise_count.to_string()),
        ("Separation", format!("{:.3}", result.separation_score)),
        ("Intra variance", format!("{:.4}", result.intra_cluster_variance)),
        ("Inter distance", format!("{:.4}", result.avg_inter_cluster_distance)),
        ("Balance", format!("{:.3}", result.balance_score)),
        ("Silhouette", format!("{:.3}", result.silhouette)),
        ("Davies-Bouldin", format!("{:.3}", result.davies_bouldin)),
    ];
    if let Some(coherence) = result.score_coherence {
        items.push(("Score coherence", format!("{:.3}", coherence)));
    }
    items.push(("Overall", result.assessment.overall.to_string()));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Evaluation Complete", &items);

    for s in &result.assessment.strengths {
        println!("  + {}", s);
    }
    for w in &result.assessment.weaknesses {
        println!("  - {}", w);
    }
    for r in &result.assessment.recommendations {
        println!("  > {}", r);
    }
    Ok(())
}

fn cmd_metrics(embeddings_path: &Path, labels_path: &Path, config: &SelectorConfig) -> Result<()> {
    let embeddings = load_embeddings_csv(embeddings_path)
        .with_context(|| format!("Failed to load embeddings from {}", embeddings_path.display()))?;
    let labels = load_labels(labels_path, embeddings.len())?;

    let scorer = QualityScorer::new(config.normalization.clone());
    let raw = QualityMetricsCalculator::new().compute(&embeddings, &labels);
    let sub = scorer.sub_scores(&raw);
    let metrics = scorer.apply(raw, &config.weights);

    print_summary(
        "Clustering Quality",
        &[
            ("Clusters", metrics.cluster_count.to_string()),
            ("Noise ratio", format!("{:.3}", metrics.noise_ratio)),
            ("Silhouette", format!("{:.3} ({:.3})", metrics.silhouette, sub.silhouette)),
            (
                "Calinski-Harabasz",
                format!("{:.1} ({:.3})", metrics.calinski_harabasz, sub.calinski_harabasz),
            ),
            (
                "Davies-Bouldin",
                format!("{:.3} ({:.3})", metrics.davies_bouldin, sub.davies_bouldin),
            ),
            ("Cluster balance", format!("{:.3}", sub.cluster_balance)),
            ("Composite score", format!("{:.3}", metrics.composite_score)),
        ],
    );
    Ok(())
}

fn cmd_init_config(path: &Path, config: &SelectorConfig) -> Result<()> {
    config
        .to_yaml(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Configuration written to {}", path.display());
    Ok(())
}
