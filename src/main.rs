use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use insight_learn::insight_core::{EmptyClusterPolicy, RegressionSummary, ValidationReport};
use insight_learn::utils::validate_weights;
use insight_learn::{
    check_column_kinds, read_csv_file, CategoryEncoder, ConfusionMatrix, FeatureKind, Kmeans,
    Knn, KnnBackend, LearnConfig, LinearModel, MemoryTable, Scaler, ScalingMethod, Statistics,
    Table,
};

#[derive(Parser)]
#[command(name = "insight-learn")]
#[command(author = "Hummer Team")]
#[command(version = "0.1.0")]
#[command(about = "k-means, k-NN and linear regression over mixed tabular data", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputOptions {
    /// Skip the first CSV record
    #[arg(long)]
    headers: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Normalisation: none, minmax or standard (overrides config)
    #[arg(short, long)]
    scaling: Option<ScalingMethod>,

    /// Encode text feature columns as nominal categories
    #[arg(long)]
    encode_text: bool,

    /// Expected kind of every column (float, category or text), comma separated
    #[arg(long, value_delimiter = ',')]
    kinds: Option<Vec<FeatureKind>>,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

impl InputOptions {
    fn load_config(&self) -> insight_learn::Result<LearnConfig> {
        let mut config = match &self.config {
            Some(path) => LearnConfig::load(path)?,
            None => LearnConfig::default(),
        };
        if let Some(scaling) = self.scaling {
            config.scaling = scaling;
        }
        Ok(config)
    }

    /// Reject input whose columns do not have the expected kinds
    fn check_kinds(&self, table: &MemoryTable) -> insight_learn::Result<()> {
        if let Some(kinds) = &self.kinds {
            check_column_kinds(table, kinds).context("unexpected column kinds")?;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster the rows of a CSV file
    Kmeans {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Number of clusters
        #[arg(short)]
        k: Option<usize>,

        /// Seed for centroid initialisation
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        max_iterations: Option<usize>,

        /// Move empty clusters onto a random row instead of keeping them
        #[arg(long)]
        reseed: bool,

        /// Comma separated per-feature weights
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,

        #[command(flatten)]
        input: InputOptions,
    },

    /// Classify rows with k-nearest neighbours; labels are the last column
    Knn {
        /// Labelled training CSV
        #[arg(short, long)]
        train: PathBuf,

        /// Rows to classify; when labelled, a confusion matrix is printed
        #[arg(short = 'q', long)]
        test: PathBuf,

        #[arg(short)]
        k: Option<usize>,

        /// auto, brute-force or kdtree
        #[arg(short, long)]
        backend: Option<KnnBackend>,

        /// Training sets smaller than this skip the index
        #[arg(long)]
        threshold: Option<usize>,

        /// Comma separated per-feature weights (brute force only)
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,

        #[command(flatten)]
        input: InputOptions,
    },

    /// Fit a linear model; the observed value is the last column
    Regress {
        /// Training CSV
        #[arg(short, long)]
        train: PathBuf,

        /// Rows to estimate
        #[arg(short = 'q', long)]
        test: Option<PathBuf>,

        /// Skip the first CSV record
        #[arg(long)]
        headers: bool,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print statistics of every float column
    Describe {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Skip the first CSV record
        #[arg(long)]
        headers: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Kmeans {
            file,
            k,
            seed,
            max_iterations,
            reseed,
            weights,
            input,
        } => {
            let mut config = input.load_config()?;
            if let Some(k) = k {
                config.kmeans.k = k;
            }
            if let Some(seed) = seed {
                config.kmeans.seed = seed;
            }
            if let Some(max_iterations) = max_iterations {
                config.kmeans.max_iterations = max_iterations;
            }
            if reseed {
                config.kmeans.empty_clusters = EmptyClusterPolicy::Reseed;
            }

            let mut data = load(&file, input.headers)?;
            input.check_kinds(&data)?;
            if input.encode_text {
                let encoder = CategoryEncoder::fit_text_columns(&data, data.width())?;
                encoder.transform(&mut data)?;
            }
            Scaler::fit_transform(&mut data, config.scaling)?;

            let mut kmeans = Kmeans::from_config(&config.kmeans);
            if let Some(weights) = weights {
                validate_weights(&weights, data.width())?;
                kmeans = kmeans.with_weights(weights);
            }

            let result = kmeans.fit(&data)?;
            if input.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result);
                if !result.converged {
                    println!("(stopped after {} iterations)", result.iterations);
                }
                for (cluster, size) in result.cluster_sizes().iter().enumerate() {
                    println!("cluster {}: {} rows", cluster, size);
                }
            }
        }

        Commands::Knn {
            train,
            test,
            k,
            backend,
            threshold,
            weights,
            input,
        } => {
            let mut config = input.load_config()?;
            if let Some(k) = k {
                config.knn.k = k;
            }
            if let Some(backend) = backend {
                config.knn.backend = backend;
            }
            if let Some(threshold) = threshold {
                config.knn.brute_force_threshold = threshold;
            }

            let mut train_data = load(&train, input.headers)?;
            input.check_kinds(&train_data)?;
            let mut test_data = load(&test, input.headers)?;
            let n_features = train_data.width().saturating_sub(1);
            prepare_pair(
                &mut train_data,
                &mut test_data,
                n_features,
                config.scaling,
                input.encode_text,
            )?;

            let mut knn = Knn::from_config(&config.knn);
            if let Some(weights) = weights {
                validate_weights(&weights, n_features)?;
                knn = knn.with_weights(weights);
            }
            let classifier = knn.fit(&train_data)?;
            let predictions = classifier.predict(&test_data)?;

            let labelled = test_data.width() == train_data.width();
            let matrix = if labelled {
                Some(ConfusionMatrix::new(&test_data, &predictions)?)
            } else {
                None
            };

            if input.json {
                let output = KnnOutput {
                    backend: classifier.backend(),
                    predictions: &predictions,
                    accuracy: matrix.as_ref().map(ConfusionMatrix::accuracy),
                    report: matrix.as_ref().map(ConfusionMatrix::report),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("backend: {}", classifier.backend());
                match matrix {
                    Some(matrix) => {
                        println!("{}", matrix);
                        for (label, v) in matrix.report() {
                            println!(
                                "{:>18}: precision {:.4}, recall {:.4}",
                                label, v.precision, v.recall
                            );
                        }
                    }
                    None => {
                        for (i, label) in predictions.iter().enumerate() {
                            println!("{}\t{}", i, label);
                        }
                    }
                }
            }
        }

        Commands::Regress {
            train,
            test,
            headers,
            json,
        } => {
            let train_data = load(&train, headers)?;
            let model = LinearModel::fit(&train_data)?;
            let predictions = match &test {
                Some(path) => model.predict(&load(path, headers)?)?,
                None => Vec::new(),
            };

            if json {
                let output = RegressOutput {
                    model: model.summary(),
                    predictions: &predictions,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let terms: Vec<String> = model
                    .coefficients()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{:+.6}*x{}", c, i + 1))
                    .collect();
                println!("y = {:.6} {}", model.intercept(), terms.join(" "));
                for (i, y) in predictions.iter().enumerate() {
                    println!("{}\t{:.6}", i, y);
                }
            }
        }

        Commands::Describe { file, headers } => {
            let data = load(&file, headers)?;
            println!("{} rows, {} columns", data.len(), data.width());
            let kinds: Vec<String> = data.column_kinds().iter().map(|k| k.to_string()).collect();
            println!("kinds: {}", kinds.join(", "));
            for stats in Statistics::describe(&data)? {
                print_stats(&stats);
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct KnnOutput<'a> {
    backend: KnnBackend,
    predictions: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ValidationReport>,
}

#[derive(Serialize)]
struct RegressOutput<'a> {
    model: RegressionSummary,
    predictions: &'a [f64],
}

fn load(path: &Path, headers: bool) -> insight_learn::Result<MemoryTable> {
    read_csv_file(path, headers).with_context(|| format!("loading {}", path.display()))
}

/// Encode and scale test data with parameters learned from the training data
fn prepare_pair(
    train: &mut MemoryTable,
    test: &mut MemoryTable,
    n_features: usize,
    scaling: ScalingMethod,
    encode_text: bool,
) -> insight_learn::Result<()> {
    if encode_text {
        let encoder = CategoryEncoder::fit_text_columns(&*train, n_features)?;
        encoder.transform(train)?;
        encoder.transform(test)?;
    }
    let scaler = Scaler::fit(&*train, scaling)?;
    scaler.transform(train)?;
    scaler.transform(test)?;
    Ok(())
}

fn print_stats(stats: &Statistics) {
    println!("\n=== Statistics for column {} ===", stats.column);
    println!("Count: {}", stats.count);
    println!("Sum:   {:.2}", stats.sum);
    println!("Mean:  {:.2}", stats.mean);
    println!("Std:   {:.2}", stats.std);
    println!("Min:   {:.2}", stats.min);
    println!("Max:   {:.2}", stats.max);
}
