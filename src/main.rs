use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod alignment;
mod clustering;
mod ecc;
mod error;
mod experiment;
mod generate;
mod io;
mod plot;
mod stats;

use clustering::Method;
use ecc::EccParams;
use experiment::ExperimentConfig;

/// Compare k-means, PCA and parity-bit (ECC) feature augmentation on
/// clustering tasks with known ground truth
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Seed for every random draw; the wall clock is used when omitted
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log confusion matrices and per-class scores
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Repeat all four methods on fresh synthetic data and box-plot the accuracies
    Compare {
        #[command(flatten)]
        config: ExperimentConfig,

        /// Directory for the plot and CSV output
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Also write the per-run accuracies and timings as CSV
        #[arg(long)]
        csv: bool,

        /// Skip the plot
        #[arg(long)]
        no_plot: bool,
    },

    /// Sweep the code length T and plot mean accuracy with error bars
    Sweep {
        #[command(flatten)]
        config: ExperimentConfig,

        /// Code lengths to evaluate
        #[arg(long, value_delimiter = ',', default_values_t = [10, 30, 60, 120])]
        code_lengths: Vec<usize>,

        /// Directory for the plot and CSV output
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Also write the summaries as CSV
        #[arg(long)]
        csv: bool,

        /// Skip the plot
        #[arg(long)]
        no_plot: bool,
    },

    /// Run all four methods on a labeled CSV dataset
    Dataset {
        /// Numeric features plus one label column
        #[arg(short, long, value_name = "INPUT.csv")]
        input: PathBuf,

        /// Name of the label column, defaults to the last column
        #[arg(long)]
        label_column: Option<String>,

        /// Number of clusters, defaults to the number of distinct labels
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        #[arg(short = 't', long, default_value_t = 64)]
        code_length: usize,

        #[arg(short = 's', long, default_value_t = 0.5)]
        sample_ratio: f64,

        /// Modulus of the parity reduction, 2 for parity bits
        #[arg(long, default_value_t = 2.0)]
        modulus: f64,

        #[arg(short = 'r', long, default_value_t = 1)]
        runs: usize,
    },

    /// Cluster an unlabeled similarity matrix and dump the members of every cluster
    Cluster {
        /// Square matrix with item ids in the header and first column
        #[arg(short, long, value_name = "INPUT.csv")]
        input: PathBuf,

        /// `id,token,...` lines printed next to each member
        #[arg(short, long, value_name = "META.csv")]
        metadata: Option<PathBuf>,

        #[arg(short = 'k', long)]
        clusters: usize,

        #[arg(short = 't', long, default_value_t = 64)]
        code_length: usize,

        #[arg(short = 's', long, default_value_t = 0.5)]
        sample_ratio: f64,

        /// Modulus of the parity reduction, 2 for parity bits
        #[arg(long, default_value_t = 2.0)]
        modulus: f64,

        #[arg(long, value_enum, default_value_t = Method::Ecc)]
        method: Method,

        /// Directory for the `tmp_clusters<T>` file
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn make_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64)
    });
    info!("seed {seed}");
    StdRng::seed_from_u64(seed)
}

fn print_summary(title: &str, rows: impl Iterator<Item = (Method, f64, f64, f64)>) {
    println!("{title}");
    println!("{:<10}{:>12}{:>12}{:>12}", "method", "accuracy", "std", "seconds");
    for (method, mean, std, seconds) in rows {
        println!("{:<10}{mean:>12.4}{std:>12.4}{seconds:>12.4}", method.name());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Compare {
            config,
            output,
            csv,
            no_plot,
        }) => {
            let mut rng = make_rng(cli.seed);
            info!(?config, "starting comparison");
            let comparison = experiment::compare(config, &mut rng)?;

            print_summary(
                &format!("{} runs", config.runs),
                Method::ALL.iter().map(|&m| {
                    let summary = comparison.summary(m);
                    let seconds = stats::summarize(&comparison.seconds(m));
                    (m, summary.mean, summary.std, seconds.mean)
                }),
            );
            match &comparison.anova {
                Some(anova) => println!(
                    "ANOVA F({}, {})={:.4} p-value={:.2E}",
                    anova.df_between, anova.df_within, anova.statistic, anova.pvalue
                ),
                None => println!("ANOVA undefined"),
            }

            let stem = plot::results_stem(&comparison);
            if *csv {
                let path = output.join(format!("{stem}.csv"));
                io::write_trials_csv(&path, &comparison)
                    .with_context(|| format!("failed to write {path:?}"))?;
                let path = output.join(format!("{stem}_config.csv"));
                io::write_config_csv(&path, config)
                    .with_context(|| format!("failed to write {path:?}"))?;
            }
            if !no_plot {
                plot::plot_boxplot(output.join(format!("{stem}.png")), &comparison)?;
            }
        }
        Some(Commands::Sweep {
            config,
            code_lengths,
            output,
            csv,
            no_plot,
        }) => {
            let mut rng = make_rng(cli.seed);
            info!(?config, ?code_lengths, "starting sweep");
            let sweep = experiment::sweep(config, code_lengths, &mut rng)?;

            for point in &sweep.points {
                print_summary(
                    &format!("T={}", point.code_length),
                    Method::ALL.iter().map(|&m| {
                        let accuracy = point.accuracy[m.index()];
                        (m, accuracy.mean, accuracy.std, point.seconds[m.index()].mean)
                    }),
                );
            }

            let stem = plot::sweep_stem(&sweep);
            if *csv {
                let path = output.join(format!("{stem}.csv"));
                io::write_sweep_csv(&path, &sweep)
                    .with_context(|| format!("failed to write {path:?}"))?;
                let path = output.join(format!("{stem}_config.csv"));
                io::write_config_csv(&path, config)
                    .with_context(|| format!("failed to write {path:?}"))?;
            }
            if !no_plot {
                plot::plot_sweep(output.join(format!("{stem}.png")), &sweep)?;
            }
        }
        Some(Commands::Dataset {
            input,
            label_column,
            clusters,
            code_length,
            sample_ratio,
            modulus,
            runs,
        }) => {
            let data = io::read_labeled_csv(input, label_column.as_deref())
                .with_context(|| format!("failed to read csv file {input:?}"))?;
            let k = clusters.unwrap_or(data.classes.len());
            info!(
                rows = data.features.nrows(),
                features = data.features.ncols(),
                classes = data.classes.len(),
                "loaded dataset"
            );

            let mut rng = make_rng(cli.seed);
            let params = EccParams::new(*code_length, *sample_ratio).with_modulus(*modulus);
            let evaluation = experiment::evaluate_dataset(
                data.features.view(),
                &data.labels,
                k,
                &params,
                *runs,
                &mut rng,
            )?;

            print_summary(
                &format!("{runs} runs on {input:?}"),
                Method::ALL.iter().map(|&m| {
                    let accuracies: Vec<f64> =
                        evaluation.trials.iter().map(|t| t[m.index()].accuracy).collect();
                    let seconds: Vec<f64> = evaluation
                        .trials
                        .iter()
                        .map(|t| t[m.index()].elapsed.as_secs_f64())
                        .collect();
                    let summary = stats::summarize(&accuracies);
                    (m, summary.mean, summary.std, stats::summarize(&seconds).mean)
                }),
            );
            for cluster in &evaluation.report.clusters {
                println!(
                    "cluster {} represents {} ({:.1}% of {} members)",
                    cluster.cluster,
                    data.classes[cluster.majority_label],
                    100.0 * cluster.purity(),
                    cluster.size
                );
            }
            println!(
                "overall accuracy: {:.4} ({} misclassified)",
                evaluation.report.accuracy,
                evaluation.report.misclassified.len()
            );
        }
        Some(Commands::Cluster {
            input,
            metadata,
            clusters,
            code_length,
            sample_ratio,
            modulus,
            method,
            output,
        }) => {
            let (ids, matrix) = io::read_matrix_csv(input)
                .with_context(|| format!("failed to read csv file {input:?}"))?;
            let metadata = match metadata {
                Some(path) => io::read_metadata_csv(path)
                    .with_context(|| format!("failed to read csv file {path:?}"))?,
                None => Default::default(),
            };

            let mut rng = make_rng(cli.seed);
            let params = EccParams::new(*code_length, *sample_ratio).with_modulus(*modulus);
            let members =
                experiment::cluster_unlabeled(matrix.view(), *method, *clusters, &params, &mut rng)?;

            let path = output.join(format!("tmp_clusters{code_length}"));
            io::write_cluster_dump(&path, &members, &ids, &metadata)
                .with_context(|| format!("failed to write {path:?}"))?;
            println!(
                "{} non-empty clusters written to {path:?}",
                members.iter().filter(|m| !m.is_empty()).count()
            );
        }
        None => {}
    }

    Ok(())
}
