/*
This program trains a logistic regression model with consensus ADMM on a
dataset written by generate_problem.
*/

extern crate nalgebra as na;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use admm_logreg_core::{
    LogisticRegressionModel,
    model::LogisticRegressionWithAdmm,
    objective::logistic_loss,
    problem::{AdmmConfig, StoppingCriteria},
    resource::{LocalConfig, ProblemResource, StorageConfig},
    state::LabeledPoint,
    subproblem::{ExecutionMode, Partitions},
    updater::Regularization,
    utils::AdmmError,
};
use clap::Parser;
use log::{error, info};

/// Program to train a regularized logistic regression with consensus ADMM.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The prefix of the dataset files
    #[arg(short, long, default_value_t = ("logreg").to_string())]
    prefix: String,

    /// Directory the dataset is read from
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// JSON configuration file; command line values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The number of partitions to split the training set into
    #[arg(short = 'k', long, default_value_t = 4)]
    partitions: usize,

    /// The number of ADMM iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Regularization strength
    #[arg(short, long)]
    lambda: Option<f64>,

    /// ADMM penalty parameter
    #[arg(short, long)]
    rho: Option<f64>,

    /// Use L1 instead of L2 regularization
    #[arg(long)]
    l1: bool,

    /// Run the x-update on the calling thread
    #[arg(long)]
    sequential: bool,

    /// Stop once the primal and dual residuals are within tolerance
    #[arg(long)]
    early_stop: bool,

    /// Write timing CSVs with this prefix
    #[arg(short, long)]
    timings: Option<String>,
}

fn build_config(args: &Args) -> Result<AdmmConfig, AdmmError> {
    let mut config = match &args.config {
        Some(path) => AdmmConfig::from_json_file(path)?,
        None => AdmmConfig::default(),
    };
    if let Some(iterations) = args.iterations {
        config.num_iterations = iterations;
    }
    if let Some(lambda) = args.lambda {
        config.lambda = lambda;
    }
    if let Some(rho) = args.rho {
        config.rho = rho;
    }
    if args.l1 {
        config.regularization = Regularization::L1;
    }
    if args.sequential {
        config.execution_mode = ExecutionMode::Sequential;
    }
    if args.early_stop && config.stopping.is_none() {
        config.stopping = Some(StoppingCriteria::default());
    }
    Ok(config)
}

async fn load(prefix: &str, name: &str, storage: &StorageConfig) -> Result<Vec<LabeledPoint>, AdmmError> {
    let resource: ProblemResource<Vec<LabeledPoint>> =
        ProblemResource::new(format!("{}-{}", prefix, name), storage);
    resource.read().await
}

fn report_fit(name: &str, model: &LogisticRegressionModel, points: &[LabeledPoint]) {
    info!(
        "[Main] {} accuracy {:.4}, mean logistic loss {:.6}",
        name,
        model.accuracy(points),
        logistic_loss(points, &model.weights) / points.len().max(1) as f64
    );
}

async fn run(args: Args) -> Result<(), AdmmError> {
    let config = build_config(&args)?;
    info!("[Main] {:?}", config);

    let storage = StorageConfig::new(LocalConfig::new(&args.data_dir, ""));
    let load_start = Instant::now();
    let train = load(&args.prefix, "train", &storage).await?;
    info!("[Main] Loaded {} points in {:?}", train.len(), load_start.elapsed());

    let partitions = Partitions::from_points(train, args.partitions)?;
    let trainer = LogisticRegressionWithAdmm::new(config);
    let mut solver = trainer.solver()?;
    let initial = na::DVector::zeros(partitions.num_features().unwrap_or(0));

    let solve_start = Instant::now();
    let solution = solver.solve(&partitions, &initial).await?;
    info!(
        "[Main] {} iterations in {:?} (stopped early: {})",
        solution.report.iterations_run,
        solve_start.elapsed(),
        solution.report.stopped_early
    );

    let model = LogisticRegressionModel::new(solution.weights);
    let nonzeros = model.weights.iter().filter(|w| **w != 0.0).count();
    info!("[Main] {} of {} weights are non-zero", nonzeros, model.weights.len());
    report_fit("train", &model, &partitions.combine());

    match load(&args.prefix, "test", &storage).await {
        Ok(test) => report_fit("test", &model, &test),
        Err(AdmmError::NotFound(_)) => info!("[Main] No held-out set found"),
        Err(e) => return Err(e),
    }

    solver.print_timing_summary();
    if let Some(prefix) = &args.timings {
        solver.export_all_timings(prefix)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[Main] {}", e);
            ExitCode::FAILURE
        }
    }
}
