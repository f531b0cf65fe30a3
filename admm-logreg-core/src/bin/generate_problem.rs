/*
This program generates a synthetic logistic regression problem and stores the
labeled points in the local filesystem.
*/

extern crate nalgebra as na;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use admm_logreg_core::{
    objective::phi,
    resource::{LocalConfig, ProblemResource, StorageConfig},
    state::LabeledPoint,
    utils::AdmmError,
};
use clap::Parser;
use log::{error, info};
use rand::prelude::*;
use rand_distr::{Bernoulli, StandardNormal};

/// Program to generate labeled points for a sparse logistic regression problem.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The number of training points
    #[arg(short, long)]
    m: usize,

    /// The number of features per point
    #[arg(short, long)]
    n: usize,

    /// The number of non-zero elements in w_true
    #[arg(short, long)]
    k: usize,

    /// The number of held-out points written next to the training set
    #[arg(long, default_value_t = 0)]
    holdout: usize,

    /// Standard deviation of the true margin w_true^T a
    #[arg(long, default_value_t = 3.0)]
    signal: f64,

    /// Seed for the random number generator
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// The prefix for the output files
    #[arg(short, long, default_value_t = ("logreg").to_string())]
    prefix: String,

    /// Directory the dataset is written to
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,
}

fn sample_points<R: Rng>(
    rng: &mut R,
    w_true: &na::DVector<f64>,
    count: usize,
) -> Result<Vec<LabeledPoint>, AdmmError> {
    let n = w_true.len();
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let features = na::DVector::<f64>::from_fn(n, |_, _| rng.sample(StandardNormal));
        let p = phi(w_true.dot(&features));
        let coin = Bernoulli::new(p)
            .map_err(|e| AdmmError::from_string(format!("Failed to create label dist: {}", e)))?;
        let label = if rng.sample(coin) { 1.0 } else { 0.0 };
        points.push(LabeledPoint::new(label, features));
    }
    Ok(points)
}

async fn run(args: Args) -> Result<(), AdmmError> {
    if args.k > args.n {
        return Err(AdmmError::from_string(format!(
            "k ({}) cannot exceed the number of features ({})",
            args.k, args.n
        )));
    }

    let storage_config = StorageConfig::new(LocalConfig::new(&args.data_dir, ""));
    let mut rng = rand::rngs::SmallRng::seed_from_u64(args.seed);

    let w_start = Instant::now();
    let mut w_true = na::DVector::<f64>::zeros(args.n);
    let scale = if args.k > 0 {
        args.signal / (args.k as f64).sqrt()
    } else {
        0.0
    };
    for idx in rand::seq::index::sample(&mut rng, args.n, args.k).into_vec() {
        let value: f64 = rng.sample(StandardNormal);
        w_true[idx] = value * scale;
    }
    info!("[Main] w_true generated in {:?}", w_start.elapsed());

    let points_start = Instant::now();
    let train = sample_points(&mut rng, &w_true, args.m)?;
    let positives = train.iter().filter(|p| p.label == 1.0).count();
    info!(
        "[Main] {} training points generated in {:?} ({} positive)",
        train.len(),
        points_start.elapsed(),
        positives
    );

    let train_resource: ProblemResource<Vec<LabeledPoint>> = ProblemResource::new(
        format!("{}-train", args.prefix),
        &storage_config,
    );
    train_resource.write(&train).await?;
    info!("[Main] Wrote {}", train_resource.local_path().display());

    if args.holdout > 0 {
        let test = sample_points(&mut rng, &w_true, args.holdout)?;
        let test_resource: ProblemResource<Vec<LabeledPoint>> = ProblemResource::new(
            format!("{}-test", args.prefix),
            &storage_config,
        );
        test_resource.write(&test).await?;
        info!("[Main] Wrote {}", test_resource.local_path().display());
    }

    let w_resource: ProblemResource<na::DVector<f64>> = ProblemResource::new(
        format!("{}-w", args.prefix),
        &storage_config,
    );
    w_resource.write(&w_true).await?;
    info!("[Main] Wrote {}", w_resource.local_path().display());

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
