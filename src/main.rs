mod blas;
mod cli;
mod error;
mod fdr;
mod ols;
mod pipeline;
mod plan;
mod preprocess;
mod residualize;
mod samples;
mod scan;
mod spearman;
mod table;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::warn;
use rayon::ThreadPoolBuilder;

use cli::{Cli, Command};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(n) = cli.polars_threads {
        // SAFETY: set while the process is single-threaded, before the Rayon pool exists.
        unsafe { std::env::set_var("POLARS_MAX_THREADS", n.to_string()) };
    }

    if let Some(n) = cli.rayon_threads {
        if let Err(err) = ThreadPoolBuilder::new().num_threads(n).build_global() {
            warn!("failed to set Rayon thread pool size: {}", err);
        }
    }

    blas::set_openblas_threads(cli.blas_threads);

    match cli.command {
        Command::Run(args) => pipeline::run(args),
        Command::Preprocess(args) => preprocess::run(args),
        Command::Condition(args) => pipeline::run_condition(args),
        Command::Plan(args) => plan::run(args),
    }
}
