mod baseline;
mod cli;
mod commands;
mod config;
mod detect;
mod geometry;
mod ground_truth;
mod model;
mod scoring;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::model::Judgement;

const EXIT_REGRESSED: i32 = 1;
const EXIT_FAILURE: i32 = 2;

fn main() {
    init_tracing();

    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).map(exit_code_for),
        Commands::List(args) => commands::list::run(args).map(|()| 0),
        Commands::Inspect(args) => commands::inspect::run(args).map(|()| 0),
        Commands::SetBaseline(args) => commands::set_baseline::run(args).map(|()| 0),
        Commands::Clean(args) => commands::clean::run(args).map(|()| 0),
    }
}

fn exit_code_for(judgement: Option<Judgement>) -> i32 {
    match judgement {
        Some(Judgement::Regressed) => EXIT_REGRESSED,
        _ => 0,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
