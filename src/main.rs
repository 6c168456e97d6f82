mod app;
mod cli;
mod config;
mod core;
mod executors;
mod organizers;
mod output;
mod plugins;
mod reporters;
mod system;
mod ui;
mod utils;

use clap::Parser;
use colored::Colorize;
use crate::core::errors::ReconError;
use crate::core::status::RunStatus;

fn main() {
    human_panic::setup_panic!();

    let cli = cli::args::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{} failed to start async runtime: {}", "fatal:".red().bold(), err);
            std::process::exit(RunStatus::Failed.exit_code());
        }
    };

    let code = match runtime.block_on(app::run(cli)) {
        Ok(status) => status.exit_code(),
        Err(err) => {
            eprintln!("{} {:#}", "fatal:".red().bold(), err);
            match err.downcast_ref::<ReconError>() {
                Some(ReconError::Interrupted) => RunStatus::Interrupted.exit_code(),
                _ => RunStatus::Failed.exit_code(),
            }
        }
    };

    std::process::exit(code);
}
