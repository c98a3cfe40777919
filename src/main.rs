mod analysis;
mod args;

use clap::Parser;
use log::{info, warn};
use snafu::ErrorCompat;

use crate::analysis::{load_config, run_analysis, write_summary, AvResult};
use crate::args::Args;

fn run(args: &Args) -> AvResult<()> {
    let config = load_config(&args.config)?;
    info!("config: {:?}", config);
    let summary = run_analysis(&config)?;
    write_summary(&summary, &args.out)
}

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(e) = run(&args) {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
