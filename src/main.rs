mod args;
mod rar;

use clap::Parser;
use log::{debug, LevelFilter};
use snafu::ErrorCompat;

use crate::args::{Args, Command};
use crate::rar::config_reader::read_config;
use crate::rar::*;

fn run(args: Args) -> RarResult<()> {
    let mut config = read_config(args.config.as_deref())?;
    if let Some(sheet) = args.sheet {
        config.sheet_path = sheet;
    }
    debug!("run: config: {:?}", config);
    match args.command {
        Command::SetupHeaders => run_setup_headers(&config).map(|_| ()),
        Command::VerifyHeaders { worksheet, diff } => run_verify_headers(&config, worksheet, diff),
        Command::BackfillIds => run_backfill_ids(&config).map(|_| ()),
        Command::Append { input } => run_append(&config, input.as_deref()),
        Command::Submit {
            answers,
            token,
            fresh,
        } => run_submit(&config, answers.as_deref(), token, fresh),
        Command::ClearDraft => run_clear_draft(&config),
    }
}

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    debug!("args: {:?}", args);

    if let Err(e) = run(args) {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
