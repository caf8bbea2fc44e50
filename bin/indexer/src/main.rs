#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/evm-indexer/evm-indexer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod cli;
pub mod commands;
pub mod flags;

use clap::Parser;

fn main() {
    indexer_cli::backtrace::enable();
    // A missing .env file is fine, the environment and flags still apply.
    let _ = dotenvy::dotenv();

    if let Err(err) = cli::Cli::parse().run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
