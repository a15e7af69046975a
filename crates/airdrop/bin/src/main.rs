#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::process::ExitCode;

use airdrop_core::{AirdropError, ErrorKind};
use clap::Parser;
use eyre::config::HookBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    HookBuilder::default()
        .theme(eyre::config::Theme::new())
        .install()
        .expect("failed to install error handler");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.name();

    match cli.command.run().await {
        Ok(()) => {
            info!(target: "airdrop::cli", command, "Success!");
            ExitCode::SUCCESS
        }
        Err(report) => {
            let kind = report
                .downcast_ref::<AirdropError>()
                .map_or(ErrorKind::Other, AirdropError::kind);
            eprintln!("Error: {report:?}");
            ExitCode::from(kind.exit_code())
        }
    }
}
