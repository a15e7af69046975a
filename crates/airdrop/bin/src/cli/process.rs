use airdrop_core::{allocate, audit::verify_allocation, snapshot::load_state_dump, Airdrop};
use tracing::info;

use super::{
    files::{read_json, read_string, write_json},
    CheckAllocationArgs, ProcessBalancesArgs,
};

pub fn process_balances(args: ProcessBalancesArgs) -> eyre::Result<()> {
    let params = args.allocation.params()?;
    let balances = load_state_dump(&read_string(&args.balances_file)?)?;

    let airdrops = allocate(&balances, &params)?;
    write_json(&args.processed_file, &airdrops)?;

    info!(
        target: "airdrop::allocation",
        entries = airdrops.len(),
        path = %args.processed_file.display(),
        "Wrote allocation"
    );
    Ok(())
}

pub fn check_allocation(args: CheckAllocationArgs) -> eyre::Result<()> {
    let params = args.allocation.params()?;
    let balances = load_state_dump(&read_string(&args.balances_file)?)?;
    let airdrops: Vec<Airdrop> = read_json(&args.processed_file)?;

    let checked = verify_allocation(&airdrops, &balances, &params)?;
    info!(target: "airdrop::audit", checked, "Allocation matches the snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use airdrop_core::{config::DEAD, AirdropError, ErrorKind};
    use alloy_primitives::{address, U256};
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    const DUMP: &str = r#"{
        "root": "0x00",
        "state": {
            "0x1000000000000000000000000000000000000001": { "balance": "300" },
            "0x2000000000000000000000000000000000000002": { "balance": "100" },
            "0x3000000000000000000000000000000000000003": { "balance": "200" },
            "0x4000000000000000000000000000000000000004": { "balance": "0x" }
        }
    }"#;

    fn command(args: &[&str]) -> Commands {
        Cli::parse_from(std::iter::once("airdrop").chain(args.iter().copied())).command
    }

    fn write_dump(dir: &Path) -> eyre::Result<String> {
        let path = dir.join("dump.json");
        std::fs::write(&path, DUMP)?;
        Ok(path.display().to_string())
    }

    #[tokio::test]
    async fn allocation_is_written_and_checked() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = write_dump(dir.path())?;
        let processed = dir.path().join("processed.json").display().to_string();

        command(&[
            "process-balances",
            "--cutoff",
            "100",
            "--budget",
            "1000",
            &dump,
            &processed,
        ])
        .run()
        .await?;

        let airdrops: Vec<Airdrop> = read_json(Path::new(&processed))?;
        assert_eq!(
            airdrops,
            vec![
                Airdrop::new(
                    address!("1000000000000000000000000000000000000001"),
                    U256::from(600)
                ),
                Airdrop::new(
                    address!("3000000000000000000000000000000000000003"),
                    U256::from(400)
                ),
                Airdrop::new(DEAD, U256::ZERO),
            ]
        );

        command(&[
            "check-allocation",
            "--cutoff",
            "100",
            "--budget",
            "1000",
            &processed,
            &dump,
        ])
        .run()
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn cutoff_off_the_snapshot_is_a_configuration_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = write_dump(dir.path())?;
        let processed = dir.path().join("processed.json").display().to_string();

        let report = command(&[
            "process-balances",
            "--cutoff",
            "150",
            "--budget",
            "1000",
            &dump,
            &processed,
        ])
        .run()
        .await
        .unwrap_err();

        let err = report.downcast_ref::<AirdropError>().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!Path::new(&processed).exists());
        Ok(())
    }
}
