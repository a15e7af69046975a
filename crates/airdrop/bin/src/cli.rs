use std::{path::PathBuf, time::Duration};

use airdrop_core::config::{
    AllocationParams, DeliveryConfig, GasConfig, VerificationConfig, DEAD,
    DEFAULT_BATCH_SIZE, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE, DEFAULT_GAS_RESERVE,
    DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT, DEFAULT_REMAINDER_BOUND, DEFAULT_TOLERANCE,
};
use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use clap::{Args, Parser};
use eyre::eyre::bail;

pub mod files;
pub mod process;
pub mod transactions;

/// Off-chain orchestration of a proportional token airdrop.
///
/// The pipeline runs in stages, each reading the previous stage's file:
///  - `process-balances`: state dump -> allocation file.
///  - `create-txs`: allocation file -> unsigned transactions.
///  - `sign-txs`: unsigned -> signed transactions.
///  - `send-txs`: verify and broadcast signed transactions, optionally resuming a run.
///  - `filter-sent`: allocation entries not yet delivered by a previous run.
#[derive(Debug, Clone, Parser)]
#[clap(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Parser)]
pub enum Commands {
    /// Computes the allocation file from a node state dump.
    ProcessBalances(ProcessBalancesArgs),
    /// Batches the allocation into unsigned `multisend` transactions.
    CreateTxs(CreateTxsArgs),
    /// Signs unsigned transactions with a local key or through the node.
    SignTxs(SignTxsArgs),
    /// Verifies signed transactions against their unsigned counterparts and sends them.
    SendTxs(SendTxsArgs),
    /// Writes the allocation entries not delivered by the given signed transactions.
    FilterSent(FilterSentArgs),
    /// Recomputes an allocation file from the state dump it was derived from.
    CheckAllocation(CheckAllocationArgs),
    /// Compares on-chain token balances to an allocation file.
    CheckDelivered(CheckDeliveredArgs),
}

impl Commands {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProcessBalances(_) => "process-balances",
            Self::CreateTxs(_) => "create-txs",
            Self::SignTxs(_) => "sign-txs",
            Self::SendTxs(_) => "send-txs",
            Self::FilterSent(_) => "filter-sent",
            Self::CheckAllocation(_) => "check-allocation",
            Self::CheckDelivered(_) => "check-delivered",
        }
    }

    pub async fn run(self) -> eyre::Result<()> {
        match self {
            Self::ProcessBalances(args) => process::process_balances(args),
            Self::CreateTxs(args) => transactions::create_txs(args).await,
            Self::SignTxs(args) => transactions::sign_txs(args).await,
            Self::SendTxs(args) => transactions::send_txs(args).await,
            Self::FilterSent(args) => transactions::filter_sent(args).await,
            Self::CheckAllocation(args) => process::check_allocation(args),
            Self::CheckDelivered(args) => transactions::check_delivered(args).await,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RpcArgs {
    /// The RPC URL of the node.
    #[clap(long, env = "RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct ContractArgs {
    /// Address of the airdropper contract.
    #[clap(long, env = "AIRDROPPER_ADDRESS")]
    pub airdropper: Address,
    /// Address of the token being distributed.
    #[clap(long, env = "TOKEN_ADDRESS")]
    pub token: Address,
}

#[derive(Debug, Clone, Args)]
pub struct AllocationArgs {
    /// Balances at or below the cutoff are not eligible.
    #[clap(long, env = "AIRDROP_CUTOFF", default_value = "100000000000000000")]
    pub cutoff: U256,
    /// Total amount distributed, burn remainder included.
    #[clap(long, env = "AIRDROP_BUDGET", default_value = "7012269912256639039461982")]
    pub budget: U256,
    /// Maximum deviation between balance and airdrop shares.
    #[clap(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,
    /// Largest remainder the burn address may receive.
    #[clap(long, default_value_t = DEFAULT_REMAINDER_BOUND)]
    pub remainder_bound: U256,
    /// Receives the rounding remainder.
    #[clap(long, default_value_t = DEAD)]
    pub burn_address: Address,
    /// Expected sum of all snapshot balances.
    #[clap(long, env = "AIRDROP_EXPECTED_TOTAL")]
    pub expected_total: Option<U256>,
    /// Expected sum of the eligible snapshot balances.
    #[clap(long, env = "AIRDROP_EXPECTED_ELIGIBLE_SUM")]
    pub expected_eligible_sum: Option<U256>,
}

impl AllocationArgs {
    pub fn params(&self) -> eyre::Result<AllocationParams> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            bail!("tolerance must be positive, got {}", self.tolerance);
        }
        if self.budget.is_zero() {
            bail!("budget must be positive");
        }

        Ok(AllocationParams {
            cutoff: self.cutoff,
            budget: self.budget,
            tolerance: self.tolerance,
            remainder_bound: self.remainder_bound,
            burn_address: self.burn_address,
            expected_total: self.expected_total,
            expected_eligible_sum: self.expected_eligible_sum,
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct GasArgs {
    /// Gas ceiling of a full batch.
    #[clap(long, env = "GAS_LIMIT", default_value_t = DEFAULT_GAS_LIMIT)]
    pub gas_limit: u64,
    /// Gas price of every transaction, in wei.
    #[clap(long, env = "GAS_PRICE", default_value_t = DEFAULT_GAS_PRICE)]
    pub gas_price: u128,
    /// Added on top of the gas limit in every transaction.
    #[clap(long, env = "GAS_RESERVE", default_value_t = DEFAULT_GAS_RESERVE)]
    pub gas_reserve: u64,
}

impl From<&GasArgs> for GasConfig {
    fn from(args: &GasArgs) -> Self {
        Self {
            gas_limit: args.gas_limit,
            gas_price: args.gas_price,
            gas_reserve: args.gas_reserve,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Cross-check every airdrop against the balance at the snapshot block.
    #[clap(long)]
    pub verify_eth: bool,
    /// Block the snapshot was taken at.
    #[clap(long, env = "BALANCES_BLOCKHEIGHT", default_value_t = 3_988_888)]
    pub block_height: u64,
    /// Sum of the eligible balances at the snapshot block.
    #[clap(
        long,
        env = "TOTAL_ETH_ABOVE_CUTOFF",
        default_value = "93091923180803405175440246"
    )]
    pub eligible_total: U256,
}

impl VerifyArgs {
    pub fn config(&self, allocation: &AllocationArgs) -> Option<VerificationConfig> {
        self.verify_eth.then(|| VerificationConfig {
            block_height: self.block_height,
            eligible_total: self.eligible_total,
            budget: allocation.budget,
            tolerance: allocation.tolerance,
            burn_address: allocation.burn_address,
        })
    }
}

#[derive(Debug, Clone, Parser)]
pub struct ProcessBalancesArgs {
    #[clap(flatten)]
    pub allocation: AllocationArgs,
    /// Node state dump to read balances from.
    pub balances_file: PathBuf,
    /// Where to write the allocation.
    pub processed_file: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct CheckAllocationArgs {
    #[clap(flatten)]
    pub allocation: AllocationArgs,
    /// Allocation file to verify.
    pub processed_file: PathBuf,
    /// Node state dump the allocation was computed from.
    pub balances_file: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct CreateTxsArgs {
    #[clap(flatten)]
    pub rpc: RpcArgs,
    #[clap(flatten)]
    pub contracts: ContractArgs,
    #[clap(flatten)]
    pub gas: GasArgs,
    #[clap(flatten)]
    pub allocation: AllocationArgs,
    #[clap(flatten)]
    pub verify: VerifyArgs,
    /// Owner of the airdropper contract, sending every batch.
    #[clap(long, env = "SIGNER_ADDRESS")]
    pub sender: Address,
    /// Number of airdrops per transaction.
    #[clap(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// EIP-155 chain id to sign for. Unprotected transactions when unset.
    #[clap(long, env = "CHAIN_ID")]
    pub chain_id: Option<u64>,
    /// Allocation file to batch.
    pub processed_file: PathBuf,
    /// Where to write the unsigned transactions.
    pub unsigned_file: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct SignTxsArgs {
    #[clap(flatten)]
    pub rpc: RpcArgs,
    /// Sign locally with this key instead of asking the node.
    #[clap(long, env = "PRIVATE_KEY")]
    pub private_key: Option<PrivateKeySigner>,
    /// Unsigned transactions to sign.
    pub unsigned_file: PathBuf,
    /// Where to write the signed transactions.
    pub signed_file: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct SendTxsArgs {
    #[clap(flatten)]
    pub rpc: RpcArgs,
    /// Filter out transactions already sent and mined, to recover from a crash.
    #[clap(long)]
    pub recovery_mode: bool,
    /// How long to wait for each receipt, in seconds.
    #[clap(long, env = "RECEIPT_TIMEOUT", default_value_t = DEFAULT_RECEIPT_TIMEOUT.as_secs())]
    pub receipt_timeout: u64,
    /// Receipt polling interval, in milliseconds.
    #[clap(long, env = "POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval: u64,
    /// Locally created unsigned transactions, checked against the signed ones.
    pub final_check_unsigned_file: PathBuf,
    /// Signed transactions to send.
    pub signed_file: PathBuf,
}

impl SendTxsArgs {
    pub fn delivery(&self) -> eyre::Result<DeliveryConfig> {
        if self.poll_interval == 0 {
            bail!("poll interval must be positive");
        }
        Ok(DeliveryConfig {
            receipt_timeout: Duration::from_secs(self.receipt_timeout),
            poll_interval: Duration::from_millis(self.poll_interval),
        })
    }
}

#[derive(Debug, Clone, Parser)]
pub struct FilterSentArgs {
    #[clap(flatten)]
    pub rpc: RpcArgs,
    #[clap(flatten)]
    pub contracts: ContractArgs,
    /// The original allocation file.
    pub processed_file: PathBuf,
    /// Signed transactions of the previous run.
    pub signed_file: PathBuf,
    /// Where to write the allocation entries still to be delivered.
    pub unsent_airdrops_file: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct CheckDeliveredArgs {
    #[clap(flatten)]
    pub rpc: RpcArgs,
    /// Address of the token being distributed.
    #[clap(long, env = "TOKEN_ADDRESS")]
    pub token: Address,
    /// Allocation file to check.
    pub processed_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn send_txs_positional_files() {
        let cli = Cli::parse_from([
            "airdrop",
            "send-txs",
            "--recovery-mode",
            "--rpc-url",
            "http://node:8545",
            "unsigned.json",
            "signed.json",
        ]);

        let Commands::SendTxs(args) = cli.command else {
            panic!("expected send-txs");
        };
        assert!(args.recovery_mode);
        assert_eq!(args.rpc.rpc_url, "http://node:8545");
        assert_eq!(args.final_check_unsigned_file, PathBuf::from("unsigned.json"));
        assert_eq!(args.signed_file, PathBuf::from("signed.json"));

        let delivery = args.delivery().unwrap();
        assert_eq!(delivery.receipt_timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn create_txs_defaults() {
        let cli = Cli::parse_from([
            "airdrop",
            "create-txs",
            "--airdropper",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "--token",
            "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
            "--sender",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "processed.json",
            "unsigned.json",
        ]);

        let Commands::CreateTxs(args) = cli.command else {
            panic!("expected create-txs");
        };
        assert_eq!(args.batch_size, 100);
        assert_eq!(GasConfig::from(&args.gas).transaction_gas(), Some(3_700_000));
        assert_eq!(
            args.sender,
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert!(args.verify.config(&args.allocation).is_none());
    }

    #[test]
    fn verification_inherits_budget_and_tolerance() {
        let cli = Cli::parse_from([
            "airdrop",
            "create-txs",
            "--airdropper",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "--token",
            "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
            "--sender",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "--verify-eth",
            "--budget",
            "1000",
            "processed.json",
            "unsigned.json",
        ]);

        let Commands::CreateTxs(args) = cli.command else {
            panic!("expected create-txs");
        };
        let verification = args.verify.config(&args.allocation).unwrap();
        assert_eq!(verification.block_height, 3_988_888);
        assert_eq!(verification.budget, U256::from(1000));
        assert_eq!(verification.tolerance, DEFAULT_TOLERANCE);
    }

    #[test]
    fn allocation_params_are_validated() {
        let cli = Cli::parse_from([
            "airdrop",
            "process-balances",
            "--tolerance",
            "0",
            "dump.json",
            "processed.json",
        ]);

        let Commands::ProcessBalances(args) = cli.command else {
            panic!("expected process-balances");
        };
        assert!(args.allocation.params().is_err());
    }
}
