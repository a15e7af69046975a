use airdrop_core::{
    audit::check_delivered as audit_delivered, config::GasConfig, Airdrop, BatchBuilder,
    BatchContext, LocalSigner, NodeSigner, RpcChainClient, Sender, SignedBatch, Signer,
    TransactionSigner, UnsignedBatch,
};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use eyre::eyre::bail;
use tracing::{info, warn};

use super::{
    files::{read_json, write_json},
    CheckDeliveredArgs, CreateTxsArgs, FilterSentArgs, RpcArgs, SendTxsArgs, SignTxsArgs,
};

async fn connect(rpc: &RpcArgs) -> eyre::Result<DynProvider> {
    let provider = ProviderBuilder::new().connect(&rpc.rpc_url).await?;
    Ok(provider.erased())
}

pub async fn create_txs(args: CreateTxsArgs) -> eyre::Result<()> {
    let airdrops: Vec<Airdrop> = read_json(&args.processed_file)?;
    let chain = RpcChainClient::new(connect(&args.rpc).await?);

    let context = BatchContext {
        sender: args.sender,
        airdropper: args.contracts.airdropper,
        token: args.contracts.token,
        gas: GasConfig::from(&args.gas),
        chain_id: args.chain_id,
    };
    let mut builder = BatchBuilder::new(chain, context);
    if let Some(verification) = args.verify.config(&args.allocation) {
        info!(target: "airdrop::create", block = verification.block_height, "Verifying airdrops against snapshot balances");
        builder = builder.with_verification(verification);
    }

    let transactions = builder.create_txs(&airdrops, args.batch_size).await?;
    write_json(&args.unsigned_file, &transactions)?;

    info!(
        target: "airdrop::create",
        transactions = transactions.len(),
        path = %args.unsigned_file.display(),
        "Wrote unsigned transactions"
    );
    Ok(())
}

async fn sign_with<S: TransactionSigner>(
    signer: S,
    transactions: Vec<UnsignedBatch>,
) -> eyre::Result<Vec<SignedBatch>> {
    Ok(Signer::new(signer).sign_transactions(transactions).await?)
}

pub async fn sign_txs(args: SignTxsArgs) -> eyre::Result<()> {
    let transactions: Vec<UnsignedBatch> = read_json(&args.unsigned_file)?;

    let signed = match args.private_key {
        Some(key) => {
            let address = key.address();
            if let Some(batch) = transactions.iter().find(|batch| batch.tx.from != address) {
                warn!(
                    target: "airdrop::sign",
                    nonce = batch.nonce(),
                    from = %batch.tx.from,
                    %address,
                    "signing key does not match the transaction sender"
                );
            }
            sign_with(LocalSigner::new(key), transactions).await?
        }
        None => sign_with(NodeSigner::new(connect(&args.rpc).await?), transactions).await?,
    };

    write_json(&args.signed_file, &signed)?;
    info!(
        target: "airdrop::sign",
        transactions = signed.len(),
        path = %args.signed_file.display(),
        "Wrote signed transactions"
    );
    Ok(())
}

pub async fn send_txs(args: SendTxsArgs) -> eyre::Result<()> {
    let unsigned: Vec<UnsignedBatch> = read_json(&args.final_check_unsigned_file)?;
    let signed: Vec<SignedBatch> = read_json(&args.signed_file)?;

    let sender =
        Sender::new(RpcChainClient::new(connect(&args.rpc).await?)).with_config(args.delivery()?);

    let (signed, unsigned) = if args.recovery_mode {
        let total = signed.len();
        let (unsent, unsent_unsigned) = sender.recover_unsent(&signed, &unsigned).await?;
        info!(target: "airdrop::recover", total, unsent = unsent.len(), "Filtered out delivered transactions");
        (unsent, unsent_unsigned)
    } else {
        (signed, unsigned)
    };

    sender.send_transactions(&signed, &unsigned).await?;
    info!(target: "airdrop::send", transactions = signed.len(), "All transactions delivered");
    Ok(())
}

pub async fn filter_sent(args: FilterSentArgs) -> eyre::Result<()> {
    let airdrops: Vec<Airdrop> = read_json(&args.processed_file)?;
    let signed: Vec<SignedBatch> = read_json(&args.signed_file)?;

    let sender = Sender::new(RpcChainClient::new(connect(&args.rpc).await?));
    let unsent = sender
        .recover_unsent_airdrops(
            &airdrops,
            &signed,
            args.contracts.airdropper,
            args.contracts.token,
        )
        .await?;

    write_json(&args.unsent_airdrops_file, &unsent)?;
    info!(
        target: "airdrop::recover",
        total = airdrops.len(),
        unsent = unsent.len(),
        path = %args.unsent_airdrops_file.display(),
        "Wrote unsent airdrops"
    );
    Ok(())
}

pub async fn check_delivered(args: CheckDeliveredArgs) -> eyre::Result<()> {
    let airdrops: Vec<Airdrop> = read_json(&args.processed_file)?;
    let chain = RpcChainClient::new(connect(&args.rpc).await?);

    let shortfalls = audit_delivered(&chain, args.token, &airdrops).await?;
    if !shortfalls.is_empty() {
        bail!("{} beneficiaries hold less than their allocation", shortfalls.len());
    }

    info!(target: "airdrop::audit", beneficiaries = airdrops.len(), "Every beneficiary holds its allocation");
    Ok(())
}
