use std::str::FromStr;
use std::sync::Arc;

use argh::FromArgs;
use bitcoin::Txid;
use log::{debug, info};
use ord_mint::provider::{MempoolClient, OrdClient};
use ord_mint::{
    BroadcastRevealRequest, CommitRequest, FromEnv, MintConfig, Minter, PreparedCommit,
    RevealParams, RevealRequest, TraitContentGenerator,
};

#[derive(FromArgs, Debug)]
#[argh(description = "Prepare the commit and reveal PSBTs of a child inscription")]
struct Args {
    #[argh(option, short = 'p')]
    /// payment address funding the mint
    payment_address: String,

    #[argh(option, short = 'k')]
    /// payment public key, required for nested segwit addresses
    payment_public_key: Option<String>,

    #[argh(option, short = 'o')]
    /// ordinals address receiving the inscription
    ordinals_address: String,

    #[argh(option, short = 'x')]
    /// ordinals public key, hex
    ordinals_public_key: String,

    #[argh(option, short = 'f')]
    /// fee rate in sat/vB, the provider's fastest rate when absent
    fee_rate: Option<u64>,

    #[argh(option, short = 'i')]
    /// mint index to inscribe; without it the per-process counter starts
    /// at 1 on every run
    mint_index: Option<u64>,

    #[argh(option, short = 'c')]
    /// prepared commit JSON file; prepares the reveal for the broadcast commit
    commit: Option<String>,

    #[argh(option, short = 't')]
    /// txid of the broadcast commit
    commit_txid: Option<String>,

    #[argh(option, short = 's')]
    /// signed reveal PSBT to broadcast, base64
    signed_reveal: Option<String>,
}

/// Reads the config from the environment, see `MintConfig::from_lookup` for
/// the variables.
///
/// Mint indices come from an in-memory counter that lives only as long as the
/// process, so pass `--mint-index` to mint anything but index 1.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = MintConfig::from_env()?;
    let chain = Arc::new(MempoolClient::new(&config.mempool_url));
    let classifier = Arc::new(OrdClient::new(&config.ord_url));
    let minter = Minter::new(
        config,
        chain,
        classifier,
        Arc::new(TraitContentGenerator::default()),
    );
    debug!("oracle address: {}", minter.config().oracle.address());

    let commit_txid = args
        .commit_txid
        .as_deref()
        .map(Txid::from_str)
        .transpose()?;

    match (args.signed_reveal, args.commit, commit_txid) {
        (Some(signed_psbt), _, Some(commit_txid)) => {
            let result = minter
                .broadcast_reveal(BroadcastRevealRequest {
                    signed_psbt,
                    commit_txid,
                    ordinals_address: args.ordinals_address,
                })
                .await?;
            info!("inscription {} minted", result.inscription_id);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        (None, Some(commit), Some(commit_txid)) => {
            let prepared: PreparedCommit =
                serde_json::from_str(&std::fs::read_to_string(commit)?)?;
            let reveal = minter
                .prepare_reveal(RevealRequest {
                    commit_txid,
                    ordinals_address: args.ordinals_address,
                    payment_address: args.payment_address,
                    payment_public_key: args.payment_public_key,
                    reveal: RevealParams::from(&prepared.commit),
                })
                .await?;
            info!(
                "reveal prepared, expected inscription {}",
                reveal.expected_inscription_id
            );
            println!("{}", serde_json::to_string_pretty(&reveal)?);
        }
        (None, None, None) => {
            let prepared = minter
                .prepare_commit(CommitRequest {
                    payment_address: args.payment_address,
                    payment_public_key: args.payment_public_key,
                    ordinals_address: args.ordinals_address,
                    ordinals_public_key: args.ordinals_public_key,
                    fee_rate: args.fee_rate,
                    mint_index: args.mint_index,
                })
                .await?;
            info!(
                "commit prepared for mint {}, fee {}",
                prepared.mint_index, prepared.commit.commit_fee
            );
            println!("{}", serde_json::to_string_pretty(&prepared)?);
        }
        _ => anyhow::bail!("--commit and --signed-reveal both need --commit-txid"),
    }

    Ok(())
}
