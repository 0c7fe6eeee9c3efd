//! # ord-mint
//!
//! Builds the commit and reveal transactions needed to mint a child Ordinal
//! inscription with a browser wallet.
//!
//! The commit PSBT funds a Taproot output whose only script leaf carries the
//! inscription envelope. The reveal PSBT spends it through the script path,
//! chains the collection's parent inscription forward (pre-signed with the
//! oracle key) and pays the fee from the user's payment address. Both PSBTs are
//! returned unsigned for the user's inputs, together with the map of which
//! address must sign which input.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ord_mint::provider::{MempoolClient, OrdClient};
//! use ord_mint::{FromEnv, MintConfig, Minter, TraitContentGenerator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MintConfig::from_env()?;
//! let chain = Arc::new(MempoolClient::new(&config.mempool_url));
//! let classifier = Arc::new(OrdClient::new(&config.ord_url));
//! let minter = Minter::new(
//!     config,
//!     chain,
//!     classifier,
//!     Arc::new(TraitContentGenerator::default()),
//! );
//! # let _ = minter;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod config;
mod error;
pub mod inscription;
mod minter;
pub mod provider;
mod result;
pub mod utils;
pub mod utxo;
pub mod wallet;

pub use bitcoin;
pub use config::{FromEnv, MintConfig, OracleKey, RevealFunding};
pub use error::{ErrorCode, ErrorResponse, InscriptionParseError, MintError};
pub use inscription::content::{StaticContentGenerator, TraitContentGenerator, TraitLayer};
pub use inscription::envelope::InscriptionEnvelope;
pub use inscription::iid::InscriptionId;
pub use inscription::{generate_inscription_data, InscriptionData};
pub use minter::{
    BroadcastRevealRequest, BroadcastRevealResult, CommitRequest, Minter, PreparedCommit,
    RevealParams, RevealRequest,
};
pub use result::MintResult;
pub use utils::fees::{estimate_commit_fee, estimate_reveal_fee};
pub use utxo::{Utxo, UtxoSelector};
pub use wallet::builder::commit::{CommitArgs, CommitBuilder, CommitResult};
pub use wallet::builder::reveal::{
    InputSigning, ParentLocator, ParentUtxo, RevealArgs, RevealBuilder, RevealResult,
};
pub use wallet::builder::signer::OracleSigner;
pub use wallet::builder::taproot::TaprootReveal;
pub use wallet::{extract_transaction, finalize_inputs, predict_txid, predict_txid_base64};
