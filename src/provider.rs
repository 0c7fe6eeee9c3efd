//! Services the minting pipeline depends on.
//!
//! Every collaborator is an explicit handle passed to the builders, so tests
//! can swap in in-memory implementations.

mod memory;
mod mempool;
mod ord;

use bitcoin::{Address, FeeRate, OutPoint, ScriptBuf, Transaction, Txid};
use serde::{Deserialize, Serialize};

pub use self::memory::{InMemoryMintIndex, InMemoryRecordStore};
pub use self::mempool::MempoolClient;
pub use self::ord::OrdClient;
use crate::inscription::iid::InscriptionId;
use crate::utxo::Utxo;
use crate::MintResult;

/// Transaction as reported by an esplora-compatible indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub txid: Txid,
    pub vin: Vec<Vin>,
    pub vout: Vec<Vout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vin {
    pub txid: Txid,
    pub vout: u32,
    /// Absent for coinbase inputs.
    #[serde(default)]
    pub prevout: Option<Vout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vout {
    pub scriptpubkey: ScriptBuf,
    pub scriptpubkey_type: String,
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

impl TxInfo {
    /// Outpoints spent by this transaction.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.vin.iter().map(|vin| OutPoint {
            txid: vin.txid,
            vout: vin.vout,
        })
    }
}

/// Chain data: UTXOs, transactions, fees and broadcast.
#[async_trait::async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Unspent outputs currently owned by `address`.
    async fn utxos(&self, address: &Address) -> MintResult<Vec<Utxo>>;

    /// Looks up a transaction; `None` while the indexer has not seen it.
    async fn transaction(&self, txid: &Txid) -> MintResult<Option<TxInfo>>;

    /// Fee rate for next-block confirmation.
    async fn fastest_fee_rate(&self) -> MintResult<FeeRate>;

    /// Broadcasts `transaction` and returns the txid reported by the node.
    async fn broadcast(&self, transaction: &Transaction) -> MintResult<Txid>;
}

/// Assets attached to an output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoAssets {
    #[serde(default)]
    pub inscriptions: Vec<String>,
    #[serde(default)]
    pub runes: Vec<String>,
}

impl UtxoAssets {
    /// Whether the output can be spent as plain payment.
    pub fn is_clean(&self) -> bool {
        self.inscriptions.is_empty() && self.runes.is_empty()
    }
}

/// Reports inscriptions and runes attached to an output.
#[async_trait::async_trait]
pub trait UtxoClassifier: Send + Sync {
    /// Assets of `outpoint`; `None` while the indexer has not seen it.
    async fn assets(&self, outpoint: &OutPoint) -> MintResult<Option<UtxoAssets>>;
}

/// Content produced for a mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Produces inscription content.
///
/// Implementations must be deterministic in `(address, mint_index)`: the reveal
/// is prepared by regenerating the same content the commit committed to.
#[async_trait::async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, address: &str, mint_index: u64) -> MintResult<GeneratedContent>;
}

/// Allocates mint indices.
#[async_trait::async_trait]
pub trait MintIndexAllocator: Send + Sync {
    /// Atomically increments the counter for `address` and returns the new
    /// value. The first mint of an address gets 1.
    async fn get_and_increment(&self, address: &str) -> MintResult<u64>;
}

/// Minted inscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRecord {
    pub inscription_id: InscriptionId,
    pub reveal_txid: Txid,
    pub commit_txid: Txid,
    pub ordinals_address: String,
}

/// Stores minted inscription records.
#[async_trait::async_trait]
pub trait MintRecordStore: Send + Sync {
    async fn save_record(&self, record: &MintRecord) -> MintResult<()>;
}
