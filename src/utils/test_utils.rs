use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, Secp256k1};
use bitcoin::secp256k1::SecretKey;
use bitcoin::{
    Address, Amount, FeeRate, Network, OutPoint, PrivateKey, PublicKey, Transaction, Txid,
    XOnlyPublicKey,
};

use crate::inscription::{generate_inscription_data, InscriptionData, InscriptionRequest};
use crate::provider::{ChainDataProvider, TxInfo, UtxoAssets, UtxoClassifier};
use crate::utils::retry::RetryPolicy;
use crate::utxo::Utxo;
use crate::{MintError, MintResult, OracleKey, RevealFunding, StaticContentGenerator};

// <https://mempool.space/testnet/address/tb1qzc8dhpkg5e4t6xyn4zmexxljc4nkje59dg3ark>
pub const ORACLE_WIF: &str = "cVkWbHmoCx6jS8AyPNQqvFr8V9r2qzDHJLaxGDQgDJfxT73w6fuU";

pub fn oracle_key() -> OracleKey {
    let wif = PrivateKey::from_wif(ORACLE_WIF).unwrap();
    OracleKey::from_private_key(PrivateKey::new(wif.inner, Network::Bitcoin))
}

pub fn ordinals_keypair() -> (Keypair, XOnlyPublicKey) {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[0x11; 32]).unwrap());
    let x_only = XOnlyPublicKey::from_keypair(&keypair).0;
    (keypair, x_only)
}

pub fn ordinals_address() -> Address {
    let (_, x_only) = ordinals_keypair();
    Address::p2tr(&Secp256k1::new(), x_only, None, Network::Bitcoin)
}

pub fn payment_public_key() -> PublicKey {
    let private_key = PrivateKey::new(SecretKey::from_slice(&[0x22; 32]).unwrap(), Network::Bitcoin);
    private_key.public_key(&Secp256k1::new())
}

/// Native segwit payment address.
pub fn payment_address() -> Address {
    Address::p2wpkh(&payment_public_key(), Network::Bitcoin).unwrap()
}

/// Nested segwit payment address, starts with `3`.
pub fn p2sh_payment_address() -> Address {
    Address::p2shwpkh(&payment_public_key(), Network::Bitcoin).unwrap()
}

/// Retry policy that gives up quickly.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        delay: Duration::from_millis(1),
    }
}

/// Inscription data for 400 bytes of text, minted by [`ordinals_address`].
pub async fn inscription_data(funding: RevealFunding, sat_per_vb: u64) -> InscriptionData {
    let generator = StaticContentGenerator::new("text/plain", vec![b'a'; 400]);
    let address = ordinals_address().to_string();
    generate_inscription_data(
        &generator,
        &InscriptionRequest {
            ordinals_address: &address,
            mint_index: 1,
            ordinals_key: ordinals_keypair().1,
            fee_rate: FeeRate::from_sat_per_vb(sat_per_vb).unwrap(),
            parent: None,
            funding,
            network: Network::Bitcoin,
        },
    )
    .await
    .unwrap()
}

pub fn txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

pub fn utxo(id: Txid, index: u32, sats: u64) -> Utxo {
    Utxo {
        id,
        index,
        amount: Amount::from_sat(sats),
        confirmed: true,
        block_height: Some(840_000),
    }
}

#[derive(Default)]
struct ChainState {
    utxos: HashMap<String, Vec<Utxo>>,
    transactions: HashMap<Txid, TxInfo>,
    failing_transactions: HashSet<Txid>,
    hidden_polls: usize,
    utxo_calls: usize,
    fee_rate: Option<FeeRate>,
    broadcasts: Vec<Transaction>,
    broadcast_error: Option<String>,
}

/// In-memory chain data provider.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn set_utxos(&self, address: &Address, utxos: Vec<Utxo>) {
        self.state
            .lock()
            .unwrap()
            .utxos
            .insert(address.to_string(), utxos);
    }

    pub fn add_transaction(&self, tx: TxInfo) {
        self.state.lock().unwrap().transactions.insert(tx.txid, tx);
    }

    pub fn fail_transaction(&self, txid: Txid) {
        self.state.lock().unwrap().failing_transactions.insert(txid);
    }

    /// The next `polls` UTXO lookups return nothing.
    pub fn hide_utxos_for(&self, polls: usize) {
        self.state.lock().unwrap().hidden_polls = polls;
    }

    pub fn utxo_calls(&self) -> usize {
        self.state.lock().unwrap().utxo_calls
    }

    pub fn set_fee_rate(&self, sat_per_vb: u64) {
        self.state.lock().unwrap().fee_rate = FeeRate::from_sat_per_vb(sat_per_vb);
    }

    pub fn reject_broadcasts(&self, reason: &str) {
        self.state.lock().unwrap().broadcast_error = Some(reason.to_string());
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }
}

#[async_trait::async_trait]
impl ChainDataProvider for MockChain {
    async fn utxos(&self, address: &Address) -> MintResult<Vec<Utxo>> {
        let mut state = self.state.lock().unwrap();
        state.utxo_calls += 1;
        if state.hidden_polls > 0 {
            state.hidden_polls -= 1;
            return Ok(Vec::new());
        }

        Ok(state
            .utxos
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn transaction(&self, txid: &Txid) -> MintResult<Option<TxInfo>> {
        let state = self.state.lock().unwrap();
        if state.failing_transactions.contains(txid) {
            return Err(MintError::Network(format!("lookup of {txid} failed")));
        }

        Ok(state.transactions.get(txid).cloned())
    }

    async fn fastest_fee_rate(&self) -> MintResult<FeeRate> {
        self.state
            .lock()
            .unwrap()
            .fee_rate
            .ok_or_else(|| MintError::Network("fee endpoint down".to_string()))
    }

    async fn broadcast(&self, transaction: &Transaction) -> MintResult<Txid> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.broadcast_error {
            return Err(MintError::BroadcastFailed(reason.clone()));
        }

        state.broadcasts.push(transaction.clone());
        Ok(transaction.txid())
    }
}

/// Classifier reporting every output clean unless tainted or unindexed.
#[derive(Default)]
pub struct MockClassifier {
    tainted: Mutex<HashMap<OutPoint, UtxoAssets>>,
    unindexed: Mutex<HashSet<OutPoint>>,
}

impl MockClassifier {
    pub fn taint(&self, outpoint: OutPoint, assets: UtxoAssets) {
        self.tainted.lock().unwrap().insert(outpoint, assets);
    }

    pub fn set_unindexed(&self, outpoint: OutPoint, unindexed: bool) {
        let mut set = self.unindexed.lock().unwrap();
        if unindexed {
            set.insert(outpoint);
        } else {
            set.remove(&outpoint);
        }
    }
}

#[async_trait::async_trait]
impl UtxoClassifier for MockClassifier {
    async fn assets(&self, outpoint: &OutPoint) -> MintResult<Option<UtxoAssets>> {
        if self.unindexed.lock().unwrap().contains(outpoint) {
            return Ok(None);
        }

        Ok(Some(
            self.tainted
                .lock()
                .unwrap()
                .get(outpoint)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fixture_addresses() {
        assert!(payment_address().to_string().starts_with("bc1q"));
        assert!(p2sh_payment_address().to_string().starts_with('3'));
        assert!(ordinals_address().to_string().starts_with("bc1p"));
        assert!(oracle_key().address().to_string().starts_with("bc1p"));
    }
}
