//! The mint pipeline: prepare commit, prepare reveal, broadcast.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::address::NetworkUnchecked;
use bitcoin::key::Secp256k1;
use bitcoin::psbt::Psbt;
use bitcoin::taproot::ControlBlock;
use bitcoin::{Address, Amount, FeeRate, PublicKey, ScriptBuf, Transaction, Txid};
use serde_with::hex::Hex;
use serde_with::serde_as;

use crate::inscription::envelope::{x_only_from_hex, InscriptionEnvelope};
use crate::inscription::iid::InscriptionId;
use crate::inscription::{generate_inscription_data, InscriptionRequest};
use crate::provider::{
    ChainDataProvider, ContentGenerator, InMemoryMintIndex, MintIndexAllocator, MintRecord,
    MintRecordStore, UtxoClassifier,
};
use crate::utils::fees::fee_rate_from_sat_per_vb;
use crate::utxo::UtxoSelector;
use crate::wallet::builder::commit::{CommitArgs, CommitBuilder, CommitResult};
use crate::wallet::builder::payment::PaymentSpend;
use crate::wallet::builder::reveal::{ParentLocator, RevealArgs, RevealBuilder, RevealResult};
use crate::wallet::builder::signer::OracleSigner;
use crate::wallet::builder::taproot::TaprootReveal;
use crate::wallet::{extract_transaction, finalize_inputs};
use crate::{MintConfig, MintError, MintResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub payment_address: String,
    /// Hex compressed key, required for nested segwit payment addresses
    #[serde(default)]
    pub payment_public_key: Option<String>,
    pub ordinals_address: String,
    /// Hex key signing the reveal's script-path spend, 32 or 33 bytes
    pub ordinals_public_key: String,
    /// sat/vB, the provider's fastest rate when absent
    #[serde(default)]
    pub fee_rate: Option<u64>,
    /// Allocated from the mint index counter when absent
    #[serde(default)]
    pub mint_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCommit {
    pub mint_index: u64,
    #[serde(flatten)]
    pub commit: CommitResult,
}

/// Values of a prepared commit the reveal spends.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealParams {
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub taproot_reveal_value: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub reveal_fee: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub postage: Amount,
    #[serde_as(as = "Hex")]
    pub control_block: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub inscription_script: ScriptBuf,
}

impl From<&CommitResult> for RevealParams {
    fn from(commit: &CommitResult) -> Self {
        Self {
            taproot_reveal_value: commit.taproot_reveal_value,
            reveal_fee: commit.reveal_fee,
            postage: commit.postage,
            control_block: commit.control_block.clone(),
            inscription_script: commit.inscription_script.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub commit_txid: Txid,
    pub ordinals_address: String,
    pub payment_address: String,
    #[serde(default)]
    pub payment_public_key: Option<String>,
    #[serde(flatten)]
    pub reveal: RevealParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRevealRequest {
    /// Base64 PSBT with every input signed
    pub signed_psbt: String,
    pub commit_txid: Txid,
    pub ordinals_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRevealResult {
    pub reveal_txid: Txid,
    pub inscription_id: InscriptionId,
}

/// Mints children of the collection parent.
///
/// Each call is independent; the only shared state is the mint index counter.
pub struct Minter {
    config: MintConfig,
    chain: Arc<dyn ChainDataProvider>,
    selector: UtxoSelector,
    generator: Arc<dyn ContentGenerator>,
    mint_index: Arc<dyn MintIndexAllocator>,
    records: Option<Arc<dyn MintRecordStore>>,
    reveal: RevealBuilder,
}

impl Minter {
    pub fn new(
        config: MintConfig,
        chain: Arc<dyn ChainDataProvider>,
        classifier: Arc<dyn UtxoClassifier>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        let selector = UtxoSelector::new(chain.clone(), classifier, config.retry);
        let reveal = RevealBuilder::new(
            selector.clone(),
            ParentLocator::new(chain.clone(), config.oracle.address().clone()),
            OracleSigner::new(config.oracle.clone()),
        );

        Self {
            config,
            chain,
            selector,
            generator,
            mint_index: Arc::new(InMemoryMintIndex::default()),
            records: None,
            reveal,
        }
    }

    pub fn with_mint_index(mut self, mint_index: Arc<dyn MintIndexAllocator>) -> Self {
        self.mint_index = mint_index;
        self
    }

    pub fn with_record_store(mut self, records: Arc<dyn MintRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn config(&self) -> &MintConfig {
        &self.config
    }

    /// Builds the unsigned commit PSBT for the next mint of the ordinals
    /// address.
    pub async fn prepare_commit(&self, request: CommitRequest) -> MintResult<PreparedCommit> {
        let payment_address = self.parse_address(&request.payment_address, "payment")?;
        let payment_public_key = parse_public_key(request.payment_public_key.as_deref())?;
        PaymentSpend::new(&payment_address, payment_public_key.as_ref())?;

        let ordinals_address = self.parse_address(&request.ordinals_address, "ordinals")?;
        let ordinals_key = x_only_from_hex(&request.ordinals_public_key)?;
        let fee_rate = self.resolve_fee_rate(request.fee_rate).await?;

        let utxos = self
            .selector
            .fetch_clean_utxos(&payment_address, &HashSet::new())
            .await?;

        let ordinals = ordinals_address.to_string();
        let mint_index = match request.mint_index {
            Some(mint_index) => mint_index,
            None => self.mint_index.get_and_increment(&ordinals).await?,
        };
        debug!("mint index {mint_index} for {ordinals}");

        let inscription = generate_inscription_data(
            self.generator.as_ref(),
            &InscriptionRequest {
                ordinals_address: &ordinals,
                mint_index,
                ordinals_key,
                fee_rate,
                parent: self.config.parent_inscription_id,
                funding: self.config.reveal_funding,
                network: self.config.network,
            },
        )
        .await?;

        let commit = CommitBuilder::build(CommitArgs {
            payment_address: &payment_address,
            payment_public_key: payment_public_key.as_ref(),
            utxos: &utxos,
            inscription: &inscription,
            fee_rate,
        })?;
        info!(
            "commit prepared for {ordinals}: mint {mint_index}, {} inputs, fee {}",
            utxos.len(),
            commit.commit_fee
        );

        Ok(PreparedCommit { mint_index, commit })
    }

    /// Builds the reveal PSBT spending output 0 of the commit, with the
    /// parent input signed by the oracle.
    pub async fn prepare_reveal(&self, request: RevealRequest) -> MintResult<RevealResult> {
        let ordinals_address = self.parse_address(&request.ordinals_address, "ordinals")?;
        let payment_address = self.parse_address(&request.payment_address, "payment")?;
        let payment_public_key = parse_public_key(request.payment_public_key.as_deref())?;
        let taproot = self.taproot_from_params(&request.reveal)?;

        self.reveal
            .build(RevealArgs {
                commit_txid: request.commit_txid,
                ordinals_address: &ordinals_address,
                payment_address: &payment_address,
                payment_public_key: payment_public_key.as_ref(),
                taproot: &taproot,
                taproot_reveal_value: request.reveal.taproot_reveal_value,
                reveal_fee: request.reveal.reveal_fee,
                postage: request.reveal.postage,
            })
            .await
    }

    /// Broadcasts the signed commit and returns its txid.
    pub async fn broadcast_commit(&self, signed_psbt: &str) -> MintResult<Txid> {
        let tx = signed_transaction(signed_psbt)?;
        let txid = self.broadcast(&tx).await?;
        info!("commit {txid} broadcast");

        Ok(txid)
    }

    /// Broadcasts the signed reveal and records the new inscription.
    ///
    /// A failure to store the record is only logged: the inscription exists
    /// once the reveal is broadcast.
    pub async fn broadcast_reveal(
        &self,
        request: BroadcastRevealRequest,
    ) -> MintResult<BroadcastRevealResult> {
        let tx = signed_transaction(&request.signed_psbt)?;
        let reveal_txid = self.broadcast(&tx).await?;
        let inscription_id = InscriptionId::new(reveal_txid, 0);
        info!("reveal {reveal_txid} broadcast, inscription {inscription_id}");

        if let Some(records) = &self.records {
            let record = MintRecord {
                inscription_id,
                reveal_txid,
                commit_txid: request.commit_txid,
                ordinals_address: request.ordinals_address,
            };
            if let Err(err) = records.save_record(&record).await {
                warn!("failed to save mint record for {inscription_id}: {err}");
            }
        }

        Ok(BroadcastRevealResult {
            reveal_txid,
            inscription_id,
        })
    }

    async fn broadcast(&self, tx: &Transaction) -> MintResult<Txid> {
        let txid = self.chain.broadcast(tx).await?;
        if txid != tx.txid() {
            warn!("provider reported txid {txid} for transaction {}", tx.txid());
        }

        Ok(txid)
    }

    async fn resolve_fee_rate(&self, sat_per_vb: Option<u64>) -> MintResult<FeeRate> {
        if let Some(sat_per_vb) = sat_per_vb {
            return fee_rate_from_sat_per_vb(sat_per_vb);
        }

        match self.chain.fastest_fee_rate().await {
            Ok(fee_rate) => Ok(fee_rate),
            Err(err) => {
                warn!("fee rate lookup failed, using the default: {err}");
                Ok(self.config.default_fee_rate)
            }
        }
    }

    /// Rebuilds the taproot output from the script and control block of a
    /// prepared commit and checks it is an inscription of this collection.
    fn taproot_from_params(&self, params: &RevealParams) -> MintResult<TaprootReveal> {
        let control_block = ControlBlock::decode(&params.control_block)
            .map_err(|err| MintError::InvalidParameters(format!("invalid control block: {err}")))?;

        let envelope = InscriptionEnvelope::from_script(&params.inscription_script)
            .map_err(|err| MintError::InvalidParameters(err.to_string()))?;
        if envelope.parent != self.config.parent_inscription_id {
            return Err(MintError::InvalidParameters(
                "inscription does not reference the collection parent".to_string(),
            ));
        }

        let taproot = TaprootReveal::build(
            &Secp256k1::new(),
            control_block.internal_key,
            &params.inscription_script,
            self.config.network,
        )?;
        if taproot.control_block != control_block {
            return Err(MintError::InvalidParameters(
                "control block does not commit to the inscription script".to_string(),
            ));
        }

        Ok(taproot)
    }

    fn parse_address(&self, address: &str, role: &str) -> MintResult<Address> {
        address
            .trim()
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|err| MintError::InvalidParameters(format!("{role} address: {err}")))?
            .require_network(self.config.network)
            .map_err(|err| MintError::InvalidParameters(format!("{role} address: {err}")))
    }
}

fn parse_public_key(public_key: Option<&str>) -> MintResult<Option<PublicKey>> {
    public_key
        .map(|key| {
            PublicKey::from_str(key.trim()).map_err(|err| {
                MintError::InvalidParameters(format!("payment public key: {err}"))
            })
        })
        .transpose()
}

fn signed_transaction(signed_psbt: &str) -> MintResult<Transaction> {
    let mut psbt = Psbt::from_str(signed_psbt.trim())
        .map_err(|err| MintError::InvalidParameters(format!("invalid PSBT: {err}")))?;
    finalize_inputs(&mut psbt)?;

    extract_transaction(&psbt)
}
