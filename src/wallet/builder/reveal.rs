use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bitcoin::psbt::Input;
use bitcoin::{Address, Amount, OutPoint, PublicKey, TxOut, Txid};

use super::payment::PaymentSpend;
use super::signer::OracleSigner;
use super::taproot::TaprootReveal;
use super::{OrderedPsbt, RevealInput, RevealOutput};
use crate::inscription::iid::InscriptionId;
use crate::provider::{ChainDataProvider, TxInfo};
use crate::utils::constants::{DUST_LIMIT, P2TR_SCRIPT_TYPE, PARENT_VALUE, POSTAGE};
use crate::utils::fees::check_reveal_fee;
use crate::utxo::{total_amount, UtxoSelector};
use crate::wallet::txid::predict_txid;
use crate::{MintError, MintResult};

/// Current output of the parent inscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentUtxo {
    pub outpoint: OutPoint,
    pub txout: TxOut,
}

/// Finds the parent inscription at the oracle address.
///
/// Every reveal spends the parent and sends it back to the oracle, so the
/// current parent is a dust output of the oracle whose transaction itself
/// spent a dust output of the oracle. Candidates are checked in the order
/// the provider returns them.
pub struct ParentLocator {
    chain: Arc<dyn ChainDataProvider>,
    oracle_address: Address,
}

impl ParentLocator {
    pub fn new(chain: Arc<dyn ChainDataProvider>, oracle_address: Address) -> Self {
        Self {
            chain,
            oracle_address,
        }
    }

    pub async fn find_parent(&self) -> MintResult<ParentUtxo> {
        let oracle = self.oracle_address.to_string();

        for utxo in self.chain.utxos(&self.oracle_address).await? {
            if utxo.amount != PARENT_VALUE {
                continue;
            }
            let outpoint = utxo.outpoint();

            let tx = match self.chain.transaction(&utxo.id).await {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    warn!("parent candidate {outpoint}: transaction not found");
                    continue;
                }
                Err(err) => {
                    warn!("parent candidate {outpoint}: {err}");
                    continue;
                }
            };

            if !spends_oracle_dust(&tx, &oracle) {
                debug!("parent candidate {outpoint}: not passed forward by the oracle");
                continue;
            }

            let Some(vout) = tx.vout.get(utxo.index as usize) else {
                warn!("parent candidate {outpoint}: output missing from its transaction");
                continue;
            };

            info!("parent inscription found at {outpoint}");
            return Ok(ParentUtxo {
                outpoint,
                txout: TxOut {
                    value: Amount::from_sat(vout.value),
                    script_pubkey: vout.scriptpubkey.clone(),
                },
            });
        }

        Err(MintError::ParentNotFound(oracle))
    }
}

fn spends_oracle_dust(tx: &TxInfo, oracle: &str) -> bool {
    tx.vin.iter().any(|vin| {
        vin.prevout.as_ref().is_some_and(|prevout| {
            prevout.value == PARENT_VALUE.to_sat()
                && prevout.scriptpubkey_type == P2TR_SCRIPT_TYPE
                && prevout.scriptpubkey_address.as_deref() == Some(oracle)
        })
    })
}

/// Which address must sign a reveal input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSigning {
    pub index: usize,
    pub address: String,
}

#[derive(Debug)]
/// Arguments for creating a reveal transaction
pub struct RevealArgs<'a> {
    /// Commit transaction, its output 0 funds the reveal
    pub commit_txid: Txid,
    /// Receives the new inscription and signs the commit input
    pub ordinals_address: &'a Address,
    /// Pays the part of the fee the commit output does not cover
    pub payment_address: &'a Address,
    pub payment_public_key: Option<&'a PublicKey>,
    /// Taproot output created by the commit
    pub taproot: &'a TaprootReveal,
    pub taproot_reveal_value: Amount,
    /// Estimated reveal fee
    pub reveal_fee: Amount,
    pub postage: Amount,
}

/// Reveal PSBT with the parent input already signed by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealResult {
    /// Base64 PSBT
    pub reveal_psbt: String,
    /// Fee actually paid: inputs minus outputs
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub reveal_fee: Amount,
    pub expected_inscription_id: InscriptionId,
    /// Inputs left to the user, the parent input is not listed
    pub input_signing_map: Vec<InputSigning>,
}

/// Builds the reveal transaction.
///
/// Inputs: parent, commit output, then payment inputs for the fee.
/// Outputs: parent back to the oracle, the new inscription, then change.
pub struct RevealBuilder {
    selector: UtxoSelector,
    locator: ParentLocator,
    signer: OracleSigner,
}

impl RevealBuilder {
    pub fn new(selector: UtxoSelector, locator: ParentLocator, signer: OracleSigner) -> Self {
        Self {
            selector,
            locator,
            signer,
        }
    }

    pub async fn build(&self, args: RevealArgs<'_>) -> MintResult<RevealResult> {
        check_amounts(&args)?;
        let payment = PaymentSpend::new(args.payment_address, args.payment_public_key)?;

        let parent = self.locator.find_parent().await?;
        let commit_tx = self.selector.wait_for_transaction(&args.commit_txid).await?;
        check_commit_output(&commit_tx, &args)?;

        let mut builder = OrderedPsbt::<RevealInput, RevealOutput>::new();
        let mut input_signing_map = Vec::new();

        builder.push_input(
            RevealInput::Parent,
            parent.outpoint,
            Input {
                witness_utxo: Some(parent.txout.clone()),
                tap_internal_key: Some(self.signer.x_only_public_key()),
                ..Default::default()
            },
        )?;

        let index = builder.push_input(
            RevealInput::Inscription,
            OutPoint::new(args.commit_txid, 0),
            Input {
                witness_utxo: Some(args.taproot.txout(args.taproot_reveal_value)),
                tap_internal_key: Some(args.taproot.control_block.internal_key),
                tap_merkle_root: args.taproot.spend_info.merkle_root(),
                tap_scripts: BTreeMap::from([(
                    args.taproot.control_block.clone(),
                    args.taproot.leaf(),
                )]),
                ..Default::default()
            },
        )?;
        input_signing_map.push(InputSigning {
            index,
            address: args.ordinals_address.to_string(),
        });

        // the parent input pays for the parent output
        let fee_target = checked_add(args.reveal_fee, args.postage)?
            .checked_sub(args.taproot_reveal_value)
            .unwrap_or(Amount::ZERO);
        debug!("reveal fee target for payment inputs: {fee_target}");

        if fee_target > Amount::ZERO {
            let exclude: HashSet<OutPoint> = commit_tx.spent_outpoints().collect();
            let utxos = self
                .selector
                .fetch_clean_utxos(args.payment_address, &exclude)
                .await?;

            let available = total_amount(&utxos);
            if available < fee_target {
                return Err(MintError::InsufficientFunds {
                    required: fee_target.to_sat(),
                    available: available.to_sat(),
                    address: args.payment_address.to_string(),
                });
            }

            let mut accumulated = Amount::ZERO;
            for utxo in &utxos {
                let index =
                    builder.push_input(RevealInput::Fee, utxo.outpoint(), payment.input(utxo))?;
                input_signing_map.push(InputSigning {
                    index,
                    address: args.payment_address.to_string(),
                });

                accumulated = checked_add(accumulated, utxo.amount)?;
                if accumulated >= fee_target {
                    break;
                }
            }
            debug!("selected {accumulated} of payment inputs");
        }

        builder.push_output(
            RevealOutput::ParentReturn,
            TxOut {
                value: PARENT_VALUE,
                script_pubkey: self.signer.address().script_pubkey(),
            },
        )?;
        builder.push_output(
            RevealOutput::Inscription,
            TxOut {
                value: args.postage,
                script_pubkey: args.ordinals_address.script_pubkey(),
            },
        )?;

        let change = builder
            .input_value()?
            .checked_sub(builder.output_value()?)
            .and_then(|v| v.checked_sub(args.reveal_fee))
            .unwrap_or(Amount::ZERO);
        if change > DUST_LIMIT {
            builder.push_output(
                RevealOutput::Change,
                TxOut {
                    value: change,
                    script_pubkey: payment.script_pubkey().clone(),
                },
            )?;
        }

        let reveal_fee = builder
            .input_value()?
            .checked_sub(builder.output_value()?)
            .ok_or_else(|| {
                MintError::OperationFailed("reveal outputs exceed its inputs".to_string())
            })?;
        debug!("reveal fee: {reveal_fee}, change: {change}");

        let mut psbt = builder.finish()?;
        let txid = predict_txid(&psbt)?;
        self.signer.sign_parent_input(&mut psbt)?;

        let expected_inscription_id = InscriptionId::new(txid, 0);
        info!("reveal prepared, expected inscription {expected_inscription_id}");

        Ok(RevealResult {
            reveal_psbt: psbt.to_string(),
            reveal_fee,
            expected_inscription_id,
            input_signing_map,
        })
    }
}

/// Postage must be the standard inscription value and the fee must be in range.
fn check_amounts(args: &RevealArgs<'_>) -> MintResult<()> {
    if args.postage != POSTAGE {
        return Err(MintError::InvalidParameters(format!(
            "postage must be {POSTAGE}, got {}",
            args.postage
        )));
    }
    check_reveal_fee(args.reveal_fee)?;
    if args.taproot_reveal_value < args.postage {
        return Err(MintError::InvalidParameters(format!(
            "taproot reveal value {} is below the postage",
            args.taproot_reveal_value
        )));
    }

    Ok(())
}

fn checked_add(lhs: Amount, rhs: Amount) -> MintResult<Amount> {
    lhs.checked_add(rhs)
        .ok_or_else(|| MintError::InvalidParameters("reveal amounts overflow".to_string()))
}

/// The reveal spends output 0 of the commit, which must pay the reveal script.
fn check_commit_output(commit_tx: &TxInfo, args: &RevealArgs<'_>) -> MintResult<()> {
    let output = commit_tx.vout.first().ok_or_else(|| {
        MintError::InvalidParameters(format!("commit {} has no outputs", args.commit_txid))
    })?;

    if output.scriptpubkey != args.taproot.script_pubkey()
        || output.value != args.taproot_reveal_value.to_sat()
    {
        return Err(MintError::InvalidParameters(format!(
            "output 0 of commit {} does not fund this reveal",
            args.commit_txid
        )));
    }

    Ok(())
}
