use bitcoin::{Address, Amount, FeeRate, PublicKey, ScriptBuf, TxOut};
use serde_with::hex::Hex;
use serde_with::serde_as;

use super::payment::PaymentSpend;
use super::{CommitInput, CommitOutput, OrderedPsbt};
use crate::inscription::InscriptionData;
use crate::utils::constants::{COMMIT_SAFETY_BUFFER, DUST_LIMIT};
use crate::utils::fees::{check_reveal_fee, estimate_commit_fee};
use crate::utxo::{total_amount, Utxo};
use crate::{MintError, MintResult};

#[derive(Debug)]
/// Arguments for creating a commit transaction
pub struct CommitArgs<'a> {
    /// Address funding the commit and receiving its change
    pub payment_address: &'a Address,
    /// Required for nested segwit payment addresses
    pub payment_public_key: Option<&'a PublicKey>,
    /// Clean UTXOs of the payment address, all of them are spent
    pub utxos: &'a [Utxo],
    /// Inscription the commit output commits to
    pub inscription: &'a InscriptionData,
    pub fee_rate: FeeRate,
}

/// Unsigned commit PSBT and everything the reveal needs to spend it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    /// Base64 PSBT, to be signed by the payment address
    pub commit_psbt: String,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub commit_fee: Amount,
    #[serde_as(as = "Hex")]
    pub taproot_reveal_script: ScriptBuf,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub taproot_reveal_value: Amount,
    /// Estimated reveal fee
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub reveal_fee: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub postage: Amount,
    #[serde_as(as = "Hex")]
    pub control_block: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub inscription_script: ScriptBuf,
}

/// Builds the commit transaction funding the inscription's taproot output.
pub struct CommitBuilder;

impl CommitBuilder {
    /// Creates the unsigned commit PSBT.
    ///
    /// Output 0 always pays the taproot reveal output; a change output back to
    /// the payment address follows when it is above dust.
    pub fn build(args: CommitArgs<'_>) -> MintResult<CommitResult> {
        let payment = PaymentSpend::new(args.payment_address, args.payment_public_key)?;
        let inscription = args.inscription;

        check_reveal_fee(inscription.reveal_fee)?;

        let commit_fee = estimate_commit_fee(args.utxos.len(), args.fee_rate);
        let total_required = commit_fee
            .checked_add(inscription.taproot_reveal_value)
            .and_then(|v| v.checked_add(COMMIT_SAFETY_BUFFER))
            .ok_or_else(|| {
                MintError::InvalidParameters("commit amounts overflow".to_string())
            })?;
        let available = total_amount(args.utxos);
        debug!("commit fee: {commit_fee}, required: {total_required}, available: {available}");

        if available < total_required {
            return Err(MintError::InsufficientFunds {
                required: total_required.to_sat(),
                available: available.to_sat(),
                address: args.payment_address.to_string(),
            });
        }

        let mut builder = OrderedPsbt::<CommitInput, CommitOutput>::new();
        for utxo in args.utxos {
            builder.push_input(CommitInput::Funding, utxo.outpoint(), payment.input(utxo))?;
        }

        builder.push_output(
            CommitOutput::RevealFunding,
            inscription.taproot.txout(inscription.taproot_reveal_value),
        )?;

        let change = available - total_required;
        if change > DUST_LIMIT {
            builder.push_output(
                CommitOutput::Change,
                TxOut {
                    value: change,
                    script_pubkey: payment.script_pubkey().clone(),
                },
            )?;
        }
        debug!("commit change: {change}");

        let psbt = builder.finish()?;

        Ok(CommitResult {
            commit_psbt: psbt.to_string(),
            commit_fee,
            taproot_reveal_script: inscription.taproot_reveal_script(),
            taproot_reveal_value: inscription.taproot_reveal_value,
            reveal_fee: inscription.reveal_fee,
            postage: inscription.postage,
            control_block: inscription.taproot.control_block.serialize(),
            inscription_script: inscription.inscription_script.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bitcoin::psbt::Psbt;
    use bitcoin::taproot::ControlBlock;

    use super::*;
    use crate::utils::test_utils::{
        inscription_data as inscription, p2sh_payment_address, payment_address,
        payment_public_key, txid, utxo,
    };
    use crate::RevealFunding;

    fn rate(sat_per_vb: u64) -> FeeRate {
        FeeRate::from_sat_per_vb(sat_per_vb).unwrap()
    }

    #[tokio::test]
    async fn test_should_build_commit_with_change() {
        let inscription = inscription(RevealFunding::CommitOutput, 10).await;
        let address = payment_address();
        let utxos = vec![utxo(txid(1), 0, 100_000), utxo(txid(2), 1, 200_000)];

        let result = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(10),
        })
        .unwrap();

        assert_eq!(result.commit_fee, Amount::from_sat(2_200));
        assert_eq!(
            result.taproot_reveal_value,
            inscription.reveal_fee + inscription.postage
        );

        let psbt = Psbt::from_str(&result.commit_psbt).unwrap();
        assert_eq!(psbt.unsigned_tx.input.len(), 2);
        assert_eq!(psbt.unsigned_tx.input[1].previous_output, utxos[1].outpoint());
        assert_eq!(psbt.unsigned_tx.output.len(), 2);

        let reveal_output = &psbt.unsigned_tx.output[0];
        assert_eq!(reveal_output.value, result.taproot_reveal_value);
        assert_eq!(reveal_output.script_pubkey, result.taproot_reveal_script);
        assert!(reveal_output.script_pubkey.is_p2tr());

        let change = &psbt.unsigned_tx.output[1];
        assert_eq!(change.script_pubkey, address.script_pubkey());
        assert_eq!(
            change.value,
            Amount::from_sat(300_000)
                - result.commit_fee
                - result.taproot_reveal_value
                - COMMIT_SAFETY_BUFFER
        );

        for input in &psbt.inputs {
            assert_eq!(
                input.witness_utxo.as_ref().unwrap().script_pubkey,
                address.script_pubkey()
            );
            assert!(input.redeem_script.is_none());
        }

        let control_block = ControlBlock::decode(&result.control_block).unwrap();
        assert_eq!(control_block, inscription.taproot.control_block);
    }

    #[tokio::test]
    async fn test_should_fail_with_insufficient_funds() {
        let inscription = inscription(RevealFunding::PaymentInputs, 10).await;
        let address = payment_address();
        // 1 input: 1520 fee + 546 reveal value + 400 buffer = 2466
        let utxos = vec![utxo(txid(1), 0, 2_465)];

        let err = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(10),
        })
        .unwrap_err();

        assert!(matches!(
            err,
            MintError::InsufficientFunds {
                required: 2_466,
                available: 2_465,
                ..
            }
        ));
        assert!(err.to_string().contains(&address.to_string()));
    }

    #[tokio::test]
    async fn test_should_reject_out_of_range_amounts() {
        let address = payment_address();
        let utxos = vec![utxo(txid(1), 0, u64::MAX)];

        let mut huge_value = inscription(RevealFunding::PaymentInputs, 10).await;
        huge_value.taproot_reveal_value = Amount::MAX;
        let err = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &huge_value,
            fee_rate: rate(10),
        })
        .unwrap_err();
        assert!(matches!(err, MintError::InvalidParameters(_)));

        let mut zero_fee = inscription(RevealFunding::PaymentInputs, 10).await;
        zero_fee.reveal_fee = Amount::ZERO;
        let err = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &zero_fee,
            fee_rate: rate(10),
        })
        .unwrap_err();
        assert!(matches!(err, MintError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_should_drop_dust_change() {
        let inscription = inscription(RevealFunding::PaymentInputs, 10).await;
        let address = payment_address();
        let utxos = vec![utxo(txid(1), 0, 2_466 + 546)];

        let result = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(10),
        })
        .unwrap();

        let psbt = Psbt::from_str(&result.commit_psbt).unwrap();
        assert_eq!(psbt.unsigned_tx.output.len(), 1);
        assert_eq!(psbt.unsigned_tx.output[0].value, Amount::from_sat(546));
    }

    #[tokio::test]
    async fn test_p2sh_payment_needs_public_key() {
        let inscription = inscription(RevealFunding::PaymentInputs, 2).await;
        let address = p2sh_payment_address();
        let utxos = vec![utxo(txid(1), 0, 50_000)];

        let err = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(2),
        })
        .unwrap_err();
        assert!(matches!(err, MintError::InvalidParameters(_)));

        let public_key = payment_public_key();
        let result = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: Some(&public_key),
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(2),
        })
        .unwrap();
        let psbt = Psbt::from_str(&result.commit_psbt).unwrap();
        assert!(psbt.inputs[0].redeem_script.is_some());
    }

    #[tokio::test]
    async fn test_result_serializes_hex_and_sats() {
        let inscription = inscription(RevealFunding::PaymentInputs, 1).await;
        let address = payment_address();
        let utxos = vec![utxo(txid(1), 0, 10_000)];

        let result = CommitBuilder::build(CommitArgs {
            payment_address: &address,
            payment_public_key: None,
            utxos: &utxos,
            inscription: &inscription,
            fee_rate: rate(1),
        })
        .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["commitFee"], 152);
        assert_eq!(json["postage"], 546);
        assert_eq!(
            json["controlBlock"],
            hex::encode(inscription.taproot.control_block.serialize())
        );
        assert_eq!(
            json["taprootRevealScript"],
            hex::encode(result.taproot_reveal_script.as_bytes())
        );

        let decoded: CommitResult = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, result);
    }
}
