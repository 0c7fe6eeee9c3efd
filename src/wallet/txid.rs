use std::str::FromStr;

use bitcoin::psbt::Psbt;
use bitcoin::{ScriptBuf, Transaction, TxIn, Txid, Witness};

use super::finalize::redeem_script_sig;
use crate::{MintError, MintResult};

/// Txid the transaction of `psbt` will have once signed.
///
/// The id is computed from the non-witness serialization. Nested segwit
/// inputs get the redeem script push they will carry once finalized. The
/// prediction does not hold for legacy inputs, whose signatures go into
/// `script_sig`.
pub fn predict_txid(psbt: &Psbt) -> MintResult<Txid> {
    let mut input = Vec::with_capacity(psbt.unsigned_tx.input.len());
    for (index, txin) in psbt.unsigned_tx.input.iter().enumerate() {
        let script_sig = match psbt.inputs.get(index).and_then(|i| i.redeem_script.as_ref()) {
            Some(redeem_script) => redeem_script_sig(redeem_script)?,
            None => ScriptBuf::new(),
        };
        input.push(TxIn {
            previous_output: txin.previous_output,
            script_sig,
            sequence: txin.sequence,
            witness: Witness::new(),
        });
    }

    let skeleton = Transaction {
        version: psbt.unsigned_tx.version,
        lock_time: psbt.unsigned_tx.lock_time,
        input,
        output: psbt.unsigned_tx.output.clone(),
    };

    Ok(skeleton.txid())
}

/// [`predict_txid`] for a base64 encoded PSBT.
pub fn predict_txid_base64(psbt: &str) -> MintResult<Txid> {
    let psbt = Psbt::from_str(psbt.trim())
        .map_err(|err| MintError::InvalidParameters(format!("invalid PSBT: {err}")))?;

    predict_txid(&psbt)
}

#[cfg(test)]
mod tests {
    use bitcoin::psbt::Input;
    use bitcoin::{Amount, OutPoint, TxOut};

    use super::*;
    use crate::utils::test_utils::{ordinals_address, payment_address, payment_public_key, txid};
    use crate::wallet::builder::{CommitInput, CommitOutput, OrderedPsbt};
    use crate::wallet::finalize::extract_transaction;

    fn commit_psbt() -> Psbt {
        let mut builder = OrderedPsbt::<CommitInput, CommitOutput>::new();
        for n in 1..=2 {
            builder
                .push_input(
                    CommitInput::Funding,
                    OutPoint::new(txid(n), n as u32),
                    Input {
                        witness_utxo: Some(TxOut {
                            value: Amount::from_sat(100_000),
                            script_pubkey: payment_address().script_pubkey(),
                        }),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        builder
            .push_output(
                CommitOutput::RevealFunding,
                TxOut {
                    value: Amount::from_sat(546),
                    script_pubkey: ordinals_address().script_pubkey(),
                },
            )
            .unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn test_txid_is_stable_once_witnesses_are_attached() {
        let mut psbt = commit_psbt();
        let predicted = predict_txid(&psbt).unwrap();
        assert_eq!(predicted, psbt.unsigned_tx.txid());

        for input in psbt.inputs.iter_mut() {
            input.final_script_witness =
                Some(Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]));
        }
        let signed = extract_transaction(&psbt).unwrap();

        assert!(!signed.input[0].witness.is_empty());
        assert_eq!(signed.txid(), predicted);
        assert_ne!(signed.wtxid().to_string(), predicted.to_string());
    }

    #[test]
    fn test_should_predict_from_base64() {
        let psbt = commit_psbt();
        let encoded = psbt.to_string();
        assert_eq!(
            predict_txid_base64(&encoded).unwrap(),
            predict_txid(&psbt).unwrap()
        );
        assert!(matches!(
            predict_txid_base64("not a psbt"),
            Err(MintError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_output_changes_txid() {
        let psbt = commit_psbt();
        let mut other = psbt.clone();
        other.unsigned_tx.output[0].value = Amount::from_sat(547);
        assert_ne!(predict_txid(&psbt).unwrap(), predict_txid(&other).unwrap());
    }

    #[test]
    fn test_nested_segwit_script_sig_is_predicted() {
        let mut psbt = commit_psbt();
        let redeem_script = ScriptBuf::new_p2wpkh(&payment_public_key().wpubkey_hash().unwrap());
        psbt.inputs[0].redeem_script = Some(redeem_script.clone());
        let predicted = predict_txid(&psbt).unwrap();
        assert_ne!(predicted, psbt.unsigned_tx.txid());

        psbt.inputs[0].final_script_sig = Some(redeem_script_sig(&redeem_script).unwrap());
        for input in psbt.inputs.iter_mut() {
            input.final_script_witness =
                Some(Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]));
        }
        let signed = extract_transaction(&psbt).unwrap();
        assert_eq!(signed.txid(), predicted);
    }
}
