use bitcoin::psbt::{Input, Psbt};
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::{ScriptBuf, TapLeafHash, Transaction, Witness};

use crate::utils::bytes_to_push_bytes;
use crate::{MintError, MintResult};

/// Turns the signatures of every signed but not yet finalized input into
/// its final witness (and `script_sig` for nested segwit).
///
/// Handles taproot key-path and single-leaf script-path spends and P2WPKH,
/// plain or P2SH wrapped. Inputs without usable signatures are left as they
/// are.
pub fn finalize_inputs(psbt: &mut Psbt) -> MintResult<()> {
    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        if input.final_script_witness.is_some() || input.final_script_sig.is_some() {
            continue;
        }

        if finalize_input(input)? {
            debug!("input {index} finalized");
        }
    }

    Ok(())
}

fn finalize_input(input: &mut Input) -> MintResult<bool> {
    if let Some(signature) = input.tap_key_sig {
        input.final_script_witness = Some(Witness::from_slice(&[signature.to_vec()]));
        return Ok(true);
    }

    if let Some(((_, leaf_hash), signature)) = input.tap_script_sigs.iter().next() {
        let leaf = input.tap_scripts.iter().find(|(_, (script, version))| {
            TapLeafHash::from_script(script, *version) == *leaf_hash
        });
        let Some((control_block, (script, _))) = leaf else {
            return Ok(false);
        };

        let mut witness = Witness::new();
        witness.push(signature.to_vec());
        witness.push(script.as_bytes());
        witness.push(control_block.serialize());
        input.final_script_witness = Some(witness);
        return Ok(true);
    }

    if let Some((public_key, signature)) = input.partial_sigs.iter().next() {
        input.final_script_witness = Some(Witness::from_slice(&[
            signature.to_vec(),
            public_key.to_bytes(),
        ]));
        if let Some(redeem_script) = &input.redeem_script {
            input.final_script_sig = Some(redeem_script_sig(redeem_script)?);
        }
        return Ok(true);
    }

    Ok(false)
}

/// `script_sig` of a nested segwit input: a single push of the redeem script.
pub(crate) fn redeem_script_sig(redeem_script: &ScriptBuf) -> MintResult<ScriptBuf> {
    Ok(ScriptBuilder::new()
        .push_slice(bytes_to_push_bytes(redeem_script.as_bytes())?)
        .into_script())
}

/// Signed transaction of a fully finalized PSBT.
pub fn extract_transaction(psbt: &Psbt) -> MintResult<Transaction> {
    let mut tx = psbt.unsigned_tx.clone();

    for (index, (txin, input)) in tx.input.iter_mut().zip(&psbt.inputs).enumerate() {
        if input.final_script_witness.is_none() && input.final_script_sig.is_none() {
            return Err(MintError::InvalidParameters(format!(
                "input {index} is not signed"
            )));
        }

        txin.witness = input.final_script_witness.clone().unwrap_or_default();
        txin.script_sig = input.final_script_sig.clone().unwrap_or_default();
    }

    Ok(tx)
}
