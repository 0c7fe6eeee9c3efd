use bitcoin::{Amount, FeeRate, Weight};

use crate::utils::constants::{MAX_FEE_RATE, MAX_REVEAL_FEE};
use crate::{MintError, MintResult};

/// Version, locktime and counts.
const TX_OVERHEAD_VBYTES: u64 = 10;
/// P2WPKH input with its witness.
const P2WPKH_INPUT_VBYTES: u64 = 68;
/// P2TR output.
const TAPROOT_OUTPUT_VBYTES: u64 = 43;
/// P2WPKH change output.
const CHANGE_OUTPUT_VBYTES: u64 = 31;
/// Script-path taproot input, excluding the revealed script.
const TAPROOT_INPUT_VBYTES: u64 = 100;
/// Envelope framing around the content, counted at witness weight.
const ENVELOPE_OVERHEAD_BYTES: u64 = 100;

/// Closed-form weight of a commit transaction with `num_inputs` payment inputs,
/// one taproot output and one change output.
pub fn estimate_commit_weight(num_inputs: usize) -> Weight {
    let vbytes = (num_inputs as u64)
        .saturating_mul(P2WPKH_INPUT_VBYTES)
        .saturating_add(TX_OVERHEAD_VBYTES + TAPROOT_OUTPUT_VBYTES + CHANGE_OUTPUT_VBYTES);

    Weight::from_wu(vbytes.saturating_mul(4))
}

/// Closed-form weight of a reveal transaction carrying `content_size` bytes.
///
/// The script and content sit in the witness, so they are counted at one
/// weight unit per byte.
pub fn estimate_reveal_weight(content_size: usize) -> Weight {
    let base_vbytes = TX_OVERHEAD_VBYTES + TAPROOT_INPUT_VBYTES + CHANGE_OUTPUT_VBYTES;
    let witness_wu = (content_size as u64).saturating_add(ENVELOPE_OVERHEAD_BYTES);

    Weight::from_wu((base_vbytes * 4).saturating_add(witness_wu))
}

pub fn estimate_commit_fee(num_inputs: usize, fee_rate: FeeRate) -> Amount {
    fee_for_weight(estimate_commit_weight(num_inputs), fee_rate)
}

pub fn estimate_reveal_fee(content_size: usize, fee_rate: FeeRate) -> Amount {
    fee_for_weight(estimate_reveal_weight(content_size), fee_rate)
}

/// Fee for `weight` at `fee_rate`, rounded up to the next satoshi.
pub fn fee_for_weight(weight: Weight, fee_rate: FeeRate) -> Amount {
    let millisats = weight.to_wu().saturating_mul(fee_rate.to_sat_per_kwu());
    Amount::from_sat(millisats.div_ceil(1000))
}

/// Parses a user supplied fee rate in sat/vB.
pub fn fee_rate_from_sat_per_vb(sat_per_vb: u64) -> MintResult<FeeRate> {
    if sat_per_vb == 0 {
        return Err(MintError::InvalidParameters(
            "fee rate must be positive".to_string(),
        ));
    }

    if sat_per_vb > MAX_FEE_RATE {
        return Err(MintError::InvalidParameters(format!(
            "fee rate {sat_per_vb} sat/vB is above {MAX_FEE_RATE} sat/vB"
        )));
    }

    FeeRate::from_sat_per_vb(sat_per_vb).ok_or_else(|| {
        MintError::InvalidParameters(format!("fee rate {sat_per_vb} sat/vB is out of range"))
    })
}

/// Rejects a zero reveal fee or one above [`MAX_REVEAL_FEE`].
pub fn check_reveal_fee(reveal_fee: Amount) -> MintResult<()> {
    if reveal_fee == Amount::ZERO || reveal_fee > MAX_REVEAL_FEE {
        return Err(MintError::InvalidParameters(format!(
            "reveal fee {reveal_fee} is out of range"
        )));
    }

    Ok(())
}
