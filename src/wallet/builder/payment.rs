use bitcoin::address::AddressType;
use bitcoin::psbt::Input;
use bitcoin::{Address, PublicKey, ScriptBuf, TxOut};

use crate::utxo::Utxo;
use crate::{MintError, MintResult};

/// How inputs of the user's payment address are spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PaymentSpend {
    script_pubkey: ScriptBuf,
    /// P2WPKH script wrapped by a nested segwit address.
    redeem_script: Option<ScriptBuf>,
}

impl PaymentSpend {
    /// Checks the payment address before any UTXO is fetched.
    ///
    /// Nested segwit addresses need the public key to build the redeem
    /// script. Legacy addresses are refused: their signatures change the txid
    /// the reveal depends on.
    pub(crate) fn new(address: &Address, public_key: Option<&PublicKey>) -> MintResult<Self> {
        let script_pubkey = address.script_pubkey();

        let redeem_script = match address.address_type() {
            Some(AddressType::P2sh) => {
                let public_key = public_key.ok_or_else(|| {
                    MintError::InvalidParameters(
                        "payment public key is required for P2SH addresses".to_string(),
                    )
                })?;
                let wpubkey_hash = public_key.wpubkey_hash().ok_or_else(|| {
                    MintError::InvalidParameters(
                        "payment public key must be compressed".to_string(),
                    )
                })?;
                let redeem_script = ScriptBuf::new_p2wpkh(&wpubkey_hash);
                if ScriptBuf::new_p2sh(&redeem_script.script_hash()) != script_pubkey {
                    return Err(MintError::InvalidParameters(format!(
                        "payment public key does not match {address}"
                    )));
                }
                Some(redeem_script)
            }
            Some(AddressType::P2pkh) => {
                return Err(MintError::InvalidParameters(format!(
                    "legacy payment address {address} is not supported"
                )));
            }
            _ => None,
        };

        Ok(Self {
            script_pubkey,
            redeem_script,
        })
    }

    pub(crate) fn script_pubkey(&self) -> &ScriptBuf {
        &self.script_pubkey
    }

    /// PSBT input spending `utxo`.
    pub(crate) fn input(&self, utxo: &Utxo) -> Input {
        Input {
            witness_utxo: Some(TxOut {
                value: utxo.amount,
                script_pubkey: self.script_pubkey.clone(),
            }),
            redeem_script: self.redeem_script.clone(),
            ..Default::default()
        }
    }
}
