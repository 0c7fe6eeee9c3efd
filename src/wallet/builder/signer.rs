use bitcoin::hashes::Hash as _;
use bitcoin::key::{Keypair, Secp256k1};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{self, All};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::TapTweakHash;
use bitcoin::{Address, TapSighashType, TxOut, XOnlyPublicKey};

use crate::{MintError, MintResult, OracleKey};

/// Index of the parent inscription input in every reveal transaction.
pub const PARENT_INPUT_INDEX: usize = 0;

/// Signs the parent inscription input with the oracle key.
///
/// The oracle key only ever spends the parent output held at its own key-path
/// address, so it never signs any other input.
pub struct OracleSigner {
    key: OracleKey,
    secp: Secp256k1<All>,
}

impl OracleSigner {
    pub fn new(key: OracleKey) -> Self {
        Self {
            key,
            secp: Secp256k1::new(),
        }
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.key.x_only_public_key()
    }

    pub fn address(&self) -> &Address {
        self.key.address()
    }

    /// Oracle key tweaked for key-path spending with no script tree.
    ///
    /// Keys with an odd y coordinate are negated before the tweak is added.
    pub fn tweaked_keypair(&self) -> MintResult<Keypair> {
        let x_only = self.key.x_only_public_key();
        let mut secret = self.key.private_key().inner;
        if self.key.public_key().inner.serialize()[0] == 0x03 {
            secret = secret.negate();
        }

        let tweak = TapTweakHash::from_key_and_tweak(x_only, None).to_scalar();
        let tweaked = secret
            .add_tweak(&tweak)
            .map_err(|err| MintError::SigningFailed(format!("oracle key tweak: {err}")))?;

        Ok(Keypair::from_secret_key(&self.secp, &tweaked))
    }

    /// Adds the oracle's key-path signature to the parent input.
    ///
    /// Every input must carry its `witness_utxo`, since a taproot sighash
    /// commits to all spent outputs.
    pub fn sign_parent_input(&self, psbt: &mut Psbt) -> MintResult<()> {
        let parent = psbt.inputs.get(PARENT_INPUT_INDEX).ok_or_else(|| {
            MintError::SigningFailed("PSBT has no parent input".to_string())
        })?;

        if parent.tap_internal_key != Some(self.x_only_public_key()) {
            return Err(MintError::SigningFailed(
                "parent input is not tagged with the oracle internal key".to_string(),
            ));
        }
        let oracle_script = self.address().script_pubkey();
        if parent.witness_utxo.as_ref().map(|txout| &txout.script_pubkey) != Some(&oracle_script)
        {
            return Err(MintError::SigningFailed(
                "parent input is not held by the oracle address".to_string(),
            ));
        }

        let prevouts = psbt
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                input.witness_utxo.clone().ok_or_else(|| {
                    MintError::SigningFailed(format!("input {index} has no witness utxo"))
                })
            })
            .collect::<MintResult<Vec<TxOut>>>()?;

        let sighash = SighashCache::new(&psbt.unsigned_tx).taproot_key_spend_signature_hash(
            PARENT_INPUT_INDEX,
            &Prevouts::All(&prevouts),
            TapSighashType::Default,
        )?;

        let keypair = self.tweaked_keypair()?;
        let msg = secp256k1::Message::from_digest(sighash.to_byte_array());
        let sig = self.secp.sign_schnorr_no_aux_rand(&msg, &keypair);

        // verify
        self.secp
            .verify_schnorr(&sig, &msg, &keypair.x_only_public_key().0)?;
        debug!("parent input signed by {}", self.address());

        psbt.inputs[PARENT_INPUT_INDEX].tap_key_sig = Some(bitcoin::taproot::Signature {
            sig,
            hash_ty: TapSighashType::Default,
        });

        Ok(())
    }
}
