use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::taproot::{ControlBlock, LeafVersion, TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Address, Amount, Network, ScriptBuf, TxOut, XOnlyPublicKey};

use crate::{MintError, MintResult};

/// Taproot output committing to a single inscription script leaf.
#[derive(Debug, Clone)]
pub struct TaprootReveal {
    pub address: Address,
    pub inscription_script: ScriptBuf,
    pub control_block: ControlBlock,
    pub spend_info: TaprootSpendInfo,
}

impl TaprootReveal {
    /// Build the taproot output for `inscription_script` with `internal_key`
    /// as the key-path key.
    pub fn build(
        secp: &Secp256k1<All>,
        internal_key: XOnlyPublicKey,
        inscription_script: &ScriptBuf,
        network: Network,
    ) -> MintResult<Self> {
        let spend_info = TaprootBuilder::new()
            .add_leaf(0, inscription_script.clone())
            .map_err(|_| MintError::TaprootCompute)?
            .finalize(secp, internal_key)
            .map_err(|_| MintError::TaprootCompute)?;

        let control_block = spend_info
            .control_block(&(inscription_script.clone(), LeafVersion::TapScript))
            .ok_or(MintError::TaprootCompute)?;

        Ok(Self {
            address: Address::p2tr_tweaked(spend_info.output_key(), network),
            inscription_script: inscription_script.clone(),
            control_block,
            spend_info,
        })
    }

    /// Output script of the commit output.
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub fn txout(&self, value: Amount) -> TxOut {
        TxOut {
            value,
            script_pubkey: self.script_pubkey(),
        }
    }

    pub fn leaf(&self) -> (ScriptBuf, LeafVersion) {
        (self.inscription_script.clone(), LeafVersion::TapScript)
    }
}
