pub mod content;
pub mod envelope;
pub mod iid;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Amount, FeeRate, Network, ScriptBuf, XOnlyPublicKey};

use self::envelope::InscriptionEnvelope;
use self::iid::InscriptionId;
use crate::provider::ContentGenerator;
use crate::utils::constants::POSTAGE;
use crate::utils::fees::estimate_reveal_fee;
use crate::wallet::builder::taproot::TaprootReveal;
use crate::{MintResult, RevealFunding};

/// Inputs of [`generate_inscription_data`].
#[derive(Debug, Clone)]
pub struct InscriptionRequest<'a> {
    pub ordinals_address: &'a str,
    pub mint_index: u64,
    /// Key that signs the reveal's script-path spend.
    pub ordinals_key: XOnlyPublicKey,
    pub fee_rate: FeeRate,
    pub parent: Option<InscriptionId>,
    pub funding: RevealFunding,
    pub network: Network,
}

/// Everything the commit and reveal builders need to know about one mint.
#[derive(Debug, Clone)]
pub struct InscriptionData {
    pub content_type: String,
    pub content: Vec<u8>,
    pub inscription_script: ScriptBuf,
    pub taproot: TaprootReveal,
    /// Value of the commit output spent by the reveal.
    pub taproot_reveal_value: Amount,
    pub reveal_fee: Amount,
    pub postage: Amount,
}

impl InscriptionData {
    /// Output script of the commit output.
    pub fn taproot_reveal_script(&self) -> ScriptBuf {
        self.taproot.script_pubkey()
    }
}

/// Generates the content for a mint and derives its envelope and taproot
/// output.
///
/// The result only depends on the request and the generator, so the reveal
/// can rebuild exactly what the commit paid to.
pub async fn generate_inscription_data(
    generator: &dyn ContentGenerator,
    request: &InscriptionRequest<'_>,
) -> MintResult<InscriptionData> {
    let generated = generator
        .generate(request.ordinals_address, request.mint_index)
        .await?;

    let envelope = InscriptionEnvelope::new(
        request.ordinals_key,
        generated.content_type.as_bytes(),
        generated.content,
    )
    .with_parent(request.parent);
    let inscription_script = envelope.to_script()?;
    debug!("inscription script: {} bytes", inscription_script.len());

    let secp = Secp256k1::new();
    let taproot = TaprootReveal::build(
        &secp,
        request.ordinals_key,
        &inscription_script,
        request.network,
    )?;

    let reveal_fee = estimate_reveal_fee(envelope.content.len(), request.fee_rate);
    debug!("reveal fee estimate: {reveal_fee}");

    Ok(InscriptionData {
        content_type: generated.content_type,
        content: envelope.content,
        inscription_script,
        taproot,
        taproot_reveal_value: request.funding.reveal_value(reveal_fee),
        reveal_fee,
        postage: POSTAGE,
    })
}
