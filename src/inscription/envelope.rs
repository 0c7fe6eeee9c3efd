//! The inscription envelope committed to by the commit output's script leaf.
//!
//! ```text
//! <xonly> OP_CHECKSIG OP_FALSE OP_IF "ord" OP_1 <content type> [OP_3 <parent>] OP_0 <body chunks> OP_ENDIF
//! ```

use std::iter::Peekable;

use bitcoin::opcodes::all::{OP_CHECKSIG, OP_ENDIF, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_3};
use bitcoin::opcodes::{self, Opcode};
use bitcoin::script::{Builder as ScriptBuilder, Instruction, Instructions};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Script, ScriptBuf, Witness, XOnlyPublicKey};

use super::iid::InscriptionId;
use crate::utils::bytes_to_push_bytes;
use crate::utils::constants::{MAX_PUSH_SIZE, PROTOCOL_ID};
use crate::{MintError, MintResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InscriptionEnvelope {
    /// Key that must sign the script-path spend.
    pub x_only_pubkey: XOnlyPublicKey,
    pub content_type: Vec<u8>,
    pub content: Vec<u8>,
    /// Parent inscription this one is a child of.
    pub parent: Option<InscriptionId>,
}

/// Converts a 32-byte x-only or 33-byte compressed public key to x-only form.
pub fn to_x_only(pubkey: &[u8]) -> MintResult<XOnlyPublicKey> {
    let x_only = match pubkey.len() {
        32 => XOnlyPublicKey::from_slice(pubkey),
        33 => PublicKey::from_slice(pubkey).map(|key| key.x_only_public_key().0),
        len => {
            return Err(MintError::InvalidParameters(format!(
                "public key must be 32 or 33 bytes, got {len}"
            )))
        }
    };

    x_only.map_err(|err| MintError::InvalidParameters(format!("invalid public key: {err}")))
}

/// Hex variant of [`to_x_only`].
pub fn x_only_from_hex(pubkey: &str) -> MintResult<XOnlyPublicKey> {
    let bytes = hex::decode(pubkey)
        .map_err(|err| MintError::InvalidParameters(format!("invalid public key hex: {err}")))?;
    to_x_only(&bytes)
}

impl InscriptionEnvelope {
    pub fn new(
        x_only_pubkey: XOnlyPublicKey,
        content_type: impl Into<Vec<u8>>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            x_only_pubkey,
            content_type: content_type.into(),
            content: content.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<InscriptionId>) -> Self {
        self.parent = parent;
        self
    }

    /// Appends the envelope to `builder`.
    pub fn append_to_builder(&self, builder: ScriptBuilder) -> MintResult<ScriptBuilder> {
        let mut builder = builder
            .push_x_only_key(&self.x_only_pubkey)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(opcodes::OP_FALSE)
            .push_opcode(OP_IF)
            .push_slice(PROTOCOL_ID)
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(bytes_to_push_bytes(&self.content_type)?);

        if let Some(parent) = &self.parent {
            builder = builder
                .push_opcode(OP_PUSHNUM_3)
                .push_slice(bytes_to_push_bytes(&parent.to_parent_bytes())?);
        }

        builder = builder.push_opcode(opcodes::OP_0);
        for chunk in self.content.chunks(MAX_PUSH_SIZE) {
            builder = builder.push_slice(bytes_to_push_bytes(chunk)?);
        }

        Ok(builder.push_opcode(OP_ENDIF))
    }

    pub fn to_script(&self) -> MintResult<ScriptBuf> {
        Ok(self.append_to_builder(ScriptBuilder::new())?.into_script())
    }

    /// Reads an envelope back from the tapscript of a script-path witness.
    pub fn from_witness(witness: &Witness) -> MintResult<Self> {
        let tapscript = witness
            .tapscript()
            .ok_or_else(|| MintError::Envelope("witness has no tapscript".to_string()))?;
        Self::from_script(tapscript)
    }

    /// Parses a compiled inscription script.
    pub fn from_script(script: &Script) -> MintResult<Self> {
        let mut instructions = script.instructions().peekable();

        let x_only_pubkey = match next_instruction(&mut instructions)? {
            Instruction::PushBytes(bytes) => XOnlyPublicKey::from_slice(bytes.as_bytes())
                .map_err(|err| MintError::Envelope(format!("bad key push: {err}")))?,
            other => return Err(unexpected("x-only key", other)),
        };
        expect_opcode(&mut instructions, OP_CHECKSIG)?;
        expect_push(&mut instructions, &[])?;
        expect_opcode(&mut instructions, OP_IF)?;
        expect_push(&mut instructions, &PROTOCOL_ID)?;
        expect_opcode(&mut instructions, OP_PUSHNUM_1)?;
        let content_type = match next_instruction(&mut instructions)? {
            Instruction::PushBytes(bytes) => bytes.as_bytes().to_vec(),
            other => return Err(unexpected("content type", other)),
        };

        let mut parent = None;
        if matches!(instructions.peek(), Some(Ok(Instruction::Op(op))) if *op == OP_PUSHNUM_3) {
            instructions.next();
            parent = match next_instruction(&mut instructions)? {
                Instruction::PushBytes(bytes) => {
                    Some(InscriptionId::from_parent_bytes(bytes.as_bytes())?)
                }
                other => return Err(unexpected("parent reference", other)),
            };
        }

        expect_push(&mut instructions, &[])?;

        let mut content = Vec::new();
        loop {
            match next_instruction(&mut instructions)? {
                Instruction::PushBytes(bytes) => content.extend_from_slice(bytes.as_bytes()),
                Instruction::Op(op) if op == OP_ENDIF => break,
                other => return Err(unexpected("body chunk", other)),
            }
        }

        if instructions.next().is_some() {
            return Err(MintError::Envelope(
                "trailing instructions after OP_ENDIF".to_string(),
            ));
        }

        Ok(Self {
            x_only_pubkey,
            content_type,
            content,
            parent,
        })
    }
}

fn next_instruction<'a>(
    instructions: &mut Peekable<Instructions<'a>>,
) -> MintResult<Instruction<'a>> {
    instructions
        .next()
        .ok_or_else(|| MintError::Envelope("script ended early".to_string()))?
        .map_err(|err| MintError::Envelope(err.to_string()))
}

fn expect_opcode(instructions: &mut Peekable<Instructions>, expected: Opcode) -> MintResult<()> {
    match next_instruction(instructions)? {
        Instruction::Op(op) if op == expected => Ok(()),
        other => Err(unexpected(&expected.to_string(), other)),
    }
}

fn expect_push(instructions: &mut Peekable<Instructions>, expected: &[u8]) -> MintResult<()> {
    match next_instruction(instructions)? {
        Instruction::PushBytes(bytes) if bytes.as_bytes() == expected => Ok(()),
        other => Err(unexpected(&format!("push of {}", hex::encode(expected)), other)),
    }
}

fn unexpected(expected: &str, found: Instruction) -> MintError {
    MintError::Envelope(format!("expected {expected}, found {found:?}"))
}

#[cfg(test)]
mod tests {
    use bitcoin::script::Instruction;

    use super::*;
    use crate::utils::test_utils::ordinals_keypair;

    fn envelope(content: Vec<u8>) -> InscriptionEnvelope {
        let (_, x_only) = ordinals_keypair();
        InscriptionEnvelope::new(x_only, "image/png", content)
    }

    #[test]
    fn test_chunked_body_reads_back() {
        for len in [0, 1, 519, 520, 521, 1040, 1041, 5_000] {
            let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let envelope = envelope(content.clone());
            let script = envelope.to_script().unwrap();

            let decoded = InscriptionEnvelope::from_script(&script).unwrap();
            assert_eq!(decoded.content, content, "length {len}");
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn test_body_pushes_never_exceed_limit() {
        let script = envelope(vec![7; 1041]).to_script().unwrap();
        let pushes: Vec<usize> = script
            .instructions()
            .filter_map(|instruction| match instruction.unwrap() {
                Instruction::PushBytes(bytes) => Some(bytes.len()),
                Instruction::Op(_) => None,
            })
            .collect();

        // key, OP_FALSE, "ord", content type, OP_0, then 520 + 520 + 1
        assert_eq!(pushes, vec![32, 0, 3, 9, 0, 520, 520, 1]);
    }

    #[test]
    fn test_should_layout_script() {
        let (_, x_only) = ordinals_keypair();
        let script = envelope(b"hi".to_vec()).to_script().unwrap();
        let bytes = script.as_bytes();

        assert_eq!(bytes[0], 0x20);
        assert_eq!(&bytes[1..33], &x_only.serialize());
        assert_eq!(bytes[33], OP_CHECKSIG.to_u8());
        assert_eq!(bytes[34], 0x00);
        assert_eq!(bytes[35], OP_IF.to_u8());
        assert_eq!(&bytes[36..40], &[0x03, b'o', b'r', b'd']);
        assert_eq!(bytes[40], OP_PUSHNUM_1.to_u8());
        assert_eq!(bytes[41], 9);
        assert_eq!(&bytes[42..51], b"image/png");
        assert_eq!(bytes[51], 0x00);
        assert_eq!(&bytes[52..55], &[0x02, b'h', b'i']);
        assert_eq!(bytes[55], OP_ENDIF.to_u8());
        assert_eq!(bytes.len(), 56);
    }

    #[test]
    fn test_parent_tag_precedes_body() {
        let parent = InscriptionId::parse_from_str(
            "6fb976ab49dcec017f1e201e84395983204ae1a7c2abf7ced0a85d692e442799i0",
        )
        .unwrap();
        let envelope = envelope(vec![1, 2, 3]).with_parent(Some(parent));
        let script = envelope.to_script().unwrap();

        let instructions: Vec<Instruction> =
            script.instructions().map(|i| i.unwrap()).collect();
        assert_eq!(instructions[7], Instruction::Op(OP_PUSHNUM_3));
        match &instructions[8] {
            Instruction::PushBytes(bytes) => {
                assert_eq!(bytes.as_bytes(), parent.to_parent_bytes().as_slice())
            }
            other => panic!("unexpected {other:?}"),
        }

        let decoded = InscriptionEnvelope::from_script(&script).unwrap();
        assert_eq!(decoded.parent, Some(parent));
        assert_eq!(decoded.content, vec![1, 2, 3]);
    }

    #[test]
    fn test_should_read_envelope_from_reveal_witness() {
        let envelope = envelope(b"hello".to_vec());
        let script = envelope.to_script().unwrap();

        // signature, tapscript, control block
        let witness = Witness::from_slice(&[vec![1; 64], script.to_bytes(), vec![0xc0; 33]]);
        assert_eq!(InscriptionEnvelope::from_witness(&witness).unwrap(), envelope);

        let key_spend = Witness::from_slice(&[vec![1; 64]]);
        assert!(matches!(
            InscriptionEnvelope::from_witness(&key_spend),
            Err(MintError::Envelope(_))
        ));
    }

    #[test]
    fn test_should_reject_foreign_scripts() {
        let (_, x_only) = ordinals_keypair();
        let script = ScriptBuilder::new()
            .push_x_only_key(&x_only)
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert!(matches!(
            InscriptionEnvelope::from_script(&script),
            Err(MintError::Envelope(_))
        ));

        let mut bytes = envelope(vec![9; 10]).to_script().unwrap().into_bytes();
        bytes.push(OP_CHECKSIG.to_u8());
        assert!(InscriptionEnvelope::from_script(Script::from_bytes(&bytes)).is_err());
    }

    #[test]
    fn test_should_convert_keys_to_x_only() {
        let (keypair, x_only) = ordinals_keypair();
        let compressed = keypair.public_key().serialize();

        assert_eq!(to_x_only(&compressed).unwrap(), x_only);
        assert_eq!(to_x_only(&x_only.serialize()).unwrap(), x_only);
        assert_eq!(x_only_from_hex(&hex::encode(compressed)).unwrap(), x_only);
        assert!(matches!(
            to_x_only(&[2u8; 20]),
            Err(MintError::InvalidParameters(_))
        ));
        assert!(x_only_from_hex("zz").is_err());
    }

    #[test]
    fn test_both_parities_share_x_only_key() {
        const X: [u8; 32] =
            hex_literal::hex!("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
        let even = hex_literal::hex!(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        let odd = hex_literal::hex!(
            "0379be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );

        assert_eq!(to_x_only(&even).unwrap().serialize(), X);
        assert_eq!(to_x_only(&odd).unwrap().serialize(), X);
    }
}
