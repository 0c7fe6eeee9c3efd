//! Inscription identifiers, `{txid}i{index}`.

use std::str::FromStr;

use bitcoin::hashes::Hash;
use bitcoin::Txid;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::InscriptionParseError;
use crate::{MintError, MintResult};

#[derive(
    Debug,
    PartialEq,
    Copy,
    Clone,
    Hash,
    Eq,
    PartialOrd,
    Ord,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub struct InscriptionId {
    pub txid: Txid,
    pub index: u32,
}

impl InscriptionId {
    /// Inscription revealed in output `index` of `txid`.
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }

    /// Bytes carried by the parent tag of a child envelope.
    ///
    /// The txid in its serialized (little-endian) byte order followed by the
    /// little-endian index with trailing zero bytes stripped, so index 0
    /// contributes nothing.
    pub fn to_parent_bytes(&self) -> Vec<u8> {
        let index = self.index.to_le_bytes();
        let mut index_slice = index.as_slice();

        while index_slice.last().copied() == Some(0) {
            index_slice = &index_slice[0..index_slice.len() - 1];
        }

        self.txid
            .to_byte_array()
            .iter()
            .chain(index_slice)
            .copied()
            .collect()
    }

    /// Decodes the value of a parent tag back into an id.
    pub fn from_parent_bytes(bytes: &[u8]) -> MintResult<Self> {
        if bytes.len() < 32 || bytes.len() > 36 {
            return Err(MintError::Envelope(format!(
                "parent reference has {} bytes",
                bytes.len()
            )));
        }

        let (txid, index) = bytes.split_at(32);
        let mut txid_bytes = [0u8; 32];
        txid_bytes.copy_from_slice(txid);
        let mut index_bytes = [0u8; 4];
        index_bytes[..index.len()].copy_from_slice(index);

        Ok(Self {
            txid: Txid::from_byte_array(txid_bytes),
            index: u32::from_le_bytes(index_bytes),
        })
    }

    /// Creates a new InscriptionId from its string representation.
    pub fn parse_from_str(iid: &str) -> MintResult<Self> {
        Self::from_str(iid).map_err(MintError::InscriptionParser)
    }
}

impl std::fmt::Display for InscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}i{}", self.txid, self.index)
    }
}

impl FromStr for InscriptionId {
    type Err = InscriptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const TXID_LEN: usize = 64;

        if let Some(c) = s.chars().find(|c| !c.is_ascii()) {
            return Err(InscriptionParseError::Character(c));
        }
        if s.len() < TXID_LEN + 2 {
            return Err(InscriptionParseError::InscriptionIdLength(s.len()));
        }

        let (txid, rest) = s.split_at(TXID_LEN);
        let index = match rest.strip_prefix('i') {
            Some(index) => index,
            None => {
                let separator = rest.chars().next().unwrap_or_default();
                return Err(InscriptionParseError::CharacterSeparator(separator));
            }
        };

        let txid = Txid::from_str(txid)
            .map_err(|err| InscriptionParseError::Txid(err.to_string()))?;
        let index = index.parse().map_err(InscriptionParseError::Index)?;

        Ok(Self { txid, index })
    }
}
