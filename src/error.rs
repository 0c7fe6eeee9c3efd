use std::num::ParseIntError;

use serde::Serialize;
use thiserror::Error;

/// Message returned to clients for failures they cannot act upon.
pub const GENERIC_ERROR_MESSAGE: &str = "Oops something went wrong";

/// Inscription id parse errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InscriptionParseError {
    #[error("invalid character: '{0}'")]
    Character(char),
    #[error("invalid inscription id length: {0}")]
    InscriptionIdLength(usize),
    #[error("invalid separator: '{0}'")]
    CharacterSeparator(char),
    #[error("invalid txid: {0}")]
    Txid(String),
    #[error("invalid index: {0}")]
    Index(ParseIntError),
}

/// Minting errors
#[derive(Error, Debug)]
pub enum MintError {
    #[error("Insufficient funds. Required: {required} sats, Available: {available} sats for payment address: {address}")]
    InsufficientFunds {
        required: u64,
        available: u64,
        address: String,
    },
    #[error("no spendable UTXOs found for {address} after {attempts} attempts")]
    NoUsableFunds { address: String, attempts: usize },
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("no parent inscription UTXO found at oracle address {0}")]
    ParentNotFound(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid inscription id: {0}")]
    InscriptionParser(#[from] InscriptionParseError),
    #[error("malformed inscription envelope: {0}")]
    Envelope(String),
    #[error("failed to compute taproot output")]
    TaprootCompute,
    #[error("invalid PSBT layout: {role} at position {position}")]
    SlotOrder { role: String, position: usize },
    #[error("Bitcoin PSBT error: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),
    #[error("Bitcoin sighash error: {0}")]
    BitcoinSigHash(#[from] bitcoin::sighash::Error),
    #[error("Bitcoin script error: {0}")]
    PushBytes(#[from] bitcoin::script::PushBytesError),
    #[error("Bitcoin key error: {0}")]
    Key(#[from] bitcoin::key::Error),
    #[error("Bitcoin address error: {0}")]
    Address(#[from] bitcoin::address::Error),
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Stable, client-facing classification of a [`MintError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InsufficientFunds,
    InvalidParameters,
    SigningFailed,
    BroadcastFailed,
    NetworkError,
    OperationFailed,
}

impl ErrorCode {
    /// HTTP status used when the error crosses an API boundary.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorCode::InsufficientFunds
            | ErrorCode::InvalidParameters
            | ErrorCode::SigningFailed => 400,
            ErrorCode::BroadcastFailed | ErrorCode::OperationFailed => 500,
            ErrorCode::NetworkError => 503,
        }
    }
}

/// Body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MintError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MintError::InsufficientFunds { .. } | MintError::NoUsableFunds { .. } => {
                ErrorCode::InsufficientFunds
            }
            MintError::InvalidParameters(_)
            | MintError::InscriptionParser(_)
            | MintError::Key(_)
            | MintError::Address(_) => ErrorCode::InvalidParameters,
            MintError::SigningFailed(_) | MintError::Secp256k1(_) => ErrorCode::SigningFailed,
            MintError::BroadcastFailed(_) => ErrorCode::BroadcastFailed,
            MintError::Network(_) | MintError::Http(_) => ErrorCode::NetworkError,
            MintError::OperationFailed(_)
            | MintError::ParentNotFound(_)
            | MintError::Config(_)
            | MintError::Envelope(_)
            | MintError::TaprootCompute
            | MintError::SlotOrder { .. }
            | MintError::Psbt(_)
            | MintError::BitcoinSigHash(_)
            | MintError::PushBytes(_)
            | MintError::Codec(_) => ErrorCode::OperationFailed,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.code().status_code()
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MintError::Network(_) | MintError::Http(_))
    }

    /// Converts the error into the body sent to clients.
    ///
    /// Internal failures are logged here with full context and replaced by a
    /// generic message.
    pub fn to_response(&self) -> ErrorResponse {
        let code = self.code();
        match code {
            ErrorCode::OperationFailed => {
                error!("internal error: {self:?}");
                ErrorResponse {
                    code,
                    error: GENERIC_ERROR_MESSAGE.to_string(),
                    details: None,
                }
            }
            ErrorCode::NetworkError => ErrorResponse {
                code,
                error: "Chain data provider is unavailable, please retry".to_string(),
                details: Some(self.to_string()),
            },
            _ => ErrorResponse {
                code,
                error: self.to_string(),
                details: None,
            },
        }
    }
}
