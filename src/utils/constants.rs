use bitcoin::Amount;

pub const PROTOCOL_ID: [u8; 3] = *b"ord";
/// Outputs at or below this value are treated as dust and never created.
pub const DUST_LIMIT: Amount = Amount::from_sat(546);
/// Value carried by the inscribed output of the reveal transaction.
pub const POSTAGE: Amount = DUST_LIMIT;
/// Value of the parent inscription output passed forward on every reveal.
pub const PARENT_VALUE: Amount = DUST_LIMIT;
/// Extra sats the commit transaction must cover on top of its fee estimate.
pub const COMMIT_SAFETY_BUFFER: Amount = Amount::from_sat(400);
/// Fee rate in sat/vB used when neither the caller nor the provider supplies one.
pub const DEFAULT_FEE_RATE: u64 = 1;
/// Highest fee rate in sat/vB accepted from callers or providers.
pub const MAX_FEE_RATE: u64 = 10_000;
/// Highest reveal fee accepted when preparing a reveal.
pub const MAX_REVEAL_FEE: Amount = Amount::from_sat(100_000_000);
/// Largest data push allowed by the script interpreter.
pub const MAX_PUSH_SIZE: usize = 520;
pub const DEFAULT_RETRY_ATTEMPTS: usize = 20;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
/// Script type reported by esplora for taproot outputs.
pub const P2TR_SCRIPT_TYPE: &str = "v1_p2tr";
