use crate::MintError;

pub type MintResult<T> = std::result::Result<T, MintError>;
