pub mod builder;
pub mod finalize;
pub mod txid;

pub use finalize::{extract_transaction, finalize_inputs};
pub use txid::{predict_txid, predict_txid_base64};
