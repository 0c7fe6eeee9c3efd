pub mod constants;
pub mod fees;
mod push_bytes;
pub mod retry;
#[cfg(test)]
pub mod test_utils;

pub use push_bytes::bytes_to_push_bytes;
pub use retry::retry;
