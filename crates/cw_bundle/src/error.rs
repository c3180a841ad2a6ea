use std::io;

use thiserror::Error;

/// Errors that can occur while reading or writing a bundle.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("binrw error: {0}")]
    BinRw(#[from] binrw::Error),

    #[error("failed to decode record fields: {0}")]
    FieldDecode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode record fields: {0}")]
    FieldEncode(#[from] rmp_serde::encode::Error),

    #[error("block {index} declared {declared} bytes but decoded to {actual}")]
    BlockSizeMismatch {
        index: usize,
        declared: u32,
        actual: usize,
    },

    #[error("record stream truncated at record {0}")]
    TruncatedRecords(usize),

    #[error("payload too large for a single block: {0} bytes")]
    PayloadTooLarge(usize),
}
