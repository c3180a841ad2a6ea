//! Reader and writer for block-compressed asset bundle containers.
//!
//! A bundle is laid out as a header followed by raw block bytes:
//!
//! ```text
//! "CWBF" | format_version: u32 | block_count: u32
//! block_count x { uncompressed_size: u32, compressed_size: u32, compression: u8 }
//! block data ...
//! ```
//!
//! All integers are big-endian. The decompressed, concatenated block data is a
//! record stream: a `u32` record count followed by records of
//! `{ path_id: i64, class_id: u32, payload_len: u32, payload }`, where the
//! payload is a MessagePack map of field name to [`FieldValue`].
//!
//! The header can be read on its own with [`BundleHeader::read_from`], which
//! is what size estimation relies on.

mod bundle;
mod error;
mod header;
mod record;

pub use bundle::{Bundle, BLOCK_SIZE};
pub use error::BundleError;
pub use header::{
    BlockInfo, BundleCompression, BundleHeader, BUNDLE_FORMAT_VERSION, HEADER_PREFIX_LEN,
};
pub use record::{FieldValue, Record};

/// Well-known record class ids.
pub mod class {
    /// Behaviour component carrying serialized script fields.
    pub const BEHAVIOUR: u32 = 114;
    /// Script definition; `m_ClassName` names the behaviour class.
    pub const SCRIPT: u32 = 115;
    /// Bundle manifest; carries the engine version the bundle was built with.
    pub const ASSET_BUNDLE: u32 = 142;
}
