//! Conversion between hexadecimal version directory names and `u32` versions.
//!
//! Version directories are named with hex digits, sometimes with leading
//! zeros and sometimes with an odd digit count. Decoding strips the leading
//! zeros, pads to whole bytes, and reads the bytes as a big-endian `u32`, so
//! numeric order of the names and order of the decoded values agree.

use crate::error::{Error, Result};

/// Maximum number of significant hex digits a version name may carry.
pub const MAX_VERSION_DIGITS: usize = 8;

/// Decode a version directory name into a comparable integer.
///
/// Fails with [`Error::InvalidVersionName`] for empty or non-hex names and
/// with [`Error::VersionOutOfRange`] when more than eight significant digits
/// remain after stripping leading zeros.
pub fn decode(name: &str) -> Result<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidVersionName(name.to_string()));
    }

    let digits = name.trim_start_matches('0');
    if digits.len() > MAX_VERSION_DIGITS {
        return Err(Error::VersionOutOfRange(name.to_string()));
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    let bytes = hex::decode(&padded).map_err(|_| Error::InvalidVersionName(name.to_string()))?;

    let mut buf = [0u8; 4];
    buf[4 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u32::from_be_bytes(buf))
}

/// Encode a version as its canonical directory name (lowercase, even length).
pub fn encode(version: u32) -> String {
    let bytes = version.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    hex::encode(&bytes[first..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_basic() {
        assert_eq!(decode("00").unwrap(), 0);
        assert_eq!(decode("01").unwrap(), 1);
        assert_eq!(decode("ff").unwrap(), 255);
        assert_eq!(decode("100").unwrap(), 256);
        assert_eq!(decode("ffffffff").unwrap(), u32::MAX);
    }

    #[test]
    fn test_decode_odd_length_and_leading_zeros() {
        assert_eq!(decode("abc").unwrap(), 0xabc);
        assert_eq!(decode("000abc").unwrap(), 0xabc);
        assert_eq!(decode("0000000000000001").unwrap(), 1);
        assert_eq!(decode("0").unwrap(), 0);
    }

    #[test]
    fn test_decode_case_insensitive() {
        assert_eq!(decode("ABCDEF").unwrap(), decode("abcdef").unwrap());
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        assert!(matches!(decode(""), Err(Error::InvalidVersionName(_))));
        assert!(matches!(decode("0x10"), Err(Error::InvalidVersionName(_))));
        assert!(matches!(decode("__data"), Err(Error::InvalidVersionName(_))));
    }

    #[test]
    fn test_decode_rejects_too_long() {
        let err = decode("123456789").unwrap_err();
        assert!(matches!(err, Error::VersionOutOfRange(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(0), "00");
        assert_eq!(encode(1), "01");
        assert_eq!(encode(0xabc), "0abc");
        assert_eq!(encode(u32::MAX), "ffffffff");
    }

    proptest! {
        #[test]
        fn prop_decode_is_monotonic(a in any::<u32>(), b in any::<u32>()) {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            prop_assume!(lo != hi);
            let lo_name = format!("{:x}", lo);
            let hi_name = format!("{:x}", hi);
            prop_assert!(decode(&lo_name).unwrap() < decode(&hi_name).unwrap());
        }

        #[test]
        fn prop_leading_zeros_do_not_matter(v in any::<u32>(), zeros in 0usize..8) {
            let name = format!("{}{:x}", "0".repeat(zeros), v);
            prop_assert_eq!(decode(&name).unwrap(), v);
        }

        #[test]
        fn prop_encode_inverts_decode(v in any::<u32>()) {
            prop_assert_eq!(decode(&encode(v)).unwrap(), v);
        }
    }
}
