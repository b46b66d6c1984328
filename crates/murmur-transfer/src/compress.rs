//! Raw DEFLATE (no zlib/gzip header), the stream format peers exchange.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use murmur_core::{MurmurError, MurmurResult};
use std::io::Read;

pub const DEFAULT_LEVEL: u32 = 6;

pub fn compress(data: &[u8], level: u32) -> MurmurResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(data, Compression::new(level.min(9)));
    let mut compressed = Vec::with_capacity(data.len() / 2 + 64);
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| MurmurError::Compression(format!("deflate: {e}")))?;
    Ok(compressed)
}

/// Inflate, refusing to produce more than `limit` bytes.
pub fn decompress(data: &[u8], limit: u64) -> MurmurResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(limit.saturating_add(1));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MurmurError::Compression(format!("inflate: {e}")))?;
    if out.len() as u64 > limit {
        return Err(MurmurError::Compression(format!(
            "inflated data exceeds declared size of {limit} bytes"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compresses_repetitive_data() {
        let data = vec![b'z'; 100_000];
        let c = compress(&data, DEFAULT_LEVEL).unwrap();
        assert!(c.len() < 1_000);
        assert_eq!(decompress(&c, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        let c = compress(&[], DEFAULT_LEVEL).unwrap();
        assert!(!c.is_empty());
        assert!(decompress(&c, 0).unwrap().is_empty());
    }

    #[test]
    fn test_limit_enforced() {
        let data = vec![0u8; 10_000];
        let c = compress(&data, DEFAULT_LEVEL).unwrap();
        assert!(matches!(decompress(&c, 9_999), Err(MurmurError::Compression(_))));
    }

    #[test]
    fn test_corrupt_stream() {
        assert!(decompress(&[0xff, 0xff, 0xff, 0xff], 1024).is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=8192),
            level in 0u32..=9,
        ) {
            let c = compress(&data, level).unwrap();
            prop_assert_eq!(decompress(&c, data.len() as u64).unwrap(), data);
        }
    }
}
