//! Volumes: fixed-size slices of the compressed stream, each base64 encoded
//! on its own. Decoding reverses each volume separately, then concatenates.

use base64::{engine::general_purpose::STANDARD, Engine};
use murmur_core::{MurmurError, MurmurResult};

pub const DEFAULT_VOLUME_SIZE: usize = 256 * 1024;

/// Split `data` into base64 volumes of at most `volume_size` raw bytes.
/// Empty input still yields one (empty) volume so every transfer has a last one.
pub fn split_volumes(data: &[u8], volume_size: usize) -> Vec<String> {
    if data.is_empty() {
        return vec![String::new()];
    }
    data.chunks(volume_size.max(1))
        .map(|chunk| STANDARD.encode(chunk))
        .collect()
}

pub fn join_volumes<S: AsRef<str>>(volumes: &[S]) -> MurmurResult<Vec<u8>> {
    let mut out = Vec::new();
    for (index, volume) in volumes.iter().enumerate() {
        let bytes = STANDARD
            .decode(volume.as_ref())
            .map_err(|e| MurmurError::transfer(format!("volume {index}: bad base64: {e}")))?;
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}
