//! Zero padding to the AES block size.
//!
//! `pad` appends 0..=15 zero bytes. `unpad` removes trailing zeros but never
//! more than 15, so it only undoes what `pad` could have added. The codec pads
//! JSON text, which never ends in a NUL byte, so the pair is exact for every
//! payload the codec produces.

use crate::BLOCK_SIZE;

pub fn pad(data: &[u8]) -> Vec<u8> {
    let rem = data.len() % BLOCK_SIZE;
    let fill = if rem == 0 { 0 } else { BLOCK_SIZE - rem };
    let mut out = Vec::with_capacity(data.len() + fill);
    out.extend_from_slice(data);
    out.resize(data.len() + fill, 0);
    out
}

pub fn unpad(data: &[u8]) -> &[u8] {
    let zeros = data
        .iter()
        .rev()
        .take(BLOCK_SIZE - 1)
        .take_while(|&&b| b == 0)
        .count();
    &data[..data.len() - zeros]
}
