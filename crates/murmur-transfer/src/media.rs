//! Inline image shortcut.
//!
//! When everything selected is a small image, the transfer machinery is
//! skipped: each image is scaled to fit the configured bound, re-encoded as
//! JPEG and sent as a `data:` URL inside a single `image` message.
//!
//! The message is base64'd twice on its way out (inner envelope, then outer
//! envelope), so the data URLs must fit in 9/16 of the relay frame limit.
//! A selection that does not fit goes through the volume path instead.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use murmur_core::{ImagePayload, MurmurError, MurmurResult, TransferConfig};
use tracing::debug;

use crate::sender::SelectedFile;

const DATA_URL_PREFIX: &str = "data:";
const JPEG_QUALITY: u8 = 90;
/// Room for the JSON keys, IVs, MACs and padding of both envelopes.
const FRAME_OVERHEAD: usize = 4096;

fn media_error(e: impl std::fmt::Display) -> MurmurError {
    MurmurError::Other(anyhow::anyhow!("image: {e}"))
}

/// Whether a file qualifies for inline sending.
pub fn is_inline_image(file: &SelectedFile, max_bytes: u64) -> bool {
    file.data.len() as u64 <= max_bytes && image::guess_format(&file.data).is_ok()
}

/// Total data URL bytes an inline message may carry under `max_frame_bytes`.
pub fn inline_budget(max_frame_bytes: usize) -> usize {
    max_frame_bytes.saturating_sub(FRAME_OVERHEAD) / 16 * 9
}

/// Build the `image` payload when every file qualifies and the encoded
/// result fits one relay frame, otherwise `None` and the files go through
/// the regular transfer path.
pub fn inline_images(
    files: &[SelectedFile],
    config: &TransferConfig,
) -> MurmurResult<Option<ImagePayload>> {
    if files.is_empty()
        || !files
            .iter()
            .all(|f| is_inline_image(f, config.image_inline_max_bytes))
    {
        return Ok(None);
    }
    let images = files
        .iter()
        .map(|f| to_data_url(&f.data, config.image_max_dimension))
        .collect::<MurmurResult<Vec<_>>>()?;
    let encoded: usize = images.iter().map(String::len).sum();
    let budget = inline_budget(config.max_frame_bytes);
    if encoded > budget {
        debug!(encoded, budget, "inline images exceed one frame, sending as volumes");
        return Ok(None);
    }
    Ok(Some(ImagePayload {
        text: String::new(),
        images,
    }))
}

/// Decode, shrink to fit `max_dimension` (never enlarge), encode as JPEG.
/// Transparency is flattened.
pub fn to_data_url(bytes: &[u8], max_dimension: u32) -> MurmurResult<String> {
    let mut img = image::load_from_memory(bytes).map_err(media_error)?;
    let (w, h) = img.dimensions();
    if w > max_dimension || h > max_dimension {
        img = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    }
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&img.to_rgb8())
        .map_err(media_error)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

/// Split a base64 `data:` URL into its media type and bytes.
pub fn decode_data_url(url: &str) -> MurmurResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| media_error("not a data URL"))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| media_error("data URL without payload"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| media_error("data URL is not base64"))?;
    let bytes = STANDARD.decode(data).map_err(media_error)?;
    Ok((mime.to_string(), bytes))
}

/// File extension for a media type, for saving received images.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
