//! murmur-transfer: chunked file transfer over encrypted messages
//!
//! # Overview
//! - `hash`: SHA-256 hex digests (end-to-end integrity)
//! - `compress`: raw DEFLATE
//! - `volume`: splitting compressed bytes into base64 volumes and back
//! - `archive`: multi-file archive records + manifest
//! - `sender`: building a transfer from selected files
//! - `pacer`: batched, rate-limited release of ready messages
//! - `receiver`: per-transfer reassembly and verification
//! - `table`: every transfer a session knows about
//! - `media`: inline image shortcut (resize, JPEG data URL, frame budget)
//!
//! Pipeline:
//! ```text
//! files → [archive] → sha256 → deflate → volumes(base64)
//!       → file_start, file_volume×N, file_complete
//! ```

pub mod archive;
pub mod compress;
pub mod hash;
pub mod media;
pub mod pacer;
pub mod receiver;
pub mod sender;
pub mod table;
pub mod volume;

pub use archive::{build_archive, extract_archive};
pub use compress::{compress, decompress};
pub use hash::hash_bytes;
pub use media::{inline_budget, inline_images, is_inline_image};
pub use pacer::Pacer;
pub use receiver::{IncomingTransfer, ReceivedFiles};
pub use sender::{new_file_id, PreparedTransfer, SelectedFile};
pub use table::{Direction, OutgoingRecord, TransferSummary, TransferTable, TransferUpdate};
pub use volume::{join_volumes, split_volumes};

/// Lifecycle of one transfer on either end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Sending,
    Receiving,
    Completed,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransferStatus::Sending => "sending",
            TransferStatus::Receiving => "receiving",
            TransferStatus::Completed => "completed",
        })
    }
}
