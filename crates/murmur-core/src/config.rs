use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MurmurError, MurmurResult};

/// Top-level configuration (loaded from murmur.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub relay: RelayConfig,
    pub client: ClientConfig,
    pub transfer: TransferConfig,
}

impl MurmurConfig {
    /// Parse a config file. A missing file is an error here; callers decide
    /// whether to fall back to defaults.
    pub fn from_file(path: &Path) -> MurmurResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> MurmurResult<Self> {
        toml::from_str(content).map_err(|e| MurmurError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket + metrics listen address (default: 0.0.0.0:8088)
    pub listen: String,
    /// RSA modulus size for the transport keypair (default: 2048)
    pub rsa_bits: usize,
    /// Per-connection outbound queue depth
    pub outbound_queue: usize,
    /// Largest accepted WebSocket frame in bytes (default: 4 MiB)
    pub max_frame_bytes: usize,
    /// Serve /metrics alongside /ws
    pub metrics: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8088".into(),
            rsa_bits: 2048,
            outbound_queue: 1024,
            max_frame_bytes: 4 * 1024 * 1024,
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay WebSocket URL
    pub relay_url: String,
    /// Display name announced to peers
    pub user_name: String,
    /// Where /save writes received files
    pub download_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8088/ws".into(),
            user_name: "anonymous".into(),
            download_dir: PathBuf::from("."),
        }
    }
}

/// File transfer tuning. Both ends only need to agree on the wire format,
/// not on these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes of compressed data per volume (default: 256 KiB)
    pub volume_size: usize,
    /// Volumes released per pacing tick (default: 5)
    pub batch_size: usize,
    /// Delay between batches in milliseconds (default: 100)
    pub batch_interval_ms: u64,
    /// DEFLATE level 0-9 (default: 6)
    pub compression_level: u32,
    /// Images up to this size are sent inline instead of as volumes
    pub image_inline_max_bytes: u64,
    /// Longest edge of an inline image after resizing
    pub image_max_dimension: u32,
    /// Frame limit of the relay we send through (default: 4 MiB, the relay
    /// default). Inline images that would not fit go as volumes instead.
    pub max_frame_bytes: usize,
}

impl TransferConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            volume_size: 256 * 1024,
            batch_size: 5,
            batch_interval_ms: 100,
            compression_level: 6,
            image_inline_max_bytes: 8 * 1024 * 1024,
            image_max_dimension: 1280,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}
