//! Building an outgoing transfer from the user's selection

use murmur_core::{
    FileComplete, FileControl, FileStart, FileVolume, MurmurError, MurmurResult, TransferConfig,
};
use rand::Rng;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::archive::build_archive;
use crate::compress::compress;
use crate::hash::hash_bytes;
use crate::volume::split_volumes;

/// One file picked for sending (or extracted from an archive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a file from disk, keeping only its final path component as name.
    pub fn read(path: &Path) -> MurmurResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| MurmurError::transfer(format!("{} has no file name", path.display())))?;
        let data = std::fs::read(path)?;
        Ok(Self { name, data })
    }
}

/// `file_<unix millis>_<9 base36 chars>`
pub fn new_file_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("file_{millis}_{suffix}")
}

/// A transfer with every volume built, ready to be paced onto the wire.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub start: FileStart,
    volumes: Vec<String>,
}

impl PreparedTransfer {
    /// Hash, compress and split the selection. Several files are archived
    /// first and the archive is what gets hashed.
    pub fn prepare(
        files: Vec<SelectedFile>,
        config: &TransferConfig,
        user_name: Option<&str>,
    ) -> MurmurResult<Self> {
        let file_id = new_file_id();

        let (file_name, payload, manifest) = match files.len() {
            0 => return Err(MurmurError::transfer("nothing selected to send")),
            1 => {
                let mut files = files;
                let file = files.remove(0);
                (file.name, file.data, None)
            }
            n => {
                let (archive, manifest) = build_archive(&files);
                (format!("{n} files"), archive, Some(manifest))
            }
        };

        let original_hash = hash_bytes(&payload);
        let compressed = compress(&payload, config.compression_level)?;
        let volumes = split_volumes(&compressed, config.volume_size);
        let total_volumes = u32::try_from(volumes.len())
            .map_err(|_| MurmurError::transfer("too many volumes"))?;

        debug!(
            file_id = %file_id,
            original = payload.len(),
            compressed = compressed.len(),
            volumes = total_volumes,
            "prepared transfer"
        );

        let is_archive = manifest.is_some();
        let start = FileStart {
            file_id,
            file_name,
            original_size: payload.len() as u64,
            compressed_size: compressed.len() as u64,
            total_volumes,
            original_hash,
            file_count: manifest.as_ref().map(|m| m.len() as u32),
            file_manifest: manifest,
            is_archive,
            user_name: user_name.map(str::to_string),
        };

        Ok(Self { start, volumes })
    }

    pub fn file_id(&self) -> &str {
        &self.start.file_id
    }

    pub fn total_volumes(&self) -> usize {
        self.volumes.len()
    }

    /// `file_start`, every `file_volume` in index order, then `file_complete`.
    pub fn into_messages(self) -> impl Iterator<Item = FileControl> {
        let file_id = self.start.file_id.clone();
        let last = self.volumes.len().saturating_sub(1);
        let volume_id = file_id.clone();

        let start = std::iter::once(FileControl::FileStart(self.start));
        let volumes = self
            .volumes
            .into_iter()
            .enumerate()
            .map(move |(index, volume_data)| {
                FileControl::FileVolume(FileVolume {
                    file_id: volume_id.clone(),
                    volume_index: index as u32,
                    volume_data,
                    is_last: index == last,
                })
            });
        let complete = std::iter::once(FileControl::FileComplete(FileComplete { file_id }));

        start.chain(volumes).chain(complete)
    }
}
