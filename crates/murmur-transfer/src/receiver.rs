//! Reassembly of one incoming transfer.
//!
//! A record is created by `file_start` with one slot per volume. Volumes fill
//! slots by index (a repeat overwrites, an out-of-range index is an error).
//! Only an explicit `file_complete` with every slot filled moves the record to
//! Completed; reconstruction is refused before that. Reconstruction inflates,
//! re-hashes and compares against the sender's hash, and hands out no bytes on
//! a mismatch.

use murmur_core::{ClientId, FileStart, FileVolume, MurmurError, MurmurResult};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::archive::extract_archive;
use crate::compress::decompress;
use crate::hash::hash_bytes;
use crate::sender::SelectedFile;
use crate::volume::join_volumes;
use crate::TransferStatus;

/// Upper bound on volumes a peer may announce (16 GiB at the default size).
pub const MAX_VOLUMES: u32 = 65_536;

#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub start: FileStart,
    pub sender: ClientId,
    pub private: bool,
    pub status: TransferStatus,
    received: BTreeSet<u32>,
    volumes: Vec<Option<String>>,
}

impl IncomingTransfer {
    pub fn new(sender: ClientId, start: FileStart, private: bool) -> MurmurResult<Self> {
        if start.total_volumes == 0 || start.total_volumes > MAX_VOLUMES {
            return Err(MurmurError::transfer(format!(
                "{}: announced {} volumes (allowed 1..={MAX_VOLUMES})",
                start.file_id, start.total_volumes
            )));
        }
        if start.is_archive && start.file_manifest.is_none() {
            return Err(MurmurError::transfer(format!(
                "{}: archive without a manifest",
                start.file_id
            )));
        }
        let slots = start.total_volumes as usize;
        Ok(Self {
            start,
            sender,
            private,
            status: TransferStatus::Receiving,
            received: BTreeSet::new(),
            volumes: vec![None; slots],
        })
    }

    pub fn file_id(&self) -> &str {
        &self.start.file_id
    }

    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    pub fn total_volumes(&self) -> usize {
        self.volumes.len()
    }

    pub fn missing(&self) -> Vec<u32> {
        (0..self.start.total_volumes)
            .filter(|i| !self.received.contains(i))
            .collect()
    }

    /// Store one volume. Returns the number of distinct volumes held.
    pub fn accept_volume(&mut self, volume: FileVolume) -> MurmurResult<usize> {
        if self.status == TransferStatus::Completed {
            return Err(MurmurError::transfer(format!(
                "{}: volume {} after completion",
                self.start.file_id, volume.volume_index
            )));
        }
        let index = volume.volume_index;
        let slot = self.volumes.get_mut(index as usize).ok_or_else(|| {
            MurmurError::transfer(format!(
                "{}: volume index {index} out of range 0..{}",
                volume.file_id, self.start.total_volumes
            ))
        })?;
        if slot.is_some() {
            debug!(file_id = %volume.file_id, index, "duplicate volume overwritten");
        }
        *slot = Some(volume.volume_data);
        self.received.insert(index);
        Ok(self.received.len())
    }

    /// Handle `file_complete`. Returns whether the record is now Completed;
    /// with volumes missing it stays Receiving.
    pub fn mark_complete(&mut self) -> bool {
        if self.received.len() == self.volumes.len() {
            self.status = TransferStatus::Completed;
            true
        } else {
            warn!(
                file_id = %self.start.file_id,
                received = self.received.len(),
                total = self.volumes.len(),
                "file_complete with volumes missing"
            );
            false
        }
    }

    /// Rebuild and verify the original bytes.
    pub fn reconstruct(&self) -> MurmurResult<ReceivedFiles> {
        if self.status != TransferStatus::Completed {
            return Err(MurmurError::transfer(format!(
                "{}: incomplete ({} of {} volumes, completed: no)",
                self.start.file_id,
                self.received.len(),
                self.volumes.len()
            )));
        }

        let volumes: Vec<&str> = self
            .volumes
            .iter()
            .map(|v| v.as_deref().unwrap_or_default())
            .collect();
        let compressed = join_volumes(&volumes)?;
        let payload = decompress(&compressed, self.start.original_size)?;

        let actual = hash_bytes(&payload);
        if actual != self.start.original_hash {
            return Err(MurmurError::Integrity {
                file_id: self.start.file_id.clone(),
                expected: self.start.original_hash.clone(),
                actual,
            });
        }

        match &self.start.file_manifest {
            Some(manifest) if self.start.is_archive => {
                Ok(ReceivedFiles::Archive(extract_archive(&payload, manifest)?))
            }
            _ => Ok(ReceivedFiles::Single(SelectedFile::new(
                self.start.file_name.clone(),
                payload,
            ))),
        }
    }
}

/// Verified output of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedFiles {
    Single(SelectedFile),
    Archive(Vec<SelectedFile>),
}

impl ReceivedFiles {
    pub fn files(&self) -> &[SelectedFile] {
        match self {
            ReceivedFiles::Single(f) => std::slice::from_ref(f),
            ReceivedFiles::Archive(fs) => fs,
        }
    }

    /// Write every file under `dir`. Names that would escape `dir` are
    /// refused before anything is written.
    pub fn write_to(&self, dir: &Path) -> MurmurResult<Vec<PathBuf>> {
        let targets = self
            .files()
            .iter()
            .map(|f| safe_join(dir, &f.name).map(|p| (p, f)))
            .collect::<MurmurResult<Vec<_>>>()?;

        let mut written = Vec::with_capacity(targets.len());
        for (path, file) in targets {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &file.data)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn safe_join(dir: &Path, name: &str) -> MurmurResult<PathBuf> {
    let rel = Path::new(name);
    let clean = !name.is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !clean {
        return Err(MurmurError::transfer(format!(
            "refusing to write {name:?}: not a plain relative path"
        )));
    }
    Ok(dir.join(rel))
}
