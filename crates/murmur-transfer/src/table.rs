//! Every transfer one client session knows about, in both directions.
//!
//! The table is owned by the session, never global: tearing the session
//! down drops every record with it.

use murmur_core::{ClientId, FileControl, FileStart, MurmurError, MurmurResult};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::receiver::{IncomingTransfer, ReceivedFiles};
use crate::TransferStatus;

/// Sender-side progress for one transfer. Dropped once `file_complete`
/// has been queued.
#[derive(Debug, Clone)]
pub struct OutgoingRecord {
    pub start: FileStart,
    /// None for room-wide transfers
    pub target: Option<ClientId>,
    pub sent_volumes: usize,
}

/// What a handled file control message changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    Started {
        file_id: String,
        total: usize,
    },
    Progress {
        file_id: String,
        done: usize,
        total: usize,
    },
    Completed {
        file_id: String,
    },
    /// `file_complete` arrived with volumes missing; the record stays open.
    Incomplete {
        file_id: String,
        missing: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One row of a transfer listing.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub file_id: String,
    pub file_name: String,
    pub direction: Direction,
    pub peer: Option<ClientId>,
    pub status: TransferStatus,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct TransferTable {
    incoming: HashMap<String, IncomingTransfer>,
    outgoing: HashMap<String, OutgoingRecord>,
}

impl TransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a file control message received from `sender`.
    pub fn handle(
        &mut self,
        sender: &str,
        control: FileControl,
        private: bool,
    ) -> MurmurResult<TransferUpdate> {
        match control {
            FileControl::FileStart(start) => {
                let file_id = start.file_id.clone();
                if self.incoming.contains_key(&file_id) || self.outgoing.contains_key(&file_id) {
                    return Err(MurmurError::transfer(format!(
                        "duplicate file_start for {file_id}"
                    )));
                }
                let record = IncomingTransfer::new(sender.to_string(), start, private)?;
                let total = record.total_volumes();
                info!(
                    file_id = %file_id,
                    from = %sender,
                    name = %record.start.file_name,
                    size = record.start.original_size,
                    volumes = total,
                    "incoming transfer"
                );
                self.incoming.insert(file_id.clone(), record);
                Ok(TransferUpdate::Started { file_id, total })
            }
            FileControl::FileVolume(volume) => {
                let record = self.incoming_from(sender, &volume.file_id)?;
                let file_id = volume.file_id.clone();
                let done = record.accept_volume(volume)?;
                Ok(TransferUpdate::Progress {
                    total: record.total_volumes(),
                    file_id,
                    done,
                })
            }
            FileControl::FileComplete(complete) => {
                let record = self.incoming_from(sender, &complete.file_id)?;
                let file_id = complete.file_id;
                if record.mark_complete() {
                    info!(file_id = %file_id, "transfer complete");
                    Ok(TransferUpdate::Completed { file_id })
                } else {
                    Ok(TransferUpdate::Incomplete {
                        missing: record.missing().len(),
                        file_id,
                    })
                }
            }
        }
    }

    fn incoming_from(
        &mut self,
        sender: &str,
        file_id: &str,
    ) -> MurmurResult<&mut IncomingTransfer> {
        let record = self
            .incoming
            .get_mut(file_id)
            .ok_or_else(|| MurmurError::transfer(format!("unknown transfer {file_id}")))?;
        if record.sender != sender {
            return Err(MurmurError::protocol(format!(
                "{sender} sent data for transfer {file_id} owned by {}",
                record.sender
            )));
        }
        Ok(record)
    }

    /// Start tracking a transfer we are about to send.
    pub fn register_outgoing(
        &mut self,
        start: &FileStart,
        target: Option<ClientId>,
    ) -> MurmurResult<()> {
        let id = &start.file_id;
        if self.outgoing.contains_key(id) || self.incoming.contains_key(id) {
            return Err(MurmurError::transfer(format!("transfer id {id} already in use")));
        }
        self.outgoing.insert(
            start.file_id.clone(),
            OutgoingRecord {
                start: start.clone(),
                target,
                sent_volumes: 0,
            },
        );
        Ok(())
    }

    /// Note that `control` went out on the wire. Returns (sent, total) for
    /// volumes of a tracked transfer. `file_complete` retires the record.
    pub fn record_sent(&mut self, control: &FileControl) -> Option<(usize, usize)> {
        match control {
            FileControl::FileVolume(volume) => {
                let record = self.outgoing.get_mut(&volume.file_id)?;
                record.sent_volumes += 1;
                Some((record.sent_volumes, record.start.total_volumes as usize))
            }
            FileControl::FileComplete(complete) => {
                if let Some(record) = self.outgoing.remove(&complete.file_id) {
                    debug!(
                        file_id = %complete.file_id,
                        volumes = record.sent_volumes,
                        "outgoing transfer queued in full"
                    );
                }
                None
            }
            FileControl::FileStart(_) => None,
        }
    }

    pub fn incoming(&self, file_id: &str) -> Option<&IncomingTransfer> {
        self.incoming.get(file_id)
    }

    pub fn outgoing(&self, file_id: &str) -> Option<&OutgoingRecord> {
        self.outgoing.get(file_id)
    }

    /// Remove a completed transfer so it can be rebuilt outside the table.
    /// Incomplete transfers stay put for late volumes.
    pub fn take_completed(&mut self, file_id: &str) -> MurmurResult<IncomingTransfer> {
        let record = self
            .incoming
            .get(file_id)
            .ok_or_else(|| MurmurError::transfer(format!("unknown transfer {file_id}")))?;
        if record.status != TransferStatus::Completed {
            return Err(MurmurError::transfer(format!(
                "{file_id}: incomplete ({} of {} volumes)",
                record.received_count(),
                record.total_volumes()
            )));
        }
        self.incoming
            .remove(file_id)
            .ok_or_else(|| MurmurError::transfer(format!("unknown transfer {file_id}")))
    }

    /// Verify and hand out a completed transfer. The record is consumed
    /// either way: an integrity failure is terminal.
    pub fn download(&mut self, file_id: &str) -> MurmurResult<ReceivedFiles> {
        self.take_completed(file_id)?.reconstruct()
    }

    /// Drop a record in either direction. Returns whether one existed.
    pub fn discard(&mut self, file_id: &str) -> bool {
        self.incoming.remove(file_id).is_some() || self.outgoing.remove(file_id).is_some()
    }

    /// Forget unfinished transfers a departed peer was sending us.
    /// Completed ones stay available for download.
    pub fn drop_sender(&mut self, sender: &str) -> Vec<String> {
        let dropped: Vec<String> = self
            .incoming
            .iter()
            .filter(|(_, r)| r.sender == sender && r.status != TransferStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dropped {
            self.incoming.remove(id);
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.incoming.clear();
        self.outgoing.clear();
    }

    pub fn len(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summaries(&self) -> Vec<TransferSummary> {
        let incoming = self.incoming.values().map(|r| TransferSummary {
            file_id: r.start.file_id.clone(),
            file_name: r.start.file_name.clone(),
            direction: Direction::Incoming,
            peer: Some(r.sender.clone()),
            status: r.status,
            done: r.received_count(),
            total: r.total_volumes(),
        });
        let outgoing = self.outgoing.values().map(|r| TransferSummary {
            file_id: r.start.file_id.clone(),
            file_name: r.start.file_name.clone(),
            direction: Direction::Outgoing,
            peer: r.target.clone(),
            status: TransferStatus::Sending,
            done: r.sent_volumes,
            total: r.start.total_volumes as usize,
        });
        let mut all: Vec<TransferSummary> = incoming.chain(outgoing).collect();
        all.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{PreparedTransfer, SelectedFile};
    use murmur_core::TransferConfig;

    fn prepared(len: usize) -> PreparedTransfer {
        let data: Vec<u8> = (0..len).map(|i| (i % 13) as u8).collect();
        let config = TransferConfig {
            volume_size: 64,
            ..Default::default()
        };
        PreparedTransfer::prepare(vec![SelectedFile::new("f.bin", data)], &config, None).unwrap()
    }

    #[test]
    fn test_full_flow() {
        let mut table = TransferTable::new();
        let p = prepared(2000);
        let id = p.file_id().to_string();
        let mut last = None;
        for msg in p.into_messages() {
            last = Some(table.handle("alice", msg, false).unwrap());
        }
        assert_eq!(last, Some(TransferUpdate::Completed { file_id: id.clone() }));

        let files = table.download(&id).unwrap();
        assert_eq!(files.files()[0].data.len(), 2000);
        assert!(table.incoming(&id).is_none());
    }

    #[test]
    fn test_progress_updates() {
        let mut table = TransferTable::new();
        let mut msgs = prepared(2000).into_messages();
        let start = msgs.next().unwrap();
        let Ok(TransferUpdate::Started { total, .. }) = table.handle("a", start, false) else {
            panic!("expected start");
        };
        let update = table.handle("a", msgs.next().unwrap(), false).unwrap();
        assert!(matches!(update, TransferUpdate::Progress { done: 1, total: t, .. } if t == total));
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let mut table = TransferTable::new();
        let p = prepared(10);
        let start = FileControl::FileStart(p.start.clone());
        table.handle("a", start.clone(), false).unwrap();
        assert!(table.handle("a", start, false).is_err());
    }

    #[test]
    fn test_unknown_transfer() {
        let mut table = TransferTable::new();
        let msgs: Vec<_> = prepared(10).into_messages().collect();
        assert!(table.handle("a", msgs[1].clone(), false).is_err());
    }

    #[test]
    fn test_foreign_sender_rejected() {
        let mut table = TransferTable::new();
        let msgs: Vec<_> = prepared(10).into_messages().collect();
        table.handle("alice", msgs[0].clone(), false).unwrap();
        let err = table.handle("mallory", msgs[1].clone(), false).unwrap_err();
        assert!(matches!(err, MurmurError::Protocol(_)));
    }

    #[test]
    fn test_missing_volume_stays_incomplete() {
        let mut table = TransferTable::new();
        let msgs: Vec<_> = prepared(2000).into_messages().collect();
        let id = msgs[0].file_id().to_string();
        let n = msgs.len();
        for (i, msg) in msgs.into_iter().enumerate() {
            if i == n - 2 {
                continue; // drop the last volume
            }
            table.handle("a", msg, false).unwrap_or_else(|e| panic!("msg {i}: {e}"));
        }
        assert_eq!(
            table.incoming(&id).unwrap().status,
            TransferStatus::Receiving
        );
        assert!(table.download(&id).is_err());
        // Still there for a late volume
        assert!(table.incoming(&id).is_some());
    }

    #[test]
    fn test_outgoing_progress() {
        let mut table = TransferTable::new();
        let p = prepared(2000);
        let id = p.file_id().to_string();
        let total = p.total_volumes();
        table.register_outgoing(&p.start, Some("bob".into())).unwrap();
        assert!(table.register_outgoing(&p.start, None).is_err());

        let mut messages: Vec<FileControl> = p.into_messages().collect();
        let complete = messages.pop().unwrap();
        let progress: Vec<_> = messages.iter().filter_map(|m| table.record_sent(m)).collect();
        assert_eq!(progress.last(), Some(&(total, total)));
        assert_eq!(table.outgoing(&id).unwrap().sent_volumes, total);
        assert_eq!(table.summaries()[0].status, TransferStatus::Sending);

        assert_eq!(table.record_sent(&complete), None);
        assert!(table.outgoing(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_drop_sender_and_clear() {
        let mut table = TransferTable::new();
        let a = prepared(10);
        let b = prepared(10);
        table.handle("alice", FileControl::FileStart(a.start.clone()), false).unwrap();
        table.handle("bob", FileControl::FileStart(b.start.clone()), false).unwrap();

        assert_eq!(table.drop_sender("alice"), vec![a.start.file_id.clone()]);
        assert_eq!(table.len(), 1);
        assert!(table.discard(&b.start.file_id));
        assert!(!table.discard(&b.start.file_id));

        table.register_outgoing(&a.start, None).unwrap();
        table.clear();
        assert!(table.is_empty());
    }
}
