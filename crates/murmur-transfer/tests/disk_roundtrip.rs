//! Integration tests for the file transfer pipeline, disk to disk.
//!
//! Files are read from a temp dir, prepared, carried as serialized inner
//! messages (out of order, with duplicates), reassembled in a transfer
//! table and written to a second temp dir.

use murmur_core::{InnerMessage, MurmurError, TransferConfig};
use murmur_transfer::{hash_bytes, PreparedTransfer, SelectedFile, TransferTable, TransferUpdate};
use std::path::PathBuf;
use tempfile::TempDir;

fn config() -> TransferConfig {
    TransferConfig {
        volume_size: 4096,
        ..Default::default()
    }
}

fn write_inputs(dir: &TempDir, files: &[(&str, usize)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, len)| {
            let path = dir.path().join(name);
            let data: Vec<u8> = (0..*len).map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8).collect();
            std::fs::write(&path, data).expect("write input");
            path
        })
        .collect()
}

/// Serialize every message as it would travel, then parse it back.
fn over_the_wire(prepared: PreparedTransfer, private: bool) -> Vec<InnerMessage> {
    prepared
        .into_messages()
        .map(|control| {
            let json = serde_json::to_string(&control.into_message(private)).expect("serialize");
            serde_json::from_str(&json).expect("parse")
        })
        .collect()
}

fn deliver(table: &mut TransferTable, messages: Vec<InnerMessage>) -> Vec<TransferUpdate> {
    messages
        .into_iter()
        .map(|m| {
            let private = m.is_private();
            let control = m.into_file_control().expect("file message");
            table.handle("sender", control, private).expect("accepted")
        })
        .collect()
}

#[test]
fn single_file_disk_to_disk() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let paths = write_inputs(&src, &[("report.pdf", 50_000)]);

    let file = SelectedFile::read(&paths[0]).unwrap();
    let prepared = PreparedTransfer::prepare(vec![file], &config(), Some("alice")).unwrap();
    assert_eq!(prepared.start.original_hash, hash_bytes(&std::fs::read(&paths[0]).unwrap()));
    let file_id = prepared.file_id().to_string();

    let mut table = TransferTable::new();
    let updates = deliver(&mut table, over_the_wire(prepared, false));
    assert_eq!(updates.last(), Some(&TransferUpdate::Completed { file_id: file_id.clone() }));

    let written = table.download(&file_id).unwrap().write_to(dst.path()).unwrap();
    assert_eq!(written, vec![dst.path().join("report.pdf")]);
    assert_eq!(std::fs::read(&written[0]).unwrap(), std::fs::read(&paths[0]).unwrap());
}

#[test]
fn archive_out_of_order_with_duplicates() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let paths = write_inputs(&src, &[("empty", 0), ("small.txt", 17), ("big.bin", 100_000)]);

    let files = paths.iter().map(|p| SelectedFile::read(p).unwrap()).collect();
    let prepared = PreparedTransfer::prepare(files, &config(), None).unwrap();
    assert!(prepared.start.is_archive);
    assert_eq!(prepared.start.file_name, "3 files");
    let file_id = prepared.file_id().to_string();

    let mut messages = over_the_wire(prepared, true);
    let complete = messages.pop().unwrap();
    let start = messages.remove(0);
    // Volumes reversed, and the first one delivered twice
    let mut volumes = messages;
    volumes.push(volumes[0].clone());
    volumes.reverse();

    let mut table = TransferTable::new();
    let mut ordered = vec![start];
    ordered.extend(volumes);
    ordered.push(complete);
    deliver(&mut table, ordered);

    let written = table.download(&file_id).unwrap().write_to(dst.path()).unwrap();
    assert_eq!(written.len(), 3);
    for (out, input) in written.iter().zip(&paths) {
        assert_eq!(out.file_name(), input.file_name());
        assert_eq!(std::fs::read(out).unwrap(), std::fs::read(input).unwrap());
    }
}

#[test]
fn tampered_volume_fails_integrity() {
    let prepared = PreparedTransfer::prepare(
        vec![SelectedFile::new("a.txt", b"hello hello hello hello".to_vec())],
        &config(),
        None,
    )
    .unwrap();
    let file_id = prepared.file_id().to_string();
    let mut messages = over_the_wire(prepared, false);

    // Swap the volume payload for a valid DEFLATE stream of other bytes
    let forged = murmur_transfer::compress(b"jello hello hello hello", 6).unwrap();
    if let InnerMessage::FileVolume(v) = &mut messages[1] {
        v.volume_data = murmur_transfer::split_volumes(&forged, 4096).remove(0);
    }

    let mut table = TransferTable::new();
    deliver(&mut table, messages);
    let err = table.download(&file_id).unwrap_err();
    assert!(matches!(err, MurmurError::Integrity { .. }), "got {err:?}");
    assert!(table.is_empty());
}
