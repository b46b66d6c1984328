//! Multi-file archive: files concatenated as length-prefixed records.
//!
//! Record layout (repeated once per file, no header or trailer):
//! ```text
//! [u32 LE name length][UTF-8 name][u64 LE size][size bytes]
//! ```
//! A manifest of `{name, size}` travels in `file_start` alongside the
//! archive. Extraction walks the records in order and checks each against
//! the manifest entry at the same position.

use murmur_core::{ManifestEntry, MurmurError, MurmurResult};

use crate::sender::SelectedFile;

/// Build an archive and its manifest.
pub fn build_archive(files: &[SelectedFile]) -> (Vec<u8>, Vec<ManifestEntry>) {
    let total: usize = files.iter().map(|f| 12 + f.name.len() + f.data.len()).sum();
    let mut archive = Vec::with_capacity(total);
    let mut manifest = Vec::with_capacity(files.len());

    for file in files {
        archive.extend_from_slice(&(file.name.len() as u32).to_le_bytes());
        archive.extend_from_slice(file.name.as_bytes());
        archive.extend_from_slice(&(file.data.len() as u64).to_le_bytes());
        archive.extend_from_slice(&file.data);
        manifest.push(ManifestEntry {
            name: file.name.clone(),
            size: file.data.len() as u64,
        });
    }

    (archive, manifest)
}

/// Split an archive back into files, verifying it agrees with `manifest`.
pub fn extract_archive(
    archive: &[u8],
    manifest: &[ManifestEntry],
) -> MurmurResult<Vec<SelectedFile>> {
    let mut reader = RecordReader { buf: archive, pos: 0 };
    let mut files = Vec::with_capacity(manifest.len());

    for (index, entry) in manifest.iter().enumerate() {
        let name_len = reader.read_u32()? as usize;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| layout_error(index, "name is not UTF-8"))?
            .to_string();
        let size = reader.read_u64()?;

        if name != entry.name {
            return Err(layout_error(
                index,
                &format!("name {name:?} does not match manifest {:?}", entry.name),
            ));
        }
        if size != entry.size {
            return Err(layout_error(
                index,
                &format!("size {size} does not match manifest {}", entry.size),
            ));
        }

        let len = usize::try_from(size).map_err(|_| layout_error(index, "size overflows"))?;
        let data = reader.take(len)?.to_vec();
        files.push(SelectedFile { name, data });
    }

    if reader.pos != archive.len() {
        return Err(MurmurError::transfer(format!(
            "archive has {} trailing bytes beyond the manifest",
            archive.len() - reader.pos
        )));
    }

    Ok(files)
}

fn layout_error(index: usize, msg: &str) -> MurmurError {
    MurmurError::transfer(format!("archive record {index}: {msg}"))
}

struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn take(&mut self, n: usize) -> MurmurResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                MurmurError::transfer(format!(
                    "archive truncated: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.buf.len() - self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> MurmurResult<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&mut self) -> MurmurResult<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file(name: &str, len: usize) -> SelectedFile {
        SelectedFile {
            name: name.into(),
            data: (0..len).map(|i| (i * 31 % 256) as u8).collect(),
        }
    }

    #[test]
    fn test_record_layout() {
        let (archive, manifest) = build_archive(&[file("ab", 3)]);
        assert_eq!(&archive[..4], &2u32.to_le_bytes());
        assert_eq!(&archive[4..6], b"ab");
        assert_eq!(&archive[6..14], &3u64.to_le_bytes());
        assert_eq!(archive.len(), 14 + 3);
        assert_eq!(manifest, vec![ManifestEntry { name: "ab".into(), size: 3 }]);
    }

    #[test]
    fn test_roundtrip_sizes() {
        let files = vec![file("empty.bin", 0), file("small.txt", 17), file("big.dat", 1_000_000)];
        let (archive, manifest) = build_archive(&files);
        let out = extract_archive(&archive, &manifest).unwrap();
        assert_eq!(out, files);
    }

    #[test]
    fn test_manifest_name_mismatch() {
        let (archive, mut manifest) = build_archive(&[file("a", 1), file("b", 2)]);
        manifest[1].name = "c".into();
        let err = extract_archive(&archive, &manifest).unwrap_err();
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn test_manifest_size_mismatch() {
        let (archive, mut manifest) = build_archive(&[file("a", 5)]);
        manifest[0].size = 4;
        assert!(extract_archive(&archive, &manifest).is_err());
    }

    #[test]
    fn test_truncated_archive() {
        let (archive, manifest) = build_archive(&[file("a", 50)]);
        assert!(extract_archive(&archive[..40], &manifest).is_err());
    }

    #[test]
    fn test_short_manifest_leaves_trailing_bytes() {
        let (archive, manifest) = build_archive(&[file("a", 1), file("b", 1)]);
        let err = extract_archive(&archive, &manifest[..1]).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            entries in proptest::collection::vec(
                ("[a-z]{1,12}", proptest::collection::vec(any::<u8>(), 0..=512)),
                1..=6,
            )
        ) {
            let files: Vec<SelectedFile> = entries
                .into_iter()
                .map(|(name, data)| SelectedFile { name, data })
                .collect();
            let (archive, manifest) = build_archive(&files);
            prop_assert_eq!(extract_archive(&archive, &manifest).unwrap(), files);
        }
    }
}
