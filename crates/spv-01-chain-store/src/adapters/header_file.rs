//! # Header File
//!
//! Persists the main chain as consecutive 80-byte header records, starting at
//! the store root. Loading replays every record through `accept`, so a
//! tampered or truncated file can never inject an unvalidated header.

use shared_types::{BlockHeader, HEADER_SIZE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::{
    invariant_checkpoints_held, invariant_main_linked, AcceptOutcome, ChainStore, ChainStoreError,
};

/// Flat file of main-chain headers.
#[derive(Clone, Debug)]
pub struct HeaderFile {
    path: PathBuf,
}

impl HeaderFile {
    /// File at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the main chain, replacing any previous file.
    ///
    /// Returns the number of records written.
    pub fn save(&self, store: &ChainStore) -> Result<usize, ChainStoreError> {
        let records = (store.height() - store.root_height() + 1) as usize;
        let mut bytes = Vec::with_capacity(records * HEADER_SIZE);
        let mut count = 0;
        for header in store.main_headers_from(store.root_height()) {
            bytes.extend_from_slice(&header.to_bytes());
            count += 1;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), headers = count, "Header file saved");
        Ok(count)
    }

    /// Replay the file into `store`.
    ///
    /// A missing file loads nothing. The first record must be the store root.
    /// Returns the number of headers added.
    pub fn load_into(&self, store: &mut ChainStore) -> Result<usize, ChainStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let headers = BlockHeader::decode_batch(&bytes)?;
        let Some((root, rest)) = headers.split_first() else {
            return Ok(0);
        };

        let expected = store.root_hash();
        if root.hash() != expected {
            return Err(ChainStoreError::RootMismatch {
                expected,
                found: root.hash(),
            });
        }

        let mut added = 0;
        let mut height = store.root_height();
        for header in rest {
            height += 1;
            match store.accept(*header, Some(height)).outcome {
                AcceptOutcome::Rejected(reason) => {
                    return Err(ChainStoreError::Rejected { height, reason });
                }
                AcceptOutcome::AlreadyKnown => {}
                _ => added += 1,
            }
        }

        debug_assert!(invariant_main_linked(store) && invariant_checkpoints_held(store));
        info!(path = %self.path.display(), headers = added, tip = store.height(), "Header file loaded");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainStoreConfig;
    use crate::ports::FixedTimeSource;
    use crate::testing::mine_chain;
    use std::sync::Arc;

    fn store() -> ChainStore {
        ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = HeaderFile::new(dir.path().join("headers"));

        let mut original = store();
        for header in mine_chain(&original.params().genesis, 10, 1) {
            original.accept(header, None);
        }
        assert_eq!(file.save(&original).unwrap(), 11);

        let mut restored = store();
        assert_eq!(file.load_into(&mut restored).unwrap(), 10);
        assert_eq!(restored.best_chain().tip_hash, original.best_chain().tip_hash);
        assert_eq!(restored.best_chain().work, original.best_chain().work);
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = HeaderFile::new(dir.path().join("absent"));
        let mut store = store();
        assert_eq!(file.load_into(&mut store).unwrap(), 0);
        assert_eq!(store.height(), 0);
    }

    #[test]
    fn test_tampered_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = HeaderFile::new(dir.path().join("headers"));

        let mut original = store();
        for header in mine_chain(&original.params().genesis, 3, 1) {
            original.accept(header, None);
        }
        file.save(&original).unwrap();

        // Corrupt the merkle root of the record at height 2. Either that record
        // fails proof-of-work or its successor loses its parent.
        let mut bytes = fs::read(file.path()).unwrap();
        bytes[2 * HEADER_SIZE + 40] ^= 0xff;
        fs::write(file.path(), &bytes).unwrap();

        let mut restored = store();
        let err = file.load_into(&mut restored).unwrap_err();
        assert!(matches!(err, ChainStoreError::Rejected { height: 2 | 3, .. }));
    }

    #[test]
    fn test_foreign_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = HeaderFile::new(dir.path().join("headers"));
        let mainnet_genesis = ChainStoreConfig::default().params.genesis;
        fs::write(file.path(), mainnet_genesis.to_bytes()).unwrap();

        let mut store = store();
        assert!(matches!(
            file.load_into(&mut store),
            Err(ChainStoreError::RootMismatch { .. })
        ));
    }

    #[test]
    fn test_ragged_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = HeaderFile::new(dir.path().join("headers"));
        fs::write(file.path(), [0u8; 81]).unwrap();
        let mut store = store();
        assert!(matches!(
            file.load_into(&mut store),
            Err(ChainStoreError::Decode(_))
        ));
    }
}
