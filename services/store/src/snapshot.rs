//! Store snapshots
//!
//! Serializes the full keyspace to a versioned, checksummed document so
//! the in-memory store can survive a restart. BTreeMaps keep the
//! serialized form deterministic, which makes the SHA-256 integrity hash
//! reproducible for identical state.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{MemoryStore, Score};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

/// A point-in-time copy of the whole keyspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub sequence: u64,
    pub hashes: BTreeMap<String, BTreeMap<String, String>>,
    pub lists: BTreeMap<String, Vec<String>>,
    pub zsets: BTreeMap<String, Vec<(String, Score)>>,
    pub checksum: String,
}

impl StoreSnapshot {
    fn compute_checksum(
        sequence: u64,
        hashes: &BTreeMap<String, BTreeMap<String, String>>,
        lists: &BTreeMap<String, Vec<String>>,
        zsets: &BTreeMap<String, Vec<(String, Score)>>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_be_bytes());
        let body = serde_json::to_vec(&(hashes, lists, zsets)).expect("snapshot body serializes");
        hasher.update(&body);
        format!("{:x}", hasher.finalize())
    }

    /// Verify the embedded checksum against the content.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        let actual = Self::compute_checksum(self.sequence, &self.hashes, &self.lists, &self.zsets);
        if actual != self.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Capture the current keyspace into a snapshot document.
    pub fn snapshot(&self) -> StoreSnapshot {
        let hashes: BTreeMap<String, BTreeMap<String, String>> = self
            .hashes
            .iter()
            .map(|e| (e.key().clone(), e.value().iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            .collect();
        let lists: BTreeMap<String, Vec<String>> = self
            .lists
            .iter()
            .map(|e| (e.key().clone(), e.value().iter().cloned().collect()))
            .collect();
        let zsets: BTreeMap<String, Vec<(String, Score)>> = self
            .zsets
            .iter()
            .map(|e| {
                let members = e
                    .value()
                    .ordered
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect();
                (e.key().clone(), members)
            })
            .collect();
        let sequence = self.sequence.load(std::sync::atomic::Ordering::SeqCst);
        let checksum = StoreSnapshot::compute_checksum(sequence, &hashes, &lists, &zsets);

        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            sequence,
            hashes,
            lists,
            zsets,
            checksum,
        }
    }

    /// Replace the keyspace with the snapshot's content.
    pub fn restore(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
        snapshot.verify()?;

        self.hashes.clear();
        self.lists.clear();
        self.zsets.clear();

        for (key, fields) in &snapshot.hashes {
            self.hashes
                .insert(key.clone(), fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        }
        for (key, values) in &snapshot.lists {
            self.lists.insert(key.clone(), values.iter().cloned().collect());
        }
        for (key, members) in &snapshot.zsets {
            let mut zset = crate::ZSet::default();
            for (member, score) in members {
                zset.ordered.insert(*score, member.clone());
                zset.index.insert(member.clone(), *score);
            }
            self.zsets.insert(key.clone(), zset);
        }
        self.sequence
            .store(snapshot.sequence, std::sync::atomic::Ordering::SeqCst);

        tracing::info!(
            hashes = snapshot.hashes.len(),
            lists = snapshot.lists.len(),
            zsets = snapshot.zsets.len(),
            "Restored store from snapshot"
        );
        Ok(())
    }

    /// Write a snapshot of the keyspace to disk as JSON.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and verify a snapshot file, replacing the keyspace.
    pub fn load_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = std::fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        self.restore(&snapshot)
    }
}
