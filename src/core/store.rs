// Copyright (c) 2026 Driftmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Persistent bundle store behind a trait seam.
//!
//! The store is the authoritative answer to "what version of this bundle do
//! we hold, and do we have its payload?". The sled implementation keeps two
//! trees (`manifests`, `files`) plus a payload blob directory keyed by file
//! hash.

use crate::core::types::{decode_canonical_limited, encode_canonical, BundleId, FileHash, Manifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const MANIFEST_RECORD_MAX: usize = 256;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("blob io")]
    BlobIo,
    #[error("record codec")]
    Codec,
}

/// Stored manifest metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ManifestRecord {
    version: u64,
    filesize: i64,
    filehash: [u8; 32],
    ttl: u8,
}

/// Version oracle and import sink for content bundles.
pub trait BundleStore: Send + Sync {
    /// Latest stored version for a bundle id, if any.
    fn manifest_version(&self, id: &BundleId) -> Result<Option<u64>, StoreError>;
    /// True when the payload for `hash` is present and valid.
    fn file_valid(&self, hash: &FileHash) -> Result<bool, StoreError>;
    /// Filesystem path of a valid payload, if the store keeps one.
    fn payload_path(&self, hash: &FileHash) -> Result<Option<PathBuf>, StoreError>;
    /// Record a bundle: manifest metadata plus, when given, its payload file.
    fn import_bundle(
        &self,
        manifest: &Manifest,
        payload: Option<&Path>,
        ttl: u8,
    ) -> Result<(), StoreError>;
}

/// Sled-backed bundle store.
#[derive(Clone)]
pub struct SledBundleStore {
    manifests: sled::Tree,
    files: sled::Tree,
    blob_dir: PathBuf,
}

impl SledBundleStore {
    /// Open (or create) a store under `dir`: sled db in `dir/db`, payload
    /// blobs in `dir/blobs`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let db = sled::open(dir.join("db")).map_err(|_| StoreError::DbOpen)?;
        let manifests = db.open_tree("manifests").map_err(|_| StoreError::DbOpen)?;
        let files = db.open_tree("files").map_err(|_| StoreError::DbOpen)?;
        let blob_dir = dir.join("blobs");
        std::fs::create_dir_all(&blob_dir).map_err(|_| StoreError::BlobIo)?;
        Ok(Self {
            manifests,
            files,
            blob_dir,
        })
    }

    fn blob_path(&self, hash: &FileHash) -> PathBuf {
        self.blob_dir.join(hash.to_string())
    }
}

impl BundleStore for SledBundleStore {
    fn manifest_version(&self, id: &BundleId) -> Result<Option<u64>, StoreError> {
        let raw = self
            .manifests
            .get(id.as_bytes())
            .map_err(|_| StoreError::DbIo)?;
        match raw {
            None => Ok(None),
            Some(iv) => {
                let rec: ManifestRecord = decode_canonical_limited(&iv, MANIFEST_RECORD_MAX)
                    .map_err(|_| StoreError::Codec)?;
                Ok(Some(rec.version))
            }
        }
    }

    fn file_valid(&self, hash: &FileHash) -> Result<bool, StoreError> {
        let raw = self.files.get(hash.as_bytes()).map_err(|_| StoreError::DbIo)?;
        Ok(matches!(raw, Some(v) if v.as_ref() == [1u8].as_slice()))
    }

    fn payload_path(&self, hash: &FileHash) -> Result<Option<PathBuf>, StoreError> {
        if !self.file_valid(hash)? {
            return Ok(None);
        }
        let path = self.blob_path(hash);
        if path.is_file() {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    fn import_bundle(
        &self,
        manifest: &Manifest,
        payload: Option<&Path>,
        ttl: u8,
    ) -> Result<(), StoreError> {
        if let Some(src) = payload {
            std::fs::copy(src, self.blob_path(&manifest.filehash)).map_err(|_| StoreError::BlobIo)?;
            self.files
                .insert(manifest.filehash.as_bytes(), &[1u8][..])
                .map_err(|_| StoreError::DbIo)?;
        }
        let rec = ManifestRecord {
            version: manifest.version,
            filesize: manifest.filesize,
            filehash: *manifest.filehash.as_bytes(),
            ttl,
        };
        let bytes = encode_canonical(&rec).map_err(|_| StoreError::Codec)?;
        self.manifests
            .insert(manifest.id.as_bytes(), bytes)
            .map_err(|_| StoreError::DbIo)?;
        self.manifests.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    manifests: BTreeMap<BundleId, u64>,
    files: BTreeMap<FileHash, Option<PathBuf>>,
}

/// In-memory bundle store for embedding and tests.
#[derive(Default)]
pub struct MemoryBundleStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryBundleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::DbIo)
    }

    /// Pre-seed a stored manifest version.
    pub fn seed_manifest(&self, id: BundleId, version: u64) {
        if let Ok(mut g) = self.locked() {
            g.manifests.insert(id, version);
        }
    }

    /// Pre-seed a valid payload, optionally backed by a file on disk.
    pub fn seed_file(&self, hash: FileHash, path: Option<PathBuf>) {
        if let Ok(mut g) = self.locked() {
            g.files.insert(hash, path);
        }
    }
}

impl BundleStore for MemoryBundleStore {
    fn manifest_version(&self, id: &BundleId) -> Result<Option<u64>, StoreError> {
        Ok(self.locked()?.manifests.get(id).copied())
    }

    fn file_valid(&self, hash: &FileHash) -> Result<bool, StoreError> {
        Ok(self.locked()?.files.contains_key(hash))
    }

    fn payload_path(&self, hash: &FileHash) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.locked()?.files.get(hash).and_then(|p| p.clone()))
    }

    fn import_bundle(
        &self,
        manifest: &Manifest,
        payload: Option<&Path>,
        _ttl: u8,
    ) -> Result<(), StoreError> {
        let mut g = self.locked()?;
        g.manifests.insert(manifest.id, manifest.version);
        if let Some(p) = payload {
            g.files.insert(manifest.filehash, Some(p.to_path_buf()));
        }
        Ok(())
    }
}
