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

//! Set-associative bundle version cache.
//!
//! Accelerates "do we already hold this version or newer?" without a store
//! round trip. Two tiers: a hit in the in-memory table answers immediately
//! when it already holds a newer-or-equal version; everything else falls
//! through to the store, whose answer is authoritative and is inserted into
//! the table at a random way. Never persisted; lost on restart.

use crate::core::store::{BundleStore, StoreError};
use crate::core::types::Manifest;
use rand::Rng;

const BIN_COUNT: usize = 128;
const ASSOCIATIVITY: usize = 16;
const PREFIX_LEN: usize = 24;

/// Outcome of a version lookup, relative to the offered manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionVerdict {
    /// We hold the offered version or newer; the offer is redundant.
    NewerOrSame,
    /// We hold a strictly newer version; the advertising peer is stale.
    StrictlyNewer,
    /// We hold an older version or nothing; the offer is worth pursuing.
    AbsentOrOlder,
}

impl VersionVerdict {
    /// True when the offered manifest should be rejected as redundant.
    pub fn is_redundant(self) -> bool {
        !matches!(self, VersionVerdict::AbsentOrOlder)
    }
}

#[derive(Clone, Copy)]
struct Slot {
    prefix: [u8; PREFIX_LEN],
    version: u64,
    used: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            prefix: [0; PREFIX_LEN],
            version: 0,
            used: false,
        }
    }
}

/// 128-bin x 16-way id-prefix -> version table with random-way replacement.
pub struct VersionCache {
    bins: Vec<[Slot; ASSOCIATIVITY]>,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            bins: vec![[Slot::default(); ASSOCIATIVITY]; BIN_COUNT],
        }
    }

    // Bin index: top two hex nybbles of the id, shifted right one bit.
    fn bin_of(id: &[u8]) -> usize {
        (id[0] >> 1) as usize
    }

    fn prefix_of(id: &[u8]) -> [u8; PREFIX_LEN] {
        let mut p = [0u8; PREFIX_LEN];
        p.copy_from_slice(&id[..PREFIX_LEN]);
        p
    }

    fn insert(&mut self, id: &[u8], version: u64) {
        let bin = Self::bin_of(id);
        let way = rand::thread_rng().gen_range(0..ASSOCIATIVITY);
        self.bins[bin][way] = Slot {
            prefix: Self::prefix_of(id),
            version,
            used: true,
        };
    }

    /// Unconditionally remember the manifest's version.
    pub fn store(&mut self, manifest: &Manifest) {
        self.insert(manifest.id.as_bytes(), manifest.version);
    }

    /// Compare the offered manifest against what we hold.
    ///
    /// The store decides; the cache only short-circuits offers it already
    /// knows to be redundant.
    pub fn lookup(
        &mut self,
        manifest: &Manifest,
        store: &dyn BundleStore,
    ) -> Result<VersionVerdict, StoreError> {
        let id = manifest.id.as_bytes();
        let bin = Self::bin_of(id);
        let prefix = Self::prefix_of(id);

        for slot in self.bins[bin].iter() {
            if slot.used && slot.prefix == prefix {
                if slot.version > manifest.version {
                    return Ok(VersionVerdict::StrictlyNewer);
                }
                if slot.version == manifest.version {
                    return Ok(VersionVerdict::NewerOrSame);
                }
                // Cached version is older than the offer; the table may be
                // stale, so ask the store below.
                break;
            }
        }

        let stored = store.manifest_version(&manifest.id)?;
        match stored {
            Some(v) => {
                self.insert(id, v);
                if v > manifest.version {
                    Ok(VersionVerdict::StrictlyNewer)
                } else if v == manifest.version {
                    Ok(VersionVerdict::NewerOrSame)
                } else {
                    Ok(VersionVerdict::AbsentOrOlder)
                }
            }
            None => Ok(VersionVerdict::AbsentOrOlder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryBundleStore;
    use crate::core::types::{BundleId, FileHash, Manifest};

    fn manifest(first_byte: u8, version: u64) -> Manifest {
        let mut id = [0u8; 32];
        id[0] = first_byte;
        id[1] = 0xA5;
        Manifest {
            id: BundleId::from_bytes(id),
            version,
            filesize: 64,
            filehash: FileHash::from_bytes([0x42; 32]),
            ttl: 32,
            signature: vec![0; 64],
        }
    }

    #[test]
    fn miss_consults_store_and_caches_result() {
        let store = MemoryBundleStore::new();
        let m = manifest(0x80, 5);
        store.seed_manifest(m.id, 9);

        let mut cache = VersionCache::new();
        assert_eq!(
            cache.lookup(&m, &store).unwrap(),
            VersionVerdict::StrictlyNewer
        );

        // Second lookup is answered by the table (bin 0x80 >> 1 == 64).
        let bin = &cache.bins[0x40];
        assert!(bin.iter().any(|s| s.used && s.version == 9));
    }

    #[test]
    fn store_insert_of_larger_version_wins_subsequent_lookup() {
        let store = MemoryBundleStore::new();
        let mut cache = VersionCache::new();

        let old = manifest(0x10, 3);
        cache.store(&old);

        store.seed_manifest(old.id, 7);
        let offered = manifest(0x10, 5);
        // Cache holds 3 (< 5), so the store's 7 must be consulted.
        assert_eq!(
            cache.lookup(&offered, &store).unwrap(),
            VersionVerdict::StrictlyNewer
        );

        let again = manifest(0x10, 7);
        assert_eq!(
            cache.lookup(&again, &store).unwrap(),
            VersionVerdict::NewerOrSame
        );
    }

    #[test]
    fn absent_everywhere_is_worth_fetching() {
        let store = MemoryBundleStore::new();
        let mut cache = VersionCache::new();
        let m = manifest(0x01, 1);
        assert_eq!(
            cache.lookup(&m, &store).unwrap(),
            VersionVerdict::AbsentOrOlder
        );
    }
}
