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

//! Bounded priority queue of manifests proposed for fetch.
//!
//! Kept strictly sorted ascending by (priority, size); lower priority value
//! means higher urgency. No two entries ever share a bundle id. Equal keys
//! insert after existing entries (stable).

use crate::core::types::{BundleId, Manifest};
use crate::rhizome::MAX_CANDIDATES;
use std::net::SocketAddrV4;

/// A manifest awaiting a fetch slot.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// The advertised manifest.
    pub manifest: Manifest,
    /// Advertising peer.
    pub peer: SocketAddrV4,
    /// Payload size (from the manifest).
    pub size: i64,
    /// Urgency; lower sorts first.
    pub priority: i32,
}

impl Candidate {
    fn key(&self) -> (i32, i64) {
        (self.priority, self.size)
    }
}

/// The bounded candidate list.
#[derive(Default)]
pub struct CandidateList {
    entries: Vec<Candidate>,
}

impl CandidateList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when at capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_CANDIDATES
    }

    /// Iterate in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }

    /// Index of the entry with the given id, if queued.
    pub fn position_of(&self, id: &BundleId) -> Option<usize> {
        self.entries.iter().position(|c| &c.manifest.id == id)
    }

    /// Version of the queued entry at `idx`.
    pub fn version_at(&self, idx: usize) -> u64 {
        self.entries[idx].manifest.version
    }

    /// Where a (priority, size) key would insert: before the first strictly
    /// greater entry, after all equal ones.
    pub fn insertion_point(&self, priority: i32, size: i64) -> usize {
        self.entries
            .iter()
            .position(|c| c.key() > (priority, size))
            .unwrap_or(self.entries.len())
    }

    /// True when a new entry with this key would fall off the end of a full
    /// list and must be rejected.
    pub fn would_overflow(&self, priority: i32, size: i64) -> bool {
        self.is_full() && self.insertion_point(priority, size) >= MAX_CANDIDATES
    }

    /// Install a candidate at its sorted position. When full, the last entry
    /// is dropped and returned so the caller can log the eviction. The caller
    /// must have checked [`CandidateList::would_overflow`] first.
    pub fn install(&mut self, candidate: Candidate) -> Option<Candidate> {
        let evicted = if self.is_full() {
            self.entries.pop()
        } else {
            None
        };
        let at = self.insertion_point(candidate.priority, candidate.size);
        self.entries.insert(at, candidate);
        evicted
    }

    /// Replace the entry at `idx` with a newer manifest from `peer`, then
    /// move it to its sorted position.
    pub fn replace(&mut self, idx: usize, manifest: Manifest, peer: SocketAddrV4) {
        let mut entry = self.entries.remove(idx);
        entry.size = manifest.filesize;
        entry.manifest = manifest;
        entry.peer = peer;
        let at = self.insertion_point(entry.priority, entry.size);
        self.entries.insert(at, entry);
    }

    /// Take the most urgent candidate.
    pub fn pop_front(&mut self) -> Option<Candidate> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Sortedness check, used by tests and debug assertions.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].key() <= w[1].key())
    }
}
