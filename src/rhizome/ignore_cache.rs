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

//! Time-bounded reject list for bundles that recently failed verification.
//!
//! 64 bins x 8 ways, binned by the top six bits of the first id byte.
//! Expired entries are not eagerly cleaned; they simply stop matching.

use crate::core::types::BundleId;
use rand::Rng;
use std::net::SocketAddrV4;

const BIN_COUNT: usize = 64;
const BIN_SIZE: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    bid: [u8; 32],
    peer: Option<SocketAddrV4>,
    deadline_ms: u64,
    used: bool,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            bid: [0; 32],
            peer: None,
            deadline_ms: 0,
            used: false,
        }
    }
}

// is_ignored matches on the bundle id alone; the peer is kept for
// diagnostics. A collision across peers just widens the reject slightly.

/// Bloom-like (bundle, peer) reject cache.
pub struct IgnoreCache {
    bins: Vec<[Entry; BIN_SIZE]>,
}

impl Default for IgnoreCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IgnoreCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            bins: vec![[Entry::default(); BIN_SIZE]; BIN_COUNT],
        }
    }

    fn bin_of(id: &BundleId) -> usize {
        (id.as_bytes()[0] >> 2) as usize
    }

    /// True when the bundle id has an unexpired reject entry.
    pub fn is_ignored(&self, id: &BundleId, now_ms: u64) -> bool {
        self.ignored_by(id, now_ms).is_some()
    }

    /// The peer that fed us the rejected bundle, while the entry is live.
    pub fn ignored_by(&self, id: &BundleId, now_ms: u64) -> Option<SocketAddrV4> {
        let bin = &self.bins[Self::bin_of(id)];
        for e in bin.iter() {
            if e.used && &e.bid == id.as_bytes() {
                if e.deadline_ms > now_ms {
                    return e.peer;
                }
                return None;
            }
        }
        None
    }

    /// Remember that `id` from `peer` is not worth considering for `ttl_ms`.
    pub fn mark(&mut self, id: &BundleId, peer: SocketAddrV4, now_ms: u64, ttl_ms: u64) {
        let bin = Self::bin_of(id);
        let entries = &mut self.bins[bin];
        let slot = entries
            .iter()
            .position(|e| e.used && &e.bid == id.as_bytes())
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..BIN_SIZE));
        entries[slot] = Entry {
            bid: *id.as_bytes(),
            peer: Some(peer),
            deadline_ms: now_ms + ttl_ms,
            used: true,
        };
    }
}
