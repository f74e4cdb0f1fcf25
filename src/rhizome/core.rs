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

//! Rhizome orchestrator.
//!
//! Accepts advertised manifests, dedups them against the version cache, the
//! ignore cache, the candidate list and the active slot pool, and promotes
//! candidates into fetch slots. All state here is owned by a single task;
//! spawned transfers report back over a channel.

use crate::core::store::{BundleStore, StoreError};
use crate::core::types::{BundleId, FileHash, Manifest};
use crate::core::verify::ManifestVerifier;
use crate::monitoring::metrics::Metrics;
use crate::rhizome::candidates::{Candidate, CandidateList};
use crate::rhizome::fetch::{FetchDone, HttpFetch, Transfer};
use crate::rhizome::ignore_cache::IgnoreCache;
use crate::rhizome::version_cache::VersionCache;
use crate::rhizome::{
    MAX_QUEUED_FILES, RHIZOME_HTTP_PORT, RHIZOME_IDLE_TIMEOUT_MS, RHIZOME_IGNORE_TTL_MS,
    RHIZOME_PRIORITY_NORMAL,
};
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Orchestrator errors (store failures propagate as rejections upstream).
#[derive(Debug, Error)]
pub enum RhizomeError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("import io")]
    ImportIo,
}

/// Outcome of advertising a manifest to the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suggestion {
    /// Queued as a candidate.
    Accepted,
    /// We already hold this (or the id is already queued/fetching).
    Redundant,
    /// Failed verification, list overflow, or otherwise not worth it.
    Rejected,
}

/// Outcome of trying to promote a manifest into a fetch slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    /// A slot was acquired; the transfer is running.
    Fetching,
    /// The payload was already present; the bundle was imported directly.
    Imported,
    /// We already hold this version or newer.
    Redundant,
    /// Pool full, duplicate in pool, or connect preconditions failed.
    Rejected,
}

struct ActiveFetch {
    id: BundleId,
    filehash: FileHash,
    peer: SocketAddrV4,
}

/// Per-node rhizome state: caches, candidate list, fetch slot pool.
pub struct RhizomeCore {
    versions: VersionCache,
    ignored: IgnoreCache,
    candidates: CandidateList,
    active: Vec<ActiveFetch>,
    store: Arc<dyn BundleStore>,
    verifier: Arc<dyn ManifestVerifier>,
    import_dir: PathBuf,
    http_port: u16,
    idle_timeout: Duration,
    done_tx: mpsc::UnboundedSender<FetchDone>,
    metrics: Arc<Metrics>,
}

impl RhizomeCore {
    /// Build an orchestrator. The returned receiver delivers fetch
    /// completions; feed them back via [`RhizomeCore::on_fetch_done`].
    pub fn new(
        store: Arc<dyn BundleStore>,
        verifier: Arc<dyn ManifestVerifier>,
        import_dir: PathBuf,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::UnboundedReceiver<FetchDone>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        (
            Self {
                versions: VersionCache::new(),
                ignored: IgnoreCache::new(),
                candidates: CandidateList::new(),
                active: Vec::with_capacity(MAX_QUEUED_FILES),
                store,
                verifier,
                import_dir,
                http_port: RHIZOME_HTTP_PORT,
                idle_timeout: Duration::from_millis(RHIZOME_IDLE_TIMEOUT_MS),
                done_tx,
                metrics,
            },
            done_rx,
        )
    }

    /// Override the fetch target port (deployments with a non-default file
    /// server port).
    pub fn set_http_port(&mut self, port: u16) {
        self.http_port = port;
    }

    /// Override the idle budget between byte transfers.
    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = timeout;
    }

    /// Number of slots currently transferring.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of queued candidates.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// True when `id` occupies a fetch slot right now.
    pub fn is_fetching(&self, id: &BundleId) -> bool {
        self.active.iter().any(|a| &a.id == id)
    }

    /// (id, priority, size) of every queued candidate, in queue order.
    pub fn candidate_entries(&self) -> Vec<(BundleId, i32, i64)> {
        self.candidates
            .iter()
            .map(|c| (c.manifest.id, c.priority, c.size))
            .collect()
    }

    /// Consider an advertised manifest for fetching.
    ///
    /// Verification is deferred until the manifest would otherwise be
    /// admitted, so advertisement floods stay cheap.
    pub fn suggest(
        &mut self,
        manifest: Manifest,
        peer: SocketAddrV4,
        now_ms: u64,
    ) -> Result<Suggestion, RhizomeError> {
        if self.ignored.is_ignored(&manifest.id, now_ms) {
            debug!(id = %manifest.id, "recently failed verification, ignoring");
            return Ok(Suggestion::Rejected);
        }

        if self.versions.lookup(&manifest, self.store.as_ref())?.is_redundant() {
            debug!(id = %manifest.id, version = manifest.version, "already have that version or newer");
            return Ok(Suggestion::Redundant);
        }

        // A bundle id lives in at most one of the candidate list and the slot
        // pool; while a fetch runs, further advertisements are redundant.
        if self.is_fetching(&manifest.id) {
            debug!(id = %manifest.id, "already fetching");
            return Ok(Suggestion::Redundant);
        }

        let priority = RHIZOME_PRIORITY_NORMAL;
        let size = manifest.filesize;

        if let Some(idx) = self.candidates.position_of(&manifest.id) {
            if self.candidates.version_at(idx) >= manifest.version {
                return Ok(Suggestion::Redundant);
            }
            if self.verifier.verify(&manifest).is_err() {
                warn!(id = %manifest.id, "manifest failed verification, ignoring for a while");
                self.ignored.mark(&manifest.id, peer, now_ms, RHIZOME_IGNORE_TTL_MS);
                return Ok(Suggestion::Rejected);
            }
            self.candidates.replace(idx, manifest, peer);
            self.metrics.candidates_queued.set(self.candidates.len() as i64);
            return Ok(Suggestion::Accepted);
        }

        if self.candidates.would_overflow(priority, size) {
            debug!(id = %manifest.id, "candidate list full of more urgent entries");
            return Ok(Suggestion::Rejected);
        }

        if self.verifier.verify(&manifest).is_err() {
            warn!(id = %manifest.id, "manifest failed verification, ignoring for a while");
            self.ignored.mark(&manifest.id, peer, now_ms, RHIZOME_IGNORE_TTL_MS);
            return Ok(Suggestion::Rejected);
        }

        if let Some(evicted) = self.candidates.install(Candidate {
            manifest,
            peer,
            size,
            priority,
        }) {
            debug!(id = %evicted.manifest.id, "candidate bumped off the end");
        }
        self.metrics.candidates_queued.set(self.candidates.len() as i64);
        debug_assert!(self.candidates.is_sorted());
        Ok(Suggestion::Accepted)
    }

    /// Promote queued candidates into free fetch slots. Every candidate
    /// attempted is consumed, whatever the outcome. Call on a
    /// [`RHIZOME_ENQUEUE_INTERVAL_MS`](crate::rhizome::RHIZOME_ENQUEUE_INTERVAL_MS)
    /// cadence.
    pub fn enqueue_suggestions(&mut self, now_ms: u64) -> usize {
        let mut promoted = 0;
        while self.active.len() < MAX_QUEUED_FILES {
            let Some(cand) = self.candidates.pop_front() else {
                break;
            };
            match self.queue_manifest_import(cand.manifest, cand.peer, now_ms) {
                Ok(QueueOutcome::Fetching) | Ok(QueueOutcome::Imported) => promoted += 1,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "dropping candidate"),
            }
        }
        self.metrics.candidates_queued.set(self.candidates.len() as i64);
        promoted
    }

    /// Try to acquire a fetch slot for a manifest (or import it directly when
    /// the payload is already present).
    pub fn queue_manifest_import(
        &mut self,
        manifest: Manifest,
        peer: SocketAddrV4,
        _now_ms: u64,
    ) -> Result<QueueOutcome, RhizomeError> {
        if self.versions.lookup(&manifest, self.store.as_ref())?.is_redundant() {
            debug!(id = %manifest.id, "already have that version or newer");
            return Ok(QueueOutcome::Redundant);
        }

        if self.active.len() >= MAX_QUEUED_FILES {
            debug!("all fetch slots busy");
            return Ok(QueueOutcome::Rejected);
        }

        for a in self.active.iter() {
            if a.id == manifest.id || a.filehash == manifest.filehash {
                debug!(id = %manifest.id, "already fetching that bundle or file");
                return Ok(QueueOutcome::Rejected);
            }
        }

        if manifest.filesize > 0 && !self.store.file_valid(&manifest.filehash)? {
            // Need the payload: take a slot and run the transfer.
            let transfer = Transfer::HttpOverIpv4(HttpFetch {
                peer,
                http_port: self.http_port,
                import_dir: self.import_dir.clone(),
                idle_timeout: self.idle_timeout,
                store: Arc::clone(&self.store),
                manifest: manifest.clone(),
            });
            self.active.push(ActiveFetch {
                id: manifest.id,
                filehash: manifest.filehash,
                peer,
            });
            self.metrics.fetch_slots_busy.set(self.active.len() as i64);
            info!(id = %manifest.id, peer = %peer, slots = self.active.len(), "fetching bundle payload");

            let done_tx = self.done_tx.clone();
            let id = manifest.id;
            tokio::spawn(async move {
                let result = transfer.run().await;
                let _ = done_tx.send(FetchDone { id, result });
            });
            return Ok(QueueOutcome::Fetching);
        }

        // Payload already present (or manifest-only bundle): import directly.
        std::fs::create_dir_all(&self.import_dir).map_err(|_| RhizomeError::ImportIo)?;
        let manifest_path = self.import_dir.join(format!("manifest.{}", manifest.id));
        std::fs::write(&manifest_path, manifest.signed_text()).map_err(|_| RhizomeError::ImportIo)?;
        let ttl = manifest.ttl.saturating_sub(1);
        self.store.import_bundle(&manifest, None, ttl)?;
        self.metrics.bundles_imported_total.inc();
        info!(id = %manifest.id, "payload already held, imported from manifest alone");
        Ok(QueueOutcome::Imported)
    }

    /// Release the slot for a finished transfer.
    pub fn on_fetch_done(&mut self, done: FetchDone) {
        let before = self.active.len();
        self.active.retain(|a| a.id != done.id);
        if self.active.len() == before {
            warn!(id = %done.id, "completion for an unknown fetch slot");
            return;
        }
        self.metrics.fetch_slots_busy.set(self.active.len() as i64);
        match done.result {
            Ok(()) => {
                self.metrics.fetch_completed_total.inc();
                self.metrics.bundles_imported_total.inc();
                info!(id = %done.id, slots = self.active.len(), "fetch complete");
            }
            Err(e) => {
                self.metrics.fetch_failed_total.inc();
                warn!(id = %done.id, error = %e, slots = self.active.len(), "fetch failed");
            }
        }
    }

    /// Peers of the currently active transfers (diagnostics).
    pub fn active_peers(&self) -> Vec<SocketAddrV4> {
        self.active.iter().map(|a| a.peer).collect()
    }
}
