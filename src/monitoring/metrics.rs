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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Fetch slots currently transferring.
    pub fetch_slots_busy: IntGauge,
    /// Candidates awaiting a fetch slot.
    pub candidates_queued: IntGauge,
    /// Completed bundle fetches.
    pub fetch_completed_total: IntCounter,
    /// Failed or timed-out bundle fetches.
    pub fetch_failed_total: IntCounter,
    /// Bundles imported into the store.
    pub bundles_imported_total: IntCounter,

    /// Live voice calls.
    pub vomp_calls_live: IntGauge,
    /// Inbound VoMP frames accepted.
    pub vomp_frames_rx_total: IntCounter,
    /// Outbound VoMP frames dispatched.
    pub vomp_frames_tx_total: IntCounter,
    /// Duplicate audio blocks dropped by the dedup ring.
    pub vomp_audio_dup_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let fetch_slots_busy = IntGauge::new("driftmesh_fetch_slots_busy", "Fetch slots in use")
            .map_err(|_| MetricsError::Prom)?;
        let candidates_queued =
            IntGauge::new("driftmesh_candidates_queued", "Candidates awaiting a slot")
                .map_err(|_| MetricsError::Prom)?;
        let fetch_completed_total =
            IntCounter::new("driftmesh_fetch_completed_total", "Completed bundle fetches")
                .map_err(|_| MetricsError::Prom)?;
        let fetch_failed_total =
            IntCounter::new("driftmesh_fetch_failed_total", "Failed bundle fetches")
                .map_err(|_| MetricsError::Prom)?;
        let bundles_imported_total =
            IntCounter::new("driftmesh_bundles_imported_total", "Bundles imported")
                .map_err(|_| MetricsError::Prom)?;

        let vomp_calls_live = IntGauge::new("driftmesh_vomp_calls_live", "Live voice calls")
            .map_err(|_| MetricsError::Prom)?;
        let vomp_frames_rx_total =
            IntCounter::new("driftmesh_vomp_frames_rx_total", "Inbound VoMP frames")
                .map_err(|_| MetricsError::Prom)?;
        let vomp_frames_tx_total =
            IntCounter::new("driftmesh_vomp_frames_tx_total", "Outbound VoMP frames")
                .map_err(|_| MetricsError::Prom)?;
        let vomp_audio_dup_total = IntCounter::new(
            "driftmesh_vomp_audio_dup_total",
            "Duplicate audio blocks dropped",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(fetch_slots_busy.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(candidates_queued.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(fetch_completed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(fetch_failed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(bundles_imported_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(vomp_calls_live.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(vomp_frames_rx_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(vomp_frames_tx_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(vomp_audio_dup_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            fetch_slots_busy,
            candidates_queued,
            fetch_completed_total,
            fetch_failed_total,
            bundles_imported_total,
            vomp_calls_live,
            vomp_frames_rx_total,
            vomp_frames_tx_total,
            vomp_audio_dup_total,
        })
    }
}
