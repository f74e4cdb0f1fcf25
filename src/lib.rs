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

//! Driftmesh - delay-tolerant mesh node core.
//!
//! This crate provides:
//! - Rhizome: gossip-style synchronization of content-addressed file bundles
//!   (version cache, ignore cache, bounded candidate queue, HTTP/1.0 fetch
//!   slot pool, peer-side file server)
//! - VoMP: a six-state peer-to-peer voice call protocol with replay-protected
//!   sessions, codec discovery and preemptive-retransmission audio carriage
//!   over an authenticated datagram seam
//! - Persistent bundle storage (sled) behind a trait seam
//! - Monitoring via Prometheus metrics and a line-oriented notifier

/// Core protocol primitives (types, config, bundle store, verification).
pub mod core;
/// Observability (metrics, monitor line notifier).
pub mod monitoring;
/// Transport seams (MDP datagram types).
pub mod networking;
/// Rhizome bundle synchronization.
pub mod rhizome;
/// VoMP call state machine and audio pipeline.
pub mod vomp;
