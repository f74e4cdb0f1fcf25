#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! VoMP: the six-state voice call protocol.
//!
//! Calls progress through NOCALL, CALLPREP, RINGINGOUT, RINGINGIN, INCALL and
//! CALLENDED. Frames travel over auth-crypted MDP datagrams; replay
//! protection comes from per-call 24-bit session ids. Audio rides inside
//! status frames with preemptive retransmission of recent sample blocks.

pub mod audio;
pub mod call;
pub mod codecs;
pub mod core;
pub mod wire;

/// Call table capacity. More than one live call is allowed largely to absorb
/// session-number churn from replayed or hostile traffic.
pub const VOMP_MAX_CALLS: usize = 16;
/// Rotor depth of recent sample blocks.
pub const VOMP_MAX_RECENT_SAMPLES: usize = 10;
/// Upper bound on a stuffed frame payload.
pub const VOMP_STUFF_BYTES: usize = 800;
/// Session ids occupy 24 bits on the wire.
pub const VOMP_SESSION_MASK: u32 = 0x00ff_ffff;
/// Per-call status/keepalive cadence.
pub const VOMP_CALL_STATUS_INTERVAL_MS: u64 = 1_000;
/// The far side must reach RINGINGOUT within this long of call creation.
pub const VOMP_CALL_DIAL_TIMEOUT_MS: u64 = 5_000;
/// We must reach INCALL within this long of call creation.
pub const VOMP_CALL_RING_TIMEOUT_MS: u64 = 60_000;
/// Maximum silence between frames before the call is torn down.
pub const VOMP_CALL_NETWORK_TIMEOUT_MS: u64 = 36_000;
