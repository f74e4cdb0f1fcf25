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

//! Call table: per-call state keyed by local session id.
//!
//! Live calls always occupy a contiguous prefix of the table; destruction
//! swaps the tail into the vacated index. Session ids are fresh 24-bit values
//! from a cryptographic RNG so replayed frames cannot resurrect or steer a
//! call.

use crate::core::types::Sid;
use crate::vomp::{VOMP_MAX_CALLS, VOMP_MAX_RECENT_SAMPLES, VOMP_SESSION_MASK};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::debug;

/// Call errors.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("all call slots in use")]
    TableFull,
    #[error("insufficient entropy")]
    Rng,
}

/// The six call states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CallPhase {
    /// Session issued, no call yet.
    NoCall = 1,
    /// Preparing to dial.
    CallPrep = 2,
    /// We are ringing the far end.
    RingingOut = 3,
    /// The far end is ringing us.
    RingingIn = 4,
    /// Call established.
    InCall = 5,
    /// Call over; waiting for the far end to agree.
    CallEnded = 6,
}

impl CallPhase {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire nybble.
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::NoCall),
            2 => Some(Self::CallPrep),
            3 => Some(Self::RingingOut),
            4 => Some(Self::RingingIn),
            5 => Some(Self::InCall),
            6 => Some(Self::CallEnded),
            _ => None,
        }
    }
}

/// One end of a call.
#[derive(Clone, Debug)]
pub struct CallHalf {
    /// Subscriber id.
    pub sid: Sid,
    /// Dialable id (learned during call prep).
    pub did: String,
    /// Call state of this half.
    pub phase: CallPhase,
    /// Active codec.
    pub codec: u8,
    /// 24-bit session id (zero until known).
    pub session: u32,
    /// Last seen / sent sequence number.
    pub sequence: u32,
}

impl CallHalf {
    fn new(sid: Sid, session: u32) -> Self {
        Self {
            sid,
            did: String::new(),
            phase: CallPhase::NoCall,
            codec: 0,
            session,
            sequence: 0,
        }
    }
}

/// A rotor slot of captured audio.
#[derive(Clone)]
pub struct SampleBlock {
    /// Codec the block was captured with.
    pub codec: u8,
    /// Bytes filled so far.
    pub len: usize,
    /// Block start, ms since call establishment.
    pub start_ms: u32,
    /// Block end, inclusive.
    pub end_ms: u32,
    /// Sample bytes.
    pub bytes: [u8; 1024],
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self {
            codec: 0,
            len: 0,
            start_ms: 0,
            end_ms: 0,
            bytes: [0; 1024],
        }
    }
}

/// Full per-call state.
pub struct CallState {
    /// Our half.
    pub local: CallHalf,
    /// The peer's half.
    pub remote: CallHalf,
    /// True when we dialed.
    pub initiated_call: bool,
    /// Fast-audio flag surfaced on CALLSTATUS lines.
    pub fast_audio: u8,
    /// Creation time; reset when the call is established.
    pub create_time: u64,
    /// Last frame activity.
    pub last_activity: u64,
    /// Capture clock, ms since call establishment.
    pub audio_clock: u32,
    /// Audio pipeline running.
    pub audio_started: bool,
    /// Packed `(remote << 4) | local` of the last emitted status.
    pub last_sent_status: Option<u8>,
    /// Codecs the far end advertised.
    pub remote_codecs: [bool; 256],
    /// Current rotor position.
    pub sample_rotor: usize,
    /// Recent sample blocks, for preemptive retransmission.
    pub recent_samples: Vec<SampleBlock>,
    /// Circular buffer of recently seen end-times (receive dedup).
    pub seen_samples: Vec<u32>,
    /// Next write position in `seen_samples`.
    pub sample_pos: usize,
    /// When the periodic status tick is next due.
    pub next_status_at: u64,
}

impl CallState {
    fn new(local_sid: Sid, remote_sid: Sid, local_session: u32, remote_session: u32, now_ms: u64, tick_interval_ms: u64) -> Self {
        Self {
            local: CallHalf::new(local_sid, local_session),
            remote: CallHalf::new(remote_sid, remote_session),
            initiated_call: false,
            fast_audio: 0,
            create_time: now_ms,
            last_activity: now_ms,
            audio_clock: 0,
            audio_started: false,
            last_sent_status: None,
            remote_codecs: [false; 256],
            sample_rotor: 0,
            recent_samples: vec![SampleBlock::default(); VOMP_MAX_RECENT_SAMPLES],
            // Fill the dedup ring with times no real sample will carry.
            seen_samples: vec![0xFFFF_FFFF; VOMP_MAX_RECENT_SAMPLES * 4],
            sample_pos: 0,
            next_status_at: now_ms + tick_interval_ms,
        }
    }

    /// Check the dedup ring for `end_time`, recording it when new.
    pub fn already_seen(&mut self, end_time: u32) -> bool {
        if self.seen_samples.iter().any(|&t| t == end_time) {
            return true;
        }
        let pos = self.sample_pos;
        self.seen_samples[pos] = end_time;
        self.sample_pos = (pos + 1) % self.seen_samples.len();
        false
    }

    /// Packed combined status byte.
    pub fn combined_status(&self) -> u8 {
        (self.remote.phase.as_u8() << 4) | self.local.phase.as_u8()
    }
}

/// Fixed-capacity table of live calls.
pub struct CallTable {
    calls: Vec<CallState>,
    rng: SystemRandom,
    tick_interval_ms: u64,
}

impl CallTable {
    /// Empty table; `tick_interval_ms` seeds each call's first status tick.
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            calls: Vec::with_capacity(VOMP_MAX_CALLS),
            rng: SystemRandom::new(),
            tick_interval_ms,
        }
    }

    /// Number of live calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// True when no call is live.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Borrow a call.
    pub fn get(&self, idx: usize) -> &CallState {
        &self.calls[idx]
    }

    /// Mutably borrow a call.
    pub fn get_mut(&mut self, idx: usize) -> &mut CallState {
        &mut self.calls[idx]
    }

    /// Index of the call a client refers to by its local session id.
    pub fn find_by_session(&self, session: u32) -> Option<usize> {
        self.calls.iter().position(|c| c.local.session == session)
    }

    /// Fresh non-zero 24-bit session id, distinct from every live session id
    /// (local and remote).
    pub fn generate_session_id(&self) -> Result<u32, CallError> {
        loop {
            let mut raw = [0u8; 4];
            self.rng.fill(&mut raw).map_err(|_| CallError::Rng)?;
            let session = u32::from_be_bytes(raw) & VOMP_SESSION_MASK;
            if session == 0 {
                continue;
            }
            let clash = self
                .calls
                .iter()
                .any(|c| c.local.session == session || c.remote.session == session);
            if !clash {
                return Ok(session);
            }
        }
    }

    /// Allocate a call slot with a fresh local session.
    pub fn create(
        &mut self,
        local_sid: Sid,
        remote_sid: Sid,
        remote_session: u32,
        now_ms: u64,
    ) -> Result<usize, CallError> {
        if self.calls.len() >= VOMP_MAX_CALLS {
            return Err(CallError::TableFull);
        }
        let session = self.generate_session_id()?;
        self.calls.push(CallState::new(
            local_sid,
            remote_sid,
            session,
            remote_session,
            now_ms,
            self.tick_interval_ms,
        ));
        debug!(session = %format!("{session:06x}"), "new call slot");
        Ok(self.calls.len() - 1)
    }

    /// Match an inbound frame to a call, creating one when the frame may
    /// legitimately open a session (either side in CALLPREP, neither ended).
    ///
    /// Matching needs at least one session comparison to have succeeded, then
    /// an exact SID pair match. A matched call with an unknown remote session
    /// adopts the sender's.
    #[allow(clippy::too_many_arguments)]
    pub fn find_or_create(
        &mut self,
        remote_sid: &Sid,
        local_sid: &Sid,
        sender_session: u32,
        recvr_session: u32,
        sender_phase: CallPhase,
        recvr_phase: CallPhase,
        now_ms: u64,
    ) -> Result<Option<usize>, CallError> {
        for (i, call) in self.calls.iter_mut().enumerate() {
            // Cheap session comparisons first, SIDs after.
            let mut checked = 0;
            if call.remote.session != 0 && sender_session != 0 {
                checked += 1;
                if sender_session != call.remote.session {
                    continue;
                }
            }
            if call.local.session != 0 && recvr_session != 0 {
                checked += 1;
                if recvr_session != call.local.session {
                    continue;
                }
            }
            if checked == 0 {
                continue;
            }
            if &call.remote.sid != remote_sid || &call.local.sid != local_sid {
                continue;
            }
            if call.remote.session == 0 {
                call.remote.session = sender_session;
            }
            return Ok(Some(i));
        }

        if sender_phase == CallPhase::CallEnded || recvr_phase == CallPhase::CallEnded {
            return Ok(None);
        }
        if sender_phase == CallPhase::CallPrep || recvr_phase == CallPhase::CallPrep {
            let idx = self.create(*local_sid, *remote_sid, sender_session, now_ms)?;
            return Ok(Some(idx));
        }
        Ok(None)
    }

    /// Remove a call, compacting by swapping the tail into the hole.
    pub fn remove(&mut self, idx: usize) -> CallState {
        self.calls.swap_remove(idx)
    }
}
