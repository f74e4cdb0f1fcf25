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

//! The VoMP state machine.
//!
//! Inbound frames are matched to calls, run through the combined-state
//! transition table, and answered with status frames whenever the packed
//! state pair changes. Client commands (dial/ring/pickup/hangup) arrive from
//! monitor clients; the periodic tick enforces the dial, ring and network
//! timeouts and keeps the far end and local clients informed.

use crate::core::types::{validate_did, Sid};
use crate::monitoring::metrics::Metrics;
use crate::monitoring::monitor::{CallStatus, Monitor};
use crate::networking::mdp::{MdpAddr, MdpFrame, MdpSender, MDP_PORT_VOMP};
use crate::vomp::audio;
use crate::vomp::call::{CallError, CallPhase, CallState, CallTable};
use crate::vomp::codecs;
use crate::vomp::wire::{self, FrameHeader, WireError};
use crate::vomp::{
    VOMP_CALL_DIAL_TIMEOUT_MS, VOMP_CALL_NETWORK_TIMEOUT_MS, VOMP_CALL_RING_TIMEOUT_MS,
    VOMP_CALL_STATUS_INTERVAL_MS,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// VoMP errors.
#[derive(Debug, Error)]
pub enum VompError {
    /// The transport did not auth-crypt the frame.
    #[error("frame not auth-crypted")]
    NotAuthCrypted,
    #[error("wire: {0}")]
    Wire(#[from] WireError),
    #[error("call state nybble out of range")]
    BadWireState,
    #[error("unable to find or create call")]
    NoCall,
    #[error("no such session")]
    UnknownSession,
    #[error("unknown codec {0:#04x}")]
    UnknownCodec(u8),
    #[error("bad did")]
    BadDid,
    #[error("{0}")]
    BadCommand(&'static str),
    #[error("call: {0}")]
    Call(#[from] CallError),
}

/// Call timeout knobs; defaults are the protocol constants.
#[derive(Clone, Copy, Debug)]
pub struct VompTimers {
    /// Status/keepalive cadence.
    pub status_interval_ms: u64,
    /// Far end must reach RINGINGOUT within this long of creation.
    pub dial_timeout_ms: u64,
    /// We must reach INCALL within this long of creation.
    pub ring_timeout_ms: u64,
    /// Maximum inter-frame silence.
    pub network_timeout_ms: u64,
}

impl Default for VompTimers {
    fn default() -> Self {
        Self {
            status_interval_ms: VOMP_CALL_STATUS_INTERVAL_MS,
            dial_timeout_ms: VOMP_CALL_DIAL_TIMEOUT_MS,
            ring_timeout_ms: VOMP_CALL_RING_TIMEOUT_MS,
            network_timeout_ms: VOMP_CALL_NETWORK_TIMEOUT_MS,
        }
    }
}

/// Per-node VoMP state: the call table plus its collaborators.
pub struct VompCore {
    table: CallTable,
    local_codecs: [bool; 256],
    monitor: Arc<Monitor>,
    mdp_tx: MdpSender,
    timers: VompTimers,
    metrics: Arc<Metrics>,
}

impl VompCore {
    /// Core with default timers.
    pub fn new(monitor: Arc<Monitor>, mdp_tx: MdpSender, metrics: Arc<Metrics>) -> Self {
        Self::with_timers(monitor, mdp_tx, metrics, VompTimers::default())
    }

    /// Core with custom timers (tests shrink them).
    pub fn with_timers(
        monitor: Arc<Monitor>,
        mdp_tx: MdpSender,
        metrics: Arc<Metrics>,
        timers: VompTimers,
    ) -> Self {
        Self {
            table: CallTable::new(timers.status_interval_ms),
            local_codecs: [false; 256],
            monitor,
            mdp_tx,
            timers,
            metrics,
        }
    }

    /// Advertise these codec ids to peers during call setup.
    pub fn set_local_codecs(&mut self, ids: &[u8]) {
        self.local_codecs = [false; 256];
        for &id in ids {
            self.local_codecs[id as usize] = true;
        }
    }

    /// Number of live calls.
    pub fn call_count(&self) -> usize {
        self.table.len()
    }

    /// (local, remote) phases of the call with this session, if live.
    pub fn phases(&self, session: u32) -> Option<(CallPhase, CallPhase)> {
        self.table
            .find_by_session(session)
            .map(|i| (self.table.get(i).local.phase, self.table.get(i).remote.phase))
    }

    /// Process an inbound MDP frame addressed to the VoMP port.
    pub fn mdp_received(&mut self, frame: &MdpFrame, now_ms: u64) -> Result<(), VompError> {
        if !frame.auth_crypted() {
            return Err(VompError::NotAuthCrypted);
        }
        let header = FrameHeader::parse(&frame.payload)?;
        let sender_phase =
            CallPhase::from_wire(header.local_state).ok_or(VompError::BadWireState)?;
        let claimed_phase =
            CallPhase::from_wire(header.remote_state).ok_or(VompError::BadWireState)?;
        self.metrics.vomp_frames_rx_total.inc();

        // Replay protection lives here: frames only act on a call they can
        // name by session, and new sessions are only opened for CALLPREP.
        let found = self.table.find_or_create(
            &frame.src.sid,
            &frame.dst.sid,
            header.local_session,
            header.remote_session,
            sender_phase,
            claimed_phase,
            now_ms,
        );
        let idx = match found {
            Ok(Some(i)) => i,
            Ok(None) => {
                debug!("frame does not match any call");
                return Err(VompError::NoCall);
            }
            Err(e) => {
                warn!(error = %e, "cannot open session for frame");
                return Err(e.into());
            }
        };
        self.metrics.vomp_calls_live.set(self.table.len() as i64);

        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);

        let mut recvr_phase = call.local.phase;

        if !monitor.has_listeners() {
            // Nobody local can answer; let the state machine tear it down.
            debug!("no monitor listener registered, rejecting call");
            recvr_phase = CallPhase::CallEnded;
        }

        if recvr_phase < CallPhase::RingingOut && sender_phase < CallPhase::RingingOut {
            let section = wire::parse_codec_section(&frame.payload, !call.initiated_call);
            for c in section.codecs {
                call.remote_codecs[c as usize] = true;
            }
            if let Some((caller_did, callee_did)) = section.dids {
                call.remote.did = caller_did;
                call.local.did = callee_did;
            }
        }

        if sender_phase == CallPhase::CallEnded {
            // Far end gave up; follow it no matter where we were.
            call.audio_started = false;
            recvr_phase = CallPhase::CallEnded;
        }

        use CallPhase::*;
        match (recvr_phase, sender_phase) {
            // They are dialing us; our reply carries our codec list.
            (NoCall, CallPrep) => {}
            // They want us to ring; hold until a client issues RING.
            (NoCall, RingingOut) | (RingingIn, RingingOut) => {}
            // Session issued both ways; time to ring out (only the caller).
            (CallPrep, NoCall) | (CallPrep, CallPrep) => {
                recvr_phase = if call.initiated_call {
                    RingingOut
                } else {
                    CallEnded
                };
            }
            // Still waiting for the far end to acknowledge our ring.
            (RingingOut, NoCall) | (RingingOut, CallPrep) => {}
            // They acknowledged; ringback tone territory.
            (RingingOut, RingingIn) => {}
            // Simultaneous dial: jump straight to INCALL.
            (RingingOut, RingingOut) => {
                recvr_phase = InCall;
                call.create_time = now_ms;
            }
            // We're in the call, their ack is still in flight.
            (InCall, RingingOut) => {}
            (RingingOut, InCall) | (InCall, InCall) => {
                if recvr_phase == RingingOut {
                    // They answered.
                    recvr_phase = InCall;
                    call.create_time = now_ms;
                }
                if !call.audio_started {
                    if start_audio(monitor.as_ref(), call).is_err() {
                        call.local.codec = codecs::VOMP_CODEC_ENGAGED;
                    }
                }
                audio::process_incoming(call, monitor.as_ref(), metrics, &frame.payload);
            }
            // We ended; wait for the far end to agree before destroying.
            (CallEnded, _) => {}
            _ => {
                warn!(
                    ours = recvr_phase.as_u8(),
                    theirs = sender_phase.as_u8(),
                    "ignoring invalid combined call state"
                );
                return Ok(());
            }
        }

        call.remote.sequence = header.local_sequence as u32;
        update_remote_phase(monitor.as_ref(), call, sender_phase);
        update_local_phase(monitor.as_ref(), call, recvr_phase);
        call.last_activity = now_ms;
        emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);

        if call.local.phase == CallEnded && call.remote.phase == CallEnded {
            destroy_call(table, monitor.as_ref(), mdp_tx, metrics, local_codecs, idx, now_ms);
        }
        Ok(())
    }

    /// Client command: place a call. Returns the session token the client
    /// uses for the rest of the call.
    pub fn dial(
        &mut self,
        local_sid: Sid,
        remote_sid: Sid,
        local_did: &str,
        remote_did: &str,
        now_ms: u64,
    ) -> Result<u32, VompError> {
        validate_did(local_did).map_err(|_| VompError::BadDid)?;
        validate_did(remote_did).map_err(|_| VompError::BadDid)?;

        let idx = self.table.create(local_sid, remote_sid, 0, now_ms)?;
        self.metrics.vomp_calls_live.set(self.table.len() as i64);

        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);
        call.local.did = local_did.to_string();
        call.remote.did = remote_did.to_string();
        update_local_phase(monitor.as_ref(), call, CallPhase::CallPrep);
        call.initiated_call = true;
        emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);
        Ok(call.local.session)
    }

    /// Client command: the phone is now audibly ringing.
    pub fn ring(&mut self, session: u32, now_ms: u64) -> Result<(), VompError> {
        let idx = self
            .table
            .find_by_session(session)
            .ok_or(VompError::UnknownSession)?;
        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);
        if call.initiated_call
            || call.local.phase >= CallPhase::RingingIn
            || call.remote.phase != CallPhase::RingingOut
        {
            return Err(VompError::BadCommand("call is not being dialled"));
        }
        update_local_phase(monitor.as_ref(), call, CallPhase::RingingIn);
        emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);
        Ok(())
    }

    /// Client command: answer the call.
    pub fn pickup(&mut self, session: u32, now_ms: u64) -> Result<(), VompError> {
        let idx = self
            .table
            .find_by_session(session)
            .ok_or(VompError::UnknownSession)?;
        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);
        if call.local.phase > CallPhase::RingingIn || call.remote.phase != CallPhase::RingingOut {
            return Err(VompError::BadCommand("call is not ringing"));
        }
        update_local_phase(monitor.as_ref(), call, CallPhase::InCall);
        call.create_time = now_ms;
        emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);
        Ok(())
    }

    /// Client command: hang up. The slot lingers until the far end agrees or
    /// a timeout fires.
    pub fn hangup(&mut self, session: u32, now_ms: u64) -> Result<(), VompError> {
        let idx = self
            .table
            .find_by_session(session)
            .ok_or(VompError::UnknownSession)?;
        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);
        if call.local.phase == CallPhase::InCall {
            call.audio_started = false;
        }
        update_local_phase(monitor.as_ref(), call, CallPhase::CallEnded);
        emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);
        Ok(())
    }

    /// Client-supplied captured audio for an established call. Full blocks
    /// are emitted immediately with recent history stuffed alongside.
    pub fn received_audio(
        &mut self,
        session: u32,
        codec: u8,
        data: &[u8],
        now_ms: u64,
    ) -> Result<(), VompError> {
        let block_size = codecs::sample_size(codec).ok_or(VompError::UnknownCodec(codec))?;
        if block_size == 0 {
            return Ok(());
        }
        let idx = self
            .table
            .find_by_session(session)
            .ok_or(VompError::UnknownSession)?;
        let Self {
            table,
            local_codecs,
            mdp_tx,
            metrics,
            ..
        } = self;
        let call = table.get_mut(idx);
        if call.local.phase != CallPhase::InCall {
            debug!("dropping audio outside of a call");
            return Ok(());
        }
        let mut offset = 0;
        while offset < data.len() {
            offset += audio::fill_block(call, codec, &data[offset..]);
            if audio::current_block_full(call) {
                send_status(mdp_tx, metrics, local_codecs, call, now_ms);
            }
        }
        Ok(())
    }

    /// Per-call periodic work: expire dead calls, push status and keepalives.
    /// Drive this from a timer at the status interval.
    pub fn tick(&mut self, now_ms: u64) {
        let Self {
            table,
            local_codecs,
            monitor,
            mdp_tx,
            metrics,
            timers,
            ..
        } = self;
        let mut i = 0;
        while i < table.len() {
            if table.get(i).next_status_at > now_ms {
                i += 1;
                continue;
            }
            let expired = {
                let call = table.get(i);
                (call.remote.phase < CallPhase::RingingOut
                    && call.create_time + timers.dial_timeout_ms < now_ms)
                    || (call.local.phase < CallPhase::InCall
                        && call.create_time + timers.ring_timeout_ms < now_ms)
                    || (call.last_activity + timers.network_timeout_ms < now_ms)
            };
            if expired {
                destroy_call(table, monitor.as_ref(), mdp_tx, metrics, local_codecs, i, now_ms);
                // The tail call swapped into this index; re-examine it.
                continue;
            }
            let call = table.get_mut(i);
            emit_update(monitor.as_ref(), mdp_tx, metrics, local_codecs, call, now_ms);
            // Force a packet to the far end; we are still here.
            send_status(mdp_tx, metrics, local_codecs, call, now_ms);
            monitor.keepalive(call.local.session);
            call.next_status_at = now_ms + timers.status_interval_ms;
            i += 1;
        }
    }
}

fn status_snapshot(call: &CallState) -> CallStatus {
    CallStatus {
        local_session: call.local.session,
        remote_session: call.remote.session,
        local_state: call.local.phase.as_u8(),
        remote_state: call.remote.phase.as_u8(),
        fast_audio: call.fast_audio,
        local_sid: call.local.sid,
        remote_sid: call.remote.sid,
        local_did: call.local.did.clone(),
        remote_did: call.remote.did.clone(),
    }
}

// Advance our half, never regress, and tell clients about the milestones.
fn update_local_phase(monitor: &Monitor, call: &mut CallState, new: CallPhase) {
    if call.local.phase >= new {
        return;
    }
    match new {
        CallPhase::CallPrep => {
            monitor.call_to(
                call.local.session,
                &call.local.sid,
                &call.local.did,
                &call.remote.sid,
                &call.remote.did,
            );
        }
        CallPhase::CallEnded => monitor.hangup(call.local.session),
        _ => {}
    }
    call.local.phase = new;
}

// Advance the far half, never regress.
fn update_remote_phase(monitor: &Monitor, call: &mut CallState, new: CallPhase) {
    if call.remote.phase >= new {
        return;
    }
    match new {
        CallPhase::RingingOut => {
            monitor.call_from(
                call.local.session,
                &call.local.sid,
                &call.local.did,
                &call.remote.sid,
                &call.remote.did,
            );
        }
        CallPhase::RingingIn => monitor.ringing(call.local.session),
        CallPhase::InCall => {
            if call.remote.phase == CallPhase::RingingIn {
                monitor.answered(call.local.session);
            }
        }
        _ => {}
    }
    call.remote.phase = new;
}

fn start_audio(monitor: &Monitor, call: &mut CallState) -> Result<(), ()> {
    call.audio_started = true;
    // The player is external; without a listener there is nowhere to play to.
    if monitor.has_listeners() {
        Ok(())
    } else {
        Err(())
    }
}

// Build and dispatch one status frame to the far end.
fn send_status(
    mdp_tx: &MdpSender,
    metrics: &Metrics,
    local_codecs: &[bool; 256],
    call: &mut CallState,
    now_ms: u64,
) {
    let mut payload = Vec::with_capacity(64);
    let header = FrameHeader {
        remote_state: call.remote.phase.as_u8(),
        local_state: call.local.phase.as_u8(),
        remote_sequence: call.remote.sequence as u16,
        local_sequence: call.local.sequence as u16,
        call_millis: now_ms.saturating_sub(call.create_time) as u16,
        remote_session: call.remote.session,
        local_session: call.local.session,
    };
    header.encode(&mut payload);

    if call.local.phase < CallPhase::RingingOut && call.remote.phase < CallPhase::RingingOut {
        for (id, supported) in local_codecs.iter().enumerate() {
            if *supported {
                payload.push(id as u8);
            }
        }
        payload.push(0);
        if call.initiated_call {
            payload.extend_from_slice(call.local.did.as_bytes());
            payload.push(0);
            payload.extend_from_slice(call.remote.did.as_bytes());
            payload.push(0);
        }
    }

    if call.local.phase == CallPhase::InCall {
        audio::append_stuffed_audio(call, &mut payload);
    }

    let frame = MdpFrame {
        src: MdpAddr {
            sid: call.local.sid,
            port: MDP_PORT_VOMP,
        },
        dst: MdpAddr {
            sid: call.remote.sid,
            port: MDP_PORT_VOMP,
        },
        flags: 0,
        payload,
    };
    if mdp_tx.send(frame).is_err() {
        debug!("mdp egress closed, dropping status frame");
    }
    metrics.vomp_frames_tx_total.inc();
    call.local.sequence = call.local.sequence.wrapping_add(1);
}

// Status emission keyed on the packed state pair.
fn emit_update(
    monitor: &Monitor,
    mdp_tx: &MdpSender,
    metrics: &Metrics,
    local_codecs: &[bool; 256],
    call: &mut CallState,
    now_ms: u64,
) {
    let combined = call.combined_status();
    if call.last_sent_status == Some(combined) {
        return;
    }
    call.last_sent_status = Some(combined);
    send_status(mdp_tx, metrics, local_codecs, call, now_ms);
    if monitor.has_listeners() {
        monitor.call_status(&status_snapshot(call));
    }
}

fn destroy_call(
    table: &mut CallTable,
    monitor: &Monitor,
    mdp_tx: &MdpSender,
    metrics: &Metrics,
    local_codecs: &[bool; 256],
    idx: usize,
    now_ms: u64,
) {
    {
        let call = table.get_mut(idx);
        call.audio_started = false;
        update_local_phase(monitor, call, CallPhase::CallEnded);
        emit_update(monitor, mdp_tx, metrics, local_codecs, call, now_ms);
    }
    let removed = table.remove(idx);
    metrics.vomp_calls_live.set(table.len() as i64);
    debug!(
        session = %format!("{:06x}", removed.local.session),
        "call destroyed"
    );
}
