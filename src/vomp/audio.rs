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

//! Audio carriage.
//!
//! Send side: captured audio fills the current rotor block; a fresh block is
//! stamped `[audio_clock, audio_clock + timespan - 1]` and the clock
//! advances. Full blocks trigger frame emission, and emission stuffs as many
//! recent blocks as fit under the payload budget (newest first) as preemptive
//! retransmission against packet loss.
//!
//! Receive side: groups are deduplicated by their end-time against a small
//! circular buffer and forwarded to monitor clients. Clients are still
//! expected to reorder and filter; the ring only suppresses the bulk of the
//! stuffing redundancy.

use crate::monitoring::metrics::Metrics;
use crate::monitoring::monitor::Monitor;
use crate::vomp::call::CallState;
use crate::vomp::codecs;
use crate::vomp::wire::{self, VOMP_HEADER_LEN};
use crate::vomp::{VOMP_MAX_RECENT_SAMPLES, VOMP_STUFF_BYTES};
use tracing::warn;

/// Copy captured audio into the current rotor block, stamping a fresh block
/// with the capture clock. Returns the number of bytes consumed.
///
/// Timestamps follow the clock, not wall time: the producer is expected to
/// deliver exactly real-time amounts of audio, and in-call slew is the
/// player's problem.
pub(crate) fn fill_block(call: &mut CallState, codec: u8, data: &[u8]) -> usize {
    let rotor = call.sample_rotor % VOMP_MAX_RECENT_SAMPLES;
    let block = &mut call.recent_samples[rotor];
    if block.len == 0 {
        let span = codecs::timespan_ms(codec).unwrap_or(1);
        block.codec = codec;
        block.start_ms = call.audio_clock;
        block.end_ms = call.audio_clock.wrapping_add(span).wrapping_sub(1);
        call.audio_clock = block.end_ms.wrapping_add(1);
    } else if block.codec != codec {
        warn!(
            open = codecs::describe(block.codec),
            new = codecs::describe(codec),
            "previous audio buffer was not finished"
        );
    }
    let size = codecs::sample_size(block.codec).unwrap_or(0);
    let take = size.saturating_sub(block.len).min(data.len());
    block.bytes[block.len..block.len + take].copy_from_slice(&data[..take]);
    block.len += take;
    take
}

/// True when the current rotor block holds a full codec frame.
pub(crate) fn current_block_full(call: &CallState) -> bool {
    let block = &call.recent_samples[call.sample_rotor % VOMP_MAX_RECENT_SAMPLES];
    block.len > 0 && Some(block.len) == codecs::sample_size(block.codec)
}

/// Append the audio section to an outbound frame payload: the absolute
/// capture clock, then recent blocks newest-first while they fit under
/// [`VOMP_STUFF_BYTES`] and remain contiguous in time. Stuffed blocks are
/// consumed; the rotor advances past the current block.
pub(crate) fn append_stuffed_audio(call: &mut CallState, out: &mut Vec<u8>) {
    if !current_block_full(call) {
        return;
    }
    out.extend_from_slice(&call.audio_clock.to_be_bytes());

    let n = VOMP_MAX_RECENT_SAMPLES;
    let mut rotor = call.sample_rotor % n;
    loop {
        let (codec, len) = {
            let block = &call.recent_samples[rotor];
            (block.codec, block.len)
        };
        if len == 0 || Some(len) != codecs::sample_size(codec) {
            break;
        }
        if out.len() + 1 + len >= VOMP_STUFF_BYTES {
            break;
        }
        out.push(codec);
        let block = &mut call.recent_samples[rotor];
        out.extend_from_slice(&block.bytes[..len]);
        block.len = 0;

        rotor = (rotor + n - 1) % n;
        let next = &call.recent_samples[rotor];
        // Out of history, or wrapped back to the newest block.
        if next.end_ms == 0 || next.end_ms.wrapping_add(1) == call.audio_clock {
            break;
        }
    }
    call.sample_rotor = (call.sample_rotor + 1) % n;
}

/// Walk an inbound frame's audio section, dropping already-seen blocks and
/// forwarding fresh ones to monitor clients.
pub(crate) fn process_incoming(
    call: &mut CallState,
    monitor: &Monitor,
    metrics: &Metrics,
    payload: &[u8],
) {
    for group in wire::parse_audio_section(payload, VOMP_HEADER_LEN) {
        if call.already_seen(group.end_ms) {
            metrics.vomp_audio_dup_total.inc();
            continue;
        }
        if monitor.has_listeners() {
            monitor.audio_packet(
                call.local.session,
                group.codec,
                group.start_ms,
                group.end_ms,
                &group.bytes,
            );
        }
    }
}
