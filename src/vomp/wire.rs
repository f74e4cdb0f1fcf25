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

//! VoMP wire format.
//!
//! Every ordinary call frame starts with type byte `0x01` and a fixed
//! 14-byte header; all multi-byte fields are big-endian. Field names are from
//! the **sender's** perspective: `local` is the sender's own half, `remote`
//! is the sender's view of the recipient. Receivers therefore read the
//! sender's state from `local_state` and their own claimed state from
//! `remote_state`.
//!
//! ```text
//! offset  size  field
//! 0       1     frame type (0x01)
//! 1       1     (remote_state << 4) | local_state
//! 2       2     remote sequence
//! 4       2     local sequence
//! 6       2     ms since call start (low 16 bits)
//! 8       3     remote session (24-bit)
//! 11      3     local session (24-bit)
//! ```

use crate::vomp::codecs;
use crate::vomp::VOMP_SESSION_MASK;
use thiserror::Error;

/// Ordinary VoMP state + optional audio frame.
pub const VOMP_FRAME_ORDINARY: u8 = 0x01;
/// Fixed header length including the type byte.
pub const VOMP_HEADER_LEN: usize = 14;

/// Wire decoding errors.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated frame")]
    Truncated,
    #[error("unsupported frame type {0:#04x}")]
    FrameType(u8),
    #[error("state nybble out of range")]
    BadState,
}

/// The fixed frame header, sender perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sender's view of the recipient's state (1..6).
    pub remote_state: u8,
    /// Sender's own state (1..6).
    pub local_state: u8,
    /// Last sequence number heard from the recipient.
    pub remote_sequence: u16,
    /// Sender's own sequence number.
    pub local_sequence: u16,
    /// Milliseconds since the sender's call start, low 16 bits.
    pub call_millis: u16,
    /// Recipient's session id as known to the sender (24-bit, 0 if unknown).
    pub remote_session: u32,
    /// Sender's session id (24-bit).
    pub local_session: u32,
}

impl FrameHeader {
    /// Append the encoded header (with the leading type byte) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(VOMP_FRAME_ORDINARY);
        out.push(((self.remote_state & 0x0f) << 4) | (self.local_state & 0x0f));
        out.extend_from_slice(&self.remote_sequence.to_be_bytes());
        out.extend_from_slice(&self.local_sequence.to_be_bytes());
        out.extend_from_slice(&self.call_millis.to_be_bytes());
        let rs = self.remote_session & VOMP_SESSION_MASK;
        out.extend_from_slice(&[(rs >> 16) as u8, (rs >> 8) as u8, rs as u8]);
        let ls = self.local_session & VOMP_SESSION_MASK;
        out.extend_from_slice(&[(ls >> 16) as u8, (ls >> 8) as u8, ls as u8]);
    }

    /// Parse the header from a frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        if payload.is_empty() {
            return Err(WireError::Truncated);
        }
        if payload[0] != VOMP_FRAME_ORDINARY {
            return Err(WireError::FrameType(payload[0]));
        }
        if payload.len() < VOMP_HEADER_LEN {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            remote_state: payload[1] >> 4,
            local_state: payload[1] & 0x0f,
            remote_sequence: u16::from_be_bytes([payload[2], payload[3]]),
            local_sequence: u16::from_be_bytes([payload[4], payload[5]]),
            call_millis: u16::from_be_bytes([payload[6], payload[7]]),
            remote_session: u32::from_be_bytes([0, payload[8], payload[9], payload[10]]),
            local_session: u32::from_be_bytes([0, payload[11], payload[12], payload[13]]),
        })
    }
}

/// The optional codec-list / DID section following the header on frames
/// exchanged before either side reaches RINGINGOUT.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodecSection {
    /// Advertised codec ids, in wire order.
    pub codecs: Vec<u8>,
    /// (caller DID, callee DID) when the sender initiated the call.
    pub dids: Option<(String, String)>,
}

fn take_cstr(payload: &[u8], ofs: &mut usize) -> Option<String> {
    if *ofs >= payload.len() {
        return None;
    }
    let rest = &payload[*ofs..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let s = String::from_utf8_lossy(&rest[..end]).into_owned();
    *ofs += end + 1;
    Some(s)
}

/// Scan the zero-terminated codec list starting at the header boundary, and,
/// when `expect_dids` is set, the two NUL-terminated dialling strings that
/// follow it.
pub fn parse_codec_section(payload: &[u8], expect_dids: bool) -> CodecSection {
    let mut section = CodecSection::default();
    let mut ofs = VOMP_HEADER_LEN;
    while ofs < payload.len() && payload[ofs] != 0 {
        section.codecs.push(payload[ofs]);
        ofs += 1;
    }
    ofs += 1; // terminator
    if expect_dids {
        if let Some(caller) = take_cstr(payload, &mut ofs) {
            let callee = take_cstr(payload, &mut ofs).unwrap_or_default();
            section.dids = Some((caller, callee));
        }
    }
    section
}

/// One audio group lifted out of a frame's audio section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioGroup {
    /// Codec id.
    pub codec: u8,
    /// Start of the block, ms since call establishment.
    pub start_ms: u32,
    /// End of the block, inclusive.
    pub end_ms: u32,
    /// Raw sample bytes (`sample_size(codec)` of them).
    pub bytes: Vec<u8>,
}

/// Walk the audio section starting at `ofs`: a 4-byte absolute end-time
/// followed by `{codec, bytes}` groups, newest first. Unknown codecs or a
/// truncated group end the walk, mirroring the tolerance of the wire peers.
pub fn parse_audio_section(payload: &[u8], mut ofs: usize) -> Vec<AudioGroup> {
    let mut groups = Vec::new();
    if ofs + 4 > payload.len() {
        return groups;
    }
    let mut end_ms = u32::from_be_bytes([
        payload[ofs],
        payload[ofs + 1],
        payload[ofs + 2],
        payload[ofs + 3],
    ]);
    ofs += 4;

    while ofs < payload.len() {
        let codec = payload[ofs];
        if codec == 0 {
            break;
        }
        let Some(size) = codecs::sample_size(codec) else {
            break;
        };
        if ofs + 1 + size > payload.len() {
            break;
        }
        let span = codecs::timespan_ms(codec).unwrap_or(1);
        let start_ms = end_ms.wrapping_sub(span).wrapping_add(1);
        groups.push(AudioGroup {
            codec,
            start_ms,
            end_ms,
            bytes: payload[ofs + 1..ofs + 1 + size].to_vec(),
        });
        ofs += 1 + size;
        end_ms = start_ms.wrapping_sub(1);
    }
    groups
}
