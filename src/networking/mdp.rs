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

//! MDP datagram seam.
//!
//! The mesh datagram transport delivers authenticated payloads between
//! (SID, port) endpoints. The transport itself lives outside this crate; the
//! cores consume it through these types and a fire-and-forget sender.

use crate::core::types::Sid;
use tokio::sync::mpsc;

/// MDP port carrying VoMP call frames.
pub const MDP_PORT_VOMP: u32 = 12;

/// Frame was not encrypted by the transport.
pub const MDP_NOCRYPT: u8 = 0x01;
/// Frame was not signed by the transport.
pub const MDP_NOSIGN: u8 = 0x02;

/// A (SID, port) endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MdpAddr {
    /// Subscriber id.
    pub sid: Sid,
    /// Port number.
    pub port: u32,
}

/// An authenticated datagram.
#[derive(Clone, Debug)]
pub struct MdpFrame {
    /// Sender endpoint.
    pub src: MdpAddr,
    /// Recipient endpoint.
    pub dst: MdpAddr,
    /// Transport flags (`MDP_NOCRYPT` / `MDP_NOSIGN`).
    pub flags: u8,
    /// Wire payload.
    pub payload: Vec<u8>,
}

impl MdpFrame {
    /// True when the transport both encrypted and signed the frame.
    pub fn auth_crypted(&self) -> bool {
        self.flags & (MDP_NOCRYPT | MDP_NOSIGN) == 0
    }
}

/// Fire-and-forget egress handle into the transport.
pub type MdpSender = mpsc::UnboundedSender<MdpFrame>;

/// Ingress half handed to whoever drives the transport.
pub type MdpReceiver = mpsc::UnboundedReceiver<MdpFrame>;
