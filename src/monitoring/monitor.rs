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

//! Monitor notifier: line-oriented call status events for local clients.
//!
//! Clients register a channel and receive newline-terminated event lines.
//! Audio is framed as `*<N>:AUDIOPACKET:...\n` followed by N raw bytes and a
//! trailing newline, so clients in command mode can skip payloads they do not
//! understand. Session ids are six lowercase hex digits.

use crate::core::types::Sid;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A call status snapshot for `CALLSTATUS` lines.
#[derive(Clone, Debug)]
pub struct CallStatus {
    /// Our session id.
    pub local_session: u32,
    /// Peer session id (zero until learned).
    pub remote_session: u32,
    /// Our call state (1..6).
    pub local_state: u8,
    /// Peer call state (1..6).
    pub remote_state: u8,
    /// Fast-audio flag.
    pub fast_audio: u8,
    /// Our SID.
    pub local_sid: Sid,
    /// Peer SID.
    pub remote_sid: Sid,
    /// Our dialable id.
    pub local_did: String,
    /// Peer dialable id.
    pub remote_did: String,
}

/// Fan-out of monitor lines to registered clients.
#[derive(Default)]
pub struct Monitor {
    clients: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Monitor {
    /// Notifier with no clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; the receiver gets every subsequent event.
    pub fn register(&self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut g) = self.clients.lock() {
            g.push(tx);
        }
        rx
    }

    /// True when at least one live client is registered.
    ///
    /// A call cannot be serviced without a listener; the state machine uses
    /// this to reject inbound calls outright.
    pub fn has_listeners(&self) -> bool {
        match self.clients.lock() {
            Ok(mut g) => {
                g.retain(|tx| !tx.is_closed());
                !g.is_empty()
            }
            Err(_) => false,
        }
    }

    fn tell(&self, msg: Vec<u8>) {
        if let Ok(mut g) = self.clients.lock() {
            g.retain(|tx| tx.send(msg.clone()).is_ok());
        }
    }

    /// `CALLTO:<session>:<local_sid>:<local_did>:<remote_sid>:<remote_did>`
    pub fn call_to(
        &self,
        session: u32,
        local_sid: &Sid,
        local_did: &str,
        remote_sid: &Sid,
        remote_did: &str,
    ) {
        self.tell(
            format!("CALLTO:{session:06x}:{local_sid}:{local_did}:{remote_sid}:{remote_did}\n")
                .into_bytes(),
        );
    }

    /// `CALLFROM:<session>:<local_sid>:<local_did>:<remote_sid>:<remote_did>`
    pub fn call_from(
        &self,
        session: u32,
        local_sid: &Sid,
        local_did: &str,
        remote_sid: &Sid,
        remote_did: &str,
    ) {
        self.tell(
            format!("CALLFROM:{session:06x}:{local_sid}:{local_did}:{remote_sid}:{remote_did}\n")
                .into_bytes(),
        );
    }

    /// `RINGING:<session>`
    pub fn ringing(&self, session: u32) {
        self.tell(format!("RINGING:{session:06x}\n").into_bytes());
    }

    /// `ANSWERED:<session>`
    pub fn answered(&self, session: u32) {
        self.tell(format!("ANSWERED:{session:06x}\n").into_bytes());
    }

    /// `HANGUP:<session>`
    pub fn hangup(&self, session: u32) {
        self.tell(format!("HANGUP:{session:06x}\n").into_bytes());
    }

    /// `KEEPALIVE:<session>`
    pub fn keepalive(&self, session: u32) {
        self.tell(format!("KEEPALIVE:{session:06x}\n").into_bytes());
    }

    /// `CALLSTATUS:<ls>:<rs>:<lstate>:<rstate>:<fast>:<lsid>:<rsid>:<ldid>:<rdid>`
    pub fn call_status(&self, st: &CallStatus) {
        self.tell(
            format!(
                "CALLSTATUS:{:06x}:{:06x}:{}:{}:{}:{}:{}:{}:{}\n",
                st.local_session,
                st.remote_session,
                st.local_state,
                st.remote_state,
                st.fast_audio,
                st.local_sid,
                st.remote_sid,
                st.local_did,
                st.remote_did
            )
            .into_bytes(),
        );
    }

    /// `*<N>:AUDIOPACKET:<session>:<codec>:<start>:<end>` + N raw bytes.
    pub fn audio_packet(&self, session: u32, codec: u8, start: u32, end: u32, audio: &[u8]) {
        let mut msg = format!(
            "*{}:AUDIOPACKET:{session:06x}:{codec}:{start}:{end}\n",
            audio.len()
        )
        .into_bytes();
        msg.extend_from_slice(audio);
        msg.push(b'\n');
        self.tell(msg);
    }
}
