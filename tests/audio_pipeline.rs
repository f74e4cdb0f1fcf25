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

use driftmesh::core::types::Sid;
use driftmesh::monitoring::metrics::Metrics;
use driftmesh::monitoring::monitor::Monitor;
use driftmesh::networking::mdp::{MdpAddr, MdpFrame, MdpReceiver, MDP_PORT_VOMP};
use driftmesh::vomp::call::CallPhase;
use driftmesh::vomp::codecs::{VOMP_CODEC_16SIGNED, VOMP_CODEC_DTMF};
use driftmesh::vomp::core::VompCore;
use driftmesh::vomp::wire::{self, FrameHeader, VOMP_HEADER_LEN};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Node {
    core: VompCore,
    egress: MdpReceiver,
    monitor_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    sid: Sid,
    peer_sid: Sid,
    peer_session: u32,
    session: u32,
}

/// Drive a dialing node to INCALL against a synthesized far end.
fn established_node(tag: u8) -> Node {
    let monitor = Arc::new(Monitor::new());
    let monitor_rx = monitor.register();
    let metrics = Arc::new(Metrics::new().unwrap());
    let (mdp_tx, mut egress) = mpsc::unbounded_channel();
    let mut core = VompCore::new(monitor, mdp_tx, metrics);
    core.set_local_codecs(&[VOMP_CODEC_16SIGNED, VOMP_CODEC_DTMF]);

    let sid = Sid::from_bytes([tag; 32]);
    let peer_sid = Sid::from_bytes([tag ^ 0xFF; 32]);
    let peer_session = 0x00D00D;
    let session = core.dial(sid, peer_sid, "100", "200", 0).unwrap();

    // Far end acknowledges, we ring out, far end answers.
    deliver(&mut core, peer_sid, sid, peer_session, session, CallPhase::NoCall, 5);
    deliver(&mut core, peer_sid, sid, peer_session, session, CallPhase::InCall, 10);
    assert_eq!(
        core.phases(session),
        Some((CallPhase::InCall, CallPhase::InCall))
    );
    while egress.try_recv().is_ok() {}

    Node {
        core,
        egress,
        monitor_rx,
        sid,
        peer_sid,
        peer_session,
        session,
    }
}

fn deliver(
    core: &mut VompCore,
    from: Sid,
    to: Sid,
    sender_session: u32,
    recvr_session: u32,
    sender_phase: CallPhase,
    now_ms: u64,
) {
    let mut payload = Vec::new();
    FrameHeader {
        remote_state: CallPhase::NoCall.as_u8(),
        local_state: sender_phase.as_u8(),
        remote_sequence: 0,
        local_sequence: 0,
        call_millis: 0,
        remote_session: recvr_session,
        local_session: sender_session,
    }
    .encode(&mut payload);
    let f = MdpFrame {
        src: MdpAddr {
            sid: from,
            port: MDP_PORT_VOMP,
        },
        dst: MdpAddr {
            sid: to,
            port: MDP_PORT_VOMP,
        },
        flags: 0,
        payload,
    };
    core.mdp_received(&f, now_ms).unwrap();
}

fn audio_frame(node: &Node, end_time: u32, groups: &[(u8, Vec<u8>)]) -> MdpFrame {
    let mut payload = Vec::new();
    FrameHeader {
        remote_state: CallPhase::InCall.as_u8(),
        local_state: CallPhase::InCall.as_u8(),
        remote_sequence: 0,
        local_sequence: 3,
        call_millis: end_time as u16,
        remote_session: node.session,
        local_session: node.peer_session,
    }
    .encode(&mut payload);
    payload.extend_from_slice(&end_time.to_be_bytes());
    for (codec, bytes) in groups {
        payload.push(*codec);
        payload.extend_from_slice(bytes);
    }
    MdpFrame {
        src: MdpAddr {
            sid: node.peer_sid,
            port: MDP_PORT_VOMP,
        },
        dst: MdpAddr {
            sid: node.sid,
            port: MDP_PORT_VOMP,
        },
        flags: 0,
        payload,
    }
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}

fn drain_monitor(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        out.extend_from_slice(&chunk);
    }
    out
}

#[test]
fn each_full_block_emits_exactly_one_frame() {
    let mut n = established_node(0x10);
    // Three full 16SIGNED blocks (320 bytes / 20 ms each).
    let audio = vec![0x42u8; 320 * 3];
    n.core
        .received_audio(n.session, VOMP_CODEC_16SIGNED, &audio, 100)
        .unwrap();

    let mut frames = Vec::new();
    while let Ok(f) = n.egress.try_recv() {
        frames.push(f);
    }
    assert_eq!(frames.len(), 3);

    // Newest-first stuffing: each frame carries exactly the one fresh block,
    // older blocks having been consumed by the previous emission.
    for (i, f) in frames.iter().enumerate() {
        let groups = wire::parse_audio_section(&f.payload, VOMP_HEADER_LEN);
        assert_eq!(groups.len(), 1, "frame {i}");
        assert_eq!(groups[0].codec, VOMP_CODEC_16SIGNED);
        assert_eq!(groups[0].bytes, vec![0x42u8; 320]);
    }
}

#[test]
fn partial_block_stays_buffered() {
    let mut n = established_node(0x20);
    let audio = vec![1u8; 100]; // less than a 320-byte block
    n.core
        .received_audio(n.session, VOMP_CODEC_16SIGNED, &audio, 100)
        .unwrap();
    assert!(n.egress.try_recv().is_err());

    // Topping the block up emits the frame.
    let rest = vec![2u8; 220];
    n.core
        .received_audio(n.session, VOMP_CODEC_16SIGNED, &rest, 120)
        .unwrap();
    let f = n.egress.try_recv().unwrap();
    let groups = wire::parse_audio_section(&f.payload, VOMP_HEADER_LEN);
    assert_eq!(groups.len(), 1);
    assert_eq!(&groups[0].bytes[..100], &[1u8; 100][..]);
    assert_eq!(&groups[0].bytes[100..], &[2u8; 220][..]);
}

#[test]
fn replayed_end_time_is_not_forwarded_twice() {
    let mut n = established_node(0x30);
    drain_monitor(&mut n.monitor_rx);

    let f = audio_frame(&n, 500, &[(VOMP_CODEC_DTMF, vec![0x07])]);
    n.core.mdp_received(&f, 50).unwrap();
    n.core.mdp_received(&f, 60).unwrap();

    let out = drain_monitor(&mut n.monitor_rx);
    assert_eq!(count_occurrences(&out, b"AUDIOPACKET"), 1);
}

#[test]
fn truncated_trailing_group_is_dropped() {
    let mut n = established_node(0x40);
    drain_monitor(&mut n.monitor_rx);

    // A valid DTMF group followed by a 16SIGNED group with too few bytes.
    let f = audio_frame(
        &n,
        900,
        &[(VOMP_CODEC_DTMF, vec![0x01]), (VOMP_CODEC_16SIGNED, vec![0; 10])],
    );
    n.core.mdp_received(&f, 50).unwrap();
    let out = drain_monitor(&mut n.monitor_rx);
    assert_eq!(count_occurrences(&out, b"AUDIOPACKET"), 1);
}

#[test]
fn unknown_codec_ends_the_audio_walk() {
    let mut n = established_node(0x50);
    drain_monitor(&mut n.monitor_rx);

    let f = audio_frame(
        &n,
        1_200,
        &[(0x55, vec![0; 64]), (VOMP_CODEC_DTMF, vec![0x02])],
    );
    n.core.mdp_received(&f, 50).unwrap();
    let out = drain_monitor(&mut n.monitor_rx);
    assert_eq!(count_occurrences(&out, b"AUDIOPACKET"), 0);
}

#[test]
fn codec_change_mid_block_is_tolerated() {
    let mut n = established_node(0x60);
    n.core
        .received_audio(n.session, VOMP_CODEC_16SIGNED, &[0u8; 100], 10)
        .unwrap();
    // Switching codecs with a block open is logged, not fatal; the open
    // block keeps filling.
    n.core
        .received_audio(n.session, VOMP_CODEC_DTMF, &[9u8; 220], 20)
        .unwrap();
    let f = n.egress.try_recv().unwrap();
    let groups = wire::parse_audio_section(&f.payload, VOMP_HEADER_LEN);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].codec, VOMP_CODEC_16SIGNED);
}
