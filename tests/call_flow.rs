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
use driftmesh::networking::mdp::{MdpAddr, MdpFrame, MdpReceiver, MDP_NOCRYPT, MDP_PORT_VOMP};
use driftmesh::vomp::call::CallPhase;
use driftmesh::vomp::core::{VompCore, VompError, VompTimers};
use driftmesh::vomp::wire::FrameHeader;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Node {
    core: VompCore,
    egress: MdpReceiver,
    monitor_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    sid: Sid,
}

fn node(tag: u8) -> Node {
    node_with_timers(tag, VompTimers::default())
}

fn node_with_timers(tag: u8, timers: VompTimers) -> Node {
    let monitor = Arc::new(Monitor::new());
    let monitor_rx = monitor.register();
    let metrics = Arc::new(Metrics::new().unwrap());
    let (mdp_tx, egress) = mpsc::unbounded_channel();
    let mut core = VompCore::with_timers(monitor, mdp_tx, metrics, timers);
    core.set_local_codecs(&[0x05, 0x06]);
    Node {
        core,
        egress,
        monitor_rx,
        sid: Sid::from_bytes([tag; 32]),
    }
}

fn drain_frames(rx: &mut MdpReceiver) -> Vec<MdpFrame> {
    let mut out = Vec::new();
    while let Ok(f) = rx.try_recv() {
        out.push(f);
    }
    out
}

fn monitor_text(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> String {
    let mut out = String::new();
    while let Ok(chunk) = rx.try_recv() {
        out.push_str(&String::from_utf8_lossy(&chunk));
    }
    out
}

/// Deliver every pending frame from `from` into `to`, repeating until both
/// sides go quiet. Returns the number of frames moved.
fn pump(a: &mut Node, b: &mut Node, now_ms: u64) -> usize {
    let mut moved = 0;
    loop {
        let mut progressed = false;
        for f in drain_frames(&mut a.egress) {
            let _ = b.core.mdp_received(&f, now_ms);
            moved += 1;
            progressed = true;
        }
        for f in drain_frames(&mut b.egress) {
            let _ = a.core.mdp_received(&f, now_ms);
            moved += 1;
            progressed = true;
        }
        if !progressed {
            return moved;
        }
    }
}

fn synth_frame(from: &Node, to: &Node, header: FrameHeader) -> MdpFrame {
    let mut payload = Vec::new();
    header.encode(&mut payload);
    MdpFrame {
        src: MdpAddr {
            sid: from.sid,
            port: MDP_PORT_VOMP,
        },
        dst: MdpAddr {
            sid: to.sid,
            port: MDP_PORT_VOMP,
        },
        flags: 0,
        payload,
    }
}

#[test]
fn dial_ring_pickup_reaches_incall_on_both_sides() {
    let mut a = node(0xAA);
    let mut b = node(0xBB);

    let b_sid = b.sid;
    let a_session = a
        .core
        .dial(a.sid, b_sid, "5550001", "5550002", 0)
        .unwrap();
    pump(&mut a, &mut b, 10);

    // B learned the caller's identity and is being rung.
    assert_eq!(b.core.call_count(), 1);
    let b_text = monitor_text(&mut b.monitor_rx);
    assert!(b_text.contains("CALLFROM:"), "got: {b_text}");
    assert!(b_text.contains("5550001"), "got: {b_text}");

    let b_session = {
        // B's session appears in its CALLFROM line.
        let line = b_text
            .lines()
            .find(|l| l.starts_with("CALLFROM:"))
            .unwrap()
            .to_string();
        u32::from_str_radix(line.split(':').nth(1).unwrap(), 16).unwrap()
    };

    b.core.ring(b_session, 20).unwrap();
    pump(&mut a, &mut b, 30);
    let a_text = monitor_text(&mut a.monitor_rx);
    assert!(a_text.contains("CALLTO:"), "got: {a_text}");
    assert!(a_text.contains(&format!("RINGING:{a_session:06x}")), "got: {a_text}");

    b.core.pickup(b_session, 40).unwrap();
    pump(&mut a, &mut b, 50);

    assert_eq!(
        a.core.phases(a_session),
        Some((CallPhase::InCall, CallPhase::InCall))
    );
    assert_eq!(
        b.core.phases(b_session),
        Some((CallPhase::InCall, CallPhase::InCall))
    );
    let a_text = monitor_text(&mut a.monitor_rx);
    assert!(a_text.contains(&format!("ANSWERED:{a_session:06x}")), "got: {a_text}");
}

#[test]
fn simultaneous_dial_jumps_to_incall() {
    let mut a = node(0x01);
    let mut b = node(0x02);
    let b_sid = b.sid;

    let a_session = a.core.dial(a.sid, b_sid, "100", "200", 0).unwrap();
    drain_frames(&mut a.egress);

    // B's CALLPREP frame, already naming our session: the caller advances to
    // RINGINGOUT because it initiated the call.
    let f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: CallPhase::CallPrep.as_u8(),
            local_state: CallPhase::CallPrep.as_u8(),
            remote_sequence: 0,
            local_sequence: 1,
            call_millis: 0,
            remote_session: a_session,
            local_session: 0x00BEEF,
        },
    );
    a.core.mdp_received(&f, 10).unwrap();
    assert_eq!(
        a.core.phases(a_session),
        Some((CallPhase::RingingOut, CallPhase::CallPrep))
    );

    // B reports RINGINGOUT while we are RINGINGOUT: both sides establish.
    let f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: CallPhase::RingingOut.as_u8(),
            local_state: CallPhase::RingingOut.as_u8(),
            remote_sequence: 1,
            local_sequence: 2,
            call_millis: 5,
            remote_session: a_session,
            local_session: 0x00BEEF,
        },
    );
    a.core.mdp_received(&f, 20).unwrap();
    assert_eq!(
        a.core.phases(a_session),
        Some((CallPhase::InCall, CallPhase::RingingOut))
    );
}

#[test]
fn unanswered_ring_times_out_and_hangs_up() {
    let timers = VompTimers {
        status_interval_ms: 10,
        dial_timeout_ms: 50,
        ring_timeout_ms: 100,
        network_timeout_ms: 10_000,
    };
    let mut a = node_with_timers(0x11, timers);
    let b = node(0x22);

    let a_session = a.core.dial(a.sid, b.sid, "100", "200", 0).unwrap();
    drain_frames(&mut a.egress);

    // Far end acknowledges up to RINGINGIN but never answers.
    let f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: CallPhase::CallPrep.as_u8(),
            local_state: CallPhase::NoCall.as_u8(),
            remote_sequence: 0,
            local_sequence: 1,
            call_millis: 0,
            remote_session: a_session,
            local_session: 0x000777,
        },
    );
    a.core.mdp_received(&f, 5).unwrap();
    let f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: CallPhase::RingingOut.as_u8(),
            local_state: CallPhase::RingingIn.as_u8(),
            remote_sequence: 1,
            local_sequence: 2,
            call_millis: 2,
            remote_session: a_session,
            local_session: 0x000777,
        },
    );
    a.core.mdp_received(&f, 8).unwrap();
    assert_eq!(
        a.core.phases(a_session),
        Some((CallPhase::RingingOut, CallPhase::RingingIn))
    );
    drop(monitor_text(&mut a.monitor_rx));

    // Before the ring timeout the call survives its ticks.
    a.core.tick(50);
    assert_eq!(a.core.call_count(), 1);

    // Past VOMP_CALL_RING_TIMEOUT with local still below INCALL: destroyed.
    a.core.tick(150);
    assert_eq!(a.core.call_count(), 0);
    let text = monitor_text(&mut a.monitor_rx);
    assert!(text.contains(&format!("HANGUP:{a_session:06x}")), "got: {text}");
}

#[test]
fn keepalives_flow_while_a_call_is_live() {
    let timers = VompTimers {
        status_interval_ms: 10,
        dial_timeout_ms: 10_000,
        ring_timeout_ms: 10_000,
        network_timeout_ms: 10_000,
    };
    let mut a = node_with_timers(0x31, timers);
    let b = node(0x32);
    let a_session = a.core.dial(a.sid, b.sid, "1", "2", 0).unwrap();
    drop(monitor_text(&mut a.monitor_rx));

    a.core.tick(20);
    let text = monitor_text(&mut a.monitor_rx);
    assert!(text.contains(&format!("KEEPALIVE:{a_session:06x}")), "got: {text}");
    assert!(!drain_frames(&mut a.egress).is_empty());
}

#[test]
fn invalid_combined_state_is_ignored_entirely() {
    let mut a = node(0x41);
    let b = node(0x42);
    let a_session = a.core.dial(a.sid, b.sid, "1", "2", 0).unwrap();
    drain_frames(&mut a.egress);

    // (CALLPREP, INCALL) is not in the table: the frame must not move state.
    let f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: CallPhase::CallPrep.as_u8(),
            local_state: CallPhase::InCall.as_u8(),
            remote_sequence: 0,
            local_sequence: 9,
            call_millis: 0,
            remote_session: a_session,
            local_session: 0x000333,
        },
    );
    a.core.mdp_received(&f, 10).unwrap();
    assert_eq!(
        a.core.phases(a_session),
        Some((CallPhase::CallPrep, CallPhase::NoCall))
    );
    assert!(drain_frames(&mut a.egress).is_empty());
}

#[test]
fn frames_without_transport_authentication_are_rejected() {
    let mut a = node(0x51);
    let b = node(0x52);
    let mut f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: 1,
            local_state: 2,
            remote_sequence: 0,
            local_sequence: 0,
            call_millis: 0,
            remote_session: 0,
            local_session: 0x000123,
        },
    );
    f.flags = MDP_NOCRYPT;
    assert!(matches!(
        a.core.mdp_received(&f, 0),
        Err(VompError::NotAuthCrypted)
    ));
    assert_eq!(a.core.call_count(), 0);
}

#[test]
fn unsupported_frame_type_is_rejected() {
    let mut a = node(0x61);
    let b = node(0x62);
    let mut f = synth_frame(
        &b,
        &a,
        FrameHeader {
            remote_state: 1,
            local_state: 2,
            remote_sequence: 0,
            local_sequence: 0,
            call_millis: 0,
            remote_session: 0,
            local_session: 0x000123,
        },
    );
    f.payload[0] = 0x7F;
    assert!(a.core.mdp_received(&f, 0).is_err());
    assert_eq!(a.core.call_count(), 0);
}

#[test]
fn calls_are_rejected_without_a_monitor_listener() {
    // A node whose monitor has no registered client cannot service calls.
    let monitor = Arc::new(Monitor::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let (mdp_tx, mut egress) = mpsc::unbounded_channel();
    let mut core = VompCore::new(monitor, mdp_tx, metrics);

    let caller = node(0x71);
    let local_sid = Sid::from_bytes([0x72; 32]);
    let mut payload = Vec::new();
    FrameHeader {
        remote_state: CallPhase::NoCall.as_u8(),
        local_state: CallPhase::CallPrep.as_u8(),
        remote_sequence: 0,
        local_sequence: 1,
        call_millis: 0,
        remote_session: 0,
        local_session: 0x000ABC,
    }
    .encode(&mut payload);
    let f = MdpFrame {
        src: MdpAddr {
            sid: caller.sid,
            port: MDP_PORT_VOMP,
        },
        dst: MdpAddr {
            sid: local_sid,
            port: MDP_PORT_VOMP,
        },
        flags: 0,
        payload,
    };
    core.mdp_received(&f, 0).unwrap();

    // The reply tells the caller we are done with the call.
    let reply = egress.try_recv().unwrap();
    let h = FrameHeader::parse(&reply.payload).unwrap();
    assert_eq!(h.local_state, CallPhase::CallEnded.as_u8());
}
