// Copyright (c) 2026 Driftmesh
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: ensure the wire parsers never panic on hostile frames.
    // State-machine behavior is covered by integration tests.
    let _ = driftmesh::vomp::wire::FrameHeader::parse(data);
    let _ = driftmesh::vomp::wire::parse_codec_section(data, true);
    let _ = driftmesh::vomp::wire::parse_codec_section(data, false);
    let _ = driftmesh::vomp::wire::parse_audio_section(data, driftmesh::vomp::wire::VOMP_HEADER_LEN);
});
