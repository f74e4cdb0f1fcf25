// Copyright (c) 2026 Driftmesh
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: the response header parser must not panic on any block.
    let _ = driftmesh::rhizome::fetch::parse_http_headers(data);
});
