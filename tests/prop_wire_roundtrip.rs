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

use driftmesh::vomp::wire::{parse_audio_section, FrameHeader, VOMP_HEADER_LEN};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_header_round_trips_every_field(
        remote_state in 1u8..=6,
        local_state in 1u8..=6,
        remote_sequence in any::<u16>(),
        local_sequence in any::<u16>(),
        call_millis in any::<u16>(),
        remote_session in 0u32..=0x00ff_ffff,
        local_session in 0u32..=0x00ff_ffff,
    ) {
        let h = FrameHeader {
            remote_state,
            local_state,
            remote_sequence,
            local_sequence,
            call_millis,
            remote_session,
            local_session,
        };
        let mut buf = Vec::new();
        h.encode(&mut buf);
        prop_assert_eq!(buf.len(), VOMP_HEADER_LEN);
        let parsed = FrameHeader::parse(&buf).unwrap();
        prop_assert_eq!(parsed, h);
    }

    #[test]
    fn prop_header_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = FrameHeader::parse(&data);
    }

    #[test]
    fn prop_audio_walk_never_panics_and_groups_are_sane(
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        for g in parse_audio_section(&data, VOMP_HEADER_LEN) {
            // Whatever the input, a lifted group is internally consistent.
            prop_assert_eq!(
                Some(g.bytes.len()),
                driftmesh::vomp::codecs::sample_size(g.codec)
            );
        }
    }
}
