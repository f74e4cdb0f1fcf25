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

//! Fixed codec table: wire id -> (block size, block timespan).
//!
//! Codec id zero terminates codec lists on the wire, so no real codec uses it
//! for payload framing.

/// Silence / no codec.
pub const VOMP_CODEC_NONE: u8 = 0x00;
/// Codec2 at 2400bps (whole-byte packing).
pub const VOMP_CODEC_CODEC2_2400: u8 = 0x01;
/// Codec2 at 1400bps.
pub const VOMP_CODEC_CODEC2_1400: u8 = 0x02;
/// GSM half rate.
pub const VOMP_CODEC_GSMHALF: u8 = 0x03;
/// GSM full rate.
pub const VOMP_CODEC_GSMFULL: u8 = 0x04;
/// Raw signed 16-bit PCM at 8kHz.
pub const VOMP_CODEC_16SIGNED: u8 = 0x05;
/// 8-bit u-law.
pub const VOMP_CODEC_8ULAW: u8 = 0x06;
/// 8-bit a-law.
pub const VOMP_CODEC_8ALAW: u8 = 0x07;
/// PCM at 8kHz.
pub const VOMP_CODEC_PCM: u8 = 0x08;
/// DTMF digit events.
pub const VOMP_CODEC_DTMF: u8 = 0x80;
/// Engaged tone marker.
pub const VOMP_CODEC_ENGAGED: u8 = 0x81;
/// On-hold marker.
pub const VOMP_CODEC_ONHOLD: u8 = 0x82;
/// Caller-id data.
pub const VOMP_CODEC_CALLERID: u8 = 0x83;

/// Sample block size in bytes, or `None` for an unknown codec.
pub fn sample_size(codec: u8) -> Option<usize> {
    match codec {
        VOMP_CODEC_NONE => Some(0),
        VOMP_CODEC_CODEC2_2400 => Some(7),
        VOMP_CODEC_CODEC2_1400 => Some(7),
        VOMP_CODEC_GSMHALF => Some(14),
        VOMP_CODEC_GSMFULL => Some(33),
        VOMP_CODEC_16SIGNED => Some(320),
        VOMP_CODEC_8ULAW => Some(160),
        VOMP_CODEC_8ALAW => Some(160),
        VOMP_CODEC_PCM => Some(320),
        VOMP_CODEC_DTMF => Some(1),
        VOMP_CODEC_ENGAGED => Some(0),
        VOMP_CODEC_ONHOLD => Some(0),
        VOMP_CODEC_CALLERID => Some(32),
        _ => None,
    }
}

/// Milliseconds of audio a block covers, or `None` for an unknown codec.
pub fn timespan_ms(codec: u8) -> Option<u32> {
    match codec {
        VOMP_CODEC_NONE => Some(1),
        VOMP_CODEC_CODEC2_2400 => Some(20),
        VOMP_CODEC_CODEC2_1400 => Some(40),
        VOMP_CODEC_GSMHALF => Some(20),
        VOMP_CODEC_GSMFULL => Some(20),
        VOMP_CODEC_16SIGNED => Some(20),
        VOMP_CODEC_8ULAW => Some(20),
        VOMP_CODEC_8ALAW => Some(20),
        VOMP_CODEC_PCM => Some(20),
        VOMP_CODEC_DTMF => Some(80),
        VOMP_CODEC_ENGAGED => Some(20),
        VOMP_CODEC_ONHOLD => Some(20),
        VOMP_CODEC_CALLERID => Some(0),
        _ => None,
    }
}

/// Human-readable codec name for logs.
pub fn describe(codec: u8) -> &'static str {
    match codec {
        VOMP_CODEC_NONE => "none",
        VOMP_CODEC_CODEC2_2400 => "CODEC2@2400",
        VOMP_CODEC_CODEC2_1400 => "CODEC2@1400",
        VOMP_CODEC_GSMHALF => "GSM-half-rate",
        VOMP_CODEC_GSMFULL => "GSM-full-rate",
        VOMP_CODEC_16SIGNED => "16bit-raw",
        VOMP_CODEC_8ULAW => "8bit-uLaw",
        VOMP_CODEC_8ALAW => "8bit-aLaw",
        VOMP_CODEC_PCM => "PCM@8KHz",
        VOMP_CODEC_DTMF => "DTMF",
        VOMP_CODEC_ENGAGED => "Engaged-tone",
        VOMP_CODEC_ONHOLD => "On-Hold",
        VOMP_CODEC_CALLERID => "CallerID",
        _ => "unknown",
    }
}

/// Map a dial character to its DTMF digit code.
pub fn dtmf_digit_from_char(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'a' | 'A' => Some(0xa),
        'b' | 'B' => Some(0xb),
        'c' | 'C' => Some(0xc),
        'd' | 'D' => Some(0xd),
        '*' => Some(0xe),
        '#' => Some(0xf),
        _ => None,
    }
}

/// Map a DTMF digit code back to its dial character.
pub fn dtmf_char_from_digit(digit: u8) -> char {
    match digit {
        0..=9 => (b'0' + digit) as char,
        0xa..=0xd => (b'A' + digit - 0xa) as char,
        0xe => '*',
        0xf => '#',
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codecs_have_both_entries() {
        for c in [
            VOMP_CODEC_NONE,
            VOMP_CODEC_CODEC2_2400,
            VOMP_CODEC_CODEC2_1400,
            VOMP_CODEC_GSMHALF,
            VOMP_CODEC_GSMFULL,
            VOMP_CODEC_16SIGNED,
            VOMP_CODEC_8ULAW,
            VOMP_CODEC_8ALAW,
            VOMP_CODEC_PCM,
            VOMP_CODEC_DTMF,
            VOMP_CODEC_ENGAGED,
            VOMP_CODEC_ONHOLD,
            VOMP_CODEC_CALLERID,
        ] {
            assert!(sample_size(c).is_some(), "codec {c:#x}");
            assert!(timespan_ms(c).is_some(), "codec {c:#x}");
        }
        assert!(sample_size(0x55).is_none());
        assert!(timespan_ms(0x55).is_none());
    }

    #[test]
    fn dtmf_round_trip() {
        for c in "0123456789ABCD*#".chars() {
            let d = dtmf_digit_from_char(c).unwrap();
            assert_eq!(dtmf_char_from_digit(d), c);
        }
        assert!(dtmf_digit_from_char('x').is_none());
    }
}
