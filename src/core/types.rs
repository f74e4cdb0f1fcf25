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

//! Identities, bundle manifests and canonical encoding helpers.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum DID length in bytes (excluding terminator on the wire).
pub const DID_MAXLEN: usize = 63;

/// Type parsing / encoding errors.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("bad hex")]
    BadHex,
    #[error("bad length")]
    BadLength,
    #[error("bad did")]
    BadDid,
}

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic, fixed-width integers).
fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules.
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

fn parse_hex_32(s: &str) -> Result<[u8; 32], TypesError> {
    let bytes = hex::decode(s.trim()).map_err(|_| TypesError::BadHex)?;
    if bytes.len() != 32 {
        return Err(TypesError::BadLength);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// 256-bit mesh subscriber identifier (an Ed25519 signing public key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sid([u8; 32]);

impl Sid {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Parse from 64 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        Ok(Self(parse_hex_32(s)?))
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Bundle identifier: the manifest's signing public key (rendered upper-hex).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId([u8; 32]);

impl BundleId {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Parse from 64 hex digits (either case).
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        Ok(Self(parse_hex_32(s)?))
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// Content hash of a bundle payload (rendered upper-hex).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileHash([u8; 32]);

impl FileHash {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Parse from 64 hex digits (either case).
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        Ok(Self(parse_hex_32(s)?))
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// Validate a dialable identifier (phone-number-like string, <= 63 bytes, no NUL).
pub fn validate_did(did: &str) -> Result<(), TypesError> {
    if did.len() > DID_MAXLEN || did.bytes().any(|b| b == 0 || b == b'\n') {
        return Err(TypesError::BadDid);
    }
    Ok(())
}

/// Signed descriptor of a content bundle.
///
/// The id doubles as the signing public key; `signature` covers
/// [`Manifest::signing_bytes`]. Once admitted to a queue the core only reads
/// fields and eventually drops the value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Bundle id (signing public key).
    pub id: BundleId,
    /// Monotonically increasing bundle version.
    pub version: u64,
    /// Payload size in bytes; zero means manifest-only bundle.
    pub filesize: i64,
    /// Payload content hash.
    pub filehash: FileHash,
    /// Remaining hop budget, decremented on import after a fetch.
    pub ttl: u8,
    /// Ed25519 signature over the canonical text (64 bytes when present).
    pub signature: Vec<u8>,
}

impl Manifest {
    /// Canonical key=value text form (the signed portion).
    pub fn canonical_text(&self) -> String {
        format!(
            "id={}\nversion={}\nfilesize={}\nfilehash={}\n",
            self.id, self.version, self.filesize, self.filehash
        )
    }

    /// Domain-separated bytes covered by the manifest signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let text = self.canonical_text();
        let mut out = Vec::with_capacity(24 + text.len());
        out.extend_from_slice(b"Driftmesh-Manifest-v1\n");
        out.extend_from_slice(text.as_bytes());
        out
    }

    /// Full text form written to the import directory: canonical text plus
    /// the signature line.
    pub fn signed_text(&self) -> String {
        format!(
            "{}signature={}\n",
            self.canonical_text(),
            hex::encode(&self.signature)
        )
    }
}

/// Node configuration root (TOML).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// Rhizome settings.
    #[serde(default)]
    pub rhizome: RhizomeSettings,
    /// VoMP settings.
    #[serde(default)]
    pub vomp: VompSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            rhizome: RhizomeSettings::default(),
            vomp: VompSettings::default(),
        }
    }
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (db + import staging + blobs).
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "driftmesh".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

/// Rhizome settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RhizomeSettings {
    /// TCP port for the bundle file protocol (fetch target and local server).
    pub http_port: u16,
    /// Serve local bundle payloads to peers.
    pub serve_files: bool,
}

impl Default for RhizomeSettings {
    fn default() -> Self {
        Self {
            http_port: crate::rhizome::RHIZOME_HTTP_PORT,
            serve_files: true,
        }
    }
}

/// VoMP settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VompSettings {
    /// Codec ids offered to peers during call setup.
    #[serde(default)]
    pub codecs: Vec<u8>,
}

impl Default for VompSettings {
    fn default() -> Self {
        Self {
            codecs: vec![
                crate::vomp::codecs::VOMP_CODEC_16SIGNED,
                crate::vomp::codecs::VOMP_CODEC_8ULAW,
                crate::vomp::codecs::VOMP_CODEC_8ALAW,
                crate::vomp::codecs::VOMP_CODEC_DTMF,
            ],
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CodecError> {
        let raw = std::fs::read_to_string(path).map_err(|_| CodecError::Deserialize)?;
        toml::from_str(&raw).map_err(|_| CodecError::Deserialize)
    }
}
