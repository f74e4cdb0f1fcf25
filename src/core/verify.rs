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

//! Manifest signature verification.
//!
//! A bundle id is the Ed25519 public key that signed the manifest, so
//! verification needs no key lookup. Verification is deliberately deferred by
//! the callers until a manifest would otherwise be admitted (it is the
//! expensive step).

use crate::core::types::Manifest;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use thiserror::Error;

/// Verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("bad signature")]
    BadSignature,
    #[error("invalid key")]
    InvalidKey,
}

/// Manifest verification seam.
pub trait ManifestVerifier: Send + Sync {
    /// Check the manifest signature against its own id.
    fn verify(&self, manifest: &Manifest) -> Result<(), VerifyError>;
}

/// Ed25519 verifier (the production implementation).
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl ManifestVerifier for Ed25519Verifier {
    fn verify(&self, manifest: &Manifest) -> Result<(), VerifyError> {
        if manifest.signature.len() != 64 {
            return Err(VerifyError::BadSignature);
        }
        let pk = UnparsedPublicKey::new(&ED25519, manifest.id.as_bytes());
        pk.verify(&manifest.signing_bytes(), &manifest.signature)
            .map_err(|_| VerifyError::BadSignature)
    }
}

/// Sign a manifest with the keypair whose public key is the manifest id.
///
/// Used by provisioning tooling and tests; rejects a keypair that does not
/// match the manifest id.
pub fn sign_manifest(manifest: &mut Manifest, pkcs8: &[u8]) -> Result<(), VerifyError> {
    let kp = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|_| VerifyError::InvalidKey)?;
    if kp.public_key().as_ref() != manifest.id.as_bytes() {
        return Err(VerifyError::InvalidKey);
    }
    let sig = kp.sign(&manifest.signing_bytes());
    manifest.signature = sig.as_ref().to_vec();
    Ok(())
}
