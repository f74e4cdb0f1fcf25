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

use driftmesh::core::store::{BundleStore, SledBundleStore};
use driftmesh::core::types::{BundleId, FileHash, Manifest};
use driftmesh::core::verify::{sign_manifest, Ed25519Verifier, ManifestVerifier};
use ring::signature::{Ed25519KeyPair, KeyPair};

fn manifest(id: [u8; 32], version: u64) -> Manifest {
    Manifest {
        id: BundleId::from_bytes(id),
        version,
        filesize: 5,
        filehash: FileHash::from_bytes([0x77; 32]),
        ttl: 16,
        signature: Vec::new(),
    }
}

#[test]
fn sled_store_round_trips_an_imported_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledBundleStore::open(dir.path()).unwrap();

    let payload_src = dir.path().join("payload");
    std::fs::write(&payload_src, b"hello").unwrap();

    let m = manifest([0x21; 32], 9);
    assert_eq!(store.manifest_version(&m.id).unwrap(), None);
    assert!(!store.file_valid(&m.filehash).unwrap());

    store.import_bundle(&m, Some(&payload_src), 15).unwrap();

    assert_eq!(store.manifest_version(&m.id).unwrap(), Some(9));
    assert!(store.file_valid(&m.filehash).unwrap());
    let blob = store.payload_path(&m.filehash).unwrap().unwrap();
    assert_eq!(std::fs::read(blob).unwrap(), b"hello");
}

#[test]
fn reimport_with_newer_version_updates_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledBundleStore::open(dir.path()).unwrap();

    let m = manifest([0x22; 32], 3);
    store.import_bundle(&m, None, 10).unwrap();
    let newer = manifest([0x22; 32], 4);
    store.import_bundle(&newer, None, 10).unwrap();
    assert_eq!(store.manifest_version(&newer.id).unwrap(), Some(4));
}

#[test]
fn ed25519_verifier_accepts_genuine_and_rejects_tampered() {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    let mut id = [0u8; 32];
    id.copy_from_slice(kp.public_key().as_ref());

    let mut m = manifest(id, 1);
    sign_manifest(&mut m, pkcs8.as_ref()).unwrap();
    Ed25519Verifier.verify(&m).unwrap();

    // Any field change invalidates the signature.
    let mut tampered = m.clone();
    tampered.version = 2;
    assert!(Ed25519Verifier.verify(&tampered).is_err());

    // A keypair that does not match the id is refused outright.
    let other = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let mut wrong = manifest([0x01; 32], 1);
    assert!(sign_manifest(&mut wrong, other.as_ref()).is_err());
}
