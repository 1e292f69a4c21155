// crates/mig-auth/tests/signature_schemes.rs
// ============================================================================
// Module: Signature Scheme Tests
// Description: Integration tests for scheme providers and key files.
// Purpose: Validate signing, verification, sealed keys, and passphrase rules.
// ============================================================================
//! ## Overview
//! Exercises Ed25519 and RSA providers through the [`SignatureScheme`]
//! contract, including multi-key verification and sealed key unlocking.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use mig_auth::Ed25519Scheme;
use mig_auth::KeyFile;
use mig_auth::PassphraseCache;
use mig_auth::RsaScheme;
use mig_auth::SchemeError;
use mig_auth::SchemeId;
use mig_auth::ScriptedPassphrase;
use mig_auth::SealParams;
use mig_auth::SignatureScheme;
use mig_auth::fingerprint_of;
use mig_auth::rsa_pkcs1::private_key_der_from_pem;
use mig_auth::standard_schemes;
use mig_auth::try_multiple_key_verification;
use mig_core::Fingerprint;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const FAST_SEAL: SealParams = SealParams {
    m_cost: 8,
    t_cost: 1,
    p_cost: 1,
};

const RSA_FINGERPRINT: &str = "8A6E4816B8F08959730AADEA33F9A62F25B302AC";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// Generates a sealed Ed25519 key file with `passphrase`.
fn sealed_key_file(passphrase: &str) -> KeyFile {
    let generator = Ed25519Scheme::new().with_seal_params(FAST_SEAL);
    let file = generator.generate(Some(passphrase)).unwrap();
    assert!(file.private_key.as_ref().unwrap().is_sealed());
    file
}

// ============================================================================
// SECTION: Sign and Verify
// ============================================================================

#[test]
fn ed25519_signatures_verify_and_verification_is_repeatable() {
    let scheme = Ed25519Scheme::new();
    let key = scheme.generate(None).unwrap();
    assert_eq!(scheme.identify(), SchemeId::Ed25519);
    assert!(scheme.has_private_key(&key.fingerprint));

    let signature = scheme.sign(&key.fingerprint, b"message").unwrap();
    let first = scheme.verify(&key.fingerprint, &signature, b"message");
    let second = scheme.verify(&key.fingerprint, &signature, b"message");
    assert!(first.is_ok());
    assert_eq!(first, second);

    let tampered_first = scheme.verify(&key.fingerprint, &signature, b"massage");
    let tampered_second = scheme.verify(&key.fingerprint, &signature, b"massage");
    assert!(matches!(tampered_first, Err(SchemeError::InvalidSignature(_))));
    assert_eq!(tampered_first, tampered_second);
}

#[test]
fn signing_with_unknown_key_fails_with_key_not_found() {
    let scheme = Ed25519Scheme::new();
    let missing = Fingerprint::parse("DEADBEEF").unwrap();
    assert!(matches!(scheme.sign(&missing, b"m"), Err(SchemeError::KeyNotFound(_))));
    assert!(matches!(scheme.verify(&missing, b"sig", b"m"), Err(SchemeError::KeyNotFound(_))));
}

#[test]
fn public_key_import_allows_verification_only() {
    let signer = Ed25519Scheme::new();
    let key = signer.generate(None).unwrap();
    let verifier = Ed25519Scheme::new();
    let imported = verifier.import_public_key(&key.public_key_bytes().unwrap()).unwrap();
    assert_eq!(imported, key.fingerprint);
    assert!(!verifier.has_private_key(&imported));

    let signature = signer.sign(&key.fingerprint, b"payload").unwrap();
    verifier.verify(&imported, &signature, b"payload").unwrap();
    assert!(matches!(verifier.sign(&imported, b"payload"), Err(SchemeError::KeyNotFound(_))));
}

#[test]
fn malformed_public_keys_are_rejected() {
    let scheme = Ed25519Scheme::new();
    assert!(matches!(scheme.import_public_key(&[1, 2, 3]), Err(SchemeError::InvalidKey(_))));
    let rsa = RsaScheme::new();
    assert!(matches!(rsa.import_public_key(b"not der"), Err(SchemeError::InvalidKey(_))));
}

#[test]
fn key_file_for_other_scheme_is_rejected() {
    let ed = Ed25519Scheme::new();
    let key = ed.generate(None).unwrap();
    let rsa = RsaScheme::new();
    assert!(matches!(rsa.import_key_file(&key), Err(SchemeError::UnsupportedScheme(_))));
}

#[test]
fn key_file_with_wrong_fingerprint_is_rejected() {
    let scheme = Ed25519Scheme::new();
    let mut key = scheme.generate(None).unwrap();
    key.fingerprint = Fingerprint::parse("0000").unwrap();
    let other = Ed25519Scheme::new();
    assert!(matches!(other.import_key_file(&key), Err(SchemeError::InvalidKey(_))));
}

// ============================================================================
// SECTION: Multi-Key Verification
// ============================================================================

#[test]
fn multi_key_verification_returns_the_signing_fingerprint() {
    let scheme = Ed25519Scheme::new();
    let first = scheme.generate(None).unwrap().fingerprint;
    let second = scheme.generate(None).unwrap().fingerprint;
    let third = scheme.generate(None).unwrap().fingerprint;
    let signature = scheme.sign(&second, b"msg").unwrap();

    let candidates = vec![first, second.clone(), third];
    let matched = try_multiple_key_verification(&scheme, &candidates, &signature, b"msg").unwrap();
    assert_eq!(matched, second);
    scheme.verify(&matched, &signature, b"msg").unwrap();
}

#[test]
fn multi_key_verification_reports_the_last_error() {
    let scheme = Ed25519Scheme::new();
    let known = scheme.generate(None).unwrap().fingerprint;
    let unknown = Fingerprint::parse("FFFF").unwrap();
    let other = scheme.generate(None).unwrap().fingerprint;
    let signature = scheme.sign(&other, b"msg").unwrap();

    let last_unknown = try_multiple_key_verification(
        &scheme,
        &[known.clone(), unknown.clone()],
        &signature,
        b"msg",
    );
    assert!(matches!(last_unknown, Err(SchemeError::KeyNotFound(_))));

    let last_known = try_multiple_key_verification(&scheme, &[unknown, known], &signature, b"msg");
    assert!(matches!(last_known, Err(SchemeError::InvalidSignature(_))));

    let empty = try_multiple_key_verification(&scheme, &[], &signature, b"msg");
    assert!(matches!(empty, Err(SchemeError::KeyNotFound(_))));
}

// ============================================================================
// SECTION: Sealed Keys
// ============================================================================

#[test]
fn sealed_key_gives_up_after_three_wrong_passphrases() {
    let file = sealed_key_file("right");
    let source = Arc::new(ScriptedPassphrase::new(["one", "two", "three", "right"]));
    let scheme = Ed25519Scheme::new().with_passphrase_source(Arc::clone(&source) as _);
    scheme.import_key_file(&file).unwrap();

    let result = scheme.sign(&file.fingerprint, b"msg");
    assert!(matches!(result, Err(SchemeError::KeyLocked(_))));
    assert_eq!(source.requests(), 3);
}

#[test]
fn sealed_key_without_passphrase_source_is_locked() {
    let file = sealed_key_file("right");
    let scheme = Ed25519Scheme::new();
    scheme.import_key_file(&file).unwrap();
    assert!(matches!(scheme.sign(&file.fingerprint, b"msg"), Err(SchemeError::KeyLocked(_))));
}

#[test]
fn cached_passphrase_prevents_a_second_prompt() {
    let file = sealed_key_file("right");
    let source = Arc::new(ScriptedPassphrase::new(["wrong", "right"]));
    let cache = Arc::new(PassphraseCache::new());
    let scheme = Ed25519Scheme::new()
        .with_passphrase_source(Arc::clone(&source) as _)
        .with_cache(Arc::clone(&cache));
    scheme.import_key_file(&file).unwrap();

    let first = scheme.sign(&file.fingerprint, b"one").unwrap();
    assert_eq!(source.requests(), 2);
    assert_eq!(cache.len(), 1);
    let second = scheme.sign(&file.fingerprint, b"two").unwrap();
    assert_eq!(source.requests(), 2);
    scheme.verify(&file.fingerprint, &first, b"one").unwrap();
    scheme.verify(&file.fingerprint, &second, b"two").unwrap();

    cache.clear();
    assert!(matches!(scheme.sign(&file.fingerprint, b"three"), Err(SchemeError::KeyLocked(_))));
}

#[test]
fn concurrent_signers_share_one_prompt() {
    let file = sealed_key_file("right");
    let source = Arc::new(ScriptedPassphrase::new(["right"]));
    let scheme = Arc::new(Ed25519Scheme::new().with_passphrase_source(Arc::clone(&source) as _));
    scheme.import_key_file(&file).unwrap();

    let handles: Vec<_> = (0 .. 4)
        .map(|index| {
            let scheme = Arc::clone(&scheme);
            let fingerprint = file.fingerprint.clone();
            thread::spawn(move || scheme.sign(&fingerprint, format!("msg {index}").as_bytes()))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(source.requests(), 1);
}

#[test]
fn sealed_key_files_round_trip_through_disk() {
    let file = sealed_key_file("right");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.json");
    file.save(&path).unwrap();
    let loaded = KeyFile::load(&path).unwrap();
    assert_eq!(loaded, file);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"sealed\""));
    assert!(text.contains("argon2id"));
}

// ============================================================================
// SECTION: RSA
// ============================================================================

#[test]
fn rsa_fixture_signs_and_verifies() {
    let file = KeyFile::load(&fixture("rsa_investigator.json")).unwrap();
    assert_eq!(file.scheme, SchemeId::Rsa);
    let scheme = RsaScheme::new();
    let fingerprint = scheme.import_key_file(&file).unwrap();
    assert_eq!(fingerprint.as_str(), RSA_FINGERPRINT);
    assert_eq!(fingerprint, fingerprint_of(&file.public_key_bytes().unwrap()).unwrap());

    let signature = scheme.sign(&fingerprint, b"action payload").unwrap();
    assert_eq!(signature.len(), 256);
    scheme.verify(&fingerprint, &signature, b"action payload").unwrap();
    assert!(matches!(
        scheme.verify(&fingerprint, &signature, b"other payload"),
        Err(SchemeError::InvalidSignature(_))
    ));
}

#[test]
fn rsa_pem_matches_fixture_key_file() {
    let pem = std::fs::read_to_string(fixture("rsa_investigator.pem")).unwrap();
    let der = private_key_der_from_pem(&pem).unwrap();
    let file = KeyFile::load(&fixture("rsa_investigator.json")).unwrap();
    let Some(mig_auth::PrivateKeyMaterial::Plain { key }) = &file.private_key else {
        panic!("fixture holds a plain private key");
    };
    let encoded =
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, der.as_slice());
    assert_eq!(&encoded, key);
}

#[test]
fn registry_dispatches_by_scheme() {
    let registry = standard_schemes(
        Arc::new(PassphraseCache::new()),
        Arc::new(ScriptedPassphrase::new(Vec::<String>::new())),
        FAST_SEAL,
    );
    assert_eq!(registry.schemes(), vec![SchemeId::Ed25519, SchemeId::Rsa]);
    let rsa = registry.get(SchemeId::Rsa).unwrap();
    assert_eq!(rsa.identify(), SchemeId::Rsa);
    let file = KeyFile::load(&fixture("rsa_investigator.json")).unwrap();
    rsa.import_key_file(&file).unwrap();
    assert!(rsa.has_private_key(&file.fingerprint));
}
