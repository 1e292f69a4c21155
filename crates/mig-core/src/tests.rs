// crates/mig-core/src/tests.rs
// ============================================================================
// Module: Core Unit Tests
// Description: Unit tests for identifiers, operations, and module validation.
// Purpose: Pin normalization and encoding details close to the code.
// Dependencies: mig-core
// ============================================================================

//! ## Overview
//! Unit coverage for small, self-contained behaviors of the core model.

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

use serde_json::json;
use time::macros::datetime;

use crate::identifiers::Fingerprint;
use crate::identifiers::FingerprintError;
use crate::identifiers::ID_EPOCH_UNIX;
use crate::identifiers::IdGenerator;
use crate::modules::Module;
use crate::modules::Ping;
use crate::modules::PingProtocol;
use crate::modules::RawModule;
use crate::operation::Operation;
use crate::operation::OperationError;

// ============================================================================
// SECTION: Fingerprints
// ============================================================================

#[test]
fn fingerprints_normalize_to_uppercase() {
    let fp = Fingerprint::parse(" a1b2c3 ").expect("fingerprint");
    assert_eq!(fp.as_str(), "A1B2C3");
    assert!(fp.matches("a1B2c3"));
    assert_eq!(fp, Fingerprint::parse("A1B2C3").expect("fingerprint"));
}

#[test]
fn fingerprints_reject_malformed_input() {
    assert_eq!(Fingerprint::parse("  "), Err(FingerprintError::Empty));
    assert_eq!(Fingerprint::parse("AB:CD"), Err(FingerprintError::InvalidCharacter(':')));
    assert_eq!(Fingerprint::parse(&"A".repeat(129)), Err(FingerprintError::TooLong));
}

#[test]
fn fingerprints_deserialize_through_validation() {
    let fp: Fingerprint = serde_json::from_value(json!("abcd")).expect("fingerprint");
    assert_eq!(fp.as_str(), "ABCD");
    assert!(serde_json::from_value::<Fingerprint>(json!("")).is_err());
}

// ============================================================================
// SECTION: Id Generation
// ============================================================================

#[test]
fn id_generator_seeds_from_epoch_and_increments() {
    let generator = IdGenerator::new();
    let now = datetime!(2024-01-01 00:00:00 UTC);
    let first = generator.next_id(now);
    let expected = u64::try_from(now.unix_timestamp() - ID_EPOCH_UNIX + 1).unwrap() << 16;
    assert_eq!(first, expected);
    assert_eq!(generator.next_id(now), first + 1);
    assert_eq!(generator.next_id(now), first + 2);
}

// ============================================================================
// SECTION: Operations
// ============================================================================

#[test]
fn compression_restores_parameters() {
    let params = json!({"searches": {"s1": {"paths": ["/etc"], "names": ["passwd"]}}});
    let mut op = Operation::new("file", params.clone()).with_compression();
    op.compress().expect("compress");
    assert!(op.is_compressed);
    assert!(op.parameters.is_string());
    op.compress().expect("second compress is a no-op");
    op.decompress().expect("decompress");
    assert!(!op.is_compressed);
    assert_eq!(op.parameters, params);
}

#[test]
fn decompression_rejects_non_string_payloads() {
    let mut op = Operation::new("file", json!({"a": 1}));
    op.is_compressed = true;
    assert_eq!(op.decompress(), Err(OperationError::NotAString));
}

#[test]
fn decompression_rejects_bad_base64() {
    let mut op = Operation::new("file", json!("not base64!"));
    op.is_compressed = true;
    assert!(matches!(op.decompress(), Err(OperationError::Encoding(_))));
}

#[test]
fn operation_flags_are_omitted_when_false() {
    let op = Operation::new("ping", json!({}));
    let value = serde_json::to_value(&op).expect("json");
    assert_eq!(value, json!({"module": "ping", "parameters": {}}));
}

// ============================================================================
// SECTION: Modules
// ============================================================================

#[test]
fn ping_fills_defaults() {
    let params = Ping::new("10.0.0.1").to_parameters().expect("params");
    assert_eq!(
        params,
        json!({
            "destination": "10.0.0.1",
            "destinationport": 80,
            "protocol": "tcp",
            "count": 3,
            "timeout": 5.0
        })
    );
}

#[test]
fn ping_icmp_rejects_ports() {
    let mut ping = Ping::new("example.org");
    ping.protocol = PingProtocol::Icmp;
    ping.destination_port = Some(22);
    assert!(ping.to_parameters().is_err());
    ping.destination_port = None;
    let params = ping.to_parameters().expect("params");
    assert!(params.get("destinationport").is_none());
}

#[test]
fn ping_rejects_garbage_destinations() {
    assert!(Ping::new("").to_parameters().is_err());
    assert!(Ping::new("bad host!").to_parameters().is_err());
    assert!(Ping::new("-leading.example").to_parameters().is_err());
    assert!(Ping::new("2001:db8::1").to_parameters().is_ok());
}

#[test]
fn raw_module_requires_object_parameters() {
    let op = RawModule::new("file", json!({"searches": {}})).to_operation().expect("op");
    assert_eq!(op.module, "file");
    assert!(RawModule::new("file", json!([1, 2])).to_operation().is_err());
    assert!(RawModule::new(" ", json!({})).to_operation().is_err());
}
