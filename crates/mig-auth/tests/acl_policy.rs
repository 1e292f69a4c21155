// crates/mig-auth/tests/acl_policy.rs
// ============================================================================
// Module: ACL Policy Tests
// Description: Integration tests for signer-threshold permissions.
// Purpose: Validate threshold evaluation and per-operation permission lookup.
// ============================================================================
//! ## Overview
//! Covers the documented threshold scenarios, the universal threshold
//! property, and ACL selection across multi-operation actions.

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

use std::collections::BTreeSet;

use mig_auth::Acl;
use mig_auth::AclError;
use mig_auth::Permission;
use mig_auth::verify_permission;
use mig_core::Action;
use mig_core::Fingerprint;
use mig_core::Operation;
use mig_targeting::TargetExpr;
use proptest::prelude::*;
use serde_json::json;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn fp(value: &str) -> Fingerprint {
    Fingerprint::parse(value).unwrap()
}

fn fps(values: &[&str]) -> Vec<Fingerprint> {
    values.iter().map(|value| fp(value)).collect()
}

fn permission(name: &str, required: u32, authoritative_required: u32) -> Permission {
    Permission {
        name: name.to_string(),
        required_signatures: required,
        required_authoritative_signers: authoritative_required,
        authoritative_signers: fps(&["AAAA"]),
        non_authoritative_signers: fps(&["BBBB"]),
    }
}

fn action_with_modules(modules: &[&str]) -> Action {
    Action::new(
        "multi",
        &TargetExpr::online_agents(),
        modules.iter().map(|module| Operation::new(*module, json!({}))).collect(),
        datetime!(2026-01-01 00:00:00 UTC),
        datetime!(2026-01-01 01:00:00 UTC),
    )
}

// ============================================================================
// SECTION: Threshold Scenarios
// ============================================================================

#[test]
fn authoritative_and_non_authoritative_signers_satisfy_permission() {
    let permission = permission("default", 2, 1);
    verify_permission(&permission, &fps(&["AAAA", "BBBB"])).unwrap();
}

#[test]
fn missing_authoritative_signer_is_reported_with_counts() {
    let permission = permission("default", 2, 1);
    let err = verify_permission(&permission, &fps(&["BBBB"])).unwrap_err();
    assert_eq!(
        err,
        AclError::InsufficientAuthoritativeSignatures {
            permission: "default".to_string(),
            required: 1,
            got: 0,
        }
    );
}

#[test]
fn authoritative_alone_fails_total_threshold() {
    let permission = permission("default", 2, 1);
    let err = verify_permission(&permission, &fps(&["AAAA"])).unwrap_err();
    assert_eq!(
        err,
        AclError::InsufficientSignatures {
            permission: "default".to_string(),
            required: 2,
            got: 1,
        }
    );
}

#[test]
fn fingerprints_compare_case_insensitively() {
    let permission = permission("default", 2, 1);
    verify_permission(&permission, &fps(&["aaaa", "bbbb"])).unwrap();
}

#[test]
fn unknown_and_duplicate_signers_do_not_count() {
    let permission = permission("default", 2, 0);
    let err = verify_permission(&permission, &fps(&["AAAA", "AAAA", "CCCC"])).unwrap_err();
    assert!(matches!(err, AclError::InsufficientSignatures { got: 1, .. }));
}

#[test]
fn zero_threshold_permission_is_rejected_before_counting() {
    let permission = permission("broken", 0, 0);
    assert!(matches!(
        verify_permission(&permission, &fps(&["AAAA", "BBBB"])),
        Err(AclError::InvalidPermission { .. })
    ));
    assert!(matches!(Acl::new([permission]), Err(AclError::InvalidPermission { .. })));
}

// ============================================================================
// SECTION: ACL Lookup
// ============================================================================

#[test]
fn every_operation_must_pass_its_permission() {
    let acl = Acl::new([permission("default", 1, 0), permission("file", 2, 1)]).unwrap();
    let action = action_with_modules(&["ping", "file"]);

    let applied = acl.verify_action(&action, &fps(&["AAAA", "BBBB"])).unwrap();
    assert_eq!(applied, vec!["default".to_string(), "file".to_string()]);

    let err = acl.verify_action(&action, &fps(&["BBBB"])).unwrap_err();
    assert!(matches!(
        err,
        AclError::InsufficientAuthoritativeSignatures { ref permission, .. } if permission == "file"
    ));
}

#[test]
fn missing_default_permission_is_an_error() {
    let acl = Acl::new([permission("file", 1, 0)]).unwrap();
    let action = action_with_modules(&["ping"]);
    assert_eq!(
        acl.verify_action(&action, &fps(&["AAAA"])),
        Err(AclError::NoPermission("ping".to_string()))
    );
}

#[test]
fn duplicate_permission_names_are_rejected() {
    let result = Acl::new([permission("default", 1, 0), permission("default", 2, 0)]);
    assert_eq!(result, Err(AclError::DuplicatePermission("default".to_string())));
}

#[test]
fn permissions_deserialize_from_documents() {
    let permission: Permission = serde_json::from_value(json!({
        "name": "default",
        "required_signatures": 2,
        "required_authoritative_signers": 1,
        "authoritative_signers": ["aaaa"],
        "non_authoritative_signers": ["BBBB"]
    }))
    .unwrap();
    assert_eq!(permission.authoritative_signers, fps(&["AAAA"]));
    permission.validate().unwrap();
}

// ============================================================================
// SECTION: Threshold Property
// ============================================================================

const POOL: [&str; 6] = ["A1", "A2", "A3", "N1", "N2", "X1"];

proptest! {
    #[test]
    fn threshold_decision_matches_counting(
        required in 0u32..5,
        authoritative_required in 0u32..4,
        signer_mask in proptest::collection::vec(any::<bool>(), POOL.len()),
        repeat in any::<bool>(),
    ) {
        let permission = Permission {
            name: "p".to_string(),
            required_signatures: required,
            required_authoritative_signers: authoritative_required,
            authoritative_signers: fps(&["A1", "A2", "A3"]),
            non_authoritative_signers: fps(&["N1", "N2"]),
        };
        let mut signers: Vec<Fingerprint> = POOL
            .iter()
            .zip(&signer_mask)
            .filter(|(_, chosen)| **chosen)
            .map(|(name, _)| fp(name))
            .collect();
        if repeat {
            signers.extend(signers.clone());
        }
        let unique: BTreeSet<&Fingerprint> = signers.iter().collect();
        let authoritative =
            unique.iter().filter(|f| permission.authoritative_signers.contains(**f)).count();
        let total = authoritative
            + unique.iter().filter(|f| permission.non_authoritative_signers.contains(**f)).count();
        let expected = required >= 1
            && total >= required as usize
            && authoritative >= authoritative_required as usize;
        prop_assert_eq!(verify_permission(&permission, &signers).is_ok(), expected);
    }
}
