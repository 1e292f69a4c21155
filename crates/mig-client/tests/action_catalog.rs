// crates/mig-client/tests/action_catalog.rs
// ============================================================================
// Module: Action Catalog Tests
// Description: Integration tests for local action assembly and bookkeeping.
// Purpose: Validate identifier uniqueness, targeting, and record transitions.
// ============================================================================
//! ## Overview
//! Exercises the catalog through its public API with deterministic entropy
//! and a manual clock.

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

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration as StdDuration;
use std::time::Instant;

use mig_client::ActionCatalog;
use mig_client::CatalogError;
use mig_client::EntropySource;
use mig_client::RecordStatus;
use mig_core::ActionId;
use mig_core::AgentId;
use mig_core::AgentRecord;
use mig_core::LocalActionId;
use mig_core::ManualClock;
use mig_core::RawModule;
use mig_targeting::ByHostDetails;
use mig_targeting::ByTag;
use mig_targeting::Query;
use mig_targeting::QueryError;
use proptest::prelude::*;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

/// Entropy source replaying scripted draws, then counting upward.
struct ScriptedEntropy {
    draws: Mutex<VecDeque<Result<[u8; 3], String>>>,
    counter: Mutex<u32>,
}

impl ScriptedEntropy {
    fn new(draws: Vec<Result<[u8; 3], String>>) -> Self {
        Self {
            draws: Mutex::new(draws.into()),
            counter: Mutex::new(0),
        }
    }
}

impl EntropySource for ScriptedEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        if let Some(draw) = self.draws.lock().unwrap().pop_front() {
            buf.copy_from_slice(&draw?);
            return Ok(());
        }
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        buf.copy_from_slice(&counter.to_be_bytes()[1 ..]);
        Ok(())
    }
}

/// Entropy source that always yields the same bytes.
struct StuckEntropy;

impl EntropySource for StuckEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        buf.fill(0x7f);
        Ok(())
    }
}

fn catalog() -> ActionCatalog {
    ActionCatalog::new(Arc::new(ManualClock::new(NOW)))
}

fn scripted_catalog(draws: Vec<Result<[u8; 3], String>>) -> ActionCatalog {
    ActionCatalog::with_entropy(
        Arc::new(ManualClock::new(NOW)),
        Arc::new(ScriptedEntropy::new(draws)),
    )
    .with_backoff(StdDuration::ZERO)
}

fn file_module() -> RawModule {
    RawModule::new(
        "file",
        json!({ "searches": { "s1": { "paths": ["/etc"], "names": ["^passwd$"] } } }),
    )
}

fn operator_it() -> Vec<Query> {
    vec![ByTag::new("operator", "IT").into()]
}

// ============================================================================
// SECTION: Creation
// ============================================================================

#[test]
fn created_action_targets_exactly_the_tagged_agents() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    let record = catalog.lookup(&id).unwrap();

    assert_eq!(record.action.target, "tags->>'operator' = 'IT'");
    let it = AgentRecord::online(AgentId::new(1), "it-laptop", "linux.it-laptop")
        .with_tag("operator", "IT");
    let ops = AgentRecord::online(AgentId::new(2), "ops-laptop", "linux.ops-laptop")
        .with_tag("operator", "OPS");
    let untagged = AgentRecord::online(AgentId::new(3), "build", "linux.build");
    assert!(record.target.matches(&it));
    assert!(!record.target.matches(&ops));
    assert!(!record.target.matches(&untagged));
}

#[test]
fn created_action_is_an_unsigned_single_operation_shell() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    let record = catalog.lookup(&id).unwrap();

    assert_eq!(record.status, RecordStatus::PendingDispatch);
    assert_eq!(record.authority_id, None);
    assert_eq!(record.action.name, id.as_str());
    assert_eq!(record.action.valid_from, NOW);
    assert_eq!(record.action.expire_after, NOW + Duration::hours(1));
    assert_eq!(record.action.operations.len(), 1);
    assert_eq!(record.action.operations[0].module, "file");
    assert!(record.action.signatures.is_empty());
    assert!(record.action.id.is_none());
}

#[test]
fn multiple_queries_are_joined_with_and() {
    let catalog = catalog();
    let queries = vec![
        ByTag::new("operator", "IT").into(),
        Query::ByHostDetails(ByHostDetails {
            os: Some("linux".to_string()),
            ..ByHostDetails::default()
        }),
    ];
    let id = catalog.create(&file_module(), &queries, Duration::minutes(30)).unwrap();
    let record = catalog.lookup(&id).unwrap();
    assert_eq!(record.action.target, "tags->>'operator' = 'IT' AND environment->>'os' = 'linux'");
}

#[test]
fn local_ids_are_six_lowercase_hex_characters() {
    let catalog = catalog();
    for _ in 0 .. 16 {
        let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
        assert_eq!(id.as_str().len(), 6);
        assert!(id.as_str().chars().all(|ch| ch.is_ascii_digit() || ('a' ..= 'f').contains(&ch)));
    }
    assert_eq!(catalog.len(), 16);
}

#[test]
fn empty_detail_queries_fail_with_empty_query() {
    let catalog = catalog();
    let queries = vec![Query::ByHostDetails(ByHostDetails::default())];
    let err = catalog.create(&file_module(), &queries, Duration::hours(1)).unwrap_err();
    assert!(matches!(err, CatalogError::Query(QueryError::EmptyQuery(_))));
    assert!(catalog.is_empty());
}

#[test]
fn missing_target_and_bad_expiry_are_rejected() {
    let catalog = catalog();
    assert_eq!(
        catalog.create(&file_module(), &[], Duration::hours(1)).unwrap_err(),
        CatalogError::MissingTarget
    );
    assert_eq!(
        catalog.create(&file_module(), &operator_it(), Duration::ZERO).unwrap_err(),
        CatalogError::InvalidExpiry
    );
    assert_eq!(
        catalog.create(&file_module(), &operator_it(), Duration::seconds(-5)).unwrap_err(),
        CatalogError::InvalidExpiry
    );
}

#[test]
fn invalid_module_parameters_are_rejected() {
    let catalog = catalog();
    let module = RawModule::new("", json!({}));
    let err = catalog.create(&module, &operator_it(), Duration::hours(1)).unwrap_err();
    assert!(matches!(err, CatalogError::Module(_)));
}

// ============================================================================
// SECTION: Identifier Generation
// ============================================================================

#[test]
fn colliding_draws_are_skipped() {
    let catalog = scripted_catalog(vec![
        Ok([0xab, 0xcd, 0xef]),
        Ok([0xab, 0xcd, 0xef]),
        Ok([0x01, 0x02, 0x03]),
    ]);
    let first = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    let second = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    assert_eq!(first.as_str(), "abcdef");
    assert_eq!(second.as_str(), "010203");
}

#[test]
fn entropy_failures_back_off_and_retry() {
    let catalog = scripted_catalog(vec![
        Err("entropy pool exhausted".to_string()),
        Err("entropy pool exhausted".to_string()),
        Ok([0x00, 0x00, 0x2a]),
    ]);
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    assert_eq!(id.as_str(), "00002a");
}

#[test]
fn entropy_backoff_blocks_the_caller() {
    let catalog = ActionCatalog::with_entropy(
        Arc::new(ManualClock::new(NOW)),
        Arc::new(ScriptedEntropy::new(vec![
            Err("entropy pool exhausted".to_string()),
            Ok([0, 0, 1]),
        ])),
    )
    .with_backoff(StdDuration::from_millis(20));
    let started = Instant::now();
    catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    assert!(started.elapsed() >= StdDuration::from_millis(20));
}

#[test]
fn creation_gives_up_when_every_draw_collides() {
    let catalog =
        ActionCatalog::with_entropy(Arc::new(ManualClock::new(NOW)), Arc::new(StuckEntropy));
    catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    let err = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap_err();
    assert!(matches!(err, CatalogError::IdExhausted { .. }));
    assert_eq!(catalog.len(), 1);
}

#[test]
fn concurrent_creators_never_share_an_id() {
    let catalog = Arc::new(catalog());
    let ids: Vec<LocalActionId> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0 .. 8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                scope.spawn(move || {
                    (0 .. 25)
                        .map(|_| {
                            catalog
                                .create(&file_module(), &operator_it(), Duration::hours(1))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect()
    });
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(catalog.len(), 200);
}

proptest! {
    #[test]
    fn ids_are_unique_for_any_draw_sequence(draws in prop::collection::vec(0u8 .. 4, 1 .. 40)) {
        let script = draws.iter().map(|byte| Ok([0, 0, *byte])).collect();
        let catalog = scripted_catalog(script);
        let mut seen = HashSet::new();
        for _ in 0 .. draws.len() {
            let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
            prop_assert!(seen.insert(id));
        }
    }
}

// ============================================================================
// SECTION: Record Transitions
// ============================================================================

#[test]
fn signatures_are_appended_in_order() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    catalog.add_signature(&id, "c2lnLTE=").unwrap();
    catalog.add_signature(&id, "c2lnLTI=").unwrap();
    let record = catalog.lookup(&id).unwrap();
    assert_eq!(record.action.signatures, vec!["c2lnLTE=".to_string(), "c2lnLTI=".to_string()]);
}

#[test]
fn signature_over_a_stale_payload_is_refused() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    let payload = catalog.prepare_for_signing(&id).unwrap().signing_payload().unwrap();
    catalog.request_compression(&id).unwrap();

    let err = catalog.add_signature_over(&id, &payload, "c2lnLTE=").unwrap_err();
    assert_eq!(err, CatalogError::SignedContentChanged(id.clone()));
    assert!(catalog.lookup(&id).unwrap().action.signatures.is_empty());

    let payload = catalog.prepare_for_signing(&id).unwrap().signing_payload().unwrap();
    catalog.add_signature_over(&id, &payload, "c2lnLTI=").unwrap();
    assert_eq!(catalog.lookup(&id).unwrap().action.signatures, vec!["c2lnLTI=".to_string()]);
}

#[test]
fn unknown_ids_are_not_found() {
    let catalog = catalog();
    let missing = LocalActionId::new("ffffff");
    assert!(catalog.lookup(&missing).is_none());
    assert_eq!(
        catalog.add_signature(&missing, "sig").unwrap_err(),
        CatalogError::NotFound(missing.clone())
    );
    assert_eq!(
        catalog.mark_dispatched(&missing, ActionId::new(1)).unwrap_err(),
        CatalogError::NotFound(missing.clone())
    );
    assert_eq!(catalog.mark_cancelled(&missing).unwrap_err(), CatalogError::NotFound(missing));
}

#[test]
fn dispatch_is_recorded_once() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    catalog.mark_dispatched(&id, ActionId::new(9_001)).unwrap();

    let record = catalog.lookup(&id).unwrap();
    assert_eq!(record.status, RecordStatus::Dispatched);
    assert_eq!(record.authority_id, Some(ActionId::new(9_001)));

    let err = catalog.mark_dispatched(&id, ActionId::new(9_002)).unwrap_err();
    assert!(matches!(err, CatalogError::NotPending { .. }));
    let err = catalog.prepare_for_signing(&id).unwrap_err();
    assert!(matches!(err, CatalogError::NotPending { .. }));
}

#[test]
fn cancellation_is_local_bookkeeping() {
    let catalog = catalog();
    let id = catalog.create(&file_module(), &operator_it(), Duration::hours(1)).unwrap();
    catalog.mark_dispatched(&id, ActionId::new(5)).unwrap();
    catalog.mark_cancelled(&id).unwrap();
    let record = catalog.lookup(&id).unwrap();
    assert_eq!(record.status, RecordStatus::CancelledByClient);
    assert_eq!(record.authority_id, Some(ActionId::new(5)));
}
