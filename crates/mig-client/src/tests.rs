// crates/mig-client/src/tests.rs
// ============================================================================
// Module: Client Unit Tests
// Description: Unit tests for collection decoding, search paging, and errors.
// Purpose: Pin small decoding and classification rules close to the code.
// Dependencies: mig-client
// ============================================================================

//! ## Overview
//! Unit coverage for behaviors that need no server or runtime.

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

use std::time::Duration;

use mig_core::ActionId;
use serde_json::json;

use crate::CatalogError;
use crate::ClientError;
use crate::CommandSearch;
use crate::FollowCancel;
use crate::RecordStatus;
use crate::collection::Resource;

#[test]
fn first_record_decodes_the_named_value() {
    let resource: Resource = serde_json::from_value(json!({
        "collection": {
            "version": "1.0",
            "href": "https://mig.example.net/api/v1/action?actionid=7",
            "items": [{
                "href": "https://mig.example.net/api/v1/action?actionid=7",
                "data": [{ "name": "action", "value": { "id": 7 } }]
            }]
        }
    }))
    .unwrap();
    let value: serde_json::Value = resource.first_record("action").unwrap();
    assert_eq!(value["id"], 7);
}

#[test]
fn first_record_rejects_unexpected_record_types() {
    let resource = Resource::single("/command", "command", json!({ "id": 1 }));
    let err = resource.first_record::<serde_json::Value>("action").unwrap_err();
    assert!(matches!(err, ClientError::Protocol(message) if message.contains("command record")));
}

#[test]
fn first_record_rejects_empty_collections() {
    let err = Resource::default().first_record::<serde_json::Value>("action").unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn records_collects_every_matching_entry() {
    let resource: Resource = serde_json::from_value(json!({
        "collection": {
            "version": "1.0",
            "href": "/search",
            "items": [
                { "href": "/c/1", "data": [{ "name": "command", "value": 1 }] },
                { "href": "/a/9", "data": [{ "name": "agent", "value": 9 }] },
                { "href": "/c/2", "data": [{ "name": "command", "value": 2 }] }
            ]
        }
    }))
    .unwrap();
    let values: Vec<u64> = resource.records("command").unwrap();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn no_results_signal_is_read_from_the_error_payload() {
    let resource: Resource = serde_json::from_value(json!({
        "collection": {
            "version": "1.0",
            "href": "/search",
            "error": { "code": "6020", "message": "no results found" }
        }
    }))
    .unwrap();
    assert!(resource.is_no_results());
    assert_eq!(resource.error_code(), "6020");
    assert!(!Resource::default().is_no_results());
}

#[test]
fn next_page_advances_by_the_page_size() {
    let search = CommandSearch::for_action(ActionId::new(42), 37);
    let second = search.next_page();
    let third = second.next_page();
    assert_eq!(search.offset, 0);
    assert_eq!(second.offset, 37);
    assert_eq!(third.offset, 74);
    assert_eq!(third.action_id, ActionId::new(42));
    assert_eq!(third.limit, 37);
}

#[test]
fn transport_failures_are_retryable_and_local_failures_are_not() {
    assert!(ClientError::Transport("reset".to_string()).is_retryable());
    assert!(
        ClientError::Http {
            status: 500,
            code: String::new(),
            message: "boom".to_string(),
        }
        .is_retryable()
    );
    assert!(!ClientError::Internal("bug".to_string()).is_retryable());
    assert!(!ClientError::Catalog(CatalogError::Poisoned).is_retryable());
    assert!(ClientError::NoResults.is_no_results());
}

#[test]
fn record_status_labels_match_client_vocabulary() {
    assert_eq!(RecordStatus::PendingDispatch.to_string(), "pending-dispatch");
    assert_eq!(RecordStatus::Dispatched.to_string(), "dispatched");
    assert_eq!(RecordStatus::CancelledByClient.to_string(), "cancelled-by-client");
}

#[tokio::test(start_paused = true)]
async fn pause_returns_early_when_cancelled() {
    let (sender, mut cancel) = FollowCancel::channel();
    let waiter = tokio::spawn(async move { cancel.pause(Duration::from_secs(60)).await });
    tokio::task::yield_now().await;
    sender.send(true).unwrap();
    assert!(waiter.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn pause_sleeps_fully_when_the_sender_is_gone() {
    let mut cancel = FollowCancel::never();
    let started = tokio::time::Instant::now();
    assert!(!cancel.pause(Duration::from_secs(2)).await);
    assert!(started.elapsed() >= Duration::from_secs(2));
}
