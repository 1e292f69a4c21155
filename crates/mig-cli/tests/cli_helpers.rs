// crates/mig-cli/tests/cli_helpers.rs
// ============================================================================
// Module: CLI Helper Tests
// Description: Integration tests for input parsing, prompts, and rendering.
// Purpose: Validate the helpers the `mig` binary is built from.
// Dependencies: mig-cli, mig-auth, tempfile
// ============================================================================

//! ## Overview
//! Covers bounded input reads, target and module parsing, passphrase source
//! chaining, and result rendering.
//!
//! Security posture: input files are untrusted; size limits must fail closed.

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

use std::fs;
use std::sync::Arc;

use mig_auth::EnvPassphrase;
use mig_auth::NoPassphrase;
use mig_auth::PassphraseSource;
use mig_auth::ScriptedPassphrase;
use mig_cli::inputs::InputError;
use mig_cli::inputs::MAX_INPUT_BYTES;
use mig_cli::inputs::build_module;
use mig_cli::inputs::parse_targets;
use mig_cli::inputs::read_bytes_with_limit;
use mig_cli::inputs::read_json_file;
use mig_cli::prompt::FallbackPassphrase;
use mig_cli::render::render_event;
use mig_cli::render::render_outcome;
use mig_cli::render::render_results;
use mig_cli::render::summarize;
use mig_client::FollowEnd;
use mig_client::FollowEvent;
use mig_client::FollowOutcome;
use mig_core::Action;
use mig_core::ActionCounters;
use mig_core::ActionId;
use mig_core::ActionStatus;
use mig_core::Command;
use mig_core::CommandAgent;
use mig_core::CommandId;
use mig_core::CommandStatus;
use mig_core::Fingerprint;
use mig_core::ModuleError;
use mig_core::ModuleResult;
use mig_targeting::ByHostDetails;
use mig_targeting::ByTag;
use mig_targeting::Query;
use mig_targeting::QueryError;
use mig_targeting::compile_all;
use proptest::prelude::*;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

fn command(id: u64, agent: &str, status: CommandStatus, found: bool) -> Command {
    let mut command = Command::sent(
        CommandId::new(id),
        ActionId::new(7),
        CommandAgent {
            id: None,
            name: agent.to_string(),
            queue_location: format!("linux.{agent}"),
        },
        NOW,
    );
    command.status = status;
    command.results = vec![ModuleResult {
        found_anything: found,
        success: true,
        ..ModuleResult::default()
    }];
    command
}

fn fingerprint() -> Fingerprint {
    Fingerprint::parse("ABCDEF0123456789").unwrap()
}

// ============================================================================
// SECTION: Bounded Reads
// ============================================================================

#[test]
fn bounded_read_rejects_oversized_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.json");
    fs::write(&path, vec![b' '; 65]).unwrap();
    let err = read_bytes_with_limit(&path, 64).unwrap_err();
    assert!(matches!(err, InputError::TooLarge { size: 65, limit: 64, .. }));
    assert_eq!(read_bytes_with_limit(&path, 65).unwrap().len(), 65);
}

#[test]
fn json_reads_report_parse_errors_with_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target.json");
    fs::write(&path, "{ not json").unwrap();
    let err = read_json_file(&path).unwrap_err();
    assert!(matches!(&err, InputError::Json { .. }));
    assert!(err.to_string().contains("target.json"));
    assert!(MAX_INPUT_BYTES >= 1024);
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_json_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, InputError::Io { .. }));
}

// ============================================================================
// SECTION: Targets and Modules
// ============================================================================

#[test]
fn a_single_object_is_one_query() {
    let queries = parse_targets(&json!({ "tagName": "operator", "tagValue": "IT" })).unwrap();
    assert_eq!(queries, vec![Query::ByTag(ByTag::new("operator", "IT"))]);
}

#[test]
fn an_array_is_joined_with_and() {
    let raw = json!([{ "tagName": "operator", "tagValue": "IT" }, { "os": "linux" }]);
    let queries = parse_targets(&raw).unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(
        queries[1],
        Query::ByHostDetails(ByHostDetails {
            os: Some("linux".to_string()),
            ..ByHostDetails::default()
        })
    );
    assert_eq!(
        compile_all(&queries).unwrap().to_sql(),
        "tags->>'operator' = 'IT' AND environment->>'os' = 'linux'"
    );
}

#[test]
fn empty_and_unknown_targets_are_rejected() {
    assert_eq!(parse_targets(&json!([])).unwrap_err(), QueryError::EmptyQuery("target"));
    assert_eq!(
        parse_targets(&json!({ "color": "blue" })).unwrap_err(),
        QueryError::UnrecognizedQuery
    );
    assert_eq!(
        parse_targets(&json!([{ "all": true }, "oops"])).unwrap_err(),
        QueryError::UnrecognizedQuery
    );
}

#[test]
fn ping_parameters_are_decoded_and_validated() {
    let module =
        build_module("ping", json!({ "destination": "10.0.0.1", "protocol": "icmp" })).unwrap();
    let operation = module.to_operation().unwrap();
    assert_eq!(operation.module, "ping");
    assert_eq!(operation.parameters["destination"], "10.0.0.1");

    let parameters =
        json!({ "destination": "10.0.0.1", "protocol": "icmp", "destinationport": 22 });
    let module = build_module("ping", parameters).unwrap();
    assert!(matches!(module.to_operation(), Err(ModuleError::InvalidParameters { .. })));

    let err = build_module("ping", json!({ "protocol": "tcp" })).err().unwrap();
    assert!(matches!(err, ModuleError::InvalidParameters { module, .. } if module == "ping"));
}

#[test]
fn other_modules_pass_parameters_through() {
    let module = build_module("file", json!({ "searches": {} })).unwrap();
    assert_eq!(module.name(), "file");
    assert_eq!(module.to_operation().unwrap().parameters, json!({ "searches": {} }));
    assert_eq!(build_module("  ", json!({})).err().unwrap(), ModuleError::MissingName);
}

// ============================================================================
// SECTION: Passphrase Chaining
// ============================================================================

#[test]
fn fallback_is_consulted_only_when_primary_declines() {
    let scripted = Arc::new(ScriptedPassphrase::new(["from-fallback"]));
    let source = FallbackPassphrase::new(Arc::new(NoPassphrase), scripted.clone());
    let answer = source.passphrase(&fingerprint(), 1).unwrap().unwrap();
    assert_eq!(answer.as_str(), "from-fallback");
    assert_eq!(scripted.requests(), 1);

    let primary = Arc::new(ScriptedPassphrase::new(["from-primary"]));
    let fallback = Arc::new(ScriptedPassphrase::new(["unused"]));
    let source = FallbackPassphrase::new(primary, fallback.clone());
    assert_eq!(source.passphrase(&fingerprint(), 1).unwrap().unwrap().as_str(), "from-primary");
    assert_eq!(fallback.requests(), 0);
}

#[test]
fn environment_passphrase_falls_through_after_the_first_attempt() {
    let scripted = Arc::new(ScriptedPassphrase::new(["typed"]));
    let source = FallbackPassphrase::new(
        Arc::new(EnvPassphrase::new("MIG_CLI_TEST_PASSPHRASE_THAT_IS_NEVER_SET")),
        scripted.clone(),
    );
    assert_eq!(source.passphrase(&fingerprint(), 2).unwrap().unwrap().as_str(), "typed");
    assert_eq!(scripted.requests(), 1);
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn events_render_as_single_lines() {
    assert_eq!(
        render_event(&FollowEvent::StatusChanged(ActionStatus::Inflight)),
        "status changed to inflight"
    );
    let counters = ActionCounters {
        sent: 4,
        done: 1,
        in_flight: 3,
        success: 1,
        ..ActionCounters::default()
    };
    assert_eq!(
        render_event(&FollowEvent::Progress {
            percent: 25.0,
            counters,
        }),
        "25.0% done (4 sent, 1 done, 3 inflight, 1 succeeded)"
    );
}

#[test]
fn outcome_names_the_action_and_the_reason() {
    let target = ByTag::new("operator", "IT").compile().unwrap();
    let mut action = Action::new("a1b2c3", &target, Vec::new(), NOW, NOW + Duration::minutes(5));
    action.id = Some(ActionId::new(6_128));
    action.status = Some(ActionStatus::Done);
    let line = render_outcome(&FollowOutcome {
        action,
        end: FollowEnd::Completed,
    });
    assert_eq!(line, "action 6128 (a1b2c3) stopped: completed; status done; 0 sent, 0 done");
}

#[test]
fn results_list_commands_and_summarize() {
    let mut failed = command(3, "db-01", CommandStatus::Failed, false);
    failed.results[0].errors.push("permission denied".to_string());
    let commands = vec![
        command(1, "web-01", CommandStatus::Success, true),
        command(2, "web-02", CommandStatus::Success, false),
        failed,
    ];
    let text = render_results(&commands);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "1\tweb-01\tsuccess\tfound");
    assert_eq!(lines[1], "2\tweb-02\tsuccess\t-");
    assert_eq!(lines[2], "3\tdb-01\tfailed\t-");
    assert_eq!(lines[3], "\t! permission denied");
    assert_eq!(lines[4], "3 commands, 1 found something (1 failed, 2 success)");
}

#[test]
fn empty_results_render_a_bare_summary() {
    assert_eq!(render_results(&[]), "0 commands, 0 found something");
}

proptest! {
    #[test]
    fn summary_counts_cover_every_command(
        flags in proptest::collection::vec(any::<bool>(), 0 .. 40),
    ) {
        let commands: Vec<Command> = flags
            .iter()
            .enumerate()
            .map(|(index, found)| {
                let status =
                    if index % 2 == 0 { CommandStatus::Success } else { CommandStatus::Expired };
                command(u64::try_from(index).unwrap(), "agent", status, *found)
            })
            .collect();
        let summary = summarize(&commands);
        prop_assert_eq!(summary.total, commands.len());
        prop_assert_eq!(summary.found, flags.iter().filter(|found| **found).count());
        prop_assert_eq!(summary.by_status.values().sum::<usize>(), commands.len());
    }
}
