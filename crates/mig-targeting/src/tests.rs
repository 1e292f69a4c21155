// crates/mig-targeting/src/tests.rs
// ============================================================================
// Module: Targeting Unit Tests
// Description: Unit tests for clause rendering and LIKE evaluation.
// Purpose: Pin SQL rendering and wildcard semantics at the module boundary.
// Dependencies: mig-targeting
// ============================================================================

//! ## Overview
//! Unit tests for the private rendering helpers behind [`crate::TargetExpr`].

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

use crate::expr::Clause;
use crate::expr::EnvironmentKey;
use crate::expr::TargetExpr;
use crate::expr::TargetField;
use crate::expr::like_matches;

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn text_literals_double_embedded_quotes() {
    let clause = Clause::text_equals(TargetField::Name, "o'brien");
    assert_eq!(clause.to_string(), "name = 'o''brien'");
}

#[test]
fn tag_names_are_quoted_like_values() {
    let clause = Clause::text_equals(TargetField::Tag("it's".to_string()), "x");
    assert_eq!(clause.to_string(), "tags->>'it''s' = 'x'");
}

#[test]
fn environment_fields_render_json_paths() {
    let clause = Clause::text_equals(TargetField::Environment(EnvironmentKey::PublicIp), "1.2.3.4");
    assert_eq!(clause.to_string(), "environment->>'publicip' = '1.2.3.4'");
}

#[test]
fn integer_clauses_render_unquoted() {
    let clause = Clause::integer_equals(TargetField::Pid, 4242);
    assert_eq!(clause.to_string(), "pid = 4242");
}

#[test]
fn single_member_conjunction_is_unwrapped() {
    let only = TargetExpr::online_agents();
    assert_eq!(TargetExpr::all_of(vec![only.clone()]), only);
}

#[test]
fn conjunction_joins_children_in_order() {
    let expr = TargetExpr::all_of(vec![
        TargetExpr::Clause(Clause::text_like(TargetField::Name, "web%")),
        TargetExpr::online_agents(),
    ]);
    assert_eq!(expr.to_sql(), "name LIKE 'web%' AND status = 'online'");
    assert_eq!(expr.clause_count(), 2);
}

// ============================================================================
// SECTION: LIKE Semantics
// ============================================================================

#[test]
fn like_percent_matches_any_run() {
    assert!(like_matches("web%", "web01"));
    assert!(like_matches("web%", "web"));
    assert!(like_matches("%01", "web01"));
    assert!(like_matches("%b%", "web01"));
    assert!(!like_matches("web%", "db01"));
}

#[test]
fn like_underscore_matches_one_character() {
    assert!(like_matches("web_1", "web01"));
    assert!(!like_matches("web_1", "web1"));
    assert!(!like_matches("web_", "web"));
}

#[test]
fn like_backtracks_across_repeated_segments() {
    assert!(like_matches("%ab%ab", "xabyabab"));
    assert!(!like_matches("%ab%ab", "xabyab_"));
}

#[test]
fn like_without_wildcards_is_exact_and_case_sensitive() {
    assert!(like_matches("Linux", "Linux"));
    assert!(!like_matches("Linux", "linux"));
    assert!(like_matches("", ""));
    assert!(!like_matches("", "a"));
}
