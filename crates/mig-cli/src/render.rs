// crates/mig-cli/src/render.rs
// ============================================================================
// Module: Output Rendering
// Description: Text rendering for follow progress and command results.
// Purpose: Produce stable, line-oriented output for the `mig` binary.
// Dependencies: mig-client, mig-core
// ============================================================================

//! ## Overview
//! Rendering is pure: every function returns a `String` and the binary
//! decides which stream it goes to. Progress goes to stderr and results to
//! stdout so result output can be piped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use mig_client::FollowEvent;
use mig_client::FollowOutcome;
use mig_core::Command;
use serde::Serialize;

// ============================================================================
// SECTION: Follow
// ============================================================================

/// Renders one follow event.
#[must_use]
pub fn render_event(event: &FollowEvent) -> String {
    match event {
        FollowEvent::StatusChanged(status) => format!("status changed to {status}"),
        FollowEvent::Progress {
            percent,
            counters,
        } => format!("{percent:.1}% done ({counters})"),
    }
}

/// Renders the final state of a followed action.
#[must_use]
pub fn render_outcome(outcome: &FollowOutcome) -> String {
    let id = outcome.action.id.map_or_else(|| "unassigned".to_string(), |id| id.to_string());
    let status = outcome.action.status.map_or("unknown", |status| status.as_str());
    format!(
        "action {id} ({name}) stopped: {end}; status {status}; {counters}",
        name = outcome.action.name,
        end = outcome.end,
        counters = outcome.action.counters,
    )
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Aggregate view of an action's commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    /// Number of commands.
    pub total: usize,
    /// Commands with at least one module result that found something.
    pub found: usize,
    /// Commands per status label.
    pub by_status: BTreeMap<&'static str, usize>,
}

/// Returns true when any module result of `command` found something.
#[must_use]
pub fn found_anything(command: &Command) -> bool {
    command.results.iter().any(|result| result.found_anything)
}

/// Counts commands by status and by whether they found anything.
#[must_use]
pub fn summarize(commands: &[Command]) -> ResultSummary {
    let mut summary = ResultSummary {
        total: commands.len(),
        ..ResultSummary::default()
    };
    for command in commands {
        if found_anything(command) {
            summary.found += 1;
        }
        *summary.by_status.entry(command.status.as_str()).or_insert(0) += 1;
    }
    summary
}

/// Renders one line per command followed by a summary line.
#[must_use]
pub fn render_results(commands: &[Command]) -> String {
    let mut output = String::new();
    for command in commands {
        let found = if found_anything(command) { "found" } else { "-" };
        let _ = writeln!(
            output,
            "{id}\t{agent}\t{status}\t{found}",
            id = command.id,
            agent = command.agent.name,
            status = command.status,
        );
        for error in command.results.iter().flat_map(|result| &result.errors) {
            let _ = writeln!(output, "\t! {error}");
        }
    }
    let summary = summarize(commands);
    let statuses: Vec<String> =
        summary.by_status.iter().map(|(status, count)| format!("{count} {status}")).collect();
    let _ = write!(output, "{} commands, {} found something", summary.total, summary.found);
    if !statuses.is_empty() {
        let _ = write!(output, " ({})", statuses.join(", "));
    }
    output
}
