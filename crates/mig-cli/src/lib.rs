// crates/mig-cli/src/lib.rs
// ============================================================================
// Module: MIG CLI Library
// Description: Input parsing, passphrase prompting, and output rendering.
// Purpose: Keep the `mig` binary thin and its helpers testable.
// Dependencies: mig-client, mig-core, mig-targeting, dialoguer
// ============================================================================

//! ## Overview
//! Helpers shared by the `mig` binary:
//! - [`inputs`] reads size-bounded JSON inputs and turns them into target
//!   queries and modules.
//! - [`prompt`] supplies key passphrases from the terminal, optionally after
//!   an environment variable.
//! - [`render`] formats follow events and command results as text.
//!
//! Security posture: every file read is size-bounded and passphrases are
//! zeroized after use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod inputs;
pub mod prompt;
pub mod render;
