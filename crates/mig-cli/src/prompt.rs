// crates/mig-cli/src/prompt.rs
// ============================================================================
// Module: Passphrase Prompts
// Description: Terminal and chained passphrase sources for sealed keys.
// Purpose: Unlock signing keys interactively without echoing input.
// Dependencies: mig-auth, dialoguer, zeroize
// ============================================================================

//! ## Overview
//! [`TerminalPassphrase`] asks on the controlling terminal with echo off.
//! [`FallbackPassphrase`] consults a primary source (typically the
//! configured environment variable) and falls back to a second one once the
//! primary has nothing left to offer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use dialoguer::Password;
use mig_auth::PassphraseSource;
use mig_auth::SchemeError;
use mig_core::Fingerprint;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Terminal
// ============================================================================

/// Source prompting on the terminal for every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPassphrase;

impl PassphraseSource for TerminalPassphrase {
    fn passphrase(
        &self,
        fingerprint: &Fingerprint,
        attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError> {
        let prompt = if attempt > 1 {
            format!("Passphrase for key {fingerprint} (attempt {attempt})")
        } else {
            format!("Passphrase for key {fingerprint}")
        };
        let answer = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|err| SchemeError::KeyLocked(format!("passphrase prompt failed: {err}")))?;
        Ok(Some(Zeroizing::new(answer)))
    }
}

// ============================================================================
// SECTION: Chaining
// ============================================================================

/// Source asking `primary` first and `fallback` when it declines.
pub struct FallbackPassphrase {
    /// Preferred source.
    primary: Arc<dyn PassphraseSource>,
    /// Source used once the primary returns `None`.
    fallback: Arc<dyn PassphraseSource>,
}

impl FallbackPassphrase {
    /// Chains two sources.
    #[must_use]
    pub fn new(primary: Arc<dyn PassphraseSource>, fallback: Arc<dyn PassphraseSource>) -> Self {
        Self {
            primary,
            fallback,
        }
    }
}

impl PassphraseSource for FallbackPassphrase {
    fn passphrase(
        &self,
        fingerprint: &Fingerprint,
        attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError> {
        match self.primary.passphrase(fingerprint, attempt)? {
            Some(passphrase) => Ok(Some(passphrase)),
            None => self.fallback.passphrase(fingerprint, attempt),
        }
    }
}
