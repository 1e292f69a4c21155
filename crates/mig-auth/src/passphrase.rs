// crates/mig-auth/src/passphrase.rs
// ============================================================================
// Module: Passphrases
// Description: Passphrase sources and the per-provider passphrase cache.
// Purpose: Unlock sealed keys with bounded attempts and no duplicate prompts.
// Dependencies: mig-core, zeroize
// ============================================================================

//! ## Overview
//! Sealed private keys are unlocked with a passphrase obtained from a
//! [`PassphraseSource`]: an environment variable, a fixed value, an
//! interactive prompt supplied by the binary, or a scripted sequence in tests.
//! A successful passphrase is remembered in a [`PassphraseCache`] owned by the
//! scheme provider for the rest of the process; it is never written to disk.
//!
//! Invariants:
//! - At most [`MAX_UNLOCK_ATTEMPTS`] passphrases are tried per unlock.
//! - Prompting is serialized through [`PassphraseCache::prompt_guard`] so two
//!   concurrent signers do not both prompt for the same key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;

use mig_core::Fingerprint;
use zeroize::Zeroizing;

use crate::scheme::SchemeError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Passphrase attempts allowed per unlock.
pub const MAX_UNLOCK_ATTEMPTS: u32 = 3;

// ============================================================================
// SECTION: Sources
// ============================================================================

/// Supplies passphrases for sealed keys.
pub trait PassphraseSource: Send + Sync {
    /// Returns a passphrase for `fingerprint`, or `None` when the source has
    /// nothing to offer. `attempt` starts at 1.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyLocked`] when the source itself fails.
    fn passphrase(
        &self,
        fingerprint: &Fingerprint,
        attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError>;
}

/// Source that never supplies a passphrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPassphrase;

impl PassphraseSource for NoPassphrase {
    fn passphrase(
        &self,
        _fingerprint: &Fingerprint,
        _attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError> {
        Ok(None)
    }
}

/// Source reading an environment variable on the first attempt only.
#[derive(Debug, Clone)]
pub struct EnvPassphrase {
    /// Variable name.
    var: String,
}

impl EnvPassphrase {
    /// Creates a source reading `var`.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
        }
    }
}

impl PassphraseSource for EnvPassphrase {
    fn passphrase(
        &self,
        _fingerprint: &Fingerprint,
        attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError> {
        if attempt > 1 {
            return Ok(None);
        }
        Ok(env::var(&self.var).ok().map(Zeroizing::new))
    }
}

/// Source returning one fixed passphrase.
#[derive(Clone)]
pub struct StaticPassphrase(Zeroizing<String>);

impl StaticPassphrase {
    /// Wraps a passphrase.
    #[must_use]
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }
}

impl fmt::Debug for StaticPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticPassphrase(<redacted>)")
    }
}

impl PassphraseSource for StaticPassphrase {
    fn passphrase(
        &self,
        _fingerprint: &Fingerprint,
        _attempt: u32,
    ) -> Result<Option<Zeroizing<String>>, SchemeError> {
        Ok(Some(self.0.clone()))
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Process-lifetime cache of passphrases that unlocked a key.
#[derive(Default)]
pub struct PassphraseCache {
    /// Passphrases by key fingerprint.
    entries: RwLock<BTreeMap<Fingerprint, Zeroizing<String>>>,
    /// Serializes prompting across concurrent unlocks.
    prompt: Mutex<()>,
}

impl PassphraseCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached passphrase for `fingerprint`.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Zeroizing<String>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(fingerprint).cloned()
    }

    /// Remembers a passphrase that unlocked `fingerprint`.
    pub fn store(&self, fingerprint: &Fingerprint, passphrase: Zeroizing<String>) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(fingerprint.clone(), passphrase);
    }

    /// Drops a cached passphrase that no longer unlocks its key.
    pub fn forget(&self, fingerprint: &Fingerprint) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(fingerprint);
    }

    /// Drops every cached passphrase.
    pub fn clear(&self) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }

    /// Returns the number of cached passphrases.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquires the prompt lock; hold it while asking a source.
    pub fn prompt_guard(&self) -> MutexGuard<'_, ()> {
        match self.prompt.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for PassphraseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseCache").field("entries", &self.len()).finish()
    }
}

// ============================================================================
// SECTION: Test Support
// ============================================================================

#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedPassphrase;

/// Scripted passphrase source, compiled only for tests and `test-util` builds.
#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use mig_core::Fingerprint;
    use zeroize::Zeroizing;

    use super::PassphraseSource;
    use crate::scheme::SchemeError;

    /// Source replaying a fixed sequence of answers and counting requests.
    #[derive(Default)]
    pub struct ScriptedPassphrase {
        /// Remaining answers.
        answers: Mutex<VecDeque<String>>,
        /// Number of requests served.
        requests: AtomicUsize,
    }

    impl ScriptedPassphrase {
        /// Creates a source that answers with `answers` in order.
        #[must_use]
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
                requests: AtomicUsize::new(0),
            }
        }

        /// Returns how many passphrases were requested.
        #[must_use]
        pub fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl PassphraseSource for ScriptedPassphrase {
        fn passphrase(
            &self,
            _fingerprint: &Fingerprint,
            _attempt: u32,
        ) -> Result<Option<Zeroizing<String>>, SchemeError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut answers = self
                .answers
                .lock()
                .map_err(|_| SchemeError::KeyLocked("passphrase script poisoned".to_string()))?;
            Ok(answers.pop_front().map(Zeroizing::new))
        }
    }
}
