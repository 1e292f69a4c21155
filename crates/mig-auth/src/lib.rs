// crates/mig-auth/src/lib.rs
// ============================================================================
// Module: MIG Auth Library
// Description: Signature schemes, investigators, ACLs, tokens, and acceptance.
// Purpose: Everything that decides whether a signed request is trusted.
// Dependencies: argon2, chacha20poly1305, ed25519-dalek, rsa, mig-core
// ============================================================================

//! ## Overview
//! `mig-auth` provides the [`SignatureScheme`] abstraction with Ed25519 and
//! RSA providers, sealed key files, the investigator registry, the
//! signer-threshold [`Acl`], signed request tokens, and the
//! [`ActionAuthority`] that ties them together on the authority side.
//!
//! Security posture: all inputs are untrusted; every rejection is an explicit
//! error and every authority decision is audited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod acl;
pub mod audit;
pub mod authority;
pub mod ed25519;
pub mod keystore;
pub mod passphrase;
pub mod provider;
pub mod registry;
pub mod rsa_pkcs1;
pub mod scheme;
pub mod token;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use acl::Acl;
pub use acl::AclError;
pub use acl::DEFAULT_PERMISSION;
pub use acl::Permission;
pub use acl::verify_permission;
pub use audit::AuditSink;
pub use audit::AuthAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::RecordingAuditSink;
pub use audit::TracingAuditSink;
pub use authority::ActionAuthority;
pub use authority::ActionStore;
pub use authority::AuthorityError;
pub use authority::InMemoryActionStore;
pub use ed25519::Ed25519Scheme;
pub use keystore::KeyFile;
pub use keystore::PrivateKeyMaterial;
pub use keystore::SealParams;
pub use keystore::SealedKey;
pub use passphrase::EnvPassphrase;
pub use passphrase::MAX_UNLOCK_ATTEMPTS;
pub use passphrase::NoPassphrase;
pub use passphrase::PassphraseCache;
pub use passphrase::PassphraseSource;
#[cfg(any(test, feature = "test-util"))]
pub use passphrase::ScriptedPassphrase;
pub use passphrase::StaticPassphrase;
pub use provider::KeyAlgorithm;
pub use provider::SchemeProvider;
pub use provider::standard_schemes;
pub use registry::ActivePublicKey;
pub use registry::InMemoryInvestigatorRegistry;
pub use registry::Investigator;
pub use registry::InvestigatorPermissions;
pub use registry::InvestigatorRegistry;
pub use registry::InvestigatorStatus;
pub use registry::NewInvestigator;
pub use registry::RegistryError;
pub use rsa_pkcs1::RsaScheme;
pub use scheme::SchemeError;
pub use scheme::SchemeId;
pub use scheme::SchemeRegistry;
pub use scheme::SignatureScheme;
pub use scheme::fingerprint_of;
pub use scheme::try_multiple_key_verification;
pub use token::TokenError;
pub use token::VerifiedToken;
pub use token::make_signed_token;
pub use token::verify_signed_token;
