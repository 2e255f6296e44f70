//! Signing subsystem.
//!
//! [`SigningOrchestrator`] owns the only code path that ever holds a
//! reconstructed seed. Everything else in the crate works with shares,
//! ciphertexts, or public keys.

pub mod orchestrator;

pub use orchestrator::SigningOrchestrator;
