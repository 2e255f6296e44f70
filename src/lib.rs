//! Keygate - split-trust custody for Solana wallet signing keys
//!
//! The 32-byte signing seed is split 2-of-3 with Shamir secret sharing:
//! Share A lives on the server encrypted under the user's credential,
//! Share B lives on the server in plaintext, and Share C (or the seed
//! itself) goes to the user as recovery material. Neither the server alone
//! nor a stolen credential alone can sign; signing reconstructs the seed
//! for one request and wipes it.
//!
//! ## Services
//!
//! - **Custody**: Shamir share codec, Argon2id KDF, AEAD share encryption
//! - **Signing**: per-wallet exclusive reconstruct-sign-wipe orchestration
//! - **Recovery**: staged recovery payloads and the Share C exchange
//! - **Rotation**: atomic re-wrapping of Share A under a new credential

pub mod config;
pub mod custody;
pub mod recovery;
pub mod rotation;
pub mod routes;
pub mod server;
pub mod signing;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{KeygateError, Result};
