//! Wallet seed and key derivation.
//!
//! The seed is 32 bytes of OS entropy and the root of the wallet identity:
//! it deterministically yields one Ed25519 keypair whose verifying key,
//! base58-encoded, is the Solana-style public key. The seed exists only
//! transiently in memory and is never persisted whole anywhere.
//!
//! # Security
//!
//! - Seed bytes are zeroized when the value is dropped, on every exit path.
//! - `Debug` output never contains seed material.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Seed length in bytes.
pub const SEED_LEN: usize = 32;

/// The root secret of a wallet. Zeroized on drop.
pub struct Seed(Zeroizing<[u8; SEED_LEN]>);

impl Seed {
    /// Generate a fresh seed from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; SEED_LEN]);
        OsRng.fill_bytes(bytes.as_mut());
        Self(bytes)
    }

    /// Wrap existing seed bytes. The caller's copy should be wiped after.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Raw seed bytes. Handle with the same discipline as the seed itself.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    /// Derive the Solana-style public key (base58 of the Ed25519 verifying
    /// key) for this seed.
    pub fn solana_pubkey(&self) -> String {
        let signing_key = SigningKey::from_bytes(&self.0);
        bs58::encode(signing_key.verifying_key().to_bytes()).into_string()
    }

    /// Sign a payload with the key derived from this seed.
    ///
    /// The intermediate signing key is zeroized by ed25519-dalek when it
    /// drops at the end of this call.
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.0);
        signing_key.sign(payload).to_bytes()
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Seed").field(&"[REDACTED]").finish()
    }
}
