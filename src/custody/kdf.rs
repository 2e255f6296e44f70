//! Key derivation for unlock credentials.
//!
//! Derives the 256-bit key that encrypts Share A from a low-entropy secret
//! using Argon2id. Parameters are versioned so they can be raised later
//! without breaking blobs encrypted under the old settings.
//!
//! # Security Parameters (version 1)
//!
//! - 64 MB memory (prevents GPU attacks)
//! - 3 iterations
//! - 4 parallelism threads
//!
//! WebAuthn PRF outputs skip derivation entirely: they are already
//! high-entropy 32-byte values and are used directly as the AEAD key.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::{KeygateError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Current KDF parameter version.
pub const KDF_VERSION: u32 = 1;

/// Argon2id memory cost in KiB (64 MB)
pub const ARGON2_MEMORY_KB: u32 = 65536;

/// Argon2id iteration count
pub const ARGON2_ITERATIONS: u32 = 3;

/// Argon2id parallelism (threads)
pub const ARGON2_PARALLELISM: u32 = 4;

/// Salt length for key derivation (16 bytes)
pub const SALT_LEN: usize = 16;

/// Derived key length (ChaCha20-Poly1305 key)
pub const UNLOCK_KEY_LEN: usize = 32;

// =============================================================================
// Parameters
// =============================================================================

/// Versioned key-derivation parameters, stored alongside the ciphertext so
/// old blobs stay decryptable after the defaults change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Parameter-set version. Unsupported versions are a hard config error.
    pub version: u32,

    /// Argon2id memory cost in KiB.
    pub memory_kib: u32,

    /// Argon2id iteration count.
    pub iterations: u32,

    /// Argon2id lane count.
    pub parallelism: u32,

    /// Per-wallet random salt.
    pub salt: [u8; SALT_LEN],
}

impl KdfParams {
    /// Generate parameters at the current version with a fresh random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self {
            version: KDF_VERSION,
            memory_kib: ARGON2_MEMORY_KB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
            salt,
        }
    }

    /// Rebuild params from stored fields, validating the version.
    pub fn from_stored(version: u32, salt: [u8; SALT_LEN]) -> Result<Self> {
        if version != KDF_VERSION {
            return Err(KeygateError::Config(format!(
                "Unsupported KDF version: {}",
                version
            )));
        }
        Ok(Self {
            version,
            memory_kib: ARGON2_MEMORY_KB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
            salt,
        })
    }
}

// =============================================================================
// Unlock credentials
// =============================================================================

/// Proof of ownership sufficient to produce the Share A decryption key.
pub enum UnlockCredential {
    /// User password; stretched through Argon2id with the stored params.
    Password(Zeroizing<String>),

    /// WebAuthn PRF extension output; used directly as the AEAD key.
    PrfOutput(Zeroizing<Vec<u8>>),
}

impl UnlockCredential {
    /// Convenience constructor for password credentials.
    pub fn password(secret: impl Into<String>) -> Self {
        Self::Password(Zeroizing::new(secret.into()))
    }

    /// Convenience constructor for PRF-output credentials.
    pub fn prf_output(bytes: Vec<u8>) -> Self {
        Self::PrfOutput(Zeroizing::new(bytes))
    }
}

impl std::fmt::Debug for UnlockCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => write!(f, "UnlockCredential::Password([REDACTED])"),
            Self::PrfOutput(_) => write!(f, "UnlockCredential::PrfOutput([REDACTED])"),
        }
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// Derive the 256-bit unlock key from a low-entropy secret.
///
/// Deliberately expensive; never call on a latency-sensitive path. Dispatch
/// through [`crate::custody::kdf_worker::KdfWorkerPool`] instead.
///
/// # Errors
///
/// Unsupported `version` or malformed parameters are a `Config` error,
/// fatal rather than retryable.
pub fn derive_unlock_key(
    secret: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; UNLOCK_KEY_LEN]>> {
    if params.version != KDF_VERSION {
        return Err(KeygateError::Config(format!(
            "Unsupported KDF version: {}",
            params.version
        )));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(UNLOCK_KEY_LEN),
    )
    .map_err(|e| KeygateError::Config(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; UNLOCK_KEY_LEN]);
    argon2
        .hash_password_into(secret, &params.salt, key.as_mut())
        .map_err(|e| KeygateError::Config(format!("Key derivation failed: {e}")))?;

    Ok(key)
}

/// Resolve a credential into the AEAD key for Share A.
///
/// Passwords go through Argon2id with the stored params; PRF outputs are
/// used directly (they must already be exactly 32 bytes).
pub fn unlock_key_for_credential(
    credential: &UnlockCredential,
    params: &KdfParams,
) -> Result<Zeroizing<[u8; UNLOCK_KEY_LEN]>> {
    match credential {
        UnlockCredential::Password(password) => derive_unlock_key(password.as_bytes(), params),
        UnlockCredential::PrfOutput(bytes) => {
            if bytes.len() != UNLOCK_KEY_LEN {
                // Wrong-size PRF output can never unlock anything; report it
                // the same way as any other bad credential.
                return Err(KeygateError::Auth);
            }
            let mut key = Zeroizing::new([0u8; UNLOCK_KEY_LEN]);
            key.copy_from_slice(bytes);
            Ok(key)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
