//! Client-side enrollment and recovery completion.
//!
//! Enrollment happens on the user's device: generate a seed, split it,
//! encrypt Share A under the unlock credential, and hand the server only
//! what it is allowed to keep: the encrypted Share A, plaintext Share B,
//! the public key, and (mode permitting) an encoded recovery payload. The
//! seed and the loose shares are wiped as soon as the material is built.
//!
//! Recovery completion is the client half of the recovery flow: reconstruct the
//! seed from Share C plus the server's Share B (or decode a full-seed
//! payload), verify the derived public key, and optionally re-enroll with
//! a fresh split.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::encryption::{encrypt_share_a, EncryptedShareA};
use super::kdf::{unlock_key_for_credential, KdfParams, UnlockCredential};
use super::seed::{Seed, SEED_LEN};
use super::shamir::{self, Share, ShareIndex};
use crate::store::RecoveryMode;
use crate::types::{KeygateError, Result};

/// Everything the enrollment endpoint needs, produced client-side.
///
/// Contains no seed and no plaintext Share A.
pub struct EnrollmentMaterial {
    /// Share A, encrypted under the unlock credential.
    pub encrypted_share_a: EncryptedShareA,

    /// Plaintext Share B for the server record.
    pub share_b: Vec<u8>,

    /// Base58 public key derived from the seed.
    pub solana_pubkey: String,

    /// Recovery mode fixed for the wallet's lifetime.
    pub recovery_mode: RecoveryMode,

    /// Base64 recovery payload (seed or Share C), absent for mode `none`.
    pub recovery_payload_b64: Option<String>,

    /// SHA-256 of Share C, for share_c_only recovery lookups.
    pub share_c_fingerprint: Option<[u8; 32]>,
}

/// SHA-256 fingerprint binding a Share C to its wallet record.
pub fn share_c_fingerprint(share_c: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(share_c);
    digest.into()
}

/// Enroll a brand-new wallet: fresh seed, fresh split.
pub fn enroll(
    credential: &UnlockCredential,
    recovery_mode: RecoveryMode,
    kdf_params: KdfParams,
) -> Result<EnrollmentMaterial> {
    let seed = Seed::generate();
    enroll_with_seed(&seed, credential, recovery_mode, kdf_params)
}

/// Enroll with an existing seed (re-enrollment after recovery).
///
/// The split is fresh, so all three shares change, but the public key is a
/// function of the seed and stays identical.
pub fn enroll_with_seed(
    seed: &Seed,
    credential: &UnlockCredential,
    recovery_mode: RecoveryMode,
    kdf_params: KdfParams,
) -> Result<EnrollmentMaterial> {
    let (share_a, share_b, share_c) = shamir::split(seed);

    let unlock_key = unlock_key_for_credential(credential, &kdf_params)?;
    let encrypted_share_a = encrypt_share_a(&share_a, &unlock_key, kdf_params)?;

    let (recovery_payload_b64, fingerprint) = match recovery_mode {
        RecoveryMode::None => (None, None),
        RecoveryMode::FullSeed => (Some(BASE64.encode(seed.as_bytes())), None),
        RecoveryMode::ShareCOnly => (
            Some(BASE64.encode(&share_c.data)),
            Some(share_c_fingerprint(&share_c.data)),
        ),
    };

    // share_a and share_c zeroize on drop here; only material the server is
    // allowed to see leaves this function.
    Ok(EnrollmentMaterial {
        encrypted_share_a,
        share_b: share_b.data.clone(),
        solana_pubkey: seed.solana_pubkey(),
        recovery_mode,
        recovery_payload_b64,
        share_c_fingerprint: fingerprint,
    })
}

/// Decode a full-seed recovery payload back into a seed. Fully offline.
pub fn seed_from_recovery_payload(payload_b64: &str) -> Result<Seed> {
    let bytes = BASE64
        .decode(payload_b64)
        .map_err(|e| KeygateError::BadRequest(format!("Invalid recovery payload: {e}")))?;

    let arr: [u8; SEED_LEN] = bytes
        .try_into()
        .map_err(|_| KeygateError::BadRequest("Recovery payload is not a seed".into()))?;

    Ok(Seed::from_bytes(arr))
}

/// Finish a share_c_only recovery: combine the user's Share C with the
/// Share B returned by `/auth/wallet/share-b` and verify the identity.
///
/// # Errors
///
/// `Integrity` if the reconstructed seed does not derive the returned
/// public key. Treated as tamper or corruption, never retried.
pub fn complete_share_c_recovery(
    share_c_bytes: Vec<u8>,
    share_b_bytes: Vec<u8>,
    expected_pubkey: &str,
) -> Result<Seed> {
    let share_c = Share::from_bytes(ShareIndex::C, share_c_bytes)?;
    let share_b = Share::from_bytes(ShareIndex::B, share_b_bytes)?;

    let seed = shamir::reconstruct(&share_c, &share_b)?;

    if seed.solana_pubkey() != expected_pubkey {
        return Err(KeygateError::Integrity(
            "Recovered seed does not match the wallet public key".into(),
        ));
    }

    Ok(seed)
}
