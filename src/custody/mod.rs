//! Split-Trust Key Custody Primitives
//!
//! The seed that controls a wallet is never stored whole. At enrollment it
//! is split 2-of-3:
//! - Share A is encrypted under the user's unlock credential (Argon2id +
//!   ChaCha20-Poly1305) and kept server-side
//! - Share B is kept server-side in plaintext
//! - Share C (or the seed itself, mode permitting) goes to the user as a
//!   recovery payload
//!
//! Neither half the server holds is useful alone: Share B reveals nothing,
//! and Share A only decrypts with the user's credential. Signing
//! reconstructs the seed just-in-time and wipes it before returning.
//!
//! # Secret lifetime
//!
//! Seeds, loose shares, and derived keys follow generate → use → wipe.
//! Every secret-bearing type here zeroizes on drop, on all exit paths.

pub mod encryption;
pub mod enrollment;
pub mod kdf;
pub mod kdf_worker;
pub mod seed;
pub mod shamir;

pub use encryption::{decrypt_share_a, encrypt_share_a, EncryptedShareA, NONCE_LEN};
pub use enrollment::{
    complete_share_c_recovery, enroll, enroll_with_seed, seed_from_recovery_payload,
    share_c_fingerprint, EnrollmentMaterial,
};
pub use kdf::{derive_unlock_key, unlock_key_for_credential, KdfParams, UnlockCredential, KDF_VERSION, SALT_LEN};
pub use kdf_worker::{KdfPoolConfig, KdfWorkerPool};
pub use seed::{Seed, SEED_LEN};
pub use shamir::{reconstruct, split, Share, ShareIndex};
