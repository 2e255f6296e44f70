//! Ephemeral reconstruct-sign-wipe orchestration.
//!
//! Each signing request walks a fixed state machine:
//!
//! ```text
//! Idle → Unlocking → Reconstructed → Signed → Wiped
//!                \____________________________→ Failed
//! ```
//!
//! `Unlocking` resolves the credential into the AEAD key (KDF pool for
//! passwords, direct use for PRF outputs) and decrypts the stored Share A.
//! `Reconstructed` combines it with Share B and verifies the derived public
//! key against the record. `Signed` signs with the seed-derived key.
//! `Wiped` is unconditional: seed, Share A plaintext, and the signing key
//! zeroize on drop on every exit path once reconstruction has begun.
//!
//! # Concurrency
//!
//! Signing for one wallet is a critical section: a per-wallet async mutex
//! serializes steps 2–5 so a concurrent request can never observe another
//! request's reconstructed secrets or race its wipe. Distinct wallets
//! proceed independently.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::custody::kdf::{unlock_key_for_credential, UnlockCredential, UNLOCK_KEY_LEN};
use crate::custody::kdf_worker::KdfWorkerPool;
use crate::custody::decrypt_share_a;
use crate::custody::shamir::{self, Share, ShareIndex};
use crate::store::WalletStore;
use crate::types::{KeygateError, Result};

/// Serializes the reconstruct-sign-wipe window per wallet and produces
/// signatures on demand.
pub struct SigningOrchestrator<S: WalletStore> {
    store: Arc<S>,
    kdf_pool: Arc<KdfWorkerPool>,
    /// Per-wallet critical-section locks.
    wallet_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: WalletStore> SigningOrchestrator<S> {
    /// Create an orchestrator over a record store and KDF pool.
    pub fn new(store: Arc<S>, kdf_pool: Arc<KdfWorkerPool>) -> Self {
        Self {
            store,
            kdf_pool,
            wallet_locks: DashMap::new(),
        }
    }

    /// Sign `payload` for the given wallet.
    ///
    /// Runs the full unlock → reconstruct → sign → wipe sequence under the
    /// wallet's exclusive lock. Terminal failures (`Auth`, `Integrity`) are
    /// never retried here; silent retry would defeat upstream rate limiting.
    ///
    /// An unknown wallet fails exactly like a wrong credential. Anything
    /// else would let a caller probe user ids for enrolled wallets.
    pub async fn sign(
        &self,
        user_id: &str,
        payload: &[u8],
        credential: &UnlockCredential,
    ) -> Result<[u8; 64]> {
        let lock = self
            .wallet_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let record = match self.store.get_wallet(user_id).await? {
            Some(record) => record,
            None => {
                warn!(user_id, "Unlock failed for signing request");
                return Err(KeygateError::Auth);
            }
        };

        // --- Unlocking ---
        let unlock_key = self.resolve_unlock_key(credential, &record).await?;
        let share_a = match decrypt_share_a(&record.encrypted_share_a, &unlock_key) {
            Ok(share) => share,
            Err(e) => {
                // Wrong password and corrupted ciphertext look identical.
                warn!(user_id, "Unlock failed for signing request");
                return Err(e);
            }
        };

        // --- Reconstructed ---
        // From here on, every exit path wipes: share_a, share_b view, and
        // the seed all zeroize when they drop.
        let share_b = Share::from_bytes(ShareIndex::B, record.share_b.clone())?;
        let seed = shamir::reconstruct(&share_a, &share_b)?;
        drop(share_a);
        drop(share_b);

        if seed.solana_pubkey() != record.solana_pubkey {
            warn!(user_id, "Reconstructed seed failed public key verification");
            return Err(KeygateError::Integrity(
                "Reconstructed seed does not match the stored public key".into(),
            ));
        }

        // --- Signed ---
        let signature = seed.sign(payload);

        // --- Wiped ---
        drop(seed);
        debug!(user_id, "Signature produced, secrets wiped");

        Ok(signature)
    }

    /// Resolve the credential into the AEAD key, dispatching password
    /// stretching to the KDF worker pool.
    async fn resolve_unlock_key(
        &self,
        credential: &UnlockCredential,
        record: &crate::store::WalletRecord,
    ) -> Result<Zeroizing<[u8; UNLOCK_KEY_LEN]>> {
        let params = &record.encrypted_share_a.kdf_params;
        match credential {
            UnlockCredential::Password(password) => {
                self.kdf_pool
                    .derive(
                        Zeroizing::new(password.as_bytes().to_vec()),
                        params.clone(),
                    )
                    .await
            }
            UnlockCredential::PrfOutput(_) => unlock_key_for_credential(credential, params),
        }
    }

    /// Drop lock entries for wallets with no waiters. Called from the
    /// periodic maintenance task.
    pub fn prune_idle_locks(&self) -> usize {
        let mut removed = 0;
        self.wallet_locks.retain(|_, lock| {
            // Strong count 1 means only the map holds it and nobody is in
            // or waiting on the critical section.
            if Arc::strong_count(lock) == 1 && lock.try_lock().is_ok() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of wallets with a live lock entry.
    pub fn lock_count(&self) -> usize {
        self.wallet_locks.len()
    }
}
