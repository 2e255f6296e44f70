//! Wallet record store.
//!
//! Persistence proper is an external collaborator; this module fixes the
//! interface the custody core needs and provides an in-memory reference
//! implementation backed by `DashMap` for single-node deployments and
//! tests.
//!
//! At rest a wallet record holds Share B in plaintext and Share A only in
//! encrypted form; the two halves are never stored in the clear together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::custody::encryption::EncryptedShareA;
use crate::types::{KeygateError, Result};

// =============================================================================
// Records
// =============================================================================

/// How a wallet can be recovered if this gateway goes away. Fixed at
/// enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// No recovery material is retained.
    None,

    /// The pending payload encodes the seed itself; recovery needs no
    /// server participation.
    FullSeed,

    /// The pending payload encodes only Share C; recovery additionally
    /// needs the server's Share B.
    ShareCOnly,
}

impl std::fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryMode::None => write!(f, "none"),
            RecoveryMode::FullSeed => write!(f, "full_seed"),
            RecoveryMode::ShareCOnly => write!(f, "share_c_only"),
        }
    }
}

/// Persistent server-side record for one wallet.
#[derive(Debug, Clone)]
pub struct WalletRecord {
    /// Owning user id.
    pub user_id: String,

    /// Share A, encrypted under the user's unlock credential.
    pub encrypted_share_a: EncryptedShareA,

    /// Share B, plaintext. Useless alone: one share reveals nothing.
    pub share_b: Vec<u8>,

    /// Base58 public key derived from the seed at enrollment.
    pub solana_pubkey: String,

    /// Recovery mode fixed at enrollment.
    pub recovery_mode: RecoveryMode,

    /// SHA-256 of Share C, recorded for share_c_only recovery lookups.
    pub share_c_fingerprint: Option<[u8; 32]>,

    /// When the wallet was enrolled.
    pub created_at: DateTime<Utc>,
}

/// Transient record holding the user's recovery payload until they
/// acknowledge having saved it.
#[derive(Debug, Clone)]
pub struct PendingRecoveryRecord {
    /// Owning user id.
    pub user_id: String,

    /// Base64 payload: the seed (full_seed) or Share C (share_c_only).
    pub payload_b64: String,

    /// Mode the payload was encoded for.
    pub recovery_mode: RecoveryMode,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record stops being served and becomes garbage.
    pub expires_at: DateTime<Utc>,
}

impl PendingRecoveryRecord {
    /// Check if this record has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// =============================================================================
// Store interface
// =============================================================================

/// Storage interface consumed by the custody core.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create a wallet record. Fails if the user already has one.
    async fn create_wallet(&self, record: WalletRecord) -> Result<()>;

    /// Fetch a wallet record by user id.
    async fn get_wallet(&self, user_id: &str) -> Result<Option<WalletRecord>>;

    /// Look up a wallet by Share C fingerprint.
    async fn get_wallet_by_fingerprint(
        &self,
        fingerprint: &[u8; 32],
    ) -> Result<Option<WalletRecord>>;

    /// Atomically replace the encrypted Share A, if and only if `old`
    /// matches the currently stored blob byte for byte. On mismatch the
    /// stored record is untouched and `Rejected` is returned.
    async fn rotate_encrypted_share_a(
        &self,
        user_id: &str,
        old: &EncryptedShareA,
        new: EncryptedShareA,
    ) -> Result<WalletRecord>;

    /// Store a pending recovery record, replacing any existing one for the
    /// user (at most one per user).
    async fn put_pending_recovery(&self, record: PendingRecoveryRecord) -> Result<()>;

    /// Fetch the pending recovery record for a user, if any.
    async fn get_pending_recovery(&self, user_id: &str) -> Result<Option<PendingRecoveryRecord>>;

    /// Delete the pending recovery record for a user. Idempotent; returns
    /// whether a record was removed.
    async fn remove_pending_recovery(&self, user_id: &str) -> Result<bool>;

    /// Remove all expired pending recovery records, returning the count.
    async fn cleanup_expired_recoveries(&self) -> Result<usize>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// In-memory wallet store. The reference implementation for tests and
/// single-node deployments; production deployments swap in a database-backed
/// implementation of [`WalletStore`].
#[derive(Default)]
pub struct MemoryWalletStore {
    wallets: DashMap<String, WalletRecord>,
    pending: DashMap<String, PendingRecoveryRecord>,
}

impl MemoryWalletStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrolled wallets.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn create_wallet(&self, record: WalletRecord) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.wallets.entry(record.user_id.clone()) {
            Entry::Occupied(_) => Err(KeygateError::BadRequest(format!(
                "Wallet already enrolled for user {}",
                record.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get_wallet(&self, user_id: &str) -> Result<Option<WalletRecord>> {
        Ok(self.wallets.get(user_id).map(|r| r.clone()))
    }

    async fn get_wallet_by_fingerprint(
        &self,
        fingerprint: &[u8; 32],
    ) -> Result<Option<WalletRecord>> {
        Ok(self
            .wallets
            .iter()
            .find(|r| r.share_c_fingerprint.as_ref() == Some(fingerprint))
            .map(|r| r.clone()))
    }

    async fn rotate_encrypted_share_a(
        &self,
        user_id: &str,
        old: &EncryptedShareA,
        new: EncryptedShareA,
    ) -> Result<WalletRecord> {
        // Verification and replacement happen under the same shard lock,
        // so a racing rotation cannot interleave.
        let mut entry = self
            .wallets
            .get_mut(user_id)
            .ok_or(KeygateError::NotFound)?;

        if entry.encrypted_share_a != *old {
            return Err(KeygateError::Rejected(
                "Stored encrypted share does not match the expected value".into(),
            ));
        }

        entry.encrypted_share_a = new;
        Ok(entry.clone())
    }

    async fn put_pending_recovery(&self, record: PendingRecoveryRecord) -> Result<()> {
        self.pending.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn get_pending_recovery(&self, user_id: &str) -> Result<Option<PendingRecoveryRecord>> {
        Ok(self.pending.get(user_id).map(|r| r.clone()))
    }

    async fn remove_pending_recovery(&self, user_id: &str) -> Result<bool> {
        Ok(self.pending.remove(user_id).is_some())
    }

    async fn cleanup_expired_recoveries(&self) -> Result<usize> {
        let mut removed = 0;
        self.pending.retain(|_, record| {
            if record.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::kdf::KdfParams;
    use chrono::Duration;

    /// Deterministic blob so compare-and-set assertions can rebuild it.
    fn dummy_blob(fill: u8) -> EncryptedShareA {
        EncryptedShareA {
            ciphertext: vec![fill; 48],
            nonce: [fill; 12],
            kdf_params: KdfParams::from_stored(1, [fill; 16]).unwrap(),
        }
    }

    fn dummy_record(user_id: &str) -> WalletRecord {
        WalletRecord {
            user_id: user_id.to_string(),
            encrypted_share_a: dummy_blob(1),
            share_b: vec![2; 32],
            solana_pubkey: "11111111111111111111111111111111".to_string(),
            recovery_mode: RecoveryMode::None,
            share_c_fingerprint: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_wallet() {
        let store = MemoryWalletStore::new();
        store.create_wallet(dummy_record("user-1")).await.unwrap();

        let fetched = store.get_wallet("user-1").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "user-1");
        assert!(store.get_wallet("user-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_rejected() {
        let store = MemoryWalletStore::new();
        store.create_wallet(dummy_record("user-1")).await.unwrap();

        let err = store.create_wallet(dummy_record("user-1")).await.unwrap_err();
        assert!(matches!(err, KeygateError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_rotation_replaces_only_on_match() {
        let store = MemoryWalletStore::new();
        store.create_wallet(dummy_record("user-1")).await.unwrap();

        let rotated = store
            .rotate_encrypted_share_a("user-1", &dummy_blob(1), dummy_blob(9))
            .await
            .unwrap();
        assert_eq!(rotated.encrypted_share_a, dummy_blob(9));
    }

    #[tokio::test]
    async fn test_rotation_mismatch_leaves_record_untouched() {
        let store = MemoryWalletStore::new();
        store.create_wallet(dummy_record("user-1")).await.unwrap();

        let err = store
            .rotate_encrypted_share_a("user-1", &dummy_blob(7), dummy_blob(9))
            .await
            .unwrap_err();
        assert!(matches!(err, KeygateError::Rejected(_)));

        // Byte-for-byte unchanged.
        let record = store.get_wallet("user-1").await.unwrap().unwrap();
        assert_eq!(record.encrypted_share_a, dummy_blob(1));
    }

    #[tokio::test]
    async fn test_rotation_unknown_wallet_is_not_found() {
        let store = MemoryWalletStore::new();
        let err = store
            .rotate_encrypted_share_a("ghost", &dummy_blob(1), dummy_blob(2))
            .await
            .unwrap_err();
        assert!(matches!(err, KeygateError::NotFound));
    }

    #[tokio::test]
    async fn test_fingerprint_lookup() {
        let store = MemoryWalletStore::new();
        let mut record = dummy_record("user-1");
        record.share_c_fingerprint = Some([0xAA; 32]);
        store.create_wallet(record).await.unwrap();

        let found = store.get_wallet_by_fingerprint(&[0xAA; 32]).await.unwrap();
        assert!(found.is_some());
        let missing = store.get_wallet_by_fingerprint(&[0xBB; 32]).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_pending_recovery_lifecycle() {
        let store = MemoryWalletStore::new();
        let record = PendingRecoveryRecord {
            user_id: "user-1".to_string(),
            payload_b64: "cGF5bG9hZA==".to_string(),
            recovery_mode: RecoveryMode::FullSeed,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
        };
        store.put_pending_recovery(record).await.unwrap();

        assert!(store.get_pending_recovery("user-1").await.unwrap().is_some());
        assert!(store.remove_pending_recovery("user-1").await.unwrap());
        // Idempotent: second removal is a no-op.
        assert!(!store.remove_pending_recovery("user-1").await.unwrap());
        assert!(store.get_pending_recovery("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let store = MemoryWalletStore::new();
        for (user, offset) in [("stale", -1i64), ("fresh", 7)] {
            store
                .put_pending_recovery(PendingRecoveryRecord {
                    user_id: user.to_string(),
                    payload_b64: String::new(),
                    recovery_mode: RecoveryMode::ShareCOnly,
                    created_at: Utc::now(),
                    expires_at: Utc::now() + Duration::days(offset),
                })
                .await
                .unwrap();
        }

        let removed = store.cleanup_expired_recoveries().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_pending_recovery("stale").await.unwrap().is_none());
        assert!(store.get_pending_recovery("fresh").await.unwrap().is_some());
    }
}
