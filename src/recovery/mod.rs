//! Recovery flows for re-establishing a wallet on a new device.
//!
//! Two recovery modes exist, chosen at enrollment:
//!
//! - `full_seed`: a pending record carries the base64 seed until the
//!   client acknowledges it has stored the material elsewhere.
//! - `share_c_only`: a pending record carries Share C; later, a client
//!   holding Share C can exchange it for Share B and reconstruct locally.
//!   The service itself never reconstructs during recovery.
//!
//! Pending records expire. Expired records are deleted lazily on fetch and
//! swept by a periodic cleanup task.
//!
//! # Security
//!
//! `recover_from_share_c` looks wallets up by a SHA-256 fingerprint of
//! Share C. An unknown fingerprint and a wallet enrolled in a different
//! mode both return the same generic `NotFound`, so the endpoint cannot be
//! used to probe which wallets exist or how they were enrolled.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::store::{PendingRecoveryRecord, RecoveryMode, WalletStore};
use crate::types::{KeygateError, Result};

/// Response to a successful Share C exchange: the client combines the
/// returned Share B with its Share C and verifies against the public key.
#[derive(Debug, Clone)]
pub struct ShareCRecovery {
    pub share_b: Vec<u8>,
    pub solana_pubkey: String,
}

/// Manages pending recovery material and the Share C exchange.
pub struct RecoveryService<S: WalletStore> {
    store: Arc<S>,
    /// Lifetime of a pending recovery record.
    pending_ttl: Duration,
}

impl<S: WalletStore> RecoveryService<S> {
    pub fn new(store: Arc<S>, pending_ttl_secs: i64) -> Self {
        Self {
            store,
            pending_ttl: Duration::seconds(pending_ttl_secs),
        }
    }

    /// Stage recovery material produced at enrollment for pickup.
    pub async fn stage_pending(
        &self,
        user_id: &str,
        payload_b64: String,
        mode: RecoveryMode,
    ) -> Result<()> {
        let now = Utc::now();
        self.store
            .put_pending_recovery(PendingRecoveryRecord {
                user_id: user_id.to_string(),
                payload_b64,
                recovery_mode: mode,
                created_at: now,
                expires_at: now + self.pending_ttl,
            })
            .await?;
        info!(user_id, mode = %mode, "Staged pending recovery material");
        Ok(())
    }

    /// Fetch the pending record for a user, deleting it first if expired.
    ///
    /// The record stays in the store until acknowledged so an interrupted
    /// pickup can be retried within the TTL.
    pub async fn fetch_pending(&self, user_id: &str) -> Result<Option<PendingRecoveryRecord>> {
        match self.store.get_pending_recovery(user_id).await? {
            Some(record) if record.is_expired() => {
                self.store.remove_pending_recovery(user_id).await?;
                debug!(user_id, "Dropped expired pending recovery on fetch");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Acknowledge pickup and delete the pending record. Idempotent: a
    /// second acknowledgement for the same user is a no-op.
    pub async fn acknowledge(&self, user_id: &str) -> Result<()> {
        let removed = self.store.remove_pending_recovery(user_id).await?;
        if removed {
            info!(user_id, "Pending recovery acknowledged and deleted");
        }
        Ok(())
    }

    /// Exchange Share C for Share B and the wallet's public key.
    ///
    /// Only wallets enrolled in `share_c_only` mode are reachable here, and
    /// only through the exact Share C bytes captured at enrollment.
    pub async fn recover_from_share_c(&self, share_c: &[u8]) -> Result<ShareCRecovery> {
        let fingerprint: [u8; 32] = Sha256::digest(share_c).into();
        let record = self
            .store
            .get_wallet_by_fingerprint(&fingerprint)
            .await?
            .ok_or(KeygateError::NotFound)?;

        if record.recovery_mode != RecoveryMode::ShareCOnly {
            // Indistinguishable from an unknown fingerprint.
            return Err(KeygateError::NotFound);
        }

        info!(user_id = %record.user_id, "Share C recovery exchange served");
        Ok(ShareCRecovery {
            share_b: record.share_b,
            solana_pubkey: record.solana_pubkey,
        })
    }

    /// Delete all expired pending records. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let removed = self.store.cleanup_expired_recoveries().await?;
        if removed > 0 {
            info!(removed, "Swept expired pending recovery records");
        }
        Ok(removed)
    }

    /// Decode a staged payload back to raw bytes. Used by handlers that
    /// validate payloads without interpreting them.
    pub fn decode_payload(payload_b64: &str) -> Result<Vec<u8>> {
        BASE64
            .decode(payload_b64)
            .map_err(|_| KeygateError::BadRequest("Invalid base64 recovery payload".into()))
    }
}
