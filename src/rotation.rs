//! User secret rotation.
//!
//! Clients re-wrap Share A locally under their new credential and submit
//! both the blob they read and its replacement. The swap is compare-and-set:
//! the store replaces the encrypted Share A only if the stored blob still
//! matches the submitted old one byte for byte. A concurrent rotation loses
//! the race with `Rejected` and zero mutation instead of silently clobbering
//! the other writer. Share B and the public key are never touched; rotation
//! changes how Share A is wrapped, not the wallet identity.

use std::sync::Arc;

use tracing::{info, warn};

use crate::custody::encryption::EncryptedShareA;
use crate::custody::kdf::KdfParams;
use crate::store::{WalletRecord, WalletStore};
use crate::types::{KeygateError, Result};

/// Applies client-submitted Share A re-encryptions atomically.
pub struct RotationService<S: WalletStore> {
    store: Arc<S>,
}

impl<S: WalletStore> RotationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Replace the wallet's encrypted Share A, if and only if the stored
    /// blob still equals `old`.
    ///
    /// The replacement's KDF version is validated up front so a client on a
    /// stale parameter set fails with `Config` before any store mutation.
    /// Returns the updated record on success.
    pub async fn rotate(
        &self,
        user_id: &str,
        old: &EncryptedShareA,
        new: EncryptedShareA,
    ) -> Result<WalletRecord> {
        KdfParams::from_stored(new.kdf_params.version, new.kdf_params.salt)?;

        match self.store.rotate_encrypted_share_a(user_id, old, new).await {
            Ok(record) => {
                info!(user_id, "Unlock credential rotated");
                Ok(record)
            }
            Err(e @ KeygateError::Rejected(_)) => {
                warn!(user_id, "Rotation lost a concurrent update race");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
