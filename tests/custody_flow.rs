//! End-to-end custody flow scenarios.
//!
//! Each test wires a fresh store, KDF pool, and services the way
//! `AppState::new` does, then drives a complete user journey: enrollment,
//! signing, recovery, rotation. Crypto runs for real, only with cheap KDF
//! params to keep Argon2 runtime reasonable.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use keygate::custody::enrollment::{
    complete_share_c_recovery, enroll, enroll_with_seed, seed_from_recovery_payload,
    EnrollmentMaterial,
};
use keygate::custody::kdf::{KdfParams, UnlockCredential};
use keygate::custody::kdf_worker::{KdfPoolConfig, KdfWorkerPool};
use keygate::custody::{decrypt_share_a, encrypt_share_a, unlock_key_for_credential};
use keygate::recovery::RecoveryService;
use keygate::rotation::RotationService;
use keygate::signing::SigningOrchestrator;
use keygate::store::{MemoryWalletStore, RecoveryMode, WalletRecord, WalletStore};
use keygate::types::KeygateError;

const PENDING_TTL_SECS: i64 = 3600;

fn cheap_params() -> KdfParams {
    KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
        ..KdfParams::generate()
    }
}

struct Harness {
    store: Arc<MemoryWalletStore>,
    orchestrator: SigningOrchestrator<MemoryWalletStore>,
    recovery: RecoveryService<MemoryWalletStore>,
    rotation: RotationService<MemoryWalletStore>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryWalletStore::new());
        let kdf_pool = Arc::new(KdfWorkerPool::new(KdfPoolConfig::default()));
        Self {
            orchestrator: SigningOrchestrator::new(Arc::clone(&store), kdf_pool),
            recovery: RecoveryService::new(Arc::clone(&store), PENDING_TTL_SECS),
            rotation: RotationService::new(Arc::clone(&store)),
            store,
        }
    }

    /// Enroll a user the way the HTTP handler does: store the record, then
    /// stage any recovery payload for pickup.
    async fn enroll_user(&self, user_id: &str, material: &EnrollmentMaterial) {
        self.store
            .create_wallet(WalletRecord {
                user_id: user_id.to_string(),
                encrypted_share_a: material.encrypted_share_a.clone(),
                share_b: material.share_b.clone(),
                solana_pubkey: material.solana_pubkey.clone(),
                recovery_mode: material.recovery_mode,
                share_c_fingerprint: material.share_c_fingerprint,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        if let Some(payload) = &material.recovery_payload_b64 {
            self.recovery
                .stage_pending(user_id, payload.clone(), material.recovery_mode)
                .await
                .unwrap();
        }
    }
}

fn assert_valid_signature(pubkey: &str, message: &[u8], signature: &[u8; 64]) {
    let bytes: [u8; 32] = bs58::decode(pubkey)
        .into_vec()
        .unwrap()
        .try_into()
        .unwrap();
    let key = VerifyingKey::from_bytes(&bytes).unwrap();
    key.verify(message, &Signature::from_bytes(signature))
        .expect("signature must verify under the enrolled pubkey");
}

// Scenario 1: enroll, then sign a transaction with the right password.
#[tokio::test]
async fn enroll_then_sign() {
    let harness = Harness::new();
    let credential = UnlockCredential::password("correct horse battery staple");
    let material = enroll(&credential, RecoveryMode::None, cheap_params()).unwrap();
    harness.enroll_user("alice", &material).await;

    let message = b"transfer 5 SOL to bob";
    let signature = harness
        .orchestrator
        .sign("alice", message, &credential)
        .await
        .unwrap();

    assert_valid_signature(&material.solana_pubkey, message, &signature);
}

// Scenario 2: the wrong password fails with one generic error and no signature.
#[tokio::test]
async fn wrong_password_yields_generic_failure() {
    let harness = Harness::new();
    let material = enroll(
        &UnlockCredential::password("right"),
        RecoveryMode::None,
        cheap_params(),
    )
    .unwrap();
    harness.enroll_user("alice", &material).await;

    let err = harness
        .orchestrator
        .sign("alice", b"payload", &UnlockCredential::password("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, KeygateError::Auth));
    assert_eq!(err.to_string(), "Unlock failed");

    // A sign attempt against a user id that was never enrolled must be
    // indistinguishable from a wrong password, down to status and code.
    let ghost_err = harness
        .orchestrator
        .sign("nobody", b"payload", &UnlockCredential::password("wrong"))
        .await
        .unwrap_err();
    assert_eq!(
        (ghost_err.status_code(), ghost_err.code(), ghost_err.to_string()),
        (err.status_code(), err.code(), err.to_string())
    );
}

// Scenario 3: share_c_only recovery on a fresh device. The user fetches
// their staged Share C, exchanges it for Share B, reconstructs locally,
// re-enrolls with a new password, and the wallet identity is preserved.
#[tokio::test]
async fn share_c_recovery_round_trip() {
    let harness = Harness::new();
    let old_credential = UnlockCredential::password("forgotten password");
    let material = enroll(&old_credential, RecoveryMode::ShareCOnly, cheap_params()).unwrap();
    let original_pubkey = material.solana_pubkey.clone();
    harness.enroll_user("alice", &material).await;

    // Device setup: pick up and acknowledge the staged Share C.
    let pending = harness
        .recovery
        .fetch_pending("alice")
        .await
        .unwrap()
        .expect("recovery payload should be staged");
    assert_eq!(pending.recovery_mode, RecoveryMode::ShareCOnly);
    let share_c = BASE64.decode(&pending.payload_b64).unwrap();
    harness.recovery.acknowledge("alice").await.unwrap();
    assert!(harness.recovery.fetch_pending("alice").await.unwrap().is_none());

    // Later, on a new device: exchange Share C for Share B.
    let recovered = harness.recovery.recover_from_share_c(&share_c).await.unwrap();
    assert_eq!(recovered.solana_pubkey, original_pubkey);

    // Client-side completion, verified against the stored identity.
    let seed = complete_share_c_recovery(
        share_c,
        recovered.share_b,
        &recovered.solana_pubkey,
    )
    .unwrap();

    // Re-enroll under a fresh split and password; the pubkey cannot change.
    let new_credential = UnlockCredential::password("brand new password");
    let rematerial =
        enroll_with_seed(&seed, &new_credential, RecoveryMode::ShareCOnly, cheap_params())
            .unwrap();
    assert_eq!(rematerial.solana_pubkey, original_pubkey);
    assert_ne!(rematerial.share_b, material.share_b);
}

// Scenario 4: full_seed recovery works offline, without the server.
#[tokio::test]
async fn full_seed_recovery_is_offline() {
    let harness = Harness::new();
    let material = enroll(
        &UnlockCredential::password("pw"),
        RecoveryMode::FullSeed,
        cheap_params(),
    )
    .unwrap();
    harness.enroll_user("alice", &material).await;

    let pending = harness
        .recovery
        .fetch_pending("alice")
        .await
        .unwrap()
        .unwrap();

    // Nothing below touches the store or any service.
    let seed = seed_from_recovery_payload(&pending.payload_b64).unwrap();
    assert_eq!(seed.solana_pubkey(), material.solana_pubkey);

    let signature = seed.sign(b"offline transaction");
    assert_valid_signature(&material.solana_pubkey, b"offline transaction", &signature);
}

// Scenario 5: rotation swaps the credential but not the wallet identity,
// and a concurrent rotation against the stale blob is rejected untouched.
#[tokio::test]
async fn rotation_preserves_identity_and_detects_races() {
    let harness = Harness::new();
    let old_credential = UnlockCredential::password("old");
    let material = enroll(&old_credential, RecoveryMode::None, cheap_params()).unwrap();
    harness.enroll_user("alice", &material).await;
    let original = material.encrypted_share_a.clone();

    // Client-side re-wrap under the new password.
    let rewrap = |to: &UnlockCredential| {
        let key = unlock_key_for_credential(&old_credential, &original.kdf_params).unwrap();
        let share_a = decrypt_share_a(&original, &key).unwrap();
        let params = cheap_params();
        let new_key = unlock_key_for_credential(to, &params).unwrap();
        encrypt_share_a(&share_a, &new_key, params).unwrap()
    };

    let new_credential = UnlockCredential::password("new");
    let replacement = rewrap(&new_credential);
    let updated = harness
        .rotation
        .rotate("alice", &original, replacement)
        .await
        .unwrap();

    assert_eq!(updated.solana_pubkey, material.solana_pubkey);
    assert_eq!(updated.share_b, material.share_b);

    // Signing now requires the new credential.
    let message = b"post-rotation transaction";
    let err = harness
        .orchestrator
        .sign("alice", message, &old_credential)
        .await
        .unwrap_err();
    assert!(matches!(err, KeygateError::Auth));

    let signature = harness
        .orchestrator
        .sign("alice", message, &new_credential)
        .await
        .unwrap();
    assert_valid_signature(&material.solana_pubkey, message, &signature);

    // A rotation still referencing the original blob must lose cleanly.
    let stale_replacement = rewrap(&old_credential);
    let err = harness
        .rotation
        .rotate("alice", &original, stale_replacement)
        .await
        .unwrap_err();
    assert!(matches!(err, KeygateError::Rejected(_)));
}

// Scenario 6: expired pending recovery is gone, for fetchers and the sweep.
#[tokio::test]
async fn pending_recovery_expires() {
    let store = Arc::new(MemoryWalletStore::new());
    // TTL in the past makes everything staged already expired.
    let recovery = RecoveryService::new(Arc::clone(&store), -1);

    let material = enroll(
        &UnlockCredential::password("pw"),
        RecoveryMode::FullSeed,
        cheap_params(),
    )
    .unwrap();
    recovery
        .stage_pending(
            "alice",
            material.recovery_payload_b64.clone().unwrap(),
            material.recovery_mode,
        )
        .await
        .unwrap();

    assert!(recovery.fetch_pending("alice").await.unwrap().is_none());
    assert_eq!(recovery.cleanup_expired().await.unwrap(), 0);

    // A fresh TTL stages material that survives a sweep.
    let recovery = RecoveryService::new(Arc::clone(&store), PENDING_TTL_SECS);
    recovery
        .stage_pending(
            "alice",
            material.recovery_payload_b64.unwrap(),
            material.recovery_mode,
        )
        .await
        .unwrap();
    assert_eq!(recovery.cleanup_expired().await.unwrap(), 0);
    assert!(recovery.fetch_pending("alice").await.unwrap().is_some());
}

// Property: concurrent signing for distinct wallets proceeds independently,
// each producing a signature valid for its own wallet.
#[tokio::test]
async fn distinct_wallets_sign_concurrently() {
    let harness = Arc::new(Harness::new());
    let mut expected = Vec::new();

    for name in ["alice", "bob", "carol"] {
        let credential = UnlockCredential::password(name);
        let material = enroll(&credential, RecoveryMode::None, cheap_params()).unwrap();
        harness.enroll_user(name, &material).await;
        expected.push((name, material.solana_pubkey));
    }

    let mut handles = Vec::new();
    for (name, pubkey) in expected {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            let signature = harness
                .orchestrator
                .sign(name, name.as_bytes(), &UnlockCredential::password(name))
                .await
                .unwrap();
            assert_valid_signature(&pubkey, name.as_bytes(), &signature);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}
