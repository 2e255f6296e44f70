//! HTTP Routes for Wallet Custody
//!
//! Provides REST API endpoints for the split-trust custody flow:
//! - POST /auth/wallet/enroll               - Store client-produced enrollment material
//! - POST /auth/wallet/sign                 - Unlock, reconstruct, sign, wipe
//! - POST /auth/wallet/share-b              - Exchange Share C for Share B (recovery)
//! - POST /auth/wallet/rotate-user-secret   - Atomically swap the encrypted Share A
//! - GET  /auth/wallet/pending-recovery     - Fetch staged recovery material
//! - POST /auth/wallet/pending-recovery/ack - Acknowledge and delete it
//!
//! All crypto happens on the client or inside the signing orchestrator; these
//! handlers only move base64 blobs and map errors to status codes. Unlock and
//! lookup failures keep deliberately generic wording.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;

use crate::custody::encryption::{EncryptedShareA, NONCE_LEN};
use crate::custody::kdf::{KdfParams, UnlockCredential, SALT_LEN};
use crate::server::AppState;
use crate::store::{RecoveryMode, WalletRecord, WalletStore};
use crate::types::KeygateError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Wire shape of an unlock credential.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnlockCredentialDto {
    #[serde(rename_all = "camelCase")]
    Password { password: String },
    #[serde(rename_all = "camelCase")]
    PrfOutput { prf_output: String },
}

impl UnlockCredentialDto {
    fn into_credential(self) -> Result<UnlockCredential, KeygateError> {
        match self {
            Self::Password { password } => Ok(UnlockCredential::password(password)),
            Self::PrfOutput { prf_output } => {
                let bytes = decode_b64("prfOutput", &prf_output)?;
                Ok(UnlockCredential::prf_output(bytes))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: String,
    /// AEAD ciphertext of Share A, base64.
    pub encrypted_share_a: String,
    /// Share B plaintext, base64.
    pub share_b: String,
    pub solana_pubkey: String,
    /// KDF salt, base64 (16 bytes).
    pub salt: String,
    /// AEAD nonce, base64 (12 bytes).
    pub nonce: String,
    pub kdf_version: u32,
    pub recovery_mode: RecoveryMode,
    /// Recovery payload, base64; required unless mode is `none`.
    #[serde(default)]
    pub recovery_payload: Option<String>,
    /// SHA-256 of Share C, base64; required for share_c_only mode.
    #[serde(default)]
    pub share_c_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub user_id: String,
    /// Bytes to sign, base64.
    pub transaction_bytes: String,
    pub unlock_credential: UnlockCredentialDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Ed25519 signature, base64 (64 bytes).
    pub signature: String,
    pub solana_pubkey: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareBRequest {
    /// Share C data, base64.
    pub share_c: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareBResponse {
    /// Share B plaintext, base64.
    pub share_b: String,
    pub solana_pubkey: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateRequest {
    pub user_id: String,
    /// The blob the client read before re-wrapping, base64.
    pub old_encrypted_share_a: String,
    pub new_encrypted_share_a: String,
    /// Fresh salt for the new wrap, base64.
    pub new_salt: String,
    /// Fresh nonce for the new wrap, base64.
    pub new_nonce: String,
    pub key_derivation_version: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecoveryResponse {
    pub pending: Option<PendingRecoveryDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecoveryDto {
    /// Recovery payload, base64 (seed or Share C depending on mode).
    pub recovery_payload: String,
    pub recovery_mode: RecoveryMode,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingRecoveryQuery {
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub kdf_workers: usize,
    pub kdf_queue_headroom: usize,
}

// =============================================================================
// Response Helpers
// =============================================================================

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

fn error_response(err: KeygateError) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        },
    )
}

fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, KeygateError> {
    let body = req
        .collect()
        .await
        .map_err(|e| KeygateError::BadRequest(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > 10240 {
        return Err(KeygateError::BadRequest("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| KeygateError::BadRequest(format!("Invalid JSON: {}", e)))
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, KeygateError> {
    BASE64
        .decode(value)
        .map_err(|_| KeygateError::BadRequest(format!("Field {} is not valid base64", field)))
}

fn decode_b64_array<const N: usize>(field: &str, value: &str) -> Result<[u8; N], KeygateError> {
    decode_b64(field, value)?
        .try_into()
        .map_err(|_| KeygateError::BadRequest(format!("Field {} must be {} bytes", field, N)))
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/wallet/enroll
///
/// Store enrollment material the client produced locally: the seed was
/// split and Share A encrypted on the client, so the server never sees it.
async fn handle_enroll(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: EnrollRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    if body.user_id.is_empty() || body.solana_pubkey.is_empty() {
        return error_response(KeygateError::BadRequest(
            "Missing required fields: userId, solanaPubkey".into(),
        ));
    }

    let record = match enroll_record(&body) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    let user_id = record.user_id.clone();

    // Validate the recovery payload before touching the store so a bad
    // request never leaves a half-enrolled wallet behind.
    let recovery_payload = match (body.recovery_mode, body.recovery_payload) {
        (RecoveryMode::None, _) => None,
        (_, Some(p)) => Some(p),
        (_, None) => {
            return error_response(KeygateError::BadRequest(
                "recoveryPayload required for this recovery mode".into(),
            ))
        }
    };

    if let Err(e) = state.store.create_wallet(record).await {
        warn!(user_id = %user_id, "Enrollment refused: {}", e);
        return error_response(e);
    }

    // Stage recovery material for pickup unless the user opted out.
    if let Some(payload) = recovery_payload {
        if let Err(e) = state
            .recovery
            .stage_pending(&user_id, payload, body.recovery_mode)
            .await
        {
            return error_response(e);
        }
    }

    info!(user_id = %user_id, mode = %body.recovery_mode, "Wallet enrolled");
    json_response(StatusCode::CREATED, &OkResponse { success: true })
}

/// Validate and assemble the stored record from the enrollment request.
fn enroll_record(body: &EnrollRequest) -> Result<WalletRecord, KeygateError> {
    let ciphertext = decode_b64("encryptedShareA", &body.encrypted_share_a)?;
    let share_b = decode_b64("shareB", &body.share_b)?;
    let salt: [u8; SALT_LEN] = decode_b64_array("salt", &body.salt)?;
    let nonce: [u8; NONCE_LEN] = decode_b64_array("nonce", &body.nonce)?;

    // Unknown KDF versions are refused at the door, not at first unlock.
    let kdf_params = KdfParams::from_stored(body.kdf_version, salt)?;

    let share_c_fingerprint = match (&body.recovery_mode, &body.share_c_fingerprint) {
        (RecoveryMode::ShareCOnly, Some(fp)) => Some(decode_b64_array("shareCFingerprint", fp)?),
        (RecoveryMode::ShareCOnly, None) => {
            return Err(KeygateError::BadRequest(
                "shareCFingerprint required for share_c_only mode".into(),
            ))
        }
        _ => None,
    };

    Ok(WalletRecord {
        user_id: body.user_id.clone(),
        encrypted_share_a: EncryptedShareA {
            ciphertext,
            nonce,
            kdf_params,
        },
        share_b,
        solana_pubkey: body.solana_pubkey.clone(),
        recovery_mode: body.recovery_mode,
        share_c_fingerprint,
        created_at: Utc::now(),
    })
}

/// POST /auth/wallet/sign
async fn handle_sign(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: SignRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let payload = match decode_b64("transactionBytes", &body.transaction_bytes) {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    if payload.is_empty() {
        return error_response(KeygateError::BadRequest(
            "transactionBytes must not be empty".into(),
        ));
    }

    let credential = match body.unlock_credential.into_credential() {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let signature = match state
        .orchestrator
        .sign(&body.user_id, &payload, &credential)
        .await
    {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    // The record exists, sign() just used it. Should it vanish anyway,
    // answer with the same generic failure as every other sign error.
    let pubkey = match state.store.get_wallet(&body.user_id).await {
        Ok(Some(r)) => r.solana_pubkey,
        Ok(None) => return error_response(KeygateError::Auth),
        Err(e) => return error_response(e),
    };

    json_response(
        StatusCode::OK,
        &SignResponse {
            signature: BASE64.encode(signature),
            solana_pubkey: pubkey,
        },
    )
}

/// POST /auth/wallet/share-b
///
/// Recovery exchange: a client holding Share C proves it by fingerprint and
/// receives Share B plus the expected public key for local verification.
async fn handle_share_b(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: ShareBRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let share_c = match decode_b64("shareC", &body.share_c) {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    match state.recovery.recover_from_share_c(&share_c).await {
        Ok(recovered) => json_response(
            StatusCode::OK,
            &ShareBResponse {
                share_b: BASE64.encode(&recovered.share_b),
                solana_pubkey: recovered.solana_pubkey,
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /auth/wallet/rotate-user-secret
async fn handle_rotate(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RotateRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let swap = async {
        let old_ciphertext = decode_b64("oldEncryptedShareA", &body.old_encrypted_share_a)?;
        let new_ciphertext = decode_b64("newEncryptedShareA", &body.new_encrypted_share_a)?;
        let new_salt: [u8; SALT_LEN] = decode_b64_array("newSalt", &body.new_salt)?;
        let new_nonce: [u8; NONCE_LEN] = decode_b64_array("newNonce", &body.new_nonce)?;

        // The wire carries only the old ciphertext; rebuild the full expected
        // blob from the stored record. The store swap re-checks atomically,
        // so a writer sneaking in between read and swap still gets Rejected.
        let record = state
            .store
            .get_wallet(&body.user_id)
            .await?
            .ok_or(KeygateError::NotFound)?;
        if record.encrypted_share_a.ciphertext != old_ciphertext {
            return Err(KeygateError::Rejected(
                "Stored Share A does not match the submitted old value".into(),
            ));
        }

        let replacement = EncryptedShareA {
            ciphertext: new_ciphertext,
            nonce: new_nonce,
            kdf_params: KdfParams::from_stored(body.key_derivation_version, new_salt)?,
        };

        state
            .rotation
            .rotate(&body.user_id, &record.encrypted_share_a, replacement)
            .await?;
        Ok::<(), KeygateError>(())
    };

    match swap.await {
        Ok(()) => json_response(StatusCode::OK, &OkResponse { success: true }),
        Err(e) => error_response(e),
    }
}

/// GET /auth/wallet/pending-recovery?userId=
async fn handle_pending_recovery(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let query: PendingRecoveryQuery =
        match serde_urlencoded::from_str(req.uri().query().unwrap_or("")) {
            Ok(q) => q,
            Err(_) => {
                return error_response(KeygateError::BadRequest(
                    "Missing required query parameter: userId".into(),
                ))
            }
        };

    match state.recovery.fetch_pending(&query.user_id).await {
        Ok(record) => json_response(
            StatusCode::OK,
            &PendingRecoveryResponse {
                pending: record.map(|r| PendingRecoveryDto {
                    recovery_payload: r.payload_b64,
                    recovery_mode: r.recovery_mode,
                    expires_at: r.expires_at.to_rfc3339(),
                }),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /auth/wallet/pending-recovery/ack
async fn handle_pending_recovery_ack(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: AckRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.recovery.acknowledge(&body.user_id).await {
        Ok(()) => json_response(StatusCode::OK, &OkResponse { success: true }),
        Err(e) => error_response(e),
    }
}

/// GET /health
async fn handle_health(state: Arc<AppState>) -> Response<BoxBody> {
    let healthy = state.kdf_pool.is_healthy();
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    json_response(
        status,
        &HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            kdf_workers: state.kdf_pool.worker_count(),
            kdf_queue_headroom: state.kdf_pool.queue_headroom(),
        },
    )
}

// =============================================================================
// Route Dispatcher
// =============================================================================

/// Handle wallet custody routes. Returns None for paths outside this module.
pub async fn handle_wallet_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if path == "/health" {
        return match method {
            &Method::GET => Some(handle_health(state).await),
            &Method::OPTIONS => Some(cors_preflight()),
            _ => Some(json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse {
                    error: "Method not allowed".into(),
                    code: None,
                },
            )),
        };
    }

    if !path.starts_with("/auth/wallet") {
        return None;
    }

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path);

    let response = match (method, path) {
        (&Method::POST, "/auth/wallet/enroll") => handle_enroll(req, state).await,
        (&Method::POST, "/auth/wallet/sign") => handle_sign(req, state).await,
        (&Method::POST, "/auth/wallet/share-b") => handle_share_b(req, state).await,
        (&Method::POST, "/auth/wallet/rotate-user-secret") => handle_rotate(req, state).await,
        (&Method::GET, "/auth/wallet/pending-recovery") => {
            handle_pending_recovery(req, state).await
        }
        (&Method::POST, "/auth/wallet/pending-recovery/ack") => {
            handle_pending_recovery_ack(req, state).await
        }

        // Method not allowed
        (_, "/auth/wallet/enroll")
        | (_, "/auth/wallet/sign")
        | (_, "/auth/wallet/share-b")
        | (_, "/auth/wallet/rotate-user-secret")
        | (_, "/auth/wallet/pending-recovery")
        | (_, "/auth/wallet/pending-recovery/ack") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),

        // Wallet endpoint not found
        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Wallet endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_credential_dto_password() {
        let dto: UnlockCredentialDto =
            serde_json::from_str(r#"{"type":"password","password":"hunter2"}"#).unwrap();
        let credential = dto.into_credential().unwrap();
        assert!(matches!(credential, UnlockCredential::Password(_)));
    }

    #[test]
    fn test_unlock_credential_dto_prf_output() {
        let b64 = BASE64.encode([0xAB; 32]);
        let json = format!(r#"{{"type":"prfOutput","prfOutput":"{}"}}"#, b64);
        let dto: UnlockCredentialDto = serde_json::from_str(&json).unwrap();
        let credential = dto.into_credential().unwrap();
        assert!(matches!(credential, UnlockCredential::PrfOutput(_)));
    }

    #[test]
    fn test_unlock_credential_dto_rejects_bad_base64() {
        let dto: UnlockCredentialDto =
            serde_json::from_str(r#"{"type":"prfOutput","prfOutput":"!!!"}"#).unwrap();
        assert!(dto.into_credential().is_err());
    }

    #[test]
    fn test_decode_b64_array_enforces_length() {
        let short = BASE64.encode([0u8; 4]);
        let err = decode_b64_array::<16>("salt", &short).unwrap_err();
        assert!(matches!(err, KeygateError::BadRequest(_)));

        let exact = BASE64.encode([7u8; 16]);
        let salt: [u8; 16] = decode_b64_array("salt", &exact).unwrap();
        assert_eq!(salt, [7u8; 16]);
    }

    #[test]
    fn test_enroll_record_requires_fingerprint_for_share_c_mode() {
        let body = EnrollRequest {
            user_id: "user-1".into(),
            encrypted_share_a: BASE64.encode([1u8; 48]),
            share_b: BASE64.encode([2u8; 32]),
            solana_pubkey: "11111111111111111111111111111111".into(),
            salt: BASE64.encode([3u8; SALT_LEN]),
            nonce: BASE64.encode([4u8; NONCE_LEN]),
            kdf_version: 1,
            recovery_mode: RecoveryMode::ShareCOnly,
            recovery_payload: Some(BASE64.encode([5u8; 32])),
            share_c_fingerprint: None,
        };
        assert!(matches!(
            enroll_record(&body).unwrap_err(),
            KeygateError::BadRequest(_)
        ));
    }

    #[test]
    fn test_enroll_record_rejects_unknown_kdf_version() {
        let body = EnrollRequest {
            user_id: "user-1".into(),
            encrypted_share_a: BASE64.encode([1u8; 48]),
            share_b: BASE64.encode([2u8; 32]),
            solana_pubkey: "11111111111111111111111111111111".into(),
            salt: BASE64.encode([3u8; SALT_LEN]),
            nonce: BASE64.encode([4u8; NONCE_LEN]),
            kdf_version: 9,
            recovery_mode: RecoveryMode::None,
            recovery_payload: None,
            share_c_fingerprint: None,
        };
        assert!(matches!(
            enroll_record(&body).unwrap_err(),
            KeygateError::Config(_)
        ));
    }
}
