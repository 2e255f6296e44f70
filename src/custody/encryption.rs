//! Authenticated encryption of Share A.
//!
//! Share A is encrypted under the unlock key with ChaCha20-Poly1305 before
//! it ever reaches the record store. The nonce is generated here, at
//! encryption time. Callers cannot supply one, which structurally rules
//! out nonce reuse under a given key.
//!
//! # Security
//!
//! - The Poly1305 tag detects any tampering with the ciphertext.
//! - Decryption failure is reported as one generic unlock error: a wrong
//!   key and a corrupted blob are indistinguishable to the caller.

use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::kdf::{KdfParams, UNLOCK_KEY_LEN};
use super::shamir::{Share, ShareIndex};
use crate::custody::seed::SEED_LEN;
use crate::types::{KeygateError, Result};

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Share A at rest: AEAD ciphertext plus everything needed to re-derive the
/// unlock key from a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedShareA {
    /// Ciphertext (share bytes + auth tag).
    pub ciphertext: Vec<u8>,

    /// Nonce used for this encryption. Fresh per encrypt call.
    pub nonce: [u8; NONCE_LEN],

    /// Parameters the unlock key was derived with.
    pub kdf_params: KdfParams,
}

/// Encrypt Share A under the unlock key.
///
/// A fresh random nonce is generated on every call.
pub fn encrypt_share_a(
    share_a: &Share,
    key: &[u8; UNLOCK_KEY_LEN],
    kdf_params: KdfParams,
) -> Result<EncryptedShareA> {
    if share_a.index != ShareIndex::A {
        return Err(KeygateError::Internal(format!(
            "Refusing to encrypt share {} as share A",
            share_a.index
        )));
    }

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), share_a.data.as_slice())
        .map_err(|e| KeygateError::Internal(format!("Encryption failed: {e}")))?;

    Ok(EncryptedShareA {
        ciphertext,
        nonce,
        kdf_params,
    })
}

/// Decrypt Share A with the unlock key.
///
/// # Errors
///
/// Any failure (wrong key, tampered ciphertext, implausible plaintext)
/// surfaces as the generic unlock error.
pub fn decrypt_share_a(enc: &EncryptedShareA, key: &[u8; UNLOCK_KEY_LEN]) -> Result<Share> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&enc.nonce), enc.ciphertext.as_slice())
        .map_err(|_| KeygateError::Auth)?;

    if plaintext.len() != SEED_LEN {
        return Err(KeygateError::Auth);
    }

    Ok(Share {
        index: ShareIndex::A,
        data: plaintext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::seed::Seed;
    use crate::custody::shamir;

    fn cheap_params() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            ..KdfParams::generate()
        }
    }

    fn share_a() -> Share {
        let seed = Seed::generate();
        let (a, _, _) = shamir::split(&seed);
        a
    }

    #[test]
    fn test_round_trip() {
        let a = share_a();
        let key = [0x42u8; UNLOCK_KEY_LEN];

        let enc = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        let dec = decrypt_share_a(&enc, &key).unwrap();

        assert_eq!(dec.index, ShareIndex::A);
        assert_eq!(dec.data, a.data);
    }

    #[test]
    fn test_ciphertext_includes_auth_tag() {
        let a = share_a();
        let key = [0x42u8; UNLOCK_KEY_LEN];

        let enc = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        assert_eq!(enc.ciphertext.len(), SEED_LEN + AUTH_TAG_LEN);
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let a = share_a();
        let key = [0x42u8; UNLOCK_KEY_LEN];

        let e1 = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        let e2 = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        assert_ne!(e1.nonce, e2.nonce);
        assert_ne!(e1.ciphertext, e2.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails_generically() {
        let a = share_a();
        let key = [0x42u8; UNLOCK_KEY_LEN];
        let wrong = [0x43u8; UNLOCK_KEY_LEN];

        let enc = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        let err = decrypt_share_a(&enc, &wrong).unwrap_err();
        assert!(matches!(err, KeygateError::Auth));
    }

    #[test]
    fn test_tampered_ciphertext_fails_generically() {
        let a = share_a();
        let key = [0x42u8; UNLOCK_KEY_LEN];

        let mut enc = encrypt_share_a(&a, &key, cheap_params()).unwrap();
        enc.ciphertext[0] ^= 0x01;

        let err = decrypt_share_a(&enc, &key).unwrap_err();
        assert!(matches!(err, KeygateError::Auth));
    }

    #[test]
    fn test_refuses_to_encrypt_other_shares() {
        let seed = Seed::generate();
        let (_, b, _) = shamir::split(&seed);
        let key = [0x42u8; UNLOCK_KEY_LEN];

        assert!(encrypt_share_a(&b, &key, cheap_params()).is_err());
    }
}
