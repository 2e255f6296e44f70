//! Share Codec: (3,2)-threshold secret sharing over GF(256).
//!
//! A 32-byte seed is split into three shares (A, B, C) such that any two
//! reconstruct it exactly and any single share reveals nothing about the
//! seed beyond its length. Each seed byte is protected by its own random
//! degree-1 polynomial; shares are the polynomial evaluations at the fixed
//! x-coordinates 1 (A), 2 (B), and 3 (C).
//!
//! # Security
//!
//! - Polynomial coefficients come from the OS CSPRNG.
//! - Reconstruction rejects empty shares, duplicate indices, and length
//!   mismatches loudly instead of returning garbage.
//! - Consistency of the two shares (same seed) cannot be detected here;
//!   callers verify the derived public key against a known-good one.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::custody::seed::{Seed, SEED_LEN};
use crate::types::{KeygateError, Result};

// =============================================================================
// GF(256) arithmetic
// =============================================================================

/// Addition in GF(256) is bitwise XOR.
#[inline]
fn gf_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiplication in GF(256), reduction modulo x^8 + x^4 + x^3 + x + 1.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut res = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            res ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1B;
        }
        b >>= 1;
    }
    res
}

/// Multiplicative inverse via a^254. Zero has no inverse; callers guarantee
/// non-zero x-coordinates so this is unreachable with valid shares.
fn gf_inv(a: u8) -> u8 {
    debug_assert!(a != 0, "0 has no inverse in GF(256)");
    let mut t = a;
    for _ in 0..253 {
        t = gf_mul(t, a);
    }
    t
}

/// Evaluate `c0 + c1*x` at a field point (Horner is overkill for degree 1).
#[inline]
fn gf_eval_deg1(c0: u8, c1: u8, x: u8) -> u8 {
    gf_add(gf_mul(c1, x), c0)
}

/// Lagrange interpolation at zero from two points with distinct non-zero x.
///
/// In GF(2^8) subtraction equals addition, so the basis terms reduce to
/// `x2/(x1+x2)` and `x1/(x1+x2)`.
fn gf_interpolate_at_zero(x1: u8, y1: u8, x2: u8, y2: u8) -> u8 {
    let denom = gf_inv(gf_add(x1, x2));
    let l1 = gf_mul(x2, denom);
    let l2 = gf_mul(x1, denom);
    gf_add(gf_mul(y1, l1), gf_mul(y2, l2))
}

// =============================================================================
// Shares
// =============================================================================

/// Threshold required to reconstruct the seed.
pub const THRESHOLD: usize = 2;

/// Total number of shares produced per split.
pub const SHARE_COUNT: usize = 3;

/// Which of the three shares this is. Determines the x-coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareIndex {
    /// Encrypted server-side under the user's unlock credential.
    A,
    /// Held server-side in plaintext.
    B,
    /// Held by the user for recovery.
    C,
}

impl ShareIndex {
    /// Non-zero x-coordinate in GF(256).
    pub fn x_coordinate(&self) -> u8 {
        match self {
            ShareIndex::A => 1,
            ShareIndex::B => 2,
            ShareIndex::C => 3,
        }
    }
}

impl std::fmt::Display for ShareIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareIndex::A => write!(f, "A"),
            ShareIndex::B => write!(f, "B"),
            ShareIndex::C => write!(f, "C"),
        }
    }
}

/// One share of a split seed. As sensitive as the seed itself while it
/// exists outside encryption.
#[derive(Clone)]
pub struct Share {
    /// Which share this is (fixes the x-coordinate).
    pub index: ShareIndex,

    /// Polynomial evaluations, one byte per seed byte.
    pub data: Vec<u8>,
}

impl Share {
    /// Build a share from raw bytes, validating the length.
    pub fn from_bytes(index: ShareIndex, data: Vec<u8>) -> Result<Self> {
        if data.len() != SEED_LEN {
            return Err(KeygateError::BadRequest(format!(
                "Share must be {} bytes, got {}",
                SEED_LEN,
                data.len()
            )));
        }
        Ok(Self { index, data })
    }
}

// Shares are as sensitive as the seed while they exist in the clear.
impl Drop for Share {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.data.zeroize();
    }
}

// Shares never appear in logs or debug output.
impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Split / reconstruct
// =============================================================================

/// Split a seed into shares A, B, and C.
///
/// Each seed byte gets an independent random degree-1 polynomial with the
/// secret byte as constant term.
pub fn split(seed: &Seed) -> (Share, Share, Share) {
    let mut coeffs = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut coeffs);

    let make = |index: ShareIndex| {
        let x = index.x_coordinate();
        let data = seed
            .as_bytes()
            .iter()
            .zip(coeffs.iter())
            .map(|(&c0, &c1)| gf_eval_deg1(c0, c1, x))
            .collect();
        Share { index, data }
    };

    let a = make(ShareIndex::A);
    let b = make(ShareIndex::B);
    let c = make(ShareIndex::C);
    (a, b, c)
}

/// Reconstruct the seed from any two distinct shares.
///
/// Order-independent. Fails loudly on degenerate input: empty or short
/// shares, duplicate indices, or mismatched lengths. A consistent-looking
/// result from two shares of different seeds is NOT detected here; callers
/// must verify the derived public key before trusting the output.
pub fn reconstruct(first: &Share, second: &Share) -> Result<Seed> {
    if first.data.is_empty() || second.data.is_empty() {
        return Err(KeygateError::BadRequest("Empty share".into()));
    }
    if first.index == second.index {
        return Err(KeygateError::BadRequest(format!(
            "Duplicate share index {}",
            first.index
        )));
    }
    if first.data.len() != SEED_LEN || second.data.len() != SEED_LEN {
        return Err(KeygateError::BadRequest(format!(
            "Shares must be {} bytes",
            SEED_LEN
        )));
    }

    let x1 = first.index.x_coordinate();
    let x2 = second.index.x_coordinate();

    let mut seed_bytes = [0u8; SEED_LEN];
    for (i, out) in seed_bytes.iter_mut().enumerate() {
        *out = gf_interpolate_at_zero(x1, first.data[i], x2, second.data[i]);
    }

    Ok(Seed::from_bytes(seed_bytes))
}

// =============================================================================
// Tests
// =============================================================================
