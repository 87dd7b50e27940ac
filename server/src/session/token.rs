//! Signed session identifiers
//!
//! A token is `base64url(R ++ MD5(secret ++ R))` with padding stripped, where `R`
//! is 16 random bytes and `secret` is the server secret as 8 big-endian bytes.
//! The decoded token is always exactly 32 bytes.
//!
//! The keyed hash is a single MD5 over `secret ++ R`, not HMAC. It is kept as-is
//! because changing the construction changes the cookie wire format. HMAC-SHA256
//! is the drop-in substitute for a deployment that does not need compatibility.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use md5::{Digest, Md5};
use rand::RngCore;
use std::fmt;
use subtle::ConstantTimeEq;

/// Length of the random part of a token
pub const RANDOM_LEN: usize = 16;
/// Length of the MD5 tag
pub const TAG_LEN: usize = 16;
/// Decoded token length
pub const TOKEN_LEN: usize = RANDOM_LEN + TAG_LEN;
/// Encoded token length (unpadded base64 of 32 bytes)
pub const ENCODED_LEN: usize = 43;

/// Generates and verifies session identifiers bound to a server secret
#[derive(Clone)]
pub struct SessionSigner {
    secret: [u8; 8],
}

impl SessionSigner {
    pub fn new(secret: u64) -> Self {
        Self {
            secret: secret.to_be_bytes(),
        }
    }

    /// Mint a fresh token from 16 bytes of the thread CSPRNG
    pub fn generate(&self) -> String {
        let mut random = [0u8; RANDOM_LEN];
        rand::rng().fill_bytes(&mut random);
        self.sign(&random)
    }

    /// Check that `token` was minted under this secret.
    ///
    /// Malformed base64, a wrong decoded length and a tag mismatch all
    /// return `false`; the caller cannot tell them apart.
    pub fn verify(&self, token: &str) -> bool {
        if token.len() != ENCODED_LEN {
            return false;
        }

        let decoded = match URL_SAFE_NO_PAD.decode(token) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        if decoded.len() != TOKEN_LEN {
            return false;
        }

        let (random, received) = decoded.split_at(RANDOM_LEN);
        let expected = self.tag(random);
        expected[..].ct_eq(received).into()
    }

    fn sign(&self, random: &[u8; RANDOM_LEN]) -> String {
        let mut raw = [0u8; TOKEN_LEN];
        raw[..RANDOM_LEN].copy_from_slice(random);
        raw[RANDOM_LEN..].copy_from_slice(&self.tag(random));
        URL_SAFE_NO_PAD.encode(raw)
    }

    fn tag(&self, random: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Md5::new();
        hasher.update(self.secret);
        hasher.update(random);
        let digest = hasher.finalize();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest);
        tag
    }
}

impl fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSigner([REDACTED])")
    }
}
