//! Keyed signatures over handshake nonces.
//!
//! Signs and verifies HMAC-SHA256 hex signatures. The secret key never leaves
//! the server side: only the nonce and the resulting signature travel.

use crate::clock::RandomSource;
use crate::error::{HandshakeError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length of an agent secret key in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// Agent secret key.
///
/// Not serializable and redacted in `Debug` output; zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh key from the given random source.
    pub fn generate(random: &dyn RandomSource) -> Self {
        let mut bytes = [0u8; SECRET_KEY_LEN];
        random.fill(&mut bytes);
        Self(bytes)
    }

    /// Parse a key from exactly 64 hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let mut bytes = [0u8; SECRET_KEY_LEN];
        hex::decode_to_slice(hex_key.trim(), &mut bytes).map_err(|e| {
            HandshakeError::InvalidKey(format!(
                "expected {} hex characters: {}",
                SECRET_KEY_LEN * 2,
                e
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Sign a nonce with HMAC-SHA256, returning lowercase hex.
pub fn sign(nonce: &[u8], key: &SecretKey) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(nonce);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature over a nonce.
///
/// The comparison is constant-time over the signature bytes. Malformed,
/// truncated or mismatched signatures simply return false.
pub fn verify(nonce: &[u8], signature_hex: &str, key: &SecretKey) -> bool {
    let expected = sign(nonce, key);
    bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes()))
}
