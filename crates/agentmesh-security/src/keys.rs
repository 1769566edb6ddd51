//! Key material
//!
//! Both keys are 32 bytes, zeroized when dropped, and never printed by
//! `Debug`.

use std::fmt;

use aes_gcm::aead::{OsRng, rand_core::RngCore};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SecurityError, SecurityResult};

pub const KEY_LEN: usize = 32;

/// Default variable for [`EncryptionKey::from_env`]
pub const ENCRYPTION_KEY_ENV: &str = "AGENTMESH_ENCRYPTION_KEY";

/// Default variable for [`SigningKey::from_env`]
pub const SIGNING_KEY_ENV: &str = "AGENTMESH_SIGNING_KEY";

fn random_bytes() -> [u8; KEY_LEN] {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn decode(source_name: &str, encoded: &str) -> SecurityResult<[u8; KEY_LEN]> {
    let invalid = |reason: String| SecurityError::InvalidKey {
        source_name: source_name.to_string(),
        reason,
    };

    let mut decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| invalid(format!("not valid base64: {}", e)))?;

    if decoded.len() != KEY_LEN {
        let len = decoded.len();
        decoded.zeroize();
        return Err(invalid(format!("expected {} bytes, got {}", KEY_LEN, len)));
    }

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&decoded);
    decoded.zeroize();
    Ok(bytes)
}

fn read_env(var: &str) -> SecurityResult<[u8; KEY_LEN]> {
    let encoded = std::env::var(var).map_err(|_| SecurityError::InvalidKey {
        source_name: var.to_string(),
        reason: "environment variable not set".to_string(),
    })?;
    decode(var, &encoded)
}

/// AES-256-GCM key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Fresh key from the OS random source
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    /// Decode a base64 key
    pub fn from_base64(encoded: &str) -> SecurityResult<Self> {
        decode("base64 input", encoded).map(Self)
    }

    /// Load a base64 key from `var`
    pub fn from_env(var: &str) -> SecurityResult<Self> {
        read_env(var).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// HMAC-SHA256 key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        Self(random_bytes())
    }

    pub fn from_base64(encoded: &str) -> SecurityResult<Self> {
        decode("base64 input", encoded).map(Self)
    }

    pub fn from_env(var: &str) -> SecurityResult<Self> {
        read_env(var).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}
