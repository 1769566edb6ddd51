//! Signed, encrypted payload container

use agentmesh_core::AgentId;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};

/// Output of [`SecurityManager::seal`](crate::SecurityManager::seal)
///
/// `signature` covers `ciphertext` only; `receiver` is authenticated through
/// the cipher's associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureEnvelope {
    pub sender: AgentId,
    pub receiver: AgentId,
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
    pub sealed_at: DateTime<Utc>,
}

impl SecureEnvelope {
    pub fn new(
        sender: AgentId,
        receiver: AgentId,
        ciphertext: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            sender,
            receiver,
            ciphertext,
            signature,
            sealed_at: Utc::now(),
        }
    }

    /// Ciphertext as base64, for embedding in a text message payload
    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }
}
