//! Encryption, signing and permission bookkeeping for mesh agents

use std::collections::HashSet;
use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, Payload, rand_core::RngCore},
};
use agentmesh_core::AgentId;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::envelope::SecureEnvelope;
use crate::error::{SecurityError, SecurityResult};
use crate::keys::{ENCRYPTION_KEY_ENV, EncryptionKey, SIGNING_KEY_ENV, SigningKey};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric message protection shared by every agent of one deployment
///
/// Ciphertexts are `nonce || ciphertext+tag`. The receiver id is bound as
/// associated data, so a payload sealed for one agent fails to decrypt under
/// any other receiver id.
///
/// Permissions are free-form strings per agent. Granting a permission to an
/// unregistered agent registers it.
pub struct SecurityManager {
    cipher: Aes256Gcm,
    signing_key: SigningKey,
    permissions: DashMap<AgentId, HashSet<String>>,
}

impl SecurityManager {
    pub fn new(encryption_key: EncryptionKey, signing_key: SigningKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(encryption_key.as_bytes()));
        Self {
            cipher,
            signing_key,
            permissions: DashMap::new(),
        }
    }

    /// Manager with freshly generated keys
    pub fn generate() -> Self {
        Self::new(EncryptionKey::generate(), SigningKey::generate())
    }

    /// Load both keys from `AGENTMESH_ENCRYPTION_KEY` and `AGENTMESH_SIGNING_KEY`
    pub fn from_env() -> SecurityResult<Self> {
        Ok(Self::new(
            EncryptionKey::from_env(ENCRYPTION_KEY_ENV)?,
            SigningKey::from_env(SIGNING_KEY_ENV)?,
        ))
    }

    /// Register an agent; existing permissions are kept
    pub fn register_agent(&self, agent: &AgentId) {
        self.permissions.entry(agent.clone()).or_default();
        info!(agent = %agent, "Registered agent with security manager");
    }

    /// Forget an agent and all of its permissions
    pub fn remove_agent(&self, agent: &AgentId) -> bool {
        let removed = self.permissions.remove(agent).is_some();
        if removed {
            info!(agent = %agent, "Removed agent from security manager");
        }
        removed
    }

    pub fn is_registered(&self, agent: &AgentId) -> bool {
        self.permissions.contains_key(agent)
    }

    /// Registered agent ids, sorted
    pub fn registered_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self
            .permissions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        agents.sort();
        agents
    }

    pub fn grant_permission(&self, agent: &AgentId, permission: impl Into<String>) {
        let permission = permission.into();
        debug!(agent = %agent, permission = %permission, "Granted permission");
        self.permissions
            .entry(agent.clone())
            .or_default()
            .insert(permission);
    }

    /// Returns whether the permission was held
    pub fn revoke_permission(&self, agent: &AgentId, permission: &str) -> bool {
        let revoked = self
            .permissions
            .get_mut(agent)
            .is_some_and(|mut granted| granted.remove(permission));
        if revoked {
            debug!(agent = %agent, permission, "Revoked permission");
        }
        revoked
    }

    pub fn has_permission(&self, agent: &AgentId, permission: &str) -> bool {
        self.permissions
            .get(agent)
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Permissions held by `agent`, sorted; empty when unregistered
    pub fn agent_permissions(&self, agent: &AgentId) -> Vec<String> {
        let mut granted: Vec<String> = self
            .permissions
            .get(agent)
            .map(|granted| granted.iter().cloned().collect())
            .unwrap_or_default();
        granted.sort();
        granted
    }

    /// Encrypt `plaintext` so that only `receiver` can open it
    pub fn encrypt(
        &self,
        sender: &AgentId,
        receiver: &AgentId,
        plaintext: &[u8],
    ) -> SecurityResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: receiver.as_str().as_bytes(),
        };
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| SecurityError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);

        debug!(sender = %sender, receiver = %receiver, bytes = plaintext.len(), "Encrypted payload");
        Ok(output)
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt) for `receiver`
    pub fn decrypt(&self, receiver: &AgentId, data: &[u8]) -> SecurityResult<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(SecurityError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let payload = Payload {
            msg: ciphertext,
            aad: receiver.as_str().as_bytes(),
        };
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|_| {
                warn!(receiver = %receiver, "Payload failed to decrypt");
                SecurityError::DecryptionFailed
            })
    }

    fn mac(&self) -> SecurityResult<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(self.signing_key.as_bytes()).map_err(|e| {
            SecurityError::InvalidKey {
                source_name: "signing key".to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// HMAC-SHA256 over `data`
    pub fn sign(&self, data: &[u8]) -> SecurityResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time check of a signature from [`sign`](Self::sign)
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(data);
        mac.verify_slice(signature).is_ok()
    }

    /// Encrypt for `receiver` and sign the ciphertext
    pub fn seal(
        &self,
        sender: &AgentId,
        receiver: &AgentId,
        plaintext: &[u8],
    ) -> SecurityResult<SecureEnvelope> {
        let ciphertext = self.encrypt(sender, receiver, plaintext)?;
        let signature = self.sign(&ciphertext)?;
        Ok(SecureEnvelope::new(
            sender.clone(),
            receiver.clone(),
            ciphertext,
            signature,
        ))
    }

    /// Verify the envelope signature, then decrypt for its receiver
    pub fn open(&self, envelope: &SecureEnvelope) -> SecurityResult<Vec<u8>> {
        if !self.verify(&envelope.ciphertext, &envelope.signature) {
            warn!(
                sender = %envelope.sender,
                receiver = %envelope.receiver,
                "Envelope signature rejected"
            );
            return Err(SecurityError::InvalidSignature);
        }
        self.decrypt(&envelope.receiver, &envelope.ciphertext)
    }
}

impl fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityManager")
            .field("registered_agents", &self.permissions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> AgentId {
        AgentId::from(s)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let security = SecurityManager::generate();
        let encrypted = security
            .encrypt(&id("sender"), &id("receiver"), b"Test message")
            .unwrap();

        assert_ne!(&encrypted[NONCE_LEN..], b"Test message");
        assert_eq!(encrypted.len(), NONCE_LEN + b"Test message".len() + TAG_LEN);
        assert_eq!(
            security.decrypt(&id("receiver"), &encrypted).unwrap(),
            b"Test message"
        );
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let security = SecurityManager::generate();
        let first = security.encrypt(&id("a"), &id("b"), b"same").unwrap();
        let second = security.encrypt(&id("a"), &id("b"), b"same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_with_wrong_receiver_fails() {
        let security = SecurityManager::generate();
        let encrypted = security.encrypt(&id("a"), &id("b"), b"secret").unwrap();
        assert_eq!(
            security.decrypt(&id("c"), &encrypted),
            Err(SecurityError::DecryptionFailed)
        );
    }

    #[test]
    fn test_decrypt_tampered_or_short_input_fails() {
        let security = SecurityManager::generate();
        let mut encrypted = security.encrypt(&id("a"), &id("b"), b"secret").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        assert!(security.decrypt(&id("b"), &encrypted).is_err());
        assert!(security.decrypt(&id("b"), &[0u8; 10]).is_err());
    }

    #[test]
    fn test_different_keys_cannot_decrypt() {
        let alice = SecurityManager::generate();
        let mallory = SecurityManager::generate();
        let encrypted = alice.encrypt(&id("a"), &id("b"), b"secret").unwrap();
        assert!(mallory.decrypt(&id("b"), &encrypted).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let security = SecurityManager::generate();
        let signature = security.sign(b"Test data for signing").unwrap();

        assert_eq!(signature.len(), 32);
        assert!(security.verify(b"Test data for signing", &signature));
        assert!(!security.verify(b"Modified test data", &signature));
        assert!(!security.verify(b"Test data for signing", &signature[..16]));
    }

    #[test]
    fn test_signature_is_deterministic_per_key() {
        let key = [9u8; 32];
        let a = SecurityManager::new(EncryptionKey::generate(), SigningKey::from_bytes(key));
        let b = SecurityManager::new(EncryptionKey::generate(), SigningKey::from_bytes(key));
        assert_eq!(a.sign(b"payload").unwrap(), b.sign(b"payload").unwrap());
    }

    #[test]
    fn test_registration() {
        let security = SecurityManager::generate();
        security.register_agent(&id("b"));
        security.register_agent(&id("a"));
        assert_eq!(security.registered_agents(), vec![id("a"), id("b")]);
        assert!(security.is_registered(&id("a")));

        assert!(security.remove_agent(&id("a")));
        assert!(!security.remove_agent(&id("a")));
        assert_eq!(security.registered_agents(), vec![id("b")]);
    }

    #[test]
    fn test_permission_management() {
        let security = SecurityManager::generate();
        let agent = id("test-agent");

        security.grant_permission(&agent, "read");
        security.grant_permission(&agent, "admin");
        assert!(security.is_registered(&agent));
        assert!(security.has_permission(&agent, "read"));
        assert_eq!(security.agent_permissions(&agent), vec!["admin", "read"]);

        assert!(security.revoke_permission(&agent, "read"));
        assert!(!security.revoke_permission(&agent, "read"));
        assert!(!security.has_permission(&agent, "read"));
        assert!(!security.has_permission(&id("ghost"), "read"));
        assert!(security.agent_permissions(&id("ghost")).is_empty());
    }

    #[test]
    fn test_reregistering_keeps_permissions() {
        let security = SecurityManager::generate();
        let agent = id("a");
        security.grant_permission(&agent, "write");
        security.register_agent(&agent);
        assert!(security.has_permission(&agent, "write"));

        security.remove_agent(&agent);
        assert!(!security.has_permission(&agent, "write"));
    }

    #[test]
    fn test_seal_and_open() {
        let security = SecurityManager::generate();
        let envelope = security.seal(&id("hub"), &id("sensor"), b"calibrate").unwrap();
        assert_eq!(envelope.sender, id("hub"));
        assert_eq!(envelope.receiver, id("sensor"));
        assert_eq!(security.open(&envelope).unwrap(), b"calibrate");
    }

    #[test]
    fn test_open_rejects_forged_envelope() {
        let security = SecurityManager::generate();
        let mut envelope = security.seal(&id("hub"), &id("sensor"), b"calibrate").unwrap();
        envelope.ciphertext[NONCE_LEN] ^= 0xFF;
        assert_eq!(security.open(&envelope), Err(SecurityError::InvalidSignature));
    }

    #[test]
    fn test_open_rejects_redirected_envelope() {
        let security = SecurityManager::generate();
        let mut envelope = security.seal(&id("hub"), &id("sensor"), b"calibrate").unwrap();
        envelope.receiver = id("intruder");
        assert_eq!(security.open(&envelope), Err(SecurityError::DecryptionFailed));
    }

    #[test]
    fn test_debug_hides_keys() {
        let security = SecurityManager::generate();
        security.register_agent(&id("a"));
        let printed = format!("{:?}", security);
        assert!(printed.contains("registered_agents: 1"));
    }

    proptest! {
        #[test]
        fn prop_encrypt_round_trips(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let security = SecurityManager::generate();
            let encrypted = security.encrypt(&id("a"), &id("b"), &data).unwrap();
            prop_assert_eq!(security.decrypt(&id("b"), &encrypted).unwrap(), data);
        }
    }
}
