mod payload;

pub use payload::{CallbackPayload, CallbackStatus};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;

/// AES-192 key length taken from the client secret.
pub const KEY_LEN: usize = 24;
/// CBC initialization vector length taken from the client id.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature verification failed")]
    Authentication,
    #[error("webhook payload could not be decrypted: {0}")]
    Decryption(String),
    #[error("decrypted webhook payload is not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("webhook body is not a valid envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    #[error("webhook credentials are unusable: {0}")]
    Configuration(String),
}

/// Body of an Akool callback as it arrives over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub timestamp: i64,
    pub nonce: String,
    pub data_encrypt: String,
    pub signature: String,
}

impl WebhookEnvelope {
    pub fn from_json(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(WebhookError::MalformedEnvelope)
    }
}

/// Client id / secret pair issued by Akool for one integration.
#[derive(Clone)]
pub struct AkoolCredentials {
    client_id: String,
    client_secret: String,
}

impl AkoolCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, WebhookError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(WebhookError::Configuration("client id is empty".into()));
        }
        if client_secret.is_empty() {
            return Err(WebhookError::Configuration("client secret is empty".into()));
        }
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Key and IV are the leading bytes of the secret and the client id.
    /// They are never padded: short credentials are a configuration problem.
    fn key_iv(&self) -> Result<(&[u8], &[u8]), WebhookError> {
        let key = self.client_secret.as_bytes();
        let iv = self.client_id.as_bytes();
        if key.len() < KEY_LEN {
            return Err(WebhookError::Configuration(format!(
                "client secret is {} bytes, AES-192 needs at least {}",
                key.len(),
                KEY_LEN
            )));
        }
        if iv.len() < IV_LEN {
            return Err(WebhookError::Configuration(format!(
                "client id is {} bytes, the IV needs at least {}",
                iv.len(),
                IV_LEN
            )));
        }
        Ok((&key[..KEY_LEN], &iv[..IV_LEN]))
    }
}

impl std::fmt::Debug for AkoolCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AkoolCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// SHA-1 over the four fields sorted as strings and joined without separators.
pub fn sign(client_id: &str, timestamp: i64, nonce: &str, data_encrypt: &str) -> String {
    let timestamp = timestamp.to_string();
    let mut parts = [client_id, timestamp.as_str(), nonce, data_encrypt];
    parts.sort_unstable();
    hex::encode(Sha1::digest(parts.concat().as_bytes()))
}

/// Stateless verifier/decryptor for Akool callbacks.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    credentials: AkoolCredentials,
}

impl WebhookVerifier {
    pub fn new(credentials: AkoolCredentials) -> Self {
        Self { credentials }
    }

    pub fn client_id(&self) -> &str {
        self.credentials.client_id()
    }

    pub fn verify_signature(&self, envelope: &WebhookEnvelope) -> Result<(), WebhookError> {
        if let Some(client_id) = envelope.client_id.as_deref()
            && client_id != self.credentials.client_id
        {
            debug!("Rejecting envelope addressed to foreign client id");
            return Err(WebhookError::Authentication);
        }

        let expected = sign(
            &self.credentials.client_id,
            envelope.timestamp,
            &envelope.nonce,
            &envelope.data_encrypt,
        );
        let supplied = envelope.signature.trim().to_ascii_lowercase();
        if bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(WebhookError::Authentication)
        }
    }

    pub fn decrypt(&self, data_encrypt: &str) -> Result<Vec<u8>, WebhookError> {
        let (key, iv) = self.credentials.key_iv()?;
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(data_encrypt.trim())
            .map_err(|e| WebhookError::Decryption(format!("base64 decode failed: {}", e)))?;

        let cipher = Aes192CbcDec::new_from_slices(key, iv)
            .map_err(|e| WebhookError::Configuration(e.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| WebhookError::Decryption("bad padding or wrong secret".into()))
    }

    /// Verify, decrypt and parse one envelope. Stages run in that order and
    /// the first failure wins.
    pub fn open(&self, envelope: &WebhookEnvelope) -> Result<serde_json::Value, WebhookError> {
        self.verify_signature(envelope)?;
        let plaintext = self.decrypt(&envelope.data_encrypt)?;
        serde_json::from_slice(&plaintext).map_err(WebhookError::MalformedPayload)
    }

    /// Build a signed envelope around `plaintext`, the way Akool would.
    pub fn seal(
        &self,
        plaintext: &str,
        timestamp: i64,
        nonce: &str,
    ) -> Result<WebhookEnvelope, WebhookError> {
        let (key, iv) = self.credentials.key_iv()?;
        let cipher = Aes192CbcEnc::new_from_slices(key, iv)
            .map_err(|e| WebhookError::Configuration(e.to_string()))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        let data_encrypt = base64::engine::general_purpose::STANDARD.encode(ciphertext);
        let signature = sign(&self.credentials.client_id, timestamp, nonce, &data_encrypt);

        Ok(WebhookEnvelope {
            client_id: Some(self.credentials.client_id.clone()),
            timestamp,
            nonce: nonce.to_string(),
            data_encrypt,
            signature,
        })
    }
}

#[cfg(test)]
mod tests;
