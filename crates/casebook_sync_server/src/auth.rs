//! Device credential gate.
//!
//! Token issuance belongs to the external device-registration service; this
//! module only answers "is this credential pair valid" as a boolean gate.
//! The HMAC gate mirrors the registration service's token format:
//!
//! - 16 bytes: device_id
//! - 8 bytes: timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature
//!
//! Total: 56 bytes, opaque to every other layer.

use casebook_model::DeviceId;
use casebook_protocol::DeviceCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Boolean validation gate for device credentials.
pub trait CredentialGate: Send + Sync {
    /// Returns true if the credential pair is valid.
    fn check(&self, credentials: &DeviceCredentials) -> bool;
}

/// A gate that accepts every credential. For tests and local development.
#[derive(Debug, Default)]
pub struct AllowAllGate;

impl CredentialGate for AllowAllGate {
    fn check(&self, _credentials: &DeviceCredentials) -> bool {
        true
    }
}

/// A gate comparing the token against a shared secret. No expiry.
#[derive(Clone)]
pub struct StaticSecretGate {
    secret: Vec<u8>,
}

impl StaticSecretGate {
    /// Creates a gate with the given shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialGate for StaticSecretGate {
    fn check(&self, credentials: &DeviceCredentials) -> bool {
        credentials.token == self.secret
    }
}

/// HMAC-SHA256 token gate with expiry checking.
#[derive(Clone)]
pub struct HmacTokenGate {
    secret: Vec<u8>,
    token_expiry: Duration,
}

impl HmacTokenGate {
    /// Creates a gate with a 24-hour token expiry.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiry.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Issues a token for a device.
    ///
    /// Exposed so tests and local setups can mint valid credentials; the
    /// production issuer lives in the registration service.
    pub fn issue(&self, device_id: DeviceId) -> Vec<u8> {
        let timestamp = unix_millis();

        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(device_id.as_uuid().as_bytes());
        data.extend_from_slice(&timestamp.to_be_bytes());

        let signature = self.sign(&data);

        let mut token = data;
        token.extend_from_slice(&signature);
        token
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

impl CredentialGate for HmacTokenGate {
    fn check(&self, credentials: &DeviceCredentials) -> bool {
        let token = &credentials.token;
        if token.len() != 56 {
            return false;
        }

        let device_bytes: [u8; 16] = match token[0..16].try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        if DeviceId::from_uuid(Uuid::from_bytes(device_bytes)) != credentials.device_id {
            return false;
        }

        let expected = self.sign(&token[0..24]);
        if token[24..56] != expected {
            return false;
        }

        let timestamp_bytes: [u8; 8] = match token[16..24].try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let timestamp = u64::from_be_bytes(timestamp_bytes);
        let expiry_millis = self.token_expiry.as_millis() as u64;
        unix_millis() <= timestamp + expiry_millis
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all() {
        let gate = AllowAllGate;
        let creds = DeviceCredentials::new(DeviceId::new(), Vec::new());
        assert!(gate.check(&creds));
    }

    #[test]
    fn static_secret() {
        let gate = StaticSecretGate::new(b"shared-secret".to_vec());
        let device = DeviceId::new();
        assert!(gate.check(&DeviceCredentials::new(device, b"shared-secret".to_vec())));
        assert!(!gate.check(&DeviceCredentials::new(device, b"wrong".to_vec())));
    }

    #[test]
    fn hmac_issue_and_check() {
        let gate = HmacTokenGate::new(b"test-secret-key-32-bytes-long!!".to_vec());
        let device = DeviceId::new();

        let token = gate.issue(device);
        assert_eq!(token.len(), 56);
        assert!(gate.check(&DeviceCredentials::new(device, token)));
    }

    #[test]
    fn hmac_rejects_wrong_device() {
        let gate = HmacTokenGate::new(b"test-secret-key-32-bytes-long!!".to_vec());
        let token = gate.issue(DeviceId::new());
        assert!(!gate.check(&DeviceCredentials::new(DeviceId::new(), token)));
    }

    #[test]
    fn hmac_rejects_tampered_token() {
        let gate = HmacTokenGate::new(b"test-secret-key-32-bytes-long!!".to_vec());
        let device = DeviceId::new();
        let mut token = gate.issue(device);
        token[30] ^= 0xFF;
        assert!(!gate.check(&DeviceCredentials::new(device, token)));
    }

    #[test]
    fn hmac_rejects_expired_token() {
        let gate = HmacTokenGate::new(b"test-secret-key-32-bytes-long!!".to_vec())
            .with_expiry(Duration::from_secs(0));
        let device = DeviceId::new();
        let token = gate.issue(device);
        std::thread::sleep(Duration::from_millis(10));
        assert!(!gate.check(&DeviceCredentials::new(device, token)));
    }
}
