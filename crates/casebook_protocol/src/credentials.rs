//! Opaque device credentials.

use casebook_model::DeviceId;
use serde::{Deserialize, Serialize};

/// The credential header pair carried by every write request.
///
/// The token is opaque at this layer: issuance belongs to the external
/// device-registration service, and the server treats validation as a
/// boolean gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    /// Device identity issued at registration.
    pub device_id: DeviceId,
    /// Opaque credential token.
    pub token: Vec<u8>,
}

impl DeviceCredentials {
    /// Creates a credential pair.
    pub fn new(device_id: DeviceId, token: impl Into<Vec<u8>>) -> Self {
        Self {
            device_id,
            token: token.into(),
        }
    }
}
