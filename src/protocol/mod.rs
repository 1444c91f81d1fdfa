//! OTS wire protocol: signing, request/response headers and protobuf messages.

pub mod headers;
pub mod signer;
pub mod wire;

use std::collections::BTreeMap;
use std::fmt;

use hmac::digest::InvalidLength;

pub use signer::Signer;

use crate::logging::mask_secret;

/// Header map with one value per key. Response headers are stored with
/// lower-cased keys.
pub type Headers = BTreeMap<String, String>;

/// Account credentials, immutable for the lifetime of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: String,
    pub instance_name: String,
}

impl Credentials {
    pub fn new(access_id: impl Into<String>, access_key: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: access_key.into(),
            instance_name: instance_name.into(),
        }
    }

    pub fn signer(&self) -> Result<Signer, InvalidLength> {
        Signer::new(self.access_id.clone(), &self.access_key)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("access_key", &mask_secret(&self.access_key))
            .field("instance_name", &self.instance_name)
            .finish()
    }
}
