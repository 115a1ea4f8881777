//! Discovery record and its wire form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::ServingPayload;

/// Service type advertised for the content host.
pub const SERVICE_TYPE: &str = "_content-host._tcp";

/// What other devices learn about this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    pub service_type: String,
    /// Unique per host process.
    pub instance: String,
    pub port: u16,
    /// Extra attributes, sorted for stable output.
    #[serde(default)]
    pub txt: BTreeMap<String, String>,
}

impl DiscoveryRecord {
    #[must_use]
    pub fn new(instance: impl Into<String>, port: u16) -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            instance: instance.into(),
            port,
            txt: BTreeMap::new(),
        }
    }

    /// Record for a SERVING payload. The zip port, when present, travels as
    /// the `zip_port` attribute.
    #[must_use]
    pub fn for_payload(instance: impl Into<String>, payload: ServingPayload) -> Self {
        let mut record = Self::new(instance, payload.port);
        if let Some(zip_port) = payload.zip_port {
            record.txt.insert("zip_port".to_string(), zip_port.to_string());
        }
        record
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.txt.insert(key.into(), value.into());
        self
    }
}

/// Datagram sent by [`UdpAnnouncer`](crate::UdpAnnouncer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Announcement {
    Hello { record: DiscoveryRecord },
    Goodbye { instance: String },
}

impl Announcement {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
