//! Shared types for the cert-manager Certificate binding

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Secret data key holding the PEM certificate bundle
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition reported by cert-manager on a Certificate
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateCondition {
    /// Type of condition (e.g., Ready, Issuing)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Generation observed when the condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Key material read from a Certificate's TLS Secret
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial {
    /// PEM bundle: leaf certificate followed by the chain
    pub certificate: Vec<u8>,
    /// PEM private key
    pub private_key: Vec<u8>,
}

impl SecretMaterial {
    /// Extract `tls.crt` and `tls.key` from a Secret
    ///
    /// Returns None when either key is missing or empty.
    pub fn from_secret(secret: &Secret) -> Option<Self> {
        let data = secret.data.as_ref()?;
        Self::from_data(data.iter().map(|(k, v)| (k.as_str(), v.0.as_slice())))
    }

    fn from_data<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> Option<Self> {
        let map: BTreeMap<&str, &[u8]> = entries.collect();
        let certificate = map.get(TLS_CERT_KEY).filter(|v| !v.is_empty())?;
        let private_key = map.get(TLS_KEY_KEY).filter(|v| !v.is_empty())?;
        Some(Self {
            certificate: certificate.to_vec(),
            private_key: private_key.to_vec(),
        })
    }
}

// Private key bytes never reach logs.
impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
