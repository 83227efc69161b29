//! cert-manager Certificate binding
//!
//! The Certificate kind is owned by cert-manager. This binding only models
//! the fields the importer reads; unknown fields are ignored on deserialize.

use std::collections::BTreeMap;
use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CertificateCondition, ConditionStatus};
use crate::{Error, IMPORT_ANNOTATION};

/// Specification of a cert-manager Certificate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    plural = "certificates",
    status = "CertificateStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Name of the Secret that receives the issued key pair
    pub secret_name: String,
}

/// Status reported by cert-manager
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    /// Conditions (Ready, Issuing)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CertificateCondition>,

    /// Issuance counter, incremented every time cert-manager re-issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

impl Certificate {
    /// True when the Certificate opts into ACM import
    pub fn is_managed(&self) -> bool {
        self.annotations()
            .get(IMPORT_ANNOTATION)
            .is_some_and(|v| v == "true")
    }

    /// True once deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True if the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Issuance revision reported by cert-manager
    pub fn revision(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.revision)
    }

    /// Status of the Ready condition, Unknown when absent
    pub fn ready_status(&self) -> ConditionStatus {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == "Ready"))
            .map(|c| c.status)
            .unwrap_or_default()
    }

    /// Identity of this Certificate
    pub fn identity(&self) -> Result<CertificateIdentity, Error> {
        let namespace = self.namespace().ok_or_else(|| {
            Error::validation(format!("certificate {} has no namespace", self.name_any()))
        })?;
        Ok(CertificateIdentity::new(namespace, self.name_any()))
    }
}

/// `(namespace, name)` of a Certificate
///
/// Renders as `namespace/name`, which is the cache key and the value of the
/// identity tag in ACM.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificateIdentity {
    /// Namespace of the Certificate
    pub namespace: String,
    /// Name of the Certificate
    pub name: String,
}

impl CertificateIdentity {
    /// Create an identity from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CertificateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The parts of Certificate metadata this controller writes
///
/// Persisted as a merge patch that carries `resourceVersion`, so a write
/// based on a stale read fails with a conflict instead of clobbering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateMetadata {
    /// resourceVersion the change was computed from
    pub resource_version: Option<String>,
    /// Complete finalizer list
    pub finalizers: Vec<String>,
    /// Annotations to set; keys not listed are left alone
    pub annotations: BTreeMap<String, String>,
}

impl CertificateMetadata {
    /// Snapshot the writable metadata of a Certificate
    pub fn of(certificate: &Certificate) -> Self {
        Self {
            resource_version: certificate.resource_version(),
            finalizers: certificate.finalizers().to_vec(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add a finalizer if missing; returns true if anything changed
    pub fn ensure_finalizer(&mut self, finalizer: &str) -> bool {
        if self.finalizers.iter().any(|f| f == finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer; returns true if anything changed
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Build the JSON merge patch body
    pub fn to_patch(&self) -> serde_json::Value {
        let mut metadata = serde_json::json!({
            "finalizers": self.finalizers,
        });
        if let Some(ref rv) = self.resource_version {
            metadata["resourceVersion"] = serde_json::json!(rv);
        }
        if !self.annotations.is_empty() {
            metadata["annotations"] = serde_json::json!(self.annotations);
        }
        serde_json::json!({ "metadata": metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FINALIZER;
    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn sample_certificate() -> Certificate {
        let mut cert = Certificate::new(
            "web",
            CertificateSpec {
                secret_name: "web-tls".to_string(),
                ..Default::default()
            },
        );
        cert.metadata.namespace = Some("prod".to_string());
        cert
    }

    fn with_ready(mut cert: Certificate, status: ConditionStatus) -> Certificate {
        cert.status = Some(CertificateStatus {
            conditions: vec![CertificateCondition {
                type_: "Ready".to_string(),
                status,
                reason: None,
                message: None,
                last_transition_time: None,
                observed_generation: None,
            }],
            revision: Some(3),
            ..Default::default()
        });
        cert
    }

    #[test]
    fn identity_renders_namespace_slash_name() {
        let identity = sample_certificate().identity().expect("identity");
        assert_eq!(identity.to_string(), "prod/web");
    }

    #[test]
    fn identity_requires_namespace() {
        let mut cert = sample_certificate();
        cert.metadata.namespace = None;
        assert!(matches!(cert.identity(), Err(Error::Validation(_))));
    }

    #[test]
    fn management_flag_requires_literal_true() {
        let mut cert = sample_certificate();
        assert!(!cert.is_managed());

        cert.annotations_mut()
            .insert(IMPORT_ANNOTATION.to_string(), "yes".to_string());
        assert!(!cert.is_managed());

        cert.annotations_mut()
            .insert(IMPORT_ANNOTATION.to_string(), "true".to_string());
        assert!(cert.is_managed());
    }

    #[test]
    fn ready_status_defaults_to_unknown() {
        assert_eq!(sample_certificate().ready_status(), ConditionStatus::Unknown);
        assert_eq!(
            with_ready(sample_certificate(), ConditionStatus::True).ready_status(),
            ConditionStatus::True
        );
        assert_eq!(
            with_ready(sample_certificate(), ConditionStatus::False).ready_status(),
            ConditionStatus::False
        );
    }

    #[test]
    fn deletion_and_finalizer_flags() {
        let mut cert = sample_certificate();
        assert!(!cert.is_deleting());
        assert!(!cert.has_finalizer(FINALIZER));

        cert.metadata.deletion_timestamp = Some(Time(Utc::now()));
        cert.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        assert!(cert.is_deleting());
        assert!(cert.has_finalizer(FINALIZER));
    }

    #[test]
    fn status_deserializes_from_cert_manager_json() {
        let cert: Certificate = serde_json::from_value(serde_json::json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Certificate",
            "metadata": { "name": "web", "namespace": "prod" },
            "spec": {
                "secretName": "web-tls",
                "dnsNames": ["web.example.com"],
                "issuerRef": { "name": "letsencrypt", "kind": "ClusterIssuer" },
                "privateKey": { "rotationPolicy": "Always" }
            },
            "status": {
                "revision": 7,
                "notAfter": "2026-01-01T00:00:00Z",
                "conditions": [
                    { "type": "Ready", "status": "True", "reason": "Ready",
                      "lastTransitionTime": "2025-10-01T00:00:00Z", "observedGeneration": 2 }
                ]
            }
        }))
        .expect("deserialize");

        assert_eq!(cert.revision(), Some(7));
        assert_eq!(cert.ready_status(), ConditionStatus::True);
        assert_eq!(cert.spec.secret_name, "web-tls");
    }

    mod metadata_patch {
        use super::*;

        #[test]
        fn ensure_finalizer_is_idempotent() {
            let mut metadata = CertificateMetadata::default();
            assert!(metadata.ensure_finalizer(FINALIZER));
            assert!(!metadata.ensure_finalizer(FINALIZER));
            assert_eq!(metadata.finalizers, vec![FINALIZER.to_string()]);
        }

        #[test]
        fn remove_finalizer_keeps_foreign_finalizers() {
            let mut metadata = CertificateMetadata {
                finalizers: vec!["other.io/hold".to_string(), FINALIZER.to_string()],
                ..Default::default()
            };
            assert!(metadata.remove_finalizer(FINALIZER));
            assert!(!metadata.remove_finalizer(FINALIZER));
            assert_eq!(metadata.finalizers, vec!["other.io/hold".to_string()]);
        }

        #[test]
        fn patch_carries_resource_version_and_annotations() {
            let mut metadata = CertificateMetadata {
                resource_version: Some("42".to_string()),
                ..Default::default()
            };
            metadata.ensure_finalizer(FINALIZER);
            metadata
                .annotations
                .insert("a".to_string(), "b".to_string());

            let patch = metadata.to_patch();
            assert_eq!(patch["metadata"]["resourceVersion"], "42");
            assert_eq!(patch["metadata"]["finalizers"][0], FINALIZER);
            assert_eq!(patch["metadata"]["annotations"]["a"], "b");
        }

        #[test]
        fn patch_with_no_finalizers_sends_empty_list() {
            let patch = CertificateMetadata::default().to_patch();
            assert_eq!(patch["metadata"]["finalizers"], serde_json::json!([]));
            assert!(patch["metadata"].get("annotations").is_none());
            assert!(patch["metadata"].get("resourceVersion").is_none());
        }
    }
}
