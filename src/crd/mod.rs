//! Resource bindings used by the importer
//!
//! The importer does not install any CRDs of its own; it reads cert-manager
//! Certificates and their TLS Secrets.

mod certificate;
mod types;

pub use certificate::{
    Certificate, CertificateIdentity, CertificateMetadata, CertificateSpec, CertificateStatus,
};
pub use types::{
    CertificateCondition, ConditionStatus, SecretMaterial, TLS_CERT_KEY, TLS_KEY_KEY,
};
