//! AWS Certificate Manager access
//!
//! Two layers:
//! - [`AcmApi`] mirrors the five ACM calls the importer uses, one method per
//!   call. [`sdk::SdkAcmApi`] implements it with `aws-sdk-acm`.
//! - [`CertificateGateway`] is what the reconciler talks to. ACM only accepts
//!   tags on a separate call, so [`AcmGateway`] composes import + tag into a
//!   single upsert.

pub mod sdk;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// ACM tag set (key → value)
pub type Tags = BTreeMap<String, String>;

/// One page of `ListCertificates`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificatePage {
    /// Certificate ARNs on this page
    pub arns: Vec<String>,
    /// Token for the next page, None on the last page
    pub next_token: Option<String>,
}

/// Input to `ImportCertificate`
#[derive(Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// PEM leaf certificate
    pub certificate: Vec<u8>,
    /// PEM chain; empty means no chain
    pub chain: Vec<u8>,
    /// PEM private key
    pub private_key: Vec<u8>,
    /// ARN to re-import into, None for a new certificate
    pub arn: Option<String>,
}

impl fmt::Debug for ImportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRequest")
            .field("certificate_len", &self.certificate.len())
            .field("chain_len", &self.chain.len())
            .field("private_key", &"<redacted>")
            .field("arn", &self.arn)
            .finish()
    }
}

/// Input to [`CertificateGateway::upsert`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertRequest {
    /// Certificate material and target ARN
    pub import: ImportRequest,
    /// Complete tag set to apply after import
    pub tags: Tags,
}

/// Result of a successful upsert
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertResponse {
    /// ARN of the imported certificate
    pub arn: String,
    /// Tags applied to it
    pub tags: Tags,
}

/// Outcome of a delete that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// ACM deleted the certificate
    Deleted,
    /// ACM had no such certificate
    NotFound,
}

/// Raw ACM operations used by the importer
///
/// This trait allows mocking ACM in tests while using the AWS SDK in
/// production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AcmApi: Send + Sync {
    /// List one page of certificates
    async fn list_certificates(&self, next_token: Option<String>)
        -> Result<CertificatePage, Error>;

    /// Fetch the tags of a certificate
    async fn list_tags(&self, arn: &str) -> Result<Tags, Error>;

    /// Import (or re-import) a certificate without tags, returning its ARN
    async fn import_certificate(&self, request: ImportRequest) -> Result<String, Error>;

    /// Add or overwrite tags on a certificate
    async fn add_tags(&self, arn: &str, tags: Tags) -> Result<(), Error>;

    /// Delete a certificate
    ///
    /// Returns [`Error::AcmNotFound`] if the certificate does not exist.
    async fn delete_certificate(&self, arn: &str) -> Result<(), Error>;
}

/// Certificate operations the reconciler depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertificateGateway: Send + Sync {
    /// Import a certificate and tag it
    ///
    /// If the import succeeds but tagging fails, the certificate exists in
    /// ACM with stale or no tags and the error is returned. Callers must not
    /// record the import.
    async fn upsert(&self, request: UpsertRequest) -> Result<UpsertResponse, Error>;

    /// Delete a certificate, reporting an absent one as [`DeleteOutcome::NotFound`]
    async fn delete(&self, arn: &str) -> Result<DeleteOutcome, Error>;
}

/// [`CertificateGateway`] backed by an [`AcmApi`]
pub struct AcmGateway {
    api: Arc<dyn AcmApi>,
}

impl AcmGateway {
    /// Create a gateway over the given ACM API
    pub fn new(api: Arc<dyn AcmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CertificateGateway for AcmGateway {
    async fn upsert(&self, request: UpsertRequest) -> Result<UpsertResponse, Error> {
        let UpsertRequest { import, tags } = request;

        let arn = self.api.import_certificate(import).await?;
        debug!(arn = %arn, "imported certificate");

        if let Err(e) = self.api.add_tags(&arn, tags.clone()).await {
            warn!(arn = %arn, error = %e, "certificate imported but tagging failed");
            return Err(e);
        }

        Ok(UpsertResponse { arn, tags })
    }

    async fn delete(&self, arn: &str) -> Result<DeleteOutcome, Error> {
        match self.api.delete_certificate(arn).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(Error::AcmNotFound(_)) => {
                debug!(arn = %arn, "certificate already absent from ACM");
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    const ARN: &str = "arn:aws:acm:us-east-1:111122223333:certificate/abc";

    fn request(arn: Option<&str>) -> UpsertRequest {
        UpsertRequest {
            import: ImportRequest {
                certificate: b"leaf".to_vec(),
                chain: b"chain\n".to_vec(),
                private_key: b"key".to_vec(),
                arn: arn.map(str::to_string),
            },
            tags: Tags::from([("k".to_string(), "v".to_string())]),
        }
    }

    #[tokio::test]
    async fn upsert_imports_untagged_then_tags_returned_arn() {
        let mut api = MockAcmApi::new();
        let mut seq = Sequence::new();
        api.expect_import_certificate()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.arn.is_none() && req.certificate == b"leaf")
            .returning(|_| Ok(ARN.to_string()));
        api.expect_add_tags()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|arn, tags| {
                arn.to_string() == ARN && tags.get("k").map(String::as_str) == Some("v")
            })
            .returning(|_, _| Ok(()));

        let gateway = AcmGateway::new(Arc::new(api));
        let response = gateway.upsert(request(None)).await.expect("upsert");

        assert_eq!(response.arn, ARN);
        assert_eq!(response.tags.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn upsert_reimports_into_known_arn() {
        let mut api = MockAcmApi::new();
        api.expect_import_certificate()
            .withf(|req| req.arn.as_deref() == Some(ARN))
            .returning(|_| Ok(ARN.to_string()));
        api.expect_add_tags().returning(|_, _| Ok(()));

        let gateway = AcmGateway::new(Arc::new(api));
        assert_eq!(gateway.upsert(request(Some(ARN))).await.unwrap().arn, ARN);
    }

    #[tokio::test]
    async fn upsert_fails_when_tagging_fails_after_import() {
        let mut api = MockAcmApi::new();
        api.expect_import_certificate()
            .times(1)
            .returning(|_| Ok(ARN.to_string()));
        api.expect_add_tags()
            .times(1)
            .returning(|_, _| Err(Error::acm("AddTagsToCertificate", "throttled")));

        let gateway = AcmGateway::new(Arc::new(api));
        let err = gateway.upsert(request(None)).await.unwrap_err();
        assert!(err.to_string().contains("AddTagsToCertificate"));
    }

    #[tokio::test]
    async fn upsert_skips_tagging_when_import_fails() {
        let mut api = MockAcmApi::new();
        api.expect_import_certificate()
            .returning(|_| Err(Error::acm("ImportCertificate", "invalid PEM")));
        api.expect_add_tags().never();

        let gateway = AcmGateway::new(Arc::new(api));
        assert!(gateway.upsert(request(None)).await.is_err());
    }

    #[tokio::test]
    async fn delete_maps_not_found_to_outcome() {
        let mut api = MockAcmApi::new();
        api.expect_delete_certificate()
            .with(eq(ARN))
            .returning(|arn| Err(Error::AcmNotFound(arn.to_string())));

        let gateway = AcmGateway::new(Arc::new(api));
        assert_eq!(gateway.delete(ARN).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn delete_reports_success_and_propagates_other_errors() {
        let mut api = MockAcmApi::new();
        let mut seq = Sequence::new();
        api.expect_delete_certificate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        api.expect_delete_certificate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::acm("DeleteCertificate", "ResourceInUseException")));

        let gateway = AcmGateway::new(Arc::new(api));
        assert_eq!(gateway.delete(ARN).await.unwrap(), DeleteOutcome::Deleted);
        assert!(gateway.delete(ARN).await.is_err());
    }

    #[test]
    fn import_request_debug_hides_private_key() {
        let rendered = format!("{:?}", request(None).import);
        assert!(!rendered.contains("key\""));
        assert!(rendered.contains("redacted"));
    }
}
