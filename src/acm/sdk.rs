//! [`AcmApi`] implementation on top of `aws-sdk-acm`

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_acm::error::DisplayErrorContext;
use aws_sdk_acm::primitives::Blob;
use aws_sdk_acm::types::{Filters, KeyAlgorithm, Tag};
use aws_sdk_acm::Client;
use tracing::debug;

use super::{AcmApi, CertificatePage, ImportRequest, Tags};
use crate::Error;

/// Connection settings for the ACM client
///
/// Anything left unset falls through to the standard AWS provider chain
/// (environment, profile, IRSA web identity, instance metadata).
#[derive(Clone, Debug, Default)]
pub struct AcmClientConfig {
    /// Region override
    pub region: Option<String>,
    /// Endpoint override, e.g. a LocalStack URL
    pub endpoint_url: Option<String>,
}

/// ACM access through the AWS SDK
#[derive(Clone)]
pub struct SdkAcmApi {
    client: Client,
}

impl SdkAcmApi {
    /// Load AWS configuration and build a client
    pub async fn from_config(config: &AcmClientConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = config.endpoint_url.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        debug!(region = ?shared_config.region(), "loaded AWS configuration");
        Self::new(Client::new(&shared_config))
    }

    /// Wrap an existing SDK client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Listing filter matching every key algorithm
///
/// Without it `ListCertificates` only returns RSA_1024 and RSA_2048
/// certificates, hiding ECDSA and larger RSA keys from the cache.
pub(crate) fn all_key_types() -> Filters {
    Filters::builder()
        .set_key_types(Some(
            KeyAlgorithm::values()
                .iter()
                .map(|value| KeyAlgorithm::from(*value))
                .collect(),
        ))
        .build()
}

fn sdk_error(operation: &'static str, err: impl std::error::Error) -> Error {
    Error::acm(operation, DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl AcmApi for SdkAcmApi {
    async fn list_certificates(
        &self,
        next_token: Option<String>,
    ) -> Result<CertificatePage, Error> {
        let output = self
            .client
            .list_certificates()
            .includes(all_key_types())
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| sdk_error("ListCertificates", e))?;

        let arns = output
            .certificate_summary_list
            .unwrap_or_default()
            .into_iter()
            .filter_map(|summary| summary.certificate_arn)
            .collect();

        Ok(CertificatePage {
            arns,
            next_token: output.next_token.filter(|t| !t.is_empty()),
        })
    }

    async fn list_tags(&self, arn: &str) -> Result<Tags, Error> {
        let output = self
            .client
            .list_tags_for_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error("ListTagsForCertificate", e))?;

        Ok(output
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| {
                let value = tag.value().unwrap_or_default().to_string();
                (tag.key().to_string(), value)
            })
            .collect())
    }

    async fn import_certificate(&self, request: ImportRequest) -> Result<String, Error> {
        let ImportRequest {
            certificate,
            chain,
            private_key,
            arn,
        } = request;

        // ACM rejects a zero-length chain; leaf-only bundles omit it.
        let chain = (!chain.is_empty()).then(|| Blob::new(chain));

        let output = self
            .client
            .import_certificate()
            .certificate(Blob::new(certificate))
            .private_key(Blob::new(private_key))
            .set_certificate_chain(chain)
            .set_certificate_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error("ImportCertificate", e))?;

        output.certificate_arn.ok_or_else(|| {
            Error::acm(
                "ImportCertificate",
                "response did not include a certificate ARN",
            )
        })
    }

    async fn add_tags(&self, arn: &str, tags: Tags) -> Result<(), Error> {
        let tags = tags
            .into_iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| Error::internal(format!("invalid ACM tag: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .add_tags_to_certificate()
            .certificate_arn(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| sdk_error("AddTagsToCertificate", e))?;

        Ok(())
    }

    async fn delete_certificate(&self, arn: &str) -> Result<(), Error> {
        match self
            .client
            .delete_certificate()
            .certificate_arn(arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Err(Error::AcmNotFound(arn.to_string()))
            }
            Err(e) => Err(sdk_error("DeleteCertificate", e)),
        }
    }
}
