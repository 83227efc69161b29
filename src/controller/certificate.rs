//! Certificate controller implementation
//!
//! Reconciliation is level-triggered: every pass re-reads the Certificate
//! and decides from current state alone, so a missed or duplicated event
//! never leaves ACM out of step for longer than the next pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::acm::{CertificateGateway, DeleteOutcome, ImportRequest, Tags, UpsertRequest};
use crate::cache::{CertificateCache, IdentityLocks, RemoteCertificate};
use crate::crd::{
    Certificate, CertificateIdentity, CertificateMetadata, ConditionStatus, SecretMaterial,
};
use crate::{pem, tags, Error, ARN_ANNOTATION, FINALIZER};

/// Field manager recorded on metadata patches
pub const FIELD_MANAGER: &str = "cert-importer";

/// Requeue delay after a failed reconciliation
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Trait abstracting Kubernetes client operations for Certificates
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Read a Certificate, None if it does not exist
    async fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Certificate>, Error>;

    /// Read a Secret, None if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Persist finalizers and annotations of a Certificate
    ///
    /// Fails with a conflict if the Certificate changed since
    /// `metadata.resource_version` was read.
    async fn update_metadata(
        &self,
        namespace: &str,
        name: &str,
        metadata: &CertificateMetadata,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Certificate>, Error> {
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_metadata(
        &self,
        namespace: &str,
        name: &str,
        metadata: &CertificateMetadata,
    ) -> Result<(), Error> {
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&metadata.to_patch()),
        )
        .await?;
        Ok(())
    }
}

/// Controller context shared by every reconciliation
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// ACM import/delete operations
    pub gateway: Arc<dyn CertificateGateway>,
    /// Identity → ACM certificate map
    pub cache: Arc<CertificateCache>,
    /// Per-identity locks around remote writes
    pub locks: IdentityLocks,
    /// Requeue delay used by [`error_policy`]
    pub error_requeue: Duration,
}

impl Context {
    /// Create a context with the default error requeue delay
    pub fn new(
        kube: Arc<dyn KubeClient>,
        gateway: Arc<dyn CertificateGateway>,
        cache: Arc<CertificateCache>,
    ) -> Self {
        Self {
            kube,
            gateway,
            cache,
            locks: IdentityLocks::new(),
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    /// Override the requeue delay after errors
    pub fn with_error_requeue(mut self, delay: Duration) -> Self {
        self.error_requeue = delay;
        self
    }
}

/// Decide whether ACM needs a fresh import
///
/// | cached entry | resource revision | result |
/// |---|---|---|
/// | present | present | cached revision lower (or unreadable) |
/// | present | absent | never |
/// | absent | any | Ready is True |
pub fn needs_update(
    entry: Option<&RemoteCertificate>,
    revision: Option<i64>,
    ready: ConditionStatus,
) -> bool {
    match (entry, revision) {
        (Some(remote), Some(revision)) => remote.revision().map_or(true, |cached| cached < revision),
        (Some(_), None) => false,
        (None, _) => ready == ConditionStatus::True,
    }
}

/// Build the upsert for a Certificate's current key material
///
/// Re-imports go to the cached ARN and keep any foreign tags on it.
pub fn build_upsert(
    identity: &str,
    revision: Option<i64>,
    material: &SecretMaterial,
    entry: Option<&RemoteCertificate>,
) -> UpsertRequest {
    let bundle = pem::split_bundle(&material.certificate);
    let empty = Tags::new();
    let existing = entry.map_or(&empty, |remote| &remote.tags);

    UpsertRequest {
        import: ImportRequest {
            certificate: bundle.leaf,
            chain: bundle.chain,
            private_key: material.private_key.clone(),
            arn: entry.map(|remote| remote.arn.clone()),
        },
        tags: tags::reconcile_tags(identity, revision, existing),
    }
}

/// Reconcile a Certificate against ACM
///
/// The object handed in by the watcher only supplies the identity; the
/// Certificate is fetched again so decisions use the latest state.
#[instrument(
    skip(certificate, ctx),
    fields(namespace = ?certificate.namespace(), certificate = %certificate.name_any())
)]
pub async fn reconcile(certificate: Arc<Certificate>, ctx: Arc<Context>) -> Result<Action, Error> {
    let identity = certificate.identity()?;

    let Some(current) = ctx
        .kube
        .get_certificate(&identity.namespace, &identity.name)
        .await?
    else {
        debug!("certificate no longer exists");
        return Ok(Action::await_change());
    };

    if current.is_deleting() {
        if current.has_finalizer(FINALIZER) {
            finalize(&current, &identity, &ctx).await?;
        } else {
            debug!("certificate deleting without our finalizer");
        }
        return Ok(Action::await_change());
    }

    if !current.is_managed() {
        debug!("certificate not marked for import");
        return Ok(Action::await_change());
    }

    // Metadata converges even when the import fails: ACM may already hold
    // the certificate, and only the finalizer guarantees it gets deleted.
    let synced = sync_remote(&current, &identity, &ctx).await;
    let remote = match &synced {
        Ok(remote) => remote.clone(),
        Err(_) => ctx.cache.get(&identity.to_string()).await,
    };
    let converged = converge_metadata(&current, &identity, remote.as_ref(), &ctx).await;

    match (synced, converged) {
        (Ok(_), Ok(())) => Ok(Action::await_change()),
        (Err(sync_err), Err(metadata_err)) => {
            warn!(error = %metadata_err, "metadata update failed after failed import");
            Err(sync_err)
        }
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
    }
}

/// Error policy for the controller
///
/// Every failure is requeued after the configured delay. The failed pass
/// left the cache consistent with ACM, so the retry re-derives what to do.
pub fn error_policy(certificate: Arc<Certificate>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        namespace = ?certificate.namespace(),
        certificate = %certificate.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

/// Import into ACM if the cached copy is stale
///
/// Returns the cache entry for the identity after the pass.
async fn sync_remote(
    certificate: &Certificate,
    identity: &CertificateIdentity,
    ctx: &Context,
) -> Result<Option<RemoteCertificate>, Error> {
    let key = identity.to_string();
    let revision = certificate.revision();
    let ready = certificate.ready_status();

    let entry = ctx.cache.get(&key).await;
    if !needs_update(entry.as_ref(), revision, ready) {
        debug!(?revision, %ready, "ACM copy is current");
        return Ok(entry);
    }

    let _guard = ctx.locks.acquire(&key).await;

    // Another pass may have imported while we waited for the lock.
    let entry = ctx.cache.get(&key).await;
    if !needs_update(entry.as_ref(), revision, ready) {
        debug!(?revision, "ACM copy updated by a concurrent pass");
        return Ok(entry);
    }

    let secret_name = &certificate.spec.secret_name;
    let Some(secret) = ctx.kube.get_secret(&identity.namespace, secret_name).await? else {
        warn!(secret = %secret_name, "TLS secret not found, skipping import");
        return Ok(entry);
    };
    let Some(material) = SecretMaterial::from_secret(&secret) else {
        warn!(secret = %secret_name, "TLS secret lacks tls.crt or tls.key, skipping import");
        return Ok(entry);
    };

    let request = build_upsert(&key, revision, &material, entry.as_ref());
    let response = ctx.gateway.upsert(request).await?;

    info!(arn = %response.arn, ?revision, "certificate imported into ACM");

    let remote = RemoteCertificate {
        arn: response.arn,
        tags: response.tags,
    };
    ctx.cache.insert(key, remote.clone()).await;
    Ok(Some(remote))
}

/// Make sure the finalizer and ARN annotation are on the Certificate
async fn converge_metadata(
    certificate: &Certificate,
    identity: &CertificateIdentity,
    remote: Option<&RemoteCertificate>,
    ctx: &Context,
) -> Result<(), Error> {
    let mut metadata = CertificateMetadata::of(certificate);
    let mut changed = metadata.ensure_finalizer(FINALIZER);

    if let Some(remote) = remote {
        if certificate.annotations().get(ARN_ANNOTATION) != Some(&remote.arn) {
            metadata
                .annotations
                .insert(ARN_ANNOTATION.to_string(), remote.arn.clone());
            changed = true;
        }
    }

    if !changed {
        return Ok(());
    }

    ctx.kube
        .update_metadata(&identity.namespace, &identity.name, &metadata)
        .await?;
    debug!("certificate metadata updated");
    Ok(())
}

/// Delete the ACM copy and release the finalizer
async fn finalize(
    certificate: &Certificate,
    identity: &CertificateIdentity,
    ctx: &Context,
) -> Result<(), Error> {
    let key = identity.to_string();

    {
        let _guard = ctx.locks.acquire(&key).await;
        match ctx.cache.get(&key).await {
            Some(remote) => {
                match ctx.gateway.delete(&remote.arn).await? {
                    DeleteOutcome::Deleted => info!(arn = %remote.arn, "ACM certificate deleted"),
                    DeleteOutcome::NotFound => {
                        info!(arn = %remote.arn, "ACM certificate already gone")
                    }
                }
                ctx.cache.remove(&key).await;
            }
            None => debug!("no ACM certificate recorded, skipping remote delete"),
        }
    }
    ctx.locks.release(&key);

    let mut metadata = CertificateMetadata::of(certificate);
    metadata.remove_finalizer(FINALIZER);
    ctx.kube
        .update_metadata(&identity.namespace, &identity.name, &metadata)
        .await?;

    info!("finalizer removed");
    Ok(())
}
