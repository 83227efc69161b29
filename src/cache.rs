//! Identity cache of certificates already imported into ACM
//!
//! Maps a Certificate identity (`namespace/name`) to the ACM certificate
//! carrying that identity tag. Filled once at startup by listing ACM, then
//! kept current by the reconciler after every successful upsert or delete.
//!
//! [`IdentityLocks`] serializes remote writes per identity so two reconciles
//! of the same Certificate cannot both import it.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::acm::{AcmApi, Tags};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{tags, Result};

/// An ACM certificate known to belong to a Certificate resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCertificate {
    /// ACM certificate ARN
    pub arn: String,
    /// Tags as last seen or written
    pub tags: Tags,
}

impl RemoteCertificate {
    /// Revision recorded on the ACM certificate, None if missing or unparsable
    pub fn revision(&self) -> Option<i64> {
        tags::revision_of(&self.tags)
    }
}

/// Identity → ACM certificate map shared by all reconciles
///
/// One lock covers the whole map. Callers get clones, never references, so
/// no guard outlives a method call.
#[derive(Debug, Default)]
pub struct CertificateCache {
    entries: RwLock<HashMap<String, RemoteCertificate>>,
}

impl CertificateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the cache from every identity-tagged certificate in ACM
    ///
    /// Each list page is retried per `policy`; a page that keeps failing
    /// fails the bootstrap. A certificate whose tags cannot be read is
    /// skipped with a warning.
    pub async fn bootstrap(api: &dyn AcmApi, policy: &RetryPolicy) -> Result<Self> {
        let mut entries: HashMap<String, RemoteCertificate> = HashMap::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;
        let mut scanned = 0usize;

        loop {
            let token = next_token.take();
            let page = retry_with_backoff(policy, "list_certificates", || {
                api.list_certificates(token.clone())
            })
            .await?;
            pages += 1;

            for arn in page.arns {
                scanned += 1;
                let tags = match api.list_tags(&arn).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        warn!(arn = %arn, error = %e, "skipping certificate with unreadable tags");
                        continue;
                    }
                };

                let Some(identity) = tags::identity_of(&tags).map(str::to_string) else {
                    continue;
                };

                if let Some(previous) = entries.get(&identity) {
                    warn!(
                        certificate = %identity,
                        previous_arn = %previous.arn,
                        arn = %arn,
                        "identity tagged on more than one ACM certificate, keeping the later one"
                    );
                }
                debug!(certificate = %identity, arn = %arn, "found imported certificate");
                entries.insert(identity, RemoteCertificate { arn, tags });
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        info!(
            pages,
            scanned,
            cached = entries.len(),
            "identity cache bootstrapped from ACM"
        );

        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Look up the ACM certificate for an identity
    pub async fn get(&self, identity: &str) -> Option<RemoteCertificate> {
        self.entries.read().await.get(identity).cloned()
    }

    /// Record (or replace) the ACM certificate for an identity
    pub async fn insert(&self, identity: impl Into<String>, remote: RemoteCertificate) {
        self.entries.write().await.insert(identity.into(), remote);
    }

    /// Forget an identity, returning what was cached
    pub async fn remove(&self, identity: &str) -> Option<RemoteCertificate> {
        self.entries.write().await.remove(identity)
    }

    /// Number of cached identities
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Per-identity mutual exclusion for remote writes
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentityLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an identity
    pub async fn acquire(&self, identity: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is not held while waiting.
        let lock = self
            .locks
            .entry(identity.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry for an identity if nobody holds or waits on it
    pub fn release(&self, identity: &str) {
        self.locks
            .remove_if(identity, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of identities with a lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no lock entries exist
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
