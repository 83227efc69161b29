//! ACM tag set reconciliation
//!
//! The importer owns two tag keys on every certificate it imports:
//! [`IDENTITY_TAG`] and [`REVISION_TAG`]. Both are recomputed on every
//! import. Any other tag (added by people or other tooling) is carried over
//! unchanged so a re-import never strips it.

use crate::acm::Tags;
use crate::{IDENTITY_TAG, REVISION_TAG};

/// Build the tag set to upload for an import
///
/// A missing revision is recorded as `0`.
pub fn reconcile_tags(identity: &str, revision: Option<i64>, existing: &Tags) -> Tags {
    let mut tags: Tags = existing
        .iter()
        .filter(|(key, _)| !is_owned(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    tags.insert(IDENTITY_TAG.to_string(), identity.to_string());
    tags.insert(
        REVISION_TAG.to_string(),
        revision.unwrap_or_default().to_string(),
    );
    tags
}

/// Revision recorded in a tag set
///
/// None when the tag is missing or not an integer.
pub fn revision_of(tags: &Tags) -> Option<i64> {
    tags.get(REVISION_TAG)?.trim().parse().ok()
}

/// Identity recorded in a tag set
pub fn identity_of(tags: &Tags) -> Option<&str> {
    tags.get(IDENTITY_TAG).map(String::as_str)
}

fn is_owned(key: &str) -> bool {
    key == IDENTITY_TAG || key == REVISION_TAG
}
