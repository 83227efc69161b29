//! cert-importer - keeps cert-manager Certificates imported into AWS Certificate Manager
//!
//! Every cert-manager `Certificate` annotated with [`IMPORT_ANNOTATION`] is
//! mirrored into ACM. A re-issued certificate (higher `status.revision`) is
//! re-imported under the same ARN, and deleting the Certificate deletes the
//! ACM copy before the finalizer is released.
//!
//! # Modules
//!
//! - [`crd`] - Typed binding of the cert-manager Certificate resource
//! - [`pem`] - Leaf/chain splitting of PEM bundles
//! - [`tags`] - ACM tag set reconciliation
//! - [`acm`] - ACM API abstraction and the import/tag/delete gateway
//! - [`cache`] - Identity cache bootstrapped from ACM
//! - [`controller`] - Reconciliation state machine
//! - [`retry`] - Exponential backoff for startup calls
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod acm;
pub mod cache;
pub mod controller;
pub mod crd;
pub mod error;
pub mod pem;
pub mod retry;
pub mod tags;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Resource markers
// =============================================================================
// These keys are shared with certificates imported by earlier releases, so
// changing any of them orphans existing ACM certificates.

/// Annotation that opts a Certificate into ACM import (value must be `"true"`)
pub const IMPORT_ANNOTATION: &str = "legalzoom.com/import-to-acm";

/// Annotation recording the ARN of the imported ACM certificate
pub const ARN_ANNOTATION: &str = "legalzoom.com/cert-importer/acm-arn";

/// Finalizer holding a Certificate until its ACM copy is deleted
pub const FINALIZER: &str = "certificate.legalzoom.com";

/// ACM tag key holding the owning Certificate's `namespace/name`
pub const IDENTITY_TAG: &str = "legalzoom.com/cert-importer/cert-id";

/// ACM tag key holding the last imported Certificate revision
pub const REVISION_TAG: &str = "legalzoom.com/cert-importer/cert-revision";

/// Default number of concurrent reconciliations
pub const DEFAULT_CONCURRENCY: u16 = 5;
