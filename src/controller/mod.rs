//! Controller for cert-manager Certificates
//!
//! Watches Certificates and mirrors the marked ones into ACM. Controllers
//! follow the Kubernetes controller pattern with observe-diff-act loops.

mod certificate;

pub use certificate::{
    build_upsert, error_policy, needs_update, reconcile, Context, KubeClient, KubeClientImpl,
    DEFAULT_ERROR_REQUEUE, FIELD_MANAGER,
};
