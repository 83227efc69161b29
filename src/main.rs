//! cert-importer - mirrors cert-manager Certificates into AWS Certificate Manager

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use cert_importer::acm::sdk::{AcmClientConfig, SdkAcmApi};
use cert_importer::acm::AcmGateway;
use cert_importer::cache::CertificateCache;
use cert_importer::controller::{error_policy, reconcile, Context, KubeClientImpl};
use cert_importer::crd::Certificate;
use cert_importer::retry::RetryPolicy;
use cert_importer::telemetry::{init_telemetry, TelemetryConfig};
use cert_importer::DEFAULT_CONCURRENCY;

/// Server-side watch timeout, kept under the API server's 30s idle limit
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable text
    Text,
}

/// cert-importer - imports marked cert-manager Certificates into AWS ACM
#[derive(Parser, Debug)]
#[command(name = "cert-importer", version, about, long_about = None)]
struct Cli {
    /// AWS region for ACM (defaults to the SDK provider chain)
    #[arg(long, env = "ACM_REGION")]
    region: Option<String>,

    /// ACM endpoint override, e.g. a LocalStack URL
    #[arg(long, env = "ACM_ENDPOINT_URL")]
    acm_endpoint: Option<String>,

    /// Only watch Certificates in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Maximum number of concurrent reconciliations
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: u16,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 30)]
    error_requeue_secs: u64,

    /// Attempts per ACM list page while building the startup cache
    #[arg(long, env = "BOOTSTRAP_ATTEMPTS", default_value_t = 5)]
    bootstrap_attempts: u32,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube and the AWS SDK both link rustls; pin one provider for the process.
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install rustls crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        json: cli.log_format == LogFormat::Json,
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    run_controller(cli).await
}

async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let acm = Arc::new(
        SdkAcmApi::from_config(&AcmClientConfig {
            region: cli.region.clone(),
            endpoint_url: cli.acm_endpoint.clone(),
        })
        .await,
    );

    tracing::info!("Building certificate cache from ACM");
    let cache = CertificateCache::bootstrap(
        acm.as_ref(),
        &RetryPolicy::with_max_attempts(cli.bootstrap_attempts),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to bootstrap certificate cache: {}", e))?;
    tracing::info!(
        certificates = cache.len().await,
        "Certificate cache ready"
    );

    let ctx = Arc::new(
        Context::new(
            Arc::new(KubeClientImpl::new(client.clone())),
            Arc::new(AcmGateway::new(acm)),
            Arc::new(cache),
        )
        .with_error_requeue(Duration::from_secs(cli.error_requeue_secs)),
    );

    let certificates: Api<Certificate> = match cli.namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    tracing::info!(
        namespace = cli.namespace.as_deref().unwrap_or("*"),
        concurrency = cli.concurrency,
        "Starting certificate controller"
    );

    Controller::new(
        certificates,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .with_config(ControllerConfig::default().concurrency(cli.concurrency))
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(|result| async move {
        match result {
            Ok((object, action)) => {
                tracing::debug!(certificate = %object, ?action, "Certificate reconciliation completed");
            }
            Err(e) => {
                tracing::error!(error = ?e, "Certificate reconciliation error");
            }
        }
    })
    .await;

    tracing::info!("cert-importer shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parse flags only, ignoring whatever the environment sets
    fn parse_flags(args: &[&str]) -> Cli {
        let command = Cli::command().mut_args(|arg| arg.env(None::<&'static str>));
        let matches = command.get_matches_from(args.iter().copied());
        Cli::from_arg_matches(&matches).expect("valid arguments")
    }

    #[test]
    fn defaults_match_documented_values() {
        let cli = parse_flags(&["cert-importer"]);
        assert_eq!(cli.concurrency, 5);
        assert_eq!(cli.error_requeue_secs, 30);
        assert_eq!(cli.bootstrap_attempts, 5);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.namespace.is_none());
        assert!(cli.region.is_none());
        assert!(cli.acm_endpoint.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse_flags(&[
            "cert-importer",
            "--region",
            "eu-west-1",
            "--namespace",
            "prod",
            "--concurrency",
            "2",
            "--log-format",
            "text",
        ]);
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.namespace.as_deref(), Some("prod"));
        assert_eq!(cli.concurrency, 2);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
