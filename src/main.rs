use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use kube::Client;
use log::*;
use structopt::StructOpt;

use kubesphere_admission::admission_handler::AdmissionHandler;
use kubesphere_admission::crd::{Policy, PolicyTemplate, Rule};
use kubesphere_admission::models::Stores;
use kubesphere_admission::notification;
use kubesphere_admission::options::{AdmissionOptions, ServerOptions};
use kubesphere_admission::provider::{GatekeeperProvider, KubeGatekeeperClient, ProviderRegistry};
use kubesphere_admission::resource_store::KubeStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting kubesphere-admission");

    let opts = ServerOptions::from_args();
    let admission = opts.admission_options()?;
    for problem in admission.validate() {
        warn!("Invalid admission options: {}", problem);
    }

    let provider = rustls::crypto::ring::default_provider();
    rustls::crypto::CryptoProvider::install_default(provider)
        .map_err(|_| anyhow!("failed to install crypto provider"))?;

    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(notification::router());

    if admission.enable {
        let stores = admission_stores(&admission).await?;
        app = app.merge(AdmissionHandler::new(&stores).router());
    } else {
        info!("Admission API is disabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], opts.port));
    match opts.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| format!("Failed to load TLS configuration from {}", cert_path.display()))?;
            info!("Starting TLS server on {}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Starting server on {}", addr);
            axum_server::bind(addr).serve(app.into_make_service()).await?;
        }
    }
    Ok(())
}

// Connects to the cluster and waits for the admission caches to sync
async fn admission_stores(options: &AdmissionOptions) -> Result<Stores> {
    let client = Client::try_default()
        .await
        .context("Failed to create kubernetes client")?;

    let templates = KubeStore::<PolicyTemplate>::new(client.clone());
    let policies = KubeStore::<Policy>::new(client.clone());
    let rules = KubeStore::<Rule>::new(client.clone());
    templates.wait_until_ready().await?;
    policies.wait_until_ready().await?;
    rules.wait_until_ready().await?;

    let mut providers = ProviderRegistry::new();
    if options.enable_gatekeeper_provider {
        let gatekeeper = KubeGatekeeperClient::new(client);
        providers.register(Arc::new(GatekeeperProvider::new(Arc::new(gatekeeper))));
    }
    info!("Admission providers: {:?}", providers.names());

    Ok(Stores {
        templates: Arc::new(templates),
        policies: Arc::new(policies),
        rules: Arc::new(rules),
        providers,
    })
}
