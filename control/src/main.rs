use anyhow::{Context, Result};
use control::apis::edge::{HttpEdgeApi, KubeIpPolicies, KubeStatusWriter, TlsEdgeReconciler};
use control::apis::watchers::{run_sync, spawn_watchers, RetryPolicy};
use control::client::{KindRegistry, ObjectClient};
use control::driver::SyncKind;
use control::{ControllerConfig, Driver};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// RAUTA control plane
///
/// Mirrors Ingress and Gateway API objects and reconciles the Domains,
/// HTTPS edges and Tunnels derived from them.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ControllerConfig::from_env().context("Invalid controller configuration")?;
    info!("RAUTA controller starting");
    info!("   IngressClass controller: {}", config.controller_name);
    info!(
        "   Manager: {}/{}",
        config.manager_namespace, config.manager_name
    );
    info!("   Gateway API: {}", config.gateway_enabled);
    info!(
        "   TLSEdge controller: {}",
        config.edge_api_url.as_deref().unwrap_or("disabled")
    );

    let kube = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let backing: Arc<dyn ObjectClient> = Arc::new(KindRegistry::kubernetes(kube.clone()));
    let driver = Arc::new(Driver::new(&config)?);

    if config.migrate_labels {
        driver
            .migrate_labels(&*backing)
            .await
            .context("Label migration failed")?;
    }

    driver
        .seed(&*backing)
        .await
        .context("Failed to seed object mirror")?;
    driver.print_state();

    let cancel = CancellationToken::new();
    let mut handles = spawn_watchers(
        kube.clone(),
        driver.clone(),
        backing.clone(),
        cancel.clone(),
    );

    if let Some(url) = config.edge_api_url.as_deref() {
        let api = HttpEdgeApi::new(url, config.edge_api_key.clone())
            .context("Failed to create edge API client")?;
        let reconciler = TlsEdgeReconciler::new(
            Arc::new(api),
            Arc::new(KubeStatusWriter::new(kube.clone())),
            Arc::new(KubeIpPolicies::new(kube.clone())),
        );
        handles.push(tokio::spawn(reconciler.run(kube, cancel.clone())));
    }

    {
        let (driver, backing, cancel) = (driver.clone(), backing.clone(), cancel.clone());
        tokio::spawn(async move {
            run_sync(&driver, &*backing, SyncKind::Full, RetryPolicy::default(), &cancel).await;
        });
    }

    info!("Press Ctrl-C to exit.");
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");

    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Watcher task failed: {}", e);
        }
    }

    Ok(())
}
