use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use provider_bork::config::{Args, ConnectorKind, Manifest, load_manifest};
use provider_bork::contender::Contender;
use provider_bork::external::{
    Connector, MemoryProviderConfigs, NoOpConnector, ProviderConfigConnector, noop_service_factory,
};
use provider_bork::{
    BORK_RESOURCE_KIND, Controller, ManagedReconciler, MemoryStore, ResourceStore,
    create_audit_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("provider_bork=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let manifest = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => {
            warn!("No manifest given, starting with an empty store");
            Manifest::default()
        }
    };

    // Seed the stores
    let store = Arc::new(MemoryStore::new());
    let configs = Arc::new(MemoryProviderConfigs::new());
    let resources = manifest.resources.len();
    for obj in manifest.resources {
        let key = obj.key();
        store
            .create(obj)
            .with_context(|| format!("Failed to seed resource {}", key))?;
    }
    for config in manifest.provider_configs {
        configs.add_config(config).await;
    }
    for secret in manifest.secrets {
        configs.add_secret(secret).await;
    }
    info!(resources, "Store seeded");

    let audit = create_audit_logger("provider-bork");
    let connector: Arc<dyn Connector> = match args.connector {
        ConnectorKind::Noop => Arc::new(NoOpConnector::new(
            store.clone(),
            noop_service_factory(),
            audit.clone(),
        )),
        ConnectorKind::ProviderConfig => Arc::new(ProviderConfigConnector::new(
            store.clone(),
            configs.clone(),
            noop_service_factory(),
            audit.clone(),
        )),
    };

    let reconciler = ManagedReconciler::new(store.clone(), connector, audit);
    let controller = Controller::new(
        BORK_RESOURCE_KIND,
        store.clone(),
        reconciler,
        args.controller_options(),
    );

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let contender = args.contend_every.map(|every| {
        info!(every = ?every, value = args.contend_value, "Starting contender");
        let contender = Contender::new(store.clone(), args.contend_value, every);
        tokio::spawn(contender.run(shutdown_tx.subscribe()))
    });

    let mut controller = tokio::spawn(controller.run(shutdown_rx));
    info!(connector = ?args.connector, "provider-bork running");

    // Wait for shutdown signal
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    let stopped_early = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT");
            None
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            None
        }
        result = &mut controller => Some(result),
    };

    let _ = shutdown_tx.send(true);

    let result = match stopped_early {
        Some(result) => result,
        None => controller.await,
    };
    if let Some(contender) = contender {
        contender.await.context("Contender task failed")?;
    }
    result
        .context("Controller task failed")?
        .context("Controller failed")?;

    info!("Shutdown complete");
    Ok(())
}
