//! Node address agent - per-node InternalIP/ExternalIP publisher

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use node_address_agent::config::{AgentArgs, AgentConfig};
use node_address_agent::driver;
use node_address_agent::kube_client::create_client;
use node_address_agent::node::{KubeNodeClient, NodeUpdater};
use node_address_agent::reconciler::Reconciler;
use node_address_agent::route::KernelRouteResolver;
use node_address_agent::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let args = AgentArgs::parse();

    init_telemetry(&TelemetryConfig {
        format: args.log_format,
        filter: args.log_filter.clone(),
    })
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    let config = AgentConfig::try_from(args)?;

    tracing::info!(node = %config.node_name, "Starting node address agent");
    tracing::debug!(
        internal_ip_target = ?config.reconciler.internal_ip_target,
        external_ip_target = %config.reconciler.external_ip_target,
        remove_taint = config.reconciler.remove_taint,
        "Configuration"
    );

    let client = create_client(config.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let updater = NodeUpdater::new(Arc::new(KubeNodeClient::new(client)), &config.node_name);
    let reconciler = Reconciler::new(
        updater,
        Arc::new(KernelRouteResolver::new()),
        config.reconciler.clone(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(driver::cancel_on_signal(shutdown.clone()));

    driver::run(&reconciler, &config.driver, shutdown).await?;

    tracing::info!("Node address agent shutting down");
    Ok(())
}
