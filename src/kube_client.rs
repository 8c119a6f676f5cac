//! Kubernetes client construction

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

/// Default connection timeout for kube clients (5s is plenty for local API server)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
///
/// Without a kubeconfig the in-cluster service account is used.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "Using kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::invalid_input("kubeconfig", format!("failed to read kubeconfig: {e}"))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::invalid_input("kubeconfig", format!("failed to load kubeconfig: {e}"))
                })?
        }
        None => {
            debug!("Using in-cluster config");
            Config::infer().await.map_err(|e| {
                Error::invalid_input("kubeconfig", format!("failed to infer config: {e}"))
            })?
        }
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);

    Client::try_from(config).map_err(|e| Error::api("create client", e))
}
