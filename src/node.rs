//! Node record access
//!
//! [`NodeUpdater`] wraps the three operations the reconciler needs against a
//! single named Node: read it, replace its `status.addresses`, and drop one
//! taint from `spec.taints`. Writes are JSON Patches on exactly those paths so
//! that kubelet and other controllers writing unrelated fields between our
//! read and our write are never clobbered. Nothing here retries; a failed
//! call fails the cycle and the driver tries again next interval.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation, TestOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Node, NodeAddress, Taint};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::cancel::cancellable;
use crate::{Error, Result, FIELD_MANAGER};

/// Kubernetes node address type
///
/// Variant order is the order addresses are written back in, which keeps
/// the primary InternalIP first the way kubelet publishes it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressType {
    /// Address routable only within the cluster
    InternalIP,
    /// Address routable from outside the cluster
    ExternalIP,
    /// Cluster-internal DNS name
    InternalDNS,
    /// External DNS name
    ExternalDNS,
    /// The node's hostname
    Hostname,
    /// Any type this agent does not know about, kept verbatim
    Other(String),
}

impl AddressType {
    /// Wire representation used in `status.addresses[].type`
    pub fn as_str(&self) -> &str {
        match self {
            Self::InternalIP => "InternalIP",
            Self::ExternalIP => "ExternalIP",
            Self::InternalDNS => "InternalDNS",
            Self::ExternalDNS => "ExternalDNS",
            Self::Hostname => "Hostname",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for AddressType {
    fn from(s: &str) -> Self {
        match s {
            "InternalIP" => Self::InternalIP,
            "ExternalIP" => Self::ExternalIP,
            "InternalDNS" => Self::InternalDNS,
            "ExternalDNS" => Self::ExternalDNS,
            "Hostname" => Self::Hostname,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses currently published on a Node (empty if status is unset)
pub fn node_addresses(node: &Node) -> &[NodeAddress] {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_deref())
        .unwrap_or_default()
}

/// Taints currently set on a Node (empty if spec is unset)
pub fn node_taints(node: &Node) -> &[Taint] {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_deref())
        .unwrap_or_default()
}

/// Trait abstracting Kubernetes Node operations
///
/// This trait allows mocking the API server in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch a Node by name
    ///
    /// Returns `Error::NotFound` when the API server answers 404.
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Apply a JSON Patch to the Node's main resource
    async fn patch_node(&self, name: &str, patch: json_patch::Patch) -> Result<()>;

    /// Apply a JSON Patch to the Node's `status` subresource
    async fn patch_node_status(&self, name: &str, patch: json_patch::Patch) -> Result<()>;
}

/// Real Kubernetes client implementation
pub struct KubeNodeClient {
    api: Api<Node>,
}

impl KubeNodeClient {
    /// Create a new KubeNodeClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    fn params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl NodeClient for KubeNodeClient {
    async fn get_node(&self, name: &str) -> Result<Node> {
        match self.api.get(name).await {
            Ok(node) => Ok(node),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::not_found(name)),
            Err(e) => Err(Error::api("get node", e)),
        }
    }

    async fn patch_node(&self, name: &str, patch: json_patch::Patch) -> Result<()> {
        self.api
            .patch(name, &Self::params(), &Patch::Json::<()>(patch))
            .await
            .map_err(|e| Error::api("patch node", e))?;
        Ok(())
    }

    async fn patch_node_status(&self, name: &str, patch: json_patch::Patch) -> Result<()> {
        self.api
            .patch_status(name, &Self::params(), &Patch::Json::<()>(patch))
            .await
            .map_err(|e| Error::api("patch node status", e))?;
        Ok(())
    }
}

/// Build the status patch that writes the complete address list
///
/// `add` on an existing member replaces it, and unlike `replace` it also
/// succeeds on a Node whose status has no addresses yet.
pub fn address_patch(addresses: &[NodeAddress]) -> Result<json_patch::Patch> {
    let value = serde_json::to_value(addresses)
        .map_err(|e| Error::serialization(format!("node addresses: {e}")))?;
    Ok(json_patch::Patch(vec![PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["status", "addresses"]),
        value,
    })]))
}

/// Build the patch that drops every taint with `key`, or `None` if absent
///
/// The patch first tests that `/spec/taints` still holds exactly the list
/// that was read, so a concurrent edit makes the API server reject the whole
/// patch instead of us writing back a stale list.
pub fn taint_removal_patch(observed: &[Taint], key: &str) -> Result<Option<json_patch::Patch>> {
    if !observed.iter().any(|t| t.key == key) {
        return Ok(None);
    }

    let remaining: Vec<&Taint> = observed.iter().filter(|t| t.key != key).collect();
    let observed_value = serde_json::to_value(observed)
        .map_err(|e| Error::serialization(format!("node taints: {e}")))?;
    let remaining_value = serde_json::to_value(&remaining)
        .map_err(|e| Error::serialization(format!("node taints: {e}")))?;

    let path = PointerBuf::from_tokens(["spec", "taints"]);
    Ok(Some(json_patch::Patch(vec![
        PatchOperation::Test(TestOperation {
            path: path.clone(),
            value: observed_value,
        }),
        PatchOperation::Replace(ReplaceOperation {
            path,
            value: remaining_value,
        }),
    ])))
}

/// Read and patch operations against one named Node
#[derive(Clone)]
pub struct NodeUpdater {
    client: Arc<dyn NodeClient>,
    node_name: String,
}

impl NodeUpdater {
    /// Create an updater for `node_name`
    pub fn new(client: Arc<dyn NodeClient>, node_name: impl Into<String>) -> Self {
        Self {
            client,
            node_name: node_name.into(),
        }
    }

    /// Name of the Node this updater targets
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Fetch the current Node
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Node> {
        cancellable(cancel, "get node", || self.client.get_node(&self.node_name)).await
    }

    /// Replace `status.addresses` with `addresses`
    ///
    /// The caller supplies the complete desired list; nothing is merged.
    pub async fn set_addresses(
        &self,
        addresses: &[NodeAddress],
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(node = %self.node_name, ?addresses, "Updating node addresses");
        let patch = address_patch(addresses)?;
        cancellable(
            cancel,
            "patch node status",
            || self.client.patch_node_status(&self.node_name, patch),
        )
        .await?;
        info!(node = %self.node_name, "Updated node addresses");
        Ok(())
    }

    /// Remove the taint with `key` if present
    ///
    /// Returns `Ok(false)` without writing when the taint is already gone.
    pub async fn remove_taint(&self, key: &str, cancel: &CancellationToken) -> Result<bool> {
        let node = self.get(cancel).await?;
        let Some(patch) = taint_removal_patch(node_taints(&node), key)? else {
            debug!(node = %self.node_name, taint = %key, "Taint not present, skipping removal");
            return Ok(false);
        };

        debug!(node = %self.node_name, taint = %key, "Removing taint");
        cancellable(cancel, "patch node", || {
            self.client.patch_node(&self.node_name, patch)
        })
        .await?;
        info!(node = %self.node_name, taint = %key, "Removed taint");
        Ok(true)
    }
}
