//! Node address reconciliation
//!
//! One cycle observes current state, determines desired state, diffs, and
//! applies only what changed:
//!
//! 1. Fetch the Node
//! 2. Seed an [`AddressMap`] from `status.addresses`
//! 3. Resolve the internal target (when configured) into InternalIP
//! 4. Resolve the external target
//! 5. Drop ExternalIP when it equals InternalIP, otherwise set it
//! 6. Patch `status.addresses` only if the resulting set differs
//! 7. Remove the uninitialized taint (when enabled)
//!
//! Any failure aborts the cycle at that step. Nothing carries over between
//! cycles except what is stored on the Node itself.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::NodeAddress;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::node::{node_addresses, AddressType, NodeUpdater};
use crate::route::RouteResolver;
use crate::{Result, UNINITIALIZED_TAINT_KEY};

/// Address type to its published values
///
/// Built fresh each cycle from the fetched Node. A type keeps every value it
/// was seeded with (kubelet publishes one InternalIP per IP family on
/// dual-stack nodes) until the cycle sets it. Types this agent does not own
/// pass through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressMap {
    entries: BTreeMap<AddressType, Vec<String>>,
}

impl AddressMap {
    /// Seed a map from a Node's published addresses
    ///
    /// Values keep their published order within a type; exact duplicates
    /// collapse to one entry.
    pub fn from_addresses(addresses: &[NodeAddress]) -> Self {
        let mut entries: BTreeMap<AddressType, Vec<String>> = BTreeMap::new();
        for a in addresses {
            let values = entries.entry(AddressType::from(a.type_.as_str())).or_default();
            if !values.contains(&a.address) {
                values.push(a.address.clone());
            }
        }
        Self { entries }
    }

    /// Values for `type_`, empty if none
    pub fn values(&self, type_: &AddressType) -> &[String] {
        self.entries.get(type_).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `type_` currently has `value` among its values
    pub fn contains(&self, type_: &AddressType, value: &str) -> bool {
        self.values(type_).iter().any(|v| v == value)
    }

    /// Make `value` the only value for `type_`
    pub fn set(&mut self, type_: AddressType, value: impl Into<String>) {
        self.entries.insert(type_, vec![value.into()]);
    }

    /// Remove every value of `type_`
    pub fn remove(&mut self, type_: &AddressType) {
        self.entries.remove(type_);
    }

    /// Convert back into the Node's address list
    pub fn to_addresses(&self) -> Vec<NodeAddress> {
        self.entries
            .iter()
            .flat_map(|(type_, values)| {
                values.iter().map(move |address| NodeAddress {
                    type_: type_.as_str().to_string(),
                    address: address.clone(),
                })
            })
            .collect()
    }
}

/// Compare two address lists as unordered (type, value) sets
pub fn addresses_equal(a: &[NodeAddress], b: &[NodeAddress]) -> bool {
    fn as_set(list: &[NodeAddress]) -> BTreeSet<(&str, &str)> {
        list.iter()
            .map(|a| (a.type_.as_str(), a.address.as_str()))
            .collect()
    }
    as_set(a) == as_set(b)
}

/// Compute the address list to publish
///
/// `internal` is `None` when internal detection is disabled, in which case
/// whatever InternalIP the Node already has (e.g. set by kubelet) is kept.
pub fn desired_addresses(
    current: &[NodeAddress],
    internal: Option<IpAddr>,
    external: IpAddr,
) -> Vec<NodeAddress> {
    let mut map = AddressMap::from_addresses(current);

    if let Some(ip) = internal {
        map.set(AddressType::InternalIP, ip.to_string());
    }

    let external = external.to_string();
    if map.contains(&AddressType::InternalIP, &external) {
        debug!(external_ip = %external, "External IP matches internal IP, dropping ExternalIP");
        map.remove(&AddressType::ExternalIP);
    } else {
        map.set(AddressType::ExternalIP, external);
    }

    map.to_addresses()
}

/// Settings for the reconciler, already validated
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Target used to detect InternalIP; `None` disables internal detection
    pub internal_ip_target: Option<String>,
    /// Target used to detect ExternalIP
    pub external_ip_target: String,
    /// Whether to remove the uninitialized taint each cycle
    pub remove_taint: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            internal_ip_target: None,
            external_ip_target: crate::DEFAULT_EXTERNAL_IP_TARGET.to_string(),
            remove_taint: true,
        }
    }
}

/// One route lookup made during a cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Destination that was looked up
    pub target: String,
    /// Source address the kernel picked for it
    pub source: IpAddr,
}

/// Result of a successful cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Whether `status.addresses` was patched
    pub addresses_changed: bool,
    /// Whether the uninitialized taint was removed
    pub taint_removed: bool,
}

impl CycleOutcome {
    /// Whether the cycle wrote anything to the Node
    pub fn mutated(&self) -> bool {
        self.addresses_changed || self.taint_removed
    }
}

/// Reconciles one Node's addresses and startup taint
pub struct Reconciler {
    updater: NodeUpdater,
    resolver: Arc<dyn RouteResolver>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler from its collaborators
    pub fn new(
        updater: NodeUpdater,
        resolver: Arc<dyn RouteResolver>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            updater,
            resolver,
            config,
        }
    }

    /// Name of the Node being reconciled
    pub fn node_name(&self) -> &str {
        self.updater.node_name()
    }

    async fn observe(&self, target: &str, cancel: &CancellationToken) -> Result<Observation> {
        let source = self.resolver.resolve(target, cancel).await?;
        Ok(Observation {
            target: target.to_string(),
            source,
        })
    }

    /// Run one reconciliation cycle
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error; later steps are not attempted.
    #[instrument(skip_all, fields(node = %self.updater.node_name()))]
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<CycleOutcome> {
        debug!("Starting reconciliation");

        let node = self.updater.get(cancel).await?;
        let current = node_addresses(&node);

        let internal = match self.config.internal_ip_target.as_deref() {
            Some(target) => {
                let obs = self.observe(target, cancel).await?;
                debug!(target_ip = %obs.target, internal_ip = %obs.source, "Detected internal IP");
                Some(obs.source)
            }
            None => None,
        };

        let external = self.observe(&self.config.external_ip_target, cancel).await?;
        debug!(target_ip = %external.target, external_ip = %external.source, "Detected external IP");

        let desired = desired_addresses(current, internal, external.source);

        let addresses_changed = if addresses_equal(current, &desired) {
            debug!("Addresses unchanged, skipping update");
            false
        } else {
            info!(from = ?current, to = ?desired, "Addresses changed, updating node");
            self.updater.set_addresses(&desired, cancel).await?;
            true
        };

        let taint_removed = if self.config.remove_taint {
            self.updater
                .remove_taint(UNINITIALIZED_TAINT_KEY, cancel)
                .await?
        } else {
            false
        };

        Ok(CycleOutcome {
            addresses_changed,
            taint_removed,
        })
    }
}
