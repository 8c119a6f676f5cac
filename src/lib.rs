//! Node address agent - keeps a Kubernetes Node's addresses in sync with the
//! host's routing table
//!
//! One agent runs on every node (as a hostNetwork DaemonSet). Each cycle it
//! asks the kernel which source address reaches a configured internal and
//! external target, publishes those as the Node's InternalIP/ExternalIP, and
//! removes the `node.cloudprovider.kubernetes.io/uninitialized` taint that
//! kubelet sets when started with `--cloud-provider=external`.
//!
//! # Modules
//!
//! - [`route`] - Kernel route lookups (which source address reaches X)
//! - [`node`] - Read and JSON-patch operations on a single Node
//! - [`reconciler`] - The fetch, compute, diff, apply cycle
//! - [`driver`] - Run-once or periodic execution with shutdown handling
//! - [`config`] - Command line / environment configuration
//! - [`kube_client`] - Kubernetes client construction
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the agent

#![deny(missing_docs)]

pub mod cancel;
pub mod config;
pub mod driver;
pub mod error;
pub mod kube_client;
pub mod node;
pub mod reconciler;
pub mod route;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Taint kubelet sets on nodes started with `--cloud-provider=external`
///
/// Removing it tells the scheduler the cloud-provider side of node
/// initialization is done.
pub const UNINITIALIZED_TAINT_KEY: &str = "node.cloudprovider.kubernetes.io/uninitialized";

/// Field manager recorded on every patch this agent sends
pub const FIELD_MANAGER: &str = "node-address-agent";

/// Default target for external IP detection
pub const DEFAULT_EXTERNAL_IP_TARGET: &str = "8.8.8.8";

/// Default seconds between reconciliation cycles
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 10;

/// Default deadline for a single reconciliation cycle, in seconds
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 30;
