//! Command line / environment configuration
//!
//! Flags mirror the environment variables the DaemonSet sets, so the same
//! binary runs in-cluster (env from the downward API) or by hand with a
//! kubeconfig. [`AgentConfig::try_from`] turns raw arguments into validated
//! values; any problem there is fatal at startup.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::driver::DriverConfig;
use crate::reconciler::ReconcilerConfig;
use crate::telemetry::LogFormat;
use crate::{Error, Result, DEFAULT_EXTERNAL_IP_TARGET};

/// Node address agent - publishes InternalIP/ExternalIP from the kernel route table
#[derive(Parser, Debug, Clone)]
#[command(name = "node-address-agent", version, about, long_about = None)]
pub struct AgentArgs {
    /// Name of the Node to update
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Path to kubeconfig file (in-cluster config is used when unset)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Target IP for internal IP detection. Empty disables internal detection
    #[arg(long, env = "INTERNAL_IP_TARGET", default_value = "")]
    pub internal_ip_target: String,

    /// Target IP for external IP detection
    #[arg(long, env = "EXTERNAL_IP_TARGET", default_value = DEFAULT_EXTERNAL_IP_TARGET)]
    pub external_ip_target: String,

    /// Run a single reconciliation and exit with its result
    #[arg(long)]
    pub run_once: bool,

    /// Remove the node.cloudprovider.kubernetes.io/uninitialized taint
    #[arg(
        long,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub remove_taint: bool,

    /// Time between reconciliation cycles (e.g. 10s, 500ms, 1m)
    #[arg(long, env = "RECONCILE_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub reconcile_interval: Duration,

    /// Deadline for a single reconciliation cycle (e.g. 30s, 1m)
    #[arg(long, env = "CYCLE_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub cycle_timeout: Duration,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Tracing filter directives, overriding RUST_LOG
    #[arg(long, env = "LOG_FILTER")]
    pub log_filter: Option<String>,
}

/// Validated agent configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Node this agent owns
    pub node_name: String,
    /// Explicit kubeconfig, if any
    pub kubeconfig: Option<PathBuf>,
    /// Reconciliation settings
    pub reconciler: ReconcilerConfig,
    /// Loop settings
    pub driver: DriverConfig,
}

fn validate_target(field: &str, value: &str) -> Result<String> {
    value
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| Error::invalid_input(field, format!("'{value}' is not an IP address")))
}

/// Parse a human-friendly duration
///
/// Supports `Nms`, `Ns`, `Nm`, and `Nh`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || {
        Error::invalid_input(
            "duration",
            format!("invalid duration '{s}', expected e.g. 500ms, 10s, 1m, 1h"),
        )
    };
    let scaled = |digits: &str, unit: u64| {
        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(unit))
            .ok_or_else(invalid)
    };

    if let Some(millis) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(scaled(millis, 1)?))
    } else if let Some(hours) = s.strip_suffix('h') {
        Ok(Duration::from_secs(scaled(hours, 3600)?))
    } else if let Some(minutes) = s.strip_suffix('m') {
        Ok(Duration::from_secs(scaled(minutes, 60)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(scaled(secs, 1)?))
    } else {
        Ok(Duration::from_secs(scaled(s, 1)?))
    }
}

fn validate_nonzero(field: &str, duration: Duration) -> Result<Duration> {
    if duration.is_zero() {
        return Err(Error::invalid_input(field, "must be greater than zero"));
    }
    Ok(duration)
}

impl TryFrom<AgentArgs> for AgentConfig {
    type Error = Error;

    fn try_from(args: AgentArgs) -> Result<Self> {
        let node_name = args
            .node_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                Error::invalid_input(
                    "node-name",
                    "--node-name or NODE_NAME environment variable must be set",
                )
            })?;

        let internal_ip_target = match args.internal_ip_target.trim() {
            "" => None,
            target => Some(validate_target("internal-ip-target", target)?),
        };
        let external_ip_target =
            validate_target("external-ip-target", args.external_ip_target.trim())?;

        let interval = validate_nonzero("reconcile-interval", args.reconcile_interval)?;
        let cycle_timeout = validate_nonzero("cycle-timeout", args.cycle_timeout)?;

        Ok(Self {
            node_name,
            kubeconfig: args.kubeconfig,
            reconciler: ReconcilerConfig {
                internal_ip_target,
                external_ip_target,
                remove_taint: args.remove_taint,
            },
            driver: DriverConfig {
                interval,
                cycle_timeout,
                run_once: args.run_once,
            },
        })
    }
}
