//! Reconciliation driver
//!
//! Runs the reconciler either once or forever at a fixed interval. Cycles
//! never overlap: the next one starts only after the previous one returned
//! and the interval elapsed. There is no backoff; a failed cycle is simply
//! retried at the next tick.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::sleep_or_cancel;
use crate::reconciler::{CycleOutcome, Reconciler};
use crate::{Error, Result, DEFAULT_CYCLE_TIMEOUT_SECS, DEFAULT_RECONCILE_INTERVAL_SECS};

/// Loop settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Time between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Deadline for a single cycle
    pub cycle_timeout: Duration,
    /// Run a single cycle and return its result
    pub run_once: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            cycle_timeout: Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
            run_once: false,
        }
    }
}

/// Run one cycle under the configured deadline
pub async fn run_cycle(
    reconciler: &Reconciler,
    cycle_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<CycleOutcome> {
    match tokio::time::timeout(cycle_timeout, reconciler.reconcile(shutdown)).await {
        Ok(result) => result,
        Err(_) => Err(Error::cancelled(format!(
            "cycle deadline of {}s exceeded",
            cycle_timeout.as_secs_f64()
        ))),
    }
}

/// Drive reconciliation until `shutdown` fires (or once, in run-once mode)
///
/// # Errors
///
/// In run-once mode, the error of the single cycle. In continuous mode
/// cycle failures are logged and retried, and this returns `Ok(())` once
/// shutdown is requested.
pub async fn run(
    reconciler: &Reconciler,
    config: &DriverConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(
        node = %reconciler.node_name(),
        interval = ?config.interval,
        run_once = config.run_once,
        "Starting reconciliation loop"
    );

    loop {
        let result = run_cycle(reconciler, config.cycle_timeout, &shutdown).await;

        match &result {
            Ok(outcome) => info!(
                node = %reconciler.node_name(),
                addresses_changed = outcome.addresses_changed,
                taint_removed = outcome.taint_removed,
                "Reconciliation completed successfully"
            ),
            Err(e) if e.is_cancelled() && shutdown.is_cancelled() => {
                info!(node = %reconciler.node_name(), "Reconciliation interrupted by shutdown");
            }
            Err(e) => error!(
                node = %reconciler.node_name(),
                error = %e,
                retryable = e.is_retryable(),
                "Reconciliation failed"
            ),
        }

        if config.run_once {
            return result.map(|_| ());
        }
        if shutdown.is_cancelled() {
            info!("Shutdown requested, stopping reconciliation loop");
            return Ok(());
        }

        debug!(interval = ?config.interval, "Sleeping until next reconciliation");
        if !sleep_or_cancel(&shutdown, config.interval).await {
            info!("Shutdown requested, stopping reconciliation loop");
            return Ok(());
        }
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
    shutdown.cancel();
}
