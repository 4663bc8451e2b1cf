use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::error::TransportError;
use crate::protocol::PrintRequest;
use crate::registry::PrinterRegistry;
use crate::transport::{HostStatus, Transport};
use crate::utils::local_ip;

const REQUEST_QUEUE_CAPACITY: usize = 32;

/// Ties the printer registry to a transport on a fixed status cadence.
pub struct HostLoop {
    registry: PrinterRegistry,
    transport: Box<dyn Transport>,
    host_name: String,
    update_period: Duration,
}

impl HostLoop {
    #[must_use]
    pub fn new(
        registry: PrinterRegistry,
        transport: Box<dyn Transport>,
        host_name: impl Into<String>,
        update_period: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            host_name: host_name.into(),
            update_period,
        }
    }

    /// Runs until `shutdown` resolves, then stops the transport and releases
    /// every printer.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot be started.
    #[instrument(skip_all, fields(host = %self.host_name))]
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        let (requests, mut inbound) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        self.transport.start(requests).await?;
        info!(period = ?self.update_period, "host loop started");

        let mut ticker = interval(self.update_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut jobs = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => self.status_cycle().await,
                Some(request) = inbound.recv() => self.route(request, &mut jobs),
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(error) = joined {
                        error!(error = %error, "print task panicked");
                    }
                }
            }
        }

        info!("shutting down");
        self.transport.shutdown().await;
        self.registry.dispose_all().await;
        while let Some(joined) = jobs.join_next().await {
            if let Err(error) = joined {
                error!(error = %error, "print task panicked");
            }
        }
        Ok(())
    }

    /// Reconciles printers and publishes one status snapshot.
    pub async fn status_cycle(&mut self) {
        let summary = self.registry.reconcile().await;
        if !summary.is_unchanged() {
            debug!(attached = ?summary.attached, detached = ?summary.detached, "printer set changed");
        }

        let status = self.snapshot();
        if let Err(error) = self.transport.publish(&status).await {
            warn!(error = %error, "failed to publish status");
        }
    }

    /// Builds a fresh status snapshot from the tracked printers.
    #[must_use]
    pub fn snapshot(&self) -> HostStatus {
        HostStatus::new(
            local_ip().to_string(),
            self.host_name.clone(),
            self.update_period.as_secs_f64(),
            self.registry.printers(),
        )
    }

    fn route(&self, request: PrintRequest, jobs: &mut JoinSet<()>) {
        let manager = match self.registry.manager(request.serial()) {
            Ok(manager) => manager,
            Err(error) => {
                warn!(error = %error, "dropping print request");
                return;
            }
        };

        jobs.spawn(async move {
            match manager.handle(&request).await {
                Ok(outcome) if outcome.is_success() => {
                    info!(serial = request.serial(), outcome = %outcome, "print request completed");
                }
                Ok(outcome) => {
                    warn!(serial = request.serial(), outcome = %outcome, "print request failed");
                }
                Err(error) => {
                    warn!(serial = request.serial(), error = %error, "print request rejected");
                }
            }
        });
    }
}
