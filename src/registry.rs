use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::error::PrintError;
use crate::hw::{FoundPrinter, Printer, PrinterBus, PrinterInfo};
use crate::print_manager::{ImageFetcher, PrintManager};

#[derive(Debug)]
struct Tracked {
    printer: Arc<dyn Printer>,
    manager: Arc<PrintManager>,
}

/// Serials added and removed by one reconcile pass.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ReconcileSummary {
    pub attached: Vec<String>,
    pub detached: Vec<String>,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Tracks live printers and their print managers by serial.
#[derive(Debug)]
pub struct PrinterRegistry {
    bus: Arc<dyn PrinterBus>,
    fetcher: Arc<dyn ImageFetcher>,
    tracked: BTreeMap<String, Tracked>,
    detaching: JoinSet<()>,
}

impl PrinterRegistry {
    #[must_use]
    pub fn new(bus: Arc<dyn PrinterBus>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            bus,
            fetcher,
            tracked: BTreeMap::new(),
            detaching: JoinSet::new(),
        }
    }

    /// Brings the tracked set in line with what the bus currently reports.
    #[instrument(skip(self))]
    pub async fn reconcile(&mut self) -> ReconcileSummary {
        let found: HashMap<String, String> = self
            .bus
            .discover()
            .await
            .into_iter()
            .map(|printer| (printer.serial().to_string(), printer.path().to_string()))
            .collect();
        let mut summary = ReconcileSummary::default();

        let gone: Vec<String> = self
            .tracked
            .keys()
            .filter(|serial| !found.contains_key(*serial))
            .cloned()
            .collect();
        for serial in gone {
            if let Some(tracked) = self.tracked.remove(&serial) {
                info!(serial = %serial, path = tracked.printer.path(), "printer detached");
                // A job in flight holds the device; dispose off the reconcile path.
                let printer = tracked.printer;
                self.detaching.spawn(async move { printer.dispose().await });
                summary.detached.push(serial);
            }
        }
        self.reap_detached();

        let mut found: Vec<(String, String)> = found.into_iter().collect();
        found.sort();
        for (serial, path) in found {
            match self.tracked.get(&serial) {
                Some(tracked) => {
                    if tracked.printer.path() != path {
                        debug!(
                            serial = %serial,
                            tracked_path = tracked.printer.path(),
                            reported_path = %path,
                            "printer reported at a new path; keeping existing device"
                        );
                    }
                }
                None => {
                    let printer = self
                        .bus
                        .attach(&FoundPrinter::new(serial.clone(), path.clone()));
                    let manager = Arc::new(PrintManager::new(
                        Arc::clone(&printer),
                        Arc::clone(&self.fetcher),
                    ));
                    info!(serial = %serial, path = %path, "printer attached");
                    self.tracked
                        .insert(serial.clone(), Tracked { printer, manager });
                    summary.attached.push(serial);
                }
            }
        }

        summary
    }

    /// Returns the print manager for a serial.
    ///
    /// # Errors
    ///
    /// Returns [`PrintError::DeviceNotFound`] when the serial is not tracked.
    pub fn manager(&self, serial: &str) -> Result<Arc<PrintManager>, PrintError> {
        self.tracked
            .get(serial)
            .map(|tracked| Arc::clone(&tracked.manager))
            .ok_or_else(|| PrintError::DeviceNotFound {
                serial: serial.to_string(),
            })
    }

    /// Returns a status snapshot of every tracked printer, in serial order.
    #[must_use]
    pub fn printers(&self) -> Vec<PrinterInfo> {
        self.tracked
            .values()
            .map(|tracked| tracked.printer.info())
            .collect()
    }

    /// Polls every tracked printer once.
    pub async fn refresh_all(&self) {
        for tracked in self.tracked.values() {
            tracked.printer.refresh().await;
        }
    }

    #[must_use]
    pub fn serials(&self) -> Vec<String> {
        self.tracked.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Disposes every tracked printer and forgets it, then waits for any
    /// detached printers still being disposed.
    pub async fn dispose_all(&mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        for (serial, tracked) in tracked {
            tracked.printer.dispose().await;
            debug!(serial = %serial, "printer released");
        }
        self.wait_for_detached().await;
    }

    /// Waits until every detached printer has finished disposing.
    pub async fn wait_for_detached(&mut self) {
        while let Some(result) = self.detaching.join_next().await {
            if let Err(error) = result {
                warn!(error = %error, "printer disposal ended abnormally");
            }
        }
    }

    fn reap_detached(&mut self) {
        while let Some(result) = self.detaching.try_join_next() {
            if let Err(error) = result {
                warn!(error = %error, "printer disposal ended abnormally");
            }
        }
    }
}
