use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::job::JobOutcome;
use super::printer::{Printer, PrinterInfo};
use crate::status::{MediaType, Phase, PrinterModel, StatusFrame, StatusType};

const MOCK_MODEL: PrinterModel = PrinterModel::Ql820Nwb;
const MOCK_MEDIA_WIDTH: u8 = 62;

/// Synthetic printer for hosts without hardware.
///
/// Reports a loaded 62 mm continuous roll and completes every job after
/// `print_delay`.
#[derive(Debug)]
pub struct MockPrinter {
    serial: String,
    path: String,
    print_delay: Duration,
    status: Mutex<StatusFrame>,
    printed: AtomicUsize,
    disposed: AtomicBool,
}

impl MockPrinter {
    #[must_use]
    pub fn new(serial: impl Into<String>, path: impl Into<String>, print_delay: Duration) -> Self {
        Self {
            serial: serial.into(),
            path: path.into(),
            print_delay,
            status: Mutex::new(StatusFrame::synthetic(
                MOCK_MODEL,
                MOCK_MEDIA_WIDTH,
                MediaType::Continuous,
            )),
            printed: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of jobs that completed on this printer.
    #[must_use]
    pub fn printed(&self) -> usize {
        self.printed.load(Ordering::SeqCst)
    }

    fn set_status(&self, status_type: StatusType, phase: Phase) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *status = status.with_status(status_type, phase);
    }
}

#[async_trait]
impl Printer for MockPrinter {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn path(&self) -> &str {
        &self.path
    }

    #[instrument(skip(self, image), fields(serial = %self.serial))]
    async fn print_image(&self, image: DynamicImage, red: bool) -> JobOutcome {
        if self.disposed.load(Ordering::SeqCst) {
            return JobOutcome::IoFault;
        }

        debug!(width = image.width(), height = image.height(), red, "mock job submitted");
        self.set_status(StatusType::PhaseChange, Phase::Printing);
        sleep(self.print_delay).await;
        self.set_status(StatusType::PrintingComplete, Phase::Receiving);
        self.printed.fetch_add(1, Ordering::SeqCst);
        info!(outcome = %JobOutcome::Success, "print job finished");
        JobOutcome::Success
    }

    fn info(&self) -> PrinterInfo {
        let status = *self.status.lock().unwrap_or_else(PoisonError::into_inner);
        PrinterInfo::new(Some(status.model()), self.serial.clone(), Some(status))
    }

    async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(serial = %self.serial, "mock printer disposed");
        }
    }
}
