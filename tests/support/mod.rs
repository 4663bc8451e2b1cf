#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use labelbridge::{
    FoundPrinter, HostStatus, JobOutcome, PrintRequest, Printer, PrinterBus, PrinterInfo,
    Transport, TransportError,
};
use tokio::sync::mpsc;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::new_luma8(width, height)
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("png should encode");
    bytes.into_inner()
}

/// Per-serial counters shared between a test and the printers it attaches.
#[derive(Debug, Default)]
pub struct PrinterCounters {
    disposals: AtomicUsize,
    printed: Mutex<Vec<(u32, u32)>>,
}

impl PrinterCounters {
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Dimensions of every image handed to the printer.
    pub fn printed(&self) -> Vec<(u32, u32)> {
        self.printed.lock().expect("counter lock").clone()
    }
}

#[derive(Debug)]
pub struct CountingPrinter {
    serial: String,
    path: String,
    counters: Arc<PrinterCounters>,
    dispose_delay: Duration,
}

impl CountingPrinter {
    pub fn new(found: &FoundPrinter, counters: Arc<PrinterCounters>) -> Self {
        Self {
            serial: found.serial().to_string(),
            path: found.path().to_string(),
            counters,
            dispose_delay: Duration::ZERO,
        }
    }

    pub fn with_dispose_delay(mut self, delay: Duration) -> Self {
        self.dispose_delay = delay;
        self
    }
}

#[async_trait]
impl Printer for CountingPrinter {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn print_image(&self, image: DynamicImage, _red: bool) -> JobOutcome {
        self.counters
            .printed
            .lock()
            .expect("counter lock")
            .push((image.width(), image.height()));
        JobOutcome::Success
    }

    fn info(&self) -> PrinterInfo {
        PrinterInfo::new(None, self.serial.clone(), None)
    }

    async fn dispose(&self) {
        if !self.dispose_delay.is_zero() {
            tokio::time::sleep(self.dispose_delay).await;
        }
        self.counters.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bus whose discovery result is set by the test.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    found: Mutex<Vec<FoundPrinter>>,
    counters: Mutex<HashMap<String, Arc<PrinterCounters>>>,
    attached: AtomicUsize,
    dispose_delay: Mutex<Duration>,
}

impl ScriptedBus {
    pub fn set_found(&self, printers: &[(&str, &str)]) {
        *self.found.lock().expect("bus lock") = printers
            .iter()
            .map(|(serial, path)| FoundPrinter::new(*serial, *path))
            .collect();
    }

    pub fn counters(&self, serial: &str) -> Arc<PrinterCounters> {
        Arc::clone(
            self.counters
                .lock()
                .expect("bus lock")
                .entry(serial.to_string())
                .or_default(),
        )
    }

    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    /// Makes printers attached from now on take this long to dispose.
    pub fn set_dispose_delay(&self, delay: Duration) {
        *self.dispose_delay.lock().expect("bus lock") = delay;
    }
}

#[async_trait]
impl PrinterBus for ScriptedBus {
    async fn discover(&self) -> Vec<FoundPrinter> {
        self.found.lock().expect("bus lock").clone()
    }

    fn attach(&self, found: &FoundPrinter) -> Arc<dyn Printer> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        let delay = *self.dispose_delay.lock().expect("bus lock");
        Arc::new(
            CountingPrinter::new(found, self.counters(found.serial())).with_dispose_delay(delay),
        )
    }
}

/// Shared view into a [`RecordingTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportProbe {
    published: Arc<Mutex<Vec<HostStatus>>>,
    requests: Arc<Mutex<Option<mpsc::Sender<PrintRequest>>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl TransportProbe {
    pub fn published(&self) -> Vec<HostStatus> {
        self.published.lock().expect("probe lock").clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Delivers a request as if it arrived over the wire.
    pub async fn deliver(&self, request: PrintRequest) {
        let sender = self
            .requests
            .lock()
            .expect("probe lock")
            .clone()
            .expect("transport should be started");
        sender.send(request).await.expect("host loop should be running");
    }
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    probe: TransportProbe,
    reject_publishes: bool,
}

impl RecordingTransport {
    /// Records every publish attempt but reports each one as failed.
    pub fn rejecting_publishes() -> Self {
        Self {
            reject_publishes: true,
            ..Self::default()
        }
    }

    pub fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(&self, status: &HostStatus) -> Result<(), TransportError> {
        self.probe
            .published
            .lock()
            .expect("probe lock")
            .push(status.clone());
        if self.reject_publishes {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    async fn start(&mut self, requests: mpsc::Sender<PrintRequest>) -> Result<(), TransportError> {
        *self.probe.requests.lock().expect("probe lock") = Some(requests);
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.probe.requests.lock().expect("probe lock").take();
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
