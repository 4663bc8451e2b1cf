use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use image::DynamicImage;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::backend::PrinterBackend;
use super::job::{JobOutcome, JobState, PrintJob};
use super::printer::{Printer, PrinterInfo};
use crate::error::{ConversionError, IoFault, PollError};
use crate::protocol::{INITIALIZE, status_request_command};
use crate::raster::RasterConverter;
use crate::status::{PrinterModel, StatusFrame, StatusType};

/// Timing knobs for polling and print jobs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct DeviceTiming {
    #[builder(default = Duration::from_secs(5))]
    pub check_period: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub print_timeout: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub write_timeout: Duration,
    #[builder(default = 5)]
    pub read_attempts: u32,
    #[builder(default = Duration::from_millis(100))]
    pub read_interval: Duration,
}

impl Default for DeviceTiming {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    model: Option<PrinterModel>,
    last_status: Option<StatusFrame>,
    label_width: Option<u8>,
}

impl DeviceState {
    fn observe(&mut self, frame: StatusFrame) {
        self.model = Some(frame.model());
        self.label_width = Some(frame.media_width());
        self.last_status = Some(frame);
    }
}

#[derive(Debug)]
struct DeviceCore {
    serial: String,
    path: String,
    backend: AsyncMutex<Box<dyn PrinterBackend>>,
    state: Mutex<DeviceState>,
    converter: Arc<dyn RasterConverter>,
    timing: DeviceTiming,
}

/// A hardware-backed printer with its own status poller.
#[derive(Debug)]
pub struct PrinterDevice {
    core: Arc<DeviceCore>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl PrinterDevice {
    /// Creates a device and starts its status poller.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        serial: impl Into<String>,
        path: impl Into<String>,
        backend: Box<dyn PrinterBackend>,
        converter: Arc<dyn RasterConverter>,
        timing: DeviceTiming,
    ) -> Self {
        let core = Arc::new(DeviceCore {
            serial: serial.into(),
            path: path.into(),
            backend: AsyncMutex::new(backend),
            state: Mutex::new(DeviceState::default()),
            converter,
            timing,
        });
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(poll_loop(Arc::clone(&core), cancel.clone()));

        Self {
            core,
            cancel,
            poller: Mutex::new(Some(poller)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the most recent decoded status, if the last poll succeeded.
    #[must_use]
    pub fn last_status(&self) -> Option<StatusFrame> {
        self.core.state().last_status
    }

    /// Polls the printer once, outside the periodic cadence.
    pub async fn refresh_status(&self) {
        self.core.refresh_status().await;
    }
}

async fn poll_loop(core: Arc<DeviceCore>, cancel: CancellationToken) {
    let mut ticker = interval(core.timing.check_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if cancel.run_until_cancelled(core.refresh_status()).await.is_none() {
                    break;
                }
            }
        }
    }
    debug!(serial = %core.serial, "status poller stopped");
}

impl DeviceCore {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_fault(&self, source: io::Error) -> IoFault {
        if source.kind() == io::ErrorKind::NotConnected {
            IoFault::Closed {
                path: self.path.clone(),
            }
        } else {
            IoFault::Device {
                path: self.path.clone(),
                source,
            }
        }
    }

    #[instrument(skip(self), level = "debug", fields(serial = %self.serial))]
    async fn refresh_status(&self) {
        let result = {
            let mut backend = self.backend.lock().await;
            self.request_status(backend.as_mut()).await
        };

        match result {
            Ok(frame) => {
                debug!(
                    status_type = %frame.status_type(),
                    errors = frame.errors().bits(),
                    "status refreshed"
                );
                self.state().observe(frame);
            }
            Err(error) => {
                warn!(path = %self.path, error = %error, "status poll failed");
                self.state().last_status = None;
            }
        }
    }

    async fn request_status(
        &self,
        backend: &mut dyn PrinterBackend,
    ) -> Result<StatusFrame, PollError> {
        self.write(backend, &status_request_command()).await?;
        let reply = self.read_reply(backend).await?.ok_or(PollError::NoReply)?;
        Ok(StatusFrame::decode(&reply)?)
    }

    async fn write(
        &self,
        backend: &mut dyn PrinterBackend,
        bytes: &[u8],
    ) -> Result<(), IoFault> {
        match timeout(self.timing.write_timeout, backend.write(bytes)).await {
            Ok(result) => result.map_err(|source| self.io_fault(source)),
            Err(_elapsed) => Err(IoFault::WriteTimeout {
                path: self.path.clone(),
                timeout_ms: u64::try_from(self.timing.write_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
        }
    }

    /// Reads with bounded retry, returning the first non-empty read.
    async fn read_reply(
        &self,
        backend: &mut dyn PrinterBackend,
    ) -> Result<Option<Vec<u8>>, IoFault> {
        let attempts = self.timing.read_attempts.max(1);
        for _attempt in 0..attempts {
            let data = backend.read().await.map_err(|source| self.io_fault(source))?;
            if !data.is_empty() {
                return Ok(Some(data));
            }
            sleep(self.timing.read_interval).await;
        }
        Ok(None)
    }

    #[instrument(skip(self, image), fields(serial = %self.serial, path = %self.path))]
    async fn run_job(&self, image: DynamicImage, red: bool) -> JobOutcome {
        let mut job = PrintJob::new();
        let mut backend = self.backend.lock().await;

        let converted = match self.label_width(backend.as_mut()).await {
            Ok(label_width) => self.converter.convert(&image, label_width, true, red),
            Err(error) => Err(error),
        };
        let data = match converted {
            Ok(data) => data,
            Err(error) => {
                warn!(error = %error, "raster conversion failed");
                return job.finish(JobState::ConversionFailed);
            }
        };

        job.begin_writing();
        let outcome = match self.write(backend.as_mut(), &data).await {
            Err(error) => {
                warn!(error = %error, "failed to send print data");
                job.finish(JobState::IoFault)
            }
            Ok(()) => {
                job.await_reply();
                let awaiting = self.await_completion(backend.as_mut());
                match timeout(self.timing.print_timeout, awaiting).await {
                    Ok(terminal) => job.finish(terminal),
                    Err(_elapsed) => job.finish(JobState::TimedOut),
                }
            }
        };

        if job.needs_initialize()
            && let Err(error) = self.write(backend.as_mut(), &INITIALIZE).await
        {
            warn!(error = %error, "failed to re-initialise printer after job");
        }

        info!(outcome = %outcome, "print job finished");
        outcome
    }

    /// Returns the loaded label width, reading status once if no poll has
    /// completed since attach.
    async fn label_width(&self, backend: &mut dyn PrinterBackend) -> Result<u8, ConversionError> {
        let known = self.state().label_width;
        if let Some(width) = known {
            return Ok(width);
        }

        debug!("label width unknown; reading status before the job");
        match self.request_status(backend).await {
            Ok(frame) => {
                self.state().observe(frame);
                Ok(frame.media_width())
            }
            Err(error) => {
                warn!(error = %error, "status read before the job failed");
                Err(ConversionError::UnknownLabelWidth)
            }
        }
    }

    async fn await_completion(&self, backend: &mut dyn PrinterBackend) -> JobState {
        loop {
            match self.read_reply(backend).await {
                Ok(Some(reply)) => match StatusFrame::decode(&reply) {
                    Ok(frame) => {
                        self.state().observe(frame);
                        match frame.status_type() {
                            StatusType::ErrorOccurred => {
                                warn!(errors = ?frame.errors().active(), "printer reported an error");
                                return JobState::Errored;
                            }
                            StatusType::PrintingComplete => return JobState::Complete,
                            other => {
                                debug!(status_type = %other, phase = %frame.phase(), "job in progress");
                            }
                        }
                    }
                    Err(error) => debug!(error = %error, "ignoring undecodable reply"),
                },
                Ok(None) => continue,
                Err(error) => {
                    warn!(error = %error, "lost printer while awaiting job reply");
                    return JobState::IoFault;
                }
            }
            sleep(self.timing.read_interval).await;
        }
    }
}

#[async_trait]
impl Printer for PrinterDevice {
    fn serial(&self) -> &str {
        &self.core.serial
    }

    fn path(&self) -> &str {
        &self.core.path
    }

    async fn print_image(&self, image: DynamicImage, red: bool) -> JobOutcome {
        self.core.run_job(image, red).await
    }

    fn info(&self) -> PrinterInfo {
        let state = self.core.state();
        PrinterInfo::new(state.model, self.core.serial.clone(), state.last_status)
    }

    async fn refresh(&self) {
        self.refresh_status().await;
    }

    #[instrument(skip(self), fields(serial = %self.core.serial))]
    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller
            && let Err(error) = poller.await
        {
            warn!(error = %error, "status poller ended abnormally");
        }

        self.core.backend.lock().await.close().await;
        debug!("printer disposed");
    }
}
