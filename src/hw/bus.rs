use std::collections::HashSet;
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::backend::KernelLpBackend;
use super::device::{DeviceTiming, PrinterDevice};
use super::discovery::{self, DEFAULT_DEV_DIR, DEFAULT_SYSFS_CLASS_DIR};
use super::mock::MockPrinter;
use super::printer::Printer;
use crate::error::FixtureError;
use crate::raster::RasterConverter;

/// Default fixture used when mock mode is enabled without explicit printers.
pub const DEFAULT_MOCK_PRINTERS: &str = "MOCK0001|mock://0";

/// A printer reported by discovery.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct FoundPrinter {
    serial: String,
    path: String,
}

impl FoundPrinter {
    #[must_use]
    pub fn new(serial: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Source of attachable printers.
#[async_trait]
pub trait PrinterBus: Debug + Send + Sync {
    /// Lists currently attached printers. Returns an empty list on hosts
    /// without hardware.
    async fn discover(&self) -> Vec<FoundPrinter>;

    /// Builds a live printer for a discovered device, starting its poller.
    fn attach(&self, found: &FoundPrinter) -> Arc<dyn Printer>;
}

/// Bus over the Linux `usblp` driver.
#[derive(Debug)]
pub struct KernelBus {
    dev_dir: PathBuf,
    sysfs_class_dir: PathBuf,
    converter: Arc<dyn RasterConverter>,
    timing: DeviceTiming,
}

impl KernelBus {
    #[must_use]
    pub fn new(converter: Arc<dyn RasterConverter>, timing: DeviceTiming) -> Self {
        Self::with_roots(DEFAULT_DEV_DIR, DEFAULT_SYSFS_CLASS_DIR, converter, timing)
    }

    /// Uses alternative `/dev/usb` and `/sys/class/usbmisc` roots.
    #[must_use]
    pub fn with_roots(
        dev_dir: impl Into<PathBuf>,
        sysfs_class_dir: impl Into<PathBuf>,
        converter: Arc<dyn RasterConverter>,
        timing: DeviceTiming,
    ) -> Self {
        Self {
            dev_dir: dev_dir.into(),
            sysfs_class_dir: sysfs_class_dir.into(),
            converter,
            timing,
        }
    }
}

#[async_trait]
impl PrinterBus for KernelBus {
    async fn discover(&self) -> Vec<FoundPrinter> {
        let dev_dir = self.dev_dir.clone();
        let sysfs_class_dir = self.sysfs_class_dir.clone();
        match tokio::task::spawn_blocking(move || discovery::scan(&dev_dir, &sysfs_class_dir))
            .await
        {
            Ok(found) => found,
            Err(error) => {
                warn!(error = %error, "printer discovery task failed");
                Vec::new()
            }
        }
    }

    fn attach(&self, found: &FoundPrinter) -> Arc<dyn Printer> {
        Arc::new(PrinterDevice::spawn(
            found.serial(),
            found.path(),
            Box::new(KernelLpBackend::new(found.path())),
            Arc::clone(&self.converter),
            self.timing,
        ))
    }
}

/// Parsed `SERIAL|PATH;...` mock printer fixture.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Into)]
pub struct MockFixture {
    printers: Vec<FoundPrinter>,
}

impl FromStr for MockFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let mut seen = HashSet::new();
        let printers = value
            .split(';')
            .map(|record| {
                let fields: Vec<&str> = record.split('|').map(str::trim).collect();
                let [serial, path] = fields.as_slice() else {
                    return Err(FixtureError::InvalidRecordFieldCount);
                };
                if serial.is_empty() || path.is_empty() {
                    return Err(FixtureError::EmptyRecordField);
                }
                if !seen.insert(serial.to_string()) {
                    return Err(FixtureError::DuplicateSerial {
                        serial: serial.to_string(),
                    });
                }
                Ok(FoundPrinter::new(*serial, *path))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { printers })
    }
}

impl Default for MockFixture {
    fn default() -> Self {
        Self {
            printers: vec![FoundPrinter::new("MOCK0001", "mock://0")],
        }
    }
}

/// Bus that reports a fixed set of synthetic printers.
#[derive(Debug)]
pub struct MockBus {
    printers: Vec<FoundPrinter>,
    print_delay: Duration,
}

impl MockBus {
    #[must_use]
    pub fn new(fixture: MockFixture, print_delay: Duration) -> Self {
        info!("using mock printer bus");
        Self {
            printers: fixture.into(),
            print_delay,
        }
    }
}

#[async_trait]
impl PrinterBus for MockBus {
    async fn discover(&self) -> Vec<FoundPrinter> {
        self.printers.clone()
    }

    fn attach(&self, found: &FoundPrinter) -> Arc<dyn Printer> {
        Arc::new(MockPrinter::new(
            found.serial(),
            found.path(),
            self.print_delay,
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("A1|mock://a", 1)]
    #[case("A1|mock://a;B2|mock://b", 2)]
    #[case(" A1 | mock://a ; B2|mock://b", 2)]
    fn mock_fixture_parses_records(#[case] raw: &str, #[case] expected: usize) {
        let printers: Vec<FoundPrinter> = raw.parse::<MockFixture>().expect("should parse").into();
        assert_eq!(expected, printers.len());
    }

    #[rstest]
    #[case("", FixtureError::EmptyFixture)]
    #[case("A1", FixtureError::InvalidRecordFieldCount)]
    #[case("A1|mock://a|extra", FixtureError::InvalidRecordFieldCount)]
    #[case("|mock://a", FixtureError::EmptyRecordField)]
    #[case("A1|a;A1|b", FixtureError::DuplicateSerial { serial: "A1".to_string() })]
    fn mock_fixture_rejects_bad_records(#[case] raw: &str, #[case] expected: FixtureError) {
        assert_eq!(Err(expected), raw.parse::<MockFixture>());
    }

    #[test]
    fn default_fixture_matches_documented_default() {
        assert_eq!(
            MockFixture::default(),
            DEFAULT_MOCK_PRINTERS.parse().expect("default should parse")
        );
    }

    #[tokio::test]
    async fn mock_bus_attaches_mock_printers() {
        let bus = MockBus::new(MockFixture::default(), Duration::ZERO);
        let found = bus.discover().await;
        assert_matches!(found.as_slice(), [printer] if printer.serial() == "MOCK0001");

        let printer = bus.attach(&found[0]);
        assert_eq!("mock://0", printer.path());
        assert!(printer.info().status().is_some());
    }
}
