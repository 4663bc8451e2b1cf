use std::fmt::Debug;

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

use super::job::JobOutcome;
use crate::status::{PrinterModel, StatusFrame};

/// A label printer tracked by the host.
#[async_trait]
pub trait Printer: Debug + Send + Sync {
    fn serial(&self) -> &str;

    fn path(&self) -> &str;

    /// Prints one image and waits for a terminal outcome.
    async fn print_image(&self, image: DynamicImage, red: bool) -> JobOutcome;

    /// Returns the printer's last-known identity and status.
    fn info(&self) -> PrinterInfo;

    /// Refreshes the status outside the periodic cadence.
    async fn refresh(&self) {}

    /// Stops background work and releases the device. Safe to call twice.
    async fn dispose(&self);
}

/// Snapshot of one printer for status publication.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PrinterInfo {
    model: Option<PrinterModel>,
    serial: String,
    status: Option<StatusFrame>,
}

impl PrinterInfo {
    #[must_use]
    pub fn new(
        model: Option<PrinterModel>,
        serial: impl Into<String>,
        status: Option<StatusFrame>,
    ) -> Self {
        Self {
            model,
            serial: serial.into(),
            status,
        }
    }

    #[must_use]
    pub fn model(&self) -> Option<PrinterModel> {
        self.model
    }

    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    #[must_use]
    pub fn status(&self) -> Option<&StatusFrame> {
        self.status.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_serialises_as_null() {
        let info = PrinterInfo::new(None, "A123", None);
        let json = serde_json::to_string(&info).expect("info should serialise");
        insta::assert_snapshot!(json, @r#"{"model":null,"serial":"A123","status":null}"#);
    }
}
