use std::fmt::{self, Display, Formatter};

use crate::hw::{FoundPrinter, PrinterInfo};
use crate::status::StatusFrame;
use crate::utils::format_optional;

use super::painter::Painter;
use super::table::Table;

/// Renders discovered printers as a serial/path table.
pub(crate) struct FoundPrintersView<'a> {
    printers: &'a [FoundPrinter],
    painter: &'a Painter,
}

impl<'a> FoundPrintersView<'a> {
    pub(crate) fn new(printers: &'a [FoundPrinter], painter: &'a Painter) -> Self {
        Self { printers, painter }
    }
}

impl Display for FoundPrintersView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.printers.is_empty() {
            return write!(f, "{}", self.painter.muted("no printers found"));
        }

        let rows = self
            .printers
            .iter()
            .map(|printer| {
                vec![
                    self.painter.value(printer.serial()),
                    printer.path().to_string(),
                ]
            })
            .collect();
        write!(f, "{}", Table::grid(["serial", "path"], rows))
    }
}

/// Renders tracked printers with their last-known status.
pub(crate) struct PrinterStatusView<'a> {
    printers: &'a [PrinterInfo],
    painter: &'a Painter,
}

impl<'a> PrinterStatusView<'a> {
    pub(crate) fn new(printers: &'a [PrinterInfo], painter: &'a Painter) -> Self {
        Self { printers, painter }
    }

    fn row(&self, info: &PrinterInfo) -> Vec<String> {
        let model = format_optional(info.model());
        let Some(status) = info.status() else {
            return vec![
                self.painter.value(info.serial()),
                model,
                self.painter.muted("-"),
                self.painter.warning("unknown"),
                self.painter.muted("-"),
            ];
        };

        vec![
            self.painter.value(info.serial()),
            model,
            media(status),
            status.phase().to_string(),
            self.errors(status),
        ]
    }

    fn errors(&self, status: &StatusFrame) -> String {
        let errors = status.errors();
        if errors.is_empty() {
            self.painter.success("none")
        } else {
            self.painter.warning(errors.active().join(", "))
        }
    }
}

fn media(status: &StatusFrame) -> String {
    format!("{}mm {}", status.media_width(), status.media_type())
}

impl Display for PrinterStatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.printers.is_empty() {
            return write!(f, "{}", self.painter.muted("no printers attached"));
        }

        let rows = self.printers.iter().map(|info| self.row(info)).collect();
        write!(
            f,
            "{}",
            Table::grid(["serial", "model", "media", "phase", "errors"], rows)
        )
    }
}
