use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, instrument};

use crate::cli::OutputFormat;
use crate::hw::PrinterBus;
use crate::terminal::TerminalClient;

use super::ui::{FoundPrintersView, Painter};

/// Executes the `discover` command.
#[instrument(skip(bus, out, terminal_client), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    bus: Arc<dyn PrinterBus>,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let printers = bus.discover().await;
    info!(count = printers.len(), "discovery finished");

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", FoundPrintersView::new(&printers, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &printers)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
