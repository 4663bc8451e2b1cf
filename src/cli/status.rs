use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::registry::PrinterRegistry;
use crate::terminal::TerminalClient;

use super::ui::{Painter, PrinterStatusView};

/// Executes the `status` command: attach, poll once, report, release.
#[instrument(skip(registry, out, terminal_client), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    mut registry: PrinterRegistry,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    registry.reconcile().await;
    registry.refresh_all().await;
    let printers = registry.printers();
    registry.dispose_all().await;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", PrinterStatusView::new(&printers, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &printers)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
