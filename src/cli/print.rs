use std::io;

use anyhow::{Context, Result, bail};
use tracing::instrument;

use crate::cli::{OutputFormat, PrintArgs};
use crate::protocol::{PrintRequest, RequestMode};
use crate::registry::PrinterRegistry;
use crate::terminal::TerminalClient;

use super::ui::{Painter, Table};

/// Executes the `print` command for a single PNG file.
#[instrument(
    skip(registry, out, terminal_client),
    level = "info",
    fields(serial = args.serial(), file = %args.file().display())
)]
pub(crate) async fn run<W>(
    mut registry: PrinterRegistry,
    args: &PrintArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let payload = std::fs::read(args.file())
        .with_context(|| format!("failed to read {}", args.file().display()))?;
    let request =
        PrintRequest::new(args.serial(), RequestMode::Png, payload).with_red(args.red());

    registry.reconcile().await;
    registry.refresh_all().await;
    let result = match registry.manager(request.serial()) {
        Ok(manager) => manager.handle(&request).await,
        Err(error) => Err(error),
    };
    registry.dispose_all().await;
    let outcome = result?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            let table = Table::key_value(
                &painter,
                vec![
                    ("serial", painter.value(args.serial())),
                    ("file", args.file().display().to_string()),
                    ("outcome", painter.outcome(outcome)),
                ],
            );
            writeln!(out, "{table}")?;
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "serial": args.serial(),
                "outcome": outcome,
            });
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    if !outcome.is_success() {
        bail!("print job on {} ended with {outcome}", args.serial());
    }
    Ok(())
}
