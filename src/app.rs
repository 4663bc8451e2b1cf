use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::cli::{Command, LogLevel, MockArgs, OutputFormat};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::hw::{DeviceTiming, KernelBus, PrinterBus};
use crate::print_manager::ReqwestFetcher;
use crate::raster::UnavailableRaster;
use crate::registry::PrinterRegistry;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a bus over `/dev/usb/lp*` printer nodes.
#[must_use]
pub fn kernel_printer_bus(timing: DeviceTiming) -> Arc<dyn PrinterBus> {
    Arc::new(KernelBus::new(Arc::new(UnavailableRaster), timing))
}

/// Creates a bus of synthetic printers.
#[must_use]
pub fn mock_printer_bus(mock_args: MockArgs) -> Arc<dyn PrinterBus> {
    Arc::new(mock_args.into_bus())
}

/// Derives per-device timing from loaded settings.
#[must_use]
pub fn device_timing(settings: &Settings) -> DeviceTiming {
    DeviceTiming::builder()
        .check_period(settings.printer_check_period())
        .print_timeout(settings.print_timeout())
        .build()
}

/// Runs the CLI command against the real terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = labelbridge::Args::try_parse_from([
///     "labelbridge",
///     "--mock",
///     "--mock-printers",
///     "A1|mock://a",
///     "--output",
///     "json",
///     "discover",
/// ])?;
/// let config = args.config().map(std::path::Path::to_path_buf);
/// let (command, maybe_mock_args) = args.into_command_and_mock_args()?;
/// let mut out = Vec::new();
/// labelbridge::run(
///     command,
///     &mut out,
///     maybe_mock_args,
///     config.as_deref(),
///     None,
///     labelbridge::OutputFormat::Json,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, settings are invalid,
/// the command fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    mock_args: Option<MockArgs>,
    config: Option<&Path>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        mock_args,
        config,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, settings are invalid,
/// the command fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, mock_args, config),
    level = "info",
    fields(command = %command_name(&command), mock = mock_args.is_some())
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    mock_args: Option<MockArgs>,
    config: Option<&Path>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "labelbridge",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Serve => {
            let settings = Settings::load(config)?;
            let bus = select_bus(mock_args, device_timing(&settings));
            crate::cli::serve::run(settings, bus).await
        }
        Command::Discover => {
            let bus = command_bus(mock_args, config)?;
            crate::cli::discover::run(bus, out, terminal_client, output_format).await
        }
        Command::Status => {
            let registry = registry(command_bus(mock_args, config)?);
            crate::cli::status::run(registry, out, terminal_client, output_format).await
        }
        Command::Print(args) => {
            let registry = registry(command_bus(mock_args, config)?);
            crate::cli::print::run(registry, &args, out, terminal_client, output_format).await
        }
    }
}

/// Settings are optional outside `serve` unless a path was given explicitly.
fn command_bus(
    mock_args: Option<MockArgs>,
    config: Option<&Path>,
) -> Result<Arc<dyn PrinterBus>, ConfigError> {
    let timing = match Settings::load(config) {
        Ok(settings) => device_timing(&settings),
        Err(ConfigError::NotFound { searched }) if config.is_none() => {
            debug!(?searched, "no settings file; using default device timing");
            DeviceTiming::default()
        }
        Err(error) => return Err(error),
    };
    Ok(select_bus(mock_args, timing))
}

fn select_bus(mock_args: Option<MockArgs>, timing: DeviceTiming) -> Arc<dyn PrinterBus> {
    match mock_args {
        Some(mock_args) => mock_printer_bus(mock_args),
        None => kernel_printer_bus(timing),
    }
}

fn registry(bus: Arc<dyn PrinterBus>) -> PrinterRegistry {
    PrinterRegistry::new(bus, Arc::new(ReqwestFetcher::default()))
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Serve => "serve",
        Command::Discover => "discover",
        Command::Status => "status",
        Command::Print(_args) => "print",
    }
}
