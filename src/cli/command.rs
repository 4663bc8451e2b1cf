use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::error::{CliConfigError, FixtureError};
use crate::hw::{MockBus, MockFixture};

/// Command-line options for the label printer bridge.
#[derive(Debug, Parser)]
#[command(
    name = "labelbridge",
    about = "Bridge Brother QL label printers to an MQTT broker or push hub."
)]
pub struct Args {
    /// Settings file; defaults to `settings.dev.json`, `settings.json`, then the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level override; otherwise `RUST_LOG` applies.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Uses synthetic printers instead of `/dev/usb/lp*` devices.
    #[arg(long, global = true)]
    mock: bool,
    /// Mock printers in the form `serial|path;...`.
    #[arg(long, global = true)]
    mock_printers: Option<MockFixture>,
    /// Simulated mock print duration (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "mock", value_parser = parse_duration)]
    mock_print_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use labelbridge::{Args, Command};
    ///
    /// let args = Args::new(Command::Discover);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            config: None,
            log_level: None,
            output: None,
            mock: false,
            mock_printers: None,
            mock_print_delay: None,
            command,
        }
    }

    /// Enables mock printers with pre-parsed settings.
    #[must_use]
    pub fn with_mock(mut self, mock: MockArgs) -> Self {
        let MockArgs {
            fixture,
            print_delay,
        } = mock;

        self.mock = true;
        self.mock_printers = Some(fixture);
        self.mock_print_delay = Some(print_delay);
        self
    }

    #[must_use]
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command and optional mock settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a mock fixture is given without `--mock`.
    pub fn into_command_and_mock_args(self) -> anyhow::Result<(Command, Option<MockArgs>)> {
        let Args {
            mock,
            mock_printers,
            mock_print_delay,
            command,
            ..
        } = self;

        let mock_args = match (mock, mock_printers) {
            (true, fixture) => Some(MockArgs {
                fixture: fixture.unwrap_or_default(),
                print_delay: mock_print_delay.unwrap_or(Duration::ZERO),
            }),
            (false, Some(_fixture)) => return Err(CliConfigError::MockFixtureWithoutMock.into()),
            (false, None) => None,
        };

        Ok((command, mock_args))
    }
}

/// Mock printer arguments for programmatic runs.
#[derive(Debug, Clone, Builder)]
pub struct MockArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    fixture: MockFixture,
    #[builder(default)]
    print_delay: Duration,
}

impl MockArgs {
    pub(crate) fn into_bus(self) -> MockBus {
        MockBus::new(self.fixture, self.print_delay)
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Track printers and bridge them to the configured transport until Ctrl+C.
    Serve,
    /// List attached printers by serial and device path.
    Discover,
    /// Poll every attached printer once and print its status.
    Status,
    /// Print one PNG file on the printer with the given serial.
    Print(PrintArgs),
}

/// Arguments for the `print` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct PrintArgs {
    /// Serial number of the target printer.
    serial: String,
    /// PNG image to print.
    file: PathBuf,
    /// Print in two-colour mode on black/red media.
    #[arg(long)]
    red: bool,
}

impl PrintArgs {
    #[must_use]
    pub fn new(serial: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            serial: serial.into(),
            file: file.into(),
            red: false,
        }
    }

    #[must_use]
    pub fn with_red(mut self, red: bool) -> Self {
        self.red = red;
        self
    }

    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn red(&self) -> bool {
        self.red
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Command output rendering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
