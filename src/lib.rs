mod app;
mod cli;
mod config;
mod error;
mod host;
mod hw;
mod print_manager;
mod protocol;
mod raster;
mod registry;
mod status;
mod telemetry;
mod terminal;
mod transport;
mod utils;

pub use app::{
    device_timing, kernel_printer_bus, mock_printer_bus, run, run_with_clients,
};
pub use cli::{Args, Command, LogLevel, MockArgs, OutputFormat, PrintArgs};
pub use config::{HubSettings, MqttSettings, Settings, TransportMode};
pub use error::{
    BridgeError, ConfigError, ConversionError, FetchError, FixtureError, InboundMessageError,
    IoFault, PrintError, TransportError,
};
pub use host::HostLoop;
pub use hw::{
    DEFAULT_MOCK_PRINTERS, DeviceTiming, FakeBackend, FakeBackendConfig, FakeBackendProbe,
    FakeReply, FoundPrinter, JobOutcome, JobState, KernelBus, KernelLpBackend, MockBus,
    MockFixture, MockPrinter, Printer, PrinterBackend, PrinterBus, PrinterDevice, PrinterInfo,
};
pub use print_manager::{FixtureFetcher, ImageFetcher, PrintManager, ReqwestFetcher};
pub use protocol::{
    PrintRequest, RequestMode, RequestModeError, TOPIC_NAMESPACE, print_topic_root, status_topic,
};
pub use raster::{RasterConverter, UnavailableRaster};
pub use registry::{PrinterRegistry, ReconcileSummary};
pub use status::{
    DecodeError, ErrorFlags, FRAME_LENGTH, MediaType, Phase, PrinterModel, StatusFrame,
    StatusType,
};
pub use terminal::{SystemTerminalClient, TerminalClient};
pub use transport::{
    HostStatus, HubTransport, MqttTransport, Transport, parse_invocation, parse_print_topic,
    transport_from_settings,
};
