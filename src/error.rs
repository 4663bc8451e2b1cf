use std::path::PathBuf;

use derive_more::From;
use thiserror::Error;

use crate::protocol::RequestModeError;
use crate::status::DecodeError;

/// Faults raised by a printer's raw I/O backend.
#[derive(Debug, Error)]
pub enum IoFault {
    #[error("device I/O failed on `{path}`")]
    Device {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("device backend for `{path}` has been closed")]
    Closed { path: String },
    #[error("timed out after {timeout_ms}ms writing to `{path}`")]
    WriteTimeout { path: String, timeout_ms: u64 },
}

/// Reasons a periodic status poll produced no status.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Io(#[from] IoFault),
    #[error("printer did not answer the status request")]
    NoReply,
    #[error("printer sent an undecodable status frame")]
    Decode(#[from] DecodeError),
}

/// Errors returned by a raster converter.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("label width is not known yet; no status has been read from the printer")]
    UnknownLabelWidth,
    #[error("no raster converter is configured for this host")]
    Unavailable,
    #[error("raster conversion failed: {reason}")]
    Failed { reason: String },
}

/// Errors returned by an image fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to `{url}` failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` answered with HTTP status {status}")]
    Status { url: String, status: u16 },
    #[error("no fixture registered for `{url}`")]
    MissingFixture { url: String },
}

/// Errors returned by the print manager before a job reaches the device.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("request payload is not a valid image")]
    InvalidImage(#[source] image::ImageError),
    #[error("request payload is not a UTF-8 URL")]
    InvalidUrl(#[source] std::string::FromUtf8Error),
    #[error("failed to fetch image")]
    FetchFailed(#[source] FetchError),
    #[error("no printer with serial `{serial}` is attached")]
    DeviceNotFound { serial: String },
}

/// Errors returned while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no settings file found; looked in {}", searched.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", "))]
    NotFound { searched: Vec<PathBuf> },
    #[error("failed to read settings file `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("transport mode `{mode}` requires a `{block}` settings block")]
    MissingTransportBlock { mode: String, block: &'static str },
    #[error("`{field}` must be greater than zero")]
    ZeroPeriod { field: &'static str },
    #[error("failed to read TLS CA file `{}`", path.display())]
    CaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by a status/print transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client request failed")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("hub websocket failed")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to build TLS connector")]
    Tls(#[from] native_tls::Error),
    #[error("failed to encode or decode transport JSON")]
    Json(#[from] serde_json::Error),
    #[error("hub negotiation request failed")]
    Negotiate(#[from] reqwest::Error),
    #[error("hub rejected the handshake: {reason}")]
    Handshake { reason: String },
    #[error("hub closed the connection")]
    Closed,
    #[error("hub is not responding")]
    NotConnected,
    #[error("hub outbound queue is full")]
    Backlogged,
    #[error("hub stopped accepting writes")]
    SendTimeout,
    #[error("transport has already been started")]
    AlreadyStarted,
}

/// Reasons an inbound transport message is dropped before routing.
#[derive(Debug, Error)]
pub enum InboundMessageError {
    #[error("topic `{topic}` is not a print request topic")]
    UnexpectedTopic { topic: String },
    #[error("print request topics must end in `<serial>/<mode>`, got `{suffix}`")]
    MalformedTopic { suffix: String },
    #[error(transparent)]
    Mode(#[from] RequestModeError),
    #[error("hub print request must carry three arguments, got {count}")]
    ArgumentCount { count: usize },
    #[error("hub print request argument `{name}` has the wrong type")]
    ArgumentType { name: &'static str },
    #[error("hub PNG payload is not valid base64")]
    Base64(#[from] base64::DecodeError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("`--mock-printers` was given without `--mock`")]
    MockFixtureWithoutMock,
}

/// Errors returned when parsing mock printer fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("the mock printer fixture is empty")]
    EmptyFixture,
    #[error("mock printer records must contain two pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("mock printer records cannot contain empty fields")]
    EmptyRecordField,
    #[error("mock printer serial `{serial}` appears more than once")]
    DuplicateSerial { serial: String },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level bridge errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum BridgeError {
    #[error(transparent)]
    #[from(ConfigError, Box<ConfigError>)]
    Config(Box<ConfigError>),
    #[error(transparent)]
    #[from(TransportError, Box<TransportError>)]
    Transport(Box<TransportError>),
}
