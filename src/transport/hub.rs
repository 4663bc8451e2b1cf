//! Push transport speaking the JSON hub protocol over a websocket.
//!
//! Every message is a JSON object terminated by the ASCII record separator.
//! The host answers `SendPrintRequest` invocations and publishes status with
//! `ReceivePrinterInfo`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{HostStatus, Transport};
use crate::config::HubSettings;
use crate::error::{InboundMessageError, TransportError};
use crate::protocol::{PrintRequest, RequestMode};

const RECORD_SEPARATOR: char = '\u{1e}';
const HANDSHAKE_REQUEST: &str = r#"{"protocol":"json","version":1}"#;
const PRINT_REQUEST_TARGET: &str = "SendPrintRequest";
const PRINTER_INFO_TARGET: &str = "ReceivePrinterInfo";
const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
const OUTBOUND_CAPACITY: usize = 8;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

const MESSAGE_INVOCATION: u8 = 1;
const MESSAGE_PING: u8 = 6;
const MESSAGE_CLOSE: u8 = 7;

type HubStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::Sender<String>>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    connection_token: Option<String>,
    connection_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HubMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
}

enum RecordAction {
    Continue,
    Close,
}

/// Transport over a websocket hub.
#[derive(Debug)]
pub struct HubTransport {
    connector: HubConnector,
    outbound: OutboundSlot,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
struct HubConnector {
    endpoint: String,
    http: reqwest::Client,
    tls: native_tls::TlsConnector,
}

impl HubTransport {
    /// Prepares the connection. Nothing is dialled until [`Transport::start`].
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP or TLS clients cannot be built.
    pub fn new(settings: &HubSettings) -> Result<Self, TransportError> {
        let accept_invalid = !settings.verify_ssl;
        if accept_invalid {
            warn!("hub TLS certificate verification is disabled");
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid)
            .build()?;
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(accept_invalid)
            .danger_accept_invalid_hostnames(accept_invalid)
            .build()?;

        Ok(Self {
            connector: HubConnector {
                endpoint: settings.endpoint.trim_end_matches('/').to_string(),
                http,
                tls,
            },
            outbound: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    fn outbound(&self) -> Option<mpsc::Sender<String>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Rewrites an `http(s)` endpoint as a `ws(s)` URL, adding the connection token.
#[must_use]
pub(crate) fn websocket_url(endpoint: &str, connection_token: Option<&str>) -> String {
    let mut url = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    };

    if let Some(token) = connection_token {
        let separator = if url.contains('?') { '&' } else { '?' };
        url.push(separator);
        url.push_str("id=");
        url.push_str(token);
    }
    url
}

/// Converts `SendPrintRequest` arguments `[serial, mode, payload]` into a request.
///
/// PNG payloads arrive base64-encoded; URL payloads are plain strings.
///
/// # Errors
///
/// Returns an error when the argument list has the wrong shape, the mode is
/// unknown, or a PNG payload is not valid base64.
pub fn parse_invocation(arguments: &[Value]) -> Result<PrintRequest, InboundMessageError> {
    let [serial, mode, payload] = arguments else {
        return Err(InboundMessageError::ArgumentCount {
            count: arguments.len(),
        });
    };

    let serial = serial
        .as_str()
        .ok_or(InboundMessageError::ArgumentType { name: "serial" })?;
    let mode = match mode {
        Value::Number(code) => RequestMode::try_from(
            code.as_i64()
                .ok_or(InboundMessageError::ArgumentType { name: "mode" })?,
        )?,
        Value::String(name) => name.parse()?,
        _ => return Err(InboundMessageError::ArgumentType { name: "mode" }),
    };
    let payload = payload
        .as_str()
        .ok_or(InboundMessageError::ArgumentType { name: "payload" })?;
    let payload = match mode {
        RequestMode::Png => BASE64.decode(payload)?,
        RequestMode::Url => payload.as_bytes().to_vec(),
    };

    Ok(PrintRequest::new(serial, mode, payload))
}

fn frame(message: &str) -> String {
    format!("{message}{RECORD_SEPARATOR}")
}

fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

fn status_invocation(status: &HostStatus) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(status)?;
    let invocation = json!({
        "type": MESSAGE_INVOCATION,
        "target": PRINTER_INFO_TARGET,
        "arguments": [payload],
    });
    Ok(frame(&invocation.to_string()))
}

impl HubConnector {
    async fn negotiate(&self) -> Result<Option<String>, TransportError> {
        let url = format!("{}/negotiate?negotiateVersion=1", self.endpoint);
        let response: NegotiateResponse = self
            .http
            .post(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.connection_token.or(response.connection_id))
    }

    async fn connect(&self) -> Result<(HubStream, Vec<String>), TransportError> {
        let token = match self.negotiate().await {
            Ok(token) => token,
            Err(error) => {
                debug!(error = %error, "negotiation failed; connecting directly");
                None
            }
        };
        let url = websocket_url(&self.endpoint, token.as_deref());
        let (mut stream, _response) = connect_async_tls_with_config(
            url.as_str(),
            None,
            false,
            Some(Connector::NativeTls(self.tls.clone())),
        )
        .await?;

        stream
            .send(Message::Text(frame(HANDSHAKE_REQUEST).into()))
            .await?;
        let pending = wait_for_handshake(&mut stream).await?;
        Ok((stream, pending))
    }
}

/// Reads until the handshake response arrives and returns any records that
/// followed it in the same frame.
async fn wait_for_handshake(stream: &mut HubStream) -> Result<Vec<String>, TransportError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut received = records(text.as_str());
                let Some(first) = received.next() else {
                    continue;
                };
                let response: HandshakeResponse = serde_json::from_str(first)?;
                if let Some(reason) = response.error {
                    return Err(TransportError::Handshake { reason });
                }
                return Ok(received.map(str::to_string).collect());
            }
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => {}
            Some(Err(error)) => return Err(error.into()),
        }
    }
}

async fn handle_record(
    record: &str,
    requests: &mpsc::Sender<PrintRequest>,
) -> RecordAction {
    let message: HubMessage = match serde_json::from_str(record) {
        Ok(message) => message,
        Err(error) => {
            warn!(error = %error, "dropping unparseable hub message");
            return RecordAction::Continue;
        }
    };

    match message.kind {
        MESSAGE_INVOCATION if message.target.as_deref() == Some(PRINT_REQUEST_TARGET) => {
            match parse_invocation(&message.arguments) {
                Ok(request) => {
                    info!(
                        serial = request.serial(),
                        mode = %request.mode(),
                        "received print request"
                    );
                    if requests.send(request).await.is_err() {
                        return RecordAction::Close;
                    }
                }
                Err(error) => warn!(error = %error, "dropping print request"),
            }
        }
        MESSAGE_INVOCATION => {
            debug!(invocation_target = ?message.target, "ignoring invocation for unknown target");
        }
        MESSAGE_PING => {}
        MESSAGE_CLOSE => {
            info!(error = ?message.error, "hub requested close");
            return RecordAction::Close;
        }
        other => debug!(kind = other, "ignoring hub message"),
    }
    RecordAction::Continue
}

async fn run_session(
    connector: &HubConnector,
    outbound: &OutboundSlot,
    requests: &mpsc::Sender<PrintRequest>,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    let (mut stream, pending) = connector.connect().await?;
    info!(endpoint = %connector.endpoint, "connected to hub");

    for record in &pending {
        if let RecordAction::Close = handle_record(record, requests).await {
            return Err(TransportError::Closed);
        }
    }

    let (sender, mut outgoing) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    *outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    let ping = frame(&json!({ "type": MESSAGE_PING }).to_string());
    let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(error) = stream.close(None).await {
                    debug!(error = %error, "hub close handshake failed");
                }
                return Ok(());
            }
            Some(text) = outgoing.recv() => {
                send_message(&mut stream, Message::Text(text.into())).await?;
            }
            _ = keep_alive.tick() => {
                send_message(&mut stream, Message::Text(ping.clone().into())).await?;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    for record in records(text.as_str()) {
                        if let RecordAction::Close = handle_record(record, requests).await {
                            return Err(TransportError::Closed);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    send_message(&mut stream, Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error.into()),
            },
        }
    }
}

/// Sends one frame, treating a socket that stops accepting writes as dead.
async fn send_message(stream: &mut HubStream, message: Message) -> Result<(), TransportError> {
    match timeout(SEND_TIMEOUT, stream.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_elapsed) => Err(TransportError::SendTimeout),
    }
}

async fn connection_loop(
    connector: HubConnector,
    outbound: OutboundSlot,
    requests: mpsc::Sender<PrintRequest>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let result = run_session(&connector, &outbound, &requests, &cancel).await;
        outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match result {
            Ok(()) => break,
            Err(error) => warn!(error = %error, "disconnected from hub"),
        }
        if requests.is_closed() {
            break;
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(RECONNECT_INTERVAL) => {}
        }
    }
}

#[async_trait]
impl Transport for HubTransport {
    #[instrument(skip(self, status), level = "debug")]
    async fn publish(&self, status: &HostStatus) -> Result<(), TransportError> {
        let invocation = status_invocation(status)?;
        let Some(sender) = self.outbound() else {
            info!("hub not responding");
            return Err(TransportError::NotConnected);
        };
        sender.try_send(invocation).map_err(|error| match error {
            TrySendError::Full(_invocation) => {
                warn!("hub is not draining status updates; dropping this one");
                TransportError::Backlogged
            }
            TrySendError::Closed(_invocation) => {
                info!("hub not responding");
                TransportError::NotConnected
            }
        })
    }

    async fn start(&mut self, requests: mpsc::Sender<PrintRequest>) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        self.task = Some(tokio::spawn(connection_loop(
            self.connector.clone(),
            Arc::clone(&self.outbound),
            requests,
            self.cancel.clone(),
        )));
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            warn!(error = %error, "hub connection task ended abnormally");
        }
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
