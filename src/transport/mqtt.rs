use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, Publish, QoS, TlsConfiguration,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{HostStatus, Transport};
use crate::config::MqttSettings;
use crate::error::{ConfigError, InboundMessageError, TransportError};
use crate::protocol::{PrintRequest, RequestMode, print_topic_root, status_topic};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CHANNEL_CAPACITY: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const OFFLINE_PAYLOAD: &str = r#"{"online": false}"#;

/// Transport over an MQTT broker.
pub struct MqttTransport {
    client: AsyncClient,
    // The event loop is `!Sync`; it only leaves this slot once, in `start`.
    eventloop: Mutex<Option<EventLoop>>,
    status_topic: String,
    print_root: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("status_topic", &self.status_topic)
            .field("print_root", &self.print_root)
            .finish_non_exhaustive()
    }
}

impl MqttTransport {
    /// Configures the client. No connection is made until [`Transport::start`].
    ///
    /// # Errors
    ///
    /// Returns an error when the configured CA file cannot be read.
    pub fn new(settings: &MqttSettings, host: &str) -> Result<Self, ConfigError> {
        let status_topic = status_topic(host);
        let mut options = MqttOptions::new(
            host,
            settings.mqtt_broker_host.clone(),
            settings.mqtt_broker_port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        options.set_last_will(LastWill::new(
            status_topic.clone(),
            OFFLINE_PAYLOAD,
            QoS::AtLeastOnce,
            false,
        ));

        if let Some(ca_path) = settings
            .tls_cafile
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            let ca = std::fs::read(ca_path).map_err(|source| ConfigError::CaFile {
                path: ca_path.clone(),
                source,
            })?;
            options.set_transport(rumqttc::Transport::tls_with_config(
                TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                },
            ));
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        Ok(Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            status_topic,
            print_root: print_topic_root(host),
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

/// Parses `<root>/<serial>/<mode>[/...]` into a serial and request mode.
///
/// # Errors
///
/// Returns an error when the topic is outside `root`, lacks a serial or mode
/// segment, or names an unknown mode.
pub fn parse_print_topic(
    root: &str,
    topic: &str,
) -> Result<(String, RequestMode), InboundMessageError> {
    let suffix = topic
        .strip_prefix(root)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .ok_or_else(|| InboundMessageError::UnexpectedTopic {
            topic: topic.to_string(),
        })?
        .trim_matches('/');

    let mut segments = suffix.split('/');
    match (segments.next(), segments.next()) {
        (Some(serial), Some(mode)) if !serial.is_empty() && !mode.is_empty() => {
            Ok((serial.to_string(), mode.parse()?))
        }
        _ => Err(InboundMessageError::MalformedTopic {
            suffix: suffix.to_string(),
        }),
    }
}

fn request_from_publish(
    root: &str,
    publish: &Publish,
) -> Result<PrintRequest, InboundMessageError> {
    let (serial, mode) = parse_print_topic(root, &publish.topic)?;
    Ok(PrintRequest::new(serial, mode, publish.payload.to_vec()))
}

async fn drive_eventloop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    print_root: String,
    requests: mpsc::Sender<PrintRequest>,
    cancel: CancellationToken,
) {
    let subscription = format!("{print_root}/#");

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "connected to MQTT broker");
                info!(topic = %subscription, "subscribing to print requests");
                if let Err(error) = client.try_subscribe(subscription.as_str(), QoS::AtLeastOnce)
                {
                    warn!(error = %error, "failed to queue subscription");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                info!(topic = %publish.topic, "received print request");
                match request_from_publish(&print_root, &publish) {
                    Ok(request) => {
                        if requests.send(request).await.is_err() {
                            debug!("request channel closed; stopping MQTT event loop");
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(topic = %publish.topic, error = %error, "dropping message");
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!(error = %error, "MQTT connection error; retrying");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    #[instrument(skip(self, status), level = "debug", fields(topic = %self.status_topic))]
    async fn publish(&self, status: &HostStatus) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(status)?;
        self.client
            .try_publish(self.status_topic.as_str(), QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }

    async fn start(&mut self, requests: mpsc::Sender<PrintRequest>) -> Result<(), TransportError> {
        let eventloop = self
            .eventloop
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyStarted)?;
        self.task = Some(tokio::spawn(drive_eventloop(
            eventloop,
            self.client.clone(),
            self.print_root.clone(),
            requests,
            self.cancel.clone(),
        )));
        Ok(())
    }

    async fn shutdown(&mut self) {
        let offline = self.client.try_publish(
            self.status_topic.as_str(),
            QoS::AtLeastOnce,
            false,
            OFFLINE_PAYLOAD,
        );
        if let Err(error) = offline {
            debug!(error = %error, "could not queue offline status");
        }
        if let Err(error) = self.client.try_disconnect() {
            debug!(error = %error, "could not queue MQTT disconnect");
        }
        // Give the event loop a moment to flush the disconnect.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            warn!(error = %error, "MQTT event loop ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::protocol::RequestModeError;

    const ROOT: &str = "label_servers/print/pi-01";

    #[rstest]
    #[case("label_servers/print/pi-01/A123/png", "A123", RequestMode::Png)]
    #[case("label_servers/print/pi-01/A123/URL", "A123", RequestMode::Url)]
    #[case("label_servers/print/pi-01/A123/png/extra", "A123", RequestMode::Png)]
    fn print_topic_parses(
        #[case] topic: &str,
        #[case] serial: &str,
        #[case] mode: RequestMode,
    ) {
        let parsed = parse_print_topic(ROOT, topic).expect("topic should parse");
        assert_eq!((serial.to_string(), mode), parsed);
    }

    #[rstest]
    #[case("label_servers/print/pi-01")]
    #[case("label_servers/print/pi-01/A123")]
    #[case("label_servers/print/pi-01//png")]
    fn truncated_topic_is_malformed(#[case] topic: &str) {
        assert_matches!(
            parse_print_topic(ROOT, topic),
            Err(InboundMessageError::MalformedTopic { .. })
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert_matches!(
            parse_print_topic(ROOT, "label_servers/print/pi-01/A123/pdf"),
            Err(InboundMessageError::Mode(RequestModeError::UnknownName { .. }))
        );
    }

    #[rstest]
    #[case("label_servers/print/pi-02/A123/png")]
    #[case("label_servers/print/pi-010/A123/png")]
    fn foreign_topic_is_rejected(#[case] topic: &str) {
        assert_matches!(
            parse_print_topic(ROOT, topic),
            Err(InboundMessageError::UnexpectedTopic { .. })
        );
    }

    #[tokio::test]
    async fn publish_queues_status_json() {
        let settings = MqttSettings::builder().mqtt_broker_host("localhost").build();
        let transport = MqttTransport::new(&settings, "pi-01").expect("transport should build");

        let status = HostStatus::new("127.0.0.1", "pi-01", 5.0, Vec::new());
        assert!(transport.publish(&status).await.is_ok());
    }

    #[test]
    fn missing_ca_file_is_config_error() {
        let settings = MqttSettings::builder()
            .mqtt_broker_host("localhost")
            .tls_cafile("/nonexistent/ca.pem".into())
            .build();
        assert_matches!(
            MqttTransport::new(&settings, "pi-01"),
            Err(ConfigError::CaFile { .. })
        );
    }
}
