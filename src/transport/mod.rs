mod hub;
mod mqtt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{Settings, TransportMode};
use crate::error::{BridgeError, ConfigError, TransportError};
use crate::hw::PrinterInfo;
use crate::protocol::PrintRequest;

pub use self::hub::{HubTransport, parse_invocation};
pub use self::mqtt::{MqttTransport, parse_print_topic};

/// Snapshot of this host and its printers, published every status cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    online: bool,
    ip: String,
    host: String,
    update_s: f64,
    printers: Vec<PrinterInfo>,
}

impl HostStatus {
    #[must_use]
    pub fn new(
        ip: impl Into<String>,
        host: impl Into<String>,
        update_s: f64,
        printers: Vec<PrinterInfo>,
    ) -> Self {
        Self {
            online: true,
            ip: ip.into(),
            host: host.into(),
            update_s,
            printers,
        }
    }

    #[must_use]
    pub fn online(&self) -> bool {
        self.online
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub fn printers(&self) -> &[PrinterInfo] {
        &self.printers
    }
}

/// Carries status out and print requests in.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes one status snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot could not be handed to the
    /// transport. Callers log and carry on.
    async fn publish(&self, status: &HostStatus) -> Result<(), TransportError>;

    /// Starts delivering inbound print requests to `requests`.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot start its background task.
    async fn start(&mut self, requests: mpsc::Sender<PrintRequest>) -> Result<(), TransportError>;

    /// Stops background work and disconnects.
    async fn shutdown(&mut self);
}

/// Builds the transport selected by `settings.mode`.
///
/// # Errors
///
/// Returns an error when the matching settings block is missing or its TLS
/// material cannot be loaded.
pub fn transport_from_settings(
    settings: &Settings,
    host: &str,
) -> Result<Box<dyn Transport>, BridgeError> {
    let transport: Box<dyn Transport> = match settings.mode {
        TransportMode::Mqtt => {
            let mqtt = settings
                .mqtt
                .as_ref()
                .ok_or(ConfigError::MissingTransportBlock {
                    mode: settings.mode.to_string(),
                    block: "mqtt",
                })?;
            info!(broker = %mqtt.mqtt_broker_host, port = mqtt.mqtt_broker_port, "using MQTT transport");
            Box::new(MqttTransport::new(mqtt, host)?)
        }
        TransportMode::Hub => {
            let hub = settings
                .hub
                .as_ref()
                .ok_or(ConfigError::MissingTransportBlock {
                    mode: settings.mode.to_string(),
                    block: "signalr",
                })?;
            info!(endpoint = %hub.endpoint, "using hub transport");
            Box::new(HubTransport::new(hub)?)
        }
    };

    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{MediaType, PrinterModel, StatusFrame};

    #[test]
    fn host_status_uses_wire_field_names() {
        let frame = StatusFrame::synthetic(PrinterModel::Ql800, 29, MediaType::DieCut);
        let status = HostStatus::new(
            "10.1.2.3",
            "pi-01",
            5.0,
            vec![
                PrinterInfo::new(Some(PrinterModel::Ql800), "A1", Some(frame)),
                PrinterInfo::new(None, "B2", None),
            ],
        );

        let json = serde_json::to_string(&status).expect("status should serialise");
        insta::assert_snapshot!(
            json,
            @r#"{"online":true,"ip":"10.1.2.3","host":"pi-01","update_s":5.0,"printers":[{"model":"QL-800","serial":"A1","status":{"model":"QL-800","media_width":29,"media_length":0,"media_type":"die_cut","errors":0,"status_type":"reply","phase":"receiving","notification":0}},{"model":null,"serial":"B2","status":null}]}"#
        );
    }
}
