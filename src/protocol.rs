use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

/// `ESC @`: resets the printer's command state.
pub(crate) const INITIALIZE: [u8; 2] = [0x1B, 0x40];

/// `ESC i S`: asks the printer for a status frame.
pub(crate) const REQUEST_STATUS: [u8; 3] = [0x1B, 0x69, 0x53];

/// Zero bytes flushed ahead of a status request to clear a half-received job.
pub(crate) const INVALIDATE_LEN: usize = 200;

/// Topic namespace shared by every label host.
pub const TOPIC_NAMESPACE: &str = "label_servers";

/// Builds the full status-request command with its invalidate preamble.
pub(crate) fn status_request_command() -> Vec<u8> {
    let mut command = vec![0x00; INVALIDATE_LEN];
    command.extend_from_slice(&INITIALIZE);
    command.extend_from_slice(&REQUEST_STATUS);
    command
}

/// Returns the status channel for one host.
#[must_use]
pub fn status_topic(host: &str) -> String {
    format!("{TOPIC_NAMESPACE}/status/{host}")
}

/// Returns the print-request channel root for one host.
#[must_use]
pub fn print_topic_root(host: &str) -> String {
    format!("{TOPIC_NAMESPACE}/print/{host}")
}

/// Payload interpretation for an inbound print request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Raw PNG bytes.
    #[strum(to_string = "png")]
    Png,
    /// A UTF-8 URL pointing at an image.
    #[strum(to_string = "url")]
    Url,
}

/// Errors returned while parsing a request mode.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RequestModeError {
    #[error("could not convert `{value}` to a request mode, must be `png` or `url`")]
    UnknownName { value: String },
    #[error("unknown request mode code {code}")]
    UnknownCode { code: i64 },
}

impl FromStr for RequestMode {
    type Err = RequestModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "url" => Ok(Self::Url),
            _ => Err(RequestModeError::UnknownName {
                value: value.to_string(),
            }),
        }
    }
}

impl TryFrom<i64> for RequestMode {
    type Error = RequestModeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Png),
            1 => Ok(Self::Url),
            _ => Err(RequestModeError::UnknownCode { code }),
        }
    }
}

/// An inbound request to print one image on one printer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PrintRequest {
    serial: String,
    mode: RequestMode,
    payload: Vec<u8>,
    red: bool,
}

impl PrintRequest {
    #[must_use]
    pub fn new(serial: impl Into<String>, mode: RequestMode, payload: Vec<u8>) -> Self {
        Self {
            serial: serial.into(),
            mode,
            payload,
            red: false,
        }
    }

    /// Requests two-colour printing on a black/red ribbon.
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
    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn red(&self) -> bool {
        self.red
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("png", RequestMode::Png)]
    #[case("PNG", RequestMode::Png)]
    #[case("Url", RequestMode::Url)]
    fn request_mode_parses_case_insensitively(#[case] raw: &str, #[case] expected: RequestMode) {
        assert_eq!(Ok(expected), raw.parse::<RequestMode>());
    }

    #[test]
    fn request_mode_rejects_unknown_name() {
        assert_matches!(
            "pdf".parse::<RequestMode>(),
            Err(RequestModeError::UnknownName { value }) if value == "pdf"
        );
    }

    #[rstest]
    #[case(0, RequestMode::Png)]
    #[case(1, RequestMode::Url)]
    fn request_mode_maps_hub_codes(#[case] code: i64, #[case] expected: RequestMode) {
        assert_eq!(Ok(expected), RequestMode::try_from(code));
    }

    #[test]
    fn status_request_is_preceded_by_invalidate() {
        let command = status_request_command();
        assert_eq!(INVALIDATE_LEN + 5, command.len());
        assert!(command[..INVALIDATE_LEN].iter().all(|byte| *byte == 0));
        assert_eq!(&[0x1B_u8, 0x40, 0x1B, 0x69, 0x53][..], &command[INVALIDATE_LEN..]);
    }

    #[test]
    fn topics_are_scoped_to_host() {
        assert_eq!("label_servers/status/pi-01", status_topic("pi-01"));
        assert_eq!("label_servers/print/pi-01", print_topic_root("pi-01"));
    }
}
