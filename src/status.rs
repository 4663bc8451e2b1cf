use serde::Serialize;
use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tracing::instrument;

/// Exact length of a status report frame.
pub const FRAME_LENGTH: usize = 32;

const FRAME_HEADER: [u8; 3] = [0x80, 0x20, 0x42];
const MODEL_OFFSET: usize = 3;
const ERROR_FLAGS_OFFSET: usize = 8;
const MEDIA_WIDTH_OFFSET: usize = 10;
const MEDIA_TYPE_OFFSET: usize = 11;
const MEDIA_LENGTH_OFFSET: usize = 17;
const STATUS_TYPE_OFFSET: usize = 18;
const PHASE_OFFSET: usize = 19;
const NOTIFICATION_OFFSET: usize = 22;

/// Errors returned while decoding a status frame.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// The buffer is shorter than a full status frame.
    #[error("status frame is too short: expected {FRAME_LENGTH} bytes, got {actual}")]
    FrameTooShort { actual: usize },
    /// The buffer is longer than a status frame.
    #[error("status frame length mismatch: expected {FRAME_LENGTH} bytes, got {actual}")]
    FrameLengthMismatch { actual: usize },
    /// The status-type byte is not a known value.
    #[error("unknown status type code 0x{code:02X}")]
    UnknownStatusCode { code: u8 },
    /// The phase byte is not a known value.
    #[error("unknown phase code 0x{code:02X}")]
    UnknownPhaseCode { code: u8 },
}

/// Printer model reported in bytes `3..5` of the status frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, SerializeDisplay)]
pub enum PrinterModel {
    #[strum(to_string = "QL-500")]
    Ql500,
    #[strum(to_string = "QL-550")]
    Ql550,
    #[strum(to_string = "QL-560")]
    Ql560,
    #[strum(to_string = "QL-570")]
    Ql570,
    #[strum(to_string = "QL-580N")]
    Ql580N,
    #[strum(to_string = "QL-650TD")]
    Ql650Td,
    #[strum(to_string = "QL-700")]
    Ql700,
    #[strum(to_string = "QL-710W")]
    Ql710W,
    #[strum(to_string = "QL-720NW")]
    Ql720Nw,
    #[strum(to_string = "QL-800")]
    Ql800,
    #[strum(to_string = "QL-810W")]
    Ql810W,
    #[strum(to_string = "QL-820NWB")]
    Ql820Nwb,
    #[strum(to_string = "QL-1050")]
    Ql1050,
    #[strum(to_string = "QL-1060N")]
    Ql1060N,
    #[strum(to_string = "QL-1100")]
    Ql1100,
    #[strum(to_string = "QL-1110NWB")]
    Ql1110Nwb,
    /// A model code missing from the lookup table.
    #[strum(to_string = "Unknown")]
    Unknown,
}

impl PrinterModel {
    /// Maps the big-endian model code to a known model.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        Self::iter()
            .find(|model| model.code() == Some(code))
            .unwrap_or(Self::Unknown)
    }

    /// Returns the protocol code, or `None` for [`PrinterModel::Unknown`].
    #[must_use]
    pub fn code(self) -> Option<u16> {
        let code = match self {
            Self::Ql500 => 0x344F,
            Self::Ql550 => 0x3430,
            Self::Ql560 => 0x3431,
            Self::Ql570 => 0x3432,
            Self::Ql580N => 0x3433,
            Self::Ql650Td => 0x3435,
            Self::Ql700 => 0x3438,
            Self::Ql710W => 0x3439,
            Self::Ql720Nw => 0x3441,
            Self::Ql800 => 0x3443,
            Self::Ql810W => 0x3444,
            Self::Ql820Nwb => 0x3445,
            Self::Ql1050 => 0x3434,
            Self::Ql1060N => 0x3436,
            Self::Ql1100 => 0x3446,
            Self::Ql1110Nwb => 0x3448,
            Self::Unknown => return None,
        };
        Some(code)
    }
}

/// Loaded media kind reported in byte `11`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, SerializeDisplay)]
pub enum MediaType {
    #[strum(to_string = "empty")]
    Empty,
    #[strum(to_string = "incompatible")]
    Incompatible,
    #[strum(to_string = "continuous")]
    Continuous,
    #[strum(to_string = "die_cut")]
    DieCut,
    #[strum(to_string = "unknown")]
    Unknown,
}

impl MediaType {
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Empty,
            0x0A | 0x4A => Self::Continuous,
            0x0B | 0x4B => Self::DieCut,
            0xFF => Self::Incompatible,
            _ => Self::Unknown,
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::Continuous => 0x0A,
            Self::DieCut => 0x0B,
            Self::Incompatible => 0xFF,
            Self::Unknown => 0x01,
        }
    }
}

/// Status type reported in byte `18`. Drives the print-job state machine.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, SerializeDisplay)]
pub enum StatusType {
    #[strum(to_string = "reply")]
    Reply,
    #[strum(to_string = "printing_complete")]
    PrintingComplete,
    #[strum(to_string = "error_occurred")]
    ErrorOccurred,
    #[strum(to_string = "turned_off")]
    TurnedOff,
    #[strum(to_string = "notification")]
    Notification,
    #[strum(to_string = "phase_change")]
    PhaseChange,
}

impl StatusType {
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Reply => 0x00,
            Self::PrintingComplete => 0x01,
            Self::ErrorOccurred => 0x02,
            Self::TurnedOff => 0x04,
            Self::Notification => 0x05,
            Self::PhaseChange => 0x06,
        }
    }
}

impl TryFrom<u8> for StatusType {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|status_type| status_type.as_raw() == code)
            .ok_or(DecodeError::UnknownStatusCode { code })
    }
}

/// Device phase reported in byte `19`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, SerializeDisplay)]
pub enum Phase {
    #[strum(to_string = "receiving")]
    Receiving,
    #[strum(to_string = "printing")]
    Printing,
}

impl Phase {
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Receiving => 0x00,
            Self::Printing => 0x01,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|phase| phase.as_raw() == code)
            .ok_or(DecodeError::UnknownPhaseCode { code })
    }
}

/// Named bits of the 16-bit error field (byte 8 is the high byte).
const ERROR_FLAG_NAMES: [(u16, &str); 13] = [
    (0x0100, "no_media"),
    (0x0200, "end_of_media"),
    (0x0400, "cutter_jam"),
    (0x1000, "printer_in_use"),
    (0x2000, "printer_turned_off"),
    (0x4000, "high_voltage_adapter"),
    (0x8000, "fan_motor_error"),
    (0x0001, "replace_media"),
    (0x0002, "expansion_buffer_full"),
    (0x0004, "communication_error"),
    (0x0008, "communication_buffer_full"),
    (0x0010, "cover_open"),
    (0x0040, "media_feed_error"),
];

/// Raw error bitfield with named accessors.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, derive_more::From, derive_more::Into,
)]
pub struct ErrorFlags(u16);

impl ErrorFlags {
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the names of all set bits that have a known meaning.
    #[must_use]
    pub fn active(self) -> Vec<&'static str> {
        ERROR_FLAG_NAMES
            .iter()
            .filter(|(bit, _name)| self.0 & bit != 0)
            .map(|(_bit, name)| *name)
            .collect()
    }
}

impl Serialize for ErrorFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

/// A decoded printer status report.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct StatusFrame {
    model: PrinterModel,
    media_width: u8,
    media_length: u8,
    media_type: MediaType,
    errors: ErrorFlags,
    status_type: StatusType,
    phase: Phase,
    notification: u8,
}

impl StatusFrame {
    /// Decodes a fixed-length status frame.
    ///
    /// ```
    /// use labelbridge::{DecodeError, StatusFrame};
    ///
    /// let result = StatusFrame::decode(&[0x80, 0x20, 0x42]);
    /// assert_eq!(Err(DecodeError::FrameTooShort { actual: 3 }), result);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the buffer is not exactly [`FRAME_LENGTH`] bytes
    /// or when the status-type or phase byte is unmapped.
    #[instrument(skip(buffer), level = "trace", fields(buffer_len = buffer.len()))]
    pub fn decode(buffer: &[u8]) -> Result<Self, DecodeError> {
        let frame: &[u8; FRAME_LENGTH] = match buffer.len() {
            FRAME_LENGTH => buffer
                .try_into()
                .map_err(|_| DecodeError::FrameLengthMismatch {
                    actual: buffer.len(),
                })?,
            actual if actual < FRAME_LENGTH => return Err(DecodeError::FrameTooShort { actual }),
            actual => return Err(DecodeError::FrameLengthMismatch { actual }),
        };

        let model_code = u16::from_be_bytes([frame[MODEL_OFFSET], frame[MODEL_OFFSET + 1]]);
        let errors = u16::from_be_bytes([
            frame[ERROR_FLAGS_OFFSET],
            frame[ERROR_FLAGS_OFFSET + 1],
        ]);

        Ok(Self {
            model: PrinterModel::from_code(model_code),
            media_width: frame[MEDIA_WIDTH_OFFSET],
            media_length: frame[MEDIA_LENGTH_OFFSET],
            media_type: MediaType::from_code(frame[MEDIA_TYPE_OFFSET]),
            errors: ErrorFlags(errors),
            status_type: StatusType::try_from(frame[STATUS_TYPE_OFFSET])?,
            phase: Phase::try_from(frame[PHASE_OFFSET])?,
            notification: frame[NOTIFICATION_OFFSET],
        })
    }

    /// Encodes the frame back into its wire layout.
    ///
    /// Only synthetic printers use this; real frames are always received.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LENGTH] {
        let mut frame = [0u8; FRAME_LENGTH];
        frame[..FRAME_HEADER.len()].copy_from_slice(&FRAME_HEADER);
        let model_code = self.model.code().unwrap_or(0);
        frame[MODEL_OFFSET..MODEL_OFFSET + 2].copy_from_slice(&model_code.to_be_bytes());
        frame[ERROR_FLAGS_OFFSET..ERROR_FLAGS_OFFSET + 2]
            .copy_from_slice(&self.errors.bits().to_be_bytes());
        frame[MEDIA_WIDTH_OFFSET] = self.media_width;
        frame[MEDIA_TYPE_OFFSET] = self.media_type.code();
        frame[MEDIA_LENGTH_OFFSET] = self.media_length;
        frame[STATUS_TYPE_OFFSET] = self.status_type.as_raw();
        frame[PHASE_OFFSET] = self.phase.as_raw();
        frame[NOTIFICATION_OFFSET] = self.notification;
        frame
    }

    /// Creates a synthetic reply frame for a model with loaded media.
    #[must_use]
    pub fn synthetic(model: PrinterModel, media_width: u8, media_type: MediaType) -> Self {
        Self {
            model,
            media_width,
            media_length: 0,
            media_type,
            errors: ErrorFlags::default(),
            status_type: StatusType::Reply,
            phase: Phase::Receiving,
            notification: 0,
        }
    }

    /// Returns a copy with a different status type and phase.
    #[must_use]
    pub fn with_status(mut self, status_type: StatusType, phase: Phase) -> Self {
        self.status_type = status_type;
        self.phase = phase;
        self
    }

    /// Returns a copy with the given error bits set.
    #[must_use]
    pub fn with_errors(mut self, errors: u16) -> Self {
        self.errors = ErrorFlags(errors);
        self
    }

    #[must_use]
    pub fn model(&self) -> PrinterModel {
        self.model
    }

    #[must_use]
    pub fn media_width(&self) -> u8 {
        self.media_width
    }

    #[must_use]
    pub fn media_length(&self) -> u8 {
        self.media_length
    }

    #[must_use]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn errors(&self) -> ErrorFlags {
        self.errors
    }

    #[must_use]
    pub fn status_type(&self) -> StatusType {
        self.status_type
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn notification(&self) -> u8 {
        self.notification
    }
}
