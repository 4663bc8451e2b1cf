use serde::Serialize;
use strum_macros::Display;

/// Final result of one print job.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobOutcome {
    Success,
    DeviceError,
    Timeout,
    ConversionFailed,
    IoFault,
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Where a print job currently is.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Submitted,
    AwaitingReply,
    Complete,
    Errored,
    TimedOut,
    ConversionFailed,
    IoFault,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    /// Maps a terminal state to its outcome.
    #[must_use]
    pub fn outcome(self) -> Option<JobOutcome> {
        match self {
            Self::Submitted | Self::AwaitingReply => None,
            Self::Complete => Some(JobOutcome::Success),
            Self::Errored => Some(JobOutcome::DeviceError),
            Self::TimedOut => Some(JobOutcome::Timeout),
            Self::ConversionFailed => Some(JobOutcome::ConversionFailed),
            Self::IoFault => Some(JobOutcome::IoFault),
        }
    }
}

/// Tracks one job through `Submitted -> AwaitingReply -> terminal`.
#[derive(Debug)]
pub(crate) struct PrintJob {
    state: JobState,
    wrote: bool,
}

impl PrintJob {
    pub(crate) fn new() -> Self {
        Self {
            state: JobState::Submitted,
            wrote: false,
        }
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    /// Records that print data started flowing to the device.
    pub(crate) fn begin_writing(&mut self) {
        self.wrote = true;
    }

    pub(crate) fn await_reply(&mut self) {
        if self.state == JobState::Submitted {
            self.state = JobState::AwaitingReply;
        }
    }

    /// Moves to a terminal state. The first terminal state wins.
    pub(crate) fn finish(&mut self, terminal: JobState) -> JobOutcome {
        if !self.state.is_terminal() {
            self.state = terminal;
        }
        self.state.outcome().unwrap_or(JobOutcome::IoFault)
    }

    /// Whether the device must be re-initialised once the job ends.
    pub(crate) fn needs_initialize(&self) -> bool {
        self.wrote
    }
}
