use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bon::Builder;

use super::backend::PrinterBackend;
use crate::status::StatusFrame;

/// One scripted answer to a backend read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FakeReply {
    /// Returns these bytes.
    Bytes(Vec<u8>),
    /// Returns an empty read.
    Silent,
    /// Fails the read.
    Fault,
}

impl From<StatusFrame> for FakeReply {
    fn from(frame: StatusFrame) -> Self {
        Self::Bytes(frame.encode().to_vec())
    }
}

/// Settings for constructing a scripted backend.
#[derive(Debug, Builder)]
pub struct FakeBackendConfig {
    /// Replies handed out in order, one per read.
    #[builder(default, into)]
    replies: Vec<FakeReply>,
    /// Reply used once the script is exhausted.
    #[builder(default = FakeReply::Silent)]
    idle_reply: FakeReply,
    #[builder(default)]
    fail_writes: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    replies: VecDeque<FakeReply>,
    writes: Vec<Vec<u8>>,
    reads: usize,
    close_count: usize,
    fail_writes: bool,
}

/// In-memory backend that replays scripted replies and records writes.
#[derive(Debug)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    idle_reply: FakeReply,
    closed: bool,
}

impl FakeBackend {
    #[must_use]
    pub fn new(config: FakeBackendConfig) -> Self {
        let state = FakeState {
            replies: config.replies.into(),
            fail_writes: config.fail_writes,
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            idle_reply: config.idle_reply,
            closed: false,
        }
    }

    /// Returns a handle for inspecting and steering this backend after it
    /// has been moved into a device.
    #[must_use]
    pub fn probe(&self) -> FakeBackendProbe {
        FakeBackendProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "fake backend has been closed")
    }
}

#[async_trait]
impl PrinterBackend for FakeBackend {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(Self::closed_error());
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writes.push(bytes.to_vec());
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write fault"));
        }
        Ok(())
    }

    async fn read(&mut self) -> io::Result<Vec<u8>> {
        if self.closed {
            return Err(Self::closed_error());
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reads += 1;
        let reply = state
            .replies
            .pop_front()
            .unwrap_or_else(|| self.idle_reply.clone());
        match reply {
            FakeReply::Bytes(bytes) => Ok(bytes),
            FakeReply::Silent => Ok(Vec::new()),
            FakeReply::Fault => Err(io::Error::other("scripted read fault")),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.close_count += 1;
    }
}

/// Shared view into a [`FakeBackend`].
#[derive(Debug, Clone)]
pub struct FakeBackendProbe {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackendProbe {
    /// Returns every write seen so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    #[must_use]
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Makes every later write fail after being recorded.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Appends replies to the script.
    pub fn push_replies(&self, replies: impl IntoIterator<Item = FakeReply>) {
        self.lock().replies.extend(replies);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn replies_then_idles() {
        let mut backend = FakeBackend::new(
            FakeBackendConfig::builder()
                .replies(vec![FakeReply::Bytes(vec![0x01])])
                .build(),
        );
        let probe = backend.probe();

        assert_eq!(vec![0x01], backend.read().await.expect("first read"));
        assert!(backend.read().await.expect("idle read").is_empty());
        assert_eq!(2, probe.read_count());
    }

    #[tokio::test]
    async fn scripted_write_faults_are_recorded() {
        let mut backend = FakeBackend::new(FakeBackendConfig::builder().fail_writes(true).build());
        let probe = backend.probe();

        assert!(backend.write(&[0x01]).await.is_err());
        probe.fail_writes(false);
        assert!(backend.write(&[0x02]).await.is_ok());
        assert_eq!(vec![vec![0x01], vec![0x02]], probe.writes());
    }

    #[tokio::test]
    async fn close_refuses_further_io() {
        let mut backend = FakeBackend::new(FakeBackendConfig::builder().build());
        let probe = backend.probe();
        backend.close().await;

        assert!(backend.write(&[0x00]).await.is_err());
        assert_eq!(1, probe.close_count());
        assert!(probe.writes().is_empty());
    }
}
