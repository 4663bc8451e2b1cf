use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

use crate::status::FRAME_LENGTH;
use crate::utils::format_hex;

/// Raw byte channel to one printer.
#[async_trait]
pub trait PrinterBackend: Debug + Send {
    /// Writes every byte or fails.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Returns whatever the device has buffered, or an empty vector when it
    /// has nothing to say yet.
    async fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Releases the device. Further I/O fails.
    async fn close(&mut self);
}

/// Backend for the Linux `usblp` driver (`/dev/usb/lp*`).
///
/// The device node is opened lazily and reopened after any fault, so a
/// printer that was power-cycled recovers on the next poll.
#[derive(Debug)]
pub struct KernelLpBackend {
    path: PathBuf,
    handle: Option<AsyncFd<File>>,
    closed: bool,
}

impl KernelLpBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
            closed: false,
        }
    }

    fn handle(&mut self) -> io::Result<&AsyncFd<File>> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "printer backend has been closed",
            ));
        }

        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => open_nonblocking(&self.path)?,
        };
        Ok(self.handle.insert(handle))
    }

    async fn write_all(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        let handle = self.handle()?;
        while !bytes.is_empty() {
            let mut guard = handle.writable().await?;
            match guard.try_io(|inner| inner.get_ref().write(bytes)) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(written)) => bytes = &bytes[written..],
                Ok(Err(error)) => return Err(error),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }
}

fn open_nonblocking(path: &Path) -> io::Result<AsyncFd<File>> {
    debug!(path = %path.display(), "opening printer device");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;
    AsyncFd::new(file)
}

#[async_trait]
impl PrinterBackend for KernelLpBackend {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let result = self.write_all(bytes).await;
        if result.is_err() {
            self.handle = None;
        }
        result
    }

    async fn read(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = [0u8; FRAME_LENGTH];
        let result = self.handle()?.get_ref().read(&mut buffer);
        match result {
            Ok(read) => {
                trace!(bytes = %format_hex(&buffer[..read]), "read from printer");
                Ok(buffer[..read].to_vec())
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(error) => {
                self.handle = None;
                Err(error)
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.handle = None;
    }
}
