//! Trait abstraction for the outbound serial write path to enable testing

use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Non-blocking, best-effort writer for outbound telemetry bytes
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send {
    /// Queue `data` for transmission without blocking the caller
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Sink that hands buffers to a port's writer task over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.tx
            .try_send(Bytes::copy_from_slice(data))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    io::Error::new(io::ErrorKind::WouldBlock, "serial writer queue full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    io::Error::new(io::ErrorKind::BrokenPipe, "serial writer task stopped")
                }
            })
    }
}
