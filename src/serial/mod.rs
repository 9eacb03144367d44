//! # Serial Communication Module
//!
//! Handles the serial links to the two CRSF receivers.
//!
//! This module handles:
//! - Opening each receiver port (8N1, no flow control) at its configured baud
//! - A read task per port that feeds received bytes to that source's
//!   frame assembler with monotonic timestamps
//! - A write task per telemetry port, fed through a bounded channel
//! - Forwarding auxiliary frames (MSP and the like) to a handler

pub mod port_trait;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::clock::MonotonicClock;
use crate::config::SourceConfig;
use crate::crsf::assembler::{AuxFrameHandler, ByteOutcome, FrameAssembler};
use crate::crsf::protocol::{FrameRef, CRSF_FRAME_SIZE_MAX};
use crate::error::{CrsfFailoverError, Result};
use crate::receiver::Source;

pub use port_trait::{ChannelSink, TelemetrySink};

/// Outbound buffers queued per telemetry port before writes start failing
pub const TELEMETRY_QUEUE_DEPTH: usize = 4;

/// Auxiliary frame handler that logs and counts what it sees
#[derive(Debug)]
pub struct AuxFrameLogger {
    source: Source,
    frames: u64,
}

impl AuxFrameLogger {
    pub fn new(source: Source) -> Self {
        Self { source, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl AuxFrameHandler for AuxFrameLogger {
    fn handle(&mut self, frame: FrameRef<'_>) {
        self.frames += 1;
        debug!(
            source = %self.source,
            address = frame.address(),
            "Auxiliary frame type 0x{:02X} ({} byte payload)",
            frame.frame_type(),
            frame.payload().len()
        );
    }
}

/// Running port of one source
#[derive(Debug)]
pub struct PortHandle {
    source: Source,
    port_path: String,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
    sink: Option<ChannelSink>,
}

impl PortHandle {
    pub fn source(&self) -> Source {
        self.source
    }

    /// Device path of the opened port
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    /// Telemetry sink of this port; `None` when telemetry is disabled for
    /// the source or the sink was already taken
    pub fn take_sink(&mut self) -> Option<ChannelSink> {
        self.sink.take()
    }

    /// Whether the read task has stopped (port closed or failed)
    pub fn is_reader_finished(&self) -> bool {
        self.reader.is_finished()
    }

    /// Stop the port tasks
    pub fn shutdown(self) {
        self.reader.abort();
        if let Some(writer) = self.writer {
            writer.abort();
        }
        debug!(source = %self.source, "Port {} closed", self.port_path);
    }
}

/// Open the port of `source` and start its tasks
///
/// Must be called from within a tokio runtime.
///
/// # Arguments
///
/// * `source` - Receiver source the port belongs to
/// * `config` - Port settings of that source
/// * `assembler` - Assembler publishing into the source's frame slot
/// * `clock` - Clock shared with the control loop
/// * `aux` - Handler for auxiliary frames
///
/// # Errors
///
/// Returns error if the port cannot be opened
pub fn init_source<H>(
    source: Source,
    config: &SourceConfig,
    assembler: FrameAssembler,
    clock: MonotonicClock,
    aux: H,
) -> Result<PortHandle>
where
    H: AuxFrameHandler + 'static,
{
    let port = open_port(&config.port, config.baud_rate)?;
    info!(
        source = %source,
        "Opened receiver port {} at {} baud",
        config.port, config.baud_rate
    );

    let (read_half, write_half) = tokio::io::split(port);

    let reader = tokio::spawn(async move {
        match read_loop(read_half, assembler, clock, aux).await {
            Ok(bytes) => warn!(source = %source, "Receiver port closed after {} bytes", bytes),
            Err(e) => warn!(source = %source, "Receiver port read failed: {}", e),
        }
    });

    let (writer, sink) = if config.telemetry {
        let (tx, rx) = mpsc::channel(TELEMETRY_QUEUE_DEPTH);
        let writer = tokio::spawn(async move {
            if let Err(e) = write_loop(write_half, rx).await {
                warn!(source = %source, "Telemetry write failed: {}", e);
            }
        });
        (Some(writer), Some(ChannelSink::new(tx)))
    } else {
        (None, None)
    };

    Ok(PortHandle {
        source,
        port_path: config.port.clone(),
        reader,
        writer,
        sink,
    })
}

/// Open a specific serial port with CRSF settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line rate
fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| CrsfFailoverError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

/// Feed everything read from `reader` into `assembler` until end of stream
///
/// Bytes delivered by one read share a timestamp.
///
/// # Returns
///
/// * `io::Result<u64>` - Total bytes read before the stream ended
pub async fn read_loop<R, H>(
    mut reader: R,
    mut assembler: FrameAssembler,
    clock: MonotonicClock,
    mut aux: H,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    H: AuxFrameHandler,
{
    let mut buf = [0u8; CRSF_FRAME_SIZE_MAX];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;

        let now_us = clock.now_us();
        for &byte in &buf[..n] {
            match assembler.on_byte(byte, now_us) {
                ByteOutcome::Auxiliary(frame) => aux.handle(frame),
                ByteOutcome::Overrun => trace!("Frame slot still full, frame dropped"),
                ByteOutcome::InProgress | ByteOutcome::Queued | ByteOutcome::Dropped => {}
            }
        }
    }
}

/// Write every queued telemetry buffer to `writer` until the channel closes
pub async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = rx.recv().await {
        writer.write_all(&data).await?;
        writer.flush().await?;
        trace!("Wrote {} telemetry bytes", data.len());
    }
    Ok(())
}
