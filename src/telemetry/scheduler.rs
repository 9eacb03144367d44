//! # Telemetry Scheduler
//!
//! Holds the single pending outbound telemetry payload of one port and
//! decides when it may go out.
//!
//! On a half-duplex wire the receiver owns the line while it sends a frame,
//! and frames arrive every 6667 µs. A payload is only written when the
//! current time is at least 1100 µs after the last frame start and at least
//! 1100 µs before the next expected one.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::crsf::assembler::FrameSlot;
use crate::crsf::encoder::encode_frame;
use crate::crsf::protocol::{CRSF_ADDRESS_FLIGHT_CONTROLLER, CRSF_FRAME_SIZE_MAX, FRAME_INTERVAL_US, MAX_FRAME_TIME_US};
use crate::error::Result;
use crate::serial::port_trait::TelemetrySink;

/// Line discipline of a telemetry port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    /// Single wire shared with inbound frames
    Half,
    /// Separate TX line; no scheduling needed
    Full,
}

/// Result of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending
    Idle,
    /// Pending payload held back by the half-duplex window
    Withheld,
    /// Payload of the given length handed to the sink
    Sent(usize),
    /// Payload of the given length rejected by the sink and discarded
    Dropped(usize),
}

/// Single-slot outbound buffer, newest write wins
#[derive(Debug, Clone)]
pub struct TelemetryBuffer {
    buf: [u8; CRSF_FRAME_SIZE_MAX],
    len: usize,
}

impl TelemetryBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; CRSF_FRAME_SIZE_MAX],
            len: 0,
        }
    }

    /// Replace the pending payload; anything beyond 64 bytes is cut off
    pub fn store(&mut self, data: &[u8]) {
        let len = data.len().min(CRSF_FRAME_SIZE_MAX);
        self.buf[..len].copy_from_slice(&data[..len]);
        self.len = len;
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Telemetry scheduler for one port
pub struct TelemetryScheduler<S: TelemetrySink> {
    buffer: TelemetryBuffer,
    duplex: Duplex,
    timing: Arc<FrameSlot>,
    sink: S,
}

impl<S: TelemetrySink> TelemetryScheduler<S> {
    /// Create a scheduler
    ///
    /// # Arguments
    ///
    /// * `duplex` - Line discipline of the port
    /// * `timing` - Frame slot of the source received on the same port
    /// * `sink` - Outbound writer
    pub fn new(duplex: Duplex, timing: Arc<FrameSlot>, sink: S) -> Self {
        Self {
            buffer: TelemetryBuffer::new(),
            duplex,
            timing,
            sink,
        }
    }

    pub fn duplex(&self) -> Duplex {
        self.duplex
    }

    /// Store a payload for the next send window, replacing any unsent one
    pub fn write_telemetry(&mut self, data: &[u8]) {
        if !self.buffer.is_empty() {
            trace!(dropped = self.buffer.pending().len(), "Unsent telemetry replaced");
        }
        self.buffer.store(data);
    }

    /// Encode a frame addressed to the flight controller and store it
    ///
    /// # Errors
    ///
    /// Returns error if the payload exceeds the maximum CRSF payload size
    pub fn write_frame(&mut self, frame_type: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(CRSF_ADDRESS_FLIGHT_CONTROLLER, frame_type, payload)?;
        self.write_telemetry(&frame);
        Ok(())
    }

    /// Bytes waiting for a send window
    pub fn pending(&self) -> &[u8] {
        self.buffer.pending()
    }

    /// Whether `now_us` lies in the half-duplex send window
    ///
    /// No window exists before the first inbound frame has been seen.
    pub fn in_send_window(&self, now_us: u64) -> bool {
        match self.duplex {
            Duplex::Full => true,
            Duplex::Half => match self.timing.frame_start_us() {
                Some(start) => {
                    let since_start = now_us.saturating_sub(start);
                    since_start >= MAX_FRAME_TIME_US
                        && since_start <= FRAME_INTERVAL_US - MAX_FRAME_TIME_US
                }
                None => false,
            },
        }
    }

    /// Flush the pending payload if the line is free
    ///
    /// A sink error is logged and the payload discarded; telemetry is
    /// best-effort and the next write supersedes it anyway.
    pub fn tick(&mut self, now_us: u64) -> TickOutcome {
        if self.buffer.is_empty() {
            return TickOutcome::Idle;
        }
        if !self.in_send_window(now_us) {
            return TickOutcome::Withheld;
        }

        let len = self.buffer.pending().len();
        let outcome = match self.sink.write(self.buffer.pending()) {
            Ok(()) => {
                debug!("Sent telemetry ({} bytes)", len);
                TickOutcome::Sent(len)
            }
            Err(e) => {
                warn!("Failed to queue telemetry ({} bytes): {}", len, e);
                TickOutcome::Dropped(len)
            }
        };
        self.buffer.clear();
        outcome
    }
}
