//! # CRSF Frame Assembler
//!
//! Rebuilds length-prefixed frames from a byte stream, one byte at a time.
//!
//! The assembler runs in the byte-receive context (serial read task or UART
//! interrupt) and must never block or allocate. Completed RC-channel and
//! link-statistics frames are handed to the control loop through a
//! [`FrameSlot`]: a single-producer/single-consumer buffer guarded by a
//! `done` flag. The producer only writes the buffer while `done` is clear and
//! sets it with `Release`; the consumer reads with `Acquire` and clears the
//! flag once it has copied the frame out.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::protocol::*;

/// Marker stored in the frame-start timestamp before any byte has arrived
const NO_FRAME_START: u64 = u64::MAX;

/// Frame buffer shared between one assembler and the control loop
#[derive(Debug)]
pub struct FrameSlot {
    bytes: [AtomicU8; CRSF_FRAME_SIZE_MAX],
    len: AtomicU8,
    done: AtomicBool,
    frame_start_us: AtomicU64,
    overruns: AtomicU32,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            bytes: std::array::from_fn(|_| AtomicU8::new(0)),
            len: AtomicU8::new(0),
            done: AtomicBool::new(false),
            frame_start_us: AtomicU64::new(NO_FRAME_START),
            overruns: AtomicU32::new(0),
        }
    }

    /// Copy a complete frame in and raise the done flag
    ///
    /// Returns `false` (and counts an overrun) when the previous frame has not
    /// been taken yet; the new frame is dropped in that case.
    fn publish(&self, frame: &[u8]) -> bool {
        if self.done.load(Ordering::Acquire) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        for (cell, &byte) in self.bytes.iter().zip(frame) {
            cell.store(byte, Ordering::Relaxed);
        }
        self.len.store(frame.len() as u8, Ordering::Relaxed);
        self.done.store(true, Ordering::Release);
        true
    }

    /// Move the pending frame into `out` and clear the done flag
    ///
    /// Returns `false` when no frame is ready.
    pub fn take(&self, out: &mut RawFrame) -> bool {
        if !self.done.load(Ordering::Acquire) {
            return false;
        }

        let len = self.len.load(Ordering::Relaxed) as usize;
        let storage = out.storage_mut();
        for (dst, cell) in storage.iter_mut().zip(&self.bytes).take(len) {
            *dst = cell.load(Ordering::Relaxed);
        }
        out.set_len(len);

        self.done.store(false, Ordering::Release);
        true
    }

    /// Whether a completed frame is waiting to be taken
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn set_frame_start(&self, now_us: u64) {
        self.frame_start_us.store(now_us, Ordering::Release);
    }

    /// Timestamp of the first byte of the most recent frame, if any
    pub fn frame_start_us(&self) -> Option<u64> {
        match self.frame_start_us.load(Ordering::Acquire) {
            NO_FRAME_START => None,
            start => Some(start),
        }
    }

    /// Frames dropped because the consumer had not taken the previous one
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of feeding one byte to the assembler
#[derive(Debug, PartialEq, Eq)]
pub enum ByteOutcome<'a> {
    /// Frame still being assembled
    InProgress,
    /// RC-channel or link-statistics frame published to the slot
    Queued,
    /// Frame completed but the slot was still full; frame dropped
    Overrun,
    /// CRC-valid frame of another type, for the auxiliary handler
    Auxiliary(FrameRef<'a>),
    /// Frame discarded (bad length byte or CRC mismatch)
    Dropped,
}

/// Receiver of CRC-valid frames that are neither RC channels nor link
/// statistics (MSP requests, device pings and the like)
pub trait AuxFrameHandler: Send {
    fn handle(&mut self, frame: FrameRef<'_>);
}

/// Per-source frame assembler
#[derive(Debug)]
pub struct FrameAssembler {
    buf: [u8; CRSF_FRAME_SIZE_MAX],
    position: usize,
    frame_start_us: u64,
    slot: Arc<FrameSlot>,
}

impl FrameAssembler {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self {
            buf: [0; CRSF_FRAME_SIZE_MAX],
            position: 0,
            frame_start_us: 0,
            slot,
        }
    }

    /// Slot this assembler publishes into
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Number of bytes of the frame currently being assembled
    pub fn position(&self) -> usize {
        self.position
    }

    /// Feed one received byte
    ///
    /// # Arguments
    ///
    /// * `byte` - Received byte
    /// * `now_us` - Monotonic receive timestamp in microseconds
    pub fn on_byte(&mut self, byte: u8, now_us: u64) -> ByteOutcome<'_> {
        if self.position > 0 && now_us.saturating_sub(self.frame_start_us) > MAX_FRAME_TIME_US {
            trace!(
                position = self.position,
                "Stale partial frame discarded, resynchronising"
            );
            self.position = 0;
        }

        if self.position == 0 {
            self.frame_start_us = now_us;
            self.slot.set_frame_start(now_us);
        }

        // Assume 5 bytes until address, length and type are in
        let full_frame_length = if self.position < 3 {
            5
        } else {
            self.buf[1] as usize + 2
        };

        self.buf[self.position] = byte;
        self.position += 1;

        if self.position == 2
            && !(CRSF_FRAME_LENGTH_MIN..=CRSF_FRAME_LENGTH_MAX).contains(&byte)
        {
            trace!(length = byte, "Invalid frame length byte");
            self.position = 0;
            return ByteOutcome::Dropped;
        }

        if self.position < full_frame_length {
            return ByteOutcome::InProgress;
        }

        self.position = 0;
        self.complete(full_frame_length)
    }

    fn complete(&self, len: usize) -> ByteOutcome<'_> {
        let bytes = &self.buf[..len];
        match bytes[2] {
            CRSF_FRAMETYPE_RC_CHANNELS_PACKED | CRSF_FRAMETYPE_LINK_STATISTICS => {
                if self.slot.publish(bytes) {
                    ByteOutcome::Queued
                } else {
                    trace!("Frame slot still full, frame dropped");
                    ByteOutcome::Overrun
                }
            }
            frame_type => match FrameRef::new(bytes) {
                Some(frame) if frame.crc_valid() => ByteOutcome::Auxiliary(frame),
                _ => {
                    trace!(frame_type, "Auxiliary frame failed CRC check");
                    ByteOutcome::Dropped
                }
            },
        }
    }
}
