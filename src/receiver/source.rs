//! # Receiver Sources
//!
//! Identity and per-source decode state for the two redundant receivers.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use crate::crsf::assembler::{FrameAssembler, FrameSlot};
use crate::crsf::decoder::{decode_frame, Decoded};
use crate::crsf::protocol::{ChannelSet, LinkStatistics, RawFrame};

/// One of the two receiver pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    A,
    B,
}

impl Source {
    /// Both sources, in polling order
    pub const ALL: [Source; 2] = [Source::A, Source::B];

    pub fn index(self) -> usize {
        match self {
            Source::A => 0,
            Source::B => 1,
        }
    }

    pub fn other(self) -> Source {
        match self {
            Source::A => Source::B,
            Source::B => Source::A,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::A => write!(f, "A"),
            Source::B => write!(f, "B"),
        }
    }
}

/// Decode state owned by the control loop for one source
#[derive(Debug)]
pub struct SourceState {
    source: Source,
    slot: Arc<FrameSlot>,
    scratch: RawFrame,
    latest_channels: Option<ChannelSet>,
    link_statistics: Option<LinkStatistics>,
    last_valid_rc_us: Option<u64>,
    frames_decoded: u32,
    frames_rejected: u32,
}

impl SourceState {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            slot: Arc::new(FrameSlot::new()),
            scratch: RawFrame::empty(),
            latest_channels: None,
            link_statistics: None,
            last_valid_rc_us: None,
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Create the producer-side assembler feeding this source
    pub fn assembler(&self) -> FrameAssembler {
        FrameAssembler::new(Arc::clone(&self.slot))
    }

    /// Take and decode the pending frame, if the assembler finished one
    ///
    /// Link statistics are stored here; channel candidates are returned for
    /// the failover controller to gate.
    pub fn poll(&mut self, now_us: u64) -> Decoded {
        if !self.slot.take(&mut self.scratch) {
            return Decoded::Pending;
        }

        let decoded = match self.scratch.frame() {
            Some(frame) => decode_frame(frame),
            None => Decoded::Pending,
        };

        match decoded {
            Decoded::Channels(channels) => {
                self.latest_channels = Some(channels);
                self.last_valid_rc_us = Some(now_us);
                self.frames_decoded += 1;
            }
            Decoded::LinkStatistics(stats) => {
                self.link_statistics = Some(stats);
                self.frames_decoded += 1;
            }
            Decoded::Pending => {
                self.frames_rejected += 1;
                trace!(source = %self.source, "Frame rejected by decoder");
            }
        }

        decoded
    }

    /// Most recent CRC-valid channel set, whether or not it was accepted
    pub fn latest_channels(&self) -> Option<&ChannelSet> {
        self.latest_channels.as_ref()
    }

    pub fn link_statistics(&self) -> Option<&LinkStatistics> {
        self.link_statistics.as_ref()
    }

    /// Time the last CRC-valid RC-channels frame was decoded
    pub fn last_valid_rc_us(&self) -> Option<u64> {
        self.last_valid_rc_us
    }

    pub fn frames_decoded(&self) -> u32 {
        self.frames_decoded
    }

    /// Frames taken from the slot that failed CRC, size or type checks
    pub fn frames_rejected(&self) -> u32 {
        self.frames_rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::encoder::{encode_frame, encode_rc_channels_frame};
    use crate::crsf::protocol::*;

    fn feed(state: &SourceState, bytes: &[u8]) {
        let mut asm = state.assembler();
        for &b in bytes {
            asm.on_byte(b, 0);
        }
    }

    #[test]
    fn test_source_helpers() {
        assert_eq!(Source::A.index(), 0);
        assert_eq!(Source::B.index(), 1);
        assert_eq!(Source::A.other(), Source::B);
        assert_eq!(Source::B.other(), Source::A);
        assert_eq!(Source::B.to_string(), "B");
    }

    #[test]
    fn test_poll_without_frame_is_pending() {
        let mut state = SourceState::new(Source::A);
        assert_eq!(state.poll(0), Decoded::Pending);
        assert_eq!(state.frames_rejected(), 0);
    }

    #[test]
    fn test_poll_decodes_channels() {
        let mut state = SourceState::new(Source::B);
        assert_eq!(state.source(), Source::B);
        let channels = [1200u16; 16];
        feed(&state, &encode_rc_channels_frame(&channels));

        assert_eq!(state.poll(5_000), Decoded::Channels(channels));
        assert_eq!(state.latest_channels(), Some(&channels));
        assert_eq!(state.last_valid_rc_us(), Some(5_000));
        assert_eq!(state.poll(6_000), Decoded::Pending);
    }

    #[test]
    fn test_poll_stores_link_statistics() {
        let mut state = SourceState::new(Source::A);
        let payload = [50, 60, 100, 8, 0, 3, 2, 70, 95, 6];
        feed(
            &state,
            &encode_frame(CRSF_ADDRESS_FLIGHT_CONTROLLER, CRSF_FRAMETYPE_LINK_STATISTICS, &payload).unwrap(),
        );

        assert!(matches!(state.poll(0), Decoded::LinkStatistics(_)));
        let stats = state.link_statistics().unwrap();
        assert_eq!(stats.uplink_rssi_dbm(), -50);
        assert_eq!(stats.uplink_tx_power_mw, 25);
        assert_eq!(state.last_valid_rc_us(), None);
    }

    #[test]
    fn test_corrupt_frame_clears_flag_and_counts() {
        let mut state = SourceState::new(Source::A);
        let mut bytes = encode_rc_channels_frame(&CHANNELS_AT_REST);
        bytes[10] ^= 0x40;
        feed(&state, &bytes);

        assert_eq!(state.poll(0), Decoded::Pending);
        assert_eq!(state.frames_rejected(), 1);
        assert!(!state.slot().is_done());
        assert_eq!(state.latest_channels(), None);
    }
}
