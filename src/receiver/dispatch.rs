//! # Output Dispatch
//!
//! [`ReceiverSubsystem`] is the surface the flight-control loop polls. It
//! owns both sources' decode state and the failover controller, and routes
//! channel reads and link statistics to the active source.
//!
//! Every call to [`ReceiverSubsystem::poll_frame_status`] decodes both
//! sources, so the standby receiver is always warm when a switch happens.

use std::sync::Arc;

use tracing::debug;

use super::failover::{Decision, FailoverController, FlyawayState};
use super::link::{uplink_strength, RssiRange};
use super::source::{Source, SourceState};
use crate::crsf::assembler::{FrameAssembler, FrameSlot};
use crate::crsf::decoder::Decoded;
use crate::crsf::protocol::{
    channel_to_pwm, ChannelSet, LinkStatistics, CHANNELS_AT_REST, FRAME_INTERVAL_US,
};

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// No new accepted channel data this poll
    Pending,
    /// The active source delivered a freshly accepted channel set
    Complete,
}

/// Fixed operating parameters of the subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// Source that drives the outputs at startup
    pub default_source: Source,
    /// Frame periods without a valid RC frame before the link reads inactive
    pub health_timeout_frames: u32,
    /// dBm window for the derived uplink strength
    pub rssi_range: RssiRange,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            default_source: Source::A,
            health_timeout_frames: 15,
            rssi_range: RssiRange::default(),
        }
    }
}

/// Dual-source receiver context
#[derive(Debug)]
pub struct ReceiverSubsystem {
    sources: [SourceState; 2],
    failover: FailoverController,
    active_channels: ChannelSet,
    health_timeout_us: u64,
    rssi_range: RssiRange,
}

impl ReceiverSubsystem {
    pub fn new(settings: ReceiverSettings) -> Self {
        Self {
            sources: [SourceState::new(Source::A), SourceState::new(Source::B)],
            failover: FailoverController::new(settings.default_source),
            active_channels: CHANNELS_AT_REST,
            health_timeout_us: u64::from(settings.health_timeout_frames) * FRAME_INTERVAL_US,
            rssi_range: settings.rssi_range,
        }
    }

    /// Create the assembler that feeds `source`; hand it to the byte-receive
    /// context
    pub fn assembler(&self, source: Source) -> FrameAssembler {
        self.sources[source.index()].assembler()
    }

    /// Frame slot of `source`, for frame-start timing
    pub fn frame_slot(&self, source: Source) -> Arc<FrameSlot> {
        Arc::clone(self.sources[source.index()].slot())
    }

    /// Record that the port of `source` could not be opened
    ///
    /// The failover controller will not switch to it. When it is the active
    /// source the other one takes over with its standby channel set.
    pub fn mark_detached(&mut self, source: Source) {
        let before = self.failover.active_source();
        self.failover.detach(source);
        if self.failover.active_source() != before {
            self.promote_standby(self.failover.active_source());
        }
    }

    pub fn active_source(&self) -> Source {
        self.failover.active_source()
    }

    /// Decode one pending frame per source and apply the failover rules
    ///
    /// # Arguments
    ///
    /// * `now_us` - Current time in microseconds
    ///
    /// # Returns
    ///
    /// * `FrameStatus::Complete` if the active source produced an accepted
    ///   channel update, `FrameStatus::Pending` otherwise
    pub fn poll_frame_status(&mut self, now_us: u64) -> FrameStatus {
        let mut status = FrameStatus::Pending;
        let mut switched = false;

        // Sources are gated A then B. Once one switch happened, the rest of
        // the poll is gated without switching.
        for source in Source::ALL {
            let Decoded::Channels(candidate) = self.sources[source.index()].poll(now_us) else {
                continue;
            };

            let decision = if switched {
                self.failover.on_channels_without_switch(source, &candidate, now_us)
            } else {
                self.failover.on_channels(source, &candidate, now_us)
            };

            match decision {
                Decision::Accepted { switched_to } => {
                    self.active_channels = candidate;
                    status = FrameStatus::Complete;
                    if let Some(target) = switched_to {
                        switched = true;
                        self.promote_standby(target);
                    }
                }
                Decision::FlyawayHold => {
                    debug!(source = %source, "Channel update held by flyaway gate");
                }
                Decision::Standby => {}
            }
        }

        status
    }

    /// Take over the newest channel set `target` decoded while on standby
    ///
    /// Skipped while `target` is flyaway-held or has decoded nothing yet.
    fn promote_standby(&mut self, target: Source) {
        if self.failover.flyaway_state(target) != FlyawayState::Clear {
            return;
        }
        if let Some(channels) = self.sources[target.index()].latest_channels() {
            self.active_channels = *channels;
        }
    }

    /// PWM value (µs) of channel `index` from the active channel set
    ///
    /// Returns `None` when `index` is not in `0..16`.
    pub fn read_channel(&self, index: usize) -> Option<u16> {
        self.active_channels.get(index).copied().map(channel_to_pwm)
    }

    /// Active channel set in raw digital units
    pub fn channels(&self) -> &ChannelSet {
        &self.active_channels
    }

    /// Whether the active source decoded a valid RC-channels frame within
    /// the health timeout
    pub fn is_active(&self, now_us: u64) -> bool {
        self.sources[self.active_source().index()]
            .last_valid_rc_us()
            .is_some_and(|last| now_us.saturating_sub(last) <= self.health_timeout_us)
    }

    /// Link statistics of the active source
    pub fn link_statistics(&self) -> Option<LinkStatistics> {
        self.sources[self.active_source().index()].link_statistics().copied()
    }

    /// Derived uplink strength (0-1023) of the active source; 0 without
    /// statistics
    pub fn uplink_strength(&self) -> u16 {
        self.link_statistics()
            .map(|stats| uplink_strength(&stats, self.rssi_range))
            .unwrap_or(0)
    }

    /// Toggle the active source by hand; see
    /// [`FailoverController::request_switch`]
    ///
    /// On success the new source's standby channel set becomes active at once.
    pub fn request_switch(&mut self, now_us: u64) -> bool {
        if !self.failover.request_switch(now_us) {
            return false;
        }
        self.promote_standby(self.failover.active_source());
        true
    }

    pub fn flyaway_state(&self, source: Source) -> FlyawayState {
        self.failover.flyaway_state(source)
    }

    /// Decode state of one source, for status reporting
    pub fn source_state(&self, source: Source) -> &SourceState {
        &self.sources[source.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::encoder::{encode_frame, encode_link_statistics_payload, encode_rc_channels_frame};
    use crate::crsf::protocol::*;
    use crate::receiver::failover::{FLYAWAY_CHANNEL, MODE_CHANNEL};

    fn subsystem() -> ReceiverSubsystem {
        ReceiverSubsystem::new(ReceiverSettings::default())
    }

    fn send(asm: &mut FrameAssembler, bytes: &[u8], now_us: u64) {
        for &b in bytes {
            asm.on_byte(b, now_us);
        }
    }

    fn channels(mode: u16, flyaway: u16, fill: u16) -> ChannelSet {
        let mut set = [fill; CRSF_NUM_CHANNELS];
        set[MODE_CHANNEL] = mode;
        set[FLYAWAY_CHANNEL] = flyaway;
        set
    }

    #[test]
    fn test_initial_state() {
        let rx = subsystem();
        assert_eq!(rx.active_source(), Source::A);
        assert_eq!(rx.read_channel(0), Some(1500));
        assert_eq!(rx.read_channel(16), None);
        assert!(!rx.is_active(0));
        assert_eq!(rx.link_statistics(), None);
        assert_eq!(rx.uplink_strength(), 0);
    }

    #[test]
    fn test_every_value_reaches_pwm_exactly() {
        let mut rx = subsystem();
        let mut asm = rx.assembler(Source::A);

        // Supervisory channels stay quiet so every frame is accepted; the
        // remaining fourteen carry the sweep
        let slots: Vec<usize> = (0..CRSF_NUM_CHANNELS)
            .filter(|&i| i != MODE_CHANNEL && i != FLYAWAY_CHANNEL)
            .collect();
        let values: Vec<u16> = (CRSF_CHANNEL_VALUE_MIN..=CRSF_CHANNEL_VALUE_MAX).collect();

        let mut now = 0;
        for chunk in values.chunks(slots.len()) {
            let mut set = channels(1000, 1000, CRSF_CHANNEL_VALUE_MID);
            for (&slot, &value) in slots.iter().zip(chunk) {
                set[slot] = value;
            }

            send(&mut asm, &encode_rc_channels_frame(&set), now);
            assert_eq!(rx.poll_frame_status(now), FrameStatus::Complete);

            for (i, &raw) in set.iter().enumerate() {
                assert_eq!(rx.read_channel(i), Some(channel_to_pwm(raw)));
            }
            now += FRAME_INTERVAL_US;
        }
    }

    #[test]
    fn test_corrupted_frame_leaves_channels_unchanged() {
        let mut rx = subsystem();
        let mut asm = rx.assembler(Source::A);

        let good = channels(1000, 1000, 1200);
        send(&mut asm, &encode_rc_channels_frame(&good), 0);
        assert_eq!(rx.poll_frame_status(0), FrameStatus::Complete);

        let mut bad = encode_rc_channels_frame(&channels(1000, 1000, 1700));
        bad[7] ^= 0x10;
        send(&mut asm, &bad, 6_667);

        assert_eq!(rx.poll_frame_status(6_667), FrameStatus::Pending);
        assert_eq!(rx.channels(), &good);
        assert!(!rx.source_state(Source::A).slot().is_done());
    }

    #[test]
    fn test_flyaway_quiet_period_on_active_source() {
        let mut rx = subsystem();
        let mut asm = rx.assembler(Source::A);

        send(&mut asm, &encode_rc_channels_frame(&channels(1000, 1000, 1100)), 0);
        assert_eq!(rx.poll_frame_status(0), FrameStatus::Complete);

        send(&mut asm, &encode_rc_channels_frame(&channels(1000, 1700, 1300)), 10_000);
        assert_eq!(rx.poll_frame_status(10_000), FrameStatus::Pending);

        // Flyaway drops at 20 ms
        let calm = channels(1000, 1000, 1400);
        let mut now = 20_000;
        while now < 70_000 {
            send(&mut asm, &encode_rc_channels_frame(&calm), now);
            assert_eq!(rx.poll_frame_status(now), FrameStatus::Pending, "accepted at {} us", now);
            assert_eq!(rx.channels()[0], 1100);
            now += 5_000;
        }

        send(&mut asm, &encode_rc_channels_frame(&calm), 70_000);
        assert_eq!(rx.poll_frame_status(70_000), FrameStatus::Complete);
        assert_eq!(rx.channels(), &calm);
    }

    #[test]
    fn test_mode_channel_switches_with_hysteresis() {
        let mut rx = subsystem();
        let mut asm_a = rx.assembler(Source::A);
        let mut asm_b = rx.assembler(Source::B);

        send(&mut asm_a, &encode_rc_channels_frame(&channels(1500, 1000, 1000)), 0);
        rx.poll_frame_status(0);
        assert_eq!(rx.active_source(), Source::A);

        send(&mut asm_a, &encode_rc_channels_frame(&channels(1650, 1000, 1000)), 6_667);
        assert_eq!(rx.poll_frame_status(6_667), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::B);

        let b_high = channels(1650, 1000, 1300);
        send(&mut asm_b, &encode_rc_channels_frame(&b_high), 13_334);
        assert_eq!(rx.poll_frame_status(13_334), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::B);
        assert_eq!(rx.channels(), &b_high);

        // A keeps reporting but is on standby now
        send(&mut asm_a, &encode_rc_channels_frame(&channels(1650, 1000, 1900)), 20_000);
        assert_eq!(rx.poll_frame_status(20_000), FrameStatus::Pending);
        assert_eq!(rx.channels(), &b_high);

        send(&mut asm_b, &encode_rc_channels_frame(&channels(650, 1000, 1300)), 26_667);
        assert_eq!(rx.poll_frame_status(26_667), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::A);
    }

    #[test]
    fn test_both_sources_decoded_each_poll() {
        let mut rx = subsystem();
        let mut asm_a = rx.assembler(Source::A);
        let mut asm_b = rx.assembler(Source::B);

        send(&mut asm_a, &encode_rc_channels_frame(&channels(1000, 1000, 1000)), 0);
        send(&mut asm_b, &encode_rc_channels_frame(&channels(1000, 1000, 1500)), 0);
        rx.poll_frame_status(0);

        assert!(!rx.source_state(Source::A).slot().is_done());
        assert!(!rx.source_state(Source::B).slot().is_done());
        assert_eq!(rx.source_state(Source::B).latest_channels().unwrap()[0], 1500);
        assert_eq!(rx.channels()[0], 1000);
    }

    #[test]
    fn test_only_active_link_statistics_exposed() {
        let mut rx = subsystem();
        let mut asm_b = rx.assembler(Source::B);

        let stats = LinkStatistics {
            uplink_rssi_ant1_dbm: -60,
            uplink_lq: 100,
            ..Default::default()
        };
        let payload = encode_link_statistics_payload(&stats);
        let frame = encode_frame(CRSF_ADDRESS_FLIGHT_CONTROLLER, CRSF_FRAMETYPE_LINK_STATISTICS, &payload).unwrap();
        send(&mut asm_b, &frame, 0);

        assert_eq!(rx.poll_frame_status(0), FrameStatus::Pending);
        assert_eq!(rx.link_statistics(), None);
        assert!(rx.source_state(Source::B).link_statistics().is_some());

        assert!(rx.request_switch(0));
        assert_eq!(rx.link_statistics(), Some(stats));
        assert!(rx.uplink_strength() > 0);
    }

    #[test]
    fn test_health_timeout() {
        let mut rx = subsystem();
        let mut asm = rx.assembler(Source::A);

        send(&mut asm, &encode_rc_channels_frame(&channels(1000, 1000, 1000)), 0);
        rx.poll_frame_status(1_000);

        let timeout = 15 * FRAME_INTERVAL_US;
        assert!(rx.is_active(1_000));
        assert!(rx.is_active(1_000 + timeout));
        assert!(!rx.is_active(1_000 + timeout + 1));
    }

    #[test]
    fn test_flyaway_frames_still_count_as_alive() {
        let mut rx = subsystem();
        let mut asm = rx.assembler(Source::A);

        send(&mut asm, &encode_rc_channels_frame(&channels(1000, 1900, 1000)), 0);
        assert_eq!(rx.poll_frame_status(0), FrameStatus::Pending);
        assert!(rx.is_active(0));
        assert_eq!(
            rx.flyaway_state(Source::A),
            FlyawayState::Asserted { since_us: 0 }
        );
    }

    #[test]
    fn test_detached_default_source_hands_over() {
        let mut rx = subsystem();
        rx.mark_detached(Source::A);
        assert_eq!(rx.active_source(), Source::B);

        // B cannot switch back to a detached A
        let mut asm_b = rx.assembler(Source::B);
        send(&mut asm_b, &encode_rc_channels_frame(&channels(300, 1000, 1000)), 0);
        assert_eq!(rx.poll_frame_status(0), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::B);
    }

    #[test]
    fn test_auto_switch_promotes_standby_channels() {
        let mut rx = subsystem();
        let mut asm_a = rx.assembler(Source::A);
        let mut asm_b = rx.assembler(Source::B);

        let standby = channels(1000, 1000, 1300);
        send(&mut asm_a, &encode_rc_channels_frame(&channels(1000, 1000, 1100)), 0);
        send(&mut asm_b, &encode_rc_channels_frame(&standby), 0);
        rx.poll_frame_status(0);
        assert_eq!(rx.channels()[0], 1100);

        send(&mut asm_a, &encode_rc_channels_frame(&channels(1650, 1000, 1900)), 6_667);
        assert_eq!(rx.poll_frame_status(6_667), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::B);
        assert_eq!(rx.channels(), &standby);
    }

    #[test]
    fn test_switch_back_uses_frame_from_same_poll() {
        let mut rx = subsystem();
        assert!(rx.request_switch(0));
        let mut asm_a = rx.assembler(Source::A);
        let mut asm_b = rx.assembler(Source::B);

        let a_frame = channels(1000, 1000, 1100);
        send(&mut asm_a, &encode_rc_channels_frame(&a_frame), 10_000);
        send(&mut asm_b, &encode_rc_channels_frame(&channels(650, 1000, 1300)), 10_000);

        assert_eq!(rx.poll_frame_status(10_000), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::A);
        assert_eq!(rx.channels(), &a_frame);
    }

    #[test]
    fn test_one_switch_per_poll() {
        let mut rx = subsystem();
        let mut asm_a = rx.assembler(Source::A);
        let mut asm_b = rx.assembler(Source::B);

        let b_frame = channels(650, 1000, 1300);
        send(&mut asm_a, &encode_rc_channels_frame(&channels(1650, 1000, 1900)), 0);
        send(&mut asm_b, &encode_rc_channels_frame(&b_frame), 0);

        assert_eq!(rx.poll_frame_status(0), FrameStatus::Complete);
        assert_eq!(rx.active_source(), Source::B);
        assert_eq!(rx.channels(), &b_frame);

        // The next poll evaluates B's mode channel normally
        send(&mut asm_b, &encode_rc_channels_frame(&b_frame), 6_667);
        rx.poll_frame_status(6_667);
        assert_eq!(rx.active_source(), Source::A);
    }

    #[test]
    fn test_manual_switch_promotes_standby_channels() {
        let mut rx = subsystem();
        let mut asm_b = rx.assembler(Source::B);

        let standby = channels(1000, 1000, 1300);
        send(&mut asm_b, &encode_rc_channels_frame(&standby), 0);
        assert_eq!(rx.poll_frame_status(0), FrameStatus::Pending);
        assert_eq!(rx.channels(), &CHANNELS_AT_REST);

        assert!(rx.request_switch(1_000));
        assert_eq!(rx.channels(), &standby);
        assert_eq!(rx.read_channel(0), Some(channel_to_pwm(1300)));
    }

    #[test]
    fn test_flyaway_held_standby_is_not_promoted() {
        let mut rx = subsystem();
        let mut asm_b = rx.assembler(Source::B);

        send(&mut asm_b, &encode_rc_channels_frame(&channels(1000, 1700, 1300)), 0);
        rx.poll_frame_status(0);

        assert!(rx.request_switch(1_000));
        assert_eq!(rx.active_source(), Source::B);
        assert_eq!(rx.channels(), &CHANNELS_AT_REST);
    }

    #[test]
    fn test_detach_promotes_standby_channels() {
        let mut rx = subsystem();
        let mut asm_b = rx.assembler(Source::B);

        let standby = channels(1000, 1000, 1300);
        send(&mut asm_b, &encode_rc_channels_frame(&standby), 0);
        rx.poll_frame_status(0);

        rx.mark_detached(Source::A);
        assert_eq!(rx.active_source(), Source::B);
        assert_eq!(rx.channels(), &standby);
    }
}
