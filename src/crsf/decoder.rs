//! # CRSF Payload Decoder
//!
//! Decodes frames taken from a [`FrameSlot`](super::assembler::FrameSlot) on
//! the polling side: CRC check, then RC channel unpacking or link statistics.
//!
//! A frame that fails any check decodes to [`Decoded::Pending`]; nothing is
//! reported as an error because the next frame arrives within one period.

use tracing::trace;

use super::protocol::*;

/// Result of decoding one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// No usable frame (none ready, CRC mismatch, wrong size or other type)
    Pending,
    /// New channel candidate from an RC-channels frame
    Channels(ChannelSet),
    /// Link statistics from a LINK_STATISTICS frame
    LinkStatistics(LinkStatistics),
}

/// Decode a complete frame
///
/// # Arguments
///
/// * `frame` - Complete frame (address through CRC)
///
/// # Returns
///
/// * `Decoded` - Channel candidate, link statistics, or `Pending`
pub fn decode_frame(frame: FrameRef<'_>) -> Decoded {
    match frame.frame_type() {
        CRSF_FRAMETYPE_RC_CHANNELS_PACKED => {
            if !check(frame, CRSF_RC_CHANNELS_PAYLOAD_SIZE) {
                return Decoded::Pending;
            }
            Decoded::Channels(decode_rc_channels(frame.payload()))
        }
        CRSF_FRAMETYPE_LINK_STATISTICS => {
            if !check(frame, CRSF_LINK_STATS_PAYLOAD_SIZE) {
                return Decoded::Pending;
            }
            Decoded::LinkStatistics(decode_link_statistics(frame.payload()))
        }
        _ => Decoded::Pending,
    }
}

fn check(frame: FrameRef<'_>, payload_size: usize) -> bool {
    if frame.payload().len() != payload_size {
        trace!(
            frame_type = frame.frame_type(),
            len = frame.payload().len(),
            "Unexpected payload size"
        );
        return false;
    }
    if !frame.crc_valid() {
        trace!(frame_type = frame.frame_type(), "CRC mismatch");
        return false;
    }
    true
}

/// Unpack 16 × 11-bit channel values, LSB first across byte boundaries
///
/// # Arguments
///
/// * `payload` - 22-byte RC channels payload
pub fn decode_rc_channels(payload: &[u8]) -> ChannelSet {
    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut index = 0;

    for &byte in payload.iter().take(CRSF_RC_CHANNELS_PAYLOAD_SIZE) {
        acc |= u32::from(byte) << bits;
        bits += 8;

        while bits >= 11 && index < CRSF_NUM_CHANNELS {
            channels[index] = (acc & u32::from(CRSF_CHANNEL_VALUE_11BIT_MAX)) as u16;
            acc >>= 11;
            bits -= 11;
            index += 1;
        }
    }

    channels
}

/// Decode a 10-byte link statistics payload
///
/// RSSI magnitudes are turned into negative dBm and the TX power index is
/// mapped to milliwatts.
pub fn decode_link_statistics(payload: &[u8]) -> LinkStatistics {
    let byte = |i: usize| payload.get(i).copied().unwrap_or(0);

    LinkStatistics {
        uplink_rssi_ant1_dbm: -i16::from(byte(0)),
        uplink_rssi_ant2_dbm: -i16::from(byte(1)),
        uplink_lq: byte(2),
        uplink_snr: byte(3) as i8,
        active_antenna: byte(4),
        rf_mode: byte(5),
        uplink_tx_power_mw: tx_power_mw(byte(6)),
        downlink_rssi_dbm: -i16::from(byte(7)),
        downlink_lq: byte(8),
        downlink_snr: byte(9) as i8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::crc::frame_crc;
    use crate::crsf::encoder::{
        encode_frame, encode_link_statistics_payload, encode_rc_channels_frame,
        encode_rc_channels_payload,
    };

    fn frame(bytes: &[u8]) -> FrameRef<'_> {
        FrameRef::new(bytes).unwrap()
    }

    #[test]
    fn test_decode_valid_rc_channels_frame() {
        let mut channels = CHANNELS_AT_REST;
        channels[0] = CRSF_CHANNEL_VALUE_MIN;
        channels[15] = CRSF_CHANNEL_VALUE_MAX;
        let bytes = encode_rc_channels_frame(&channels);

        assert_eq!(decode_frame(frame(&bytes)), Decoded::Channels(channels));
    }

    #[test]
    fn test_decode_rc_channels_crc_error() {
        let mut bytes = encode_rc_channels_frame(&CHANNELS_AT_REST);
        bytes[25] ^= 0xFF;

        assert_eq!(decode_frame(frame(&bytes)), Decoded::Pending);
    }

    #[test]
    fn test_any_corrupted_payload_byte_is_rejected() {
        let bytes = encode_rc_channels_frame(&[1500u16; 16]);

        for i in 3..25 {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            assert_eq!(
                decode_frame(frame(&corrupted)),
                Decoded::Pending,
                "Corruption at byte {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        // Pseudo-random 11-bit values from a fixed LCG
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..64 {
            let mut channels = [0u16; CRSF_NUM_CHANNELS];
            for value in channels.iter_mut() {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                *value = ((seed >> 16) & 0x7FF) as u16;
            }

            let payload = encode_rc_channels_payload(&channels);
            assert_eq!(decode_rc_channels(&payload), channels);

            let bytes = encode_rc_channels_frame(&channels);
            assert_eq!(decode_frame(frame(&bytes)), Decoded::Channels(channels));
        }
    }

    #[test]
    fn test_decode_rc_channels_bit_layout() {
        // Byte 0 holds Ch1[0:7], byte 1 Ch1[8:10] | Ch2[0:4]
        let mut payload = [0u8; 22];
        payload[0] = 0xFF;
        payload[1] = 0x07 | (0x03 << 3);

        let channels = decode_rc_channels(&payload);
        assert_eq!(channels[0], 0x7FF);
        assert_eq!(channels[1], 0x03);
        assert!(channels[2..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_decode_link_statistics() {
        let payload = [
            100u8, // uplink_rssi_1
            95,    // uplink_rssi_2
            80,    // uplink_lq (80%)
            0xF6,  // uplink_snr (-10)
            1,     // active_antenna
            2,     // rf_mode
            4,     // uplink_tx_power index (500 mW)
            90,    // downlink_rssi
            85,    // downlink_lq
            12,    // downlink_snr
        ];

        let stats = decode_link_statistics(&payload);
        assert_eq!(stats.uplink_rssi_ant1_dbm, -100);
        assert_eq!(stats.uplink_rssi_ant2_dbm, -95);
        assert_eq!(stats.uplink_rssi_dbm(), -95);
        assert_eq!(stats.uplink_lq, 80);
        assert_eq!(stats.uplink_snr, -10);
        assert_eq!(stats.rf_mode, 2);
        assert_eq!(stats.uplink_tx_power_mw, 500);
        assert_eq!(stats.downlink_rssi_dbm, -90);
        assert_eq!(stats.downlink_lq, 85);
        assert_eq!(stats.downlink_snr, 12);
    }

    #[test]
    fn test_decode_link_statistics_unknown_power_index() {
        let mut payload = [0u8; 10];
        payload[6] = 9;
        assert_eq!(decode_link_statistics(&payload).uplink_tx_power_mw, 0);
    }

    #[test]
    fn test_decode_link_statistics_frame() {
        let stats = LinkStatistics {
            uplink_rssi_ant1_dbm: -60,
            uplink_rssi_ant2_dbm: -64,
            uplink_lq: 100,
            uplink_snr: 9,
            active_antenna: 0,
            rf_mode: 6,
            uplink_tx_power_mw: 100,
            downlink_rssi_dbm: -71,
            downlink_lq: 99,
            downlink_snr: 5,
        };
        let payload = encode_link_statistics_payload(&stats);
        let bytes = encode_frame(CRSF_ADDRESS_FLIGHT_CONTROLLER, CRSF_FRAMETYPE_LINK_STATISTICS, &payload)
            .unwrap();

        assert_eq!(decode_frame(frame(&bytes)), Decoded::LinkStatistics(stats));
    }

    #[test]
    fn test_wrong_payload_size_is_pending() {
        let payload = [0u8; 21];
        let crc = frame_crc(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, &payload);
        let mut bytes = vec![CRSF_ADDRESS_FLIGHT_CONTROLLER, 23, CRSF_FRAMETYPE_RC_CHANNELS_PACKED];
        bytes.extend_from_slice(&payload);
        bytes.push(crc);

        assert_eq!(decode_frame(frame(&bytes)), Decoded::Pending);
    }

    #[test]
    fn test_other_frame_types_are_pending() {
        let bytes = encode_frame(CRSF_ADDRESS_FLIGHT_CONTROLLER, 0x28, &[0xEC, 0xC8]).unwrap();
        assert_eq!(decode_frame(frame(&bytes)), Decoded::Pending);
    }
}
