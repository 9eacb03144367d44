//! # CRSF Frame Encoder
//!
//! Builds CRSF frames for the outbound telemetry path and packs RC channel
//! payloads.

use bytes::{BufMut, BytesMut};

use super::crc::frame_crc;
use super::protocol::*;
use crate::error::{CrsfFailoverError, Result};

/// Encode a complete CRSF frame
///
/// # Arguments
///
/// * `address` - Destination address byte
/// * `frame_type` - Frame type byte
/// * `payload` - Payload data (max 60 bytes)
///
/// # Returns
///
/// * `Result<BytesMut>` - `address, length, type, payload, crc`
///
/// # Errors
///
/// Returns error if the payload exceeds CRSF_MAX_PAYLOAD_SIZE (60 bytes)
pub fn encode_frame(address: u8, frame_type: u8, payload: &[u8]) -> Result<BytesMut> {
    if payload.len() > CRSF_MAX_PAYLOAD_SIZE {
        return Err(CrsfFailoverError::CrsfProtocol(format!(
            "Payload size {} exceeds maximum {}",
            payload.len(),
            CRSF_MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(payload.len() + 4);
    frame.put_u8(address);
    frame.put_u8((payload.len() + 2) as u8); // type + payload + crc
    frame.put_u8(frame_type);
    frame.put_slice(payload);
    frame.put_u8(frame_crc(frame_type, payload));

    Ok(frame)
}

/// Encode RC channels into a complete frame addressed to the flight controller
///
/// # Examples
///
/// ```
/// use crsf_failover::crsf::encoder::encode_rc_channels_frame;
/// use crsf_failover::crsf::protocol::CHANNELS_AT_REST;
///
/// let frame = encode_rc_channels_frame(&CHANNELS_AT_REST);
/// assert_eq!(frame.len(), 26);
/// ```
pub fn encode_rc_channels_frame(channels: &ChannelSet) -> BytesMut {
    let payload = encode_rc_channels_payload(channels);
    let mut frame = BytesMut::with_capacity(CRSF_RC_CHANNELS_PAYLOAD_SIZE + 4);
    frame.put_u8(CRSF_ADDRESS_FLIGHT_CONTROLLER);
    frame.put_u8((CRSF_RC_CHANNELS_PAYLOAD_SIZE + 2) as u8);
    frame.put_u8(CRSF_FRAMETYPE_RC_CHANNELS_PACKED);
    frame.put_slice(&payload);
    frame.put_u8(frame_crc(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, &payload));
    frame
}

/// Encode RC channels into payload (22 bytes)
///
/// Packs 16 channels (11 bits each) into 22 bytes using bit packing.
/// Channels are packed as a continuous bitstream, LSB first.
///
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
///
/// Values above 2047 are clamped to the 11-bit maximum.
pub fn encode_rc_channels_payload(channels: &ChannelSet) -> [u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
    let mut payload = [0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    let mut bit_index = 0;

    for &channel in channels.iter() {
        let value = channel.min(CRSF_CHANNEL_VALUE_11BIT_MAX);

        for bit in 0..11 {
            if (value >> bit) & 1 == 1 {
                payload[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    payload
}

/// Encode link statistics into their 10-byte wire payload
///
/// RSSI values are sent as magnitudes; the TX power is sent as the table
/// index of the given milliwatt value (0 when it is not in the table).
pub fn encode_link_statistics_payload(stats: &LinkStatistics) -> [u8; CRSF_LINK_STATS_PAYLOAD_SIZE] {
    let power_index = CRSF_TX_POWER_MW
        .iter()
        .position(|&mw| mw == stats.uplink_tx_power_mw)
        .unwrap_or(0) as u8;

    [
        rssi_magnitude(stats.uplink_rssi_ant1_dbm),
        rssi_magnitude(stats.uplink_rssi_ant2_dbm),
        stats.uplink_lq,
        stats.uplink_snr as u8,
        stats.active_antenna,
        stats.rf_mode,
        power_index,
        rssi_magnitude(stats.downlink_rssi_dbm),
        stats.downlink_lq,
        stats.downlink_snr as u8,
    ]
}

/// Encode a flight-mode telemetry frame carrying a short status string
///
/// The text is truncated so the null-terminated payload fits one frame.
pub fn encode_flight_mode_frame(text: &str) -> BytesMut {
    let bytes = text.as_bytes();
    let len = bytes.len().min(CRSF_MAX_PAYLOAD_SIZE - 1);

    let mut payload = [0u8; CRSF_MAX_PAYLOAD_SIZE];
    payload[..len].copy_from_slice(&bytes[..len]);

    let mut frame = BytesMut::with_capacity(len + 5);
    frame.put_u8(CRSF_ADDRESS_FLIGHT_CONTROLLER);
    frame.put_u8((len + 3) as u8); // type + text + nul + crc
    frame.put_u8(CRSF_FRAMETYPE_FLIGHT_MODE);
    frame.put_slice(&payload[..=len]);
    frame.put_u8(frame_crc(CRSF_FRAMETYPE_FLIGHT_MODE, &payload[..=len]));
    frame
}

fn rssi_magnitude(dbm: i16) -> u8 {
    dbm.unsigned_abs().min(u16::from(u8::MAX)) as u8
}
