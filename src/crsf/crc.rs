//! # CRC8-DVB-S2 Implementation
//!
//! CRC-8-DVB-S2 checksum calculation for CRSF frames.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00
//!
//! The frame checksum covers the type byte and the payload only; the
//! address, length and CRC bytes are never part of it.

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Precomputed CRC8 lookup table for fast calculation
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Fold one byte into a running CRC8-DVB-S2 value
#[inline]
pub fn crc8_dvb_s2_update(crc: u8, byte: u8) -> u8 {
    CRC8_TABLE[(crc ^ byte) as usize]
}

/// Calculate CRC8-DVB-S2 checksum over an arbitrary byte slice
///
/// # Examples
///
/// ```
/// use crsf_failover::crsf::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(&[]), 0x00);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &byte| crc8_dvb_s2_update(crc, byte))
}

/// Calculate the checksum of a CRSF frame
///
/// Seeds at zero, folds in `frame_type` first and then every payload byte
/// in order.
///
/// # Arguments
///
/// * `frame_type` - Frame type byte
/// * `payload` - Payload bytes (without the trailing CRC)
///
/// # Returns
///
/// * `u8` - Checksum the trailing CRC byte must equal
pub fn frame_crc(frame_type: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(crc8_dvb_s2_update(0, frame_type), |crc, &byte| crc8_dvb_s2_update(crc, byte))
}

/// Calculate CRC8-DVB-S2 checksum using direct algorithm (slow, for verification)
#[cfg(test)]
fn crc8_dvb_s2_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
