//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for the CRSF receiver link.
//!
//! Every frame has the structure
//! `<address> <length> <type> <payload...> <crc>` where `length` counts
//! type + payload + crc.

use super::crc::frame_crc;

/// Flight controller address, also used as the sync byte
pub const CRSF_ADDRESS_FLIGHT_CONTROLLER: u8 = 0xC8;

/// Link Statistics frame type
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// RC Channels frame type
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Flight mode telemetry frame type (null-terminated string payload)
pub const CRSF_FRAMETYPE_FLIGHT_MODE: u8 = 0x21;

/// MSP request frame type
pub const CRSF_FRAMETYPE_MSP_REQ: u8 = 0x7A;

/// MSP write frame type
pub const CRSF_FRAMETYPE_MSP_WRITE: u8 = 0x7C;

/// Maximum CRSF frame size (address + length + type + payload + crc)
pub const CRSF_FRAME_SIZE_MAX: usize = 64;

/// Maximum CRSF payload size: 64 - address - length - type - crc
pub const CRSF_MAX_PAYLOAD_SIZE: usize = 60;

/// Smallest legal value of the length byte (type + crc)
pub const CRSF_FRAME_LENGTH_MIN: u8 = 2;

/// Largest legal value of the length byte
pub const CRSF_FRAME_LENGTH_MAX: u8 = (CRSF_FRAME_SIZE_MAX - 2) as u8;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Digital channel range reported by receivers
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 172;
pub const CRSF_CHANNEL_VALUE_MID: u16 = 992;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 1811;

/// Largest value an 11-bit channel field can carry
pub const CRSF_CHANNEL_VALUE_11BIT_MAX: u16 = 0x7FF;

/// Maximum time a single frame may take on the wire, including room for an
/// ad-hoc request
pub const MAX_FRAME_TIME_US: u64 = 1_100;

/// Fastest interval between frames sent by the transmitter (150 Hz)
pub const FRAME_INTERVAL_US: u64 = 6_667;

/// Uplink TX power states in mW, indexed by the wire value
pub const CRSF_TX_POWER_MW: [u16; 9] = [0, 10, 25, 100, 500, 1000, 2000, 250, 50];

/// Sixteen 11-bit channel values, in wire order
pub type ChannelSet = [u16; CRSF_NUM_CHANNELS];

/// Channel set reported before any frame has been received (all centered)
pub const CHANNELS_AT_REST: ChannelSet = [CRSF_CHANNEL_VALUE_MID; CRSF_NUM_CHANNELS];

/// Convert a digital channel value into a PWM pulse width in microseconds
///
/// Maps 172 → 988 µs, 992 → 1500 µs and 1811 → 2012 µs.
///
/// # Examples
///
/// ```
/// use crsf_failover::crsf::protocol::channel_to_pwm;
///
/// assert_eq!(channel_to_pwm(172), 988);
/// assert_eq!(channel_to_pwm(992), 1500);
/// assert_eq!(channel_to_pwm(1811), 2012);
/// ```
pub fn channel_to_pwm(raw: u16) -> u16 {
    (u32::from(raw) * 1024 / 1639 + 881) as u16
}

/// Map an uplink TX power index to milliwatts; unknown indices map to 0
pub fn tx_power_mw(index: u8) -> u16 {
    CRSF_TX_POWER_MW.get(index as usize).copied().unwrap_or(0)
}

/// Link statistics reported by a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in dBm
    pub uplink_rssi_ant1_dbm: i16,

    /// Uplink RSSI (antenna 2) in dBm
    pub uplink_rssi_ant2_dbm: i16,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power in mW
    pub uplink_tx_power_mw: u16,

    /// Downlink RSSI in dBm
    pub downlink_rssi_dbm: i16,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

impl LinkStatistics {
    /// RSSI of the antenna the receiver is currently using
    pub fn uplink_rssi_dbm(&self) -> i16 {
        if self.active_antenna != 0 {
            self.uplink_rssi_ant2_dbm
        } else {
            self.uplink_rssi_ant1_dbm
        }
    }
}

/// Borrowed view of a complete frame held in an assembly buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameRef<'a> {
    /// Wrap a complete frame; `None` unless the length byte matches the slice
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        let declared = *bytes.get(1)?;
        if !(CRSF_FRAME_LENGTH_MIN..=CRSF_FRAME_LENGTH_MAX).contains(&declared)
            || bytes.len() != declared as usize + 2
        {
            return None;
        }
        Some(Self { bytes })
    }

    pub fn address(&self) -> u8 {
        self.bytes[0]
    }

    pub fn frame_type(&self) -> u8 {
        self.bytes[2]
    }

    /// Payload between the type byte and the CRC byte
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[3..self.bytes.len() - 1]
    }

    pub fn crc(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Whether the trailing CRC matches type + payload
    pub fn crc_valid(&self) -> bool {
        frame_crc(self.frame_type(), self.payload()) == self.crc()
    }

    /// Raw frame bytes, address through CRC
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Fixed-capacity copy of one frame, used on the consumer side of a frame slot
#[derive(Debug, Clone)]
pub struct RawFrame {
    buf: [u8; CRSF_FRAME_SIZE_MAX],
    len: usize,
}

impl RawFrame {
    pub const fn empty() -> Self {
        Self {
            buf: [0; CRSF_FRAME_SIZE_MAX],
            len: 0,
        }
    }

    /// Mutable access to the backing storage, used when copying a frame in
    pub(crate) fn storage_mut(&mut self) -> &mut [u8; CRSF_FRAME_SIZE_MAX] {
        &mut self.buf
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(CRSF_FRAME_SIZE_MAX);
    }

    /// View the copied bytes as a frame
    pub fn frame(&self) -> Option<FrameRef<'_>> {
        FrameRef::new(&self.buf[..self.len])
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::empty()
    }
}
