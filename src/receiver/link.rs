//! # Uplink Signal Strength
//!
//! Derives an RSSI-style strength value (0-1023) from CRSF link statistics
//! for consumers that expect a classic analog RSSI reading.

use crate::crsf::protocol::LinkStatistics;

/// Full-scale strength value
pub const RSSI_MAX_VALUE: u16 = 1023;

/// dBm window mapped onto 0-99% strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RssiRange {
    pub min_dbm: i16,
    pub max_dbm: i16,
}

impl Default for RssiRange {
    fn default() -> Self {
        Self {
            min_dbm: -120,
            max_dbm: -30,
        }
    }
}

/// Strength of the active uplink antenna
///
/// Quadratic in the distance below `max_dbm`, so the reading falls slowly
/// near a strong signal and quickly towards the sensitivity limit. A link
/// with zero link quality reads 0.
///
/// # Examples
///
/// ```
/// use crsf_failover::crsf::protocol::LinkStatistics;
/// use crsf_failover::receiver::link::{uplink_strength, RssiRange, RSSI_MAX_VALUE};
///
/// let stats = LinkStatistics { uplink_rssi_ant1_dbm: -30, uplink_lq: 100, ..Default::default() };
/// assert_eq!(uplink_strength(&stats, RssiRange::default()), RSSI_MAX_VALUE);
/// ```
pub fn uplink_strength(stats: &LinkStatistics, range: RssiRange) -> u16 {
    if stats.uplink_lq == 0 {
        return 0;
    }

    let rssi = i32::from(stats.uplink_rssi_dbm());
    let min = i32::from(range.min_dbm);
    let max = i32::from(range.max_dbm);
    if max <= min {
        return 0;
    }

    let percent = if rssi >= max {
        99
    } else if rssi < min {
        0
    } else {
        let span_sq = (max - min).pow(2);
        ((100 * span_sq - 100 * (max - rssi).pow(2)) / span_sq).clamp(0, 99)
    };

    ((percent * i32::from(RSSI_MAX_VALUE)) / 99) as u16
}
