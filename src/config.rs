//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{CrsfFailoverError, Result};
use crate::receiver::link::RssiRange;
use crate::receiver::{ReceiverSettings, Source};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source_a: SourceConfig,
    pub source_b: SourceConfig,
    pub failover: FailoverConfig,
    pub osd: OsdConfig,
    pub runtime: RuntimeConfig,
}

/// Serial port configuration of one receiver source
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_half_duplex")]
    pub half_duplex: bool,

    #[serde(default)]
    pub telemetry: bool,
}

/// Failover configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FailoverConfig {
    #[serde(default = "default_source")]
    pub default_source: Source,

    #[serde(default = "default_health_timeout_frames")]
    pub health_timeout_frames: u32,
}

/// Uplink strength (OSD RSSI) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OsdConfig {
    #[serde(default = "default_rssi_dbm_min")]
    pub rssi_dbm_min: i16,

    #[serde(default = "default_rssi_dbm_max")]
    pub rssi_dbm_max: i16,
}

/// Host loop rates
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_poll_rate_hz")]
    pub poll_rate_hz: u32,

    #[serde(default = "default_telemetry_rate_hz")]
    pub telemetry_rate_hz: u32,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

// Default value functions
fn default_enabled() -> bool { true }
fn default_baud_rate() -> u32 { 420000 }
fn default_half_duplex() -> bool { true }

fn default_source() -> Source { Source::A }
fn default_health_timeout_frames() -> u32 { 15 }

fn default_rssi_dbm_min() -> i16 { -120 }
fn default_rssi_dbm_max() -> i16 { -30 }

fn default_poll_rate_hz() -> u32 { 1000 }
fn default_telemetry_rate_hz() -> u32 { 10 }
fn default_status_interval_ms() -> u64 { 5000 }

const SUPPORTED_BAUD_RATES: [u32; 6] = [115200, 400000, 420000, 921600, 1870000, 3750000];

fn invalid(msg: impl std::fmt::Display) -> CrsfFailoverError {
    CrsfFailoverError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_failover::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Port configuration of `source`
    pub fn source(&self, source: Source) -> &SourceConfig {
        match source {
            Source::A => &self.source_a,
            Source::B => &self.source_b,
        }
    }

    /// Operating parameters for the receiver subsystem
    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            default_source: self.failover.default_source,
            health_timeout_frames: self.failover.health_timeout_frames,
            rssi_range: RssiRange {
                min_dbm: self.osd.rssi_dbm_min,
                max_dbm: self.osd.rssi_dbm_max,
            },
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if !self.source_a.enabled && !self.source_b.enabled {
            return Err(invalid("at least one of source_a and source_b must be enabled"));
        }

        for source in Source::ALL {
            let cfg = self.source(source);
            if !cfg.enabled {
                continue;
            }

            if cfg.port.is_empty() {
                return Err(invalid(format!("source {} port cannot be empty", source)));
            }

            if !SUPPORTED_BAUD_RATES.contains(&cfg.baud_rate) {
                return Err(invalid(format!(
                    "source {} baud_rate must be one of: 115200, 400000, 420000, 921600, 1870000, 3750000",
                    source
                )));
            }
        }

        if self.source_a.enabled && self.source_b.enabled && self.source_a.port == self.source_b.port {
            return Err(invalid("source_a and source_b cannot share a port"));
        }

        if !self.source(self.failover.default_source).enabled {
            return Err(invalid(format!(
                "default_source {} is not enabled",
                self.failover.default_source
            )));
        }

        if self.failover.health_timeout_frames == 0 || self.failover.health_timeout_frames > 1000 {
            return Err(invalid("health_timeout_frames must be between 1 and 1000"));
        }

        // Validate RSSI window
        for (name, value) in [
            ("rssi_dbm_min", self.osd.rssi_dbm_min),
            ("rssi_dbm_max", self.osd.rssi_dbm_max),
        ] {
            if !(-130..=0).contains(&value) {
                return Err(invalid(format!("{} must be between -130 and 0", name)));
            }
        }

        if self.osd.rssi_dbm_min >= self.osd.rssi_dbm_max {
            return Err(invalid("rssi_dbm_min must be less than rssi_dbm_max"));
        }

        // Validate loop rates
        if self.runtime.poll_rate_hz < 50 || self.runtime.poll_rate_hz > 8000 {
            return Err(invalid("poll_rate_hz must be between 50 and 8000"));
        }

        if self.runtime.telemetry_rate_hz == 0 || self.runtime.telemetry_rate_hz > 1000 {
            return Err(invalid("telemetry_rate_hz must be between 1 and 1000"));
        }

        if self.runtime.status_interval_ms < 100 || self.runtime.status_interval_ms > 60000 {
            return Err(invalid("status_interval_ms must be between 100 and 60000"));
        }

        Ok(())
    }
}
