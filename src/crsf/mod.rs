//! # CRSF Protocol Module
//!
//! Implementation of the Crossfire (CRSF) receiver link.
//!
//! This module handles:
//! - Frame assembly from the raw byte stream with a per-frame deadline
//! - RC channels decoding (16 channels, 11-bit resolution)
//! - Link statistics decoding
//! - CRC8-DVB-S2 checksum calculation
//! - Frame encoding for outbound telemetry

pub mod assembler;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod protocol;
