//! # Receiver Module
//!
//! Dual-source receiver arbitration.
//!
//! This module handles:
//! - Per-source decode state (both sources decoded on every poll)
//! - Flyaway gating and hysteretic automatic switching
//! - Channel and link-statistics dispatch from the active source
//! - Uplink strength derivation for RSSI consumers

pub mod dispatch;
pub mod failover;
pub mod link;
pub mod source;

pub use dispatch::{FrameStatus, ReceiverSettings, ReceiverSubsystem};
pub use source::Source;
