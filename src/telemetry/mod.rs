//! # Telemetry Module
//!
//! Outbound telemetry towards the receivers.
//!
//! This module handles:
//! - Holding the newest pending payload per telemetry port
//! - Half-duplex send-window timing against inbound frame starts
//! - Handing payloads to the port writer without blocking the control loop

pub mod scheduler;

pub use scheduler::{Duplex, TelemetryScheduler, TickOutcome};
