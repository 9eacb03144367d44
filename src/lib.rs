//! # CRSF Failover Library
//!
//! Decodes two redundant CRSF receiver links and fails over between them.
//!
//! Each receiver port feeds a frame assembler from its read task; the
//! control loop polls [`receiver::ReceiverSubsystem`] for the active
//! channel set, link statistics and health, and schedules outbound
//! telemetry around inbound frames on half-duplex wires.

pub mod clock;
pub mod config;
pub mod crsf;
pub mod error;
pub mod receiver;
pub mod serial;
pub mod telemetry;
