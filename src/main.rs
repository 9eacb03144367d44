//! # CRSF Failover
//!
//! Reads two CRSF receivers and drives the outputs from whichever one the
//! failover rules select.

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crsf_failover::clock::MonotonicClock;
use crsf_failover::config::Config;
use crsf_failover::crsf::encoder::encode_flight_mode_frame;
use crsf_failover::error::CrsfFailoverError;
use crsf_failover::receiver::{FrameStatus, ReceiverSubsystem, Source};
use crsf_failover::serial::{self, AuxFrameLogger, ChannelSink, PortHandle};
use crsf_failover::telemetry::{Duplex, TelemetryScheduler};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for CRSF Failover
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up non-blocking logging with an `RUST_LOG` filter
///    - Load configuration (path from the first argument)
///    - Open every enabled receiver port; a port that fails to open is
///      detached from failover
///
/// 2. **Main Loop**
///    - Poll the receiver subsystem at `poll_rate_hz`, flushing telemetry
///      whenever the half-duplex window allows
///    - Queue a flight-mode frame naming the active source at
///      `telemetry_rate_hz`
///    - Log a status line every `status_interval_ms`
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the configuration is invalid or no receiver port opens
#[tokio::main]
async fn main() -> Result<()> {
    let (log_writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(log_writer)
        .init();

    info!("CRSF Failover v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let clock = MonotonicClock::new();
    let mut subsystem = ReceiverSubsystem::new(config.receiver_settings());
    let mut ports: Vec<PortHandle> = Vec::new();

    for source in Source::ALL {
        let source_config = config.source(source);
        if !source_config.enabled {
            info!("Receiver {} disabled", source);
            subsystem.mark_detached(source);
            continue;
        }

        match serial::init_source(
            source,
            source_config,
            subsystem.assembler(source),
            clock,
            AuxFrameLogger::new(source),
        ) {
            Ok(handle) => ports.push(handle),
            Err(e) => {
                warn!("Receiver {} unavailable: {}", source, e);
                subsystem.mark_detached(source);
            }
        }
    }

    if ports.is_empty() {
        let tried = Source::ALL
            .iter()
            .map(|&source| config.source(source))
            .filter(|cfg| cfg.enabled)
            .map(|cfg| cfg.port.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CrsfFailoverError::NoReceiverPort(tried).into());
    }

    let mut schedulers: Vec<TelemetryScheduler<ChannelSink>> = Vec::new();
    for port in ports.iter_mut() {
        let source = port.source();
        if let Some(sink) = port.take_sink() {
            let duplex = if config.source(source).half_duplex {
                Duplex::Half
            } else {
                Duplex::Full
            };
            let scheduler = TelemetryScheduler::new(duplex, subsystem.frame_slot(source), sink);
            info!("Telemetry enabled on receiver {} ({:?} duplex)", source, scheduler.duplex());
            schedulers.push(scheduler);
        }
    }

    let mut poll_interval = interval(Duration::from_micros(
        1_000_000 / u64::from(config.runtime.poll_rate_hz),
    ));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut telemetry_interval = interval(Duration::from_micros(
        1_000_000 / u64::from(config.runtime.telemetry_rate_hz),
    ));
    telemetry_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_interval = interval(Duration::from_millis(config.runtime.status_interval_ms));

    info!(
        "Polling receivers at {}Hz, active source {}",
        config.runtime.poll_rate_hz,
        subsystem.active_source()
    );
    info!("Press Ctrl+C to exit");

    let mut frames_complete: u64 = 0;

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                let now_us = clock.now_us();
                if subsystem.poll_frame_status(now_us) == FrameStatus::Complete {
                    frames_complete += 1;
                }
                for scheduler in schedulers.iter_mut() {
                    scheduler.tick(now_us);
                }
            }

            _ = telemetry_interval.tick() => {
                let frame = encode_flight_mode_frame(&format!("RX {}", subsystem.active_source()));
                for scheduler in schedulers.iter_mut() {
                    scheduler.write_telemetry(&frame);
                }
            }

            _ = status_interval.tick() => {
                log_status(&subsystem, &ports, clock.now_us(), frames_complete);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total channel updates: {}", frames_complete);
                break;
            }
        }
    }

    for port in ports {
        port.shutdown();
    }

    Ok(())
}

/// Log one status line for the link and one per source
fn log_status(subsystem: &ReceiverSubsystem, ports: &[PortHandle], now_us: u64, frames_complete: u64) {
    let active = subsystem.active_source();
    let pwm: Vec<u16> = (0..4).filter_map(|i| subsystem.read_channel(i)).collect();

    info!(
        active = %active,
        link_active = subsystem.is_active(now_us),
        uplink_strength = subsystem.uplink_strength(),
        "Channel updates: {}, sticks {:?}",
        frames_complete,
        pwm
    );

    if let Some(stats) = subsystem.link_statistics() {
        info!(
            "Link {}: RSSI {} dBm, LQ {}%, SNR {} dB, TX {} mW",
            active,
            stats.uplink_rssi_dbm(),
            stats.uplink_lq,
            stats.uplink_snr,
            stats.uplink_tx_power_mw
        );
    }

    for state in Source::ALL.map(|source| subsystem.source_state(source)) {
        info!(
            source = %state.source(),
            flyaway = ?subsystem.flyaway_state(state.source()),
            "Decoded {}, rejected {}, overruns {}",
            state.frames_decoded(),
            state.frames_rejected(),
            state.slot().overruns()
        );
    }

    for port in ports.iter().filter(|port| port.is_reader_finished()) {
        warn!("Receiver {} port {} is no longer reading", port.source(), port.port_path());
    }
}
