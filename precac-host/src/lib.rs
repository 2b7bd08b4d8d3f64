//! # PreCAC Host
//!
//! Runs the `precac-core` chip the way a driver would: it owns the tokio
//! timers, a simulated agile detector and the configuration, and replays
//! scenarios of external triggers (interfaces coming up, radar reports,
//! mode changes) against the chip.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   HostEvent    ┌─────────────────────────────┐
//! │ scenario (replay) │ ─────────────▶ │ executor                    │
//! └───────────────────┘                │  ├─ Arc<Chip> (precac-core) │
//!                                      │  ├─ HostTimers              │
//!          timers / detector ───────▶  │  └─ SimulatedDetector       │
//!                                      └─────────────────────────────┘
//! ```
//!
//! The core never sleeps or spawns: it answers each event with a list of
//! [`AgileAction`](precac_core::AgileAction)s. The [`executor::Executor`]
//! carries those out and turns expired timers and firmware completions
//! back into events.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use precac_host::{config::HostConfig, executor::Executor, TimeScale};
//! use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = HostConfig::load("precac.json".as_ref()).map_err(|e| miette::miette!("{e}"))?;
//!     let chip = Arc::new(config.build_chip().map_err(|e| miette::miette!("{e}"))?);
//!
//!     Toplevel::new(|s| async move {
//!         let executor = Executor::new(chip, TimeScale::default());
//!         s.start(SubsystemBuilder::new("executor", move |s| executor.run(s)));
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use precac_core::{
    AgileConfig, AgileEvent, CatalogChannel, MHz, OcacCompletion, OperatingChannel,
    RadarFoundInfo,
};
use tokio::sync::mpsc::UnboundedSender;

pub mod config;
pub mod error;
pub mod executor;
pub mod firmware;
pub mod scenario;
pub mod timer;

pub use error::HostError;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Chip configuration: agile settings and radios
    #[arg(short, long)]
    pub config: PathBuf,

    /// Scenario to replay; without one the host idles until interrupted
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,

    /// Speed factor for all timers, e.g. 60 turns a 60 s CAC into one second
    #[arg(short, long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Print every radio's forest on exit
    #[arg(long, default_value_t = false)]
    pub dump: bool,
}

/// Speed factor applied to simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale(f64);

impl Default for TimeScale {
    fn default() -> Self {
        TimeScale(1.0)
    }
}

impl TimeScale {
    pub fn new(factor: f64) -> Result<Self, HostError> {
        if factor.is_finite() && factor > 0.0 {
            Ok(TimeScale(factor))
        } else {
            Err(HostError::InvalidTimeScale(factor))
        }
    }

    /// Wall-clock duration of a simulated `duration`.
    pub fn scale(&self, duration: Duration) -> Duration {
        Duration::try_from_secs_f64(duration.as_secs_f64() / self.0).unwrap_or(Duration::MAX)
    }
}

/// Input to the executor.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Agile(AgileEvent),
    Radar {
        radio: usize,
        info: RadarFoundInfo,
    },
    NolExpired {
        radio: usize,
        freq: MHz,
    },
    OcacComplete {
        radio: usize,
        completion: OcacCompletion,
    },
    SetConfig(AgileConfig),
    PreferredChannel {
        radio: usize,
        channel: OperatingChannel,
    },
    RegulatoryChange {
        radio: usize,
        channels: Option<Vec<CatalogChannel>>,
    },
    Transfer {
        from: usize,
        to: usize,
        low: MHz,
        high: MHz,
    },
    Dump {
        radio: usize,
    },
}

/// Sending side of the executor queue.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: UnboundedSender<HostEvent>,
}

impl HostHandle {
    pub(crate) fn new(tx: UnboundedSender<HostEvent>) -> Self {
        HostHandle { tx }
    }

    pub fn send(&self, event: HostEvent) -> Result<(), HostError> {
        self.tx.send(event).map_err(|_| HostError::ExecutorGone)
    }
}
