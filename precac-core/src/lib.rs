//! # PreCAC Core
//!
//! Radar-aware channel pre-clearance for DFS radios.
//!
//! A radio on a radar-shared 5 GHz channel has to listen for radar for a
//! Channel Availability Check (CAC, 60 s to 10 min) before it may transmit.
//! This crate remembers which channels have already been checked ahead of
//! time, and coordinates the single agile radar detector of a chip that does
//! the checking for all of the chip's radios.
//!
//! The crate is pure logic with **no I/O and no async**: every decision that
//! needs a timer, firmware or a channel switch is returned as an
//! [`AgileAction`] for the host to carry out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  precac-core                                                │
//! │  ├── channel/  (widths, catalog, operating channel)         │
//! │  ├── tree/     (per-root BST of CAC / NOL counters)         │
//! │  ├── forest/   (ordered list of trees, channel selection)   │
//! │  ├── radar/    (radar report → NOL sub-channels)            │
//! │  ├── agile/    (INIT / RUNNING / COMPLETE state machine)    │
//! │  └── chip/     (locks, radar + NOL + preferred channel API) │
//! └─────────────────────────────────────────────────────────────┘
//!                               ▲
//!                  ┌────────────┴────────────┐
//!                  │  precac-host            │
//!                  │  (tokio timers, fake    │
//!                  │   detector firmware)    │
//!                  └─────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`channel`] - Channel widths, frequency helpers, [`ChannelCatalog`]
//! - [`tree`] - [`PrecacTree`], one per root channel
//! - [`forest`] - [`PrecacForest`], the CAC state index of one radio
//! - [`radar`] - Radar report decoding
//! - [`agile`] - Agile state machine
//! - [`chip`] - [`Chip`], the thread-safe entry point
//!
//! ## Example
//!
//! ```rust
//! use precac_core::{
//!     AgileConfig, AgileEvent, AgileState, CatalogChannel, ChannelWidth, Chip,
//!     OperatingChannel, Radio,
//! };
//!
//! let catalog = vec![
//!     CatalogChannel::new(5500, ChannelWidth::Mhz20, true),
//!     CatalogChannel::new(5520, ChannelWidth::Mhz20, true),
//!     CatalogChannel::new(5510, ChannelWidth::Mhz40, true),
//! ];
//! let operating = OperatingChannel::new(5180, ChannelWidth::Mhz20, 5180);
//! let chip = Chip::new(
//!     vec![Radio::new("wifi0", catalog, operating)],
//!     AgileConfig {
//!         agile_width: ChannelWidth::Mhz40,
//!         ..AgileConfig::default()
//!     },
//! );
//!
//! let actions = chip.post_event(AgileEvent::Start { radio: 0 });
//! assert_eq!(chip.state(), AgileState::Running);
//! assert_eq!(actions.len(), 2);
//! ```

pub mod agile;
pub mod channel;
pub mod chip;
pub mod error;
pub mod forest;
pub mod radar;
pub mod radio;
pub mod tree;

// Re-export commonly used types
pub use agile::{
    AgileAction, AgileChannel, AgileConfig, AgileEvent, AgileMode, AgileSm, AgileState,
    DetectorRequest, OcacCompletion, OcacMode, OcacStatus,
};
pub use channel::{CatalogChannel, ChannelCatalog, ChannelWidth, Exclusion, MHz, OperatingChannel};
pub use chip::{Chip, RadarOutcome, TransferOutcome};
pub use error::PrecacError;
pub use forest::{ChannelRequest, PrecacChanState, PrecacEntry, PrecacForest, PrecacStatus};
pub use radar::{RadarDecode, RadarFoundInfo};
pub use radio::Radio;
pub use tree::{NodeState, PrecacTree, TreeNode};
