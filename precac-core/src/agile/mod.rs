//! Agile CAC
//!
//! - [`state`] - states and events of the agile state machine
//! - [`config`] - operator knobs (mode, width, timeouts)
//! - [`machine`] - the state machine itself and the actions it requests

pub mod config;
pub mod machine;
pub mod state;

pub use config::{AgileConfig, AgileMode};
pub use machine::{
    AgileAction, AgileChannel, AgileSm, DetectorRequest, OcacCompletion, OcacMode, OcacStatus,
    MAX_RCAC_DURATION, MIN_RCAC_DURATION,
};
pub use state::{AgileEvent, AgileState};
