use std::io;

use precac_core::{MHz, PrecacError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Core(#[from] PrecacError),

    #[error("Configuration has no radios")]
    NoRadios,

    #[error("Radio {radio}: channel at {center_freq} MHz is not a 5 GHz channel")]
    InvalidChannel { radio: String, center_freq: MHz },

    #[error("Time scale must be a positive number, got {0}")]
    InvalidTimeScale(f64),

    #[error("Scenario refers to radio {0}, but only {1} are configured")]
    UnknownRadio(usize, usize),

    #[error("Executor has shut down")]
    ExecutorGone,
}
