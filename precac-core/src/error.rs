//! Error types for the preCAC core

use thiserror::Error;

use crate::channel::{ChannelWidth, MHz};

/// Errors raised while building or querying the preCAC forest and the agile
/// state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrecacError {
    /// Bandwidth has no offset table
    #[error("Invalid channel width: {0}")]
    InvalidChannelWidth(String),

    /// A root channel could not be built; the entry is skipped
    #[error("Tree build failed for {center_freq} MHz / {width}: {reason}")]
    TreeBuild {
        center_freq: MHz,
        width: ChannelWidth,
        reason: String,
    },

    /// No tree node or forest entry covers the frequency
    #[error("Channel not found: {0} MHz")]
    ChannelNotFound(MHz),

    /// Radio index outside the chip's radio table
    #[error("Unknown radio index: {0}")]
    UnknownRadio(usize),

    /// Event refers to a channel or timer generation the state machine no
    /// longer owns
    #[error("Stale ownership: event generation {event} but current is {current}")]
    StaleOwnership { event: u64, current: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PrecacError::TreeBuild {
            center_freq: 5570,
            width: ChannelWidth::Mhz160,
            reason: "duplicate node 5530".into(),
        };
        assert_eq!(
            err.to_string(),
            "Tree build failed for 5570 MHz / 160: duplicate node 5530"
        );
        assert_eq!(
            PrecacError::StaleOwnership { event: 1, current: 2 }.to_string(),
            "Stale ownership: event generation 1 but current is 2"
        );
    }
}
