//! Agile state machine states and events.

use serde::{Deserialize, Serialize};

// =============================================================================
// State
// =============================================================================

/// State of the shared agile detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgileState {
    /// Idle, no channel owned
    Init,
    /// A channel is selected, firmware configured and the CAC timer running
    Running,
    /// Rolling CAC finished on the owned channel; detector stays resident
    Complete,
}

impl Default for AgileState {
    fn default() -> Self {
        AgileState::Init
    }
}

impl AgileState {
    pub fn is_idle(&self) -> bool {
        matches!(self, AgileState::Init)
    }

    /// A radio holds the detector in this state.
    pub fn is_owned(&self) -> bool {
        matches!(self, AgileState::Running | AgileState::Complete)
    }
}

impl std::fmt::Display for AgileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgileState::Init => write!(f, "INIT"),
            AgileState::Running => write!(f, "RUNNING"),
            AgileState::Complete => write!(f, "COMPLETE"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event delivered to the agile state machine. `radio` is the index of the
/// radio the event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgileEvent {
    /// Radio wants to use the shared detector
    Start { radio: usize },
    /// Radio stops using agile CAC
    Stop { radio: usize },
    /// Host CAC timer expired; `generation` identifies the timer
    Done { radio: usize, generation: u64 },
    /// Radar on the channel the agile detector owns
    RadarFound { radio: usize },
}

impl AgileEvent {
    pub fn radio(&self) -> usize {
        match *self {
            AgileEvent::Start { radio }
            | AgileEvent::Stop { radio }
            | AgileEvent::Done { radio, .. }
            | AgileEvent::RadarFound { radio } => radio,
        }
    }
}

impl std::fmt::Display for AgileEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgileEvent::Start { .. } => write!(f, "START"),
            AgileEvent::Stop { .. } => write!(f, "STOP"),
            AgileEvent::Done { .. } => write!(f, "DONE"),
            AgileEvent::RadarFound { .. } => write!(f, "RADAR_FOUND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(AgileState::default().to_string(), "INIT");
        assert_eq!(AgileState::Running.to_string(), "RUNNING");
        assert!(AgileState::Complete.is_owned());
        assert!(!AgileState::Init.is_owned());
    }

    #[test]
    fn test_event_radio() {
        let ev = AgileEvent::Done {
            radio: 1,
            generation: 7,
        };
        assert_eq!(ev.radio(), 1);
        assert_eq!(ev.to_string(), "DONE");
        assert_eq!(AgileEvent::RadarFound { radio: 0 }.to_string(), "RADAR_FOUND");
    }
}
