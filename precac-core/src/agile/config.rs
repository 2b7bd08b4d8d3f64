//! Agile CAC configuration knobs
//!
//! Owned by whoever configures the chip; the state machine only reads them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::channel::{ChannelWidth, MHz};
use crate::radar::AGILE_DETECTOR_ID;

/// How the agile detector is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgileMode {
    Disabled,
    /// Legacy preCAC: check channels one by one, round robin across radios
    Precac,
    /// Rolling CAC: keep the detector resident on one channel
    RollingCac,
}

impl Default for AgileMode {
    fn default() -> Self {
        AgileMode::Precac
    }
}

impl std::fmt::Display for AgileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgileMode::Disabled => write!(f, "disabled"),
            AgileMode::Precac => write!(f, "precac"),
            AgileMode::RollingCac => write!(f, "rollingCac"),
        }
    }
}

fn default_agile_width() -> ChannelWidth {
    ChannelWidth::Mhz80
}

fn default_true() -> bool {
    true
}

fn default_agile_detector_id() -> u8 {
    AGILE_DETECTOR_ID
}

fn default_nol_timeout_secs() -> u64 {
    1800
}

fn default_host_timer_pad_secs() -> u64 {
    2
}

/// Agile CAC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgileConfig {
    #[serde(default)]
    pub mode: AgileMode,
    /// Width requested from the forest
    #[serde(default = "default_agile_width")]
    pub agile_width: ChannelWidth,
    /// preCAC duration in seconds; the regulatory CAC time when absent
    #[serde(default)]
    pub precac_timeout_override: Option<u64>,
    /// Channel the operator wants Rolling CAC to run on
    #[serde(default)]
    pub rcac_freq: Option<MHz>,
    /// Block only the sub-channels hit by radar instead of the whole detector bandwidth
    #[serde(default = "default_true")]
    pub subchannel_marking: bool,
    #[serde(default = "default_agile_detector_id")]
    pub agile_detector_id: u8,
    #[serde(default = "default_nol_timeout_secs")]
    pub nol_timeout_secs: u64,
    /// Added to the host preCAC timer so the firmware result normally wins
    #[serde(default = "default_host_timer_pad_secs")]
    pub host_timer_pad_secs: u64,
}

impl Default for AgileConfig {
    fn default() -> Self {
        AgileConfig {
            mode: AgileMode::default(),
            agile_width: default_agile_width(),
            precac_timeout_override: None,
            rcac_freq: None,
            subchannel_marking: true,
            agile_detector_id: AGILE_DETECTOR_ID,
            nol_timeout_secs: default_nol_timeout_secs(),
            host_timer_pad_secs: default_host_timer_pad_secs(),
        }
    }
}

impl AgileConfig {
    pub fn nol_timeout(&self) -> Duration {
        Duration::from_secs(self.nol_timeout_secs)
    }

    pub fn host_timer_pad(&self) -> Duration {
        Duration::from_secs(self.host_timer_pad_secs)
    }

    pub fn precac_timeout_override(&self) -> Option<Duration> {
        self.precac_timeout_override.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: AgileConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, AgileConfig::default());
        assert_eq!(cfg.agile_detector_id, 2);
        assert_eq!(cfg.nol_timeout(), Duration::from_secs(1800));
        assert!(cfg.subchannel_marking);
    }

    #[test]
    fn test_parse_camel_case() {
        let cfg: AgileConfig = serde_json::from_value(json!({
            "mode": "rollingCac",
            "agileWidth": "160",
            "precacTimeoutOverride": 5,
            "rcacFreq": 5610,
            "subchannelMarking": false
        }))
        .unwrap();
        assert_eq!(cfg.mode, AgileMode::RollingCac);
        assert_eq!(cfg.agile_width, ChannelWidth::Mhz160);
        assert_eq!(cfg.precac_timeout_override(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.rcac_freq, Some(5610));
        assert!(!cfg.subchannel_marking);
        assert_eq!(cfg.mode.to_string(), "rollingCac");
    }
}
