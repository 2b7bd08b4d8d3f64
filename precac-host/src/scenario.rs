//! Scenario replay: a timed list of external triggers.
//!
//! ```json
//! {
//!   "endMs": 200000,
//!   "steps": [
//!     { "atMs": 0, "event": { "type": "vdevUp", "radio": 0 } },
//!     { "atMs": 5000, "event": { "type": "radar", "radio": 0,
//!         "info": { "detectorId": 2, "freqOffset": 10 } } },
//!     { "atMs": 9000, "event": { "type": "dump", "radio": 0 } }
//!   ]
//! }
//! ```
//!
//! Step times are simulated milliseconds and go through the same time scale
//! as the host timers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use precac_core::{
    AgileEvent, AgileMode, CatalogChannel, Chip, MHz, OcacCompletion, OperatingChannel,
    RadarFoundInfo,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::config::fill_ieee;
use crate::error::HostError;
use crate::{HostEvent, HostHandle, TimeScale};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScenarioEvent {
    /// Virtual interface came up on a DFS radio and wants agile CAC
    #[serde(rename_all = "camelCase")]
    VdevUp { radio: usize },
    #[serde(rename_all = "camelCase")]
    Stop { radio: usize },
    #[serde(rename_all = "camelCase")]
    Radar { radio: usize, info: RadarFoundInfo },
    #[serde(rename_all = "camelCase")]
    SetMode {
        mode: AgileMode,
        #[serde(default)]
        rcac_freq: Option<MHz>,
    },
    #[serde(rename_all = "camelCase")]
    PreferredChannel {
        radio: usize,
        channel: OperatingChannel,
    },
    #[serde(rename_all = "camelCase")]
    OcacComplete {
        radio: usize,
        completion: OcacCompletion,
    },
    /// Regulatory domain change; keeps the catalog when `channels` is absent
    #[serde(rename_all = "camelCase")]
    RegChange {
        radio: usize,
        #[serde(default)]
        channels: Option<Vec<CatalogChannel>>,
    },
    #[serde(rename_all = "camelCase")]
    Transfer {
        from: usize,
        to: usize,
        low: MHz,
        high: MHz,
    },
    #[serde(rename_all = "camelCase")]
    Dump { radio: usize },
}

impl ScenarioEvent {
    fn radios(&self) -> Vec<usize> {
        match self {
            ScenarioEvent::VdevUp { radio }
            | ScenarioEvent::Stop { radio }
            | ScenarioEvent::Radar { radio, .. }
            | ScenarioEvent::PreferredChannel { radio, .. }
            | ScenarioEvent::OcacComplete { radio, .. }
            | ScenarioEvent::RegChange { radio, .. }
            | ScenarioEvent::Dump { radio } => vec![*radio],
            ScenarioEvent::Transfer { from, to, .. } => vec![*from, *to],
            ScenarioEvent::SetMode { .. } => Vec::new(),
        }
    }

    pub fn to_host_event(&self, chip: &Chip) -> HostEvent {
        match self.clone() {
            ScenarioEvent::VdevUp { radio } => HostEvent::Agile(AgileEvent::Start { radio }),
            ScenarioEvent::Stop { radio } => HostEvent::Agile(AgileEvent::Stop { radio }),
            ScenarioEvent::Radar { radio, info } => HostEvent::Radar { radio, info },
            ScenarioEvent::SetMode { mode, rcac_freq } => {
                let mut config = chip.config();
                config.mode = mode;
                if rcac_freq.is_some() {
                    config.rcac_freq = rcac_freq;
                }
                HostEvent::SetConfig(config)
            }
            ScenarioEvent::PreferredChannel { radio, channel } => {
                HostEvent::PreferredChannel { radio, channel }
            }
            ScenarioEvent::OcacComplete { radio, completion } => {
                HostEvent::OcacComplete { radio, completion }
            }
            ScenarioEvent::RegChange { radio, channels } => {
                HostEvent::RegulatoryChange { radio, channels }
            }
            ScenarioEvent::Transfer {
                from,
                to,
                low,
                high,
            } => HostEvent::Transfer {
                from,
                to,
                low,
                high,
            },
            ScenarioEvent::Dump { radio } => HostEvent::Dump { radio },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub at_ms: u64,
    pub event: ScenarioEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Request shutdown at this time; run until interrupted when absent
    #[serde(default)]
    pub end_ms: Option<u64>,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, HostError> {
        debug!("Loading scenario from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Steps are put in time order; equal times keep file order.
    pub fn from_json(text: &str) -> Result<Self, HostError> {
        let mut scenario: Scenario = serde_json::from_str(text)?;
        scenario.steps.sort_by_key(|s| s.at_ms);
        for step in &mut scenario.steps {
            if let ScenarioEvent::RegChange {
                channels: Some(channels),
                ..
            } = &mut step.event
            {
                fill_ieee(channels);
            }
        }
        Ok(scenario)
    }

    pub fn validate(&self, radio_count: usize) -> Result<(), HostError> {
        for step in &self.steps {
            if let Some(bad) = step.event.radios().into_iter().find(|r| *r >= radio_count) {
                return Err(HostError::UnknownRadio(bad, radio_count));
            }
        }
        Ok(())
    }

    /// Send every step to the executor at its scheduled time.
    pub async fn play(
        &self,
        chip: &Chip,
        handle: &HostHandle,
        scale: TimeScale,
    ) -> Result<(), HostError> {
        let start = Instant::now();
        for step in &self.steps {
            let due = scale.scale(Duration::from_millis(step.at_ms));
            tokio::time::sleep(due.saturating_sub(start.elapsed())).await;
            debug!("Scenario @{} ms: {:?}", step.at_ms, step.event);
            handle.send(step.event.to_host_event(chip))?;
        }
        if let Some(end) = self.end_ms {
            let due = scale.scale(Duration::from_millis(end));
            tokio::time::sleep(due.saturating_sub(start.elapsed())).await;
        }
        Ok(())
    }

    /// Scenario subsystem. Requests shutdown when an end time is set.
    pub async fn run(
        self,
        chip: std::sync::Arc<Chip>,
        handle: HostHandle,
        scale: TimeScale,
        subsys: SubsystemHandle,
    ) -> Result<(), HostError> {
        info!("Replaying scenario of {} step(s)", self.steps.len());
        tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                info!("Scenario: shutdown requested");
                return Ok(());
            }
            r = self.play(&chip, &handle, scale) => r?,
        }
        if self.end_ms.is_some() {
            info!("Scenario finished");
            subsys.request_shutdown();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use precac_core::{AgileConfig, AgileState, ChannelWidth, Radio};
    use serde_json::json;
    use std::sync::Arc;

    fn chip() -> Arc<Chip> {
        let catalog = vec![
            CatalogChannel::new(5500, ChannelWidth::Mhz20, true),
            CatalogChannel::new(5520, ChannelWidth::Mhz20, true),
            CatalogChannel::new(5510, ChannelWidth::Mhz40, true),
        ];
        let operating = OperatingChannel::new(5180, ChannelWidth::Mhz20, 5180);
        Arc::new(Chip::new(
            vec![Radio::new("wifi0", catalog, operating)],
            AgileConfig {
                agile_width: ChannelWidth::Mhz40,
                ..AgileConfig::default()
            },
        ))
    }

    #[test]
    fn test_parse_and_sort() {
        let text = json!({
            "steps": [
                { "atMs": 900, "event": { "type": "stop", "radio": 0 } },
                { "atMs": 0, "event": { "type": "vdevUp", "radio": 0 } },
                { "atMs": 500, "event": { "type": "radar", "radio": 0,
                    "info": { "detectorId": 2, "freqOffset": -10, "isChirp": true } } },
                { "atMs": 600, "event": { "type": "setMode", "mode": "rollingCac", "rcacFreq": 5510 } },
                { "atMs": 700, "event": { "type": "regChange", "radio": 0 } }
            ]
        })
        .to_string();
        let scenario = Scenario::from_json(&text).unwrap();
        let times: Vec<u64> = scenario.steps.iter().map(|s| s.at_ms).collect();
        assert_eq!(times, vec![0, 500, 600, 700, 900]);
        assert_eq!(scenario.end_ms, None);
        assert_eq!(scenario.steps[0].event, ScenarioEvent::VdevUp { radio: 0 });
        match &scenario.steps[1].event {
            ScenarioEvent::Radar { info, .. } => {
                assert_eq!(info.freq_offset, -10);
                assert!(info.is_chirp);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_radio_index() {
        let text = json!({
            "steps": [
                { "atMs": 0, "event": { "type": "transfer", "from": 0, "to": 2, "low": 5490, "high": 5730 } }
            ]
        })
        .to_string();
        let scenario = Scenario::from_json(&text).unwrap();
        assert!(scenario.validate(3).is_ok());
        assert!(matches!(
            scenario.validate(2),
            Err(HostError::UnknownRadio(2, 2))
        ));
    }

    #[test]
    fn test_set_mode_keeps_other_settings() {
        let chip = chip();
        let event = ScenarioEvent::SetMode {
            mode: AgileMode::RollingCac,
            rcac_freq: None,
        };
        match event.to_host_event(&chip) {
            HostEvent::SetConfig(config) => {
                assert_eq!(config.mode, AgileMode::RollingCac);
                assert_eq!(config.agile_width, ChannelWidth::Mhz40);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_feeds_executor() {
        let chip = chip();
        let mut exec = Executor::new(chip.clone(), TimeScale::default());
        let handle = exec.handle();
        let scenario = Scenario::from_json(
            &json!({
                "endMs": 2000,
                "steps": [
                    { "atMs": 0, "event": { "type": "vdevUp", "radio": 0 } },
                    { "atMs": 1000, "event": { "type": "stop", "radio": 0 } }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let start = Instant::now();
        scenario.play(&chip, &handle, TimeScale::default()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        let event = exec.next_event().await.unwrap();
        exec.dispatch(event).unwrap();
        assert_eq!(chip.state(), AgileState::Running);
        let event = exec.next_event().await.unwrap();
        exec.dispatch(event).unwrap();
        assert_eq!(chip.state(), AgileState::Init);
    }
}
