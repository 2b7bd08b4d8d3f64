//! Agile state machine
//!
//! Decides which radio owns the chip's single agile detector, which channel
//! it checks, and what happens when the check completes or radar shows up.
//!
//! ```text
//!            START (channel found)
//!   ┌──────┐ ─────────────────────▶ ┌─────────┐  DONE (rolling CAC)  ┌──────────┐
//!   │ INIT │                        │ RUNNING │ ───────────────────▶ │ COMPLETE │
//!   └──────┘ ◀───────────────────── └─────────┘                      └──────────┘
//!      ▲      STOP / RADAR_FOUND /                                        │
//!      │      DONE (preCAC)                                               │
//!      └──────────────────────────────────────────────────────────────────┘
//!                              STOP / RADAR_FOUND
//! ```
//!
//! The machine performs no I/O. Every transition returns the side effects the
//! caller must carry out, in order, as [`AgileAction`]s. Events the machine
//! posts to itself (the START after radar or a preCAC completion) are handled
//! before [`AgileSm::post_event`] returns.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::agile::config::{AgileConfig, AgileMode};
use crate::agile::state::{AgileEvent, AgileState};
use crate::channel::{
    cac_timeout, subchannels_for_center, ChannelWidth, MHz, OperatingChannel,
    RESTRICTED_165_LEFT_80_CENTER_FREQ, RESTRICTED_165_RIGHT_80_CENTER_FREQ,
};
use crate::error::PrecacError;
use crate::radio::Radio;

/// Rolling CAC host timer and firmware minimum.
pub const MIN_RCAC_DURATION: Duration = Duration::from_secs(62);
/// Rolling CAC firmware maximum; the detector stays resident.
pub const MAX_RCAC_DURATION: Duration = Duration::from_millis(u32::MAX as u64);

// =============================================================================
// Firmware interface types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OcacMode {
    QuickOcac,
    QuickRcac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OcacStatus {
    Success,
    Reset,
    Cancel,
}

/// "Configure agile detector" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorRequest {
    pub center_freq_primary: MHz,
    /// Restricted 165 only
    pub center_freq_secondary: Option<MHz>,
    pub width: ChannelWidth,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub mode: OcacMode,
}

/// Completion notification from the agile detector firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcacCompletion {
    pub status: OcacStatus,
    pub center_freq_primary: MHz,
    #[serde(default)]
    pub center_freq_secondary: Option<MHz>,
    pub width: ChannelWidth,
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgileAction {
    ConfigureDetector { radio: usize, request: DetectorRequest },
    AbortDetector { radio: usize },
    StartTimer { radio: usize, generation: u64, timeout: Duration },
    /// Cancel the host timer of `generation`; must complete before anything else runs
    CancelTimer { generation: u64 },
    /// Move the radio to `channel` without a new CAC
    SwitchHomeChannel { radio: usize, channel: OperatingChannel },
}

// =============================================================================
// Agile channel
// =============================================================================

/// Channel currently owned by the agile detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgileChannel {
    /// Node frequency in the forest; 5730 for restricted 165
    pub center_freq: MHz,
    pub width: ChannelWidth,
}

impl AgileChannel {
    pub fn new(center_freq: MHz, width: ChannelWidth) -> Self {
        AgileChannel { center_freq, width }
    }

    pub fn primary_center(&self) -> MHz {
        match self.width {
            ChannelWidth::Restricted165 => RESTRICTED_165_LEFT_80_CENTER_FREQ,
            _ => self.center_freq,
        }
    }

    pub fn secondary_center(&self) -> Option<MHz> {
        match self.width {
            ChannelWidth::Restricted165 => Some(RESTRICTED_165_RIGHT_80_CENTER_FREQ),
            _ => None,
        }
    }

    pub fn subchannels(&self) -> Vec<MHz> {
        subchannels_for_center(self.center_freq, None, self.width)
    }

    pub fn cac_timeout(&self) -> Duration {
        cac_timeout(self.center_freq, None, self.width)
    }

    fn mark_done(&self, radio: &Radio) {
        let mut forest = radio.forest();
        match self.width {
            ChannelWidth::Restricted165 => forest.mark_cac_done(
                self.primary_center(),
                self.secondary_center(),
                ChannelWidth::Mhz80P80,
            ),
            width => forest.mark_cac_done(self.center_freq, None, width),
        }
    }

    fn unmark_done(&self, radio: &Radio) {
        let mut forest = radio.forest();
        match self.width {
            ChannelWidth::Restricted165 => forest.unmark_cac_done(
                self.primary_center(),
                self.secondary_center(),
                ChannelWidth::Mhz80P80,
            ),
            width => forest.unmark_cac_done(self.center_freq, None, width),
        }
    }
}

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug)]
struct RadioSlot {
    active: bool,
    radio: Radio,
}

#[derive(Debug)]
pub struct AgileSm {
    state: AgileState,
    owner: Option<usize>,
    radios: Vec<RadioSlot>,
    config: AgileConfig,
    agile_channel: Option<AgileChannel>,
    /// Bumped on every entry into RUNNING; DONE events carry the value they
    /// were armed with
    generation: u64,
    /// Last radio that held the detector, for round robin
    last_owner: Option<usize>,
    pending: VecDeque<AgileEvent>,
}

impl AgileSm {
    pub fn new(radios: Vec<Radio>, config: AgileConfig) -> Self {
        AgileSm {
            state: AgileState::Init,
            owner: None,
            radios: radios
                .into_iter()
                .map(|radio| RadioSlot {
                    active: false,
                    radio,
                })
                .collect(),
            config,
            agile_channel: None,
            generation: 0,
            last_owner: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> AgileState {
        self.state
    }

    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn agile_channel(&self) -> Option<AgileChannel> {
        self.agile_channel
    }

    pub fn config(&self) -> &AgileConfig {
        &self.config
    }

    pub fn radio_count(&self) -> usize {
        self.radios.len()
    }

    pub fn radio(&self, index: usize) -> Result<&Radio, PrecacError> {
        self.radios
            .get(index)
            .map(|slot| &slot.radio)
            .ok_or(PrecacError::UnknownRadio(index))
    }

    pub(crate) fn radio_mut(&mut self, index: usize) -> Result<&mut Radio, PrecacError> {
        self.radios
            .get_mut(index)
            .map(|slot| &mut slot.radio)
            .ok_or(PrecacError::UnknownRadio(index))
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.radios.get(index).is_some_and(|slot| slot.active)
    }

    fn is_owner(&self, radio: usize) -> bool {
        self.owner == Some(radio)
    }

    /// Replace the configuration. Switching mode releases the detector.
    pub fn set_config(&mut self, config: AgileConfig) -> Vec<AgileAction> {
        let mode_changed = config.mode != self.config.mode;
        self.config = config;
        match self.owner {
            Some(owner) if mode_changed => self.post_event(AgileEvent::Stop { radio: owner }),
            _ => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    /// Handle an event and every event it re-posts.
    pub fn post_event(&mut self, event: AgileEvent) -> Vec<AgileAction> {
        let mut actions = Vec::new();
        self.pending.push_back(event);
        self.drain(&mut actions);
        actions
    }

    fn drain(&mut self, actions: &mut Vec<AgileAction>) {
        while let Some(event) = self.pending.pop_front() {
            self.dispatch(event, actions);
        }
    }

    fn dispatch(&mut self, event: AgileEvent, actions: &mut Vec<AgileAction>) {
        let radio = event.radio();
        if radio >= self.radios.len() {
            warn!("Agile event {} dropped: {}", event, PrecacError::UnknownRadio(radio));
            return;
        }

        match (self.state, event) {
            (AgileState::Init, AgileEvent::Start { radio }) => self.start_selection(radio, actions),
            (AgileState::Init, AgileEvent::Stop { radio }) => {
                self.radios[radio].active = false;
                debug!("no-op: STOP from radio {} in INIT", radio);
            }
            (AgileState::Init, AgileEvent::Done { generation, .. }) => {
                self.discard_stale(generation);
            }
            (AgileState::Init, AgileEvent::RadarFound { radio }) => {
                debug!("no-op: RADAR_FOUND from radio {} in INIT", radio);
            }

            (_, AgileEvent::Start { radio }) => {
                self.radios[radio].active = true;
                debug!(
                    "no-op: START from radio {} while radio {:?} owns the detector",
                    radio, self.owner
                );
            }
            (_, event) if !self.is_owner(radio) => {
                if let AgileEvent::Stop { radio } = event {
                    self.radios[radio].active = false;
                }
                debug!(
                    "no-op: {} from radio {} which does not own the detector (owner {:?})",
                    event, radio, self.owner
                );
            }

            (AgileState::Running, AgileEvent::Stop { radio }) => {
                self.radios[radio].active = false;
                self.release(radio, actions);
                self.transition(AgileState::Init, &event, actions);
            }
            (AgileState::Running, AgileEvent::RadarFound { radio }) => {
                self.release(radio, actions);
                self.transition(AgileState::Init, &event, actions);
                self.pending.push_back(AgileEvent::Start { radio });
            }
            (AgileState::Running, AgileEvent::Done { radio, generation }) => {
                if generation != self.generation {
                    self.discard_stale(generation);
                    return;
                }
                match self.config.mode {
                    AgileMode::RollingCac => {
                        self.transition(AgileState::Complete, &event, actions)
                    }
                    AgileMode::Precac | AgileMode::Disabled => {
                        self.precac_done(radio, &event, actions)
                    }
                }
            }

            (AgileState::Complete, AgileEvent::Stop { radio }) => {
                self.radios[radio].active = false;
                actions.push(AgileAction::AbortDetector { radio });
                self.transition(AgileState::Init, &event, actions);
            }
            (AgileState::Complete, AgileEvent::RadarFound { radio }) => {
                if let Some(chan) = self.agile_channel {
                    chan.unmark_done(&self.radios[radio].radio);
                }
                actions.push(AgileAction::AbortDetector { radio });
                self.transition(AgileState::Init, &event, actions);
                self.pending.push_back(AgileEvent::Start { radio });
            }
            (AgileState::Complete, AgileEvent::Done { generation, .. }) => {
                self.discard_stale(generation);
            }
        }
    }

    fn discard_stale(&self, generation: u64) {
        debug!(
            "Discarding DONE in {}: {}",
            self.state,
            PrecacError::StaleOwnership {
                event: generation,
                current: self.generation,
            }
        );
    }

    /// Cancel the CAC timer, then abort the detector.
    fn release(&mut self, radio: usize, actions: &mut Vec<AgileAction>) {
        actions.push(AgileAction::CancelTimer {
            generation: self.generation,
        });
        actions.push(AgileAction::AbortDetector { radio });
    }

    fn transition(
        &mut self,
        next: AgileState,
        cause: &dyn std::fmt::Display,
        actions: &mut Vec<AgileAction>,
    ) {
        debug!("[{}] -> [{}], event={}", self.state, next, cause);
        self.state = next;
        match next {
            AgileState::Init => {
                self.owner = None;
                self.agile_channel = None;
            }
            AgileState::Running => self.enter_running(actions),
            AgileState::Complete => self.enter_complete(actions),
        }
    }

    // -------------------------------------------------------------------------
    // INIT
    // -------------------------------------------------------------------------

    fn start_selection(&mut self, radio: usize, actions: &mut Vec<AgileAction>) {
        self.radios[radio].active = true;
        if let Some(owner) = self.owner {
            debug!("START from radio {} ignored, radio {} owns the detector", radio, owner);
            return;
        }

        let picked = match self.config.mode {
            AgileMode::Disabled => {
                debug!("Agile CAC disabled, START from radio {} ignored", radio);
                return;
            }
            AgileMode::RollingCac => self.rolling_cac_channel(radio),
            AgileMode::Precac => self.next_precac_channel(),
        };

        match picked {
            Some((owner, chan)) => {
                self.owner = Some(owner);
                self.last_owner = Some(owner);
                self.agile_channel = Some(chan);
                self.generation += 1;
                self.transition(AgileState::Running, &AgileEvent::Start { radio }, actions);
            }
            None => {
                self.agile_channel = None;
                debug!("No channel found for agile CAC, staying in INIT");
            }
        }
    }

    /// The operator's Rolling CAC channel when it can be checked, else the
    /// forest's choice.
    fn rolling_cac_channel(&self, radio: usize) -> Option<(usize, AgileChannel)> {
        let width = self.config.agile_width;
        self.radios[radio]
            .radio
            .find_agile_channel(width, self.config.rcac_freq)
            .map(|freq| (radio, AgileChannel::new(freq, width)))
    }

    /// Round robin over active radios, starting after the last owner.
    fn next_precac_channel(&self) -> Option<(usize, AgileChannel)> {
        let width = self.config.agile_width;
        let count = self.radios.len();
        let first = self.last_owner.map_or(0, |last| (last + 1) % count);
        (0..count)
            .map(|k| (first + k) % count)
            .filter(|&i| self.radios[i].active)
            .find_map(|i| {
                self.radios[i]
                    .radio
                    .find_agile_channel(width, None)
                    .map(|freq| (i, AgileChannel::new(freq, width)))
            })
    }

    // -------------------------------------------------------------------------
    // RUNNING / COMPLETE
    // -------------------------------------------------------------------------

    fn enter_running(&mut self, actions: &mut Vec<AgileAction>) {
        let (Some(radio), Some(chan)) = (self.owner, self.agile_channel) else {
            error!("Entered RUNNING without an owned agile channel");
            return;
        };

        let (min_timeout, max_timeout, mode, host_timeout) = match self.config.mode {
            AgileMode::RollingCac => (
                MIN_RCAC_DURATION,
                MAX_RCAC_DURATION,
                OcacMode::QuickRcac,
                MIN_RCAC_DURATION,
            ),
            AgileMode::Precac | AgileMode::Disabled => {
                let timeout = self
                    .config
                    .precac_timeout_override()
                    .unwrap_or_else(|| chan.cac_timeout());
                (
                    timeout,
                    timeout,
                    OcacMode::QuickOcac,
                    timeout + self.config.host_timer_pad(),
                )
            }
        };

        info!(
            "Agile CAC started on {} MHz ({}) for radio {}, timeout {:?}",
            chan.center_freq,
            chan.width,
            self.radios[radio].radio.name(),
            min_timeout
        );
        actions.push(AgileAction::ConfigureDetector {
            radio,
            request: DetectorRequest {
                center_freq_primary: chan.primary_center(),
                center_freq_secondary: chan.secondary_center(),
                width: chan.width,
                min_timeout,
                max_timeout,
                mode,
            },
        });
        actions.push(AgileAction::StartTimer {
            radio,
            generation: self.generation,
            timeout: host_timeout,
        });
    }

    fn enter_complete(&mut self, actions: &mut Vec<AgileAction>) {
        let (Some(radio), Some(chan)) = (self.owner, self.agile_channel) else {
            error!("Entered COMPLETE without an owned agile channel");
            return;
        };
        chan.mark_done(&self.radios[radio].radio);
        info!("Rolling CAC completed on {} MHz", chan.center_freq);
        self.check_home_channel_change(radio, actions);
    }

    fn precac_done(&mut self, radio: usize, event: &AgileEvent, actions: &mut Vec<AgileAction>) {
        if let Some(chan) = self.agile_channel {
            chan.mark_done(&self.radios[radio].radio);
            info!("PreCAC completed on {} MHz", chan.center_freq);
        }
        self.transition(AgileState::Init, event, actions);
        self.check_home_channel_change(radio, actions);
        self.pending.push_back(AgileEvent::Start { radio });
    }

    /// Move the radio onto its preferred channel once that is CAC-done.
    fn check_home_channel_change(&mut self, radio: usize, actions: &mut Vec<AgileAction>) {
        let slot = &mut self.radios[radio].radio;
        let Some(desired) = slot.desired() else {
            return;
        };
        let done = slot.forest().is_precac_done(&desired);
        if done {
            info!(
                "Preferred channel {} is CAC done, switching radio {}",
                desired.ieee(),
                slot.name()
            );
            slot.set_operating(desired);
            slot.set_desired(None);
            actions.push(AgileAction::SwitchHomeChannel {
                radio,
                channel: desired,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Firmware completion
    // -------------------------------------------------------------------------

    /// Firmware reported the end of an agile CAC. Only honoured for the
    /// channel currently owned.
    pub fn handle_ocac_complete(
        &mut self,
        radio: usize,
        completion: &OcacCompletion,
    ) -> Vec<AgileAction> {
        let mut actions = Vec::new();
        let current = self.state == AgileState::Running
            && self.is_owner(radio)
            && self.agile_channel.is_some_and(|chan| {
                chan.primary_center() == completion.center_freq_primary
                    && chan.width == completion.width
            });
        if !current {
            debug!(
                "Discarding OCAC {:?} for {} MHz: not the current agile channel",
                completion.status, completion.center_freq_primary
            );
            return actions;
        }

        actions.push(AgileAction::CancelTimer {
            generation: self.generation,
        });
        match completion.status {
            OcacStatus::Success => {
                self.pending.push_back(AgileEvent::Done {
                    radio,
                    generation: self.generation,
                });
            }
            OcacStatus::Reset => {
                self.transition(AgileState::Init, &"OCAC_RESET", &mut actions);
                self.pending.push_back(AgileEvent::Start { radio });
            }
            OcacStatus::Cancel => {
                self.transition(AgileState::Init, &"OCAC_CANCEL", &mut actions);
            }
        }
        self.drain(&mut actions);
        actions
    }
}
