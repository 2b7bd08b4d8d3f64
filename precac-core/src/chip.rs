//! Chip context
//!
//! Entry point for everything outside the core. A [`Chip`] owns the agile
//! state machine behind one lock; each radio's forest sits behind a second
//! lock that is only reachable through the locked state machine, so the
//! acquisition order is always state machine first, forest second.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Chip                                         │
//! │  Mutex<AgileSm>                              │
//! │   ├─ state / owner / agile channel / timer   │
//! │   └─ radios[i]                               │
//! │       ├─ operating / desired / intermediate  │
//! │       └─ Mutex<PrecacForest>                 │
//! └──────────────────────────────────────────────┘
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::agile::{AgileAction, AgileChannel, AgileConfig, AgileEvent, AgileMode, AgileSm, AgileState, OcacCompletion};
use crate::channel::{CatalogChannel, MHz, OperatingChannel};
use crate::error::PrecacError;
use crate::forest::{EntrySnapshot, PrecacChanState, PrecacForest, PrecacStatus};
use crate::radar::{self, DetectorChannel, RadarFoundInfo};
use crate::radio::Radio;

/// Result of a radar report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadarOutcome {
    /// Radio whose forest was marked
    pub radio: Option<usize>,
    pub radar_freq: Option<MHz>,
    /// Sub-channels newly put on the NOL; each needs a hold-down timer
    pub nol_channels: Vec<MHz>,
    pub actions: Vec<AgileAction>,
}

/// Result of moving forest entries between radios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    pub moved: usize,
    /// Sub-channels of the moved entries still on the NOL; their hold-down
    /// now belongs to the receiving radio
    pub nol_channels: Vec<MHz>,
}

#[derive(Debug)]
pub struct Chip {
    sm: Mutex<AgileSm>,
}

impl Chip {
    pub fn new(radios: Vec<Radio>, config: AgileConfig) -> Self {
        Chip {
            sm: Mutex::new(AgileSm::new(radios, config)),
        }
    }

    fn sm(&self) -> MutexGuard<'_, AgileSm> {
        self.sm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_forest<R>(
        &self,
        radio: usize,
        f: impl FnOnce(&mut PrecacForest) -> R,
    ) -> Result<R, PrecacError> {
        let sm = self.sm();
        let mut forest = sm.radio(radio)?.forest();
        Ok(f(&mut forest))
    }

    pub fn post_event(&self, event: AgileEvent) -> Vec<AgileAction> {
        self.sm().post_event(event)
    }

    pub fn state(&self) -> AgileState {
        self.sm().state()
    }

    pub fn owner(&self) -> Option<usize> {
        self.sm().owner()
    }

    pub fn generation(&self) -> u64 {
        self.sm().generation()
    }

    pub fn agile_channel(&self) -> Option<AgileChannel> {
        self.sm().agile_channel()
    }

    pub fn config(&self) -> AgileConfig {
        self.sm().config().clone()
    }

    pub fn set_config(&self, config: AgileConfig) -> Vec<AgileAction> {
        self.sm().set_config(config)
    }

    pub fn radio_count(&self) -> usize {
        self.sm().radio_count()
    }

    pub fn radio_name(&self, radio: usize) -> Result<String, PrecacError> {
        let sm = self.sm();
        let name = sm.radio(radio)?.name().to_string();
        Ok(name)
    }

    pub fn operating_channel(&self, radio: usize) -> Result<OperatingChannel, PrecacError> {
        let sm = self.sm();
        let chan = *sm.radio(radio)?.operating();
        Ok(chan)
    }

    // -------------------------------------------------------------------------
    // Radar
    // -------------------------------------------------------------------------

    /// Decode a radar report from `radio`, put the hit sub-channels on the
    /// NOL and, for the agile detector, tell the state machine.
    pub fn process_radar_found(
        &self,
        radio: usize,
        info: &RadarFoundInfo,
    ) -> Result<RadarOutcome, PrecacError> {
        let mut sm = self.sm();
        let marking = sm.config().subchannel_marking;

        if info.detector_id != sm.config().agile_detector_id {
            let operating = *sm.radio(radio)?.operating();
            let decoded = radar::decode(info, DetectorChannel::Primary(&operating), marking);
            let marked = sm.radio(radio)?.forest().mark_nol(&decoded.nol_channels);
            info!(
                "Radar found on radio {} operating channel at {} MHz, NOL {:?}",
                radio, decoded.radar_freq, marked
            );
            return Ok(RadarOutcome {
                radio: Some(radio),
                radar_freq: Some(decoded.radar_freq),
                nol_channels: marked,
                actions: Vec::new(),
            });
        }

        let (owner, chan) = match (sm.owner(), sm.agile_channel()) {
            (Some(owner), Some(chan)) if owner == radio => (owner, chan),
            _ => {
                debug!(
                    "Agile radar from radio {} discarded: radio does not own the agile detector",
                    radio
                );
                return Ok(RadarOutcome::default());
            }
        };

        let detector = DetectorChannel::Agile {
            center: chan.center_freq,
            width: chan.width,
        };
        let decoded = radar::decode(info, detector, marking);
        let marked = sm.radio(owner)?.forest().mark_nol(&decoded.nol_channels);
        info!(
            "Radar found on agile channel {} MHz at {} MHz, NOL {:?}",
            chan.center_freq, decoded.radar_freq, marked
        );
        let actions = sm.post_event(AgileEvent::RadarFound { radio: owner });

        Ok(RadarOutcome {
            radio: Some(owner),
            radar_freq: Some(decoded.radar_freq),
            nol_channels: marked,
            actions,
        })
    }

    /// NOL hold-down for `freq` elapsed. An idle preCAC machine restarts
    /// selection so the channel becomes eligible again.
    pub fn nol_expired(&self, radio: usize, freq: MHz) -> Result<Vec<AgileAction>, PrecacError> {
        let mut sm = self.sm();
        let cleared = sm.radio(radio)?.forest().unmark_nol(freq);
        if cleared {
            debug!("NOL expired for {} MHz on radio {}", freq, radio);
        }
        if sm.state().is_idle() && sm.config().mode == AgileMode::Precac {
            return Ok(sm.post_event(AgileEvent::Start { radio }));
        }
        Ok(Vec::new())
    }

    pub fn handle_ocac_complete(
        &self,
        radio: usize,
        completion: &OcacCompletion,
    ) -> Vec<AgileAction> {
        self.sm().handle_ocac_complete(radio, completion)
    }

    // -------------------------------------------------------------------------
    // Preferred channel
    // -------------------------------------------------------------------------

    /// Decide what the radio operates on when asked to move to `chan`.
    ///
    /// A DFS channel that is not yet CAC-done becomes the desired channel and
    /// its forest entry moves to the front; the radio uses its intermediate
    /// channel meanwhile, if one is configured.
    pub fn decide_preferred_channel(
        &self,
        radio: usize,
        chan: OperatingChannel,
    ) -> Result<OperatingChannel, PrecacError> {
        let mut sm = self.sm();
        let r = sm.radio_mut(radio)?;

        let dfs = chan.is_dfs || chan.secondary_is_dfs;
        let done = r.forest().is_precac_done(&chan);
        if !dfs || done {
            r.set_desired(None);
            r.set_operating(chan);
            return Ok(chan);
        }

        let target = if chan.is_dfs {
            chan.segment1()
        } else {
            chan.segment2().unwrap_or_else(|| chan.segment1())
        };
        r.forest().promote_to_front(target);
        r.set_desired(Some(chan));

        let now = r.intermediate().unwrap_or(chan);
        info!(
            "Radio {} prefers channel {}, operating on {} until preCAC is done",
            r.name(),
            chan.ieee(),
            now.ieee()
        );
        r.set_operating(now);
        Ok(now)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn chan_state(&self, radio: usize, freq: MHz) -> Result<PrecacChanState, PrecacError> {
        let sm = self.sm();
        let checking = sm.state() == AgileState::Running
            && sm.owner() == Some(radio)
            && sm.agile_channel().is_some_and(|c| c.center_freq == freq);
        if checking {
            return Ok(PrecacChanState::Now);
        }
        let state = sm.radio(radio)?.forest().chan_state(freq);
        Ok(state)
    }

    pub fn is_precac_done(&self, radio: usize, chan: &OperatingChannel) -> Result<bool, PrecacError> {
        self.with_forest(radio, |forest| forest.is_precac_done(chan))
    }

    pub fn precac_status_for_channel(
        &self,
        radio: usize,
        chan: &OperatingChannel,
    ) -> Result<PrecacStatus, PrecacError> {
        self.with_forest(radio, |forest| forest.precac_status_for_channel(chan))
    }

    pub fn dump(&self, radio: usize) -> Result<Vec<String>, PrecacError> {
        self.with_forest(radio, |forest| forest.dump_lines())
    }

    pub fn log_dump(&self, radio: usize) -> Result<(), PrecacError> {
        self.with_forest(radio, |forest| forest.log_dump())
    }

    pub fn snapshot(&self, radio: usize) -> Result<Vec<EntrySnapshot>, PrecacError> {
        self.with_forest(radio, |forest| forest.snapshot())
    }

    // -------------------------------------------------------------------------
    // Forest lifecycle
    // -------------------------------------------------------------------------

    /// Rebuild a radio's forest, e.g. after a regulatory domain change. The
    /// detector is released first if the radio holds it.
    pub fn reset_forest(
        &self,
        radio: usize,
        catalog: Option<Vec<CatalogChannel>>,
    ) -> Result<Vec<AgileAction>, PrecacError> {
        let mut sm = self.sm();
        let actions = match sm.owner() {
            Some(owner) if owner == radio => sm.post_event(AgileEvent::Stop { radio }),
            _ => Vec::new(),
        };

        let r = sm.radio_mut(radio)?;
        if let Some(catalog) = catalog {
            r.set_catalog(catalog);
        }
        r.forest().reset(r.catalog());
        info!("Precac forest of radio {} rebuilt", r.name());
        Ok(actions)
    }

    /// Move the forest entries rooted in `[low, high]` from one radio to
    /// another. Roots the receiving radio already has stay where they are.
    pub fn transfer_entries(
        &self,
        from: usize,
        to: usize,
        low: MHz,
        high: MHz,
    ) -> Result<TransferOutcome, PrecacError> {
        let sm = self.sm();
        let present: Vec<MHz> = sm
            .radio(to)?
            .forest()
            .entries()
            .iter()
            .map(|e| e.center_freq())
            .collect();
        let moved = sm
            .radio(from)?
            .forest()
            .take_entries_in_range(low, high, &present);
        let nol_channels: Vec<MHz> = moved.iter().flat_map(|e| e.nol_subchannels()).collect();
        let adopted = sm.radio(to)?.forest().adopt_entries(moved);
        info!(
            "Moved {} precac entries in {}-{} MHz from radio {} to radio {}",
            adopted, low, high, from, to
        );
        Ok(TransferOutcome {
            moved: adopted,
            nol_channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agile::AgileMode;
    use crate::channel::ChannelWidth;
    use crate::forest::tests::etsi_catalog;
    use crate::forest::ChannelRequest;
    use crate::channel::Exclusion;
    use crate::radar::AGILE_DETECTOR_ID;

    fn chip(mode: AgileMode, radios: usize) -> Chip {
        let radios = (0..radios)
            .map(|i| {
                Radio::new(
                    format!("wifi{}", i),
                    etsi_catalog(),
                    OperatingChannel::new(5180, ChannelWidth::Mhz80, 5210),
                )
            })
            .collect();
        Chip::new(
            radios,
            AgileConfig {
                mode,
                ..AgileConfig::default()
            },
        )
    }

    fn agile_radar(freq_offset: i32) -> RadarFoundInfo {
        RadarFoundInfo {
            detector_id: AGILE_DETECTOR_ID,
            segment_id: 0,
            freq_offset,
            is_chirp: false,
        }
    }

    #[test]
    fn test_scenario_a_to_c() {
        let chip = chip(AgileMode::RollingCac, 1);
        chip.post_event(AgileEvent::Start { radio: 0 });
        assert_eq!(chip.agile_channel().map(|c| c.center_freq), Some(5290));
        assert_eq!(chip.chan_state(0, 5290).unwrap(), PrecacChanState::Now);

        chip.post_event(AgileEvent::Done {
            radio: 0,
            generation: chip.generation(),
        });
        assert_eq!(chip.state(), AgileState::Complete);
        assert_eq!(chip.chan_state(0, 5290).unwrap(), PrecacChanState::Done);

        // radar at 5290 + 15 lands in the 5300 leaf
        let outcome = chip.process_radar_found(0, &agile_radar(15)).unwrap();
        assert_eq!(outcome.radar_freq, Some(5305));
        assert_eq!(outcome.nol_channels, vec![5300]);
        assert!(outcome.actions.contains(&AgileAction::AbortDetector { radio: 0 }));
        assert_eq!(chip.chan_state(0, 5300).unwrap(), PrecacChanState::Nol);
        {
            let sm = chip.sm();
            let forest = sm.radio(0).unwrap().forest();
            let leaf = forest.entry_for(5300).unwrap().tree().find(5300).unwrap();
            assert_eq!(leaf.nol_subchannels(), 1);
            assert_eq!(leaf.caced_subchannels(), 0);
        }
        // reselection skips the blocked channel
        assert_eq!(chip.agile_channel().map(|c| c.center_freq), Some(5530));

        let request = ChannelRequest {
            width: ChannelWidth::Mhz20,
            exclusion: Exclusion::none(),
            desired: Some(5300),
        };
        let before = chip.with_forest(0, |f| f.find_channel(&request)).unwrap();
        assert_ne!(before, Some(5300));

        chip.nol_expired(0, 5300).unwrap();
        assert_eq!(chip.chan_state(0, 5300).unwrap(), PrecacChanState::Required);
        let after = chip.with_forest(0, |f| f.find_channel(&request)).unwrap();
        assert_eq!(after, Some(5300));
    }

    #[test]
    fn test_precac_radar_returns_to_init_when_nothing_left() {
        let chip = chip(AgileMode::Precac, 1);
        chip.with_forest(0, |f| {
            for center in [5530, 5610, 5690] {
                f.mark_cac_done(center, None, ChannelWidth::Mhz80);
            }
        })
        .unwrap();
        chip.post_event(AgileEvent::Start { radio: 0 });
        assert_eq!(chip.agile_channel().map(|c| c.center_freq), Some(5290));

        let outcome = chip.process_radar_found(0, &agile_radar(-25)).unwrap();
        assert_eq!(outcome.nol_channels, vec![5260]);
        assert_eq!(chip.state(), AgileState::Init);
        assert_eq!(chip.owner(), None);

        // expiry of the only blocked leaf restarts preCAC
        let actions = chip.nol_expired(0, 5260).unwrap();
        assert_eq!(chip.state(), AgileState::Running);
        assert!(matches!(actions[0], AgileAction::ConfigureDetector { .. }));
    }

    #[test]
    fn test_agile_radar_from_non_owner_discarded() {
        let chip = chip(AgileMode::Precac, 2);
        chip.post_event(AgileEvent::Start { radio: 0 });
        let outcome = chip.process_radar_found(1, &agile_radar(15)).unwrap();
        assert_eq!(outcome, RadarOutcome::default());
        assert_eq!(chip.state(), AgileState::Running);
        assert_eq!(chip.chan_state(0, 5300).unwrap(), PrecacChanState::Required);
    }

    #[test]
    fn test_primary_chain_radar() {
        let chip = chip(AgileMode::Precac, 1);
        let chan = OperatingChannel::new(5500, ChannelWidth::Mhz80, 5530).with_dfs(true, false);
        chip.decide_preferred_channel(0, chan).unwrap();
        assert_eq!(chip.operating_channel(0).unwrap(), chan);

        let info = RadarFoundInfo {
            detector_id: 0,
            segment_id: 0,
            freq_offset: -25,
            is_chirp: false,
        };
        let outcome = chip.process_radar_found(0, &info).unwrap();
        assert_eq!(outcome.nol_channels, vec![5500]);
        assert!(outcome.actions.is_empty());
        assert_eq!(chip.chan_state(0, 5500).unwrap(), PrecacChanState::Nol);
        assert_eq!(chip.state(), AgileState::Init);
    }

    #[test]
    fn test_decide_preferred_channel_uses_intermediate() {
        let intermediate = OperatingChannel::new(5180, ChannelWidth::Mhz80, 5210);
        let radio = Radio::new("wifi0", etsi_catalog(), intermediate)
            .with_intermediate(Some(intermediate));
        let chip = Chip::new(vec![radio], AgileConfig::default());

        let preferred = OperatingChannel::new(5660, ChannelWidth::Mhz80, 5690).with_dfs(true, false);
        let now = chip.decide_preferred_channel(0, preferred).unwrap();
        assert_eq!(now, intermediate);
        assert_eq!(chip.snapshot(0).unwrap()[0].center_freq, 5690);

        let actions = chip.post_event(AgileEvent::Start { radio: 0 });
        assert_eq!(chip.agile_channel().map(|c| c.center_freq), Some(5690));
        assert!(!actions.is_empty());

        let actions = chip.post_event(AgileEvent::Done {
            radio: 0,
            generation: chip.generation(),
        });
        assert!(actions.contains(&AgileAction::SwitchHomeChannel {
            radio: 0,
            channel: preferred,
        }));
        assert_eq!(chip.operating_channel(0).unwrap(), preferred);
        assert!(chip.is_precac_done(0, &preferred).unwrap());
    }

    #[test]
    fn test_decide_non_dfs_channel_used_directly() {
        let chip = chip(AgileMode::Precac, 1);
        let chan = OperatingChannel::new(5745, ChannelWidth::Mhz80, 5775);
        assert_eq!(chip.decide_preferred_channel(0, chan).unwrap(), chan);
        assert_eq!(
            chip.precac_status_for_channel(0, &chan).unwrap(),
            PrecacStatus::NoPrecacCompletedChannels
        );
    }

    #[test]
    fn test_reset_forest_releases_detector() {
        let chip = chip(AgileMode::Precac, 1);
        chip.post_event(AgileEvent::Start { radio: 0 });
        let actions = chip.reset_forest(0, None).unwrap();
        assert!(actions.contains(&AgileAction::AbortDetector { radio: 0 }));
        assert_eq!(chip.state(), AgileState::Init);
        assert_eq!(chip.snapshot(0).unwrap().len(), 3);

        let fcc_low: Vec<CatalogChannel> = etsi_catalog()
            .into_iter()
            .filter(|c| c.center_freq < 5400)
            .collect();
        chip.reset_forest(0, Some(fcc_low)).unwrap();
        assert_eq!(chip.snapshot(0).unwrap().len(), 1);
        assert!(chip.reset_forest(3, None).is_err());
    }

    /// wifi1 starts with an empty forest.
    fn chip_with_empty_peer() -> Chip {
        Chip::new(
            vec![
                Radio::new(
                    "wifi0",
                    etsi_catalog(),
                    OperatingChannel::new(5180, ChannelWidth::Mhz80, 5210),
                ),
                Radio::new(
                    "wifi1",
                    Vec::new(),
                    OperatingChannel::new(5745, ChannelWidth::Mhz80, 5775),
                ),
            ],
            AgileConfig::default(),
        )
    }

    #[test]
    fn test_transfer_entries() {
        let chip = chip_with_empty_peer();
        let outcome = chip.transfer_entries(0, 1, 5490, 5730).unwrap();
        assert_eq!(outcome.moved, 2);
        assert!(outcome.nol_channels.is_empty());
        assert_eq!(chip.snapshot(0).unwrap().len(), 1);
        assert_eq!(chip.snapshot(1).unwrap().len(), 2);
        assert_eq!(chip.chan_state(0, 5530).unwrap(), PrecacChanState::Err);
        assert!(matches!(
            chip.transfer_entries(0, 5, 5490, 5730),
            Err(PrecacError::UnknownRadio(5))
        ));
    }

    #[test]
    fn test_transfer_reports_nol_leaves_outside_range() {
        let chip = chip_with_empty_peer();
        let marked = chip.with_forest(0, |f| f.mark_nol(&[5500])).unwrap();
        assert_eq!(marked, vec![5500]);

        // Only the 160 MHz root at 5570 is in range, its NOL leaf 5500 is not
        let moved = chip.transfer_entries(0, 1, 5560, 5580).unwrap();
        assert_eq!(moved.moved, 1);
        assert_eq!(moved.nol_channels, vec![5500]);
        assert_eq!(chip.chan_state(1, 5500).unwrap(), PrecacChanState::Nol);
        assert_eq!(chip.chan_state(0, 5500).unwrap(), PrecacChanState::Err);
    }

    #[test]
    fn test_transfer_keeps_roots_the_target_has() {
        let chip = chip(AgileMode::Precac, 2);
        chip.with_forest(0, |f| f.mark_nol(&[5500])).unwrap();

        let outcome = chip.transfer_entries(0, 1, 5490, 5730).unwrap();
        assert_eq!(outcome, TransferOutcome::default());
        assert_eq!(chip.snapshot(0).unwrap().len(), 3);
        assert_eq!(chip.chan_state(0, 5500).unwrap(), PrecacChanState::Nol);
        assert_eq!(chip.chan_state(1, 5500).unwrap(), PrecacChanState::Required);
    }

    #[test]
    fn test_dump() {
        let chip = chip(AgileMode::Precac, 1);
        let lines = chip.dump(0).unwrap();
        assert_eq!(lines[1], "NOTE: Syntax for each node: <ch_ieee>(<CAC>,<NOL>)");
        assert!(lines.iter().any(|l| l.ends_with("138(0,0)")));
        chip.log_dump(0).unwrap();
    }
}
