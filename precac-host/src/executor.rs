//! Action executor.
//!
//! Runs the side effects the core asks for, and feeds the resulting timer,
//! firmware and NOL events back into the chip. Everything reaches the chip
//! through one queue, so actions of one event are fully applied before the
//! next event is looked at.

use std::sync::Arc;

use log::{info, warn};
use precac_core::{AgileAction, AgileEvent, Chip, OperatingChannel};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::error::HostError;
use crate::firmware::SimulatedDetector;
use crate::timer::HostTimers;
use crate::{HostEvent, HostHandle, TimeScale};

pub struct Executor {
    chip: Arc<Chip>,
    tx: UnboundedSender<HostEvent>,
    rx: UnboundedReceiver<HostEvent>,
    timers: HostTimers,
    detector: SimulatedDetector,
    home_switches: Vec<(usize, OperatingChannel)>,
}

impl Executor {
    pub fn new(chip: Arc<Chip>, scale: TimeScale) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Executor {
            chip,
            timers: HostTimers::new(tx.clone(), scale),
            detector: SimulatedDetector::new(tx.clone(), scale),
            tx,
            rx,
            home_switches: Vec::new(),
        }
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle::new(self.tx.clone())
    }

    pub fn chip(&self) -> &Arc<Chip> {
        &self.chip
    }

    pub fn timers(&self) -> &HostTimers {
        &self.timers
    }

    pub fn detector(&self) -> &SimulatedDetector {
        &self.detector
    }

    /// Home channel switches carried out so far, oldest first.
    pub fn home_switches(&self) -> &[(usize, OperatingChannel)] {
        &self.home_switches
    }

    pub async fn next_event(&mut self) -> Option<HostEvent> {
        self.rx.recv().await
    }

    /// Hand one event to the chip and carry out what it asks for.
    pub fn dispatch(&mut self, event: HostEvent) -> Result<(), HostError> {
        let actions = match event {
            HostEvent::Agile(event) => {
                if let AgileEvent::Done { generation, .. } = event {
                    self.timers.agile_fired(generation);
                }
                self.chip.post_event(event)
            }
            HostEvent::Radar { radio, info } => {
                let outcome = self.chip.process_radar_found(radio, &info)?;
                if let Some(marked) = outcome.radio {
                    let hold = self.chip.config().nol_timeout();
                    for freq in &outcome.nol_channels {
                        self.timers.start_nol(marked, *freq, hold);
                    }
                }
                outcome.actions
            }
            HostEvent::NolExpired { radio, freq } => {
                self.timers.nol_fired(radio, freq);
                self.chip.nol_expired(radio, freq)?
            }
            HostEvent::OcacComplete { radio, completion } => {
                self.detector.completed(radio);
                self.chip.handle_ocac_complete(radio, &completion)
            }
            HostEvent::SetConfig(config) => {
                info!("Agile mode {}, width {}", config.mode, config.agile_width);
                self.chip.set_config(config)
            }
            HostEvent::PreferredChannel { radio, channel } => {
                let now = self.chip.decide_preferred_channel(radio, channel)?;
                info!("Radio {} now operates on channel {}", radio, now.ieee());
                Vec::new()
            }
            HostEvent::RegulatoryChange { radio, channels } => {
                // A rebuilt forest has no NOL entries left for these timers
                let dropped = self.timers.cancel_nol_in_range(radio, 0, u16::MAX);
                if !dropped.is_empty() {
                    info!("Dropped NOL timers {:?} of radio {}", dropped, radio);
                }
                self.chip.reset_forest(radio, channels)?
            }
            HostEvent::Transfer {
                from,
                to,
                low,
                high,
            } => {
                let outcome = self.chip.transfer_entries(from, to, low, high)?;
                // NOL hold-down restarts in full on the receiving radio
                let hold = self.chip.config().nol_timeout();
                for freq in outcome.nol_channels {
                    self.timers.cancel_nol(from, freq);
                    self.timers.start_nol(to, freq, hold);
                }
                Vec::new()
            }
            HostEvent::Dump { radio } => {
                self.chip.log_dump(radio)?;
                Vec::new()
            }
        };
        self.apply(actions);
        Ok(())
    }

    fn apply(&mut self, actions: Vec<AgileAction>) {
        for action in actions {
            match action {
                AgileAction::ConfigureDetector { radio, request } => {
                    self.detector.configure(radio, request)
                }
                AgileAction::AbortDetector { radio } => self.detector.abort(radio),
                AgileAction::StartTimer {
                    radio,
                    generation,
                    timeout,
                } => self.timers.start_agile(radio, generation, timeout),
                AgileAction::CancelTimer { generation } => {
                    self.timers.cancel_agile(generation);
                }
                AgileAction::SwitchHomeChannel { radio, channel } => {
                    info!(
                        "Radio {} switches home channel to {} ({} MHz / {})",
                        radio,
                        channel.ieee(),
                        channel.center_freq,
                        channel.width
                    );
                    self.home_switches.push((radio, channel));
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some((radio, _)) = self.detector.current() {
            self.detector.abort(radio);
        }
        self.timers.cancel_all();
    }

    /// Executor subsystem: process events until shutdown is requested.
    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), HostError> {
        info!("Executor started for {} radio(s)", self.chip.radio_count());
        loop {
            tokio::select! { biased;
                _ = subsys.on_shutdown_requested() => {
                    info!("Executor: shutdown requested");
                    break;
                }
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.dispatch(event) {
                        warn!("Executor: {}", e);
                    }
                }
            }
        }
        self.shutdown();
        Ok(())
    }
}
