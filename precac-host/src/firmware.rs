//! Simulated agile detector firmware.
//!
//! Accepts the configure / abort requests the core issues. In QUICK_OCAC mode
//! it reports a successful completion after the minimum CAC time; in
//! QUICK_RCAC mode it stays resident until aborted.

use log::{debug, info};
use precac_core::{DetectorRequest, OcacCompletion, OcacMode, OcacStatus};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{HostEvent, TimeScale};

#[derive(Debug)]
struct Running {
    radio: usize,
    request: DetectorRequest,
    token: CancellationToken,
}

pub struct SimulatedDetector {
    events: UnboundedSender<HostEvent>,
    scale: TimeScale,
    running: Option<Running>,
}

impl SimulatedDetector {
    pub fn new(events: UnboundedSender<HostEvent>, scale: TimeScale) -> Self {
        SimulatedDetector {
            events,
            scale,
            running: None,
        }
    }

    pub fn configure(&mut self, radio: usize, request: DetectorRequest) {
        if let Some(prev) = self.running.take() {
            debug!("Detector reconfigured, dropping radio {} request", prev.radio);
            prev.token.cancel();
        }
        info!(
            "Agile detector on radio {}: {} MHz{} / {} mode {:?}, min {:?}",
            radio,
            request.center_freq_primary,
            request
                .center_freq_secondary
                .map(|f| format!(" + {} MHz", f))
                .unwrap_or_default(),
            request.width,
            request.mode,
            request.min_timeout
        );

        let token = CancellationToken::new();
        if request.mode == OcacMode::QuickOcac {
            let child = token.clone();
            let events = self.events.clone();
            let sleep = self.scale.scale(request.min_timeout);
            let completion = OcacCompletion {
                status: OcacStatus::Success,
                center_freq_primary: request.center_freq_primary,
                center_freq_secondary: request.center_freq_secondary,
                width: request.width,
            };
            tokio::spawn(async move {
                tokio::select! {
                    _ = child.cancelled() => {}
                    _ = tokio::time::sleep(sleep) => {
                        let _ = events.send(HostEvent::OcacComplete { radio, completion });
                    }
                }
            });
        }
        self.running = Some(Running {
            radio,
            request,
            token,
        });
    }

    pub fn abort(&mut self, radio: usize) {
        match self.running.take() {
            Some(running) if running.radio == radio => {
                running.token.cancel();
                info!(
                    "Agile detector on radio {} aborted ({} MHz)",
                    radio, running.request.center_freq_primary
                );
            }
            other => {
                debug!("Abort from radio {} with no detector of its own running", radio);
                self.running = other;
            }
        }
    }

    /// The firmware has delivered its completion; the request is over.
    pub fn completed(&mut self, radio: usize) {
        if self.running.as_ref().is_some_and(|r| r.radio == radio) {
            self.running = None;
        }
    }

    /// Radio and request the detector is currently working on.
    pub fn current(&self) -> Option<(usize, DetectorRequest)> {
        self.running.as_ref().map(|r| (r.radio, r.request))
    }
}
