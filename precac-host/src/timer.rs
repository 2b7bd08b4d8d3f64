//! Host timers.
//!
//! Two kinds of timers back the core state machine:
//!
//! - the agile CAC timer, one at a time, keyed by the generation token the
//!   state machine handed out with `StartTimer`. When it fires it posts
//!   `DONE` carrying that same generation, so a late timer is recognised as
//!   stale by the core.
//! - NOL hold-down timers, one per (radio, sub-channel).
//!
//! Each timer is a tokio task parked on a [`CancellationToken`]; cancelling
//! is synchronous for the caller.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, trace};
use precac_core::{AgileEvent, MHz};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{HostEvent, TimeScale};

pub struct HostTimers {
    events: UnboundedSender<HostEvent>,
    scale: TimeScale,
    agile: HashMap<u64, CancellationToken>,
    nol: HashMap<(usize, MHz), CancellationToken>,
}

impl HostTimers {
    pub fn new(events: UnboundedSender<HostEvent>, scale: TimeScale) -> Self {
        HostTimers {
            events,
            scale,
            agile: HashMap::new(),
            nol: HashMap::new(),
        }
    }

    fn spawn(&self, timeout: Duration, event: HostEvent) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        let events = self.events.clone();
        let sleep = self.scale.scale(timeout);
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(sleep) => {
                    // Receiver gone means the executor is shutting down
                    let _ = events.send(event);
                }
            }
        });
        token
    }

    pub fn start_agile(&mut self, radio: usize, generation: u64, timeout: Duration) {
        debug!(
            "Agile CAC timer {} for radio {}: {:?}",
            generation, radio, timeout
        );
        let token = self.spawn(
            timeout,
            HostEvent::Agile(AgileEvent::Done { radio, generation }),
        );
        if let Some(old) = self.agile.insert(generation, token) {
            old.cancel();
        }
    }

    /// Returns false when no timer of that generation was pending.
    pub fn cancel_agile(&mut self, generation: u64) -> bool {
        match self.agile.remove(&generation) {
            Some(token) => {
                token.cancel();
                trace!("Agile CAC timer {} cancelled", generation);
                true
            }
            None => false,
        }
    }

    /// The timer of `generation` fired and its DONE is being processed.
    pub fn agile_fired(&mut self, generation: u64) {
        self.agile.remove(&generation);
    }

    pub fn start_nol(&mut self, radio: usize, freq: MHz, timeout: Duration) {
        debug!("NOL timer for {} MHz on radio {}: {:?}", freq, radio, timeout);
        let token = self.spawn(timeout, HostEvent::NolExpired { radio, freq });
        if let Some(old) = self.nol.insert((radio, freq), token) {
            old.cancel();
        }
    }

    pub fn nol_fired(&mut self, radio: usize, freq: MHz) {
        self.nol.remove(&(radio, freq));
    }

    pub fn cancel_nol(&mut self, radio: usize, freq: MHz) -> bool {
        match self.nol.remove(&(radio, freq)) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every NOL timer of `radio` inside `[low, high]`, returning the
    /// frequencies whose timers were running.
    pub fn cancel_nol_in_range(&mut self, radio: usize, low: MHz, high: MHz) -> Vec<MHz> {
        let keys: Vec<(usize, MHz)> = self
            .nol
            .keys()
            .filter(|(r, f)| *r == radio && *f >= low && *f <= high)
            .copied()
            .collect();
        let mut freqs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(token) = self.nol.remove(&key) {
                token.cancel();
                freqs.push(key.1);
            }
        }
        freqs.sort_unstable();
        freqs
    }

    pub fn active_agile(&self) -> usize {
        self.agile.len()
    }

    pub fn active_nol(&self) -> usize {
        self.nol.len()
    }

    pub fn has_nol(&self, radio: usize, freq: MHz) -> bool {
        self.nol.contains_key(&(radio, freq))
    }

    pub fn cancel_all(&mut self) {
        for token in self.agile.drain().map(|(_, t)| t).chain(self.nol.drain().map(|(_, t)| t)) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn timers() -> (HostTimers, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HostTimers::new(tx, TimeScale::default()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_agile_timer_posts_done_with_generation() {
        let (mut timers, mut rx) = timers();
        timers.start_agile(1, 7, Duration::from_secs(62));
        assert_eq!(timers.active_agile(), 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            HostEvent::Agile(AgileEvent::Done {
                radio: 1,
                generation: 7
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_stays_silent() {
        let (mut timers, mut rx) = timers();
        timers.start_agile(0, 3, Duration::from_secs(10));
        assert!(timers.cancel_agile(3));
        assert!(!timers.cancel_agile(3));

        let waited = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nol_timers_in_range() {
        let (mut timers, mut rx) = timers();
        timers.start_nol(0, 5500, Duration::from_secs(1800));
        timers.start_nol(0, 5520, Duration::from_secs(1800));
        timers.start_nol(1, 5500, Duration::from_secs(1800));
        assert_eq!(timers.active_nol(), 3);

        assert_eq!(timers.cancel_nol_in_range(0, 5490, 5600), vec![5500, 5520]);
        assert!(timers.has_nol(1, 5500));
        assert!(!timers.cancel_nol(0, 5500));

        match rx.recv().await.unwrap() {
            HostEvent::NolExpired { radio, freq } => assert_eq!((radio, freq), (1, 5500)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_scale_shortens_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = HostTimers::new(tx, TimeScale::new(60.0).unwrap());
        let start = tokio::time::Instant::now();
        timers.start_nol(0, 5500, Duration::from_secs(1800));
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }
}
