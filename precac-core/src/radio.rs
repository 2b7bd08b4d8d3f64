//! One radio (pdev) sharing the chip's agile detector.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::channel::{CatalogChannel, ChannelWidth, MHz, OperatingChannel};
use crate::forest::{ChannelRequest, PrecacForest};

#[derive(Debug)]
pub struct Radio {
    name: String,
    catalog: Vec<CatalogChannel>,
    operating: OperatingChannel,
    /// Preferred home channel waiting for preCAC to finish
    desired: Option<OperatingChannel>,
    /// Channel to operate on while the preferred one is being checked
    intermediate: Option<OperatingChannel>,
    forest: Mutex<PrecacForest>,
}

impl Radio {
    pub fn new(
        name: impl Into<String>,
        catalog: Vec<CatalogChannel>,
        operating: OperatingChannel,
    ) -> Self {
        let forest = PrecacForest::build(&catalog);
        Radio {
            name: name.into(),
            catalog,
            operating,
            desired: None,
            intermediate: None,
            forest: Mutex::new(forest),
        }
    }

    pub fn with_intermediate(mut self, intermediate: Option<OperatingChannel>) -> Self {
        self.intermediate = intermediate;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &[CatalogChannel] {
        &self.catalog
    }

    pub fn operating(&self) -> &OperatingChannel {
        &self.operating
    }

    pub fn desired(&self) -> Option<OperatingChannel> {
        self.desired
    }

    pub fn intermediate(&self) -> Option<OperatingChannel> {
        self.intermediate
    }

    pub(crate) fn set_operating(&mut self, chan: OperatingChannel) {
        self.operating = chan;
    }

    pub(crate) fn set_desired(&mut self, chan: Option<OperatingChannel>) {
        self.desired = chan;
    }

    pub(crate) fn set_catalog(&mut self, catalog: Vec<CatalogChannel>) {
        self.catalog = catalog;
    }

    /// Forest lock. Only handed out from paths that already hold the state
    /// machine lock.
    pub(crate) fn forest(&self) -> MutexGuard<'_, PrecacForest> {
        self.forest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frequency of the preferred channel in the forest, at `width`.
    fn desired_freq(&self, width: ChannelWidth) -> Option<MHz> {
        self.desired.map(|d| match d.width {
            ChannelWidth::Mhz160 | ChannelWidth::Restricted165 if width != ChannelWidth::Mhz80 => {
                d.center_freq
            }
            _ => d.segment1(),
        })
    }

    /// Ask the forest for the next channel to check, keeping clear of the
    /// operating channel. `preferred` wins over the radio's own desired channel.
    pub(crate) fn find_agile_channel(&self, width: ChannelWidth, preferred: Option<MHz>) -> Option<MHz> {
        let request = ChannelRequest {
            width,
            exclusion: self.operating.exclusion(),
            desired: preferred.or_else(|| self.desired_freq(width)),
        };
        self.forest().find_channel(&request)
    }
}
