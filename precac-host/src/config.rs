//! Host configuration file.
//!
//! ```json
//! {
//!   "agile": { "mode": "precac", "agileWidth": "80" },
//!   "radios": [
//!     {
//!       "name": "wifi0",
//!       "channels": [ { "centerFreq": 5500, "width": "20", "isDfs": true } ],
//!       "operatingChannel": { "primaryFreq": 5180, "width": "80", "centerFreq": 5210 }
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use log::{debug, info};
use precac_core::channel::{freq_to_ieee, is_5ghz};
use precac_core::{AgileConfig, CatalogChannel, Chip, OperatingChannel, Radio};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioConfig {
    pub name: String,
    /// Channel catalog of the current regulatory domain
    pub channels: Vec<CatalogChannel>,
    pub operating_channel: OperatingChannel,
    /// Home channel the radio should move to once it is CAC-done
    #[serde(default)]
    pub preferred_channel: Option<OperatingChannel>,
    #[serde(default)]
    pub intermediate_channel: Option<OperatingChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(default)]
    pub agile: AgileConfig,
    pub radios: Vec<RadioConfig>,
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, HostError> {
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, HostError> {
        let mut config: HostConfig = serde_json::from_str(text)?;
        if config.radios.is_empty() {
            return Err(HostError::NoRadios);
        }
        for radio in &mut config.radios {
            if let Some(bad) = radio
                .channels
                .iter()
                .find(|c| !is_5ghz(c.center_freq))
            {
                return Err(HostError::InvalidChannel {
                    radio: radio.name.clone(),
                    center_freq: bad.center_freq,
                });
            }
            fill_ieee(&mut radio.channels);
        }
        Ok(config)
    }

    /// Build the chip and apply each radio's preferred channel.
    pub fn build_chip(&self) -> Result<Chip, HostError> {
        let radios = self
            .radios
            .iter()
            .map(|r| {
                Radio::new(r.name.clone(), r.channels.clone(), r.operating_channel)
                    .with_intermediate(r.intermediate_channel)
            })
            .collect();
        let chip = Chip::new(radios, self.agile.clone());

        for (index, radio) in self.radios.iter().enumerate() {
            if let Some(preferred) = radio.preferred_channel {
                let now = chip.decide_preferred_channel(index, preferred)?;
                info!(
                    "Radio {} starts on channel {} (preferred {})",
                    radio.name,
                    now.ieee(),
                    preferred.ieee()
                );
            }
        }
        Ok(chip)
    }
}

/// Catalog files may leave out channel numbers.
pub(crate) fn fill_ieee(channels: &mut [CatalogChannel]) {
    for chan in channels.iter_mut().filter(|c| c.ieee == 0) {
        chan.ieee = freq_to_ieee(chan.center_freq);
    }
}
