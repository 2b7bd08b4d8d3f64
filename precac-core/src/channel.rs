//! Channel model
//!
//! Frequencies, channel widths and the two channel views the core works with:
//! the read-only regulatory [`ChannelCatalog`] that the forest is built from,
//! and the [`OperatingChannel`] a radio is currently transmitting on (or
//! wants to move to).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PrecacError;

pub type MHz = u16;

pub const BASE_FREQ_2GHZ: MHz = 2407;
pub const BASE_FREQ_5GHZ: MHz = 5000;
pub const INVALID_CHAN_IDX: u8 = 0;

/// Width of the smallest channel slice tracked by the tree.
pub const SUBCHANNEL_WIDTH: MHz = 20;

/// Restricted 80+80 ("165 MHz") band plan.
pub const RESTRICTED_165_CENTER_FREQ: MHz = 5730;
pub const RESTRICTED_165_LEFT_80_CENTER_FREQ: MHz = 5690;
pub const RESTRICTED_165_RIGHT_80_CENTER_FREQ: MHz = 5775;
pub const RESTRICTED_165_LEFT_OFFSET: MHz = 40;
pub const RESTRICTED_165_RIGHT_OFFSET: MHz = 45;

/// Distance between the center of a 160 MHz channel and the center of
/// either of its 80 MHz halves.
pub const SECOND_SEGMENT_OFFSET_160: MHz = 40;

/// ETSI weather radar band, CAC lasts 10 minutes here.
pub const WEATHER_RADAR_LOW_FREQ: MHz = 5600;
pub const WEATHER_RADAR_HIGH_FREQ: MHz = 5650;

pub const CAC_TIMEOUT: Duration = Duration::from_secs(60);
pub const WEATHER_CAC_TIMEOUT: Duration = Duration::from_secs(600);

// =============================================================================
// Channel width
// =============================================================================

/// Channel bandwidth.
///
/// `Restricted165` is the 5690/5775 MHz 80+80 pair centered on 5730 MHz; it
/// is handled like a 160 MHz channel by the tree but its halves are not
/// adjacent power-of-two slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelWidth {
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
    Mhz80P80,
    Restricted165,
}

impl ChannelWidth {
    pub fn from_mhz(mhz: u16) -> Result<Self, PrecacError> {
        match mhz {
            20 => Ok(ChannelWidth::Mhz20),
            40 => Ok(ChannelWidth::Mhz40),
            80 => Ok(ChannelWidth::Mhz80),
            160 => Ok(ChannelWidth::Mhz160),
            165 => Ok(ChannelWidth::Restricted165),
            other => Err(PrecacError::InvalidChannelWidth(other.to_string())),
        }
    }

    /// Number of 20 MHz slices covered.
    pub fn subchannels(self) -> u8 {
        match self {
            ChannelWidth::Mhz20 => 1,
            ChannelWidth::Mhz40 => 2,
            ChannelWidth::Mhz80 => 4,
            ChannelWidth::Mhz160 | ChannelWidth::Mhz80P80 | ChannelWidth::Restricted165 => 8,
        }
    }

    /// Bandwidth used for range arithmetic around a center frequency.
    pub fn span_mhz(self) -> MHz {
        SUBCHANNEL_WIDTH * self.subchannels() as MHz
    }

    /// Next level down in the tree.
    pub fn halved(self) -> Option<ChannelWidth> {
        match self {
            ChannelWidth::Mhz20 => None,
            ChannelWidth::Mhz40 => Some(ChannelWidth::Mhz20),
            ChannelWidth::Mhz80 => Some(ChannelWidth::Mhz40),
            ChannelWidth::Mhz160 | ChannelWidth::Mhz80P80 | ChannelWidth::Restricted165 => {
                Some(ChannelWidth::Mhz80)
            }
        }
    }

    /// Width of one frequency segment: 80+80, 160 and 165 are two 80 MHz segments.
    pub fn segment_width(self) -> ChannelWidth {
        match self {
            ChannelWidth::Mhz20 | ChannelWidth::Mhz40 | ChannelWidth::Mhz80 => self,
            _ => ChannelWidth::Mhz80,
        }
    }

    pub fn is_split(self) -> bool {
        matches!(self, ChannelWidth::Mhz80P80 | ChannelWidth::Restricted165)
    }
}

impl fmt::Display for ChannelWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelWidth::Mhz20 => write!(f, "20"),
            ChannelWidth::Mhz40 => write!(f, "40"),
            ChannelWidth::Mhz80 => write!(f, "80"),
            ChannelWidth::Mhz160 => write!(f, "160"),
            ChannelWidth::Mhz80P80 => write!(f, "80+80"),
            ChannelWidth::Restricted165 => write!(f, "165"),
        }
    }
}

impl FromStr for ChannelWidth {
    type Err = PrecacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches("MHz").trim_end_matches("mhz");
        if s == "80+80" {
            return Ok(ChannelWidth::Mhz80P80);
        }
        s.parse::<u16>()
            .map_err(|_| PrecacError::InvalidChannelWidth(s.to_string()))
            .and_then(ChannelWidth::from_mhz)
    }
}

impl Serialize for ChannelWidth {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChannelWidth {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Frequency helpers
// =============================================================================

/// IEEE channel number for a center frequency, `INVALID_CHAN_IDX` if the
/// frequency is outside the 2.4 and 5 GHz bands.
pub fn freq_to_ieee(freq: MHz) -> u8 {
    match freq {
        2484 => 14,
        2412..=2472 => ((freq - BASE_FREQ_2GHZ) / 5) as u8,
        5000..=5925 => ((freq - BASE_FREQ_5GHZ) / 5) as u8,
        _ => INVALID_CHAN_IDX,
    }
}

pub fn is_5ghz(freq: MHz) -> bool {
    (5000..=5925).contains(&freq)
}

/// `low <= freq <= high` around `center`.
pub fn is_within_range(freq: MHz, center: MHz, half_width: MHz) -> bool {
    freq >= center.saturating_sub(half_width) && freq <= center.saturating_add(half_width)
}

/// `low < freq < high` around `center`.
pub fn is_within_range_strict(freq: MHz, center: MHz, half_width: MHz) -> bool {
    freq > center.saturating_sub(half_width) && freq < center.saturating_add(half_width)
}

/// 20 MHz channel centers bonded into a contiguous channel of `width_mhz`.
pub fn bonding_channels(center: MHz, width_mhz: MHz) -> Vec<MHz> {
    let count = width_mhz / SUBCHANNEL_WIDTH;
    let first = center.saturating_sub(width_mhz / 2).saturating_add(SUBCHANNEL_WIDTH / 2);
    (0..count)
        .map(|i| first.saturating_add(i * SUBCHANNEL_WIDTH))
        .collect()
}

/// Expand a channel into its 20 MHz sub-channels.
///
/// `center` is the center of the whole channel, except for 80+80 where it is
/// the primary segment and `secondary` holds the other one.
pub fn subchannels_for_center(center: MHz, secondary: Option<MHz>, width: ChannelWidth) -> Vec<MHz> {
    match width {
        ChannelWidth::Mhz20 => vec![center],
        ChannelWidth::Mhz40 | ChannelWidth::Mhz80 | ChannelWidth::Mhz160 => {
            bonding_channels(center, width.span_mhz())
        }
        ChannelWidth::Mhz80P80 => {
            let mut list = bonding_channels(center, 80);
            if let Some(secondary) = secondary {
                list.extend(bonding_channels(secondary, 80));
            }
            list
        }
        ChannelWidth::Restricted165 => {
            let mut list = bonding_channels(center - RESTRICTED_165_LEFT_OFFSET, 80);
            list.extend(bonding_channels(center + RESTRICTED_165_RIGHT_OFFSET, 80));
            list
        }
    }
}

/// CAC duration required by the regulatory domain for this channel.
pub fn cac_timeout(center: MHz, secondary: Option<MHz>, width: ChannelWidth) -> Duration {
    let weather = subchannels_for_center(center, secondary, width)
        .into_iter()
        .any(|f| (WEATHER_RADAR_LOW_FREQ..=WEATHER_RADAR_HIGH_FREQ).contains(&f));
    if weather {
        WEATHER_CAC_TIMEOUT
    } else {
        CAC_TIMEOUT
    }
}

// =============================================================================
// Channel catalog
// =============================================================================

/// One channel permitted by the active regulatory domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogChannel {
    /// Center of the whole channel (5730 for restricted 165)
    pub center_freq: MHz,
    pub width: ChannelWidth,
    /// IEEE number of the channel center, display only
    #[serde(default)]
    pub ieee: u8,
    /// Any part of the channel needs DFS
    pub is_dfs: bool,
}

impl CatalogChannel {
    pub fn new(center_freq: MHz, width: ChannelWidth, is_dfs: bool) -> Self {
        CatalogChannel {
            center_freq,
            width,
            ieee: freq_to_ieee(center_freq),
            is_dfs,
        }
    }

    /// Lower and upper band edge.
    pub fn edges(&self) -> (MHz, MHz) {
        match self.width {
            ChannelWidth::Restricted165 => (
                RESTRICTED_165_LEFT_80_CENTER_FREQ - 40,
                RESTRICTED_165_RIGHT_80_CENTER_FREQ + 40,
            ),
            width => {
                let half = width.span_mhz() / 2;
                (
                    self.center_freq.saturating_sub(half),
                    self.center_freq.saturating_add(half),
                )
            }
        }
    }
}

/// Read-only view of the regulatory channel list.
///
/// Re-queried only when a forest is (re)built.
pub trait ChannelCatalog {
    fn channels(&self) -> &[CatalogChannel];

    fn lookup(&self, center_freq: MHz, width: ChannelWidth) -> Option<&CatalogChannel> {
        self.channels()
            .iter()
            .find(|c| c.center_freq == center_freq && c.width == width)
    }

    /// The 20 MHz record for a sub-channel.
    fn subchannel(&self, freq: MHz) -> Option<&CatalogChannel> {
        self.lookup(freq, ChannelWidth::Mhz20)
    }
}

impl ChannelCatalog for [CatalogChannel] {
    fn channels(&self) -> &[CatalogChannel] {
        self
    }
}

impl ChannelCatalog for Vec<CatalogChannel> {
    fn channels(&self) -> &[CatalogChannel] {
        self.as_slice()
    }
}

// =============================================================================
// Operating channel
// =============================================================================

/// A channel a radio operates on, or a candidate home channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingChannel {
    /// Primary 20 MHz channel
    pub primary_freq: MHz,
    pub width: ChannelWidth,
    /// Center of the whole channel; the primary 80 MHz segment for 80+80
    pub center_freq: MHz,
    /// Secondary 80 MHz segment center, 80+80 only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_center: Option<MHz>,
    /// Primary segment needs DFS
    #[serde(default)]
    pub is_dfs: bool,
    /// Secondary segment needs DFS
    #[serde(default)]
    pub secondary_is_dfs: bool,
}

impl OperatingChannel {
    pub fn new(primary_freq: MHz, width: ChannelWidth, center_freq: MHz) -> Self {
        OperatingChannel {
            primary_freq,
            width,
            center_freq,
            secondary_center: None,
            is_dfs: false,
            secondary_is_dfs: false,
        }
    }

    pub fn with_dfs(mut self, primary: bool, secondary: bool) -> Self {
        self.is_dfs = primary;
        self.secondary_is_dfs = secondary;
        self
    }

    pub fn with_secondary(mut self, secondary_center: MHz) -> Self {
        self.secondary_center = Some(secondary_center);
        self
    }

    pub fn ieee(&self) -> u8 {
        freq_to_ieee(self.primary_freq)
    }

    /// Center of the segment holding the primary channel.
    pub fn segment1(&self) -> MHz {
        match self.width {
            ChannelWidth::Mhz160 => {
                if self.primary_freq < self.center_freq {
                    self.center_freq - SECOND_SEGMENT_OFFSET_160
                } else {
                    self.center_freq + SECOND_SEGMENT_OFFSET_160
                }
            }
            ChannelWidth::Restricted165 => {
                if self.primary_freq < RESTRICTED_165_CENTER_FREQ {
                    RESTRICTED_165_LEFT_80_CENTER_FREQ
                } else {
                    RESTRICTED_165_RIGHT_80_CENTER_FREQ
                }
            }
            _ => self.center_freq,
        }
    }

    /// Center of the other 80 MHz segment, if the channel has two.
    pub fn segment2(&self) -> Option<MHz> {
        match self.width {
            ChannelWidth::Mhz160 => {
                if self.segment1() < self.center_freq {
                    Some(self.center_freq + SECOND_SEGMENT_OFFSET_160)
                } else {
                    Some(self.center_freq - SECOND_SEGMENT_OFFSET_160)
                }
            }
            ChannelWidth::Restricted165 => {
                if self.segment1() == RESTRICTED_165_LEFT_80_CENTER_FREQ {
                    Some(RESTRICTED_165_RIGHT_80_CENTER_FREQ)
                } else {
                    Some(RESTRICTED_165_LEFT_80_CENTER_FREQ)
                }
            }
            ChannelWidth::Mhz80P80 => self.secondary_center,
            _ => None,
        }
    }

    /// Segments currently occupied, excluded from preCAC accounting.
    pub fn exclusion(&self) -> Exclusion {
        Exclusion {
            primary: Some(self.segment1()),
            secondary: self.segment2(),
            width: self.width.segment_width(),
        }
    }

    /// All 20 MHz sub-channels.
    pub fn subchannels(&self) -> Vec<MHz> {
        subchannels_for_center(self.center_freq, self.secondary_center, self.width)
    }

    pub fn overlaps(&self, freq: MHz) -> bool {
        self.subchannels().contains(&freq)
    }
}

/// Sub-channels occupied by the current operating channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exclusion {
    pub primary: Option<MHz>,
    pub secondary: Option<MHz>,
    pub width: ChannelWidth,
}

impl Default for ChannelWidth {
    fn default() -> Self {
        ChannelWidth::Mhz80
    }
}

impl Exclusion {
    pub fn none() -> Self {
        Exclusion::default()
    }

    pub fn frequencies(&self) -> impl Iterator<Item = MHz> {
        self.primary.into_iter().chain(self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_subchannels() {
        assert_eq!(ChannelWidth::Mhz20.subchannels(), 1);
        assert_eq!(ChannelWidth::Mhz40.subchannels(), 2);
        assert_eq!(ChannelWidth::Mhz80.subchannels(), 4);
        assert_eq!(ChannelWidth::Mhz160.subchannels(), 8);
        assert_eq!(ChannelWidth::Restricted165.subchannels(), 8);
        assert_eq!(ChannelWidth::Mhz160.halved(), Some(ChannelWidth::Mhz80));
        assert_eq!(ChannelWidth::Mhz20.halved(), None);
    }

    #[test]
    fn test_width_parse() {
        assert_eq!("80".parse::<ChannelWidth>().unwrap(), ChannelWidth::Mhz80);
        assert_eq!("80+80".parse::<ChannelWidth>().unwrap(), ChannelWidth::Mhz80P80);
        assert_eq!("165MHz".parse::<ChannelWidth>().unwrap(), ChannelWidth::Restricted165);
        assert!("30".parse::<ChannelWidth>().is_err());
    }

    #[test]
    fn test_freq_to_ieee() {
        assert_eq!(freq_to_ieee(5180), 36);
        assert_eq!(freq_to_ieee(5500), 100);
        assert_eq!(freq_to_ieee(5730), 146);
        assert_eq!(freq_to_ieee(2412), 1);
        assert_eq!(freq_to_ieee(2484), 14);
        assert_eq!(freq_to_ieee(100), INVALID_CHAN_IDX);
    }

    #[test]
    fn test_bonding_channels() {
        assert_eq!(bonding_channels(5530, 80), vec![5500, 5520, 5540, 5560]);
        assert_eq!(bonding_channels(5510, 40), vec![5500, 5520]);
        assert_eq!(bonding_channels(5500, 20), vec![5500]);
        assert_eq!(bonding_channels(5570, 160).len(), 8);
        // malformed records clamp at the bottom of the range
        assert_eq!(bonding_channels(50, 160)[0], 10);
    }

    #[test]
    fn test_subchannels_restricted_165() {
        let subs = subchannels_for_center(5730, None, ChannelWidth::Restricted165);
        assert_eq!(
            subs,
            vec![5660, 5680, 5700, 5720, 5745, 5765, 5785, 5805]
        );
    }

    #[test]
    fn test_cac_timeout_weather() {
        assert_eq!(cac_timeout(5500, None, ChannelWidth::Mhz20), CAC_TIMEOUT);
        assert_eq!(cac_timeout(5610, None, ChannelWidth::Mhz80), WEATHER_CAC_TIMEOUT);
    }

    #[test]
    fn test_operating_channel_segments() {
        // 100 HT160: primary 5500, 160 center 5570
        let chan = OperatingChannel::new(5500, ChannelWidth::Mhz160, 5570);
        assert_eq!(chan.segment1(), 5530);
        assert_eq!(chan.segment2(), Some(5610));

        let upper = OperatingChannel::new(5620, ChannelWidth::Mhz160, 5570);
        assert_eq!(upper.segment1(), 5610);
        assert_eq!(upper.segment2(), Some(5530));

        let vht80 = OperatingChannel::new(5180, ChannelWidth::Mhz80, 5210);
        let exclusion = vht80.exclusion();
        assert_eq!(exclusion.primary, Some(5210));
        assert_eq!(exclusion.secondary, None);
        assert_eq!(exclusion.width, ChannelWidth::Mhz80);
    }

    #[test]
    fn test_catalog_edges_and_serde() {
        let chan = CatalogChannel::new(5730, ChannelWidth::Restricted165, true);
        assert_eq!(chan.edges(), (5650, 5815));
        assert_eq!(CatalogChannel::new(50, ChannelWidth::Mhz160, true).edges(), (0, 130));

        let json = serde_json::to_string(&CatalogChannel::new(5530, ChannelWidth::Mhz80, true)).unwrap();
        assert!(json.contains("\"width\":\"80\""));
        let back: CatalogChannel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.center_freq, 5530);
        assert_eq!(back.ieee, 106);
    }
}
