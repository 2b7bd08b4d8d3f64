//! Radar event decoding
//!
//! Turns a [`RadarFoundInfo`] reported by a detector into the absolute radar
//! frequency and the list of 20 MHz sub-channels that must go on the NOL.
//! Everything here is a pure function of the report and the channel the
//! reporting detector was tuned to; marking the forest and notifying the
//! agile state machine is done by the chip context.

use serde::{Deserialize, Serialize};

use crate::channel::{
    bonding_channels, ChannelWidth, MHz, OperatingChannel, RESTRICTED_165_LEFT_OFFSET,
    RESTRICTED_165_RIGHT_OFFSET, SECOND_SEGMENT_OFFSET_160, SUBCHANNEL_WIDTH,
};

pub const SEG_ID_PRIMARY: u8 = 0;
pub const SEG_ID_SECONDARY: u8 = 1;

/// Default detector id of the agile radar detector.
pub const AGILE_DETECTOR_ID: u8 = 2;

/// Radar report from a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarFoundInfo {
    pub detector_id: u8,
    /// 0 = primary segment, 1 = secondary segment
    #[serde(default)]
    pub segment_id: u8,
    /// Offset of the pulse from the segment center, in MHz
    #[serde(default)]
    pub freq_offset: i32,
    #[serde(default)]
    pub is_chirp: bool,
}

/// Channel the reporting detector was tuned to.
#[derive(Debug, Clone, Copy)]
pub enum DetectorChannel<'a> {
    /// Agile detector on `center` (the 160 MHz center, or 5730 for restricted 165)
    Agile { center: MHz, width: ChannelWidth },
    /// The radio's own receive chain on its operating channel
    Primary(&'a OperatingChannel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarDecode {
    pub radar_freq: MHz,
    /// Center of the segment the offset is relative to
    pub segment_center: MHz,
    pub nol_channels: Vec<MHz>,
}

fn offset_freq(center: MHz, offset: i32) -> MHz {
    (center as i32 + offset) as MHz
}

impl DetectorChannel<'_> {
    pub fn segment_center(&self, segment_id: u8) -> MHz {
        match *self {
            DetectorChannel::Agile { center, width } => match (width, segment_id) {
                (ChannelWidth::Mhz160, SEG_ID_PRIMARY) => center - SECOND_SEGMENT_OFFSET_160,
                (ChannelWidth::Mhz160, _) => center + SECOND_SEGMENT_OFFSET_160,
                (ChannelWidth::Restricted165, SEG_ID_PRIMARY) => center - RESTRICTED_165_LEFT_OFFSET,
                (ChannelWidth::Restricted165, _) => center + RESTRICTED_165_RIGHT_OFFSET,
                _ => center,
            },
            DetectorChannel::Primary(chan) => {
                if segment_id == SEG_ID_PRIMARY {
                    chan.segment1()
                } else {
                    chan.segment2().unwrap_or_else(|| chan.segment1())
                }
            }
        }
    }

    fn width(&self) -> ChannelWidth {
        match *self {
            DetectorChannel::Agile { width, .. } => width,
            DetectorChannel::Primary(chan) => chan.width,
        }
    }

    /// Sub-channels the detector was listening on for `segment_id`.
    pub fn bonding(&self, segment_id: u8) -> Vec<MHz> {
        let width = self.width();
        match (*self, width) {
            (DetectorChannel::Agile { center, .. }, ChannelWidth::Mhz160) => {
                bonding_channels(center, 160)
            }
            (DetectorChannel::Primary(chan), ChannelWidth::Mhz160) => {
                bonding_channels(chan.center_freq, 160)
            }
            (_, ChannelWidth::Mhz80P80 | ChannelWidth::Restricted165) => {
                bonding_channels(self.segment_center(segment_id), 80)
            }
            _ => bonding_channels(self.segment_center(segment_id), width.span_mhz()),
        }
    }
}

/// Map one pulse offset to the 20 MHz channel it falls in.
fn offset_to_subchannel(center: MHz, width: ChannelWidth, offset: i32) -> Option<MHz> {
    if width == ChannelWidth::Mhz20 {
        let freq = if offset <= -10 {
            center - SUBCHANNEL_WIDTH
        } else if offset >= 10 {
            center + SUBCHANNEL_WIDTH
        } else {
            center
        };
        return Some(freq);
    }
    if offset % 20 == 0 {
        // on a sub-channel boundary, neighbours come from the +-10 offsets
        return None;
    }
    Some(offset_freq(center, 20 * offset.div_euclid(20) + 10))
}

/// 20 MHz sub-channels hit by a pulse at `offset` from `center`, restricted
/// to those the detector actually covered.
pub fn affected_subchannels(
    center: MHz,
    width: ChannelWidth,
    offset: i32,
    is_chirp: bool,
    bonding: &[MHz],
) -> Vec<MHz> {
    let spread = if width == ChannelWidth::Mhz20 {
        offset != 0 && (is_chirp || offset % 10 == 0)
    } else {
        is_chirp || offset % 10 == 0
    };
    let offsets: Vec<i32> = if spread {
        vec![offset - 10, offset, offset + 10]
    } else {
        vec![offset]
    };

    let mut out = Vec::new();
    for freq in offsets
        .into_iter()
        .filter_map(|o| offset_to_subchannel(center, width, o))
    {
        if bonding.contains(&freq) && !out.contains(&freq) {
            out.push(freq);
        }
    }
    out
}

/// Decode a radar report against the channel the detector was tuned to.
///
/// With `subchannel_marking` off the whole detector bandwidth of the segment
/// goes on the NOL.
pub fn decode(
    info: &RadarFoundInfo,
    detector: DetectorChannel<'_>,
    subchannel_marking: bool,
) -> RadarDecode {
    let segment_center = detector.segment_center(info.segment_id);
    let bonding = detector.bonding(info.segment_id);
    let radar_freq = offset_freq(segment_center, info.freq_offset);

    let nol_channels = if subchannel_marking {
        affected_subchannels(
            segment_center,
            detector.width().segment_width(),
            info.freq_offset,
            info.is_chirp,
            &bonding,
        )
    } else {
        bonding
    };

    RadarDecode {
        radar_freq,
        segment_center,
        nol_channels,
    }
}
