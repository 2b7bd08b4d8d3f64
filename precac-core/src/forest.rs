//! PreCAC forest
//!
//! The ordered list of [`PrecacTree`]s for one radio, one per non-overlapping
//! DFS root channel of the regulatory domain. This is the authoritative
//! CAC-state index: every mark, unmark and lookup goes through here.
//!
//! Entry order is the order channels are offered for preCAC. It starts as
//! ascending frequency and is only changed by [`PrecacForest::promote_to_front`].

use log::{debug, info, warn};
use serde::Serialize;

use crate::channel::{
    is_5ghz, is_within_range, is_within_range_strict, subchannels_for_center, ChannelCatalog,
    ChannelWidth, Exclusion, MHz, OperatingChannel, RESTRICTED_165_CENTER_FREQ,
};
use crate::error::PrecacError;
use crate::tree::{NodeState, PrecacTree};

/// preCAC state of a channel as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PrecacChanState {
    Err,
    Required,
    /// Currently being checked by the agile detector
    Now,
    Done,
    Nol,
}

impl From<NodeState> for PrecacChanState {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Required => PrecacChanState::Required,
            NodeState::Done => PrecacChanState::Done,
            NodeState::Nol => PrecacChanState::Nol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PrecacStatus {
    /// No DFS sub-channel anywhere has completed CAC yet
    NoPrecacCompletedChannels,
    CompletedChannel,
    RequiredChannel,
}

/// Parameters of a forest channel search.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRequest {
    pub width: ChannelWidth,
    pub exclusion: Exclusion,
    /// Operator-preferred channel, tried before forest order
    pub desired: Option<MHz>,
}

// =============================================================================
// Entry
// =============================================================================

#[derive(Debug)]
pub struct PrecacEntry {
    center_freq: MHz,
    ieee: u8,
    width: ChannelWidth,
    tree: PrecacTree,
    non_dfs_subchannel_count: u8,
}

impl PrecacEntry {
    fn new(center_freq: MHz, width: ChannelWidth) -> Result<Self, PrecacError> {
        let tree = PrecacTree::build(center_freq, width)?;
        let ieee = tree.root().map(|r| r.ieee()).unwrap_or_default();
        Ok(PrecacEntry {
            center_freq,
            ieee,
            width,
            tree,
            non_dfs_subchannel_count: 0,
        })
    }

    pub fn center_freq(&self) -> MHz {
        self.center_freq
    }

    pub fn ieee(&self) -> u8 {
        self.ieee
    }

    pub fn width(&self) -> ChannelWidth {
        self.width
    }

    pub fn tree(&self) -> &PrecacTree {
        &self.tree
    }

    pub fn non_dfs_subchannel_count(&self) -> u8 {
        self.non_dfs_subchannel_count
    }

    /// 20 MHz sub-channels currently on the NOL.
    pub fn nol_subchannels(&self) -> Vec<MHz> {
        self.tree
            .preorder()
            .into_iter()
            .filter(|n| n.width() == ChannelWidth::Mhz20 && n.nol_subchannels() > 0)
            .map(|n| n.center_freq())
            .collect()
    }

    /// Strictly inside the root's band.
    pub fn contains(&self, freq: MHz) -> bool {
        is_within_range_strict(freq, self.center_freq, self.width.span_mhz() / 2)
    }

    /// Drop sub-channels missing from the catalog, pre-mark the non-DFS ones.
    fn apply_catalog<C: ChannelCatalog + ?Sized>(&mut self, catalog: &C) {
        let leaves: Vec<MHz> = self
            .tree
            .preorder()
            .into_iter()
            .filter(|n| n.width() == ChannelWidth::Mhz20)
            .map(|n| n.center_freq())
            .collect();

        for freq in leaves {
            match catalog.subchannel(freq) {
                None => {
                    self.tree.invalidate_subchannel(freq);
                }
                Some(record) if !record.is_dfs => {
                    if self.tree.mark_cac_done(freq) {
                        self.non_dfs_subchannel_count += 1;
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn caced_dfs_subchannels(&self) -> u8 {
        self.tree
            .root()
            .map(|r| r.caced_subchannels().saturating_sub(self.non_dfs_subchannel_count))
            .unwrap_or_default()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub center_freq: MHz,
    pub ieee: u8,
    pub width: ChannelWidth,
    pub depth: u8,
    pub valid_subchannels: u8,
    pub caced_subchannels: u8,
    pub nol_subchannels: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySnapshot {
    pub center_freq: MHz,
    pub ieee: u8,
    pub width: ChannelWidth,
    pub non_dfs_subchannel_count: u8,
    pub nodes: Vec<NodeSnapshot>,
}

// =============================================================================
// Forest
// =============================================================================

#[derive(Debug, Default)]
pub struct PrecacForest {
    entries: Vec<PrecacEntry>,
}

impl PrecacForest {
    /// Build one entry per maximal DFS channel span of the catalog.
    pub fn build<C: ChannelCatalog + ?Sized>(catalog: &C) -> Self {
        let mut forest = PrecacForest::default();

        let mut candidates: Vec<_> = catalog
            .channels()
            .iter()
            .filter(|c| c.is_dfs && c.width != ChannelWidth::Mhz80P80)
            .collect();
        candidates.sort_by(|a, b| {
            let (a_low, _) = a.edges();
            let (b_low, _) = b.edges();
            a_low
                .cmp(&b_low)
                .then(b.width.span_mhz().cmp(&a.width.span_mhz()))
        });

        let mut last_end: MHz = 0;
        for channel in candidates {
            let (low, high) = channel.edges();
            if low < last_end {
                continue;
            }
            if forest.entries.iter().any(|e| e.center_freq == channel.center_freq) {
                debug!("Skipping duplicate root {} MHz", channel.center_freq);
                continue;
            }

            match PrecacEntry::new(channel.center_freq, channel.width) {
                Ok(mut entry) => {
                    entry.apply_catalog(catalog);
                    info!("Precac entry created: ieee={} bw={}", entry.ieee, entry.width);
                    forest.entries.push(entry);
                    last_end = high;
                }
                Err(e) => warn!("Precac entry for {} MHz skipped: {}", channel.center_freq, e),
            }
        }
        forest
    }

    /// Tear every tree down and rebuild from a (new) catalog.
    pub fn reset<C: ChannelCatalog + ?Sized>(&mut self, catalog: &C) {
        let freed = self.teardown();
        debug!("Precac forest reset, {} nodes freed", freed);
        *self = PrecacForest::build(catalog);
    }

    /// Free all entries. Returns the number of tree nodes freed.
    pub fn teardown(&mut self) -> usize {
        self.entries
            .drain(..)
            .map(|mut entry| entry.tree.teardown())
            .sum()
    }

    pub fn entries(&self) -> &[PrecacEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for(&self, freq: MHz) -> Option<&PrecacEntry> {
        self.entries.iter().find(|e| e.contains(freq))
    }

    fn entry_for_mut(&mut self, freq: MHz) -> Option<&mut PrecacEntry> {
        self.entries.iter_mut().find(|e| e.contains(freq))
    }

    // -------------------------------------------------------------------------
    // Marking
    // -------------------------------------------------------------------------

    pub fn mark_subchannel_cac_done(&mut self, freq: MHz) -> bool {
        match self.entry_for_mut(freq) {
            Some(entry) => entry.tree.mark_cac_done(freq),
            None => false,
        }
    }

    /// Mark every 20 MHz sub-channel of a channel as CAC-done.
    pub fn mark_cac_done(&mut self, center: MHz, secondary: Option<MHz>, width: ChannelWidth) {
        for freq in subchannels_for_center(center, secondary, width) {
            self.mark_subchannel_cac_done(freq);
        }
    }

    pub fn unmark_cac_done(&mut self, center: MHz, secondary: Option<MHz>, width: ChannelWidth) {
        for freq in subchannels_for_center(center, secondary, width) {
            if let Some(entry) = self.entry_for_mut(freq) {
                entry.tree.unmark_cac_done(freq);
            }
        }
    }

    /// Block each 20 MHz sub-channel; returns those that were newly blocked.
    pub fn mark_nol(&mut self, freqs: &[MHz]) -> Vec<MHz> {
        let mut marked = Vec::new();
        for &freq in freqs {
            match self.entry_for_mut(freq) {
                Some(entry) => {
                    if entry.tree.mark_nol(freq) {
                        marked.push(freq);
                    }
                }
                None => debug!("No precac entry for NOL channel {} MHz", freq),
            }
        }
        marked
    }

    pub fn unmark_nol(&mut self, freq: MHz) -> bool {
        match self.entry_for_mut(freq) {
            Some(entry) => entry.tree.unmark_nol(freq),
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Pick the next channel to pre-check: the desired channel if it still
    /// needs CAC, else the leftmost eligible node of the first entry that has
    /// one.
    pub fn find_channel(&self, request: &ChannelRequest) -> Option<MHz> {
        let picked = request
            .desired
            .filter(|&desired| {
                self.entry_for(desired)
                    .and_then(|e| e.tree.find(desired))
                    .is_some_and(|n| {
                        n.width() == request.width && n.needs_cac(request.width, &request.exclusion)
                    })
            })
            .or_else(|| {
                self.entries
                    .iter()
                    .find_map(|e| e.tree.find_channel(request.width, &request.exclusion))
            });

        if let Some(freq) = picked {
            info!("Channel picked for preCAC: {} MHz ({})", freq, request.width);
        }
        picked
    }

    /// Move the entry holding `freq` to the head of the forest.
    pub fn promote_to_front(&mut self, freq: MHz) -> bool {
        match self.entries.iter().position(|e| e.contains(freq)) {
            Some(index) => {
                let entry = self.entries.remove(index);
                self.entries.insert(0, entry);
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn cac_status(&self, freq: MHz) -> bool {
        self.entry_for(freq).is_some_and(|e| e.tree.cac_status(freq))
    }

    pub fn chan_state(&self, freq: MHz) -> PrecacChanState {
        self.entry_for(freq)
            .and_then(|e| e.tree.state_of(freq).ok())
            .map(PrecacChanState::from)
            .unwrap_or(PrecacChanState::Err)
    }

    /// Whether a channel can be switched to without CAC.
    pub fn is_precac_done(&self, chan: &OperatingChannel) -> bool {
        if !is_5ghz(chan.center_freq) {
            return false;
        }
        match chan.width {
            ChannelWidth::Mhz80P80 => {
                let primary_done = !chan.is_dfs || self.cac_status(chan.center_freq);
                match chan.secondary_center {
                    Some(secondary) if chan.secondary_is_dfs && primary_done => {
                        self.cac_status(secondary)
                    }
                    _ => primary_done,
                }
            }
            ChannelWidth::Mhz160 => self.cac_status(chan.center_freq),
            ChannelWidth::Restricted165 => self.cac_status(RESTRICTED_165_CENTER_FREQ),
            _ => self.cac_status(chan.segment1()),
        }
    }

    pub fn precac_status_for_channel(&self, chan: &OperatingChannel) -> PrecacStatus {
        if self.entries.iter().all(|e| e.caced_dfs_subchannels() == 0) {
            PrecacStatus::NoPrecacCompletedChannels
        } else if self.is_precac_done(chan) {
            PrecacStatus::CompletedChannel
        } else {
            PrecacStatus::RequiredChannel
        }
    }

    /// Whether any 20 MHz sub-channel inside `[low, high]` is blocked.
    pub fn has_nol_in_range(&self, low: MHz, high: MHz) -> bool {
        let center = low + (high - low) / 2;
        let half = (high - low) / 2;
        self.entries
            .iter()
            .flat_map(|e| e.tree.preorder())
            .any(|n| {
                n.width() == ChannelWidth::Mhz20
                    && n.nol_subchannels() > 0
                    && is_within_range(n.center_freq(), center, half)
            })
    }

    // -------------------------------------------------------------------------
    // Transfer between radios
    // -------------------------------------------------------------------------

    /// Detach the entries whose root center lies in `[low, high]`. Roots
    /// listed in `keep` stay, e.g. those the receiving forest already has.
    pub fn take_entries_in_range(&mut self, low: MHz, high: MHz, keep: &[MHz]) -> Vec<PrecacEntry> {
        let (taken, kept): (Vec<_>, Vec<_>) = self.entries.drain(..).partition(|e| {
            (low..=high).contains(&e.center_freq) && !keep.contains(&e.center_freq)
        });
        self.entries = kept;
        taken
    }

    /// Append entries moved from another radio, skipping roots already here.
    pub fn adopt_entries(&mut self, entries: Vec<PrecacEntry>) -> usize {
        let mut adopted = 0;
        for entry in entries {
            if self.entries.iter().any(|e| e.center_freq == entry.center_freq) {
                debug!("Precac entry {} MHz already present, dropped", entry.center_freq);
                continue;
            }
            self.entries.push(entry);
            adopted += 1;
        }
        adopted
    }

    // -------------------------------------------------------------------------
    // Dump
    // -------------------------------------------------------------------------

    pub fn dump_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Precac status of all nodes in the list:".to_string(),
            "NOTE: Syntax for each node: <ch_ieee>(<CAC>,<NOL>)".to_string(),
        ];
        for entry in &self.entries {
            lines.extend(entry.tree.dump_lines());
        }
        lines
    }

    pub fn log_dump(&self) {
        for line in self.dump_lines() {
            info!("{}", line);
        }
    }

    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries
            .iter()
            .map(|e| EntrySnapshot {
                center_freq: e.center_freq,
                ieee: e.ieee,
                width: e.width,
                non_dfs_subchannel_count: e.non_dfs_subchannel_count,
                nodes: e
                    .tree
                    .preorder()
                    .into_iter()
                    .map(|n| NodeSnapshot {
                        center_freq: n.center_freq(),
                        ieee: n.ieee(),
                        width: n.width(),
                        depth: n.depth(),
                        valid_subchannels: n.valid_subchannels(),
                        caced_subchannels: n.caced_subchannels(),
                        nol_subchannels: n.nol_subchannels(),
                    })
                    .collect(),
            })
            .collect()
    }
}
