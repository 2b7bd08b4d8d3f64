//! PreCAC tree
//!
//! One binary search tree per forest root. Every node is a (center frequency,
//! bandwidth) pair; the leaves are the 20 MHz sub-channels. Each node counts
//! how many of the 20 MHz slices below it exist in the regulatory domain
//! (`valid`), have passed CAC (`caced`) and are blocked by radar (`nol`).
//!
//! ```text
//!                       5570 (160)
//!              ┌────────────┴────────────┐
//!          5530 (80)                 5610 (80)
//!         ┌────┴────┐               ┌────┴────┐
//!     5510 (40) 5550 (40)       5590 (40) 5630 (40)
//!      ┌─┴─┐     ┌─┴─┐           ┌─┴─┐     ┌─┴─┐
//!   5500 5520 5540 5560       5580 5600 5620 5640   (20)
//! ```
//!
//! The shape is fixed once built; only the three counters change.

use log::{debug, error};
use serde::Serialize;

use crate::channel::{
    freq_to_ieee, is_5ghz, is_within_range, ChannelWidth, Exclusion, MHz,
    RESTRICTED_165_CENTER_FREQ, RESTRICTED_165_LEFT_80_CENTER_FREQ,
    RESTRICTED_165_RIGHT_80_CENTER_FREQ,
};
use crate::error::PrecacError;

// =============================================================================
// Offset tables
// =============================================================================

/// First child offset and sibling step for one tree level, relative to the
/// root frequency.
#[derive(Debug, Clone, Copy)]
struct LevelOffset {
    start: i32,
    step: i32,
}

const fn level(start: i32, step: i32) -> LevelOffset {
    LevelOffset { start, step }
}

const OFFSETS_20: [LevelOffset; 1] = [level(0, 20)];
const OFFSETS_40: [LevelOffset; 2] = [level(0, 40), level(-10, 20)];
const OFFSETS_80: [LevelOffset; 3] = [level(0, 80), level(-20, 40), level(-30, 20)];
const OFFSETS_160: [LevelOffset; 4] = [
    level(0, 160),
    level(-40, 80),
    level(-60, 40),
    level(-70, 20),
];

fn offset_table(width: ChannelWidth) -> Result<&'static [LevelOffset], PrecacError> {
    match width {
        ChannelWidth::Mhz20 => Ok(&OFFSETS_20),
        ChannelWidth::Mhz40 => Ok(&OFFSETS_40),
        ChannelWidth::Mhz80 => Ok(&OFFSETS_80),
        ChannelWidth::Mhz160 => Ok(&OFFSETS_160),
        ChannelWidth::Mhz80P80 | ChannelWidth::Restricted165 => {
            Err(PrecacError::InvalidChannelWidth(width.to_string()))
        }
    }
}

// =============================================================================
// Tree node
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    Required,
    Done,
    Nol,
}

#[derive(Debug)]
pub struct TreeNode {
    center_freq: MHz,
    ieee: u8,
    width: ChannelWidth,
    depth: u8,
    valid_subchannels: u8,
    caced_subchannels: u8,
    nol_subchannels: u8,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn new(center_freq: MHz, width: ChannelWidth) -> Self {
        TreeNode {
            center_freq,
            ieee: freq_to_ieee(center_freq),
            width,
            depth: 0,
            valid_subchannels: width.subchannels(),
            caced_subchannels: 0,
            nol_subchannels: 0,
            left: None,
            right: None,
        }
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

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn valid_subchannels(&self) -> u8 {
        self.valid_subchannels
    }

    pub fn caced_subchannels(&self) -> u8 {
        self.caced_subchannels
    }

    pub fn nol_subchannels(&self) -> u8 {
        self.nol_subchannels
    }

    pub fn left(&self) -> Option<&TreeNode> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&TreeNode> {
        self.right.as_deref()
    }

    /// Every valid slice is CAC-done and none is blocked.
    pub fn is_fully_cac_done(&self) -> bool {
        self.valid_subchannels > 0
            && self.caced_subchannels == self.valid_subchannels
            && self.nol_subchannels == 0
    }

    /// Some slices do not exist in the regulatory domain.
    pub fn is_partially_valid(&self) -> bool {
        self.valid_subchannels != self.width.subchannels()
    }

    pub fn state(&self) -> NodeState {
        if self.nol_subchannels > 0 {
            NodeState::Nol
        } else if self.caced_subchannels == self.valid_subchannels {
            NodeState::Done
        } else {
            NodeState::Required
        }
    }

    /// Child on the path toward `freq`.
    pub fn descend(&self, freq: MHz) -> Option<&TreeNode> {
        if freq < self.center_freq {
            self.left.as_deref()
        } else {
            self.right.as_deref()
        }
    }

    fn descend_mut(&mut self, freq: MHz) -> Option<&mut TreeNode> {
        if freq < self.center_freq {
            self.left.as_deref_mut()
        } else {
            self.right.as_deref_mut()
        }
    }

    /// Search the subtree rooted here.
    pub fn find(&self, freq: MHz) -> Option<&TreeNode> {
        let mut cursor = Some(self);
        while let Some(node) = cursor {
            if node.center_freq == freq {
                return Some(node);
            }
            cursor = node.descend(freq);
        }
        None
    }

    /// A segment of the operating channel still counts against this node only
    /// while it is not already CAC-done or blocked.
    fn pcac_required(&self, freq: MHz) -> bool {
        match self.find(freq) {
            Some(node) => {
                !(node.caced_subchannels == node.valid_subchannels || node.nol_subchannels > 0)
            }
            None => false,
        }
    }

    fn excluded_subchannels(&self, exclusion: &Exclusion) -> u8 {
        let half = self.width.span_mhz() / 2;
        exclusion
            .frequencies()
            .filter(|&f| is_within_range(f, self.center_freq, half) && self.pcac_required(f))
            .map(|_| exclusion.width.subchannels())
            .sum()
    }

    /// Whether this node can serve a CAC request of `requested` width once the
    /// operating channel's segments are taken out of the accounting.
    pub fn needs_cac(&self, requested: ChannelWidth, exclusion: &Exclusion) -> bool {
        let excluded = self.excluded_subchannels(exclusion);
        let blocked = self.nol_subchannels + excluded;
        let allowed = self.valid_subchannels.saturating_sub(blocked);
        if allowed < requested.subchannels() {
            return false;
        }
        self.caced_subchannels + blocked < self.valid_subchannels
    }

    /// `<ieee>(<CAC>,<NOL>)`, or `<ieee>(inv)` for partially valid nodes.
    pub fn dump_text(&self) -> String {
        if self.is_partially_valid() {
            format!("{}(inv)", self.ieee)
        } else {
            format!(
                "{}({},{})",
                self.ieee, self.caced_subchannels, self.nol_subchannels
            )
        }
    }
}

// =============================================================================
// Tree
// =============================================================================

#[derive(Debug, Default)]
pub struct PrecacTree {
    root: Option<Box<TreeNode>>,
}

impl PrecacTree {
    /// Build the full hierarchy under `center_freq`, level by level, using the
    /// offset table of `width`.
    pub fn build(center_freq: MHz, width: ChannelWidth) -> Result<Self, PrecacError> {
        let mut tree = PrecacTree::default();
        match width {
            ChannelWidth::Restricted165 => {
                tree.insert(TreeNode::new(RESTRICTED_165_CENTER_FREQ, width))?;
                tree.insert_levels(RESTRICTED_165_LEFT_80_CENTER_FREQ, ChannelWidth::Mhz80)?;
                tree.insert_levels(RESTRICTED_165_RIGHT_80_CENTER_FREQ, ChannelWidth::Mhz80)?;
            }
            _ => {
                let half = width.span_mhz() / 2;
                let low = center_freq.saturating_sub(half);
                let high = center_freq.saturating_add(half);
                if !is_5ghz(low) || !is_5ghz(high) {
                    return Err(PrecacError::TreeBuild {
                        center_freq,
                        width,
                        reason: "outside the 5 GHz band".into(),
                    });
                }
                tree.insert_levels(center_freq, width)?;
            }
        }
        Ok(tree)
    }

    fn insert_levels(&mut self, base: MHz, width: ChannelWidth) -> Result<(), PrecacError> {
        let table = offset_table(width)?;
        let top_step = width.span_mhz() as i32;
        let mut level_width = width;

        for level in table {
            let boundary = level.start + top_step;
            let mut offset = level.start;
            while offset < boundary {
                let freq = (base as i32 + offset) as MHz;
                self.insert(TreeNode::new(freq, level_width))?;
                offset += level.step;
            }
            if let Some(next) = level_width.halved() {
                level_width = next;
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut node: TreeNode) -> Result<(), PrecacError> {
        let mut depth = 0;
        let mut slot = &mut self.root;
        while let Some(existing) = slot {
            if existing.center_freq == node.center_freq {
                return Err(PrecacError::TreeBuild {
                    center_freq: node.center_freq,
                    width: node.width,
                    reason: "duplicate node".into(),
                });
            }
            depth += 1;
            slot = if node.center_freq < existing.center_freq {
                &mut existing.left
            } else {
                &mut existing.right
            };
        }
        node.depth = depth;
        *slot = Some(Box::new(node));
        Ok(())
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_deref()
    }

    pub fn find(&self, freq: MHz) -> Option<&TreeNode> {
        self.root().and_then(|root| root.find(freq))
    }

    /// The 20 MHz leaf for `freq`, if it exists in the regulatory domain.
    fn valid_leaf(&self, freq: MHz) -> Option<&TreeNode> {
        self.find(freq)
            .filter(|n| n.width == ChannelWidth::Mhz20 && n.valid_subchannels > 0)
    }

    /// Walk root to leaf, applying `f` to every node on the path.
    fn walk_mut(&mut self, freq: MHz, mut f: impl FnMut(&mut TreeNode)) {
        let mut cursor = self.root.as_deref_mut();
        while let Some(node) = cursor {
            f(node);
            if node.center_freq == freq {
                break;
            }
            cursor = node.descend_mut(freq);
        }
    }

    /// Drop a leaf from the valid count of every node above it.
    pub fn invalidate_subchannel(&mut self, freq: MHz) -> bool {
        if self.valid_leaf(freq).is_none() {
            return false;
        }
        self.walk_mut(freq, |node| {
            node.valid_subchannels = node.valid_subchannels.saturating_sub(1);
            node.caced_subchannels = node.caced_subchannels.min(node.valid_subchannels);
            node.nol_subchannels = node.nol_subchannels.min(node.valid_subchannels);
        });
        true
    }

    /// Whether the leaf is already counted as CAC-done. Bails out as soon as
    /// a node on the path has no CAC-done slice at all.
    pub fn is_cac_marked(&self, freq: MHz) -> bool {
        let mut cursor = self.root();
        while let Some(node) = cursor {
            if node.caced_subchannels == 0 {
                return false;
            }
            if node.center_freq == freq {
                return true;
            }
            cursor = node.descend(freq);
        }
        false
    }

    pub fn is_nol_marked(&self, freq: MHz) -> bool {
        self.valid_leaf(freq).is_some_and(|n| n.nol_subchannels > 0)
    }

    /// Count a 20 MHz leaf as CAC-done along its path. Returns false when
    /// nothing changed.
    pub fn mark_cac_done(&mut self, freq: MHz) -> bool {
        if self.valid_leaf(freq).is_none() {
            debug!("Skipping CAC mark of {} MHz: not a valid sub-channel", freq);
            return false;
        }
        if self.is_cac_marked(freq) {
            return false;
        }
        self.walk_mut(freq, |node| {
            if node.caced_subchannels < node.valid_subchannels {
                node.caced_subchannels += 1;
            }
        });
        true
    }

    pub fn unmark_cac_done(&mut self, freq: MHz) -> bool {
        if !self.is_cac_marked(freq) || self.valid_leaf(freq).is_none() {
            return false;
        }
        self.walk_mut(freq, |node| {
            node.caced_subchannels = node.caced_subchannels.saturating_sub(1);
        });
        true
    }

    /// Count a 20 MHz leaf as radar-blocked along its path. A prior CAC-done
    /// result for the leaf is withdrawn.
    pub fn mark_nol(&mut self, freq: MHz) -> bool {
        let Some(leaf) = self.valid_leaf(freq) else {
            debug!("Skipping NOL mark of {} MHz: not a valid sub-channel", freq);
            return false;
        };
        if leaf.nol_subchannels >= leaf.valid_subchannels {
            error!("Radar found on an already marked NOL channel {} MHz", freq);
            return false;
        }
        let caced = leaf.caced_subchannels > 0;

        self.walk_mut(freq, |node| {
            if node.nol_subchannels < node.valid_subchannels {
                node.nol_subchannels += 1;
            }
        });
        if caced {
            self.unmark_cac_done(freq);
        }
        true
    }

    pub fn unmark_nol(&mut self, freq: MHz) -> bool {
        if !self.is_nol_marked(freq) {
            return false;
        }
        self.walk_mut(freq, |node| {
            node.nol_subchannels = node.nol_subchannels.saturating_sub(1);
        });
        true
    }

    /// Leftmost node of `requested` width that still needs CAC.
    pub fn find_channel(&self, requested: ChannelWidth, exclusion: &Exclusion) -> Option<MHz> {
        let mut node = self.root()?;
        if !node.needs_cac(requested, exclusion) {
            return None;
        }
        loop {
            if node.width == requested {
                return Some(node.center_freq);
            }
            node = match (node.left(), node.right()) {
                (Some(left), _) if left.needs_cac(requested, exclusion) => left,
                (_, Some(right)) if right.needs_cac(requested, exclusion) => right,
                _ => return None,
            };
        }
    }

    /// Whether the node at `freq` (any width) is fully CAC-done.
    pub fn cac_status(&self, freq: MHz) -> bool {
        self.find(freq).is_some_and(|n| n.is_fully_cac_done())
    }

    pub fn state_of(&self, freq: MHz) -> Result<NodeState, PrecacError> {
        self.find(freq)
            .map(TreeNode::state)
            .ok_or(PrecacError::ChannelNotFound(freq))
    }

    /// Nodes in preorder.
    pub fn preorder(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&TreeNode> = self.root().into_iter().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(right) = node.right() {
                stack.push(right);
            }
            if let Some(left) = node.left() {
                stack.push(left);
            }
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    /// Render the tree, one node per line with a connector line above it.
    pub fn dump_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for node in self.preorder() {
            if node.depth == 0 {
                lines.push(node.dump_text());
                continue;
            }
            let mut prev = String::from("|");
            for _ in 1..node.depth {
                prev.push_str("        |");
            }
            lines.push(prev.clone());
            lines.push(format!("{}------- {}", prev, node.dump_text()));
        }
        lines
    }

    /// Free every node without recursion, one visit per node. Children are
    /// detached onto a work list before their parent is dropped.
    ///
    /// Returns the number of nodes freed.
    pub fn teardown(&mut self) -> usize {
        let mut freed = 0;
        let mut pending: Vec<Box<TreeNode>> = self.root.take().into_iter().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.left.take());
            pending.extend(node.right.take());
            freed += 1;
        }
        freed
    }
}

impl Drop for PrecacTree {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_counters(tree: &PrecacTree) {
        for node in tree.preorder() {
            assert!(node.caced_subchannels() <= node.valid_subchannels());
            assert!(node.nol_subchannels() <= node.valid_subchannels());
            assert!(node.caced_subchannels() + node.nol_subchannels() <= node.valid_subchannels());
        }
    }

    fn leaves(tree: &PrecacTree) -> Vec<MHz> {
        let mut leaves: Vec<MHz> = tree
            .preorder()
            .into_iter()
            .filter(|n| n.width() == ChannelWidth::Mhz20)
            .map(|n| n.center_freq())
            .collect();
        leaves.sort();
        leaves
    }

    #[test]
    fn test_build_80_leaves() {
        let tree = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        assert_eq!(leaves(&tree), vec![5500, 5520, 5540, 5560]);
        assert_eq!(tree.node_count(), 7);

        let other = PrecacTree::build(5210, ChannelWidth::Mhz80).unwrap();
        assert_eq!(leaves(&other), vec![5180, 5200, 5220, 5240]);
    }

    #[test]
    fn test_build_160_shape() {
        let tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        assert_eq!(tree.node_count(), 15);
        let root = tree.root().unwrap();
        assert_eq!(root.center_freq(), 5570);
        assert_eq!(root.left().unwrap().center_freq(), 5530);
        assert_eq!(root.right().unwrap().center_freq(), 5610);
        assert_eq!(tree.find(5640).unwrap().depth(), 3);
        assert_eq!(tree.find(5510).unwrap().width(), ChannelWidth::Mhz40);
    }

    #[test]
    fn test_build_restricted_165() {
        let tree = PrecacTree::build(5730, ChannelWidth::Restricted165).unwrap();
        assert_eq!(tree.node_count(), 15);
        let root = tree.root().unwrap();
        assert_eq!(root.width(), ChannelWidth::Restricted165);
        assert_eq!(root.valid_subchannels(), 8);
        assert_eq!(root.left().unwrap().center_freq(), 5690);
        assert_eq!(root.right().unwrap().center_freq(), 5775);
        assert_eq!(
            leaves(&tree),
            vec![5660, 5680, 5700, 5720, 5745, 5765, 5785, 5805]
        );
        assert_eq!(tree.find(5805).unwrap().depth(), 3);
    }

    #[test]
    fn test_build_rejects_split_width() {
        assert!(matches!(
            PrecacTree::build(5530, ChannelWidth::Mhz80P80),
            Err(PrecacError::InvalidChannelWidth(_))
        ));
    }

    #[test]
    fn test_build_rejects_out_of_band_root() {
        assert!(matches!(
            PrecacTree::build(50, ChannelWidth::Mhz160),
            Err(PrecacError::TreeBuild { center_freq: 50, .. })
        ));
        assert!(PrecacTree::build(65530, ChannelWidth::Mhz80).is_err());
    }

    #[test]
    fn test_mark_cac_done_idempotent() {
        let mut tree = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        assert!(tree.mark_cac_done(5500));
        assert!(!tree.mark_cac_done(5500));

        assert_eq!(tree.root().unwrap().caced_subchannels(), 1);
        assert_eq!(tree.find(5510).unwrap().caced_subchannels(), 1);
        assert_eq!(tree.find(5500).unwrap().caced_subchannels(), 1);
        assert!(tree.is_cac_marked(5500));
        assert!(!tree.is_cac_marked(5520));
        assert_counters(&tree);
    }

    #[test]
    fn test_mark_non_leaf_is_noop() {
        let mut tree = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        assert!(!tree.mark_cac_done(5510));
        assert!(!tree.mark_cac_done(5180));
        assert_eq!(tree.root().unwrap().caced_subchannels(), 0);
    }

    #[test]
    fn test_nol_round_trip() {
        let mut tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        tree.mark_cac_done(5520);
        let before: Vec<(u8, u8)> = tree
            .preorder()
            .iter()
            .map(|n| (n.caced_subchannels(), n.nol_subchannels()))
            .collect();

        assert!(tree.mark_nol(5600));
        assert_eq!(tree.find(5600).unwrap().nol_subchannels(), 1);
        assert_eq!(tree.root().unwrap().nol_subchannels(), 1);
        assert!(tree.unmark_nol(5600));

        let after: Vec<(u8, u8)> = tree
            .preorder()
            .iter()
            .map(|n| (n.caced_subchannels(), n.nol_subchannels()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_nol_withdraws_cac() {
        let mut tree = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        for f in [5500, 5520, 5540, 5560] {
            tree.mark_cac_done(f);
        }
        assert!(tree.cac_status(5530));

        assert!(tree.mark_nol(5520));
        let leaf = tree.find(5520).unwrap();
        assert_eq!(leaf.nol_subchannels(), 1);
        assert_eq!(leaf.caced_subchannels(), 0);
        assert_eq!(tree.root().unwrap().caced_subchannels(), 3);
        assert!(!tree.cac_status(5530));
        assert_eq!(tree.state_of(5530).unwrap(), NodeState::Nol);
        assert_counters(&tree);

        // second radar report on the same leaf changes nothing
        assert!(!tree.mark_nol(5520));
        assert_eq!(tree.root().unwrap().nol_subchannels(), 1);
    }

    #[test]
    fn test_unmark_floor() {
        let mut tree = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        assert!(!tree.unmark_cac_done(5500));
        assert!(!tree.unmark_nol(5500));
        assert_eq!(tree.root().unwrap().caced_subchannels(), 0);
        assert_eq!(tree.root().unwrap().nol_subchannels(), 0);
    }

    #[test]
    fn test_find_channel_leftmost() {
        let mut tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        let none = Exclusion::none();
        assert_eq!(tree.find_channel(ChannelWidth::Mhz80, &none), Some(5530));
        assert_eq!(tree.find_channel(ChannelWidth::Mhz20, &none), Some(5500));
        assert_eq!(tree.find_channel(ChannelWidth::Mhz160, &none), Some(5570));

        for f in [5500, 5520, 5540, 5560] {
            tree.mark_cac_done(f);
        }
        assert_eq!(tree.find_channel(ChannelWidth::Mhz80, &none), Some(5610));

        tree.mark_nol(5620);
        assert_eq!(tree.find_channel(ChannelWidth::Mhz80, &none), None);
        assert_eq!(tree.find_channel(ChannelWidth::Mhz40, &none), Some(5590));
    }

    #[test]
    fn test_needs_cac_with_exclusion() {
        let tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        let exclusion = Exclusion {
            primary: Some(5530),
            secondary: None,
            width: ChannelWidth::Mhz80,
        };
        let root = tree.root().unwrap();
        assert!(root.needs_cac(ChannelWidth::Mhz80, &exclusion));
        assert!(!root.left().unwrap().needs_cac(ChannelWidth::Mhz80, &exclusion));
        assert_eq!(tree.find_channel(ChannelWidth::Mhz80, &exclusion), Some(5610));
        // a 160 request cannot fit around the excluded half
        assert!(!root.needs_cac(ChannelWidth::Mhz160, &exclusion));
    }

    #[test]
    fn test_invalidate_subchannel() {
        let mut tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        assert!(tree.invalidate_subchannel(5640));
        assert_eq!(tree.root().unwrap().valid_subchannels(), 7);
        assert_eq!(tree.find(5610).unwrap().valid_subchannels(), 3);
        assert!(tree.find(5610).unwrap().is_partially_valid());
        assert!(!tree.mark_cac_done(5640));
        assert!(!tree.mark_nol(5640));
    }

    #[test]
    fn test_dump_lines() {
        let mut tree = PrecacTree::build(5510, ChannelWidth::Mhz40).unwrap();
        tree.mark_cac_done(5500);
        let lines = tree.dump_lines();
        assert_eq!(
            lines,
            vec![
                "102(1,0)".to_string(),
                "|".to_string(),
                "|------- 100(1,0)".to_string(),
                "|".to_string(),
                "|------- 104(0,0)".to_string(),
            ]
        );

        let deep = PrecacTree::build(5530, ChannelWidth::Mhz80).unwrap();
        let lines = deep.dump_lines();
        assert_eq!(lines[3], "|        |");
        assert_eq!(lines[4], "|        |------- 100(0,0)");
    }

    #[test]
    fn test_teardown_frees_all() {
        let mut tree = PrecacTree::build(5570, ChannelWidth::Mhz160).unwrap();
        assert_eq!(tree.teardown(), 15);
        assert!(tree.root().is_none());
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.teardown(), 0);
        assert!(!tree.mark_cac_done(5500));
    }

    #[test]
    fn test_teardown_counts_every_shape() {
        for (center, width) in [
            (5500, ChannelWidth::Mhz20),
            (5510, ChannelWidth::Mhz40),
            (5530, ChannelWidth::Mhz80),
            (5250, ChannelWidth::Mhz160),
            (5730, ChannelWidth::Restricted165),
        ] {
            let mut tree = PrecacTree::build(center, width).unwrap();
            let nodes = tree.node_count();
            assert_eq!(tree.teardown(), nodes, "{} MHz / {}", center, width);
        }
    }
}
