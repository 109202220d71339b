use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, QuarryError, Result, Timestamp};

/// Access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// Access timestamps, most recent at the back, at most k entries
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Eviction rank: frames with fewer than k accesses have an infinite
    /// backward k-distance and sort before full-history frames; within the
    /// infinite class the earlier most-recent access wins, within the full
    /// class the earlier k-th-most-recent access wins.
    fn rank(&self, k: usize) -> (bool, Timestamp) {
        if self.history.len() < k {
            (false, self.history.back().copied().unwrap_or(0))
        } else {
            (true, self.history.front().copied().unwrap_or(0))
        }
    }
}

#[derive(Debug)]
struct ReplacerState {
    nodes: HashMap<FrameId, LruKNode>,
    num_evictable: usize,
    current_timestamp: Timestamp,
}

/// LRU-K Replacement Policy
///
/// Evicts the frame whose backward k-distance (time since the k-th most
/// recent access) is largest. A frame with fewer than k recorded accesses
/// has an infinite backward k-distance and is preferred for eviction; among
/// those, the one with the earliest most recent access goes first. Equal
/// ranks break deterministically toward the lowest frame id.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                nodes: HashMap::new(),
                num_evictable: 0,
                current_timestamp: 0,
            }),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance and
    /// forgets its history. Returns None if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.num_evictable == 0 {
            return None;
        }

        let victim = state
            .nodes
            .iter()
            .filter(|(_, node)| node.is_evictable)
            .min_by_key(|(frame_id, node)| {
                let (full, ts) = node.rank(self.k);
                (full, ts, frame_id.as_u32())
            })
            .map(|(frame_id, _)| *frame_id)?;

        state.nodes.remove(&victim);
        state.num_evictable -= 1;
        Some(victim)
    }

    /// Records an access to the given frame at the next timestamp, creating
    /// its (non-evictable) tracking node if this is the first access.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        state
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether a frame is evictable. A frame the replacer has never
    /// seen an access for is a caller bug and reported as an error.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) -> Result<()> {
        let mut state = self.state.lock();

        let node = state
            .nodes
            .get_mut(&frame_id)
            .ok_or(QuarryError::FrameNotFound(frame_id))?;

        if node.is_evictable != is_evictable {
            node.is_evictable = is_evictable;
            if is_evictable {
                state.num_evictable += 1;
            } else {
                state.num_evictable -= 1;
            }
        }
        Ok(())
    }

    /// Removes a frame from the replacer entirely. Only evictable frames
    /// may be removed; anything else is a caller bug.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.state.lock();

        match state.nodes.get(&frame_id) {
            None => return Err(QuarryError::FrameNotFound(frame_id)),
            Some(node) if !node.is_evictable => {
                return Err(QuarryError::FrameNotEvictable(frame_id))
            }
            Some(_) => {}
        }

        state.nodes.remove(&frame_id);
        state.num_evictable -= 1;
        Ok(())
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(replacer: &LruKReplacer, id: u32) {
        replacer.record_access(FrameId::new(id));
        replacer.set_evictable(FrameId::new(id), true).unwrap();
    }

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_infinite_distance_fifo() {
        let replacer = LruKReplacer::new(2, 10);

        track(&replacer, 0);
        track(&replacer, 1);
        track(&replacer, 2);

        assert_eq!(replacer.size(), 3);

        // All have a single access (< k=2): infinite distance, earliest
        // most-recent access evicted first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_k_replacer_prefers_infinite_distance() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        // Frame 1 has fewer than k accesses and must go first
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_full_history_order() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0: t=0,1; frame 1: t=2,3; frame 2: t=4,5
        for id in 0..3 {
            replacer.record_access(FrameId::new(id));
            replacer.record_access(FrameId::new(id));
            replacer.set_evictable(FrameId::new(id), true).unwrap();
        }

        // Oldest k-th-most-recent access evicted first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_k_replacer_history_bounded() {
        let replacer = LruKReplacer::new(2, 10);

        // Many accesses to frame 0, then two to frame 1: frame 0's rank is
        // based on its last two accesses only, which predate frame 1's
        for _ in 0..10 {
            replacer.record_access(FrameId::new(0));
        }
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_k_replacer_non_evictable_skipped() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(1), true).unwrap();

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        track(&replacer, 0);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false).unwrap();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_unknown_frame_is_error() {
        let replacer = LruKReplacer::new(2, 10);

        assert!(matches!(
            replacer.set_evictable(FrameId::new(3), true),
            Err(QuarryError::FrameNotFound(_))
        ));
        assert!(matches!(
            replacer.remove(FrameId::new(3)),
            Err(QuarryError::FrameNotFound(_))
        ));
    }

    #[test]
    fn test_lru_k_replacer_remove_non_evictable_is_error() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        assert!(matches!(
            replacer.remove(FrameId::new(0)),
            Err(QuarryError::FrameNotEvictable(_))
        ));

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.remove(FrameId::new(0)).unwrap();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
