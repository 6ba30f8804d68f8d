//! LRU-K eviction policy, approximated with two ordered tiers.
//!
//! True LRU-K ranks frames by backward k-distance, which needs the k most
//! recent access timestamps per frame. This implementation uses the standard
//! practical simplification: frames with fewer than `k` recorded accesses
//! live in a **history tier** ordered by first access (FIFO), frames with at
//! least `k` accesses live in a **cache tier** ordered by recency (LRU).
//! Eviction drains the history tier before it ever touches the cache tier,
//! so cold, old frames go first. All list operations are O(1) amortized.

use hashlink::LinkedHashMap;

use crate::common::{Error, FrameId, Result};

/// Per-frame bookkeeping, indexed by frame id.
#[derive(Clone, Default)]
struct FrameState {
    /// Accesses recorded since the frame was last evicted/removed.
    use_count: usize,
    /// Eligibility for eviction, independent of access history.
    evictable: bool,
}

/// Two-tier LRU-K replacer.
///
/// Frames enter the history tier on their first recorded access and stay
/// there, in first-access order, until their `k`-th access promotes them to
/// the cache tier. Within the history tier re-accesses do not reorder;
/// within the cache tier every access moves the frame to the MRU end.
///
/// The replacer has no lock of its own here: the buffer pool calls in with
/// its bookkeeping lock held and the replacer never calls back out.
pub struct LruKReplacer {
    /// Frames with `1 <= use_count < k`, oldest first-access at the front.
    history: LinkedHashMap<FrameId, ()>,
    /// Frames with `use_count >= k`, least recently used at the front.
    cache: LinkedHashMap<FrameId, ()>,
    /// Per-frame state, indexed by frame id.
    frames: Vec<FrameState>,
    /// Number of frames currently marked evictable.
    evictable_count: usize,
    /// Promotion threshold.
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer tracking `num_frames` frames with threshold `k`.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            history: LinkedHashMap::new(),
            cache: LinkedHashMap::new(),
            frames: vec![FrameState::default(); num_frames],
            evictable_count: 0,
            k,
        }
    }

    /// Record an access to a frame.
    ///
    /// The `k`-th access moves the frame from the history tier to the MRU
    /// end of the cache tier; later accesses refresh its cache position.
    /// Accesses below `k` never reorder the history tier.
    ///
    /// # Errors
    /// `Error::InvalidFrameId` if `frame_id` is outside the pool's range.
    pub fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        let state = self
            .frames
            .get_mut(frame_id.0)
            .ok_or(Error::InvalidFrameId(frame_id.0))?;

        state.use_count += 1;

        if state.use_count == self.k {
            self.history.remove(&frame_id);
            self.cache.insert(frame_id, ());
        } else if state.use_count > self.k {
            // re-splice to the MRU end
            self.cache.remove(&frame_id);
            self.cache.insert(frame_id, ());
        } else if !self.history.contains_key(&frame_id) {
            self.history.insert(frame_id, ());
        }

        Ok(())
    }

    /// Mark a frame eligible or ineligible for eviction.
    ///
    /// A no-op if the frame has never been accessed, or if the flag already
    /// has the requested value; otherwise the evictable count moves by
    /// exactly one.
    ///
    /// # Errors
    /// `Error::InvalidFrameId` if `frame_id` is outside the pool's range.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> Result<()> {
        let state = self
            .frames
            .get_mut(frame_id.0)
            .ok_or(Error::InvalidFrameId(frame_id.0))?;

        if state.use_count == 0 {
            return Ok(());
        }

        if state.evictable != evictable {
            state.evictable = evictable;
            if evictable {
                self.evictable_count += 1;
            } else {
                self.evictable_count -= 1;
            }
        }

        Ok(())
    }

    /// Select and claim a victim frame, or `None` if nothing is evictable.
    ///
    /// Scans the history tier oldest-first, then the cache tier LRU-first,
    /// returning the first evictable frame. The victim's bookkeeping is
    /// fully reset: access count back to zero, dropped from its tier, no
    /// longer evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        let victim = self
            .history
            .keys()
            .chain(self.cache.keys())
            .copied()
            .find(|id| self.frames[id.0].evictable)?;

        self.history.remove(&victim);
        self.cache.remove(&victim);
        self.frames[victim.0] = FrameState::default();
        self.evictable_count -= 1;

        Some(victim)
    }

    /// Forcibly drop a frame's bookkeeping (page deleted rather than
    /// evicted).
    ///
    /// A no-op if the frame is out of range or not currently evictable.
    pub fn remove(&mut self, frame_id: FrameId) {
        match self.frames.get(frame_id.0) {
            Some(state) if state.evictable => {}
            _ => return,
        }

        self.history.remove(&frame_id);
        self.cache.remove(&frame_id);
        self.frames[frame_id.0] = FrameState::default();
        self.evictable_count -= 1;
    }

    /// Number of frames currently marked evictable.
    pub fn size(&self) -> usize {
        self.evictable_count
    }
}
