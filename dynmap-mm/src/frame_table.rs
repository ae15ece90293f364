//! Per-range frame table
//!
//! Sparse map from page index to the frame that first backed it. Entries are
//! only ever inserted while the range is open; nothing replaces an entry.
//! The map is split into shards so faults on different indices rarely meet
//! on the same lock.

use alloc::vec::Vec;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

use dynmap_api::sync::Mutex;
use dynmap_api::PageIndex;

use crate::frame::Frame;

/// Number of independently locked shards
const SHARDS: usize = 8;

/// Result of [`FrameTable::insert_if_absent`]
#[derive(Debug)]
pub struct InsertOutcome {
    /// Handle on the frame now recorded for the index
    pub frame: Frame,
    /// False if another resolver recorded a frame first
    pub inserted: bool,
}

/// Index to frame record owned by one managed range
pub struct FrameTable {
    shards: [Mutex<HashMap<PageIndex, Frame>>; SHARDS],
}

impl FrameTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            shards: core::array::from_fn(|_| Mutex::new(HashMap::new())),
        }
    }

    fn shard(&self, index: PageIndex) -> &Mutex<HashMap<PageIndex, Frame>> {
        &self.shards[index % SHARDS]
    }

    /// New handle on the frame recorded for `index`
    pub fn get(&self, index: PageIndex) -> Option<Frame> {
        self.shard(index).lock().get(&index).cloned()
    }

    /// Records `frame` for `index` unless an entry already exists.
    ///
    /// The returned handle always refers to the recorded frame. When the
    /// index was already taken, `frame` is dropped after the shard lock is
    /// released, so a losing allocation goes back to its allocator without
    /// holding up other faults.
    pub fn insert_if_absent(&self, index: PageIndex, frame: Frame) -> InsertOutcome {
        let (outcome, loser) = {
            let mut shard = self.shard(index).lock();
            match shard.entry(index) {
                Entry::Occupied(entry) => (
                    InsertOutcome {
                        frame: entry.get().clone(),
                        inserted: false,
                    },
                    Some(frame),
                ),
                Entry::Vacant(entry) => (
                    InsertOutcome {
                        frame: entry.insert(frame).clone(),
                        inserted: true,
                    },
                    None,
                ),
            }
        };
        drop(loser);
        outcome
    }

    /// Removes the entry for `index`, handing the table's handle to the caller
    pub fn remove(&self, index: PageIndex) -> Option<Frame> {
        self.shard(index).lock().remove(&index)
    }

    /// Number of recorded indices
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns true if no index has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded indices in ascending order
    pub fn indices(&self) -> Vec<PageIndex> {
        let mut indices: Vec<PageIndex> = self
            .shards
            .iter()
            .flat_map(|shard| shard.lock().keys().copied().collect::<Vec<_>>())
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Removes every entry and hands the table's handles to the caller.
    ///
    /// Each entry is yielded exactly once; dropping the returned handles
    /// releases the table's references.
    pub fn drain(&self) -> Vec<(PageIndex, Frame)> {
        let mut drained = Vec::new();
        for shard in &self.shards {
            drained.extend(shard.lock().drain());
        }
        drained
    }
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}
