//! Page replacement policies for the buffer pool.

use std::collections::VecDeque;
use std::str::FromStr;

use super::error::BufferPoolError;
use super::frame::FrameId;

/// Page replacement policy trait.
///
/// Holds the frames eligible for reuse. A frame is a candidate while its pin
/// count is zero, including frames that have never held a page.
///
/// # Usage Contract
///
/// - `enqueue(frame_id)`: called when a frame becomes idle (pin count 1 → 0)
/// - `remove(frame_id)`: called when an idle frame is pinned again
/// - `dequeue_victim()`: called on a cache miss to pick the frame to reuse
pub trait Replacer: Send + Sync {
    /// Adds a frame to the candidate set.
    fn enqueue(&mut self, frame_id: FrameId);

    /// Removes and returns the next victim, or `None` if no frame is idle.
    fn dequeue_victim(&mut self) -> Option<FrameId>;

    /// Removes a specific frame from the candidate set. No-op if absent.
    fn remove(&mut self, frame_id: FrameId);

    /// Returns whether the frame is currently a candidate.
    fn contains(&self, frame_id: FrameId) -> bool;

    /// Returns the number of candidates.
    fn len(&self) -> usize;

    /// Returns true if no frame is a candidate.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named replacement policies.
///
/// `Clock` is the only one with an implementation; it is served by
/// [`FifoReplacer`]. The others parse so that configuration errors and
/// missing implementations are reported the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    Clock,
    Mru,
    Lru,
    Lh,
}

impl ReplacementPolicy {
    /// Returns the configuration name of this policy.
    pub const fn name(&self) -> &'static str {
        match self {
            ReplacementPolicy::Clock => "Clock",
            ReplacementPolicy::Mru => "MRU",
            ReplacementPolicy::Lru => "LRU",
            ReplacementPolicy::Lh => "LH",
        }
    }

    /// Builds the replacer for this policy, seeded with frames `0..capacity`.
    pub fn build(&self, capacity: usize) -> Result<Box<dyn Replacer>, BufferPoolError> {
        match self {
            ReplacementPolicy::Clock => {
                let mut replacer = FifoReplacer::new(capacity);
                for index in 0..capacity {
                    replacer.enqueue(FrameId::new(index));
                }
                Ok(Box::new(replacer))
            }
            other => Err(BufferPoolError::ReplacerNotFound(other.name().to_string())),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = BufferPoolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Clock" => Ok(ReplacementPolicy::Clock),
            "MRU" => Ok(ReplacementPolicy::Mru),
            "LRU" => Ok(ReplacementPolicy::Lru),
            "LH" => Ok(ReplacementPolicy::Lh),
            _ => Err(BufferPoolError::ReplacerNotFound(name.to_string())),
        }
    }
}

/// Oldest-idle-first replacement.
///
/// Frames are handed out in the order they became idle. There is no
/// reference bit and no second chance; this is what the `Clock` policy name
/// resolves to.
pub struct FifoReplacer {
    /// Idle frames, oldest at the front.
    queue: VecDeque<FrameId>,
}

impl FifoReplacer {
    /// Creates an empty replacer with pre-allocated capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }
}

impl Replacer for FifoReplacer {
    fn enqueue(&mut self, frame_id: FrameId) {
        debug_assert!(
            !self.contains(frame_id),
            "enqueue called on frame already in replacer"
        );
        self.queue.push_back(frame_id);
    }

    fn dequeue_victim(&mut self) -> Option<FrameId> {
        self.queue.pop_front()
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.queue.retain(|&id| id != frame_id);
    }

    fn contains(&self, frame_id: FrameId) -> bool {
        self.queue.contains(&frame_id)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}
