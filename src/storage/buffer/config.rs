//! Buffer pool configuration.

use super::error::BufferPoolError;
use super::replacer::ReplacementPolicy;

/// Configuration for the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames in the buffer pool.
    ///
    /// This is the maximum number of pages cached at once. Common values:
    /// - 128 frames = 1MB (for testing)
    /// - 1024 frames = 8MB (small database)
    /// - 131072 frames = 1GB (production)
    pub capacity: usize,

    /// Name of the replacement policy. Only `"Clock"` is implemented.
    pub policy: String,

    /// When set, `new_pages` zero-fills the frame of the page it just
    /// allocated instead of reading it back from storage.
    ///
    /// `pin(id, true)` is not affected: the pool cannot know whether an
    /// arbitrary id exists in storage, so every other miss reads. Off by
    /// default.
    pub zero_fill_fresh: bool,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1024, // 1024 * 8KB = 8MB
            policy: ReplacementPolicy::Clock.name().to_string(),
            zero_fill_fresh: false,
        }
    }
}

impl BufferPoolConfig {
    /// Default configuration with `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn policy(mut self, name: impl Into<String>) -> Self {
        self.policy = name.into();
        self
    }

    pub fn zero_fill_fresh(mut self, enabled: bool) -> Self {
        self.zero_fill_fresh = enabled;
        self
    }

    /// Checks the capacity and resolves the policy name.
    pub fn validate(&self) -> Result<ReplacementPolicy, BufferPoolError> {
        if self.capacity == 0 {
            return Err(BufferPoolError::InvalidCapacity);
        }
        self.policy.parse()
    }
}
