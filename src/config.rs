//! Engine configuration and memory accounting.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::file::Record;

/// Largest supported number of buckets in the levelized priority queue.
pub const MAX_BUCKETS: usize = 4;

/// Configuration options of an [`Engine`][crate::bdd::Engine].
///
/// Use `Config::default()` for standard settings.
///
/// # Examples
///
/// ```
/// use extdd::config::Config;
///
/// let config = Config {
///     memory: 16 << 20,
///     buckets: 2,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory (in bytes) one operation may use for its queues and sorters (default: 64 MiB)
    pub memory: usize,
    /// Number of levels the priority queues keep in buckets ahead of the current one (default: 1)
    pub buckets: usize,
    /// Directory for temporary files (default: system temp directory)
    pub tmp_dir: Option<PathBuf>,
    /// Size (in bytes) of a single I/O block (default: 64 KiB)
    pub block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory: 64 << 20,
            buckets: 1,
            tmp_dir: None,
            block_size: 64 << 10,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.buckets > MAX_BUCKETS {
            return Err(Error::invalid(format!(
                "bucket count {} is larger than {}",
                self.buckets, MAX_BUCKETS
            )));
        }
        // largest record is three words
        if self.block_size < 24 {
            return Err(Error::invalid(format!("block size {} is too small", self.block_size)));
        }
        let needed = self
            .block_size
            .checked_mul(MAX_BUCKETS + 2)
            .ok_or_else(|| Error::invalid(format!("block size {} is too large", self.block_size)))?;
        if self.memory < needed {
            return Err(Error::invalid(format!(
                "memory budget {} cannot hold the queue buckets",
                self.memory
            )));
        }
        Ok(())
    }

    /// Full budget of a single operation.
    pub fn budget(&self) -> MemoryBudget {
        MemoryBudget::new(self.memory, self.block_size)
    }
}

/// A share of the memory an operation may use.
///
/// Budgets are split statically between the stages of one operation and passed
/// into the queue and sorter constructors; nothing is reserved behind their back.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryBudget {
    bytes: usize,
    block_size: usize,
}

impl MemoryBudget {
    pub const fn new(bytes: usize, block_size: usize) -> Self {
        Self { bytes, block_size }
    }

    pub const fn bytes(&self) -> usize {
        self.bytes
    }

    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Splits off `parts` equal shares.
    pub fn split(&self, parts: usize) -> Self {
        Self::new(self.bytes / parts.max(1), self.block_size)
    }

    /// A single I/O block.
    pub fn block(&self) -> Self {
        Self::new(self.block_size.min(self.bytes), self.block_size)
    }

    /// What is left after `blocks` blocks are reserved.
    pub fn without_blocks(&self, blocks: usize) -> Self {
        Self::new(self.bytes.saturating_sub(blocks * self.block_size), self.block_size)
    }

    /// Number of `T` records that fit, at least one.
    pub fn records<T: Record>(&self) -> usize {
        (self.bytes / T::SIZE).max(1)
    }
}
