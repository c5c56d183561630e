//! Priority queue that spills to disk.
//!
//! Pushed records collect in an in-memory heap. When the heap is full its
//! content is written out as one sorted run, and the smallest record is the
//! smaller of the heap top and the front of the runs. When there are more runs
//! than the budget has blocks for, they are merged into one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

use log::trace;

use crate::config::MemoryBudget;
use crate::error::Result;
use crate::file::{RawFile, Record};
use crate::sorter::{fan_in, Compare, Merge};

struct Entry<T> {
    item: T,
    cmp: Compare<T>,
}

// BinaryHeap is a max-heap, so the order is reversed to pop the smallest record.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&other.item, &self.item)
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

pub struct ExternalHeap<T: Record> {
    cmp: Compare<T>,
    capacity: usize,
    block_size: usize,
    fan_in: usize,
    tmp_dir: Option<PathBuf>,
    memory: BinaryHeap<Entry<T>>,
    runs: Merge<T>,
    spilled: u64,
    len: u64,
}

impl<T: Record> ExternalHeap<T> {
    /// Half of `budget` holds the in-memory heap, the other half the blocks of the runs.
    pub fn new(cmp: Compare<T>, budget: MemoryBudget, tmp_dir: Option<PathBuf>) -> Self {
        let half = budget.split(2);
        Self {
            cmp,
            capacity: half.records::<T>(),
            block_size: budget.block_size(),
            fan_in: fan_in(half),
            tmp_dir,
            memory: BinaryHeap::new(),
            runs: Merge::new(cmp),
            spilled: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records written to disk so far.
    pub fn spilled(&self) -> u64 {
        self.spilled
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        self.memory.push(Entry { item, cmp: self.cmp });
        self.len += 1;
        if self.memory.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    pub fn peek(&self) -> Option<T> {
        match (self.memory.peek(), self.runs.peek()) {
            (Some(m), Some(r)) => Some(if (self.cmp)(&r, &m.item) == Ordering::Less { r } else { m.item }),
            (Some(m), None) => Some(m.item),
            (None, r) => r,
        }
    }

    pub fn pop(&mut self) -> Result<Option<T>> {
        let from_runs = match (self.memory.peek(), self.runs.peek()) {
            (Some(m), Some(r)) => (self.cmp)(&r, &m.item) == Ordering::Less,
            (None, Some(_)) => true,
            _ => false,
        };
        let item = if from_runs {
            self.runs.pull()?
        } else {
            self.memory.pop().map(|e| e.item)
        };
        if item.is_some() {
            self.len -= 1;
        }
        Ok(item)
    }

    fn spill(&mut self) -> Result<()> {
        let run = RawFile::create(self.tmp_dir.as_deref())?;
        let mut writer = run.append()?;
        while let Some(e) = self.memory.pop() {
            writer.push(&e.item)?;
        }
        run.commit(writer)?;
        self.spilled += run.len();
        self.runs.add(run, self.block_size)?;

        if self.runs.live_runs() > self.fan_in {
            trace!("heap merging {} runs", self.runs.live_runs());
            let merged = self.runs.drain_into_run(self.tmp_dir.as_deref())?;
            self.runs = Merge::new(self.cmp);
            self.runs.add(merged, self.block_size)?;
        }
        Ok(())
    }
}
