//! External merge sort.
//!
//! Records are collected in memory until the run budget is full, then sorted and
//! spilled to a temporary file. Finalizing merges the runs, in several passes if
//! there are more of them than the merge budget has blocks for. If nothing was
//! spilled, the sort never touches the disk.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use log::trace;

use crate::config::MemoryBudget;
use crate::error::{Error, Result};
use crate::file::{Direction, RawFile, Record, RecordStream};

pub type Compare<T> = fn(&T, &T) -> Ordering;

/// Number of runs one merge pass may read at once: one block each.
pub(crate) fn fan_in(budget: MemoryBudget) -> usize {
    (budget.bytes() / budget.block_size().max(1)).max(2)
}

/// Front record of a run. Ties go to the older run.
struct Head<T> {
    item: T,
    run: usize,
    cmp: Compare<T>,
}

// BinaryHeap is a max-heap, so the order is reversed to pop the smallest record.
impl<T> Ord for Head<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&other.item, &self.item).then_with(|| other.run.cmp(&self.run))
    }
}

impl<T> PartialOrd for Head<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Head<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Head<T> {}

struct Run<T> {
    // keeps the temp path alive while it is read
    _file: RawFile<T>,
    stream: RecordStream<T>,
}

/// Sorted runs read in lockstep. A run is closed and deleted once drained.
pub(crate) struct Merge<T: Record> {
    cmp: Compare<T>,
    runs: Vec<Option<Run<T>>>,
    heads: BinaryHeap<Head<T>>,
}

impl<T: Record> Merge<T> {
    pub(crate) fn new(cmp: Compare<T>) -> Self {
        Self {
            cmp,
            runs: Vec::new(),
            heads: BinaryHeap::new(),
        }
    }

    /// Number of runs that still have records.
    pub(crate) fn live_runs(&self) -> usize {
        self.heads.len()
    }

    pub(crate) fn add(&mut self, file: RawFile<T>, block_size: usize) -> Result<()> {
        let mut stream = file.stream(Direction::Forward, block_size)?;
        if !stream.can_pull() {
            return Ok(());
        }
        let item = stream.pull()?;
        let run = self.runs.len();
        self.heads.push(Head {
            item,
            run,
            cmp: self.cmp,
        });
        self.runs.push(Some(Run { _file: file, stream }));
        Ok(())
    }

    pub(crate) fn peek(&self) -> Option<T> {
        self.heads.peek().map(|h| h.item)
    }

    pub(crate) fn pull(&mut self) -> Result<Option<T>> {
        let Some(head) = self.heads.pop() else {
            return Ok(None);
        };
        let run = head.run;
        let next = match &mut self.runs[run] {
            Some(r) if r.stream.can_pull() => Some(r.stream.pull()?),
            _ => None,
        };
        match next {
            Some(item) => self.heads.push(Head {
                item,
                run,
                cmp: self.cmp,
            }),
            None => self.runs[run] = None,
        }
        Ok(Some(head.item))
    }

    /// Writes everything left into one new run.
    pub(crate) fn drain_into_run(&mut self, dir: Option<&Path>) -> Result<RawFile<T>> {
        let out = RawFile::create(dir)?;
        let mut writer = out.append()?;
        while let Some(item) = self.pull()? {
            writer.push(&item)?;
        }
        out.commit(writer)?;
        Ok(out)
    }
}

enum Output<T: Record> {
    /// Sorted in reverse, next item at the end.
    Memory(Vec<T>),
    Merge(Merge<T>),
}

pub struct Sorter<T: Record> {
    cmp: Compare<T>,
    capacity: usize,
    block_size: usize,
    tmp_dir: Option<PathBuf>,
    buffer: Vec<T>,
    runs: Vec<RawFile<T>>,
    output: Option<Output<T>>,
    len: u64,
}

impl<T: Record> Sorter<T> {
    /// Creates a sorter keeping at most `budget` worth of records in memory while collecting.
    pub fn new(cmp: Compare<T>, budget: MemoryBudget, tmp_dir: Option<PathBuf>) -> Self {
        Self {
            cmp,
            capacity: budget.records::<T>(),
            block_size: budget.block_size(),
            tmp_dir,
            buffer: Vec::new(),
            runs: Vec::new(),
            output: None,
            len: 0,
        }
    }

    /// Number of records pushed.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.output.is_some()
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        debug_assert!(!self.is_finalized(), "push after finalize");
        self.buffer.push(item);
        self.len += 1;
        if self.buffer.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let cmp = self.cmp;
        self.buffer.sort_by(cmp);
        let run = RawFile::create(self.tmp_dir.as_deref())?;
        run.write_all(self.buffer.drain(..))?;
        trace!("sorter spilled run {} of {} records", self.runs.len(), run.len());
        self.runs.push(run);
        Ok(())
    }

    /// Sorts everything pushed so far. `budget` is what the merge phase may use.
    pub fn finalize(&mut self, budget: MemoryBudget) -> Result<()> {
        if self.is_finalized() {
            return Ok(());
        }
        let cmp = self.cmp;
        if self.runs.is_empty() {
            let mut items = std::mem::take(&mut self.buffer);
            items.sort_by(|a, b| cmp(b, a));
            self.output = Some(Output::Memory(items));
            return Ok(());
        }
        if !self.buffer.is_empty() {
            self.spill()?;
        }
        self.buffer = Vec::new();

        let fan_in = fan_in(budget);
        let mut runs = std::mem::take(&mut self.runs);
        while runs.len() > fan_in {
            trace!("sorter merging {} runs, {} at a time", runs.len(), fan_in);
            let mut merged = Vec::with_capacity(runs.len().div_ceil(fan_in));
            let mut rest = runs.into_iter().peekable();
            while rest.peek().is_some() {
                let mut merge = Merge::new(cmp);
                for run in rest.by_ref().take(fan_in) {
                    merge.add(run, self.block_size)?;
                }
                merged.push(merge.drain_into_run(self.tmp_dir.as_deref())?);
            }
            runs = merged;
        }

        let block = budget.split(runs.len()).bytes().max(self.block_size);
        let mut merge = Merge::new(cmp);
        for run in runs {
            merge.add(run, block)?;
        }
        self.output = Some(Output::Merge(merge));
        Ok(())
    }

    pub fn can_pull(&self) -> bool {
        match &self.output {
            None => false,
            Some(Output::Memory(items)) => !items.is_empty(),
            Some(Output::Merge(merge)) => merge.live_runs() > 0,
        }
    }

    pub fn peek(&self) -> Result<T> {
        match &self.output {
            Some(Output::Memory(items)) => items.last().copied().ok_or_else(not_ready),
            Some(Output::Merge(merge)) => merge.peek().ok_or_else(not_ready),
            None => Err(not_ready()),
        }
    }

    pub fn pull(&mut self) -> Result<T> {
        match &mut self.output {
            Some(Output::Memory(items)) => items.pop().ok_or_else(not_ready),
            Some(Output::Merge(merge)) => merge.pull()?.ok_or_else(not_ready),
            None => Err(not_ready()),
        }
    }
}

fn not_ready() -> Error {
    Error::exhausted("sorter")
}
