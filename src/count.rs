//! Counting paths and satisfying assignments.
//!
//! Both counts are one top-down sweep: every node forwards the number of ways to
//! reach it to its children through the levelized queue, and partial sums for the
//! same node are added up when it is read. Counts are `u128` and fail with
//! [`Error::Overflow`] instead of wrapping.

use std::cmp::Ordering;

use log::debug;

use crate::bdd::{Bdd, Engine};
use crate::error::{Error, Result};
use crate::file::Record;
use crate::ptr::{Label, Ptr};
use crate::queue::{LevelizedPriorityQueue, QueuePolicy, Sweep};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct PartialSum {
    target: Ptr,
    sum: u128,
}

impl Record for PartialSum {
    const WORDS: usize = 3;

    fn write_words(&self, out: &mut [u64]) {
        out[0] = self.target.raw();
        out[1] = self.sum as u64;
        out[2] = (self.sum >> 64) as u64;
    }

    fn read_words(words: &[u64]) -> Self {
        Self {
            target: Ptr::from_raw(words[0]),
            sum: (words[1] as u128) | ((words[2] as u128) << 64),
        }
    }
}

struct CountPolicy;

impl QueuePolicy for CountPolicy {
    type Item = PartialSum;

    const SWEEP: Sweep = Sweep::TopDown;

    fn level(s: &PartialSum) -> Label {
        s.target.label()
    }

    fn cmp(a: &PartialSum, b: &PartialSum) -> Ordering {
        a.target.cmp(&b.target)
    }
}

fn overflow() -> Error {
    Error::Overflow {
        what: "count",
        max: u128::MAX,
    }
}

/// `2^exp`
fn pow2(exp: u64) -> Result<u128> {
    u32::try_from(exp)
        .ok()
        .and_then(|exp| 1u128.checked_shl(exp))
        .ok_or_else(overflow)
}

fn mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or_else(overflow)
}

fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or_else(overflow)
}

impl Engine {
    /// Number of internal nodes of `f`.
    pub fn node_count(&self, f: &Bdd) -> u64 {
        f.node_count()
    }

    /// Number of paths from the root of `f` to the true terminal.
    pub fn path_count(&self, f: &Bdd) -> Result<u128> {
        debug!("path_count(f = {})", f);
        if let Some(v) = f.sink_value() {
            return Ok(v as u128);
        }
        self.count(f, 1, |_, _| Ok(1))
    }

    /// Number of satisfying assignments of `f` over the variables `0..varcount`.
    pub fn sat_count(&self, f: &Bdd, varcount: u64) -> Result<u128> {
        debug!("sat_count(f = {}, varcount = {})", f, varcount);
        if let Some(v) = f.sink_value() {
            return if v { pow2(varcount) } else { Ok(0) };
        }
        let (min, max) = match (f.file().min_label()?, f.file().max_label()?) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(Error::exhausted("level info")),
        };
        if varcount <= max {
            return Err(Error::invalid(format!(
                "{} variables cannot cover label {}",
                varcount, max
            )));
        }
        // every level skipped by an arc doubles the count
        self.count(f, pow2(min)?, |label, child| {
            if child.is_sink() {
                pow2(varcount - label - 1)
            } else {
                pow2(child.label() - label - 1)
            }
        })
    }

    /// Sweeps `f` summing up the weighted number of ways to reach the true terminal.
    fn count(&self, f: &Bdd, root: u128, weight: impl Fn(Label, Ptr) -> Result<u128>) -> Result<u128> {
        let config = self.config();
        let mut pq = LevelizedPriorityQueue::<CountPolicy>::new(
            config,
            config.budget(),
            vec![f.file().levels(Sweep::TopDown)?],
        )?;
        let mut nodes = f.nodes()?;
        let mut result = 0u128;
        let mut first = true;

        while nodes.can_pull() {
            let n = nodes.pull()?;
            let label = n.label();

            let mut sum = 0u128;
            if first {
                sum = root;
                first = false;
            } else {
                if pq.is_empty() {
                    break;
                }
                if pq.current_layer() != label {
                    pq.setup_next_layer(Some(label))?;
                }
                while matches!(pq.peek(), Some(s) if s.target == n.uid) {
                    sum = add(sum, pq.pull()?.sum)?;
                }
                if sum == 0 {
                    continue;
                }
            }

            for child in [n.low, n.high] {
                if child.is_false() {
                    continue;
                }
                let share = mul(sum, weight(label, child)?)?;
                if child.is_true() {
                    result = add(result, share)?;
                } else {
                    pq.push(PartialSum {
                        target: child,
                        sum: share,
                    })?;
                }
            }
        }

        Ok(result)
    }
}
