//! Levelized bucket priority queue.
//!
//! Every sweep over a diagram processes one level at a time and only ever sends
//! work to levels it has not reached yet. The queue exploits that: requests for
//! the next `K` levels go into per-level bucket sorters, everything further away
//! into an overflow heap that spills to disk. A bucket is sorted only when it
//! reaches the front.
//!
//! | state        | holds                                          |
//! |--------------|------------------------------------------------|
//! | front bucket | sorted requests of the current level           |
//! | next buckets | unsorted requests of the following `K` levels  |
//! | overflow     | requests of any later level                    |
//!
//! Levels are known in advance from the level info of the inputs, merged by a
//! [`LevelMerger`]. The queue takes all of them at construction, so nothing can
//! be pushed before the levels are known.

use std::cmp::Ordering;
use std::path::PathBuf;

use log::trace;

use crate::config::{Config, MemoryBudget};
use crate::error::{Error, Result};
use crate::file::{Record, RecordStream};
use crate::heap::ExternalHeap;
use crate::node::LevelInfo;
use crate::ptr::Label;
use crate::sorter::Sorter;

/// Order in which a sweep visits levels.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sweep {
    /// Root first, ascending labels.
    TopDown,
    /// Deepest level first, descending labels.
    BottomUp,
}

impl Sweep {
    /// Whether level `a` is visited strictly before level `b`.
    pub fn precedes(self, a: Label, b: Label) -> bool {
        match self {
            Sweep::TopDown => a < b,
            Sweep::BottomUp => a > b,
        }
    }
}

/// Request type, level key and intra-level order of one queue.
///
/// `cmp` must agree with the sweep: if two requests are on different levels,
/// the one on the earlier level compares less.
pub trait QueuePolicy {
    type Item: Record;

    const SWEEP: Sweep;

    fn level(item: &Self::Item) -> Label;
    fn cmp(a: &Self::Item, b: &Self::Item) -> Ordering;
}

/// Merges several level-info streams, each already in sweep order, into one
/// cursor over the distinct labels.
pub struct LevelMerger {
    sweep: Sweep,
    streams: Vec<RecordStream<LevelInfo>>,
    heads: Vec<Option<Label>>,
}

impl LevelMerger {
    pub fn new(sweep: Sweep, mut streams: Vec<RecordStream<LevelInfo>>) -> Result<Self> {
        let mut heads = Vec::with_capacity(streams.len());
        for s in streams.iter_mut() {
            heads.push(if s.can_pull() { Some(s.pull()?.label) } else { None });
        }
        Ok(Self { sweep, streams, heads })
    }

    pub fn can_pull(&self) -> bool {
        self.heads.iter().any(Option::is_some)
    }

    pub fn peek(&self) -> Option<Label> {
        let sweep = self.sweep;
        self.heads
            .iter()
            .flatten()
            .copied()
            .reduce(|a, b| if sweep.precedes(b, a) { b } else { a })
    }

    pub fn pull(&mut self) -> Result<Label> {
        let label = self.peek().ok_or_else(|| Error::exhausted("level merger"))?;
        let sweep = self.sweep;
        for (s, head) in self.streams.iter_mut().zip(self.heads.iter_mut()) {
            if *head == Some(label) {
                *head = if s.can_pull() { Some(s.pull()?.label) } else { None };
                debug_assert!(
                    head.map_or(true, |h| sweep.precedes(label, h)),
                    "level stream out of order"
                );
            }
        }
        Ok(label)
    }
}

/// Order of all requests of the sweep, level first.
fn order<P: QueuePolicy>(a: &P::Item, b: &P::Item) -> Ordering {
    let (la, lb) = (P::level(a), P::level(b));
    if la == lb {
        P::cmp(a, b)
    } else if P::SWEEP.precedes(la, lb) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

pub struct LevelizedPriorityQueue<P: QueuePolicy> {
    buckets: usize,
    merger: LevelMerger,
    labels: Vec<Label>,
    sorters: Vec<Sorter<P::Item>>,
    front: usize,
    back: usize,
    next_from_bucket: Option<P::Item>,
    overflow: ExternalHeap<P::Item>,
    size: u64,
    bucket_budget: MemoryBudget,
    active_budget: MemoryBudget,
    tmp_dir: Option<PathBuf>,
}

impl<P: QueuePolicy> LevelizedPriorityQueue<P> {
    /// Creates a queue over the union of the levels in `levels`.
    ///
    /// Each stream must yield its level info in the order of `P::SWEEP`.
    pub fn new(config: &Config, budget: MemoryBudget, levels: Vec<RecordStream<LevelInfo>>) -> Result<Self> {
        let buckets = config.buckets;
        let bucket_budget = budget.block();
        let rest = budget.without_blocks(buckets);
        let active_budget = rest.split(2);
        let merger = LevelMerger::new(P::SWEEP, levels)?;
        let sorters = (0..=buckets)
            .map(|_| Sorter::new(P::cmp, bucket_budget, config.tmp_dir.clone()))
            .collect();
        let mut pq = Self {
            buckets,
            merger,
            labels: vec![0; buckets + 1],
            sorters,
            front: 0,
            back: 0,
            next_from_bucket: None,
            overflow: ExternalHeap::new(order::<P>, rest.split(2), config.tmp_dir.clone()),
            size: 0,
            bucket_budget,
            active_budget,
            tmp_dir: config.tmp_dir.clone(),
        };
        if pq.merger.can_pull() {
            let label = pq.merger.pull()?;
            pq.setup_bucket(0, label);
            while pq.back < buckets && pq.merger.can_pull() {
                pq.back += 1;
                let label = pq.merger.pull()?;
                pq.setup_bucket(pq.back, label);
            }
        }
        if buckets > 0 {
            pq.calc_front_bucket()?;
        }
        Ok(pq)
    }

    /// Label of the level whose requests are currently released.
    pub fn current_layer(&self) -> Label {
        self.labels[self.front]
    }

    /// Number of requests in the queue, on all levels.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn push(&mut self, item: P::Item) -> Result<()> {
        let label = P::level(&item);
        debug_assert!(
            !P::SWEEP.precedes(label, self.current_layer()),
            "push to level {} which was already passed (current {})",
            label,
            self.current_layer()
        );
        self.size += 1;
        for b in 1..=self.active_buckets() {
            let idx = (self.front + b) % (self.buckets + 1);
            if self.labels[idx] == label {
                return self.sorters[idx].push(item);
            }
        }
        self.overflow.push(item)
    }

    /// Whether a request of the current level is available.
    pub fn can_pull(&self) -> bool {
        self.next_from_bucket.is_some() || self.overflow_at_current()
    }

    /// Whether the current level has been drained.
    pub fn empty_layer(&self) -> bool {
        !self.can_pull()
    }

    /// Next request of the current level, if any.
    pub fn peek(&self) -> Option<P::Item> {
        if self.take_overflow() {
            self.overflow.peek()
        } else {
            self.next_from_bucket
        }
    }

    pub fn pull(&mut self) -> Result<P::Item> {
        if self.take_overflow() {
            let item = self.overflow.pop()?.ok_or_else(|| Error::exhausted("priority queue"))?;
            self.size -= 1;
            return Ok(item);
        }
        let item = self
            .next_from_bucket
            .take()
            .ok_or_else(|| Error::exhausted("priority queue"))?;
        self.size -= 1;
        let sorter = &mut self.sorters[self.front];
        if sorter.can_pull() {
            self.next_from_bucket = Some(sorter.pull()?);
        }
        Ok(item)
    }

    pub fn has_next_layer(&self) -> bool {
        if self.buckets == 0 {
            !self.overflow.is_empty()
        } else {
            self.size > 0 && self.has_next_bucket()
        }
    }

    /// Moves to the next level that has requests.
    ///
    /// With a `stop` label the queue does not move past that level, even if it
    /// has no requests there; the caller then sees an empty layer.
    pub fn setup_next_layer(&mut self, stop: Option<Label>) -> Result<()> {
        debug_assert!(!self.can_pull(), "current layer is not drained");

        if self.buckets == 0 {
            while self.merger.can_pull() {
                if self.overflow_at_current() {
                    break;
                }
                if let Some(stop) = stop {
                    if !P::SWEEP.precedes(self.labels[0], stop) {
                        break;
                    }
                }
                self.labels[0] = self.merger.pull()?;
            }
            trace!("queue moved to layer {}", self.labels[0]);
            return Ok(());
        }

        let mut b = 0;
        while b <= self.buckets
            && self.next_from_bucket.is_none()
            && self.has_next_bucket()
            && self.overflow_not_before(self.next_bucket_label())
            && stop.map_or(true, |s| !P::SWEEP.precedes(s, self.next_bucket_label()))
        {
            self.setup_next_bucket()?;
            self.calc_front_bucket()?;
            b += 1;
        }

        if self.next_from_bucket.is_none() && self.has_next_bucket() {
            let top = self.overflow.peek().map(|item| P::level(&item));
            let stop_label = match (stop, top) {
                (Some(s), Some(t)) if P::SWEEP.precedes(s, t) => Some(s),
                (_, Some(t)) => Some(t),
                (s, None) => s,
            };
            if let Some(stop_label) = stop_label {
                if P::SWEEP.precedes(self.current_layer(), stop_label) {
                    // every bucket before the stop label is empty, skip them
                    self.setup_next_bucket()?;
                    while self.has_next_bucket() && P::SWEEP.precedes(self.current_layer(), stop_label) {
                        if self.merger.can_pull() {
                            let label = self.merger.pull()?;
                            self.setup_bucket(self.front, label);
                            self.back = self.front;
                        }
                        self.front = (self.front + 1) % (self.buckets + 1);
                    }
                    self.calc_front_bucket()?;
                }
            }
        }
        trace!("queue moved to layer {}", self.current_layer());
        Ok(())
    }

    fn take_overflow(&self) -> bool {
        match (self.overflow.peek(), &self.next_from_bucket) {
            (Some(top), Some(next)) => P::level(&top) == self.current_layer() && P::cmp(&top, next) == Ordering::Less,
            (Some(top), None) => P::level(&top) == self.current_layer(),
            (None, _) => false,
        }
    }

    fn overflow_at_current(&self) -> bool {
        self.overflow
            .peek()
            .map_or(false, |top| P::level(&top) == self.current_layer())
    }

    /// True if the overflow has nothing due before `label`.
    fn overflow_not_before(&self, label: Label) -> bool {
        self.overflow
            .peek()
            .map_or(true, |top| !P::SWEEP.precedes(P::level(&top), label))
    }

    fn has_next_bucket(&self) -> bool {
        self.front != self.back
    }

    fn next_bucket_label(&self) -> Label {
        self.labels[(self.front + 1) % (self.buckets + 1)]
    }

    fn active_buckets(&self) -> usize {
        if self.front <= self.back {
            self.back - self.front
        } else {
            self.buckets + 1 - self.front + self.back
        }
    }

    fn setup_bucket(&mut self, idx: usize, label: Label) {
        self.labels[idx] = label;
        self.sorters[idx] = Sorter::new(P::cmp, self.bucket_budget, self.tmp_dir.clone());
    }

    fn setup_next_bucket(&mut self) -> Result<()> {
        if self.merger.can_pull() {
            let label = self.merger.pull()?;
            self.setup_bucket(self.front, label);
            self.back = self.front;
        }
        self.front = (self.front + 1) % (self.buckets + 1);
        Ok(())
    }

    fn calc_front_bucket(&mut self) -> Result<()> {
        let sorter = &mut self.sorters[self.front];
        sorter.finalize(self.active_budget)?;
        self.next_from_bucket = if sorter.can_pull() { Some(sorter.pull()?) } else { None };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::file::{impl_record, Direction, RawFile};

    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    struct Request {
        label: Label,
        value: u64,
    }

    impl_record!(Request { label, value });

    struct TopDown;

    impl QueuePolicy for TopDown {
        type Item = Request;
        const SWEEP: Sweep = Sweep::TopDown;

        fn level(item: &Request) -> Label {
            item.label
        }

        fn cmp(a: &Request, b: &Request) -> Ordering {
            (a.label, a.value).cmp(&(b.label, b.value))
        }
    }

    struct BottomUp;

    impl QueuePolicy for BottomUp {
        type Item = Request;
        const SWEEP: Sweep = Sweep::BottomUp;

        fn level(item: &Request) -> Label {
            item.label
        }

        fn cmp(a: &Request, b: &Request) -> Ordering {
            (b.label, b.value).cmp(&(a.label, a.value))
        }
    }

    fn levels(labels: &[Label]) -> RawFile<LevelInfo> {
        let file = RawFile::create(None).unwrap();
        file.write_all(labels.iter().map(|&l| LevelInfo::new(l, 1))).unwrap();
        file
    }

    fn config(buckets: usize) -> Config {
        Config {
            buckets,
            ..Config::default()
        }
    }

    // 16-byte blocks make every bucket spill after one record
    fn tiny() -> MemoryBudget {
        MemoryBudget::new(16 * 64, 16)
    }

    fn drain_layer<P: QueuePolicy<Item = Request>>(pq: &mut LevelizedPriorityQueue<P>) -> Vec<u64> {
        let mut out = Vec::new();
        while pq.can_pull() {
            let r = pq.pull().unwrap();
            assert_eq!(r.label, pq.current_layer());
            out.push(r.value);
        }
        out
    }

    fn push_all<P: QueuePolicy<Item = Request>>(pq: &mut LevelizedPriorityQueue<P>, items: &[(Label, u64)]) {
        for &(label, value) in items {
            pq.push(Request { label, value }).unwrap();
        }
    }

    #[test]
    fn test_levels_in_order() {
        for buckets in 0..=4 {
            let file = levels(&[0, 1, 2, 3, 4, 5]);
            let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(buckets), tiny(), streams).unwrap();
            assert_eq!(pq.current_layer(), 0);
            push_all(&mut pq, &[(3, 7), (1, 4), (5, 1), (1, 2), (3, 1), (2, 9), (1, 3)]);
            assert_eq!(pq.len(), 7);

            let mut seen = Vec::new();
            while pq.has_next_layer() {
                pq.setup_next_layer(None).unwrap();
                seen.push((pq.current_layer(), drain_layer(&mut pq)));
            }
            assert_eq!(
                seen,
                vec![(1, vec![2, 3, 4]), (2, vec![9]), (3, vec![1, 7]), (5, vec![1])],
                "buckets = {}",
                buckets
            );
            assert!(pq.is_empty());
        }
    }

    #[test]
    fn test_push_to_current_layer() {
        for buckets in 0..=2 {
            let file = levels(&[0, 1, 2]);
            let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(buckets), tiny(), streams).unwrap();
            push_all(&mut pq, &[(0, 5), (2, 1)]);
            assert!(pq.can_pull());
            assert_eq!(pq.peek(), Some(Request { label: 0, value: 5 }));
            assert_eq!(drain_layer(&mut pq), vec![5]);
            assert!(pq.empty_layer());
            // requests arriving while the level is processed
            push_all(&mut pq, &[(1, 8), (1, 6)]);
            pq.setup_next_layer(None).unwrap();
            assert_eq!(pq.current_layer(), 1);
            push_all(&mut pq, &[(1, 7)]);
            assert_eq!(drain_layer(&mut pq), vec![6, 7, 8]);
            pq.setup_next_layer(None).unwrap();
            assert_eq!(drain_layer(&mut pq), vec![1]);
            assert!(!pq.has_next_layer());
        }
    }

    #[test]
    fn test_skips_many_empty_levels() {
        for buckets in 0..=4 {
            let file = levels(&(0..20).collect::<Vec<_>>());
            let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(buckets), tiny(), streams).unwrap();
            push_all(&mut pq, &[(17, 2), (9, 1), (17, 1)]);
            pq.setup_next_layer(None).unwrap();
            assert_eq!(pq.current_layer(), 9);
            assert_eq!(drain_layer(&mut pq), vec![1]);
            pq.setup_next_layer(None).unwrap();
            assert_eq!(pq.current_layer(), 17);
            assert_eq!(drain_layer(&mut pq), vec![1, 2]);
        }
    }

    #[test]
    fn test_stop_label() {
        for buckets in 0..=4 {
            let file = levels(&(0..10).collect::<Vec<_>>());
            let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(buckets), tiny(), streams).unwrap();
            push_all(&mut pq, &[(8, 1)]);
            pq.setup_next_layer(Some(3)).unwrap();
            assert_eq!(pq.current_layer(), 3, "buckets = {}", buckets);
            assert!(pq.empty_layer());
            // work pushed to the stopped-at level is still released
            push_all(&mut pq, &[(3, 4)]);
            assert_eq!(drain_layer(&mut pq), vec![4]);
            pq.setup_next_layer(None).unwrap();
            assert_eq!(pq.current_layer(), 8);
            assert_eq!(drain_layer(&mut pq), vec![1]);
        }
    }

    #[test]
    fn test_merges_level_streams() {
        let a = levels(&[0, 2, 4]);
        let b = levels(&[1, 2, 5]);
        let streams = vec![
            a.stream(Direction::Forward, 64).unwrap(),
            b.stream(Direction::Forward, 64).unwrap(),
        ];
        let mut merger = LevelMerger::new(Sweep::TopDown, streams).unwrap();
        let mut labels = Vec::new();
        while merger.can_pull() {
            labels.push(merger.pull().unwrap());
        }
        assert_eq!(labels, vec![0, 1, 2, 4, 5]);
    }

    #[test]
    fn test_bottom_up() {
        for buckets in 0..=3 {
            let file = levels(&[0, 1, 2, 3]);
            // stored top-down, read backwards
            let streams = vec![file.stream(Direction::Backward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<BottomUp>::new(&config(buckets), tiny(), streams).unwrap();
            assert_eq!(pq.current_layer(), 3);
            push_all(&mut pq, &[(0, 1), (2, 3), (2, 5), (1, 2)]);
            let mut seen = Vec::new();
            while pq.has_next_layer() {
                pq.setup_next_layer(None).unwrap();
                seen.push((pq.current_layer(), drain_layer(&mut pq)));
            }
            assert_eq!(seen, vec![(2, vec![5, 3]), (1, vec![2]), (0, vec![1])]);
        }
    }

    #[test]
    fn test_overflow_spills_to_disk() {
        for buckets in [0, 1] {
            let file = levels(&(0..20).collect::<Vec<_>>());
            let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
            let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(buckets), tiny(), streams).unwrap();
            let items: Vec<(Label, u64)> = (0..400).map(|i| (1 + (i * 7) % 19, (i * 31) % 97)).collect();
            push_all(&mut pq, &items);
            assert!(pq.overflow.spilled() > 0, "buckets = {}", buckets);

            let mut seen = Vec::new();
            while pq.has_next_layer() {
                pq.setup_next_layer(None).unwrap();
                let label = pq.current_layer();
                for value in drain_layer(&mut pq) {
                    seen.push((label, value));
                }
            }
            let mut expected = items.clone();
            expected.sort();
            assert_eq!(seen, expected, "buckets = {}", buckets);
            assert!(pq.is_empty());
        }
    }

    #[test]
    fn test_large_level_spills() {
        let file = levels(&[0, 1, 2]);
        let streams = vec![file.stream(Direction::Forward, 64).unwrap()];
        let mut pq = LevelizedPriorityQueue::<TopDown>::new(&config(1), tiny(), streams).unwrap();
        let values: Vec<u64> = (0..200).map(|i| (i * 61) % 211).collect();
        for &v in &values {
            pq.push(Request { label: 1, value: v }).unwrap();
        }
        pq.setup_next_layer(None).unwrap();
        let mut expected = values.clone();
        expected.sort();
        assert_eq!(drain_layer(&mut pq), expected);
    }
}
