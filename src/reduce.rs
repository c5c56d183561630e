//! Reduction of an arc file into a canonical node file.
//!
//! Levels are processed bottom-up. On each level the two arcs of every node are
//! joined again (from the sink arcs and from the arcs that the deeper levels
//! already rewrote), then:
//!
//! 1. a node whose children coincide is dropped and mapped to that child;
//! 2. the remaining nodes are sorted by their children, each group of equal
//!    children becomes one output node with a fresh id counting down from `MAX_ID`.
//!
//! The mappings of both rules are merged in descending order of the old uid and
//! used to rewrite the node arcs into this level, which are then queued for the
//! level of their source.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::bdd::{Bdd, Engine, UnreducedBdd};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::{impl_record, RecordStream};
use crate::node::{Arc, Node};
use crate::ptr::{Id, Label, Ptr, MAX_ID};
use crate::queue::{LevelizedPriorityQueue, QueuePolicy, Sweep};
use crate::sorter::Sorter;
use crate::store::{ArcFile, ArcWriter, NodeWriter};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Mapping {
    old_uid: Ptr,
    new_uid: Ptr,
}

impl_record!(Mapping { old_uid, new_uid });

/// Rewritten arcs waiting for the level of their source, deepest source first.
struct ReducePolicy;

impl QueuePolicy for ReducePolicy {
    type Item = Arc;

    const SWEEP: Sweep = Sweep::BottomUp;

    fn level(arc: &Arc) -> Label {
        arc.source.label()
    }

    fn cmp(a: &Arc, b: &Arc) -> Ordering {
        b.source.cmp(&a.source)
    }
}

fn by_children_desc(a: &Node, b: &Node) -> Ordering {
    (b.high, b.low, b.uid).cmp(&(a.high, a.low, a.uid))
}

fn by_old_uid_desc(a: &Mapping, b: &Mapping) -> Ordering {
    b.old_uid.cmp(&a.old_uid)
}

/// Takes the arc with the larger source from either input.
fn next_arc(pq: &mut LevelizedPriorityQueue<ReducePolicy>, sink_arcs: &mut RecordStream<Arc>) -> Result<Arc> {
    if sink_arcs.can_pull() {
        let sink = sink_arcs.peek()?;
        match pq.peek() {
            Some(arc) if arc.source > sink.source => pq.pull(),
            _ => sink_arcs.pull(),
        }
    } else {
        pq.pull()
    }
}

fn next_mapping(red1: &mut Sorter<Mapping>, red2: &mut Sorter<Mapping>) -> Result<Mapping> {
    if !red1.can_pull() || (red2.can_pull() && red1.peek()?.old_uid < red2.peek()?.old_uid) {
        red2.pull()
    } else {
        red1.pull()
    }
}

fn reduce_arcs(config: &Config, arcs: &ArcFile) -> Result<Bdd> {
    let mut node_arcs = arcs.node_arcs_bottom_up()?;
    let mut sink_arcs = arcs.sink_arcs_bottom_up()?;
    let mut out = NodeWriter::new(config)?;

    // a single node, both arcs go to terminals
    if !node_arcs.can_pull() {
        let e_high = sink_arcs.pull()?;
        let e_low = sink_arcs.pull()?;
        let n = Node::from_arcs(e_low, e_high);
        if n.low == n.high {
            out.push(Node::sink(n.low.value()))?;
        } else {
            out.push(Node::new(Ptr::node(n.label(), MAX_ID)?, n.low, n.high))?;
        }
        return Ok(Bdd::new(out.finish()?));
    }

    let budget = config.budget();
    let sort_budget = budget.split(2).split(3);
    let mut pq = LevelizedPriorityQueue::<ReducePolicy>::new(config, budget.split(2), vec![arcs.levels(Sweep::BottomUp)?])?;

    let mut label = sink_arcs.peek()?.source.label();
    let mut last_mapping: Option<Mapping> = None;

    while sink_arcs.can_pull() || pq.can_pull() {
        debug_assert_eq!(label, pq.current_layer());
        let tmp_dir = config.tmp_dir.clone();
        let mut red1 = Sorter::new(by_old_uid_desc, sort_budget, tmp_dir.clone());
        let mut grouping = Sorter::new(by_children_desc, sort_budget, tmp_dir.clone());

        loop {
            let sink_here = sink_arcs.can_pull() && sink_arcs.peek()?.source.label() == label;
            if !sink_here && !pq.can_pull() {
                break;
            }
            let e_high = next_arc(&mut pq, &mut sink_arcs)?;
            let e_low = next_arc(&mut pq, &mut sink_arcs)?;
            let n = Node::from_arcs(e_low, e_high);
            if n.low == n.high {
                red1.push(Mapping {
                    old_uid: n.uid,
                    new_uid: n.low,
                })?;
            } else {
                grouping.push(n)?;
            }
        }

        grouping.finalize(sort_budget)?;
        let mut red2 = Sorter::new(by_old_uid_desc, sort_budget, tmp_dir);
        let mut next_id: Option<Id> = Some(MAX_ID);
        let mut kept = 0u64;
        let mut out_node: Option<Node> = None;
        while grouping.can_pull() {
            let n = grouping.pull()?;
            let current = match out_node {
                Some(o) if o.low == n.low && o.high == n.high => o,
                _ => {
                    let id = next_id.ok_or(Error::Overflow {
                        what: "id",
                        max: MAX_ID as u128,
                    })?;
                    next_id = id.checked_sub(1);
                    let o = Node::new(Ptr::node(label, id)?, n.low, n.high);
                    out.push(o)?;
                    kept += 1;
                    out_node = Some(o);
                    o
                }
            };
            red2.push(Mapping {
                old_uid: n.uid,
                new_uid: current.uid,
            })?;
        }
        trace!("reduce level {}: {} redundant, {} kept", label, red1.len(), kept);

        red1.finalize(sort_budget)?;
        red2.finalize(sort_budget)?;
        while red1.can_pull() || red2.can_pull() {
            let m = next_mapping(&mut red1, &mut red2)?;
            last_mapping = Some(m);
            while node_arcs.can_pull() && node_arcs.peek()?.target == m.old_uid {
                let arc = node_arcs.pull()?;
                pq.push(Arc::new(arc.source, m.new_uid))?;
            }
        }

        if pq.has_next_layer() {
            let stop = if sink_arcs.can_pull() {
                Some(sink_arcs.peek()?.source.label())
            } else {
                None
            };
            pq.setup_next_layer(stop)?;
            label = pq.current_layer();
        } else if !out.has_pushed() {
            // everything collapsed into a terminal
            let m = last_mapping.ok_or_else(|| Error::exhausted("reduce mappings"))?;
            debug_assert!(m.new_uid.is_sink());
            out.push(Node::sink(m.new_uid.value()))?;
        }
    }

    Ok(Bdd::new(out.finish()?))
}

impl Engine {
    /// Canonicalizes the output of an algorithm. Already reduced input is returned as is.
    pub fn reduce(&self, input: UnreducedBdd) -> Result<Bdd> {
        match input {
            UnreducedBdd::Reduced(bdd) => Ok(bdd),
            UnreducedBdd::Arcs(arcs) => {
                debug!(
                    "reduce(node_arcs = {}, sink_arcs = {})",
                    arcs.node_arc_count(),
                    arcs.sink_arc_count()
                );
                let res = reduce_arcs(self.config(), &arcs)?;
                debug!("reduce -> {}", res);
                Ok(res)
            }
        }
    }

    /// Turns a reduced diagram back into arcs.
    ///
    /// Reducing the result gives a diagram equal to `bdd`. Fails for terminals,
    /// which have no arcs.
    pub fn transpose(&self, bdd: &Bdd) -> Result<ArcFile> {
        debug!("transpose(bdd = {})", bdd);
        if bdd.is_sink() {
            return Err(Error::invalid("a terminal has no arcs"));
        }
        let config = self.config();
        let budget = config.budget();
        let mut node_arcs = Sorter::new(
            |a: &Arc, b: &Arc| (a.target, a.source).cmp(&(b.target, b.source)),
            budget,
            config.tmp_dir.clone(),
        );
        let mut writer = ArcWriter::new(config)?;
        for info in bdd.file().levels(Sweep::TopDown)? {
            writer.push_level(info?)?;
        }
        for n in bdd.nodes()? {
            let n = n?;
            for arc in [n.low_arc(), n.high_arc()] {
                if arc.target.is_sink() {
                    writer.push_sink_arc(arc)?;
                } else {
                    node_arcs.push(arc)?;
                }
            }
        }
        node_arcs.finalize(budget)?;
        while node_arcs.can_pull() {
            writer.push_node_arc(node_arcs.pull()?)?;
        }
        writer.finish()
    }
}
