//! Restriction of a diagram by a partial assignment.
//!
//! One top-down pass over the nodes. A node on an assigned level is skipped:
//! all arcs into it are forwarded to the child selected by the assignment.
//! Every other reachable node is copied with a fresh uid.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::bdd::{Bdd, Engine};
use crate::error::{Error, Result};
use crate::node::{Arc, Assignment, LevelInfo};
use crate::ptr::{Id, Label, Ptr};
use crate::queue::{LevelizedPriorityQueue, QueuePolicy, Sweep};
use crate::store::{ArcWriter, NodeFile};

/// Arcs waiting for their target to be read.
struct RestrictPolicy;

impl QueuePolicy for RestrictPolicy {
    type Item = Arc;

    const SWEEP: Sweep = Sweep::TopDown;

    fn level(arc: &Arc) -> Label {
        arc.target.label()
    }

    fn cmp(a: &Arc, b: &Arc) -> Ordering {
        (a.target, a.source).cmp(&(b.target, b.source))
    }
}

/// Sorts the assignment by label and rejects repeated labels.
pub(crate) fn sorted_assignment(assignment: &[Assignment]) -> Result<Vec<Assignment>> {
    let mut sorted = assignment.to_vec();
    sorted.sort();
    for w in sorted.windows(2) {
        if w[0].label == w[1].label {
            return Err(Error::invalid(format!("label {} is assigned twice", w[0].label)));
        }
    }
    Ok(sorted)
}

fn touches(file: &NodeFile, assignment: &[Assignment]) -> Result<bool> {
    for a in assignment {
        if file.has_label(a.label)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Engine {
    /// Fixes the variables in `assignment`.
    pub fn restrict(&self, f: &Bdd, assignment: &[Assignment]) -> Result<Bdd> {
        debug!("restrict(f = {}, assignment = {:?})", f, assignment);

        let assignment = sorted_assignment(assignment)?;
        if f.is_sink() || !touches(f.file(), &assignment)? {
            return Ok(f.clone());
        }

        let config = self.config();
        let budget = config.budget();
        let mut pq = LevelizedPriorityQueue::<RestrictPolicy>::new(
            config,
            budget.split(2),
            vec![f.file().levels(Sweep::TopDown)?],
        )?;
        let mut writer = ArcWriter::with_unsorted_sinks(config, budget.split(2))?;
        let mut nodes = f.nodes()?;
        let mut fixed = assignment.iter().peekable();
        let mut sources = Vec::new();
        let mut level: Option<(Label, Id)> = None;
        let mut first = true;

        while nodes.can_pull() {
            let n = nodes.pull()?;
            let label = n.label();

            sources.clear();
            if first {
                sources.push(Ptr::NIL);
                first = false;
            } else {
                if pq.is_empty() {
                    // the rest of the diagram is unreachable
                    break;
                }
                if pq.current_layer() != label {
                    pq.setup_next_layer(Some(label))?;
                }
                while matches!(pq.peek(), Some(arc) if arc.target == n.uid) {
                    sources.push(pq.pull()?.source);
                }
                if sources.is_empty() {
                    continue;
                }
            }

            while fixed.next_if(|a| a.label < label).is_some() {}
            if let Some(value) = fixed.peek().filter(|a| a.label == label).map(|a| a.value) {
                let child = if value { n.high } else { n.low };
                if child.is_sink() && sources[0].is_nil() {
                    debug_assert_eq!(sources.len(), 1);
                    trace!("restrict collapsed to {}", child);
                    return self.constant(child.value());
                }
                for &s in &sources {
                    if child.is_sink() {
                        writer.push_sink_arc(Arc::new(s, child))?;
                    } else {
                        pq.push(Arc::new(s, child))?;
                    }
                }
                continue;
            }

            let id = match level {
                Some((l, count)) if l == label => count,
                Some((l, count)) => {
                    writer.push_level(LevelInfo::new(l, count))?;
                    0
                }
                None => 0,
            };
            level = Some((label, id + 1));
            let uid = Ptr::node(label, id)?;
            for &s in &sources {
                if !s.is_nil() {
                    writer.push_node_arc(Arc::new(s, uid))?;
                }
            }
            for arc in [Arc::new(uid, n.low), Arc::new(uid.flag(), n.high)] {
                if arc.target.is_sink() {
                    writer.push_sink_arc(arc)?;
                } else {
                    pq.push(arc)?;
                }
            }
        }
        if let Some((l, count)) = level {
            writer.push_level(LevelInfo::new(l, count))?;
        }

        self.reduce(writer.finish()?.into())
    }
}
