//! Evaluation and satisfying assignments.
//!
//! Both follow a single path from the root. Nodes are read top-down and every
//! child has a larger uid than its parent, so the path is found in one forward
//! pass over the node stream.

use log::debug;

use crate::bdd::{Bdd, Engine};
use crate::error::{Error, Result};
use crate::node::{Assignment, Node};
use crate::ptr::Ptr;
use crate::restrict::sorted_assignment;
use crate::store::NodeStream;

/// Follows the path chosen by `step` down to a terminal.
fn walk(nodes: &mut NodeStream, mut step: impl FnMut(&Node) -> Result<Ptr>) -> Result<bool> {
    let mut current = nodes.peek()?.uid;
    while nodes.can_pull() {
        let n = nodes.pull()?;
        if n.uid != current {
            debug_assert!(n.uid < current);
            continue;
        }
        current = step(&n)?;
        if current.is_sink() {
            return Ok(current.value());
        }
    }
    Err(Error::exhausted("node stream"))
}

impl Engine {
    /// Value of `f` under `assignment`.
    ///
    /// Every variable on the path taken must be assigned, and none twice.
    pub fn evaluate(&self, f: &Bdd, assignment: &[Assignment]) -> Result<bool> {
        debug!("evaluate(f = {}, assignment = {:?})", f, assignment);
        let sorted = sorted_assignment(assignment)?;
        if let Some(v) = f.sink_value() {
            return Ok(v);
        }
        let mut nodes = f.nodes()?;
        walk(&mut nodes, |n| {
            let label = n.label();
            match sorted.binary_search_by_key(&label, |a| a.label) {
                Ok(i) => Ok(if sorted[i].value { n.high } else { n.low }),
                Err(_) => Err(Error::invalid(format!("variable {} is not assigned", label))),
            }
        })
    }

    /// Some satisfying assignment of `f`, or `None` if `f` is false.
    ///
    /// Only the variables on the chosen path are assigned, the low edge is
    /// preferred unless it leads to false.
    pub fn any_sat(&self, f: &Bdd) -> Result<Option<Vec<Assignment>>> {
        debug!("any_sat(f = {})", f);
        match f.sink_value() {
            Some(false) => return Ok(None),
            Some(true) => return Ok(Some(Vec::new())),
            None => {}
        }
        let mut path = Vec::new();
        let mut nodes = f.nodes()?;
        let reached = walk(&mut nodes, |n| {
            let high = n.low.is_false();
            path.push(Assignment::new(n.label(), high));
            Ok(if high { n.high } else { n.low })
        })?;
        debug_assert!(reached, "a reduced diagram has no node with two false children");
        Ok(Some(path))
    }
}
