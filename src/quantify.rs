//! Existential and universal quantification of a variable.
//!
//! A top-down sweep over a single diagram. A request is a pair of nodes of the
//! input `(t1, t2)` with `t1 < t2`, or a single node `(t1, NIL)`. A node on the
//! quantified level turns into the pair of its children, combined with the
//! quantification operator; below that level the pairs are expanded like a
//! product of the diagram with itself.
//!
//! Both nodes of a pair may sit on one level. The smaller one is read first and
//! its children are carried in a second queue ordered by `(t2, t1)`, so the
//! input is still read strictly in order.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::bdd::{Bdd, Engine};
use crate::error::{Error, Result};
use crate::file::impl_record;
use crate::heap::ExternalHeap;
use crate::node::{Arc, LevelInfo, Node};
use crate::op::BoolOp;
use crate::ptr::{Id, Label, Ptr};
use crate::queue::{LevelizedPriorityQueue, QueuePolicy, Sweep};
use crate::store::{ArcWriter, NodeStream};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Request {
    source: Ptr,
    t1: Ptr,
    t2: Ptr,
}

impl_record!(Request { source, t1, t2 });

struct QuantifyPolicy;

impl QueuePolicy for QuantifyPolicy {
    type Item = Request;

    const SWEEP: Sweep = Sweep::TopDown;

    fn level(r: &Request) -> Label {
        r.t1.label()
    }

    fn cmp(a: &Request, b: &Request) -> Ordering {
        (a.t1, a.t2, a.source).cmp(&(b.t1, b.t2, b.source))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct WithData {
    source: Ptr,
    t1: Ptr,
    t2: Ptr,
    low: Ptr,
    high: Ptr,
}

impl_record!(WithData { source, t1, t2, low, high });

fn by_second(a: &WithData, b: &WithData) -> Ordering {
    (a.t2, a.t1, a.source).cmp(&(b.t2, b.t1, b.source))
}

/// What a pair of the input stands for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Target {
    Sink(Ptr),
    Pair(Ptr, Ptr),
}

/// Brings `(a, b)` into request form, resolving what the operator decides on its own.
///
/// `op` is commutative and idempotent, so a terminal either decides the result
/// or leaves the other operand unchanged.
fn normalize(op: BoolOp, a: Ptr, b: Ptr) -> Target {
    if b.is_nil() || a == b {
        return if a.is_sink() { Target::Sink(a) } else { Target::Pair(a, Ptr::NIL) };
    }
    if a.is_sink() && b.is_sink() {
        return Target::Sink(op.apply(a, b));
    }
    let (a, b) = if a < b { (a, b) } else { (b, a) };
    // terminals sort after nodes, so only `b` can be one
    if b.is_sink() {
        if op.can_right_shortcut(b) {
            Target::Sink(Ptr::sink(op.eval(false, b.value())))
        } else {
            Target::Pair(a, Ptr::NIL)
        }
    } else {
        Target::Pair(a, b)
    }
}

fn seek(stream: &mut NodeStream, uid: Ptr) -> Result<Node> {
    loop {
        let n = stream.peek()?;
        if n.uid >= uid {
            debug_assert_eq!(n.uid, uid, "node {} is missing", uid);
            return Ok(n);
        }
        stream.pull()?;
    }
}

fn children(stream: &mut NodeStream, t: Ptr, label: Label) -> Result<(Ptr, Ptr)> {
    if t.is_node() && t.label() == label {
        let n = seek(stream, t)?;
        Ok((n.low, n.high))
    } else {
        Ok((t, t))
    }
}

impl Engine {
    /// Quantifies `label` in `f` with `op`, which must be commutative and idempotent.
    pub fn quantify(&self, f: &Bdd, label: Label, op: BoolOp) -> Result<Bdd> {
        debug!("quantify(f = {}, label = {}, op = {:?})", f, label, op);

        if !op.is_commutative() || !op.is_idempotent() {
            return Err(Error::invalid(format!(
                "{:?} cannot quantify: it is not commutative and idempotent",
                op
            )));
        }
        if f.is_sink() || !f.file().has_label(label)? {
            return Ok(f.clone());
        }

        let config = self.config();
        let budget = config.budget();
        let mut pq = LevelizedPriorityQueue::<QuantifyPolicy>::new(
            config,
            budget.split(4),
            vec![f.file().levels(Sweep::TopDown)?],
        )?;
        let mut writer = ArcWriter::with_unsorted_sinks(config, budget.split(2))?;
        let mut data = ExternalHeap::new(by_second, budget.split(4), config.tmp_dir.clone());
        let mut nodes = f.nodes()?;

        let root = nodes.peek()?.uid;
        pq.push(Request {
            source: Ptr::NIL,
            t1: root,
            t2: Ptr::NIL,
        })?;

        let mut sources = Vec::new();
        while !pq.is_empty() {
            if pq.empty_layer() {
                pq.setup_next_layer(None)?;
            }
            let level = pq.current_layer();
            let mut out_id: Id = 0;

            while pq.can_pull() || !data.is_empty() {
                let from_data = match (pq.peek(), data.peek()) {
                    (Some(r), Some(d)) => d.t2 <= r.t1,
                    (None, Some(_)) => true,
                    _ => false,
                };

                sources.clear();
                let popped = if from_data { data.pop()? } else { None };
                let (t1, t2, c1, c2) = if let Some(d) = popped {
                    let (t1, t2) = (d.t1, d.t2);
                    sources.push(d.source);
                    while matches!(data.peek(), Some(next) if (next.t1, next.t2) == (t1, t2)) {
                        if let Some(next) = data.pop()? {
                            sources.push(next.source);
                        }
                    }
                    (t1, t2, (d.low, d.high), children(&mut nodes, t2, level)?)
                } else {
                    let r = pq.pull()?;
                    let (t1, t2) = (r.t1, r.t2);
                    sources.push(r.source);
                    while matches!(pq.peek(), Some(next) if (next.t1, next.t2) == (t1, t2)) {
                        sources.push(pq.pull()?.source);
                    }
                    let c1 = children(&mut nodes, t1, level)?;
                    if t2.is_node() && t2.label() == level {
                        for &source in &sources {
                            data.push(WithData {
                                source,
                                t1,
                                t2,
                                low: c1.0,
                                high: c1.1,
                            })?;
                        }
                        continue;
                    }
                    let c2 = if t2.is_nil() { (Ptr::NIL, Ptr::NIL) } else { (t2, t2) };
                    (t1, t2, c1, c2)
                };

                if level == label {
                    // pairs only arise below the quantified level
                    debug_assert!(t2.is_nil());
                    match normalize(op, c1.0, c1.1) {
                        Target::Sink(sink) => {
                            if sources[0].is_nil() {
                                trace!("quantify collapsed to {}", sink);
                                return self.constant(sink.value());
                            }
                            for &s in &sources {
                                writer.push_sink_arc(Arc::new(s, sink))?;
                            }
                        }
                        Target::Pair(a, b) => {
                            for &source in &sources {
                                pq.push(Request { source, t1: a, t2: b })?;
                            }
                        }
                    }
                    continue;
                }

                let uid = Ptr::node(level, out_id)?;
                out_id += 1;
                trace!("quantify: {} = ({}, {})", uid, t1, t2);
                for &s in &sources {
                    if !s.is_nil() {
                        writer.push_node_arc(Arc::new(s, uid))?;
                    }
                }
                for (source, a, b) in [(uid, c1.0, c2.0), (uid.flag(), c1.1, c2.1)] {
                    match normalize(op, a, b) {
                        Target::Sink(sink) => writer.push_sink_arc(Arc::new(source, sink))?,
                        Target::Pair(a, b) => pq.push(Request { source, t1: a, t2: b })?,
                    }
                }
            }

            if out_id > 0 {
                writer.push_level(LevelInfo::new(level, out_id))?;
            }
        }

        self.reduce(writer.finish()?.into())
    }

    /// `exists x_label. f`
    pub fn exists(&self, f: &Bdd, label: Label) -> Result<Bdd> {
        self.quantify(f, label, BoolOp::Or)
    }

    /// `forall x_label. f`
    pub fn forall(&self, f: &Bdd, label: Label) -> Result<Bdd> {
        self.quantify(f, label, BoolOp::And)
    }

    /// Quantifies every label of `labels` in turn.
    pub fn exists_all(&self, f: &Bdd, labels: &[Label]) -> Result<Bdd> {
        self.quantify_all(f, labels, BoolOp::Or)
    }

    pub fn forall_all(&self, f: &Bdd, labels: &[Label]) -> Result<Bdd> {
        self.quantify_all(f, labels, BoolOp::And)
    }

    fn quantify_all(&self, f: &Bdd, labels: &[Label], op: BoolOp) -> Result<Bdd> {
        let mut res = f.clone();
        for &label in labels {
            if res.is_sink() {
                break;
            }
            res = self.quantify(&res, label, op)?;
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::node::Assignment;

    fn vars(engine: &Engine, n: u64) -> Vec<Bdd> {
        (0..n).map(|i| engine.ithvar(i).unwrap()).collect()
    }

    #[test]
    fn test_normalize() {
        let a = Ptr::node(1, 0).unwrap();
        let b = Ptr::node(2, 0).unwrap();
        assert_eq!(normalize(BoolOp::Or, b, a), Target::Pair(a, b));
        assert_eq!(normalize(BoolOp::Or, a, a), Target::Pair(a, Ptr::NIL));
        assert_eq!(normalize(BoolOp::Or, Ptr::TRUE, a), Target::Sink(Ptr::TRUE));
        assert_eq!(normalize(BoolOp::Or, Ptr::FALSE, a), Target::Pair(a, Ptr::NIL));
        assert_eq!(normalize(BoolOp::And, a, Ptr::FALSE), Target::Sink(Ptr::FALSE));
        assert_eq!(normalize(BoolOp::And, Ptr::TRUE, Ptr::FALSE), Target::Sink(Ptr::FALSE));
        assert_eq!(normalize(BoolOp::And, Ptr::TRUE, Ptr::NIL), Target::Sink(Ptr::TRUE));
    }

    #[test]
    fn test_rejects_operator() {
        let engine = Engine::default();
        let x = engine.ithvar(0).unwrap();
        assert!(matches!(engine.quantify(&x, 0, BoolOp::Xor), Err(Error::InvalidArgument(_))));
        assert!(matches!(engine.quantify(&x, 0, BoolOp::Imp), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_missing_label_is_identity() {
        let engine = Engine::default();
        let x = engine.ithvar(3).unwrap();
        assert!(engine.exists(&x, 1).unwrap().same_storage(&x));
        assert!(engine.forall(&x, 4).unwrap().same_storage(&x));
    }

    #[test]
    fn test_single_variable() {
        let engine = Engine::default();
        let x = engine.ithvar(3).unwrap();
        assert!(engine.exists(&x, 3).unwrap().is_true());
        assert!(engine.forall(&x, 3).unwrap().is_false());
        assert!(engine.exists(&!&x, 3).unwrap().is_true());
    }

    #[test]
    fn test_exists_matches_restrictions() {
        let engine = Engine::default();
        let x = vars(&engine, 4);
        let a = engine.apply_xor(&x[0], &x[1]).unwrap();
        let b = engine.apply_eq(&x[1], &x[3]).unwrap();
        let c = engine.apply_or(&x[2], &x[3]).unwrap();
        let f = engine.apply_and(&engine.apply_or(&a, &b).unwrap(), &c).unwrap();

        for label in 0..4 {
            let lo = engine.restrict(&f, &[Assignment::new(label, false)]).unwrap();
            let hi = engine.restrict(&f, &[Assignment::new(label, true)]).unwrap();

            let exists = engine.exists(&f, label).unwrap();
            let expected = engine.apply_or(&lo, &hi).unwrap();
            assert!(engine.equal(&exists, &expected).unwrap(), "exists x{}", label);

            let forall = engine.forall(&f, label).unwrap();
            let expected = engine.apply_and(&lo, &hi).unwrap();
            assert!(engine.equal(&forall, &expected).unwrap(), "forall x{}", label);
        }
    }

    #[test]
    fn test_quantify_many() {
        let engine = Engine::default();
        let x = vars(&engine, 3);
        let f = engine.apply_and_many(&x).unwrap();
        // exists x0, x2. x0 & x1 & x2 == x1
        let res = engine.exists_all(&f, &[0, 2]).unwrap();
        assert!(engine.equal(&res, &x[1]).unwrap());
        assert!(engine.forall_all(&f, &[1]).unwrap().is_false());
        assert!(engine.exists_all(&f, &[]).unwrap().same_storage(&f));
        assert!(engine.exists_all(&f, &[0, 1, 2]).unwrap().is_true());
    }
}
