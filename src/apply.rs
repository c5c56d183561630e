//! Product construction of two diagrams.
//!
//! A single top-down sweep over both inputs. A request `(t1, t2)` stands for the
//! product node of `t1` in the left and `t2` in the right diagram and is
//! processed on the level of the smaller pointer. Both inputs are read in order,
//! so a request whose two nodes are on the same level is split in two steps:
//! the node with the smaller uid is read first and its children travel with the
//! request in a second queue, ordered by the larger uid.

use std::cmp::{max, min, Ordering};

use log::{debug, trace};

use crate::bdd::{Bdd, Engine, UnreducedBdd};
use crate::error::Result;
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

impl Request {
    fn pair(&self) -> (Ptr, Ptr) {
        (self.t1, self.t2)
    }
}

struct ApplyPolicy;

impl QueuePolicy for ApplyPolicy {
    type Item = Request;

    const SWEEP: Sweep = Sweep::TopDown;

    fn level(r: &Request) -> Label {
        min(r.t1, r.t2).label()
    }

    fn cmp(a: &Request, b: &Request) -> Ordering {
        let key = |r: &Request| (min(r.t1, r.t2), max(r.t1, r.t2), r.t1, r.source);
        key(a).cmp(&key(b))
    }
}

/// A request with the children of its smaller node already known.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct WithData {
    source: Ptr,
    t1: Ptr,
    t2: Ptr,
    low: Ptr,
    high: Ptr,
}

impl_record!(WithData { source, t1, t2, low, high });

impl WithData {
    fn pair(&self) -> (Ptr, Ptr) {
        (self.t1, self.t2)
    }

    fn key(&self) -> (Ptr, Ptr, Ptr, Ptr) {
        (max(self.t1, self.t2), min(self.t1, self.t2), self.t1, self.source)
    }
}

/// Order of the same-level data queue: by the node still to be read.
fn by_larger(a: &WithData, b: &WithData) -> Ordering {
    a.key().cmp(&b.key())
}

/// Moves `stream` forward to the node `uid`.
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

/// Children of `t` on level `label`, or `t` itself on both sides if it lies deeper.
fn children(stream: &mut NodeStream, t: Ptr, label: Label) -> Result<(Ptr, Ptr)> {
    if t.is_node() && t.label() == label {
        let n = seek(stream, t)?;
        Ok((n.low, n.high))
    } else {
        Ok((t, t))
    }
}

/// Result of `op` on `(a, b)` if it is already decided by terminals.
fn resolve(op: BoolOp, a: Ptr, b: Ptr) -> Option<Ptr> {
    if a.is_sink() && b.is_sink() {
        Some(op.apply(a, b))
    } else if op.can_left_shortcut(a) {
        Some(Ptr::sink(op.eval(a.value(), false)))
    } else if op.can_right_shortcut(b) {
        Some(Ptr::sink(op.eval(false, b.value())))
    } else {
        None
    }
}

struct Product {
    op: BoolOp,
    pq: LevelizedPriorityQueue<ApplyPolicy>,
    writer: ArcWriter,
}

impl Product {
    fn emit_child(&mut self, source: Ptr, a: Ptr, b: Ptr) -> Result<()> {
        match resolve(self.op, a, b) {
            Some(sink) => self.writer.push_sink_arc(Arc::new(source, sink)),
            None => self.pq.push(Request { source, t1: a, t2: b }),
        }
    }

    /// Writes the product node `uid` with the given children of both operands.
    fn emit(&mut self, uid: Ptr, sources: &[Ptr], c1: (Ptr, Ptr), c2: (Ptr, Ptr)) -> Result<()> {
        for &s in sources {
            if !s.is_nil() {
                self.writer.push_node_arc(Arc::new(s, uid))?;
            }
        }
        self.emit_child(uid, c1.0, c2.0)?;
        self.emit_child(uid.flag(), c1.1, c2.1)
    }
}

impl Engine {
    /// Combines `u` and `v` with `op`.
    ///
    /// The result is reduced already when a shortcut applies: an operand is a
    /// terminal, or both operands share their storage.
    pub fn apply(&self, u: &Bdd, v: &Bdd, op: BoolOp) -> Result<UnreducedBdd> {
        debug!("apply(u = {}, v = {}, op = {:?})", u, v, op);

        if let Some(res) = self.apply_shortcut(u, v, op)? {
            return Ok(res.into());
        }

        let config = self.config();
        let budget = config.budget();
        let levels = vec![u.file().levels(Sweep::TopDown)?, v.file().levels(Sweep::TopDown)?];
        let mut product = Product {
            op,
            pq: LevelizedPriorityQueue::new(config, budget.split(2), levels)?,
            writer: ArcWriter::new(config)?,
        };
        let mut data = ExternalHeap::new(by_larger, budget.split(2), config.tmp_dir.clone());
        let mut left = u.nodes()?;
        let mut right = v.nodes()?;

        let root1 = left.peek()?.uid;
        let root2 = right.peek()?.uid;
        product.pq.push(Request {
            source: Ptr::NIL,
            t1: root1,
            t2: root2,
        })?;

        let mut sources = Vec::new();
        while !product.pq.is_empty() {
            if product.pq.empty_layer() {
                product.pq.setup_next_layer(None)?;
            }
            let label = product.pq.current_layer();
            let mut out_id: Id = 0;

            while product.pq.can_pull() || !data.is_empty() {
                let from_data = match (product.pq.peek(), data.peek()) {
                    (Some(r), Some(d)) => d.key().0 <= min(r.t1, r.t2),
                    (None, Some(_)) => true,
                    _ => false,
                };

                sources.clear();
                let popped = if from_data { data.pop()? } else { None };
                let (pair, c1, c2) = if let Some(d) = popped {
                    let pair = d.pair();
                    sources.push(d.source);
                    while matches!(data.peek(), Some(next) if next.pair() == pair) {
                        if let Some(next) = data.pop()? {
                            sources.push(next.source);
                        }
                    }
                    let (t1, t2) = pair;
                    if t1 > t2 {
                        (pair, children(&mut left, t1, label)?, (d.low, d.high))
                    } else {
                        (pair, (d.low, d.high), children(&mut right, t2, label)?)
                    }
                } else {
                    let r = product.pq.pull()?;
                    let pair = r.pair();
                    sources.push(r.source);
                    while matches!(product.pq.peek(), Some(next) if next.pair() == pair) {
                        sources.push(product.pq.pull()?.source);
                    }
                    let (t1, t2) = pair;
                    let both_here = t1.is_node() && t2.is_node() && t1.label() == label && t2.label() == label;
                    if both_here && t1 != t2 {
                        // read the smaller node now, the other one when its turn comes
                        let (low, high) = if t1 < t2 {
                            children(&mut left, t1, label)?
                        } else {
                            children(&mut right, t2, label)?
                        };
                        for &source in &sources {
                            data.push(WithData {
                                source,
                                t1,
                                t2,
                                low,
                                high,
                            })?;
                        }
                        continue;
                    }
                    (pair, children(&mut left, t1, label)?, children(&mut right, t2, label)?)
                };

                let uid = Ptr::node(label, out_id)?;
                out_id += 1;
                trace!("apply: {} = ({}, {})", uid, pair.0, pair.1);
                product.emit(uid, &sources, c1, c2)?;
            }

            if out_id > 0 {
                product.writer.push_level(LevelInfo::new(label, out_id))?;
            }
        }

        Ok(product.writer.finish()?.into())
    }

    /// Results that need no product construction.
    fn apply_shortcut(&self, u: &Bdd, v: &Bdd, op: BoolOp) -> Result<Option<Bdd>> {
        if u.same_storage(v) {
            // `op(f, f)` or `op(f, !f)`, as a function of `f` alone
            let (r0, r1) = if u.is_negated() == v.is_negated() {
                (op.eval(false, false), op.eval(true, true))
            } else {
                (op.eval(false, true), op.eval(true, false))
            };
            let res = match (r0, r1) {
                (false, true) => u.clone(),
                (true, false) => !u,
                (c, _) => self.constant(c)?,
            };
            return Ok(Some(res));
        }

        match (u.sink_value(), v.sink_value()) {
            (Some(a), Some(b)) => Ok(Some(self.constant(op.eval(a, b))?)),
            (Some(a), None) => {
                if op.can_left_shortcut(Ptr::sink(a)) {
                    Ok(Some(self.constant(op.eval(a, false))?))
                } else if op.is_left_irrelevant(a) {
                    Ok(Some(v.clone()))
                } else if op.is_left_negating(a) {
                    Ok(Some(!v))
                } else {
                    Ok(None)
                }
            }
            (None, Some(b)) => {
                if op.can_right_shortcut(Ptr::sink(b)) {
                    Ok(Some(self.constant(op.eval(false, b))?))
                } else if op.is_right_irrelevant(b) {
                    Ok(Some(u.clone()))
                } else if op.is_right_negating(b) {
                    Ok(Some(!u))
                } else {
                    Ok(None)
                }
            }
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::config::Config;
    use crate::ptr::MAX_ID;

    fn ptr(label: Label, id: Id) -> Ptr {
        Ptr::node(label, id).unwrap()
    }

    #[test]
    fn test_and_of_two_variables() {
        let engine = Engine::default();
        let x0 = engine.ithvar(0).unwrap();
        let x1 = engine.ithvar(1).unwrap();
        let arcs = match engine.apply(&x0, &x1, BoolOp::And).unwrap() {
            UnreducedBdd::Arcs(arcs) => arcs,
            UnreducedBdd::Reduced(bdd) => panic!("unexpected shortcut to {}", bdd),
        };
        let a = ptr(0, 0);
        let b = ptr(1, 0);
        assert_eq!(arcs.read_node_arcs().unwrap(), vec![Arc::new(a.flag(), b)]);
        assert_eq!(
            arcs.read_sink_arcs().unwrap(),
            vec![
                Arc::new(a, Ptr::FALSE),
                Arc::new(b, Ptr::FALSE),
                Arc::new(b.flag(), Ptr::TRUE),
            ]
        );
        assert_eq!(
            arcs.read_levels().unwrap(),
            vec![LevelInfo::new(0, 1), LevelInfo::new(1, 1)]
        );

        let res = engine.reduce(arcs.into()).unwrap();
        assert_eq!(
            res.file().read_nodes().unwrap(),
            vec![
                Node::new(ptr(1, MAX_ID), Ptr::FALSE, Ptr::TRUE),
                Node::new(ptr(0, MAX_ID), Ptr::FALSE, ptr(1, MAX_ID)),
            ]
        );
        assert_eq!(
            res.file().read_levels().unwrap(),
            vec![LevelInfo::new(1, 1), LevelInfo::new(0, 1)]
        );
    }

    #[test]
    fn test_same_storage_shortcuts() {
        let engine = Engine::default();
        let x = engine.ithvar(4).unwrap();
        let not_x = !&x;

        let res = engine.apply_and(&x, &x).unwrap();
        assert!(res.same_storage(&x) && !res.is_negated());
        assert!(engine.apply_xor(&x, &x).unwrap().is_false());
        assert!(engine.apply_and(&x, &not_x).unwrap().is_false());
        assert!(engine.apply_or(&not_x, &x).unwrap().is_true());
        let res = engine.apply_diff(&not_x, &x).unwrap();
        assert!(res.same_storage(&x) && res.is_negated());
    }

    #[test]
    fn test_terminal_shortcuts() {
        let engine = Engine::default();
        let x = engine.ithvar(1).unwrap();
        let t = engine.constant(true).unwrap();
        let f = engine.constant(false).unwrap();

        assert!(engine.apply_and(&f, &x).unwrap().is_false());
        assert!(engine.apply_and(&x, &t).unwrap().same_storage(&x));
        assert!(engine.apply_or(&x, &t).unwrap().is_true());
        let res = engine.apply_xor(&t, &x).unwrap();
        assert!(res.same_storage(&x) && res.is_negated());
        assert!(engine.apply_imply(&f, &x).unwrap().is_true());
        assert!(engine.apply_imply(&x, &f).unwrap().is_negated());
        assert!(engine.apply_eq(&t, &f).unwrap().is_false());

        // projections fold to the other operand without a sweep
        let second = BoolOp::Custom(|_, b| b);
        assert!(engine.apply_reduced(&t, &x, second).unwrap().same_storage(&x));
        let res = engine.apply_reduced(&f, &x, BoolOp::Custom(|_, b| !b)).unwrap();
        assert!(res.same_storage(&x) && res.is_negated());
        let res = engine.apply_reduced(&x, &t, BoolOp::Custom(|a, _| !a)).unwrap();
        assert!(res.same_storage(&x) && res.is_negated());
        assert!(engine.apply_reduced(&x, &f, BoolOp::Custom(|_, _| true)).unwrap().is_true());
    }

    #[test]
    fn test_requests_are_merged() {
        // (x0 xor x1) and (x1 xor x2): both branches of x0 request the same pairs on level 1
        for buckets in 0..=2 {
            let engine = Engine::new(Config {
                buckets,
                ..Config::default()
            })
            .unwrap();
            let x0 = engine.ithvar(0).unwrap();
            let x1 = engine.ithvar(1).unwrap();
            let x2 = engine.ithvar(2).unwrap();
            let a = engine.apply_xor(&x0, &x1).unwrap();
            let b = engine.apply_xor(&x1, &x2).unwrap();
            let arcs = match engine.apply(&a, &b, BoolOp::And).unwrap() {
                UnreducedBdd::Arcs(arcs) => arcs,
                UnreducedBdd::Reduced(bdd) => panic!("unexpected shortcut to {}", bdd),
            };
            let levels = arcs.read_levels().unwrap();
            assert_eq!(levels.iter().map(|l| l.label).collect::<Vec<_>>(), vec![0, 1, 2]);
            // level 1 holds the products of x1 and ~x1 with (x1 xor x2), at most two
            assert!(levels[1].count <= 2, "{:?}", levels);
            assert_eq!(arcs.node_count(), levels.iter().map(|l| l.count).sum::<u64>());

            let res = engine.reduce(arcs.into()).unwrap();
            for bits in 0..8u32 {
                let val = |i| (bits >> i) & 1 == 1;
                let expected = (val(0) ^ val(1)) && (val(1) ^ val(2));
                let input: Vec<_> = (0..3).map(|i| crate::node::Assignment::new(i, val(i))).collect();
                assert_eq!(engine.evaluate(&res, &input).unwrap(), expected, "bits = {:03b}", bits);
            }
        }
    }

    #[test]
    fn test_negated_operands() {
        let engine = Engine::default();
        let x0 = engine.ithvar(0).unwrap();
        let x1 = engine.ithvar(1).unwrap();
        // ~(x0 & x1) == ~x0 | ~x1
        let lhs = !engine.apply_and(&x0, &x1).unwrap();
        let rhs = engine.apply_or(&!&x0, &!&x1).unwrap();
        assert!(engine.equal(&lhs, &rhs).unwrap());
    }
}
