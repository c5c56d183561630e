//! Constructors of basic diagrams.
//!
//! Every node gets the id `MAX_ID`, the id [`reduce`][crate::bdd::Engine::reduce]
//! gives the first node of a level, so a built diagram is stored exactly like the
//! reduced result of any computation of the same function.

use log::debug;

use crate::bdd::{Bdd, Engine};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::ptr::{Id, Label, Ptr, MAX_ID};
use crate::store::{NodeFile, NodeWriter};

fn check_ascending(labels: &[Label]) -> Result<()> {
    for w in labels.windows(2) {
        if w[0] >= w[1] {
            return Err(Error::invalid(format!(
                "labels must be strictly ascending, got {} before {}",
                w[0], w[1]
            )));
        }
    }
    Ok(())
}

impl Engine {
    pub fn constant(&self, value: bool) -> Result<Bdd> {
        Ok(Bdd::new(NodeFile::sink(self.config(), value)?))
    }

    /// The variable `x_label`.
    pub fn ithvar(&self, label: Label) -> Result<Bdd> {
        let node = Node::new(Ptr::node(label, MAX_ID)?, Ptr::FALSE, Ptr::TRUE);
        Ok(Bdd::new(NodeFile::from_nodes(self.config(), [node])?))
    }

    /// The negated variable `!x_label`.
    pub fn nithvar(&self, label: Label) -> Result<Bdd> {
        let node = Node::new(Ptr::node(label, MAX_ID)?, Ptr::TRUE, Ptr::FALSE);
        Ok(Bdd::new(NodeFile::from_nodes(self.config(), [node])?))
    }

    /// Conjunction of the variables in `labels`, which must be strictly ascending.
    pub fn and_labels(&self, labels: &[Label]) -> Result<Bdd> {
        debug!("and_labels(labels = {:?})", labels);
        self.chain(labels, true)
    }

    /// Disjunction of the variables in `labels`, which must be strictly ascending.
    pub fn or_labels(&self, labels: &[Label]) -> Result<Bdd> {
        debug!("or_labels(labels = {:?})", labels);
        self.chain(labels, false)
    }

    /// True when exactly `threshold` of the variables `min_label..=max_label` are true.
    ///
    /// A node stands for the number of true variables above it. Only counts from
    /// which `threshold` is still reachable get a node, so the result is reduced
    /// as built; ids are given the way reduce orders a level, by children.
    pub fn counter(&self, min_label: Label, max_label: Label, threshold: u64) -> Result<Bdd> {
        debug!(
            "counter(min_label = {}, max_label = {}, threshold = {})",
            min_label, max_label, threshold
        );
        if min_label > max_label {
            return Err(Error::invalid(format!(
                "empty label range {}..={}",
                min_label, max_label
            )));
        }
        Ptr::node(max_label, MAX_ID)?;
        if threshold > max_label - min_label + 1 {
            return self.constant(false);
        }

        let t = threshold as usize;
        let mut out = NodeWriter::new(self.config())?;
        // node of the level below for every count, false where the count is hopeless
        let mut below = vec![Ptr::FALSE; t + 2];
        below[t] = Ptr::TRUE;
        for label in (min_label..=max_label).rev() {
            let remaining = max_label - label + 1;
            let lo = threshold.saturating_sub(remaining) as usize;
            let hi = threshold.min(label - min_label) as usize;
            let mut level: Vec<(usize, Ptr, Ptr)> = (lo..=hi).map(|c| (c, below[c], below[c + 1])).collect();
            level.sort_by(|a, b| (b.2, b.1).cmp(&(a.2, a.1)));

            let mut current = vec![Ptr::FALSE; t + 2];
            for (i, &(c, low, high)) in level.iter().enumerate() {
                let uid = Ptr::node(label, MAX_ID - i as Id)?;
                out.push(Node::new(uid, low, high))?;
                current[c] = uid;
            }
            below = current;
        }
        Ok(Bdd::new(out.finish()?))
    }

    /// A single path through all `labels`; every other edge goes to `!conjunction`.
    fn chain(&self, labels: &[Label], conjunction: bool) -> Result<Bdd> {
        check_ascending(labels)?;
        if labels.is_empty() {
            return self.constant(conjunction);
        }
        let mut nodes = Vec::with_capacity(labels.len());
        let mut next = Ptr::sink(conjunction);
        for &label in labels.iter().rev() {
            let uid = Ptr::node(label, MAX_ID)?;
            let n = if conjunction {
                Node::new(uid, Ptr::FALSE, next)
            } else {
                Node::new(uid, next, Ptr::TRUE)
            };
            nodes.push(n);
            next = uid;
        }
        Ok(Bdd::new(NodeFile::from_nodes(self.config(), nodes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::node::LevelInfo;
    use crate::ptr::MAX_LABEL;

    #[test]
    fn test_ithvar() {
        let engine = Engine::default();
        let x = engine.ithvar(7).unwrap();
        let uid = Ptr::node(7, MAX_ID).unwrap();
        assert_eq!(x.file().read_nodes().unwrap(), vec![Node::new(uid, Ptr::FALSE, Ptr::TRUE)]);
        assert_eq!(x.file().read_levels().unwrap(), vec![LevelInfo::new(7, 1)]);
        let nx = engine.nithvar(7).unwrap();
        assert_eq!(nx.file().read_nodes().unwrap(), vec![Node::new(uid, Ptr::TRUE, Ptr::FALSE)]);
    }

    #[test]
    fn test_label_overflow() {
        let engine = Engine::default();
        assert!(engine.ithvar(MAX_LABEL).is_ok());
        assert!(matches!(engine.ithvar(MAX_LABEL + 1), Err(Error::Overflow { what: "label", .. })));
        assert!(matches!(engine.and_labels(&[0, MAX_LABEL + 1]), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_and_labels() {
        let engine = Engine::default();
        let f = engine.and_labels(&[1, 3, 4]).unwrap();
        let n4 = Ptr::node(4, MAX_ID).unwrap();
        let n3 = Ptr::node(3, MAX_ID).unwrap();
        let n1 = Ptr::node(1, MAX_ID).unwrap();
        assert_eq!(
            f.file().read_nodes().unwrap(),
            vec![
                Node::new(n4, Ptr::FALSE, Ptr::TRUE),
                Node::new(n3, Ptr::FALSE, n4),
                Node::new(n1, Ptr::FALSE, n3),
            ]
        );
        let x1 = engine.ithvar(1).unwrap();
        let x3 = engine.ithvar(3).unwrap();
        let x4 = engine.ithvar(4).unwrap();
        let g = engine.apply_and_many([&x1, &x3, &x4]).unwrap();
        assert!(engine.equal(&f, &g).unwrap());
    }

    #[test]
    fn test_or_labels() {
        let engine = Engine::default();
        let f = engine.or_labels(&[0, 2]).unwrap();
        let x0 = engine.ithvar(0).unwrap();
        let x2 = engine.ithvar(2).unwrap();
        let g = engine.apply_or(&x0, &x2).unwrap();
        assert_eq!(f.file().read_nodes().unwrap(), g.file().read_nodes().unwrap());
    }

    fn binomial(n: u64, k: u64) -> u128 {
        (0..k).fold(1u128, |acc, i| acc * (n - i) as u128 / (i + 1) as u128)
    }

    #[test]
    fn test_counter_counts_binomials() {
        let engine = Engine::default();
        for threshold in 0..=5 {
            let f = engine.counter(0, 4, threshold).unwrap();
            assert_eq!(engine.sat_count(&f, 5).unwrap(), binomial(5, threshold), "threshold = {}", threshold);
            let g = engine.counter(2, 6, threshold).unwrap();
            assert_eq!(engine.sat_count(&g, 8).unwrap(), binomial(5, threshold) << 3);
        }
        assert!(engine.counter(0, 4, 6).unwrap().is_false());
        assert!(matches!(engine.counter(3, 2, 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(engine.counter(0, MAX_LABEL + 1, 1), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_counter_truth_table() {
        let engine = Engine::default();
        let f = engine.counter(1, 4, 2).unwrap();
        for bits in 0..16u32 {
            let input: Vec<_> = (0..4)
                .map(|i| crate::node::Assignment::new(i + 1, (bits >> i) & 1 == 1))
                .collect();
            assert_eq!(engine.evaluate(&f, &input).unwrap(), bits.count_ones() == 2, "bits = {:04b}", bits);
        }
    }

    #[test]
    fn test_counter_is_canonical() {
        let engine = Engine::default();
        let x: Vec<Bdd> = (0..3).map(|i| engine.ithvar(i).unwrap()).collect();
        // exactly one of three: odd parity and not all three
        let parity = engine.apply_xor(&engine.apply_xor(&x[0], &x[1]).unwrap(), &x[2]).unwrap();
        let all = engine.and_labels(&[0, 1, 2]).unwrap();
        let g = engine.apply_diff(&parity, &all).unwrap();
        let f = engine.counter(0, 2, 1).unwrap();
        assert!(!g.is_negated());
        assert_eq!(f.file().read_nodes().unwrap(), g.file().read_nodes().unwrap());
        assert_eq!(f.file().read_levels().unwrap(), g.file().read_levels().unwrap());
        // threshold zero is the conjunction of the negated variables
        let none = engine.counter(0, 2, 0).unwrap();
        let nots: Vec<Bdd> = (0..3).map(|i| engine.nithvar(i).unwrap()).collect();
        assert!(engine.equal(&none, &engine.apply_and_many(&nots).unwrap()).unwrap());
    }

    #[test]
    fn test_empty_and_unsorted_labels() {
        let engine = Engine::default();
        assert!(engine.and_labels(&[]).unwrap().is_true());
        assert!(engine.or_labels(&[]).unwrap().is_false());
        assert!(matches!(engine.and_labels(&[2, 1]), Err(Error::InvalidArgument(_))));
        assert!(matches!(engine.or_labels(&[1, 1]), Err(Error::InvalidArgument(_))));
    }
}
