use std::fmt::{Display, Formatter};
use std::ops::Not;

use crate::file::impl_record;
use crate::ptr::{Id, Label, Ptr};

/// A decision node, or the single node of a constant diagram.
///
/// For an internal node `low != high`, and both children are terminals or
/// nodes on strictly deeper levels. A terminal node has `low == high == NIL`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Node {
    pub uid: Ptr,
    pub low: Ptr,
    pub high: Ptr,
}

impl Node {
    pub const fn new(uid: Ptr, low: Ptr, high: Ptr) -> Self {
        Self { uid, low, high }
    }

    pub const fn sink(value: bool) -> Self {
        Self {
            uid: Ptr::sink(value),
            low: Ptr::NIL,
            high: Ptr::NIL,
        }
    }

    /// Rebuilds a node from its two outgoing arcs.
    pub fn from_arcs(low: Arc, high: Arc) -> Self {
        debug_assert!(!low.source.is_flagged() && high.source.is_flagged());
        debug_assert_eq!(low.source, high.source.unflag());
        Self {
            uid: low.source,
            low: low.target,
            high: high.target,
        }
    }

    pub const fn is_sink(&self) -> bool {
        self.uid.is_sink()
    }

    pub const fn value(&self) -> bool {
        self.uid.value()
    }

    pub const fn label(&self) -> Label {
        self.uid.label()
    }

    pub const fn id(&self) -> Id {
        self.uid.id()
    }

    pub const fn low_arc(&self) -> Arc {
        Arc::new(self.uid, self.low)
    }

    pub const fn high_arc(&self) -> Arc {
        Arc::new(self.uid.flag(), self.high)
    }
}

impl Not for Node {
    type Output = Self;

    /// Complements the function: every terminal is flipped, nodes keep their identity.
    fn not(self) -> Self::Output {
        Self {
            uid: !self.uid,
            low: !self.low,
            high: !self.high,
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_sink() {
            write!(f, "{}", self.uid)
        } else {
            write!(f, "{} -> [{}, {}]", self.uid, self.low, self.high)
        }
    }
}

/// A single edge of a not yet reduced diagram. The source is flagged for high edges.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Arc {
    pub source: Ptr,
    pub target: Ptr,
}

impl Arc {
    pub const fn new(source: Ptr, target: Ptr) -> Self {
        Self { source, target }
    }

    pub const fn is_high(&self) -> bool {
        self.source.is_flagged()
    }
}

impl Display for Arc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} => {}", self.source, self.target)
    }
}

/// Number of nodes on one level of a diagram.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LevelInfo {
    pub label: Label,
    pub count: u64,
}

impl LevelInfo {
    pub const fn new(label: Label, count: u64) -> Self {
        Self { label, count }
    }
}

/// Value given to a single variable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Assignment {
    pub label: Label,
    pub value: bool,
}

impl Assignment {
    pub const fn new(label: Label, value: bool) -> Self {
        Self { label, value }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", if self.value { "" } else { "~" }, self.label)
    }
}

impl_record!(Node { uid, low, high });
impl_record!(Arc { source, target });
impl_record!(LevelInfo { label, count });
impl_record!(Assignment { label, value });

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_node_from_arcs() {
        let uid = Ptr::node(1, 0).unwrap();
        let n = Node::new(uid, Ptr::FALSE, Ptr::TRUE);
        assert_eq!(Node::from_arcs(n.low_arc(), n.high_arc()), n);
        assert!(n.high_arc().is_high());
        assert!(!n.low_arc().is_high());
    }

    #[test]
    fn test_negate_node() {
        let uid = Ptr::node(2, 3).unwrap();
        let child = Ptr::node(4, 0).unwrap();
        let n = Node::new(uid, Ptr::FALSE, child);
        assert_eq!(!n, Node::new(uid, Ptr::TRUE, child));
        assert_eq!(!Node::sink(true), Node::sink(false));
    }

    #[test]
    fn test_sink_node() {
        let n = Node::sink(true);
        assert!(n.is_sink());
        assert!(n.value());
        assert!(n.low.is_nil());
        assert!(n.high.is_nil());
    }
}
