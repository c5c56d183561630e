//! Storage of diagrams.
//!
//! A [`NodeFile`] is the canonical form: nodes bottom-up (descending uid) and
//! one [`LevelInfo`] per level, also bottom-up. An [`ArcFile`] is the output of
//! a top-down sweep waiting for reduction: node arcs in ascending target order,
//! sink arcs in ascending source order and level info top-down.
//!
//! Both are produced by a writer that is consumed on `finish`, so a file is
//! never modified once another stage can see it. Cloning a file clones the
//! handle; the temporary files go away with the last handle.

use std::sync;

use crate::config::{Config, MemoryBudget};
use crate::error::Result;
use crate::file::{Direction, RawFile, RecordStream, RecordWriter};
use crate::node::{Arc, LevelInfo, Node};
use crate::ptr::{Label, Ptr};
use crate::queue::Sweep;
use crate::sorter::Sorter;

pub type LevelStream = RecordStream<LevelInfo>;

#[derive(Debug)]
struct NodeStorage {
    nodes: RawFile<Node>,
    levels: RawFile<LevelInfo>,
    sink: Option<bool>,
    block_size: usize,
}

/// Shared handle to the nodes of a reduced diagram.
#[derive(Debug, Clone)]
pub struct NodeFile(sync::Arc<NodeStorage>);

impl NodeFile {
    /// The file of a constant diagram.
    pub fn sink(config: &Config, value: bool) -> Result<Self> {
        let mut writer = NodeWriter::new(config)?;
        writer.push(Node::sink(value))?;
        writer.finish()
    }

    /// Writes `nodes`, given bottom-up, into a new file.
    pub fn from_nodes(config: &Config, nodes: impl IntoIterator<Item = Node>) -> Result<Self> {
        let mut writer = NodeWriter::new(config)?;
        for n in nodes {
            writer.push(n)?;
        }
        writer.finish()
    }

    /// Whether both handles refer to the same underlying storage.
    pub fn same_storage(&self, other: &NodeFile) -> bool {
        sync::Arc::ptr_eq(&self.0, &other.0)
    }

    /// Value of a constant diagram, `None` if the diagram has nodes.
    pub fn sink_value(&self) -> Option<bool> {
        self.0.sink
    }

    pub fn is_sink(&self) -> bool {
        self.0.sink.is_some()
    }

    /// Number of records, including the single terminal of a constant diagram.
    pub fn len(&self) -> u64 {
        self.0.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn level_count(&self) -> u64 {
        self.0.levels.len()
    }

    /// Nodes root first, with terminals flipped if `negate` is set.
    pub fn nodes(&self, negate: bool) -> Result<NodeStream> {
        let inner = self.0.nodes.stream(Direction::Backward, self.0.block_size)?;
        Ok(NodeStream { inner, negate })
    }

    /// Nodes in storage order, deepest first.
    pub fn nodes_bottom_up(&self, negate: bool) -> Result<NodeStream> {
        let inner = self.0.nodes.stream(Direction::Forward, self.0.block_size)?;
        Ok(NodeStream { inner, negate })
    }

    pub fn levels(&self, sweep: Sweep) -> Result<LevelStream> {
        let direction = match sweep {
            Sweep::TopDown => Direction::Backward,
            Sweep::BottomUp => Direction::Forward,
        };
        self.0.levels.stream(direction, self.0.block_size)
    }

    /// Label of the root, `None` for a constant.
    pub fn min_label(&self) -> Result<Option<Label>> {
        let mut s = self.levels(Sweep::TopDown)?;
        Ok(if s.can_pull() { Some(s.pull()?.label) } else { None })
    }

    /// Label of the deepest level, `None` for a constant.
    pub fn max_label(&self) -> Result<Option<Label>> {
        let mut s = self.levels(Sweep::BottomUp)?;
        Ok(if s.can_pull() { Some(s.pull()?.label) } else { None })
    }

    /// Whether any node tests `label`.
    pub fn has_label(&self, label: Label) -> Result<bool> {
        for info in self.levels(Sweep::TopDown)? {
            let info = info?;
            if info.label == label {
                return Ok(true);
            }
            if info.label > label {
                break;
            }
        }
        Ok(false)
    }

    /// All records in storage order.
    pub fn read_nodes(&self) -> Result<Vec<Node>> {
        self.0.nodes.read_all(Direction::Forward)
    }

    /// All level info in storage order.
    pub fn read_levels(&self) -> Result<Vec<LevelInfo>> {
        self.0.levels.read_all(Direction::Forward)
    }
}

/// Node reader that can complement the diagram on the fly.
pub struct NodeStream {
    inner: RecordStream<Node>,
    negate: bool,
}

impl NodeStream {
    pub fn can_pull(&self) -> bool {
        self.inner.can_pull()
    }

    pub fn peek(&mut self) -> Result<Node> {
        let n = self.inner.peek()?;
        Ok(if self.negate { !n } else { n })
    }

    pub fn pull(&mut self) -> Result<Node> {
        let n = self.inner.pull()?;
        Ok(if self.negate { !n } else { n })
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

impl Iterator for NodeStream {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.can_pull() {
            Some(self.pull())
        } else {
            None
        }
    }
}

/// Writes a [`NodeFile`] bottom-up and keeps its level info.
pub struct NodeWriter {
    nodes: RawFile<Node>,
    levels: RawFile<LevelInfo>,
    node_out: RecordWriter<Node>,
    level_out: RecordWriter<LevelInfo>,
    current: Option<LevelInfo>,
    last: Option<Node>,
    sink: Option<bool>,
    block_size: usize,
}

impl NodeWriter {
    pub fn new(config: &Config) -> Result<Self> {
        let dir = config.tmp_dir.as_deref();
        let nodes = RawFile::create(dir)?;
        let levels = RawFile::create(dir)?;
        let node_out = nodes.append()?;
        let level_out = levels.append()?;
        Ok(Self {
            nodes,
            levels,
            node_out,
            level_out,
            current: None,
            last: None,
            sink: None,
            block_size: config.block_size,
        })
    }

    pub fn has_pushed(&self) -> bool {
        self.last.is_some()
    }

    /// Appends the next node. Nodes come in descending uid order, children already written.
    pub fn push(&mut self, node: Node) -> Result<()> {
        if node.is_sink() {
            debug_assert!(self.last.is_none(), "a terminal must be the only node in a file");
            self.sink = Some(node.value());
        } else {
            debug_assert!(self.sink.is_none(), "a terminal must be the only node in a file");
            debug_assert!(!node.uid.is_flagged());
            debug_assert_ne!(node.low, node.high, "redundant node {}", node);
            debug_assert!(node.low.is_sink() || node.low.label() > node.label());
            debug_assert!(node.high.is_sink() || node.high.label() > node.label());
            debug_assert!(
                self.last.map_or(true, |last| last.uid > node.uid),
                "nodes must be written in descending order"
            );
            match self.current.as_mut() {
                Some(info) if info.label == node.label() => info.count += 1,
                _ => {
                    if let Some(info) = self.current.take() {
                        self.level_out.push(&info)?;
                    }
                    self.current = Some(LevelInfo::new(node.label(), 1));
                }
            }
        }
        self.node_out.push(&node)?;
        self.last = Some(node);
        Ok(())
    }

    pub fn finish(mut self) -> Result<NodeFile> {
        debug_assert!(self.last.is_some(), "empty node file");
        if let Some(info) = self.current.take() {
            self.level_out.push(&info)?;
        }
        self.nodes.commit(self.node_out)?;
        self.levels.commit(self.level_out)?;
        Ok(NodeFile(sync::Arc::new(NodeStorage {
            nodes: self.nodes,
            levels: self.levels,
            sink: self.sink,
            block_size: self.block_size,
        })))
    }
}

#[derive(Debug)]
struct ArcStorage {
    node_arcs: RawFile<Arc>,
    sink_arcs: RawFile<Arc>,
    levels: RawFile<LevelInfo>,
    block_size: usize,
}

/// Shared handle to the arcs of a diagram that is not reduced yet.
#[derive(Debug, Clone)]
pub struct ArcFile(sync::Arc<ArcStorage>);

impl ArcFile {
    pub fn same_storage(&self, other: &ArcFile) -> bool {
        sync::Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn node_arc_count(&self) -> u64 {
        self.0.node_arcs.len()
    }

    pub fn sink_arc_count(&self) -> u64 {
        self.0.sink_arcs.len()
    }

    /// Every node has exactly two arcs.
    pub fn node_count(&self) -> u64 {
        (self.node_arc_count() + self.sink_arc_count()) / 2
    }

    /// Node arcs in descending target order.
    pub fn node_arcs_bottom_up(&self) -> Result<RecordStream<Arc>> {
        self.0.node_arcs.stream(Direction::Backward, self.0.block_size)
    }

    /// Sink arcs in descending source order.
    pub fn sink_arcs_bottom_up(&self) -> Result<RecordStream<Arc>> {
        self.0.sink_arcs.stream(Direction::Backward, self.0.block_size)
    }

    pub fn levels(&self, sweep: Sweep) -> Result<LevelStream> {
        let direction = match sweep {
            Sweep::TopDown => Direction::Forward,
            Sweep::BottomUp => Direction::Backward,
        };
        self.0.levels.stream(direction, self.0.block_size)
    }

    pub fn read_node_arcs(&self) -> Result<Vec<Arc>> {
        self.0.node_arcs.read_all(Direction::Forward)
    }

    pub fn read_sink_arcs(&self) -> Result<Vec<Arc>> {
        self.0.sink_arcs.read_all(Direction::Forward)
    }

    pub fn read_levels(&self) -> Result<Vec<LevelInfo>> {
        self.0.levels.read_all(Direction::Forward)
    }
}

fn by_source(a: &Arc, b: &Arc) -> std::cmp::Ordering {
    a.source.cmp(&b.source)
}

/// Writes an [`ArcFile`].
///
/// Node arcs must be pushed in ascending target order and levels top-down.
/// Sink arcs are either pushed in ascending source order, or collected in a
/// sorter when the writer is created with [`ArcWriter::with_unsorted_sinks`].
pub struct ArcWriter {
    node_arcs: RawFile<Arc>,
    sink_arcs: RawFile<Arc>,
    levels: RawFile<LevelInfo>,
    node_out: RecordWriter<Arc>,
    sink_out: RecordWriter<Arc>,
    level_out: RecordWriter<LevelInfo>,
    unsorted_sinks: Option<(Sorter<Arc>, MemoryBudget)>,
    last_node_target: Option<Ptr>,
    last_sink_source: Option<Ptr>,
    block_size: usize,
}

impl ArcWriter {
    pub fn new(config: &Config) -> Result<Self> {
        let dir = config.tmp_dir.as_deref();
        let node_arcs = RawFile::create(dir)?;
        let sink_arcs = RawFile::create(dir)?;
        let levels = RawFile::create(dir)?;
        Ok(Self {
            node_out: node_arcs.append()?,
            sink_out: sink_arcs.append()?,
            level_out: levels.append()?,
            node_arcs,
            sink_arcs,
            levels,
            unsorted_sinks: None,
            last_node_target: None,
            last_sink_source: None,
            block_size: config.block_size,
        })
    }

    /// A writer that accepts sink arcs in any order and sorts them on finish.
    pub fn with_unsorted_sinks(config: &Config, budget: MemoryBudget) -> Result<Self> {
        let mut writer = Self::new(config)?;
        let sorter = Sorter::new(by_source, budget, config.tmp_dir.clone());
        writer.unsorted_sinks = Some((sorter, budget));
        Ok(writer)
    }

    pub fn push_level(&mut self, info: LevelInfo) -> Result<()> {
        self.level_out.push(&info)
    }

    pub fn push_node_arc(&mut self, arc: Arc) -> Result<()> {
        debug_assert!(arc.target.is_node() && !arc.target.is_flagged());
        debug_assert!(
            self.last_node_target.map_or(true, |t| t <= arc.target),
            "node arcs must be written in ascending target order"
        );
        self.last_node_target = Some(arc.target);
        self.node_out.push(&arc)
    }

    pub fn push_sink_arc(&mut self, arc: Arc) -> Result<()> {
        debug_assert!(arc.target.is_sink());
        if let Some((sorter, _)) = self.unsorted_sinks.as_mut() {
            return sorter.push(arc);
        }
        debug_assert!(
            self.last_sink_source.map_or(true, |s| s < arc.source),
            "sink arcs must be written in ascending source order"
        );
        self.last_sink_source = Some(arc.source);
        self.sink_out.push(&arc)
    }

    pub fn finish(mut self) -> Result<ArcFile> {
        if let Some((mut sorter, budget)) = self.unsorted_sinks.take() {
            sorter.finalize(budget)?;
            while sorter.can_pull() {
                self.sink_out.push(&sorter.pull()?)?;
            }
        }
        self.node_arcs.commit(self.node_out)?;
        self.sink_arcs.commit(self.sink_out)?;
        self.levels.commit(self.level_out)?;
        Ok(ArcFile(sync::Arc::new(ArcStorage {
            node_arcs: self.node_arcs,
            sink_arcs: self.sink_arcs,
            levels: self.levels,
            block_size: self.block_size,
        })))
    }
}
