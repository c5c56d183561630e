//! The engine and its diagram handles.
//!
//! [`Engine`] owns the configuration every algorithm runs with. Diagrams are
//! plain values: a [`Bdd`] is a shared [`NodeFile`] plus a negation flag, so
//! copying a diagram or negating it never touches the disk.
//!
//! The algorithms live in their own modules (`apply`, `reduce`, `quantify`, ...)
//! as further `impl Engine` blocks.

use std::fmt::{Display, Formatter};
use std::ops::Not;

use log::debug;

use crate::config::Config;
use crate::error::Result;
use crate::op::BoolOp;
use crate::store::{ArcFile, NodeFile, NodeStream};

#[derive(Debug, Default)]
pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        debug!("Engine::new(config = {:?})", config);
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// A reduced diagram.
#[derive(Debug, Clone)]
pub struct Bdd {
    file: NodeFile,
    negate: bool,
}

impl Bdd {
    pub fn new(file: NodeFile) -> Self {
        Self { file, negate: false }
    }

    pub fn file(&self) -> &NodeFile {
        &self.file
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// Whether both diagrams are backed by the same file, regardless of negation.
    pub fn same_storage(&self, other: &Bdd) -> bool {
        self.file.same_storage(&other.file)
    }

    /// Value of a constant diagram.
    pub fn sink_value(&self) -> Option<bool> {
        self.file.sink_value().map(|v| v ^ self.negate)
    }

    pub fn is_sink(&self) -> bool {
        self.file.is_sink()
    }

    pub fn is_true(&self) -> bool {
        self.sink_value() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.sink_value() == Some(false)
    }

    /// Nodes root first, as seen through the negation flag.
    pub fn nodes(&self) -> Result<NodeStream> {
        self.file.nodes(self.negate)
    }

    /// Number of internal nodes.
    pub fn node_count(&self) -> u64 {
        if self.is_sink() {
            0
        } else {
            self.file.len()
        }
    }
}

impl Not for Bdd {
    type Output = Bdd;

    fn not(self) -> Self::Output {
        Bdd {
            file: self.file,
            negate: !self.negate,
        }
    }
}

impl Not for &Bdd {
    type Output = Bdd;

    fn not(self) -> Self::Output {
        !self.clone()
    }
}

impl Display for Bdd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.sink_value() {
            Some(v) => write!(f, "Bdd({})", if v { "T" } else { "F" }),
            None => write!(
                f,
                "Bdd({}nodes = {}, levels = {})",
                if self.negate { "~" } else { "" },
                self.file.len(),
                self.file.level_count()
            ),
        }
    }
}

/// Result of an algorithm before reduction.
///
/// Shortcuts return an already reduced diagram, everything else an arc file.
#[derive(Debug, Clone)]
pub enum UnreducedBdd {
    Reduced(Bdd),
    Arcs(ArcFile),
}

impl From<Bdd> for UnreducedBdd {
    fn from(bdd: Bdd) -> Self {
        UnreducedBdd::Reduced(bdd)
    }
}

impl From<ArcFile> for UnreducedBdd {
    fn from(arcs: ArcFile) -> Self {
        UnreducedBdd::Arcs(arcs)
    }
}

impl Engine {
    pub fn apply_and(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_and(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::And)
    }

    pub fn apply_or(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_or(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::Or)
    }

    pub fn apply_xor(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_xor(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::Xor)
    }

    pub fn apply_eq(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_eq(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::Xnor)
    }

    pub fn apply_imply(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_imply(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::Imp)
    }

    pub fn apply_diff(&self, u: &Bdd, v: &Bdd) -> Result<Bdd> {
        debug!("apply_diff(u = {}, v = {})", u, v);
        self.apply_reduced(u, v, BoolOp::Diff)
    }

    pub fn apply_not(&self, f: &Bdd) -> Bdd {
        !f
    }

    pub fn apply_and_many<'a>(&self, items: impl IntoIterator<Item = &'a Bdd>) -> Result<Bdd> {
        let mut res = self.constant(true)?;
        for f in items {
            res = self.apply_and(&res, f)?;
        }
        Ok(res)
    }

    pub fn apply_or_many<'a>(&self, items: impl IntoIterator<Item = &'a Bdd>) -> Result<Bdd> {
        let mut res = self.constant(false)?;
        for f in items {
            res = self.apply_or(&res, f)?;
        }
        Ok(res)
    }

    /// Apply followed by reduction.
    pub fn apply_reduced(&self, u: &Bdd, v: &Bdd, op: BoolOp) -> Result<Bdd> {
        let unreduced = self.apply(u, v, op)?;
        self.reduce(unreduced)
    }

    /// Whether `u` and `v` represent the same function.
    pub fn equal(&self, u: &Bdd, v: &Bdd) -> Result<bool> {
        if u.same_storage(v) {
            // f and !f never coincide
            return Ok(u.negate == v.negate);
        }
        match (u.sink_value(), v.sink_value()) {
            (Some(a), Some(b)) => return Ok(a == b),
            (Some(_), None) | (None, Some(_)) => return Ok(false),
            (None, None) => {}
        }
        if u.negate != v.negate {
            return Ok(self.apply_xor(u, v)?.is_false());
        }
        // same flag: both files are canonical forms of the functions behind the flag
        if u.file.len() != v.file.len() || u.file.level_count() != v.file.level_count() {
            return Ok(false);
        }
        if u.file.read_levels()? != v.file.read_levels()? {
            return Ok(false);
        }
        let mut a = u.file.nodes_bottom_up(false)?;
        let mut b = v.file.nodes_bottom_up(false)?;
        while a.can_pull() && b.can_pull() {
            if a.pull()? != b.pull()? {
                return Ok(false);
            }
        }
        Ok(!a.can_pull() && !b.can_pull())
    }
}
