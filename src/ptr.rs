//! Packed 64-bit pointers to nodes and terminals.
//!
//! Layout, from the most significant bit:
//!
//! | bits     | node          | terminal      |
//! |----------|---------------|---------------|
//! | 63       | `0`           | `1`           |
//! | 43..=62  | label         | `0`           |
//! | 1..=42   | id            | value (bit 1) |
//! | 0        | flag          | flag          |
//!
//! Comparing two pointers as integers orders them by node-before-terminal, then
//! by label, then by id, then by flag. Every stream in this crate relies on that.

use std::fmt::{Display, Formatter};
use std::ops::Not;

use crate::error::{Error, Result};

/// Variable index a node tests.
pub type Label = u64;

/// Dense index of a node within its level.
pub type Id = u64;

pub const FLAG_BIT: u64 = 1;
pub const SINK_BIT: u64 = 1 << 63;

pub const ID_BITS: u32 = 42;
pub const LABEL_BITS: u32 = 64 - 2 - ID_BITS;

pub const MAX_ID: Id = (1 << ID_BITS) - 1;
pub const MAX_LABEL: Label = (1 << LABEL_BITS) - 1;

const ID_SHIFT: u32 = 1;
const LABEL_SHIFT: u32 = ID_BITS + 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ptr(u64);

impl Ptr {
    /// Marker for "no child". Larger than every node and terminal pointer.
    pub const NIL: Ptr = Ptr(u64::MAX - 1);
    pub const FALSE: Ptr = Ptr::sink(false);
    pub const TRUE: Ptr = Ptr::sink(true);

    /// Creates a pointer to the node `(label, id)`.
    ///
    /// Fails with [`Error::Overflow`] if either field exceeds its bit width.
    pub fn node(label: Label, id: Id) -> Result<Self> {
        if label > MAX_LABEL {
            return Err(Error::Overflow {
                what: "label",
                max: MAX_LABEL as u128,
            });
        }
        if id > MAX_ID {
            return Err(Error::Overflow {
                what: "id",
                max: MAX_ID as u128,
            });
        }
        Ok(Self::node_unchecked(label, id))
    }

    /// Creates a node pointer without checking the field widths.
    pub(crate) const fn node_unchecked(label: Label, id: Id) -> Self {
        Self((label << LABEL_SHIFT) | (id << ID_SHIFT))
    }

    pub const fn sink(value: bool) -> Self {
        Self(SINK_BIT | ((value as u64) << ID_SHIFT))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the internal representation of the pointer.
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        self.0 >= Self::NIL.0
    }

    pub const fn is_sink(self) -> bool {
        !self.is_nil() && self.0 & SINK_BIT != 0
    }

    pub const fn is_node(self) -> bool {
        self.0 & SINK_BIT == 0
    }

    pub const fn is_false(self) -> bool {
        self.is_sink() && !self.value()
    }

    pub const fn is_true(self) -> bool {
        self.is_sink() && self.value()
    }

    /// Label of a node pointer. Meaningless for terminals and NIL.
    pub const fn label(self) -> Label {
        debug_assert!(self.is_node());
        self.0 >> LABEL_SHIFT
    }

    /// Id of a node pointer. Meaningless for terminals and NIL.
    pub const fn id(self) -> Id {
        debug_assert!(self.is_node());
        (self.0 >> ID_SHIFT) & MAX_ID
    }

    /// Value of a terminal pointer.
    pub const fn value(self) -> bool {
        debug_assert!(self.is_sink());
        (self.0 >> ID_SHIFT) & 1 == 1
    }

    pub const fn is_flagged(self) -> bool {
        self.0 & FLAG_BIT != 0
    }

    pub const fn flag(self) -> Self {
        Self(self.0 | FLAG_BIT)
    }

    pub const fn unflag(self) -> Self {
        Self(self.0 & !FLAG_BIT)
    }

    /// Flips the value of a terminal, keeping its flag. Nodes and NIL are unchanged.
    pub const fn negate(self) -> Self {
        if self.is_sink() {
            Self(self.0 ^ (1 << ID_SHIFT))
        } else {
            self
        }
    }
}

impl Not for Ptr {
    type Output = Self;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ptr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mark = if self.is_flagged() { "'" } else { "" };
        if self.is_nil() {
            write!(f, "nil{}", mark)
        } else if self.is_sink() {
            write!(f, "{}{}", if self.value() { "T" } else { "F" }, mark)
        } else {
            write!(f, "({}:{}){}", self.label(), self.id(), mark)
        }
    }
}
