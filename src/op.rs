//! Binary operators over terminals.
//!
//! An operator is fully described by its truth table; the shortcut predicates
//! used by [`apply`][crate::bdd::Engine::apply] are derived from it.
//!
//! | op       | FF | FT | TF | TT |
//! |----------|----|----|----|----|
//! | `And`    | 0  | 0  | 0  | 1  |
//! | `Or`     | 0  | 1  | 1  | 1  |
//! | `Xor`    | 0  | 1  | 1  | 0  |
//! | `Imp`    | 1  | 1  | 0  | 1  |
//! | `Diff`   | 0  | 0  | 1  | 0  |

use std::fmt::{Debug, Formatter};

use crate::ptr::Ptr;

#[derive(Copy, Clone)]
pub enum BoolOp {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    /// Equivalence.
    Xnor,
    /// `a -> b`
    Imp,
    /// `b -> a`
    InvImp,
    /// `a & !b`
    Diff,
    /// `!a & b`
    Less,
    /// Any other operator.
    Custom(fn(bool, bool) -> bool),
}

impl BoolOp {
    pub fn eval(self, a: bool, b: bool) -> bool {
        match self {
            BoolOp::And => a & b,
            BoolOp::Nand => !(a & b),
            BoolOp::Or => a | b,
            BoolOp::Nor => !(a | b),
            BoolOp::Xor => a ^ b,
            BoolOp::Xnor => a == b,
            BoolOp::Imp => !a | b,
            BoolOp::InvImp => a | !b,
            BoolOp::Diff => a & !b,
            BoolOp::Less => !a & b,
            BoolOp::Custom(f) => f(a, b),
        }
    }

    /// Applies the operator to two terminal pointers. Flags are dropped.
    pub fn apply(self, a: Ptr, b: Ptr) -> Ptr {
        debug_assert!(a.is_sink() && b.is_sink());
        Ptr::sink(self.eval(a.value(), b.value()))
    }

    /// Truth table `[FF, FT, TF, TT]`.
    pub fn table(self) -> [bool; 4] {
        [
            self.eval(false, false),
            self.eval(false, true),
            self.eval(true, false),
            self.eval(true, true),
        ]
    }

    /// The right operand does not matter once the left one is the terminal `x`.
    pub fn can_left_shortcut(self, x: Ptr) -> bool {
        match (self, x.is_sink().then(|| x.value())) {
            (_, None) => false,
            (BoolOp::And, Some(v)) => !v,
            (BoolOp::Or, Some(v)) => v,
            (BoolOp::Imp, Some(v)) => !v,
            (BoolOp::Xor | BoolOp::Xnor, Some(_)) => false,
            (_, Some(v)) => self.eval(v, false) == self.eval(v, true),
        }
    }

    /// The left operand does not matter once the right one is the terminal `x`.
    pub fn can_right_shortcut(self, x: Ptr) -> bool {
        match (self, x.is_sink().then(|| x.value())) {
            (_, None) => false,
            (BoolOp::And, Some(v)) => !v,
            (BoolOp::Or, Some(v)) => v,
            (BoolOp::Imp, Some(v)) => v,
            (BoolOp::Xor | BoolOp::Xnor, Some(_)) => false,
            (_, Some(v)) => self.eval(false, v) == self.eval(true, v),
        }
    }

    /// With the left operand fixed to `x`, the result is the right operand.
    pub fn is_left_irrelevant(self, x: bool) -> bool {
        !self.eval(x, false) && self.eval(x, true)
    }

    /// With the left operand fixed to `x`, the result is the negated right operand.
    pub fn is_left_negating(self, x: bool) -> bool {
        self.eval(x, false) && !self.eval(x, true)
    }

    /// With the right operand fixed to `x`, the result is the left operand.
    pub fn is_right_irrelevant(self, x: bool) -> bool {
        !self.eval(false, x) && self.eval(true, x)
    }

    /// With the right operand fixed to `x`, the result is the negated left operand.
    pub fn is_right_negating(self, x: bool) -> bool {
        self.eval(false, x) && !self.eval(true, x)
    }

    pub fn is_commutative(self) -> bool {
        self.eval(false, true) == self.eval(true, false)
    }

    /// `op(x, x) == x` for both terminals.
    pub fn is_idempotent(self) -> bool {
        !self.eval(false, false) && self.eval(true, true)
    }
}

impl Debug for BoolOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BoolOp::And => "And",
            BoolOp::Nand => "Nand",
            BoolOp::Or => "Or",
            BoolOp::Nor => "Nor",
            BoolOp::Xor => "Xor",
            BoolOp::Xnor => "Xnor",
            BoolOp::Imp => "Imp",
            BoolOp::InvImp => "InvImp",
            BoolOp::Diff => "Diff",
            BoolOp::Less => "Less",
            BoolOp::Custom(_) => return write!(f, "Custom({:?})", self.table()),
        };
        write!(f, "{}", name)
    }
}

impl PartialEq for BoolOp {
    fn eq(&self, other: &Self) -> bool {
        self.table() == other.table()
    }
}

impl Eq for BoolOp {}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    const ALL: [BoolOp; 10] = [
        BoolOp::And,
        BoolOp::Nand,
        BoolOp::Or,
        BoolOp::Nor,
        BoolOp::Xor,
        BoolOp::Xnor,
        BoolOp::Imp,
        BoolOp::InvImp,
        BoolOp::Diff,
        BoolOp::Less,
    ];

    #[test]
    fn test_tables() {
        assert_eq!(BoolOp::And.table(), [false, false, false, true]);
        assert_eq!(BoolOp::Or.table(), [false, true, true, true]);
        assert_eq!(BoolOp::Imp.table(), [true, true, false, true]);
        assert_eq!(BoolOp::Less.table(), [false, true, false, false]);
    }

    #[test]
    fn test_shortcut_soundness() {
        for op in ALL {
            for x in [Ptr::FALSE, Ptr::TRUE] {
                if op.can_left_shortcut(x) {
                    assert_eq!(op.apply(x, Ptr::TRUE), op.apply(x, Ptr::FALSE), "{:?} left {}", op, x);
                }
                if op.can_right_shortcut(x) {
                    assert_eq!(op.apply(Ptr::TRUE, x), op.apply(Ptr::FALSE, x), "{:?} right {}", op, x);
                }
            }
        }
    }

    #[test]
    fn test_shortcut_completeness() {
        // the fast paths agree with the truth table
        for op in ALL {
            let custom = BoolOp::Custom(match op {
                BoolOp::And => |a, b| a & b,
                BoolOp::Nand => |a, b| !(a & b),
                BoolOp::Or => |a, b| a | b,
                BoolOp::Nor => |a, b| !(a | b),
                BoolOp::Xor => |a, b| a ^ b,
                BoolOp::Xnor => |a, b| a == b,
                BoolOp::Imp => |a, b| !a | b,
                BoolOp::InvImp => |a, b| a | !b,
                BoolOp::Diff => |a, b| a & !b,
                _ => |a, b| !a & b,
            });
            for x in [Ptr::FALSE, Ptr::TRUE] {
                assert_eq!(op.can_left_shortcut(x), custom.can_left_shortcut(x), "{:?}", op);
                assert_eq!(op.can_right_shortcut(x), custom.can_right_shortcut(x), "{:?}", op);
            }
        }
    }

    #[test]
    fn test_nodes_never_shortcut() {
        let p = Ptr::node(0, 0).unwrap();
        for op in ALL {
            assert!(!op.can_left_shortcut(p));
            assert!(!op.can_right_shortcut(p));
        }
    }

    #[test]
    fn test_irrelevant_and_negating() {
        assert!(BoolOp::And.is_left_irrelevant(true));
        assert!(BoolOp::Or.is_left_irrelevant(false));
        assert!(BoolOp::Xor.is_left_negating(true));
        assert!(BoolOp::Xor.is_left_irrelevant(false));
        assert!(BoolOp::Imp.is_left_irrelevant(true));
        assert!(BoolOp::Imp.is_right_negating(false));
        assert!(!BoolOp::And.is_left_irrelevant(false));
    }

    #[test]
    fn test_properties() {
        assert!(BoolOp::And.is_commutative() && BoolOp::And.is_idempotent());
        assert!(BoolOp::Or.is_commutative() && BoolOp::Or.is_idempotent());
        assert!(BoolOp::Xor.is_commutative() && !BoolOp::Xor.is_idempotent());
        assert!(!BoolOp::Imp.is_commutative());
    }
}
