//! The pattern construction surface: leaf constructors for every node kind and the composition
//! operators `&` (concatenation), `|` (alternation), `*` (assign on match) and `%` (assign
//! immediately), with the same flattening and numbering rules throughout.

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Mul, Rem};
use std::sync::Arc;

use crate::charset::CharSet;
use crate::pattern::{
    CharTest, Graph, NatArg, PatKind, PatLink, PatNode, Pattern, PatternCell, alternate,
    arbno_complex, arbno_simple, bracket, concat,
};
use crate::refs::{BoolGetter, NatSetter, NatVar, StrVar, StringGetter};

// ARGUMENT CONVERSIONS
// ================================================================================================

/// Conversion into the payload of a character-test constructor.
///
/// Strings convert to character sets (the test is membership, not sequence); a shared string
/// variable stays deferred and is read at match time. For a getter payload, wrap it with
/// [`CharTest::getter`].
pub trait IntoCharTest {
    fn into_char_test(self) -> CharTest;
}

impl IntoCharTest for CharTest {
    fn into_char_test(self) -> CharTest {
        self
    }
}

impl IntoCharTest for char {
    fn into_char_test(self) -> CharTest {
        CharTest::Char(crate::byte(self))
    }
}

impl IntoCharTest for u8 {
    fn into_char_test(self) -> CharTest {
        CharTest::Char(self)
    }
}

impl IntoCharTest for &str {
    fn into_char_test(self) -> CharTest {
        CharTest::Set(CharSet::from(self))
    }
}

impl IntoCharTest for &String {
    fn into_char_test(self) -> CharTest {
        CharTest::Set(CharSet::from(self.as_str()))
    }
}

impl IntoCharTest for CharSet {
    fn into_char_test(self) -> CharTest {
        CharTest::Set(self)
    }
}

impl IntoCharTest for &CharSet {
    fn into_char_test(self) -> CharTest {
        CharTest::Set(*self)
    }
}

impl IntoCharTest for &StrVar {
    fn into_char_test(self) -> CharTest {
        CharTest::Var(self.clone())
    }
}

/// Conversion into the payload of a position constructor. A shared natural variable stays
/// deferred and is read at match time; for a getter payload, wrap it with [`NatArg::getter`].
pub trait IntoNatArg {
    fn into_nat_arg(self) -> NatArg;
}

impl IntoNatArg for NatArg {
    fn into_nat_arg(self) -> NatArg {
        self
    }
}

impl IntoNatArg for usize {
    fn into_nat_arg(self) -> NatArg {
        NatArg::Lit(self)
    }
}

impl IntoNatArg for u32 {
    fn into_nat_arg(self) -> NatArg {
        NatArg::Lit(self as usize)
    }
}

impl IntoNatArg for &NatVar {
    fn into_nat_arg(self) -> NatArg {
        NatArg::Var(self.clone())
    }
}

// LEAF CONSTRUCTORS
// ================================================================================================

fn leaf(stack_index: usize, kind: PatKind) -> Pattern {
    Pattern::new(stack_index, Graph::leaf(kind))
}

/// Matches null and aborts the entire match on backtrack-through.
pub fn abort() -> Pattern {
    leaf(0, PatKind::Abort)
}

/// Matches a single byte satisfying the test.
pub fn any(t: impl IntoCharTest) -> Pattern {
    leaf(0, PatKind::Any(t.into_char_test()))
}

/// Matches any span of bytes, shortest first, extending one byte per backtrack.
pub fn arb() -> Pattern {
    let nodes = vec![
        PatNode::leaf(PatKind::ArbY),
        PatNode::leaf(PatKind::ArbX(PatLink::to(1))),
    ];
    Pattern::new(1, Graph { nodes })
}

/// Matches zero or more occurrences of `p`, fewest first.
///
/// A body that is known to consume on success without stacking compiles to the single-node
/// cyclic form; anything else builds the bracketed region with its null-iteration guard.
pub fn arbno(p: impl Into<Pattern>) -> Pattern {
    let p = p.into();
    if p.graph().is_empty() {
        return Pattern::null();
    }

    let graph = p.graph().clone();
    if p.stack_index() == 0 && graph[graph.root()].kind.ok_for_simple_arbno() {
        Pattern::new(0, arbno_simple(graph))
    } else {
        let iteration_stack = p.stack_index() + 3;
        Pattern::new(iteration_stack, arbno_complex(graph, iteration_stack))
    }
}

/// Matches a parenthesis-balanced, non-empty span.
pub fn bal() -> Pattern {
    bal_pair('(', ')')
}

/// [`bal`] over an arbitrary open/close pair.
pub fn bal_pair(open: char, close: char) -> Pattern {
    leaf(1, PatKind::Bal { open: crate::byte(open), close: crate::byte(close) })
}

/// Matches the (possibly empty) run of bytes up to but not including the first byte satisfying
/// the test; fails if the subject runs out first.
pub fn brk(t: impl IntoCharTest) -> Pattern {
    leaf(0, PatKind::Break(t.into_char_test()))
}

/// Like [`brk`], but on backtrack steps over the break byte and scans for the next one.
pub fn brkx(t: impl IntoCharTest) -> Pattern {
    // The break node is numbered 3, the alternation 1 and the extension 2; the alternation
    // matches null while stacking the extension, which eats the break byte and rematches.
    let nodes = vec![
        PatNode::leaf(PatKind::Alt(PatLink::to(2))),
        PatNode { next: PatLink::to(3), kind: PatKind::BreakXX },
        PatNode { next: PatLink::to(1), kind: PatKind::BreakX(t.into_char_test()) },
    ];
    Pattern::new(2, Graph { nodes })
}

/// Deferred reference to the pattern held by `cell`, resolved on every visit.
pub fn defer(cell: &PatternCell) -> Pattern {
    leaf(3, PatKind::Rpat(cell.clone()))
}

/// Deferred string literal: matches the contents of `var` as read at match time.
pub fn defer_str(var: &StrVar) -> Pattern {
    leaf(0, PatKind::StrRef(var.clone()))
}

/// Deferred string literal produced by a getter at match time.
pub fn defer_getter(getter: impl StringGetter + 'static) -> Pattern {
    leaf(0, PatKind::StrGet(Arc::new(getter)))
}

/// Deferred predicate: matches null if the getter returns true, fails otherwise.
pub fn defer_bool(getter: impl BoolGetter + 'static) -> Pattern {
    leaf(3, PatKind::PredFn(Arc::new(getter)))
}

/// Fails every time; forces backtracking.
pub fn fail() -> Pattern {
    leaf(0, PatKind::Fail)
}

/// Matches null; a later backtrack through it aborts the entire match.
pub fn fence() -> Pattern {
    leaf(1, PatKind::Fence)
}

/// Matches `p`; once `p` has succeeded, a later failure never re-enters it (its alternatives
/// are discarded as a block).
pub fn fenced(p: impl Into<Pattern>) -> Pattern {
    let p = p.into();
    let graph = bracket(p.graph().clone(), PatNode::leaf(PatKind::FenceX));
    Pattern::new(p.stack_index() + 1, graph)
}

/// Matches exactly `n` bytes.
pub fn len(n: impl IntoNatArg) -> Pattern {
    match n.into_nat_arg() {
        // Len(0) must lower to the null node: a zero-length Len is eligible for the simple
        // arbno form, which would otherwise loop forever matching nothing.
        NatArg::Lit(0) => leaf(0, PatKind::Null),
        arg => leaf(0, PatKind::Len(arg)),
    }
}

/// Matches a single byte *not* satisfying the test.
pub fn not_any(t: impl IntoCharTest) -> Pattern {
    leaf(0, PatKind::NotAny(t.into_char_test()))
}

/// Matches the maximal (possibly empty) run of bytes satisfying the test; never fails.
pub fn nspan(t: impl IntoCharTest) -> Pattern {
    leaf(0, PatKind::NSpan(t.into_char_test()))
}

/// Asserts the cursor is exactly `n` bytes from the start of the subject.
pub fn pos(n: impl IntoNatArg) -> Pattern {
    leaf(0, PatKind::Pos(n.into_nat_arg()))
}

/// Matches the remainder of the subject.
pub fn rem() -> Pattern {
    leaf(0, PatKind::Rem)
}

/// Asserts the cursor is exactly `n` bytes from the end of the subject.
pub fn rpos(n: impl IntoNatArg) -> Pattern {
    leaf(0, PatKind::RPos(n.into_nat_arg()))
}

/// Matches up to the position `n` bytes from the end of the subject; fails if the cursor is
/// already past it.
pub fn rtab(n: impl IntoNatArg) -> Pattern {
    leaf(0, PatKind::RTab(n.into_nat_arg()))
}

/// Matches null and writes the current cursor position into `var`.
pub fn setcur(var: &NatVar) -> Pattern {
    leaf(0, PatKind::Setcur(var.clone()))
}

/// Matches null and passes the current cursor position to `setter`.
pub fn setcur_fn(setter: impl NatSetter + 'static) -> Pattern {
    leaf(0, PatKind::SetcurFn(Arc::new(setter)))
}

/// Matches the maximal non-empty run of bytes satisfying the test; fails on an empty run.
pub fn span(t: impl IntoCharTest) -> Pattern {
    leaf(0, PatKind::Span(t.into_char_test()))
}

/// Matches null, and matches null again on every backtrack, forever.
pub fn succeed() -> Pattern {
    leaf(1, PatKind::Succeed)
}

/// Matches from the cursor up to position `n`; fails if the cursor is already past it.
pub fn tab(n: impl IntoNatArg) -> Pattern {
    leaf(0, PatKind::Tab(n.into_nat_arg()))
}

// COMPOSITION OPERATORS
// ================================================================================================

fn cat(l: &Pattern, r: &Pattern) -> Pattern {
    Pattern::new(
        l.stack_index() + r.stack_index(),
        concat(l.graph().clone(), r.graph().clone(), r.stack_index()),
    )
}

fn alt(l: &Pattern, r: &Pattern) -> Pattern {
    Pattern::new(
        l.stack_index().max(r.stack_index()) + 1,
        alternate(l.graph().clone(), r.graph().clone()),
    )
}

macro_rules! pattern_binop {
    ($trait:ident, $method:ident, $op:path) => {
        impl $trait for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern {
                $op(&self, &rhs)
            }
        }

        impl $trait<&Pattern> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: &Pattern) -> Pattern {
                $op(&self, rhs)
            }
        }

        impl $trait<Pattern> for &Pattern {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern {
                $op(self, &rhs)
            }
        }

        impl $trait for &Pattern {
            type Output = Pattern;
            fn $method(self, rhs: &Pattern) -> Pattern {
                $op(self, rhs)
            }
        }

        impl $trait<&str> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: &str) -> Pattern {
                $op(&self, &Pattern::from(rhs))
            }
        }

        impl $trait<&str> for &Pattern {
            type Output = Pattern;
            fn $method(self, rhs: &str) -> Pattern {
                $op(self, &Pattern::from(rhs))
            }
        }

        impl $trait<char> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: char) -> Pattern {
                $op(&self, &Pattern::from(rhs))
            }
        }

        impl $trait<char> for &Pattern {
            type Output = Pattern;
            fn $method(self, rhs: char) -> Pattern {
                $op(self, &Pattern::from(rhs))
            }
        }

        impl $trait<Pattern> for &str {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern {
                $op(&Pattern::from(self), &rhs)
            }
        }

        impl $trait<Pattern> for char {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern {
                $op(&Pattern::from(self), &rhs)
            }
        }
    };
}

pattern_binop!(BitAnd, bitand, cat);
pattern_binop!(BitOr, bitor, alt);

impl BitAndAssign<Pattern> for Pattern {
    fn bitand_assign(&mut self, rhs: Pattern) {
        *self = cat(self, &rhs);
    }
}

impl BitAndAssign<&str> for Pattern {
    fn bitand_assign(&mut self, rhs: &str) {
        *self = cat(self, &Pattern::from(rhs));
    }
}

impl BitAndAssign<char> for Pattern {
    fn bitand_assign(&mut self, rhs: char) {
        *self = cat(self, &Pattern::from(rhs));
    }
}

impl BitOrAssign<Pattern> for Pattern {
    fn bitor_assign(&mut self, rhs: Pattern) {
        *self = alt(self, &rhs);
    }
}

impl BitOrAssign<&str> for Pattern {
    fn bitor_assign(&mut self, rhs: &str) {
        *self = alt(self, &Pattern::from(rhs));
    }
}

impl BitOrAssign<char> for Pattern {
    fn bitor_assign(&mut self, rhs: char) {
        *self = alt(self, &Pattern::from(rhs));
    }
}

/// `pattern * &var`: assign the sub-match to `var` on overall success.
impl Mul<&StrVar> for Pattern {
    type Output = Pattern;

    fn mul(self, var: &StrVar) -> Pattern {
        self.assign_on_match(var)
    }
}

impl Mul<&StrVar> for &Pattern {
    type Output = Pattern;

    fn mul(self, var: &StrVar) -> Pattern {
        self.assign_on_match(var)
    }
}

/// `pattern % &var`: assign the sub-match to `var` immediately when the sub-pattern succeeds.
impl Rem<&StrVar> for Pattern {
    type Output = Pattern;

    fn rem(self, var: &StrVar) -> Pattern {
        self.assign_imm(var)
    }
}

impl Rem<&StrVar> for &Pattern {
    type Output = Pattern;

    fn rem(self, var: &StrVar) -> Pattern {
        self.assign_imm(var)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_indices_follow_composition() {
        assert_eq!(any("ab").stack_index(), 0);
        assert_eq!(arb().stack_index(), 1);
        assert_eq!(fence().stack_index(), 1);
        assert_eq!(succeed().stack_index(), 1);
        assert_eq!(defer(&PatternCell::new()).stack_index(), 3);

        // Concatenation sums, alternation takes the max plus one.
        let p = arb() & succeed();
        assert_eq!(p.stack_index(), 2);
        let q = arb() | any("ab");
        assert_eq!(q.stack_index(), 2);

        // Assignment brackets add three; a fenced pattern adds one.
        let var = StrVar::default();
        assert_eq!((arb() * &var).stack_index(), 4);
        assert_eq!(fenced(arb()).stack_index(), 2);
    }

    #[test]
    fn string_operands_lower_to_literals() {
        let p = "Hello" & (arb() & "World");
        let g = p.graph();
        assert!(matches!(g[g.root()].kind, PatKind::Lit(_)));

        let q = 'x' | Pattern::from('y');
        assert_eq!(q.graph().len(), 3);
    }

    #[test]
    fn compound_assignment_operators() {
        let mut p = Pattern::from("Goodbye");
        p |= "Hello";
        p &= ' ';
        p &= Pattern::from("World");

        // (Goodbye | Hello) & ' ' & World: 2 literals + alt + space + world.
        assert_eq!(p.graph().len(), 5);
        assert_eq!(p.to_string(), "(\"Goodbye\" | \"Hello\") & ' ' & \"World\"");
    }

    #[test]
    fn len_zero_is_null() {
        let p = len(0usize);
        assert!(matches!(p.graph()[PatLink::to(1)].kind, PatKind::Null));
        // And arbno over it terminates trivially instead of building a cycle over nothing.
        let a = arbno(len(0usize));
        assert!(matches!(a.graph()[a.graph().root()].kind, PatKind::ArbnoX(_)));
    }

    #[test]
    fn breakx_structure() {
        let p = brkx("ab");
        let g = p.graph();
        assert_eq!(g.len(), 3);
        assert!(matches!(g[PatLink::to(3)].kind, PatKind::BreakX(_)));
        assert_eq!(g[PatLink::to(3)].next, PatLink::to(1));
        assert_eq!(g[PatLink::to(1)].kind.alt(), Some(PatLink::to(2)));
        assert_eq!(g[PatLink::to(2)].next, PatLink::to(3));
    }
}
