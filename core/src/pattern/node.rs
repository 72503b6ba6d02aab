use std::borrow::Cow;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use smallvec::SmallVec;

use super::PatternCell;
use crate::charset::CharSet;
use crate::refs::{BoolGetter, NatGetter, NatSetter, NatVar, StrVar, StringGetter, StringSetter};

// NODE LINKS
// ================================================================================================

/// String-literal payload; literals up to six bytes are stored inline in the node.
pub type LitStr = SmallVec<[u8; 6]>;

/// Link to a pattern node: the serial index of the target node within the owning graph.
///
/// Serial indices run `1..=N` for a graph of `N` nodes; the value `0` is the end-of-pattern
/// sentinel `EOP`, meaning "pattern complete at this point".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatLink(u32);

impl PatLink {
    /// The end-of-pattern sentinel.
    pub const EOP: Self = Self(0);

    /// Returns a link to the node with the given serial index.
    pub fn to(index: u32) -> Self {
        Self(index)
    }

    /// Returns true if this link is the end-of-pattern sentinel.
    #[inline]
    pub fn is_eop(self) -> bool {
        self.0 == 0
    }

    /// The serial index of the target node; 0 for `EOP`.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Arena slot of the target node. Must not be called on `EOP`.
    #[inline]
    pub(crate) fn slot(self) -> usize {
        debug_assert!(self.0 > 0);
        self.0 as usize - 1
    }

    /// This link with the target index shifted up by `by`; `EOP` is unaffected.
    pub(crate) fn shifted(self, by: u32) -> Self {
        if self.is_eop() { self } else { Self(self.0 + by) }
    }
}

impl fmt::Debug for PatLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eop() {
            write!(f, "EOP")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

impl fmt::Display for PatLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// PAYLOAD ARGUMENTS
// ================================================================================================

/// Payload of the character-test family (`any`, `not_any`, `span`, `nspan`, `brk`, `brkx`).
///
/// The four forms correspond to the CH / Set / SP / SG suffixes of the node codes: a single
/// byte, an owned set, a shared string variable read at match time, and a string getter invoked
/// at match time.
#[derive(Clone)]
pub enum CharTest {
    Char(u8),
    Set(CharSet),
    Var(StrVar),
    Getter(Arc<dyn StringGetter>),
}

impl CharTest {
    /// Wraps a string getter as a character test.
    pub fn getter(g: impl StringGetter + 'static) -> Self {
        Self::Getter(Arc::new(g))
    }

    /// Resolves the payload once for the current node visit.
    pub fn resolve(&self) -> ResolvedTest<'_> {
        match self {
            Self::Char(c) => ResolvedTest::Byte(*c),
            Self::Set(set) => ResolvedTest::Set(set),
            Self::Var(var) => ResolvedTest::Str(Cow::Owned(var.get())),
            Self::Getter(g) => ResolvedTest::Str(g.get()),
        }
    }

    /// The node-code suffix of this payload form.
    pub(crate) fn suffix(&self) -> &'static str {
        match self {
            Self::Char(_) => "CH",
            Self::Set(_) => "Set",
            Self::Var(_) => "SP",
            Self::Getter(_) => "SG",
        }
    }
}

impl fmt::Debug for CharTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "Char({:?})", *c as char),
            Self::Set(set) => write!(f, "Set(\"{set}\")"),
            Self::Var(var) => write!(f, "Var({:p})", var.id()),
            Self::Getter(g) => write!(f, "Getter({:p})", Arc::as_ptr(g)),
        }
    }
}

/// A character test resolved for one node visit.
pub enum ResolvedTest<'a> {
    Byte(u8),
    Set(&'a CharSet),
    Str(Cow<'a, str>),
}

impl ResolvedTest<'_> {
    /// Returns true if the subject byte `b` satisfies the test.
    #[inline]
    pub fn hits(&self, b: u8) -> bool {
        match self {
            Self::Byte(c) => b == *c,
            Self::Set(set) => set.contains(b),
            Self::Str(s) => s.as_bytes().contains(&b),
        }
    }
}

/// Payload of the position family (`pos`, `rpos`, `tab`, `rtab`, `len`): a literal count, a
/// shared variable, or a getter, matching the Nat / NP / NG suffixes of the node codes.
#[derive(Clone)]
pub enum NatArg {
    Lit(usize),
    Var(NatVar),
    Getter(Arc<dyn NatGetter>),
}

impl NatArg {
    /// Wraps a natural getter as a position argument.
    pub fn getter(g: impl NatGetter + 'static) -> Self {
        Self::Getter(Arc::new(g))
    }

    /// Resolves the payload once for the current node visit.
    pub fn value(&self) -> usize {
        match self {
            Self::Lit(n) => *n,
            Self::Var(var) => var.get(),
            Self::Getter(g) => g.get(),
        }
    }

    /// The node-code suffix of this payload form.
    pub(crate) fn suffix(&self) -> &'static str {
        match self {
            Self::Lit(_) => "Nat",
            Self::Var(_) => "NP",
            Self::Getter(_) => "NG",
        }
    }
}

impl fmt::Debug for NatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lit(n) => write!(f, "Lit({n})"),
            Self::Var(var) => write!(f, "Var({:p})", var.id()),
            Self::Getter(g) => write!(f, "Getter({:p})", Arc::as_ptr(g)),
        }
    }
}

// PATTERN NODE
// ================================================================================================

/// A pattern node: one variant per node tag, with the tag-specific payload in the variant.
#[derive(Clone)]
pub enum PatKind {
    /// Aborts the entire match.
    Abort,
    /// Fails the current alternative.
    Fail,
    /// Matches null and restacks itself, yielding an infinite alternation of nulls.
    Succeed,
    /// Matches the empty string.
    Null,
    /// Matches the remainder of the subject.
    Rem,
    /// Matches null and stacks an abort entry.
    Fence,
    /// End of a fenced sub-pattern; repackages the region so a later failure discards it.
    FenceX,
    /// Head of a bracketed region (assignment, call, complex arbno, fenced pattern, recursion).
    REnter,

    /// Alternation: try `next`, fall back to the alternative.
    Alt(PatLink),
    /// Arb entry node; the alternative is the matching `ArbY`.
    ArbX(PatLink),
    /// Arb extension: consume one more byte and restack.
    ArbY,
    /// Simple arbno: the alternative is the body, whose dangling successors loop back here.
    ArbnoS(PatLink),
    /// Complex arbno entry; the alternative is the bracketed body region.
    ArbnoX(PatLink),
    /// End of one complex arbno iteration. `count` is the stack need of a single iteration,
    /// maintained by `concat` so later iterations can reserve ahead of re-entry.
    ArbnoY { count: usize },

    Any(CharTest),
    NotAny(CharTest),
    Span(CharTest),
    NSpan(CharTest),
    Break(CharTest),
    /// BreakX extension: step over the break byte and rematch.
    BreakXX,
    BreakX(CharTest),

    /// A one-byte literal.
    Char(u8),
    /// A literal of two or more bytes.
    Lit(LitStr),
    /// Deferred string literal read from a shared variable at match time.
    StrRef(StrVar),
    /// Deferred string literal produced by a getter at match time.
    StrGet(Arc<dyn StringGetter>),

    /// A parenthesis-balanced span over the `open`/`close` pair.
    Bal { open: u8, close: u8 },

    Pos(NatArg),
    RPos(NatArg),
    Tab(NatArg),
    RTab(NatArg),
    Len(NatArg),

    /// Writes the current cursor into a shared variable.
    Setcur(NatVar),
    /// Passes the current cursor to a setter.
    SetcurFn(Arc<dyn NatSetter>),

    /// Deferred pattern reference, resolved from the cell at match time.
    Rpat(PatternCell),
    /// Deferred predicate.
    PredFn(Arc<dyn BoolGetter>),

    /// Immediate assignment of the bracketed sub-match to a string variable.
    AssignImm(StrVar),
    /// Assignment of the bracketed sub-match, committed only on overall success.
    AssignOnM(StrVar),
    /// Immediate call with the bracketed sub-match.
    CallImm(Arc<dyn StringSetter>),
    /// Call with the bracketed sub-match, committed only on overall success.
    CallOnM(Arc<dyn StringSetter>),
}

impl PatKind {
    /// Returns the alternative link for the has-alt family (`Alt`, `ArbX`, `ArbnoS`, `ArbnoX`).
    /// Graph walks must follow these links in addition to the successors.
    pub fn alt(&self) -> Option<PatLink> {
        match self {
            Self::Alt(alt) | Self::ArbX(alt) | Self::ArbnoS(alt) | Self::ArbnoX(alt) => Some(*alt),
            _ => None,
        }
    }

    pub(crate) fn alt_mut(&mut self) -> Option<&mut PatLink> {
        match self {
            Self::Alt(alt) | Self::ArbX(alt) | Self::ArbnoS(alt) | Self::ArbnoX(alt) => Some(alt),
            _ => None,
        }
    }

    /// True for patterns guaranteed to consume at least one byte on success without making any
    /// stack entries; arbno over such a pattern compiles to the single-node cyclic form.
    pub(crate) fn ok_for_simple_arbno(&self) -> bool {
        match self {
            Self::Any(_) | Self::NotAny(_) | Self::Span(_) | Self::Char(_) | Self::Lit(_) => true,
            Self::Len(NatArg::Lit(_)) => true,
            _ => false,
        }
    }

    /// The node-code name shown in the dump table, e.g. `Any_CH` or `Len_NG`.
    pub fn code(&self) -> Cow<'static, str> {
        let fixed = match self {
            Self::Abort => "Abort",
            Self::Fail => "Fail",
            Self::Succeed => "Succeed",
            Self::Null => "Null",
            Self::Rem => "Rem",
            Self::Fence => "Fence",
            Self::FenceX => "Fence_X",
            Self::REnter => "R_Enter",
            Self::Alt(_) => "Alt",
            Self::ArbX(_) => "Arb_X",
            Self::ArbY => "Arb_Y",
            Self::ArbnoS(_) => "Arbno_S",
            Self::ArbnoX(_) => "Arbno_X",
            Self::ArbnoY { .. } => "Arbno_Y",
            Self::BreakXX => "BreakX_X",
            Self::Char(_) => "Char",
            Self::StrRef(_) => "String_SP",
            Self::StrGet(_) => "String_SG",
            Self::Bal { .. } => "Bal",
            Self::Setcur(_) => "Setcur",
            Self::SetcurFn(_) => "Setcur_Func",
            Self::Rpat(_) => "Rpat",
            Self::PredFn(_) => "Pred_Func",
            Self::AssignImm(_) => "Assign_Imm",
            Self::AssignOnM(_) => "Assign_OnM",
            Self::CallImm(_) => "Call_Imm",
            Self::CallOnM(_) => "Call_OnM",
            Self::Lit(s) => {
                return if s.len() <= 6 {
                    Cow::Owned(format!("String_{}", s.len()))
                } else {
                    Cow::Borrowed("String")
                };
            },
            Self::Any(t) => return Cow::Owned(format!("Any_{}", t.suffix())),
            Self::NotAny(t) => return Cow::Owned(format!("NotAny_{}", t.suffix())),
            Self::Span(t) => return Cow::Owned(format!("Span_{}", t.suffix())),
            Self::NSpan(t) => return Cow::Owned(format!("NSpan_{}", t.suffix())),
            Self::Break(t) => return Cow::Owned(format!("Break_{}", t.suffix())),
            Self::BreakX(t) => return Cow::Owned(format!("BreakX_{}", t.suffix())),
            Self::Pos(n) => return Cow::Owned(format!("Pos_{}", n.suffix())),
            Self::RPos(n) => return Cow::Owned(format!("RPos_{}", n.suffix())),
            Self::Tab(n) => return Cow::Owned(format!("Tab_{}", n.suffix())),
            Self::RTab(n) => return Cow::Owned(format!("RTab_{}", n.suffix())),
            Self::Len(n) => return Cow::Owned(format!("Len_{}", n.suffix())),
        };
        Cow::Borrowed(fixed)
    }
}

impl fmt::Debug for PatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One node of a pattern graph: a tag with its payload plus the successor link.
#[derive(Clone, Debug)]
pub struct PatNode {
    /// The node to be matched after this one succeeds; `EOP` if this is the end of the pattern.
    pub next: PatLink,
    pub kind: PatKind,
}

impl PatNode {
    pub(crate) fn leaf(kind: PatKind) -> Self {
        Self { next: PatLink::EOP, kind }
    }
}

// PATTERN GRAPH
// ================================================================================================

/// A complete pattern graph held as a flat arena.
///
/// Arena slot `k` holds the node with serial index `k + 1`, so the serial indices of a graph of
/// `N` nodes are exactly `1..=N`, the root is the last slot, and links double as slot addresses.
/// Concat, alternation and the arbno forms build genuine cycles; because links are indices the
/// arena needs no ownership cycles and teardown is the plain `Vec` drop, freeing every node
/// exactly once.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<PatNode>,
}

impl Graph {
    /// The empty graph, i.e. the null pattern whose root is `EOP`.
    pub(crate) fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    /// A one-node graph.
    pub(crate) fn leaf(kind: PatKind) -> Self {
        Self { nodes: vec![PatNode::leaf(kind)] }
    }

    /// Number of nodes; equals the serial index of the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link to the root node (the highest-indexed node), or `EOP` for the empty graph.
    pub fn root(&self) -> PatLink {
        PatLink(self.nodes.len() as u32)
    }

    /// Returns the node a link points at, or `None` for `EOP` or an out-of-range link.
    pub fn get(&self, link: PatLink) -> Option<&PatNode> {
        if link.is_eop() { None } else { self.nodes.get(link.slot()) }
    }

    /// Iterates `(link, node)` pairs in ascending serial order.
    pub fn iter(&self) -> impl Iterator<Item = (PatLink, &PatNode)> {
        self.nodes.iter().enumerate().map(|(k, n)| (PatLink(k as u32 + 1), n))
    }
}

impl Index<PatLink> for Graph {
    type Output = PatNode;

    fn index(&self, link: PatLink) -> &PatNode {
        &self.nodes[link.slot()]
    }
}
