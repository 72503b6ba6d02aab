//! SNOBOL4/SPITBOL-style pattern construction.
//!
//! This crate holds the program half of the matcher: character sets, the flat graph of pattern
//! nodes, the constructors that compose graphs while maintaining the serial-index invariants,
//! the shared [`Pattern`] handle, and the printers. The companion `snopat-engine` crate runs a
//! pattern against a subject string.
//!
//! Patterns are built from the leaf constructors ([`any`], [`span`], [`brk`], [`len`], …) and
//! composed with `&` (concatenation), `|` (alternation), and the assignment combinators `*`
//! (commit on overall success) and `%` (commit immediately):
//!
//! ```text
//! let vowel = StrVar::default();
//! let p = "b" & (any("aeiou") * &vowel) & "t";
//! ```
//!
//! Composition always copies its operands, so handles stay shareable and a pattern can be used
//! as many times as needed, including inside itself through [`PatternCell`] and [`defer`].

pub mod charset;
pub mod pattern;
pub mod refs;

mod ops;

pub use charset::{CharSet, classes};
pub use ops::{
    IntoCharTest, IntoNatArg, abort, any, arb, arbno, bal, bal_pair, brk, brkx, defer, defer_bool,
    defer_getter, defer_str, fail, fence, fenced, len, not_any, nspan, pos, rem, rpos, rtab,
    setcur, setcur_fn, span, succeed, tab,
};
pub use pattern::{
    CharTest, Graph, NatArg, PatKind, PatLink, PatNode, Pattern, PatternCell, ResolvedTest,
};
pub use refs::{
    BoolGetter, NatGetter, NatSetter, NatVar, Output, StrVar, StringGetter, StringSetter,
};

/// Converts a pattern character to its byte value.
///
/// Matching is byte-level; characters used in patterns must fit in a single byte.
pub(crate) fn byte(c: char) -> u8 {
    let v = c as u32;
    assert!(v <= 0xff, "pattern characters must be single-byte, got {c:?}");
    v as u8
}
