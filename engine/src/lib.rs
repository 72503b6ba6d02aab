//! Snopat match engine: runs a [`Pattern`](snopat_core::Pattern) against a subject string.
//!
//! The entry points are [`match_pattern`] for a plain match, [`match_replace`] for
//! match-and-replace, and [`MatchRes`] for holding a subject across a match so the matched span
//! can be replaced afterwards (including with text computed from the match's own captures).
//!
//! Matching is unanchored by default: the engine slides the starting position across the subject
//! until the pattern matches or the subject is exhausted. [`Flags::ANCHOR`] pins the start to
//! the first position; [`Flags::DEBUG`] and [`Flags::TRACE`] narrate the engine's progress
//! through the `tracing` subscriber in scope.

use std::fmt;
use std::ops::{BitOr, BitOrAssign, Range};

use snopat_core::Pattern;

mod errors;
mod stack;
mod vm;

pub use errors::MatchError;

// FLAGS
// ================================================================================================

/// Per-match flags. Combine with `|`: `Flags::ANCHOR | Flags::DEBUG`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    /// Unanchored, quiet matching.
    pub const NONE: Self = Self(0);
    /// Emit the node-by-node match narration at debug level.
    pub const DEBUG: Self = Self(1);
    /// Pin the match start to the first subject position.
    pub const ANCHOR: Self = Self(2);
    /// Emit subject/cursor annotations at trace level.
    pub const TRACE: Self = Self(4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_anchored(self) -> bool {
        self.contains(Self::ANCHOR)
    }

    pub fn is_debug(self) -> bool {
        self.contains(Self::DEBUG)
    }

    pub fn is_trace(self) -> bool {
        self.contains(Self::TRACE)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_debug() {
            names.push("DEBUG");
        }
        if self.is_anchored() {
            names.push("ANCHOR");
        }
        if self.is_trace() {
            names.push("TRACE");
        }
        write!(f, "Flags({})", if names.is_empty() { "NONE".into() } else { names.join("|") })
    }
}

// MATCHED SPAN
// ================================================================================================

/// The span reported by a successful match.
///
/// `start` and `stop` are 1-based inclusive positions in the subject, so a match of `"ell"`
/// inside `"Hello"` reports `(2, 4)` and an empty match at the start reports `(1, 0)`.
/// [`range`](Self::range) gives the equivalent 0-based byte range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Match {
    start: usize,
    stop: usize,
}

impl Match {
    /// 1-based position of the first matched byte.
    pub fn start(&self) -> usize {
        self.start
    }

    /// 1-based position of the last matched byte; `start - 1` for an empty match.
    pub fn stop(&self) -> usize {
        self.stop
    }

    /// The matched span as a 0-based byte range.
    pub fn range(&self) -> Range<usize> {
        self.start - 1..self.stop
    }

    pub fn is_empty(&self) -> bool {
        self.stop < self.start
    }

    /// The matched text within the subject the match was run against.
    pub fn extract<'a>(&self, subject: &'a str) -> &'a str {
        &subject[self.range()]
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({}, {})", self.start, self.stop)
    }
}

// MATCH ENTRY POINTS
// ================================================================================================

/// Matches `pattern` against `subject`.
///
/// Returns the matched span, `None` if the pattern does not match, or an error for the
/// non-verdict outcomes (an unset deferred cell, or an internal invariant violation). The
/// subject is not modified; deferred assignments registered with `*` are applied exactly once
/// each, in left-to-right order, and only when the overall match succeeds.
pub fn match_pattern(
    subject: &str,
    pattern: &Pattern,
    flags: Flags,
) -> Result<Option<Match>, MatchError> {
    vm::run(subject.as_bytes(), pattern, flags)
}

/// Matches `pattern` against `subject` and replaces the matched span with `replacement`.
///
/// Returns whether a replacement happened. Spans are byte ranges; replacing a span whose edges
/// split a multi-byte character panics, as subject indexing does throughout.
pub fn match_replace(
    subject: &mut String,
    pattern: &Pattern,
    replacement: &str,
    flags: Flags,
) -> Result<bool, MatchError> {
    match match_pattern(subject, pattern, flags)? {
        Some(m) => {
            subject.replace_range(m.range(), replacement);
            Ok(true)
        },
        None => Ok(false),
    }
}

/// A subject held together with the result of matching against it, so the matched span can be
/// replaced after inspecting the match (or after reading variables the match assigned).
///
/// ```text
/// let mut res = MatchRes::new("Hello World");
/// if res.apply(&pattern, Flags::NONE)? {
///     res.replace("Goodbye");
/// }
/// ```
#[derive(Clone, Debug)]
pub struct MatchRes {
    subject: String,
    span: Option<Match>,
}

impl MatchRes {
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), span: None }
    }

    /// Matches `pattern` against the held subject, recording the span for a later
    /// [`replace`](Self::replace). Returns whether the match succeeded.
    pub fn apply(&mut self, pattern: &Pattern, flags: Flags) -> Result<bool, MatchError> {
        self.span = match_pattern(&self.subject, pattern, flags)?;
        Ok(self.span.is_some())
    }

    pub fn matched(&self) -> bool {
        self.span.is_some()
    }

    /// The span recorded by the last successful [`apply`](Self::apply).
    pub fn span(&self) -> Option<Match> {
        self.span
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn into_subject(self) -> String {
        self.subject
    }

    /// Replaces the recorded span with `replacement`; the span is consumed. Returns false if
    /// there is no recorded span.
    pub fn replace(&mut self, replacement: &str) -> bool {
        match self.span.take() {
            Some(m) => {
                self.subject.replace_range(m.range(), replacement);
                true
            },
            None => false,
        }
    }
}

impl fmt::Display for MatchRes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subject)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let f = Flags::ANCHOR | Flags::DEBUG;
        assert!(f.is_anchored());
        assert!(f.is_debug());
        assert!(!f.is_trace());
        assert_eq!(format!("{f:?}"), "Flags(DEBUG|ANCHOR)");
        assert_eq!(format!("{:?}", Flags::NONE), "Flags(NONE)");
    }

    #[test]
    fn match_span_conversions() {
        let m = Match { start: 2, stop: 4 };
        assert_eq!(m.range(), 1..4);
        assert_eq!(m.extract("Hello"), "ell");
        assert!(!m.is_empty());

        let empty = Match { start: 1, stop: 0 };
        assert_eq!(empty.range(), 0..0);
        assert!(empty.is_empty());
    }

    #[test]
    fn replace_splices_the_span() {
        let p = Pattern::from("World");
        let mut subject = "Hello World!".to_string();
        assert!(match_replace(&mut subject, &p, "Rust", Flags::NONE).unwrap());
        assert_eq!(subject, "Hello Rust!");

        assert!(!match_replace(&mut subject, &Pattern::from("xyz"), "!", Flags::NONE).unwrap());
        assert_eq!(subject, "Hello Rust!");
    }

    #[test]
    fn match_res_replace_after_inspection() {
        let captured = snopat_core::StrVar::default();
        let p = Pattern::from("World") * &captured;

        let mut res = MatchRes::new("Hello World");
        assert!(res.apply(&p, Flags::NONE).unwrap());
        assert!(res.matched());

        // Replacement text built from the match's own capture.
        let markup = format!("<b>{}</b>", captured.get());
        assert!(res.replace(&markup));
        assert_eq!(res.subject(), "Hello <b>World</b>");

        // The span is consumed by the replacement.
        assert!(!res.replace("again"));
    }
}
