use std::fmt;
use std::sync::{Arc, RwLock};

mod build;
mod image;
mod node;

pub(crate) use build::{alternate, arbno_complex, arbno_simple, bracket, concat};
pub use node::{CharTest, Graph, LitStr, NatArg, PatKind, PatLink, PatNode, ResolvedTest};

// PATTERN HANDLE
// ================================================================================================

/// A shared, cheap-to-clone handle to a pattern graph.
///
/// The graph is immutable once the handle exists; every composition operator works on clones, so
/// handles can be shared freely (including across threads) and reused for any number of matches.
/// `stack_index` is the maximum number of history-stack entries one traversal of the pattern can
/// push, excluding deferred-reference descents and arbno iterations beyond the first, which the
/// engine accounts for dynamically.
#[derive(Clone)]
pub struct Pattern {
    graph: Arc<Graph>,
    stack_index: usize,
}

impl Pattern {
    pub(crate) fn new(stack_index: usize, graph: Graph) -> Self {
        Self { graph: Arc::new(graph), stack_index }
    }

    /// The null pattern: matches the empty string and nothing else.
    pub fn null() -> Self {
        Self::new(0, Graph::empty())
    }

    /// A literal pattern over the bytes of `s`.
    pub fn lit(s: &str) -> Self {
        let graph = match s.len() {
            0 => Graph::leaf(PatKind::Null),
            1 => Graph::leaf(PatKind::Char(s.as_bytes()[0])),
            _ => Graph::leaf(PatKind::Lit(LitStr::from_slice(s.as_bytes()))),
        };
        Self::new(0, graph)
    }

    /// The pattern graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// A shared handle to the graph, for running it against a subject.
    pub fn graph_shared(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    /// Maximum history-stack entries one traversal of this pattern may push (see type docs).
    pub fn stack_index(&self) -> usize {
        self.stack_index
    }

    /// Materialises an independent, index-equivalent copy of the pattern.
    ///
    /// Owned payloads (literals, character sets) are duplicated; capability payloads (variables,
    /// getters, setters, deferred cells) remain shared with the original.
    pub fn copied(&self) -> Self {
        Self::new(self.stack_index, self.graph.as_ref().clone())
    }

    /// Assigns the bracketed sub-match to `var`, committed only if the overall match succeeds.
    /// Also available as `pattern * &var`.
    pub fn assign_on_match(&self, var: &crate::StrVar) -> Self {
        self.close_region(3, PatKind::AssignOnM(var.clone()))
    }

    /// Assigns the bracketed sub-match to `var` the moment this sub-pattern succeeds, even if
    /// the overall match later fails. Also available as `pattern % &var`.
    pub fn assign_imm(&self, var: &crate::StrVar) -> Self {
        self.close_region(3, PatKind::AssignImm(var.clone()))
    }

    /// Passes the bracketed sub-match to `setter`, committed only on overall success.
    pub fn call_on_match(&self, setter: impl crate::StringSetter + 'static) -> Self {
        self.close_region(3, PatKind::CallOnM(Arc::new(setter)))
    }

    /// Passes the bracketed sub-match to `setter` the moment this sub-pattern succeeds.
    pub fn call_imm(&self, setter: impl crate::StringSetter + 'static) -> Self {
        self.close_region(3, PatKind::CallImm(Arc::new(setter)))
    }

    fn close_region(&self, extra_stack: usize, after: PatKind) -> Self {
        let graph = bracket(self.graph.as_ref().clone(), PatNode::leaf(after));
        Self::new(self.stack_index + extra_stack, graph)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::null()
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::lit(s)
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::lit(&s)
    }
}

impl From<char> for Pattern {
    fn from(c: char) -> Self {
        Self::new(0, Graph::leaf(PatKind::Char(crate::byte(c))))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({self}, stack_index = {})", self.stack_index)
    }
}

// DEFERRED PATTERN CELL
// ================================================================================================

/// A shared, reassignable slot holding a pattern, referenced by the deferred form
/// [`defer`](crate::defer).
///
/// A deferred reference resolves the cell each time its node is visited, so reassigning the cell
/// between matches changes what the referring patterns match — including self-referentially,
/// which is how recursive patterns are written. Reassigning a cell while a match that refers to
/// it is running is the caller's race to avoid; the lock only keeps the handle itself
/// consistent.
#[derive(Clone, Default)]
pub struct PatternCell(Arc<RwLock<Option<Pattern>>>);

impl PatternCell {
    /// A new, unset cell. Resolving an unset cell during a match yields the
    /// uninitialized-pattern outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pattern held by the cell.
    pub fn set(&self, pattern: Pattern) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(pattern);
    }

    /// Clears the cell back to the unset state.
    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// The pattern currently held by the cell, if any.
    pub fn get(&self) -> Option<Pattern> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Identity of the underlying cell, used by the pattern printers.
    pub fn id(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for PatternCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(p) => write!(f, "PatternCell({p})"),
            None => write!(f, "PatternCell(<unset>)"),
        }
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lit_lowers_by_length() {
        assert!(matches!(Pattern::lit("").graph()[PatLink::to(1)].kind, PatKind::Null));
        assert!(matches!(Pattern::lit("x").graph()[PatLink::to(1)].kind, PatKind::Char(b'x')));
        assert!(matches!(Pattern::lit("xy").graph()[PatLink::to(1)].kind, PatKind::Lit(_)));

        // Up to six bytes stay inline.
        let six = Pattern::lit("abcdef");
        if let PatKind::Lit(s) = &six.graph()[PatLink::to(1)].kind {
            assert!(!s.spilled());
        } else {
            panic!("expected a literal node");
        }
    }

    #[test]
    fn null_pattern_is_empty_graph() {
        let p = Pattern::null();
        assert!(p.graph().is_empty());
        assert!(p.graph().root().is_eop());
    }

    #[test]
    fn handles_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pattern>();
        assert_send_sync::<PatternCell>();
        assert_send_sync::<Graph>();
    }

    #[test]
    fn cell_reassignment_is_visible_to_clones() {
        let cell = PatternCell::new();
        let alias = cell.clone();
        assert!(alias.get().is_none());

        cell.set(Pattern::from("ab"));
        assert_eq!(alias.get().map(|p| p.graph().len()), Some(1));

        alias.clear();
        assert!(cell.get().is_none());
    }
}
