//! Graph constructors.
//!
//! All composition works by arena layout: appending the left operand's slots after the right
//! operand's shifts every left serial index up by |R| in one move, which is the index fixup the
//! flat-graph invariants require. The only per-node work that remains is rewriting links: EOP
//! successors of the left operand become the right operand's root under concatenation, and
//! `ArbnoY` iteration counts absorb the stack need of whatever gets concatenated after them.

use super::node::{Graph, PatKind, PatLink, PatNode};

// COMPOSITION
// ================================================================================================

/// Concatenates two graphs. The right graph keeps its numbering; every left node's index is
/// shifted up by |R|, and every left successor or alternative equal to `EOP` is relinked to the
/// root of the right graph. `incr` is added to the iteration count of every `ArbnoY` found in
/// the left graph.
pub(crate) fn concat(l: Graph, r: Graph, incr: usize) -> Graph {
    if l.is_empty() {
        return r;
    }
    if r.is_empty() {
        return l;
    }

    let shift = r.len() as u32;
    let r_root = r.root();
    let mut nodes = r.nodes;
    nodes.reserve(l.nodes.len());

    for mut node in l.nodes {
        node.next = if node.next.is_eop() { r_root } else { node.next.shifted(shift) };
        if let Some(alt) = node.kind.alt_mut() {
            *alt = if alt.is_eop() { r_root } else { alt.shifted(shift) };
        }
        if let PatKind::ArbnoY { count } = &mut node.kind {
            *count += incr;
        }
        nodes.push(node);
    }

    Graph { nodes }
}

/// Builds the alternation of two graphs.
///
/// For an empty left graph the result is a lone `Alt` with index |R| + 1, successor `EOP` and
/// alternative R. Otherwise the right graph keeps its numbering, the left indices shift up by
/// |R| (dangling `EOP` links stay dangling), and the `Alt` node on top points its successor at
/// the left root and its alternative at the right root.
pub(crate) fn alternate(l: Graph, r: Graph) -> Graph {
    let r_root = r.root();
    let mut nodes = r.nodes;

    if l.is_empty() {
        nodes.push(PatNode::leaf(PatKind::Alt(r_root)));
        return Graph { nodes };
    }

    let shift = r_root.index();
    nodes.reserve(l.nodes.len() + 1);
    for mut node in l.nodes {
        node.next = node.next.shifted(shift);
        if let Some(alt) = node.kind.alt_mut() {
            *alt = alt.shifted(shift);
        }
        nodes.push(node);
    }

    let l_root = PatLink::to(nodes.len() as u32);
    nodes.push(PatNode { next: l_root, kind: PatKind::Alt(r_root) });
    Graph { nodes }
}

/// Points every dangling successor (and dangling alternative) of the graph at `succ`.
///
/// Not used by concatenation, which folds the same rewrite into its single pass over the left
/// operand.
pub(crate) fn set_successor(g: &mut Graph, succ: PatLink) {
    for node in g.nodes.iter_mut() {
        if node.next.is_eop() {
            node.next = succ;
        }
        if let Some(alt) = node.kind.alt_mut() {
            if alt.is_eop() {
                *alt = succ;
            }
        }
    }
}

/// Builds the simple arbno form: an `ArbnoS` node on top of the body whose dangling successors
/// loop back to it. The body keeps its numbering; the `ArbnoS` node has index |P| + 1. Only
/// valid for bodies that always consume on success and push nothing (see
/// [`PatKind::ok_for_simple_arbno`]); in particular the body cannot be empty.
pub(crate) fn arbno_simple(mut p: Graph) -> Graph {
    let body = p.root();
    let s = PatLink::to(body.index() + 1);
    set_successor(&mut p, s);
    p.nodes.push(PatNode::leaf(PatKind::ArbnoS(body)));
    p
}

/// Frames a sub-pattern with an `REnter` head and the trailing node `after` (whose successor
/// must be `EOP`): for a body of `N` nodes, `after` gets index `N + 1` and the `REnter` root
/// index `N + 2`, with the body's dangling successors relinked to `after`.
pub(crate) fn bracket(mut p: Graph, after: PatNode) -> Graph {
    debug_assert!(after.next.is_eop() || after.next.index() > p.len() as u32);

    let a = PatLink::to(p.root().index() + 1);
    let enter_next = if p.is_empty() { a } else { p.root() };
    set_successor(&mut p, a);
    p.nodes.push(after);
    p.nodes.push(PatNode { next: enter_next, kind: PatKind::REnter });
    p
}

/// Builds the complex arbno region: body bracketed between `REnter` and `ArbnoY`, under an
/// `ArbnoX` whose alternative re-enters the region. For a body of `N` nodes the `ArbnoY` is
/// numbered `N + 1`, the `REnter` `N + 2` and the `ArbnoX` root `N + 3`.
pub(crate) fn arbno_complex(p: Graph, iteration_stack: usize) -> Graph {
    let n = p.root().index();
    let y = PatNode {
        next: PatLink::to(n + 3),
        kind: PatKind::ArbnoY { count: iteration_stack },
    };
    let mut g = bracket(p, y);
    let enter = g.root();
    g.nodes.push(PatNode::leaf(PatKind::ArbnoX(enter)));
    g
}

// TESTS
// ================================================================================================
