//! The match engine: a state machine interpreting a pattern graph against a subject.
//!
//! The engine follows the single-stack design of the SPITBOL matcher. Each step is in one of
//! three states: `Match` dispatches on the current node, `Succeed` advances to its successor,
//! and `Fail` pops one history entry and resumes from whatever it points at. The two terminal
//! states report the overall verdict. No handler falls through; every arm ends by choosing the
//! next state.
//!
//! Deferred pattern references never recurse into the engine. They open a nested region on the
//! same stack (`REnter`/`RRemove`/`RRestore` bookkeeping, with the continuation node parked in
//! the region's special entry), so backtracking moves freely across the reference boundary.

use std::sync::Arc;

use snopat_core::{Graph, PatKind, Pattern};
use tracing::{debug, trace};

use crate::errors::MatchError;
use crate::stack::{Ctrl, Site, Slot, Stack, StackEntry};
use crate::{Flags, Match};

// ENGINE STATE
// ================================================================================================

enum Step {
    /// Dispatch on the current node.
    Match,
    /// The current node matched; continue at its successor.
    Succeed,
    /// The current attempt failed; pop one history entry.
    Fail,
}

/// Graphs involved in the current match: index 0 is the main pattern, and every deferred
/// pattern resolved during the match is interned behind it.
struct GraphTable {
    graphs: Vec<Arc<Graph>>,
}

impl GraphTable {
    fn new(main: Arc<Graph>) -> Self {
        Self { graphs: vec![main] }
    }

    fn get(&self, index: u32) -> Arc<Graph> {
        Arc::clone(&self.graphs[index as usize])
    }

    fn intern(&mut self, graph: Arc<Graph>) -> u32 {
        match self.graphs.iter().position(|g| Arc::ptr_eq(g, &graph)) {
            Some(i) => i as u32,
            None => {
                self.graphs.push(graph);
                self.graphs.len() as u32 - 1
            },
        }
    }
}

// MATCH LOOP
// ================================================================================================

/// Runs `pattern` against `subject`. Returns the matched span, `None` for a failed match, or an
/// error for the two non-verdict outcomes.
pub(crate) fn run(
    subject: &[u8],
    pattern: &Pattern,
    flags: Flags,
) -> Result<Option<Match>, MatchError> {
    let len = subject.len();
    let mut graphs = GraphTable::new(pattern.graph_shared());

    // In anchored mode the anchor entry aborts the whole match when failure reaches it; in
    // unanchored mode it walks the anchor point across the subject instead. Its cursor slot
    // tracks the current anchor position and yields the reported start on success.
    let anchor_site = if flags.is_anchored() {
        Site::Ctrl(Ctrl::Abort)
    } else {
        Site::Ctrl(Ctrl::Unanchored)
    };
    let mut stack = Stack::new(
        StackEntry { slot: Slot::Cursor(0), site: anchor_site },
        pattern.stack_index() + 2,
    );

    let mut cursor: usize = 0;
    let mut site = Site::Node { graph: 0, link: pattern.graph().root() };
    let mut step = Step::Match;
    let mut deferred_present = false;
    // Number of open regions; used only to indent the debug narration.
    let mut depth: usize = 0;

    if flags.is_debug() {
        debug!(target: "snopat", "initiating match, subject length {len}");
    }

    loop {
        match step {
            Step::Succeed => {
                let Site::Node { graph, link } = site else {
                    return Err(MatchError::Logic("succeed state without a current node"));
                };
                if flags.is_debug() {
                    debug!(target: "snopat", "{}success, cursor {cursor}", pad(depth));
                }
                let next = graphs.get(graph)[link].next;
                site = Site::Node { graph, link: next };
                step = Step::Match;
            },

            Step::Fail => {
                let Some(entry) = stack.pop() else {
                    return Err(MatchError::Logic("failure popped an empty stack"));
                };
                match entry.site {
                    Site::Node { .. } => {
                        let Slot::Cursor(saved) = entry.slot else {
                            return Err(MatchError::Logic("alternative entry without a cursor"));
                        };
                        cursor = saved;
                        if flags.is_debug() {
                            debug!(target: "snopat", "{}failure, cursor reset to {cursor}", pad(depth));
                        }
                        site = entry.site;
                        step = Step::Match;
                    },

                    Site::Ctrl(Ctrl::Abort) => {
                        if flags.is_debug() {
                            debug!(target: "snopat", "{}match fails", pad(depth));
                        }
                        return Ok(None);
                    },

                    Site::Ctrl(Ctrl::Assign) => {
                        // The commit this marker stood for has been backtracked out of.
                        step = Step::Fail;
                    },

                    Site::Ctrl(Ctrl::RRemove) => {
                        // Dismantle the region: restore the outer base, drop the special entry
                        // underneath, and keep failing.
                        let Slot::Base(outer) = entry.slot else {
                            return Err(MatchError::Logic("region remove without a saved base"));
                        };
                        stack.set_base(outer);
                        stack.remove();
                        depth = depth.saturating_sub(1);
                        step = Step::Fail;
                    },

                    Site::Ctrl(Ctrl::RRestore) => {
                        // Re-establish the inner region so its alternatives are tried.
                        let Slot::Base(inner) = entry.slot else {
                            return Err(MatchError::Logic("region restore without a saved base"));
                        };
                        stack.set_base(inner);
                        depth += 1;
                        step = Step::Fail;
                    },

                    Site::Ctrl(Ctrl::FenceY) => {
                        // A failure after the fenced pattern succeeded: discard the whole inner
                        // region, bracketing entries included, and propagate.
                        let Slot::Base(inner) = entry.slot else {
                            return Err(MatchError::Logic("fence entry without a saved base"));
                        };
                        stack.truncate_to(inner as isize - 2);
                        step = Step::Fail;
                    },

                    Site::Ctrl(Ctrl::Unanchored) => {
                        let Slot::Cursor(anchor) = entry.slot else {
                            return Err(MatchError::Logic("anchor entry without a cursor"));
                        };
                        if anchor >= len {
                            // Every start position up to and including the end of the subject
                            // has been tried; an anchor past the end could only report a span
                            // outside it.
                            if flags.is_debug() {
                                debug!(target: "snopat", "match fails");
                            }
                            return Ok(None);
                        }
                        cursor = anchor + 1;
                        if flags.is_debug() {
                            debug!(target: "snopat", "moving anchor point to {cursor}");
                        }
                        stack.push(Slot::Cursor(cursor), Site::Ctrl(Ctrl::Unanchored));
                        site = Site::Node { graph: 0, link: graphs.get(0).root() };
                        step = Step::Match;
                    },

                    Site::Vacant => {
                        return Err(MatchError::Logic("popped a vacant stack entry"));
                    },
                }
            },

            Step::Match => {
                let Site::Node { graph: gi, link } = site else {
                    return Err(MatchError::Logic("match state without a current node"));
                };

                if link.is_eop() {
                    if stack.base() == 0 {
                        // Outer level complete: the whole match has succeeded.
                        return finish(subject, cursor, &graphs, &stack, deferred_present, flags);
                    }
                    // An inner pattern has completed; resume at the continuation parked in the
                    // region's special entry.
                    if flags.is_debug() {
                        debug!(target: "snopat", "{}inner pattern complete", pad(depth));
                    }
                    let cont = stack.entry(stack.base() - 1).site;
                    stack.pop_region()?;
                    depth = depth.saturating_sub(1);
                    site = cont;
                    step = Step::Match;
                    continue;
                }

                let g = graphs.get(gi);
                let node = &g[link];
                let next = node.next;

                if flags.is_debug() {
                    debug!(
                        target: "snopat",
                        "{}#{} {}, cursor {cursor}",
                        pad(depth),
                        link.index(),
                        node.kind.code(),
                    );
                }
                if flags.is_trace() {
                    trace_cursor(subject, cursor, &node.kind.code());
                }

                step = match &node.kind {
                    PatKind::Abort => {
                        if flags.is_debug() {
                            debug!(target: "snopat", "{}match aborted", pad(depth));
                        }
                        return Ok(None);
                    },

                    PatKind::Fail => Step::Fail,

                    PatKind::Null => Step::Succeed,

                    PatKind::Rem => {
                        cursor = len;
                        Step::Succeed
                    },

                    PatKind::Succeed => {
                        stack.push(Slot::Cursor(cursor), site);
                        Step::Succeed
                    },

                    PatKind::Fence => {
                        stack.push(Slot::Cursor(cursor), Site::Ctrl(Ctrl::Abort));
                        Step::Succeed
                    },

                    PatKind::FenceX => {
                        // The fenced pattern has matched. Repackage the region: stack a fence
                        // entry over it and restore the outer base, so a later failure discards
                        // the region wholesale instead of retrying into it.
                        let base = stack.base();
                        let Slot::Base(outer) = stack.entry(base).slot else {
                            return Err(MatchError::Logic("fence region without a saved base"));
                        };
                        stack.push(Slot::Base(base), Site::Ctrl(Ctrl::FenceY));
                        stack.set_base(outer);
                        depth = depth.saturating_sub(1);
                        Step::Succeed
                    },

                    PatKind::REnter => {
                        *stack.pending() =
                            StackEntry { slot: Slot::Cursor(cursor), site: Site::Vacant };
                        stack.push_region();
                        depth += 1;
                        Step::Succeed
                    },

                    PatKind::Alt(alt)
                    | PatKind::ArbX(alt)
                    | PatKind::ArbnoS(alt)
                    | PatKind::ArbnoX(alt) => {
                        stack.push(Slot::Cursor(cursor), Site::Node { graph: gi, link: *alt });
                        site = Site::Node { graph: gi, link: next };
                        step = Step::Match;
                        continue;
                    },

                    PatKind::ArbY => {
                        if cursor < len {
                            cursor += 1;
                            stack.push(Slot::Cursor(cursor), site);
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::ArbnoY { count } => {
                        // One iteration of a complex arbno has finished. An iteration that
                        // consumed nothing would repeat forever, so treat it as failure; that
                        // routes control through the stacked alternative to the successor.
                        let entered_at = region_start(&stack)?;
                        let null_iteration = cursor == entered_at;
                        stack.reserve(*count);
                        stack.pop_region()?;
                        depth = depth.saturating_sub(1);
                        if null_iteration { Step::Fail } else { Step::Succeed }
                    },

                    PatKind::Any(t) => {
                        let t = t.resolve();
                        if cursor < len && t.hits(subject[cursor]) {
                            cursor += 1;
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::NotAny(t) => {
                        let t = t.resolve();
                        if cursor < len && !t.hits(subject[cursor]) {
                            cursor += 1;
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::Span(t) => {
                        let t = t.resolve();
                        let mut cur = cursor;
                        while cur < len && t.hits(subject[cur]) {
                            cur += 1;
                        }
                        if cur != cursor {
                            cursor = cur;
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::NSpan(t) => {
                        let t = t.resolve();
                        while cursor < len && t.hits(subject[cursor]) {
                            cursor += 1;
                        }
                        Step::Succeed
                    },

                    PatKind::Break(t) | PatKind::BreakX(t) => {
                        let t = t.resolve();
                        loop {
                            if cursor >= len {
                                break Step::Fail;
                            }
                            if t.hits(subject[cursor]) {
                                break Step::Succeed;
                            }
                            cursor += 1;
                        }
                    },

                    PatKind::BreakXX => {
                        // Step over the break byte and let the break node scan again.
                        cursor += 1;
                        Step::Succeed
                    },

                    PatKind::Char(c) => {
                        if cursor < len && subject[cursor] == *c {
                            cursor += 1;
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::Lit(s) => step_literal(subject, &mut cursor, s),

                    PatKind::StrRef(var) => step_literal(subject, &mut cursor, var.get().as_bytes()),

                    PatKind::StrGet(getter) => {
                        step_literal(subject, &mut cursor, getter.get().as_bytes())
                    },

                    PatKind::Bal { open, close } => {
                        if cursor >= len || subject[cursor] == *close {
                            Step::Fail
                        } else {
                            if subject[cursor] == *open {
                                let mut nesting = 1u32;
                                loop {
                                    cursor += 1;
                                    if cursor >= len {
                                        break;
                                    } else if subject[cursor] == *open {
                                        nesting += 1;
                                    } else if subject[cursor] == *close {
                                        nesting -= 1;
                                        if nesting == 0 {
                                            break;
                                        }
                                    }
                                }
                                if cursor >= len {
                                    step = Step::Fail;
                                    continue;
                                }
                            }
                            cursor += 1;
                            stack.push(Slot::Cursor(cursor), site);
                            Step::Succeed
                        }
                    },

                    PatKind::Pos(n) => {
                        if cursor == n.value() { Step::Succeed } else { Step::Fail }
                    },

                    PatKind::RPos(n) => match len.checked_sub(n.value()) {
                        Some(at) if cursor == at => Step::Succeed,
                        _ => Step::Fail,
                    },

                    PatKind::Tab(n) => {
                        // The target must lie within the subject; a cursor parked past the end
                        // would report a span outside it.
                        let n = n.value();
                        if cursor <= n && n <= len {
                            cursor = n;
                            Step::Succeed
                        } else {
                            Step::Fail
                        }
                    },

                    PatKind::RTab(n) => match len.checked_sub(n.value()) {
                        Some(at) if cursor <= at => {
                            cursor = at;
                            Step::Succeed
                        },
                        _ => Step::Fail,
                    },

                    PatKind::Len(n) => match cursor.checked_add(n.value()) {
                        Some(end) if end <= len => {
                            cursor = end;
                            Step::Succeed
                        },
                        _ => Step::Fail,
                    },

                    PatKind::Setcur(var) => {
                        var.set(cursor);
                        Step::Succeed
                    },

                    PatKind::SetcurFn(setter) => {
                        setter.set(cursor);
                        Step::Succeed
                    },

                    PatKind::PredFn(getter) => {
                        if getter.get() { Step::Succeed } else { Step::Fail }
                    },

                    PatKind::Rpat(cell) => {
                        // Open a region for the referenced pattern and jump to its root; the
                        // continuation is parked in the special entry for the inner EOP.
                        let Some(target) = cell.get() else {
                            return Err(MatchError::UninitializedPattern);
                        };
                        stack.reserve(target.stack_index() + 2);
                        *stack.pending() = StackEntry {
                            slot: Slot::Cursor(cursor),
                            site: Site::Node { graph: gi, link: next },
                        };
                        stack.push_region();
                        depth += 1;
                        if flags.is_debug() {
                            debug!(target: "snopat", "{}entering deferred pattern", pad(depth));
                        }
                        let inner_root = target.graph().root();
                        let inner = graphs.intern(target.graph_shared());
                        site = Site::Node { graph: inner, link: inner_root };
                        step = Step::Match;
                        continue;
                    },

                    PatKind::AssignImm(var) => {
                        let start = region_start(&stack)?;
                        var.set(String::from_utf8_lossy(&subject[start..cursor]));
                        stack.pop_region()?;
                        depth = depth.saturating_sub(1);
                        Step::Succeed
                    },

                    PatKind::CallImm(setter) => {
                        let start = region_start(&stack)?;
                        setter.set(&String::from_utf8_lossy(&subject[start..cursor]));
                        stack.pop_region()?;
                        depth = depth.saturating_sub(1);
                        Step::Succeed
                    },

                    PatKind::AssignOnM(_) | PatKind::CallOnM(_) => {
                        // Park this node in the special entry and stack a commit marker holding
                        // the end cursor; the assignment itself runs after overall success.
                        let base = stack.base();
                        if base == 0 {
                            return Err(MatchError::Logic("assignment node outside a region"));
                        }
                        stack.entry_mut(base - 1).site = site;
                        stack.push(Slot::Cursor(cursor), Site::Ctrl(Ctrl::Assign));
                        stack.pop_region()?;
                        depth = depth.saturating_sub(1);
                        deferred_present = true;
                        Step::Succeed
                    },
                };
            },
        }
    }
}

/// Matches a literal at the cursor, advancing past it on success.
fn step_literal(subject: &[u8], cursor: &mut usize, lit: &[u8]) -> Step {
    let end = *cursor + lit.len();
    if subject.len() >= end && &subject[*cursor..end] == lit {
        *cursor = end;
        Step::Succeed
    } else {
        Step::Fail
    }
}

/// The cursor saved in the current region's special entry, i.e. where its sub-match started.
fn region_start(stack: &Stack) -> Result<usize, MatchError> {
    let base = stack.base();
    if base == 0 {
        return Err(MatchError::Logic("region operation outside a region"));
    }
    match stack.entry(base - 1).slot {
        Slot::Cursor(start) => Ok(start),
        Slot::Base(_) => Err(MatchError::Logic("region entry without a saved cursor")),
    }
}

// SUCCESS
// ================================================================================================

/// Builds the reported span and, if any commit markers were stacked, applies the deferred
/// assignments in stack order (bottom first), which is the left-to-right textual order of the
/// surviving match.
fn finish(
    subject: &[u8],
    cursor: usize,
    graphs: &GraphTable,
    stack: &Stack,
    deferred_present: bool,
    flags: Flags,
) -> Result<Option<Match>, MatchError> {
    let Slot::Cursor(anchor) = stack.entry(0).slot else {
        return Err(MatchError::Logic("anchor entry without a cursor"));
    };
    let result = Match { start: anchor + 1, stop: cursor };

    if flags.is_debug() {
        debug!(
            target: "snopat",
            "match succeeds, positions {} .. {}, substring {:?}",
            result.start,
            result.stop,
            String::from_utf8_lossy(&subject[anchor..cursor]),
        );
    }

    if deferred_present {
        let top = stack.top_index();
        for s in 0.. {
            if s as isize > top {
                break;
            }
            let entry = stack.entry(s);
            if entry.site != Site::Ctrl(Ctrl::Assign) {
                continue;
            }

            // The restore entry stacked right above the marker leads back to the region, whose
            // special entry holds the source node and the starting cursor.
            let Slot::Cursor(stop) = entry.slot else {
                return Err(MatchError::Logic("commit marker without an end cursor"));
            };
            if s as isize >= top {
                return Err(MatchError::Logic("commit marker without a region entry"));
            }
            let Slot::Base(inner) = stack.entry(s + 1).slot else {
                return Err(MatchError::Logic("commit marker not followed by a saved base"));
            };
            let special = stack.entry(inner - 1);
            let Site::Node { graph, link } = special.site else {
                return Err(MatchError::Logic("deferred commit without a source node"));
            };
            let Slot::Cursor(start) = special.slot else {
                return Err(MatchError::Logic("deferred commit without a start cursor"));
            };

            let text = String::from_utf8_lossy(&subject[start..stop]);
            if flags.is_debug() {
                debug!(target: "snopat", "deferred commit of {text:?}");
            }
            match &graphs.get(graph)[link].kind {
                PatKind::AssignOnM(var) => var.set(text),
                PatKind::CallOnM(setter) => setter.set(&text),
                _ => return Err(MatchError::Logic("deferred commit names a non-assign node")),
            }
        }
    }

    Ok(Some(result))
}

// NARRATION
// ================================================================================================

fn pad(depth: usize) -> String {
    "| ".repeat(depth)
}

/// Emits the subject with a caret under the current cursor position.
fn trace_cursor(subject: &[u8], cursor: usize, code: &str) {
    let mut caret = String::new();
    for &b in &subject[..cursor.min(subject.len())] {
        caret.push(if b == b'\t' { '\t' } else { ' ' });
    }
    trace!(target: "snopat", "node   : {code}");
    trace!(target: "snopat", "subject: {}", String::from_utf8_lossy(subject));
    trace!(target: "snopat", "         {caret}^");
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use snopat_core::{
        CharTest, NatArg, NatVar, Pattern, PatternCell, StrVar, abort, any, arb, arbno, bal, brk,
        brkx, defer, defer_bool, defer_str, fail, fence, fenced, len, not_any, nspan, pos, rem,
        rpos, rtab, setcur, span, succeed, tab,
    };

    use crate::{Flags, match_pattern};

    fn span_of(subject: &str, p: &Pattern) -> Option<(usize, usize)> {
        match_pattern(subject, p, Flags::NONE).unwrap().map(|m| (m.start(), m.stop()))
    }

    fn matches(subject: &str, p: &Pattern) -> bool {
        span_of(subject, p).is_some()
    }

    #[test]
    fn char_and_literal() {
        assert_eq!(span_of("Hello", &Pattern::from("Hello")), Some((1, 5)));
        assert_eq!(span_of("say Hello", &Pattern::from("Hello")), Some((5, 9)));
        assert!(!matches("Hell", &Pattern::from("Hello")));
        assert_eq!(span_of("abc", &Pattern::from('b')), Some((2, 2)));
    }

    #[test]
    fn any_and_not_any() {
        assert_eq!(span_of("Hello", &any("aeiou")), Some((2, 2)));
        assert!(!matches("xyz", &any("aeiou")));
        assert_eq!(span_of("eee", &not_any("aeiou")), None);
        assert_eq!(span_of("xe", &not_any("aeiou")), Some((1, 1)));
    }

    #[test]
    fn span_needs_one_byte() {
        let digits = span("0123456789");
        assert_eq!(span_of("a123b", &digits), Some((2, 4)));
        assert!(!matches("abc", &digits));

        // nspan matches the empty run instead.
        let p = Pattern::from("ab") & nspan("0123456789") & "cd";
        assert!(matches("abcd", &p));
        assert!(matches("ab123cd", &p));
    }

    #[test]
    fn break_stops_before_hit() {
        let p = brk(",") & ',';
        assert_eq!(span_of("abc,def", &p), Some((1, 4)));
        assert!(!matches("abcdef", &brk(",")));

        // break itself consumes nothing when already at a hit.
        assert_eq!(span_of(",x", &(brk(",") & ',')), Some((1, 1)));
    }

    #[test]
    fn breakx_retries_later_hits() {
        // break alone commits to the first 'l'; breakx walks on to the one that works.
        let fixed = brk("l") & "lo";
        assert!(!matches("Hello", &fixed));
        let retrying = brkx("l") & "lo";
        assert_eq!(span_of("Hello", &retrying), Some((1, 5)));
    }

    #[test]
    fn arb_extends_on_demand() {
        let p = Pattern::from("a") & arb() & 'z';
        assert_eq!(span_of("abcz", &p), Some((1, 4)));
        assert_eq!(span_of("az", &p), Some((1, 2)));
        assert!(!matches("abc", &p));
    }

    #[test]
    fn positions_and_tabs() {
        assert!(matches("abc", &(pos(0usize) & "abc" & rpos(0usize))));
        assert!(!matches("abcd", &(pos(0usize) & "abc" & rpos(0usize))));
        assert_eq!(span_of("abcd", &(pos(1usize) & len(2usize))), Some((2, 3)));

        assert_eq!(span_of("abcdef", &(tab(4usize) & rem())), Some((1, 6)));
        assert_eq!(span_of("abcdef", &(rtab(2usize) & "ef")), Some((1, 6)));
        assert!(!matches("abc", &tab(9usize)));
        assert!(!matches("abc", &rtab(9usize)));
    }

    #[test]
    fn deferred_nat_args_resolve_per_visit() {
        let n = NatVar::new(2);
        let p = pos(NatArg::Var(n.clone())) & "c";
        assert!(matches("abc", &p));
        n.set(1);
        assert!(!matches("abc", &p));
        assert!(matches("acb", &p));
    }

    #[test]
    fn rem_and_null() {
        assert_eq!(span_of("abc", &(Pattern::from("a") & rem())), Some((1, 3)));
        assert_eq!(span_of("abc", &Pattern::from("")), Some((1, 0)));
    }

    #[test]
    fn fail_and_succeed() {
        assert!(!matches("abc", &fail()));
        assert_eq!(span_of("abc", &succeed()), Some((1, 0)));
    }

    #[test]
    fn fence_pins_the_anchor() {
        // "ello" matches unanchored, but a fence forbids moving the anchor point.
        assert!(matches("Hello", &Pattern::from("ello")));
        assert!(!matches("Hello", &(fence() & "ello")));
        assert!(matches("Hello", &(fence() & "Hello")));
    }

    #[test]
    fn fenced_pattern_commits_to_first_success() {
        let open = (Pattern::from("a") | "ab") & "c";
        assert!(matches("abc", &open));

        // Once "a" has matched inside the fence, the "ab" alternative is gone.
        let committed = fenced(Pattern::from("a") | "ab") & "c";
        assert!(!matches("abc", &committed));
        assert!(matches("ac", &committed));
    }

    #[test]
    fn balanced_spans() {
        let whole = pos(0usize) & bal() & rpos(0usize);
        assert!(matches("()(())(pp())", &whole));
        assert!(matches("x", &whole));
        assert!(!matches("())", &whole));
        assert!(!matches("(", &whole));

        // bal never matches the empty string.
        assert!(!matches("", &bal()));
    }

    #[test]
    fn simple_arbno_iterates() {
        let p = pos(0usize) & arbno(Pattern::from("ab")) & rpos(0usize);
        assert!(matches("", &p));
        assert!(matches("ababab", &p));
        assert!(!matches("abx", &p));
    }

    #[test]
    fn complex_arbno_terminates_on_null_iterations() {
        // nspan can match null, so this is the region form; the null-iteration guard keeps it
        // from looping.
        let p = pos(0usize) & arbno(nspan("a")) & rpos(0usize);
        assert!(matches("aaa", &p));
        assert!(matches("", &p));
    }

    #[test]
    fn complex_arbno_backtracks_whole_iterations() {
        let p = arbno(Pattern::from("ab") | "a") & "az";
        assert_eq!(span_of("abaaz", &p), Some((1, 5)));
    }

    #[test]
    fn assignment_on_match_commits_after_success() {
        let vowel = StrVar::default();
        let p = any("aeiou") * &vowel;
        assert_eq!(span_of("Hello", &p), Some((2, 2)));
        assert_eq!(vowel.get(), "e");
    }

    #[test]
    fn assignment_on_match_is_cancelled_by_failure() {
        let var = StrVar::new("untouched");
        let p = (any("ab") * &var) & 'z';
        assert!(!matches("ay", &p));
        assert_eq!(var.get(), "untouched");
    }

    #[test]
    fn immediate_assignment_survives_abort() {
        let nonv = StrVar::default();
        let cur = NatVar::new(99);
        let p = setcur(&cur) & (Pattern::from('l') % &nonv) & abort();

        assert!(!matches("Hello", &p));
        assert_eq!(nonv.get(), "l");
        assert_eq!(cur.get(), 2);
    }

    #[test]
    fn setcur_records_the_cursor() {
        let at = NatVar::default();
        let p = Pattern::from("ll") & setcur(&at);
        assert!(matches("Hello", &p));
        assert_eq!(at.get(), 4);

        // Setter form: same cursor, delivered through the capability.
        let seen = NatVar::default();
        let sink = seen.clone();
        let p = Pattern::from("ll") & snopat_core::setcur_fn(move |n| sink.set(n));
        assert!(matches("Hello", &p));
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn immediate_call_fires_per_attempt() {
        use std::sync::{Arc, Mutex};

        // An immediate call fires every time its sub-pattern succeeds, even on attempts the
        // overall match later abandons.
        let calls: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&calls);
        let p = any("lo").call_imm(move |s: &str| sink.lock().unwrap().push(s.into())) & 'z';

        assert!(!matches("lol", &p));
        assert_eq!(calls.lock().unwrap().as_slice(), ["l", "o", "l"]);
    }

    #[test]
    fn deferred_strings_read_at_match_time() {
        let var = StrVar::default();
        let p = Pattern::from("He") & defer_str(&var);
        var.set("llo");
        assert_eq!(span_of("Hello", &p), Some((1, 5)));

        var.set("xx");
        assert!(!matches("Hello", &p));
    }

    #[test]
    fn deferred_string_getter() {
        let p = Pattern::from("He") & snopat_core::defer_getter(|| "llo".to_string());
        assert_eq!(span_of("Hello", &p), Some((1, 5)));
    }

    #[test]
    fn deferred_predicate() {
        assert!(matches("x", &(defer_bool(|| true) & "x")));
        assert!(!matches("x", &(defer_bool(|| false) & "x")));
    }

    #[test]
    fn deferred_char_test_reads_variable() {
        let set = StrVar::new("aeiou");
        let p = any(CharTest::Var(set.clone()));
        assert!(matches("e", &p));
        set.set("xyz");
        assert!(!matches("e", &p));
    }

    #[test]
    fn deferred_pattern_recursion() {
        // p = 'a' p | 'b': a run of a's closed by one b.
        let cell = PatternCell::new();
        let p = (Pattern::from('a') & defer(&cell)) | 'b';
        cell.set(p.clone());

        assert_eq!(span_of("aaab", &p), Some((1, 4)));
        assert_eq!(span_of("b", &p), Some((1, 1)));
        assert!(!matches("aaa", &p));
    }

    #[test]
    fn deferred_pattern_reassignment_is_visible() {
        let cell = PatternCell::new();
        let p = Pattern::from("x") & defer(&cell);

        cell.set(Pattern::from("y"));
        assert!(matches("xy", &p));
        cell.set(Pattern::from("z"));
        assert!(!matches("xy", &p));
        assert!(matches("xz", &p));
    }

    #[test]
    fn unset_cell_reports_uninitialized() {
        let cell = PatternCell::new();
        let p = Pattern::from("x") & defer(&cell);
        assert_eq!(
            match_pattern("xy", &p, Flags::NONE),
            Err(crate::MatchError::UninitializedPattern)
        );
    }

    #[test]
    fn anchored_matches_pin_the_start() {
        let p = Pattern::from("ello");
        assert!(match_pattern("Hello", &p, Flags::ANCHOR).unwrap().is_none());

        let m = match_pattern("ello there", &p, Flags::ANCHOR).unwrap().expect("match");
        assert_eq!(m.start(), 1);
    }

    #[test]
    fn backtracking_across_a_deferred_reference() {
        // The inner alternatives must stay live after the reference completes.
        let cell = PatternCell::new();
        cell.set(Pattern::from("ab") | "a");
        let p = pos(0usize) & defer(&cell) & "bc" & rpos(0usize);
        assert!(matches("abc", &p));
    }
}
