//! Pattern printers.
//!
//! `Display` reconstructs a syntax-like expression from the flat graph. The walk leans on the
//! stylised index numbering of the composite structures: the bracketing nodes of a region sit at
//! fixed offsets from the operator node (`REnter` one above the closing node, the `ArbnoY` two
//! below its `ArbnoX`), and the width of an alternation's left arm is the difference between the
//! serial indices of its two arms.
//!
//! `dump` writes the raw per-node table instead, highest index first, which corresponds to the
//! order the nodes were constructed in.

use std::fmt::{self, Write};
use std::sync::Arc;

use super::Pattern;
use super::node::{CharTest, Graph, NatArg, PatKind, PatLink};

// EXPRESSION FORM
// ================================================================================================

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_seq(f, self.graph(), self.graph().root(), PatLink::EOP, false)
    }
}

/// Steps over region-enter nodes: the node one index below an `REnter` is the closing node of
/// the same region and renders the whole bracketed group.
fn resolve_enter(g: &Graph, link: PatLink) -> PatLink {
    let mut cur = link;
    while !cur.is_eop() && matches!(g[cur].kind, PatKind::REnter) {
        cur = PatLink::to(cur.index() - 1);
    }
    cur
}

/// Writes the sequence starting at `from` whose successor is `succ`, inserting ` & ` between
/// elements. `paren` wraps a printed sequence in parentheses.
fn write_seq(
    f: &mut fmt::Formatter<'_>,
    g: &Graph,
    from: PatLink,
    succ: PatLink,
    paren: bool,
) -> fmt::Result {
    if from.is_eop() {
        return write!(f, "\"\"");
    }

    let mut cur = resolve_enter(g, from);
    let wrap = paren && cur != succ;
    if wrap {
        f.write_char('(')?;
    }

    loop {
        let next = write_node(f, g, cur)?;
        if next == succ || next.is_eop() {
            break;
        }
        let next = resolve_enter(g, next);
        if next == succ || next.is_eop() {
            break;
        }
        f.write_str(" & ")?;
        cur = next;
    }

    if wrap {
        f.write_char(')')?;
    }
    Ok(())
}

fn write_byte(f: &mut fmt::Formatter<'_>, b: u8) -> fmt::Result {
    if (0x20..0x7f).contains(&b) {
        f.write_char(b as char)
    } else {
        write!(f, "\\x{b:02x}")
    }
}

fn write_test(f: &mut fmt::Formatter<'_>, name: &str, t: &CharTest) -> fmt::Result {
    match t {
        CharTest::Char(c) => {
            write!(f, "{name}('")?;
            write_byte(f, *c)?;
            write!(f, "')")
        },
        CharTest::Set(set) => write!(f, "{name}(\"{set}\")"),
        CharTest::Var(var) => write!(f, "{name}({:p})", var.id()),
        CharTest::Getter(g) => write!(f, "{name}({:p})", Arc::as_ptr(g)),
    }
}

fn write_nat(f: &mut fmt::Formatter<'_>, name: &str, n: &NatArg) -> fmt::Result {
    match n {
        NatArg::Lit(n) => write!(f, "{name}({n})"),
        NatArg::Var(var) => write!(f, "{name}({:p})", var.id()),
        NatArg::Getter(g) => write!(f, "{name}({:p})", Arc::as_ptr(g)),
    }
}

/// Writes one element (which may render a whole bracketed or alternated group) and returns the
/// link the enclosing sequence should continue from.
fn write_node(f: &mut fmt::Formatter<'_>, g: &Graph, link: PatLink) -> Result<PatLink, fmt::Error> {
    let node = &g[link];
    let mut e_next = node.next;

    match &node.kind {
        PatKind::Alt(alt) => {
            // The successor of the whole alternation is the first node that is neither inside
            // the left arm (index range recovered from the arm roots) nor the node itself.
            if !node.next.is_eop() {
                let elmts_in_l = node.next.index().saturating_sub(alt.index());
                let lowest_in_l = link.index() - elmts_in_l;
                while !e_next.is_eop()
                    && e_next.index() >= lowest_in_l
                    && e_next.index() < link.index()
                {
                    e_next = g[e_next].next;
                }
            }

            f.write_char('(')?;
            let mut cur = link;
            loop {
                write_seq(f, g, g[cur].next, e_next, false)?;
                f.write_str(" | ")?;
                let arm = g[cur].kind.alt().expect("alternation node has an alternative");
                match g.get(arm).map(|n| &n.kind) {
                    Some(PatKind::Alt(_)) => cur = arm,
                    _ => {
                        write_seq(f, g, arm, e_next, false)?;
                        break;
                    },
                }
            }
            f.write_char(')')?;
        },

        PatKind::Abort => f.write_str("Abort()")?,
        PatKind::Fail => f.write_str("Fail()")?,
        PatKind::Fence => f.write_str("Fence()")?,
        PatKind::Rem => f.write_str("Rem()")?,
        PatKind::Succeed => f.write_str("Succeed()")?,
        PatKind::ArbX(_) => f.write_str("Arb()")?,

        PatKind::Null => f.write_str("\"\"")?,
        PatKind::Char(c) => {
            f.write_char('\'')?;
            write_byte(f, *c)?;
            f.write_char('\'')?;
        },
        PatKind::Lit(s) => write!(f, "{:?}", String::from_utf8_lossy(s))?,
        PatKind::StrRef(var) => write!(f, "String({:p})", var.id())?,
        PatKind::StrGet(getter) => write!(f, "String({:p})", Arc::as_ptr(getter))?,

        PatKind::Bal { open, close } => {
            f.write_str("Bal('")?;
            write_byte(f, *open)?;
            f.write_str("', '")?;
            write_byte(f, *close)?;
            f.write_str("')")?;
        },

        PatKind::Any(t) => write_test(f, "Any", t)?,
        PatKind::NotAny(t) => write_test(f, "NotAny", t)?,
        PatKind::Span(t) => write_test(f, "Span", t)?,
        PatKind::NSpan(t) => write_test(f, "NSpan", t)?,
        PatKind::Break(t) => write_test(f, "Break", t)?,
        PatKind::BreakX(t) => write_test(f, "BreakX", t)?,

        PatKind::Pos(n) => write_nat(f, "Pos", n)?,
        PatKind::RPos(n) => write_nat(f, "RPos", n)?,
        PatKind::Tab(n) => write_nat(f, "Tab", n)?,
        PatKind::RTab(n) => write_nat(f, "RTab", n)?,
        PatKind::Len(n) => write_nat(f, "Len", n)?,

        PatKind::Setcur(var) => write!(f, "Setcur({:p})", var.id())?,
        PatKind::SetcurFn(s) => write!(f, "Setcur({:p})", Arc::as_ptr(s))?,
        PatKind::Rpat(cell) => write!(f, "Defer({:p})", cell.id())?,
        PatKind::PredFn(getter) => write!(f, "Defer({:p})", Arc::as_ptr(getter))?,

        PatKind::ArbnoS(body) => {
            f.write_str("Arbno(")?;
            write_seq(f, g, *body, link, false)?;
            f.write_char(')')?;
        },

        PatKind::ArbnoX(enter) => {
            // Body runs from the region head's successor down to the ArbnoY, two below us.
            f.write_str("Arbno(")?;
            write_seq(f, g, g[*enter].next, PatLink::to(link.index() - 2), false)?;
            f.write_char(')')?;
        },

        PatKind::FenceX => {
            // The matching REnter is one above us.
            let enter = PatLink::to(link.index() + 1);
            f.write_str("Fence(")?;
            write_seq(f, g, g[enter].next, link, false)?;
            f.write_char(')')?;
        },

        PatKind::AssignImm(var) => write_region(f, g, link, " % ", var.id())?,
        PatKind::AssignOnM(var) => write_region(f, g, link, " * ", var.id())?,
        PatKind::CallImm(s) => {
            write_region(f, g, link, " % ", Arc::as_ptr(s) as *const ())?;
        },
        PatKind::CallOnM(s) => {
            write_region(f, g, link, " * ", Arc::as_ptr(s) as *const ())?;
        },

        PatKind::REnter => {
            // Never printed directly; sequences resolve the enter node to its closing node.
            e_next = PatLink::to(link.index() - 1);
        },

        // Stack-referenced or cycle-interior nodes are not legal sequence heads; identify them
        // rather than guessing at structure.
        PatKind::ArbY | PatKind::ArbnoY { .. } | PatKind::BreakXX => {
            write!(f, "<{}>", node.kind.code())?;
        },
    }

    Ok(e_next)
}

/// Writes an assignment or call group: the bracketed sub-pattern, the combinator glyph, and the
/// identity of the target.
fn write_region(
    f: &mut fmt::Formatter<'_>,
    g: &Graph,
    closing: PatLink,
    op: &str,
    target: *const (),
) -> fmt::Result {
    let enter = PatLink::to(closing.index() + 1);
    f.write_char('(')?;
    write_seq(f, g, g[enter].next, closing, false)?;
    f.write_char(')')?;
    write!(f, "{op}{target:p}")
}

// DUMP TABLE
// ================================================================================================

impl Pattern {
    /// Renders the internal node table, one row per node, highest index first (the order the
    /// nodes were constructed in): `#index addr CODE next payload`.
    ///
    /// The format is keyed to the internal data structures and is meant for debugging; the
    /// `Display` form is the readable one.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_dump(&mut out).expect("writing to a string cannot fail");
        out
    }

    fn write_dump(&self, out: &mut String) -> fmt::Result {
        let g = self.graph();
        writeln!(out, "pattern dump (stack index = {})", self.stack_index())?;

        if g.is_empty() {
            writeln!(out, "EOP (null pattern)")?;
            return Ok(());
        }

        for slot in (0..g.len()).rev() {
            let link = PatLink::to(slot as u32 + 1);
            let node = &g[link];

            write!(out, "{:<7}", format!("#{}", link.index()))?;
            write!(out, "{:p}  ", node as *const _)?;
            write!(out, "{:<12}", node.kind.code())?;
            match node.next {
                PatLink::EOP => write!(out, "{:<7}", "EOP")?,
                next => write!(out, "{:<7}", format!("#{}", next.index()))?,
            }
            write_dump_payload(out, g, link)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

fn write_dump_payload(out: &mut String, g: &Graph, link: PatLink) -> fmt::Result {
    let node = &g[link];

    if let Some(alt) = node.kind.alt() {
        return write!(out, "{alt}");
    }

    match &node.kind {
        PatKind::Bal { open, close } => {
            write!(out, "('{}', '{}')", *open as char, *close as char)
        },
        PatKind::Char(c) => write!(out, "'{}'", *c as char),
        PatKind::Lit(s) => write!(out, "{:?}", String::from_utf8_lossy(s)),
        PatKind::Any(t)
        | PatKind::NotAny(t)
        | PatKind::Span(t)
        | PatKind::NSpan(t)
        | PatKind::Break(t)
        | PatKind::BreakX(t) => match t {
            CharTest::Char(c) => write!(out, "'{}'", *c as char),
            CharTest::Set(set) => write!(out, "\"{set}\""),
            CharTest::Var(var) => write!(out, "{:p}", var.id()),
            CharTest::Getter(getter) => write!(out, "{:p}", Arc::as_ptr(getter)),
        },
        PatKind::Pos(n) | PatKind::RPos(n) | PatKind::Tab(n) | PatKind::RTab(n)
        | PatKind::Len(n) => match n {
            NatArg::Lit(n) => write!(out, "{n}"),
            NatArg::Var(var) => write!(out, "{:p}", var.id()),
            NatArg::Getter(getter) => write!(out, "{:p}", Arc::as_ptr(getter)),
        },
        PatKind::ArbnoY { count } => write!(out, "{count}"),
        PatKind::StrRef(var) | PatKind::AssignImm(var) | PatKind::AssignOnM(var) => {
            write!(out, "{:p}", var.id())
        },
        PatKind::StrGet(getter) => write!(out, "{:p}", Arc::as_ptr(getter)),
        PatKind::CallImm(s) | PatKind::CallOnM(s) => write!(out, "{:p}", Arc::as_ptr(s)),
        PatKind::Setcur(var) => write!(out, "{:p}", var.id()),
        PatKind::SetcurFn(s) => write!(out, "{:p}", Arc::as_ptr(s)),
        PatKind::Rpat(cell) => write!(out, "{:p}", cell.id()),
        PatKind::PredFn(getter) => write!(out, "{:p}", Arc::as_ptr(getter)),
        _ => Ok(()),
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use crate::pattern::Pattern;

    #[test]
    fn literal_sequence() {
        let p = Pattern::from("Hello") & ' ' & "World";
        assert_eq!(p.to_string(), "\"Hello\" & ' ' & \"World\"");
    }

    #[test]
    fn alternation_groups() {
        let p = (Pattern::from("ab") | 'c') & crate::span("01");
        assert_eq!(p.to_string(), "(\"ab\" | 'c') & Span(\"01\")");

        // A right-grouped chain prints flat; a left-grouped one keeps its grouping.
        let q = Pattern::from('a') | (Pattern::from('b') | 'c');
        assert_eq!(q.to_string(), "('a' | 'b' | 'c')");
        let r = (Pattern::from('a') | 'b') | 'c';
        assert_eq!(r.to_string(), "(('a' | 'b') | 'c')");
    }

    #[test]
    fn builtin_leaves() {
        let p = crate::pos(0usize) & crate::bal() & crate::rpos(0usize);
        assert_eq!(p.to_string(), "Pos(0) & Bal('(', ')') & RPos(0)");

        assert_eq!(crate::arb().to_string(), "Arb()");
        assert_eq!(crate::fence().to_string(), "Fence()");
        assert_eq!(Pattern::from("").to_string(), "\"\"");
        assert_eq!(Pattern::null().to_string(), "\"\"");
    }

    #[test]
    fn arbno_forms() {
        assert_eq!(crate::arbno(Pattern::from("ab")).to_string(), "Arbno(\"ab\")");
        assert_eq!(crate::arbno(crate::nspan("a")).to_string(), "Arbno(NSpan(\"a\"))");
    }

    #[test]
    fn fenced_group() {
        let p = crate::fenced(Pattern::from("ab") & 'c');
        assert_eq!(p.to_string(), "Fence(\"ab\" & 'c')");
    }

    #[test]
    fn assignment_groups() {
        let var = crate::StrVar::default();
        let p = crate::any("aeiou") * &var;
        let rendered = p.to_string();
        assert!(rendered.starts_with("(Any(\"aeiou\")) * 0x"), "got {rendered}");

        let q = (Pattern::from('l') % &var) & crate::abort();
        let rendered = q.to_string();
        assert!(rendered.starts_with("('l') % 0x"), "got {rendered}");
        assert!(rendered.ends_with(" & Abort()"), "got {rendered}");
    }

    #[test]
    fn dump_rows() {
        let p = (Pattern::from("ab") | 'c') & crate::span("01");
        let dump = p.dump();
        let mut lines = dump.lines();

        assert_eq!(lines.next(), Some("pattern dump (stack index = 1)"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 4);

        // Highest index first, and the codes identify the payload forms.
        assert!(rows[0].starts_with("#4"));
        assert!(rows[0].contains("Alt"));
        assert!(rows[1].contains("String_2"));
        assert!(rows[2].contains("Char"));
        assert!(rows[3].starts_with("#1"));
        assert!(rows[3].contains("Span_Set"));

        assert_eq!(Pattern::null().dump().lines().nth(1), Some("EOP (null pattern)"));
    }
}
