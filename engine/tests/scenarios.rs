//! End-to-end matching scenarios, each exercised under both anchored and unanchored flags
//! wherever the two coincide.

use pretty_assertions::assert_eq;
use rstest::rstest;
use snopat_core::{
    NatVar, Pattern, PatternCell, StrVar, abort, any, arb, arbno, bal, defer, nspan, pos, rpos,
    setcur, span,
};
use snopat_engine::{Flags, Match, MatchRes, match_pattern, match_replace};

fn run(subject: &str, p: &Pattern, flags: Flags) -> Option<Match> {
    match_pattern(subject, p, flags).expect("match runs to a verdict")
}

#[rstest]
#[case::unanchored(Flags::NONE)]
#[case::anchored(Flags::ANCHOR)]
fn literal_concatenation(#[case] flags: Flags) {
    let p = Pattern::from("Hello") & ' ' & "World";
    let m = run("Hello World!", &p, flags).expect("match");
    assert_eq!((m.start(), m.stop()), (1, 11));
    assert_eq!(m.extract("Hello World!"), "Hello World");
}

#[rstest]
#[case::unanchored(Flags::NONE)]
#[case::anchored(Flags::ANCHOR)]
fn arb_fills_the_gap(#[case] flags: Flags) {
    let gap = StrVar::default();
    let p = Pattern::from("Hello ") & (arb() * &gap) & "World";

    let m = run("Hello abcWorld!", &p, flags).expect("match");
    assert_eq!((m.start(), m.stop()), (1, 14));
    assert_eq!(gap.get(), "abc");
}

#[rstest]
#[case::unanchored(Flags::NONE)]
#[case::anchored(Flags::ANCHOR)]
fn balanced_whole_subject(#[case] flags: Flags) {
    let p = pos(0usize) & bal() & rpos(0usize);

    let subject = "()(())(pp())";
    let m = run(subject, &p, flags).expect("match");
    assert_eq!((m.start(), m.stop()), (1, subject.len()));

    assert_eq!(run("())", &p, flags), None);
}

#[test]
fn vowel_capture_commits_on_success() {
    let vowel = StrVar::default();
    let p = any("aeiou") * &vowel;

    let m = run("Hello", &p, Flags::NONE).expect("match");
    assert_eq!((m.start(), m.stop()), (2, 2));
    assert_eq!(vowel.get(), "e");

    // Anchored, the pattern cannot reach the vowel and nothing is committed.
    let untouched = StrVar::default();
    assert_eq!(run("Hello", &(any("aeiou") * &untouched), Flags::ANCHOR), None);
    assert_eq!(untouched.get(), "");
}

#[test]
fn immediate_effects_survive_an_abort() {
    let nonv = StrVar::default();
    let cur = NatVar::default();
    let p = setcur(&cur) & (Pattern::from('l') % &nonv) & abort();

    assert_eq!(run("Hello", &p, Flags::NONE), None);
    assert_eq!(nonv.get(), "l");
    assert_eq!(cur.get(), 2);
}

#[rstest]
#[case::unanchored(Flags::NONE)]
#[case::anchored(Flags::ANCHOR)]
fn nspan_between_literals(#[case] flags: Flags) {
    let p = Pattern::from("Hello ") & nspan("0123456789") & "World";

    let with_digits = run("Hello 123World!", &p, flags).expect("match");
    assert_eq!((with_digits.start(), with_digits.stop()), (1, 14));

    let without = run("Hello World!", &p, flags).expect("match");
    assert_eq!((without.start(), without.stop()), (1, 11));
}

#[rstest]
#[case::unanchored(Flags::NONE)]
#[case::anchored(Flags::ANCHOR)]
fn verdicts_are_idempotent(#[case] flags: Flags) {
    let tail = StrVar::default();
    let p = Pattern::from("He") & (span("l") * &tail) & "o";

    let first = run("Hello", &p, flags);
    let second = run("Hello", &p, flags);
    assert_eq!(first, second);
    assert_eq!(first.map(|m| (m.start(), m.stop())), Some((1, 5)));
    assert_eq!(tail.get(), "ll");
}

#[test]
fn anchored_success_starts_at_one() {
    let p = span("abc");
    let m = run("cabbage", &p, Flags::ANCHOR).expect("match");
    assert_eq!(m.start(), 1);
    assert_eq!(m.extract("cabbage"), "cabba");
}

#[test]
fn replacement_preserves_the_flanks() {
    let p = span("0123456789");
    let subject = "order 123 shipped".to_string();

    let m = run(&subject, &p, Flags::NONE).expect("match");
    let (s, e) = (m.start(), m.stop());

    let mut replaced = subject.clone();
    assert!(match_replace(&mut replaced, &p, "###", Flags::NONE).unwrap());

    assert_eq!(&replaced[..s - 1], &subject[..s - 1]);
    assert_eq!(&replaced[s - 1..s - 1 + 3], "###");
    assert_eq!(&replaced[s - 1 + 3..], &subject[e..]);
    assert_eq!(replaced, "order ### shipped");
}

#[test]
fn deferred_commits_run_bottom_up_exactly_once() {
    use std::sync::{Arc, Mutex};

    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = |tag: &'static str, order: &Arc<Mutex<Vec<String>>>| {
        let order = Arc::clone(order);
        move |s: &str| order.lock().unwrap().push(format!("{tag}={s}"))
    };

    // Two deferred commits plus a backtracked alternative whose commit must not survive.
    let p = (any("H").call_on_match(log("first", &order))
        & (Pattern::from("ex") | "el").call_on_match(log("second", &order)))
        & "lo";

    let m = run("Hello", &p, Flags::NONE).expect("match");
    assert_eq!((m.start(), m.stop()), (1, 5));
    assert_eq!(order.lock().unwrap().as_slice(), ["first=H", "second=el"]);
}

#[test]
fn recursive_pattern_via_deferred_cell() {
    // list = '(' list ')' list | ""  — the classic balanced-parentheses grammar.
    let list = PatternCell::new();
    let body = (Pattern::from('(') & defer(&list) & ')' & defer(&list)) | "";
    list.set(body.clone());

    let whole = pos(0usize) & defer(&list) & rpos(0usize);
    assert!(run("", &whole, Flags::NONE).is_some());
    assert!(run("()", &whole, Flags::NONE).is_some());
    assert!(run("(())()", &whole, Flags::NONE).is_some());
    assert!(run("(()", &whole, Flags::NONE).is_none());

    list.clear();
}

#[test]
fn arbno_of_composite_patterns() {
    // Nested repetition: "Hello World!" groups, each optionally followed by "abc" runs.
    let group = Pattern::from("Hello") & ' ' & "World!";
    let p = pos(0usize) & arbno(group & arbno(Pattern::from("abc"))) & rpos(0usize);

    assert!(run("Hello World!Hello World!", &p, Flags::NONE).is_some());
    assert!(run("Hello World!abcabcHello World!", &p, Flags::NONE).is_some());
    assert!(run("Hello World!abcabz", &p, Flags::NONE).is_none());
}

#[test]
fn match_res_round_trip() {
    let captured = StrVar::default();
    let p = Pattern::from("good") * &captured;

    let mut res = MatchRes::new("goodbye");
    assert!(res.apply(&p, Flags::NONE).unwrap());
    res.replace(&format!("<b>{}</b>", captured.get()));
    assert_eq!(res.subject(), "<b>good</b>bye");

    let mut missing = MatchRes::new("hello");
    assert!(!missing.apply(&p, Flags::NONE).unwrap());
    assert!(!missing.replace("x"));
    assert_eq!(missing.subject(), "hello");
}
