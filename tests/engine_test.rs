// engine_test.rs - Integration tests for scanning and capturing.

use std::time::{Duration, Instant};

use recurve::code::{OPT_ECMASCRIPT, OPT_IGNORE_CASE, OPT_MULTILINE, OPT_RIGHT_TO_LEFT};
use recurve::prelude::*;
use recurve::tree::{self, Node};

fn re(root: &Node) -> Regex {
    Regex::new(root).unwrap()
}

fn span(m: &Match<'_>) -> (usize, usize) {
    (m.start(), m.end())
}

// === Greedy and lazy quantifiers ===

#[test]
fn greedy_star_takes_longest() {
    // a*b over "aaab"
    let re = re(&tree::concat([tree::star(tree::ch('a')), tree::ch('b')]));
    let m = re.find("aaab").unwrap().unwrap();
    assert_eq!(span(&m), (0, 4));
    assert_eq!(m.as_str(), "aaab");
}

#[test]
fn captured_star() {
    // (a*)b over "aaab"
    let re = re(&tree::concat([
        tree::group(1, tree::star(tree::ch('a'))),
        tree::ch('b'),
    ]));
    let m = re.find("aaab").unwrap().unwrap();
    assert_eq!(span(&m), (0, 4));
    let g = m.group(1).unwrap();
    assert_eq!(g.as_str(), "aaa");
    assert_eq!((g.start(), g.end()), (0, 3));
}

#[test]
fn lazy_star_takes_shortest() {
    // a.*?b over "axbxb"
    let re = re(&tree::concat([
        tree::ch('a'),
        tree::star_lazy(tree::any()),
        tree::ch('b'),
    ]));
    let m = re.find("axbxb").unwrap().unwrap();
    assert_eq!(m.as_str(), "axb");
}

#[test]
fn lazy_group_loop() {
    // (ab)*?c expands only as far as needed
    let re = re(&tree::concat([
        tree::star_lazy(tree::group(1, tree::lit("ab"))),
        tree::ch('c'),
    ]));
    let m = re.find("ababc").unwrap().unwrap();
    assert_eq!(m.as_str(), "ababc");
    assert_eq!(m.group(1).unwrap().capture_count(), 2);
    let m = re.find("c").unwrap().unwrap();
    assert_eq!(m.as_str(), "c");
    assert!(m.group(1).is_none());
}

#[test]
fn counted_repeat() {
    let re = re(&tree::repeat(2, 4, tree::ch('a')));
    assert!(re.find("a").unwrap().is_none());
    assert_eq!(re.find("aa").unwrap().unwrap().as_str(), "aa");
    assert_eq!(re.find("aaaaaa").unwrap().unwrap().as_str(), "aaaa");
}

#[test]
fn counted_repeat_of_group() {
    // (ab){2,3}
    let re = re(&tree::repeat(2, 3, tree::group(1, tree::lit("ab"))));
    assert!(re.find("ab").unwrap().is_none());
    let m = re.find("abababab").unwrap().unwrap();
    assert_eq!(m.as_str(), "ababab");
    // the group recaptures on every iteration; the last one is reported
    let g = m.group(1).unwrap();
    assert_eq!((g.start(), g.end()), (4, 6));
    assert_eq!(g.capture_count(), 3);
}

#[test]
fn lazy_counted_repeat() {
    // (a){1,3}?b
    let re = re(&tree::concat([
        tree::repeat_lazy(1, 3, tree::group(1, tree::ch('a'))),
        tree::ch('b'),
    ]));
    let m = re.find("aaab").unwrap().unwrap();
    assert_eq!(m.as_str(), "aaab");
    assert_eq!(m.group(1).unwrap().capture_count(), 3);
}

#[test]
fn optional_group() {
    let re = re(&tree::concat([
        tree::opt(tree::group(1, tree::ch('a'))),
        tree::ch('b'),
    ]));
    let m = re.find("ab").unwrap().unwrap();
    assert_eq!(m.as_str(), "ab");
    assert!(m.group(1).is_some());
    let m = re.find("b").unwrap().unwrap();
    assert_eq!(m.as_str(), "b");
    assert!(m.group(1).is_none());
}

// === Alternation ===

#[test]
fn alternation_prefers_left() {
    let re = re(&tree::alt([tree::lit("ab"), tree::lit("abc")]));
    let m = re.find("abc").unwrap().unwrap();
    assert_eq!(m.as_str(), "ab");
}

#[test]
fn alternation_backtracks_across_branches() {
    // (ab|a)c over "ac"
    let re = re(&tree::concat([
        tree::group(1, tree::alt([tree::lit("ab"), tree::ch('a')])),
        tree::ch('c'),
    ]));
    let m = re.find("ac").unwrap().unwrap();
    assert_eq!(m.as_str(), "ac");
    assert_eq!(m.group(1).unwrap().as_str(), "a");
}

// === Backreferences ===

#[test]
fn backreference() {
    // (\w+)\s+\1 over "foo foo"
    let word = tree::plus(tree::set(CharClass::word()));
    let re = re(&tree::concat([
        tree::group(1, word),
        tree::plus(tree::set(CharClass::space())),
        tree::backref(1),
    ]));
    let m = re.find("foo foo").unwrap().unwrap();
    assert_eq!(span(&m), (0, 7));
    assert_eq!(m.group(1).unwrap().as_str(), "foo");
    assert!(re.find("foo bar").unwrap().is_none());
}

#[test]
fn unset_backreference_fails_by_default() {
    // (a)?\1 against "b": group 1 never set, so \1 can't match
    let re = re(&tree::concat([
        tree::opt(tree::group(1, tree::ch('a'))),
        tree::backref(1),
    ]));
    assert!(re.find("b").unwrap().is_none());
}

#[test]
fn unset_backreference_matches_empty_in_ecmascript_mode() {
    let root = tree::concat([
        tree::opt(tree::group(1, tree::ch('a'))),
        tree::backref(1),
        tree::ch('b'),
    ]);
    let re = Regex::with_options(&root, OPT_ECMASCRIPT).unwrap();
    let m = re.find("b").unwrap().unwrap();
    assert_eq!(m.as_str(), "b");
}

// === Balancing groups ===

#[test]
fn balanced_parentheses() {
    // ^(?:(?<o>\()|(?<-o>\)))+$ over "(())"
    let root = tree::concat([
        tree::text_begin(),
        tree::plus(tree::alt([
            tree::named_group(1, "o", tree::ch('(')),
            tree::balance_group(-1, 1, tree::ch(')')),
        ])),
        tree::text_end_z(),
    ]);
    let re = re(&root);
    let m = re.find("(())").unwrap().unwrap();
    assert_eq!(span(&m), (0, 4));
    // every open was balanced away
    assert!(m.group(1).is_none());
    assert!(m.group_named("o").is_none());

    // surplus open parens leave captures behind
    let m = re.find("(()").unwrap().unwrap();
    assert!(m.group(1).is_some());

    // a close with no pending open fails the whole match
    assert!(re.find("())(").unwrap().is_none());
}

#[test]
fn balance_capture_takes_between_interval() {
    // (?<a-b>) captures the span between the popped capture and the
    // balance point: ^(?<b>x)y+(?<a-b>)z$ over "xyyz" gives a = "yy"
    let root = tree::concat([
        tree::text_begin(),
        tree::named_group(2, "b", tree::ch('x')),
        tree::plus(tree::ch('y')),
        tree::balance_group(1, 2, Node::Empty),
        tree::ch('z'),
        tree::text_end_z(),
    ]);
    let re = re(&root);
    let m = re.find("xyyz").unwrap().unwrap();
    let a = m.group(1).unwrap();
    assert_eq!(a.as_str(), "yy");
    assert_eq!((a.start(), a.end()), (1, 3));
    assert!(m.group(2).is_none());
}

// === Lookarounds and atomic groups ===

#[test]
fn lookahead() {
    // foo(?=bar)
    let re = re(&tree::concat([
        tree::lit("foo"),
        tree::lookahead(tree::lit("bar")),
    ]));
    let m = re.find("foobar").unwrap().unwrap();
    assert_eq!(m.as_str(), "foo");
    assert!(re.find("foobaz").unwrap().is_none());
}

#[test]
fn negative_lookahead() {
    // foo(?!bar)
    let re = re(&tree::concat([
        tree::lit("foo"),
        tree::not_lookahead(tree::lit("bar")),
    ]));
    assert!(re.find("foobar").unwrap().is_none());
    assert!(re.find("foobaz").unwrap().is_some());
}

#[test]
fn lookbehind() {
    // (?<=@)\w+
    let re = re(&tree::concat([
        tree::lookbehind(tree::ch('@')),
        tree::plus(tree::set(CharClass::word())),
    ]));
    let m = re.find("user@example").unwrap().unwrap();
    assert_eq!(m.as_str(), "example");
    assert_eq!(m.start(), 5);
}

#[test]
fn negative_lookbehind() {
    // (?<!a)b
    let re = re(&tree::concat([
        tree::not_lookbehind(tree::ch('a')),
        tree::ch('b'),
    ]));
    let m = re.find("ab cb").unwrap().unwrap();
    assert_eq!(m.start(), 4);
}

#[test]
fn atomic_group_does_not_give_back() {
    // a(?>b*)b never matches: the atomic b* swallows every b
    let re1 = re(&tree::concat([
        tree::ch('a'),
        tree::atomic(tree::star(tree::ch('b'))),
        tree::ch('b'),
    ]));
    assert!(re1.find("abbb").unwrap().is_none());

    // without atomicity the same pattern matches
    let re2 = re(&tree::concat([
        tree::ch('a'),
        tree::star(tree::ch('b')),
        tree::ch('b'),
    ]));
    assert!(re2.find("abbb").unwrap().is_some());
}

#[test]
fn conditional_on_group() {
    // (a)?(?(1)b|c)
    let root = tree::concat([
        tree::opt(tree::group(1, tree::ch('a'))),
        tree::test_ref(1, tree::ch('b'), Some(tree::ch('c'))),
    ]);
    let re = re(&root);
    assert_eq!(re.find("ab").unwrap().unwrap().as_str(), "ab");
    assert_eq!(re.find("c").unwrap().unwrap().as_str(), "c");
    assert!(re.find("b").unwrap().is_none());
}

// === Anchors and boundaries ===

#[test]
fn word_boundaries() {
    // \bcat\b
    let re = re(&tree::concat([
        tree::word_boundary(),
        tree::lit("cat"),
        tree::word_boundary(),
    ]));
    assert!(re.is_match("a cat sat").unwrap());
    assert!(!re.is_match("concatenate").unwrap());
}

#[test]
fn multiline_line_anchors() {
    // ^b$ with explicit line anchors
    let root = tree::concat([tree::line_start(), tree::ch('b'), tree::line_end()]);
    let re = Regex::with_options(&root, OPT_MULTILINE).unwrap();
    let m = re.find("a\nb\nc").unwrap().unwrap();
    assert_eq!(m.start(), 2);
}

#[test]
fn endz_permits_trailing_newline() {
    let root = tree::concat([tree::lit("end"), tree::text_end_z()]);
    let re = re(&root);
    assert!(re.is_match("the end").unwrap());
    assert!(re.is_match("the end\n").unwrap());
    assert!(!re.is_match("the end\n\n").unwrap());
}

#[test]
fn match_start_anchor_pins_search() {
    // \Gab only matches where the scan starts
    let root = tree::concat([tree::match_start(), tree::lit("ab")]);
    let re = re(&root);
    assert!(re.find_from("xxab", 0).unwrap().is_none());
    assert_eq!(re.find_from("xxab", 2).unwrap().unwrap().start(), 2);
}

// === Case folding ===

#[test]
fn case_insensitive_literals() {
    let re = Regex::with_options(&tree::lit("Hello"), OPT_IGNORE_CASE).unwrap();
    assert!(re.is_match("say HELLO there").unwrap());
    assert!(re.is_match("hello").unwrap());
    assert!(!re.is_match("help").unwrap());
}

#[test]
fn case_insensitive_backreference() {
    let root = tree::concat([
        tree::group(1, tree::plus(tree::set(CharClass::word()))),
        tree::ch(' '),
        tree::backref(1),
    ]);
    let re = Regex::with_options(&root, OPT_IGNORE_CASE).unwrap();
    assert!(re.is_match("Foo fOO").unwrap());
}

// === Right-to-left ===

#[test]
fn rtl_finds_rightmost_match_first() {
    let re = Regex::with_options(&tree::lit("foo"), OPT_RIGHT_TO_LEFT).unwrap();
    let text = "foo foo";
    let m = re.find(text).unwrap().unwrap();
    assert_eq!(span(&m), (4, 7));
    let m2 = re.next_match(&m).unwrap().unwrap();
    assert_eq!(span(&m2), (0, 3));
    assert!(re.next_match(&m2).unwrap().is_none());
}

#[test]
fn rtl_mirrors_ltr_on_reversed_input() {
    // ab right-to-left over s equals ba left-to-right over reverse(s)
    let text = "xxabyy";
    let reversed: String = text.chars().rev().collect();
    let rtl = Regex::with_options(&tree::lit("ab"), OPT_RIGHT_TO_LEFT).unwrap();
    let ltr = re(&tree::lit("ba"));
    let m_rtl = rtl.find(text).unwrap().unwrap();
    let m_ltr = ltr.find(&reversed).unwrap().unwrap();
    assert_eq!(m_ltr.start(), text.len() - m_rtl.end());
    assert_eq!(m_ltr.end(), text.len() - m_rtl.start());
}

#[test]
fn rtl_capture_groups() {
    // (\d+)px right-to-left over "10px 20px"
    let root = tree::concat([
        tree::group(1, tree::plus(tree::set(CharClass::digit()))),
        tree::lit("px"),
    ]);
    let re = Regex::with_options(&root, OPT_RIGHT_TO_LEFT).unwrap();
    let m = re.find("10px 20px").unwrap().unwrap();
    assert_eq!(m.as_str(), "20px");
    assert_eq!(m.group(1).unwrap().as_str(), "20");
}

// === Iteration and empty-match progress ===

#[test]
fn find_iter_collects_all_matches() {
    let re = re(&tree::plus(tree::set(CharClass::digit())));
    let all: Vec<String> = re
        .find_iter("1 + 22 = 333")
        .map(|m| m.unwrap().as_str().to_string())
        .collect();
    assert_eq!(all, vec!["1", "22", "333"]);
}

#[test]
fn empty_matches_advance() {
    // a* yields an empty match at every position of "bbb" and terminates
    let re = re(&tree::star(tree::ch('a')));
    let spans: Vec<(usize, usize)> = re
        .find_iter("bbb")
        .map(|m| {
            let m = m.unwrap();
            (m.start(), m.end())
        })
        .collect();
    assert_eq!(spans, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
}

#[test]
fn empty_and_nonempty_interleave() {
    let re = re(&tree::star(tree::ch('a')));
    let spans: Vec<(usize, usize)> = re
        .find_iter("baab")
        .map(|m| {
            let m = m.unwrap();
            (m.start(), m.end())
        })
        .collect();
    assert_eq!(spans, vec![(0, 0), (1, 3), (3, 3), (4, 4)]);
}

// === Determinism ===

#[test]
fn identical_scans_produce_identical_records() {
    let root = tree::concat([
        tree::group(1, tree::star(tree::ch('a'))),
        tree::group(2, tree::plus(tree::ch('b'))),
    ]);
    let re = re(&root);
    let text = "xaabbby";
    let m1 = re.find(text).unwrap().unwrap();
    let m2 = re.find(text).unwrap().unwrap();
    assert_eq!(span(&m1), span(&m2));
    for slot in 0..m1.group_count() {
        let a: Vec<_> = m1.groups().collect::<Vec<_>>();
        let b: Vec<_> = m2.groups().collect::<Vec<_>>();
        assert_eq!(a.len(), b.len());
        match (&a[slot], &b[slot]) {
            (Some(x), Some(y)) => {
                assert_eq!((x.start(), x.end()), (y.start(), y.end()));
                assert_eq!(x.capture_spans(), y.capture_spans());
            }
            (None, None) => {}
            _ => panic!("records disagree on slot {}", slot),
        }
    }
}

// === Group invariants ===

#[test]
fn group_intervals_stay_inside_group_zero() {
    let root = tree::concat([
        tree::group(1, tree::plus(tree::ch('a'))),
        tree::group(2, tree::plus(tree::ch('b'))),
    ]);
    let re = re(&root);
    let text = "zzaabbzz";
    let m = re.find(text).unwrap().unwrap();
    for g in m.groups().flatten() {
        assert!(g.start() >= m.start());
        assert!(g.end() <= m.end());
        for &(s, e) in g.capture_spans() {
            assert!(s >= m.start() && e <= m.end());
        }
    }
    assert_eq!(&text[m.range()], m.as_str());
}

#[test]
fn sparse_group_numbers() {
    let root = tree::concat([
        tree::group(3, tree::ch('a')),
        tree::group(7, tree::ch('b')),
    ]);
    let re = re(&root);
    let m = re.find("ab").unwrap().unwrap();
    assert_eq!(m.group(3).unwrap().as_str(), "a");
    assert_eq!(m.group(7).unwrap().as_str(), "b");
    assert!(m.group(1).is_none());
    assert_eq!(m.group_count(), 3);
}

#[test]
fn named_group_lookup() {
    let root = tree::concat([
        tree::named_group(1, "year", tree::repeat(4, 4, tree::set(CharClass::digit()))),
        tree::ch('-'),
        tree::named_group(2, "month", tree::repeat(2, 2, tree::set(CharClass::digit()))),
    ]);
    let re = re(&root);
    let m = re.find("on 2026-08 then").unwrap().unwrap();
    assert_eq!(m.group_named("year").unwrap().as_str(), "2026");
    assert_eq!(m.group_named("month").unwrap().as_str(), "08");
    assert!(m.group_named("day").is_none());
}

// === Unicode stepping ===

#[test]
fn multibyte_text_positions_are_byte_offsets() {
    let re = re(&tree::plus(tree::set(CharClass::word())));
    let text = "héllo wörld";
    let all: Vec<&str> = re
        .find_iter(text)
        .map(|m| {
            let m = m.unwrap();
            &text[m.range()]
        })
        .collect();
    assert_eq!(all, vec!["héllo", "wörld"]);
}

#[test]
fn rtl_steps_multibyte_chars() {
    let re = Regex::with_options(&tree::lit("éé"), OPT_RIGHT_TO_LEFT).unwrap();
    let text = "aééb";
    let m = re.find(text).unwrap().unwrap();
    assert_eq!(m.as_str(), "éé");
}

// === Timeout ===

#[test]
fn catastrophic_backtracking_hits_the_deadline() {
    // (a+)+$ over many a's and a spoiler
    let root = tree::concat([
        tree::plus(tree::group(1, tree::plus(tree::ch('a')))),
        tree::text_end_z(),
    ]);
    let budget = Duration::from_millis(50);
    let re = Regex::builder().timeout(budget).build(&root).unwrap();
    let input = format!("{}!", "a".repeat(30));
    let started = Instant::now();
    let err = re.find(&input).unwrap_err();
    assert!(err.is_timeout());
    // the cooperative check fires well within a small multiple of the budget
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn timeout_error_carries_context() {
    let root = tree::concat([
        tree::plus(tree::group(1, tree::plus(tree::ch('a')))),
        tree::text_end_z(),
    ]);
    let re = Regex::builder()
        .timeout(Duration::from_millis(20))
        .build(&root)
        .unwrap();
    let input = format!("{}!", "a".repeat(28));
    match re.find(&input) {
        Err(Error::Timeout { timeout, input_prefix }) => {
            assert_eq!(timeout, Duration::from_millis(20));
            assert!(input.starts_with(&input_prefix));
        }
        other => panic!("expected timeout, got {:?}", other.map(|m| m.map(|m| span(&m)))),
    }
}

// === Start position validation ===

#[test]
fn out_of_range_start_is_rejected() {
    let re = re(&tree::lit("a"));
    let err = re.find_from("abc", 9).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

// === Split ===

#[test]
fn split_on_separator() {
    let re = re(&tree::plus(tree::ch(',')));
    assert_eq!(re.split("a,b,,c").unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn split_keeps_captured_separators() {
    let re = re(&tree::group(1, tree::ch(',')));
    assert_eq!(re.split("a,b").unwrap(), vec!["a", ",", "b"]);
}

#[test]
fn split_respects_count() {
    let re = re(&tree::ch(','));
    assert_eq!(re.split_n("a,b,c,d", 2).unwrap(), vec!["a", "b,c,d"]);
    assert_eq!(re.split_n("a,b,c,d", 1).unwrap(), vec!["a,b,c,d"]);
}
