// tree.rs - Pattern tree consumed by the code writer.
//
// The tree is the hand-off format from a front end (a pattern parser, a
// macro, or test code building nodes directly). Node constructors below
// keep programmatic construction readable; the writer does the rest.

use crate::charclass::CharClass;
use crate::code::Options;

/// Quantifier upper bound meaning "no limit".
pub const INFINITE: u32 = u32::MAX;

/// A single pattern-tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Match one specific character.
    One(char),
    /// Match one character that is not the given one.
    Notone(char),
    /// Match one character inside the class.
    Set(CharClass),
    /// Match a literal string.
    Multi(String),
    /// Backreference to a declared group number.
    Ref(i32),
    /// Children in sequence.
    Concat(Vec<Node>),
    /// Ordered alternation.
    Alternate(Vec<Node>),
    /// Quantifier. `max == INFINITE` means unbounded; `lazy` flips the
    /// preference from longest to shortest.
    Loop {
        min: u32,
        max: u32,
        lazy: bool,
        body: Box<Node>,
    },
    /// Capturing group. `uncapture` carries the group popped by a
    /// balancing construct, `None` for a plain capture.
    Capture {
        group: i32,
        uncapture: Option<i32>,
        name: Option<String>,
        body: Box<Node>,
    },
    /// Atomic (non-backtracking) group.
    Atomic(Box<Node>),
    /// Zero-width positive lookaround; `behind` flips the look direction.
    Require { behind: bool, body: Box<Node> },
    /// Zero-width negative lookaround.
    Prevent { behind: bool, body: Box<Node> },
    /// Conditional on whether a group has captured.
    TestRef {
        group: i32,
        yes: Box<Node>,
        no: Option<Box<Node>>,
    },
    /// Inline option adjustment applying to the subtree.
    OptionsGroup {
        add: Options,
        remove: Options,
        body: Box<Node>,
    },
    // Zero-width assertions
    Bol,
    Eol,
    Boundary,
    NonBoundary,
    EcmaBoundary,
    NonEcmaBoundary,
    Beginning,
    Start,
    End,
    EndZ,
    /// Matches the empty string.
    Empty,
    /// Matches nothing at all.
    Nothing,
}

// === Node constructors ===

/// One literal character.
pub fn ch(c: char) -> Node {
    Node::One(c)
}

/// Any character except the given one.
pub fn not_ch(c: char) -> Node {
    Node::Notone(c)
}

/// A literal string. Collapses to a single-character node when it can.
pub fn lit(s: &str) -> Node {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Node::Empty,
        (Some(c), None) => Node::One(c),
        _ => Node::Multi(s.to_string()),
    }
}

/// A character class.
pub fn set(cc: CharClass) -> Node {
    Node::Set(cc)
}

/// `.` - any character except newline.
pub fn any() -> Node {
    Node::Notone('\n')
}

/// `.` under a dot-matches-newline option.
pub fn any_singleline() -> Node {
    Node::Set(CharClass::any())
}

pub fn concat<I: IntoIterator<Item = Node>>(nodes: I) -> Node {
    Node::Concat(nodes.into_iter().collect())
}

pub fn alt<I: IntoIterator<Item = Node>>(branches: I) -> Node {
    Node::Alternate(branches.into_iter().collect())
}

/// `{min,max}` greedy quantifier.
pub fn repeat(min: u32, max: u32, body: Node) -> Node {
    Node::Loop { min, max, lazy: false, body: Box::new(body) }
}

/// `{min,max}?` lazy quantifier.
pub fn repeat_lazy(min: u32, max: u32, body: Node) -> Node {
    Node::Loop { min, max, lazy: true, body: Box::new(body) }
}

pub fn star(body: Node) -> Node {
    repeat(0, INFINITE, body)
}

pub fn star_lazy(body: Node) -> Node {
    repeat_lazy(0, INFINITE, body)
}

pub fn plus(body: Node) -> Node {
    repeat(1, INFINITE, body)
}

pub fn plus_lazy(body: Node) -> Node {
    repeat_lazy(1, INFINITE, body)
}

pub fn opt(body: Node) -> Node {
    repeat(0, 1, body)
}

/// Numbered capturing group.
pub fn group(number: i32, body: Node) -> Node {
    Node::Capture {
        group: number,
        uncapture: None,
        name: None,
        body: Box::new(body),
    }
}

/// Named capturing group. The number is still the group's identity; the
/// name is an alias resolved through the compiled name table.
pub fn named_group(number: i32, name: &str, body: Node) -> Node {
    Node::Capture {
        group: number,
        uncapture: None,
        name: Some(name.to_string()),
        body: Box::new(body),
    }
}

/// Balancing group `(?<a-b>...)`: captures into `number` (pass -1 for the
/// nameless form) and pops the most recent capture of `uncapture`.
pub fn balance_group(number: i32, uncapture: i32, body: Node) -> Node {
    Node::Capture {
        group: number,
        uncapture: Some(uncapture),
        name: None,
        body: Box::new(body),
    }
}

pub fn backref(number: i32) -> Node {
    Node::Ref(number)
}

pub fn atomic(body: Node) -> Node {
    Node::Atomic(Box::new(body))
}

pub fn lookahead(body: Node) -> Node {
    Node::Require { behind: false, body: Box::new(body) }
}

pub fn lookbehind(body: Node) -> Node {
    Node::Require { behind: true, body: Box::new(body) }
}

pub fn not_lookahead(body: Node) -> Node {
    Node::Prevent { behind: false, body: Box::new(body) }
}

pub fn not_lookbehind(body: Node) -> Node {
    Node::Prevent { behind: true, body: Box::new(body) }
}

/// Conditional `(?(g)yes|no)`.
pub fn test_ref(group: i32, yes: Node, no: Option<Node>) -> Node {
    Node::TestRef {
        group,
        yes: Box::new(yes),
        no: no.map(Box::new),
    }
}

/// Inline `(?opts:...)` adjustment.
pub fn with_options(add: Options, remove: Options, body: Node) -> Node {
    Node::OptionsGroup { add, remove, body: Box::new(body) }
}

pub fn line_start() -> Node {
    Node::Bol
}

pub fn line_end() -> Node {
    Node::Eol
}

pub fn word_boundary() -> Node {
    Node::Boundary
}

pub fn text_begin() -> Node {
    Node::Beginning
}

pub fn text_end() -> Node {
    Node::End
}

/// `\z` permitting one trailing newline (`\Z`).
pub fn text_end_z() -> Node {
    Node::EndZ
}

/// `\G` - where the previous match ended.
pub fn match_start() -> Node {
    Node::Start
}
