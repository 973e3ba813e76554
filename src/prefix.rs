// prefix.rs - Start-position optimizations derived at write time.
//
// Three analyses over the pattern tree feed the scanner: the leading
// anchor summary, a fixed literal prefix compiled into a Boyer-Moore
// skip automaton, and the class of possible first characters. All three
// walk only the leading chain of the tree; anything the walk cannot see
// through simply disables the optimization.

use crate::charclass::CharClass;
use crate::code::{
    opt_ignore_case, opt_right_to_left, Culture, Options, ANCHOR_BEGINNING, ANCHOR_END,
    ANCHOR_ENDZ, ANCHOR_START,
};
use crate::tree::Node;

// === Leading anchors ===

enum Lead {
    Anchor(u32),
    Skip,
    Opaque,
}

fn lead(node: &Node, options: Options) -> Lead {
    match node {
        Node::Beginning => Lead::Anchor(ANCHOR_BEGINNING),
        Node::Start => Lead::Anchor(ANCHOR_START),
        Node::End => Lead::Anchor(ANCHOR_END),
        Node::EndZ => Lead::Anchor(ANCHOR_ENDZ),
        // Line and boundary anchors stop the walk but give the scanner
        // nothing to skip with.
        Node::Bol
        | Node::Eol
        | Node::Boundary
        | Node::NonBoundary
        | Node::EcmaBoundary
        | Node::NonEcmaBoundary => Lead::Anchor(0),
        Node::Empty | Node::Require { .. } | Node::Prevent { .. } => Lead::Skip,
        Node::Capture { body, .. } | Node::Atomic(body) => lead(body, options),
        Node::OptionsGroup { add, remove, body } => lead(body, (options | add) & !remove),
        Node::Concat(children) => {
            let mut iter_fwd;
            let mut iter_rev;
            let iter: &mut dyn Iterator<Item = &Node> = if opt_right_to_left(options) {
                iter_rev = children.iter().rev();
                &mut iter_rev
            } else {
                iter_fwd = children.iter();
                &mut iter_fwd
            };
            for child in iter {
                match lead(child, options) {
                    Lead::Skip => continue,
                    other => return other,
                }
            }
            Lead::Skip
        }
        _ => Lead::Opaque,
    }
}

/// The anchor bit-set the scanner can exploit to constrain candidate
/// start positions.
pub fn anchors(root: &Node, options: Options) -> u32 {
    match lead(root, options) {
        Lead::Anchor(bits) => bits,
        _ => 0,
    }
}

// === Literal prefix ===

enum PrefixStep {
    Literal(String, bool),
    Skip,
    Stop,
}

fn prefix_step(node: &Node, options: Options) -> PrefixStep {
    match node {
        Node::One(c) => PrefixStep::Literal(c.to_string(), opt_ignore_case(options)),
        Node::Multi(s) => PrefixStep::Literal(s.clone(), opt_ignore_case(options)),
        Node::Loop { min, body, .. } if *min > 0 => match body.as_ref() {
            Node::One(c) => {
                let mut s = String::new();
                for _ in 0..*min {
                    s.push(*c);
                }
                PrefixStep::Literal(s, opt_ignore_case(options))
            }
            _ => PrefixStep::Stop,
        },
        Node::Bol
        | Node::Eol
        | Node::Boundary
        | Node::NonBoundary
        | Node::EcmaBoundary
        | Node::NonEcmaBoundary
        | Node::Beginning
        | Node::Start
        | Node::End
        | Node::EndZ
        | Node::Empty
        | Node::Require { .. }
        | Node::Prevent { .. } => PrefixStep::Skip,
        Node::Capture { body, .. } | Node::Atomic(body) => prefix_step(body, options),
        Node::OptionsGroup { add, remove, body } => prefix_step(body, (options | add) & !remove),
        Node::Concat(children) => {
            let mut iter_fwd;
            let mut iter_rev;
            let iter: &mut dyn Iterator<Item = &Node> = if opt_right_to_left(options) {
                iter_rev = children.iter().rev();
                &mut iter_rev
            } else {
                iter_fwd = children.iter();
                &mut iter_fwd
            };
            for child in iter {
                match prefix_step(child, options) {
                    PrefixStep::Skip => continue,
                    other => return other,
                }
            }
            PrefixStep::Skip
        }
        _ => PrefixStep::Stop,
    }
}

/// Fixed literal every match must begin with, when one exists.
/// Returns the literal and whether it compares case-insensitively.
pub fn literal_prefix(root: &Node, options: Options) -> Option<(String, bool)> {
    match prefix_step(root, options) {
        PrefixStep::Literal(s, ci) if !s.is_empty() => Some((s, ci)),
        _ => None,
    }
}

// === First-character class ===

/// The set of characters a match can start with, with the fold flag the
/// scanner must apply before testing membership.
#[derive(Clone, Debug)]
pub struct FirstCharPrefix {
    pub class: CharClass,
    pub case_insensitive: bool,
}

struct Fc {
    cc: CharClass,
    nullable: bool,
    ci: Option<bool>,
}

impl Fc {
    fn empty() -> Fc {
        Fc { cc: CharClass::empty(), nullable: true, ci: None }
    }

    fn leaf(cc: CharClass, ci: bool) -> Fc {
        Fc { cc, nullable: false, ci: Some(ci) }
    }
}

fn merge_ci(a: Option<bool>, b: Option<bool>) -> Option<Option<bool>> {
    match (a, b) {
        (None, x) | (x, None) => Some(x),
        (Some(x), Some(y)) if x == y => Some(Some(x)),
        _ => None, // mixed folding, can't express as one scan
    }
}

fn union_into(acc: &mut CharClass, other: &CharClass) -> bool {
    if acc.is_empty_class() && !acc.is_negated() {
        *acc = other.clone();
        true
    } else {
        acc.try_union(other)
    }
}

fn fc_of(node: &Node, options: Options, culture: &Culture) -> Option<Fc> {
    let ci = opt_ignore_case(options);
    match node {
        Node::One(c) => {
            let c = if ci { culture.lower(*c) } else { *c };
            Some(Fc::leaf(CharClass::from_char(c), ci))
        }
        Node::Notone(c) => {
            let c = if ci { culture.lower(*c) } else { *c };
            Some(Fc::leaf(CharClass::from_char(c).negate(), ci))
        }
        Node::Set(cc) => Some(Fc::leaf(cc.clone(), ci)),
        Node::Multi(s) => {
            let first = if opt_right_to_left(options) {
                s.chars().next_back()
            } else {
                s.chars().next()
            }?;
            let first = if ci { culture.lower(first) } else { first };
            Some(Fc::leaf(CharClass::from_char(first), ci))
        }
        Node::Ref(_) | Node::TestRef { .. } => None,
        Node::Loop { min, body, .. } => {
            let mut f = fc_of(body, options, culture)?;
            if *min == 0 {
                f.nullable = true;
            }
            Some(f)
        }
        Node::Capture { body, .. } | Node::Atomic(body) => fc_of(body, options, culture),
        Node::OptionsGroup { add, remove, body } => {
            fc_of(body, (options | add) & !remove, culture)
        }
        Node::Alternate(branches) => {
            let mut acc = Fc::empty();
            acc.nullable = false;
            for branch in branches {
                let f = fc_of(branch, options, culture)?;
                if !union_into(&mut acc.cc, &f.cc) {
                    return None;
                }
                acc.ci = merge_ci(acc.ci, f.ci)?;
                acc.nullable |= f.nullable;
            }
            Some(acc)
        }
        Node::Concat(children) => {
            let mut acc = Fc::empty();
            let mut iter_fwd;
            let mut iter_rev;
            let iter: &mut dyn Iterator<Item = &Node> = if opt_right_to_left(options) {
                iter_rev = children.iter().rev();
                &mut iter_rev
            } else {
                iter_fwd = children.iter();
                &mut iter_fwd
            };
            for child in iter {
                let f = fc_of(child, options, culture)?;
                if !union_into(&mut acc.cc, &f.cc) {
                    return None;
                }
                acc.ci = merge_ci(acc.ci, f.ci)?;
                if !f.nullable {
                    acc.nullable = false;
                    break;
                }
            }
            Some(acc)
        }
        Node::Bol
        | Node::Eol
        | Node::Boundary
        | Node::NonBoundary
        | Node::EcmaBoundary
        | Node::NonEcmaBoundary
        | Node::Beginning
        | Node::Start
        | Node::End
        | Node::EndZ
        | Node::Empty
        | Node::Nothing
        | Node::Require { .. }
        | Node::Prevent { .. } => Some(Fc::empty()),
    }
}

/// Derives the first-character prefix, or `None` when the leading
/// character is unknowable or the pattern can match empty.
pub fn first_chars(root: &Node, options: Options, culture: &Culture) -> Option<FirstCharPrefix> {
    let fc = fc_of(root, options, culture)?;
    if fc.nullable || fc.cc.is_empty_class() {
        return None;
    }
    Some(FirstCharPrefix {
        class: fc.cc,
        case_insensitive: fc.ci.unwrap_or(false),
    })
}

// === Boyer-Moore prefix automaton ===

/// Byte-wise bad-character search over a fixed literal prefix. Built only
/// when byte comparison is sound: any literal when case-sensitive, an
/// ASCII literal when folding.
pub struct BoyerMoore {
    pattern: Vec<u8>,
    case_insensitive: bool,
    right_to_left: bool,
    skip: [u16; 256],
}

impl BoyerMoore {
    pub fn build(
        literal: &str,
        case_insensitive: bool,
        right_to_left: bool,
        culture: &Culture,
    ) -> Option<BoyerMoore> {
        if literal.is_empty() {
            return None;
        }
        let pattern: Vec<u8> = if case_insensitive {
            let lowered: String = literal.chars().map(|c| culture.lower(c)).collect();
            if !lowered.is_ascii() {
                return None;
            }
            lowered.into_bytes()
        } else {
            literal.as_bytes().to_vec()
        };
        let n = pattern.len();
        if n > u16::MAX as usize {
            return None;
        }
        let mut skip = [n as u16; 256];
        if right_to_left {
            // shift keyed by the byte at the window start; align it with
            // its leftmost occurrence past position 0
            for i in (1..n).rev() {
                skip[pattern[i] as usize] = i as u16;
            }
        } else {
            // shift keyed by the byte at the window end
            for i in 0..n.saturating_sub(1) {
                skip[pattern[i] as usize] = (n - 1 - i) as u16;
            }
        }
        Some(BoyerMoore { pattern, case_insensitive, right_to_left, skip })
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    #[inline]
    fn fold(&self, b: u8) -> u8 {
        if self.case_insensitive {
            b.to_ascii_lowercase()
        } else {
            b
        }
    }

    #[inline]
    fn window_eq(&self, text: &[u8], at: usize) -> bool {
        let n = self.pattern.len();
        let mut i = n;
        while i > 0 {
            i -= 1;
            if self.fold(text[at + i]) != self.pattern[i] {
                return false;
            }
        }
        true
    }

    /// Anchored probe: does the literal sit exactly at `pos`
    /// (ending at `pos` when scanning right to left)?
    pub fn is_match(&self, text: &str, pos: usize, beg: usize, end: usize) -> bool {
        let t = text.as_bytes();
        let n = self.pattern.len();
        if self.right_to_left {
            pos >= beg + n && self.window_eq(t, pos - n)
        } else {
            pos + n <= end && self.window_eq(t, pos)
        }
    }

    /// Finds the next candidate position at or past `pos` in scan order.
    /// Left to right this is the start of the occurrence; right to left it
    /// is the exclusive end.
    pub fn scan(&self, text: &str, pos: usize, beg: usize, end: usize) -> Option<usize> {
        let t = text.as_bytes();
        let n = self.pattern.len();
        if self.right_to_left {
            let mut e = pos.min(end);
            while e >= beg + n {
                if self.window_eq(t, e - n) {
                    return Some(e);
                }
                let shift = self.skip[self.fold(t[e - n]) as usize] as usize;
                match e.checked_sub(shift) {
                    Some(ne) if ne >= beg + n => e = ne,
                    _ => break,
                }
            }
            None
        } else {
            let mut s = pos.max(beg);
            while s + n <= end {
                if self.window_eq(t, s) {
                    return Some(s);
                }
                s += self.skip[self.fold(t[s + n - 1]) as usize] as usize;
            }
            None
        }
    }
}

impl std::fmt::Debug for BoyerMoore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoyerMoore")
            .field("pattern", &String::from_utf8_lossy(&self.pattern))
            .field("case_insensitive", &self.case_insensitive)
            .field("right_to_left", &self.right_to_left)
            .finish()
    }
}
