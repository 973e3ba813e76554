// api.rs - Public surface: Regex, Match, Group, iteration, replace, split.
//
// A Regex owns one immutable program plus a single-slot cache lending out
// the interpreter state. Everything here is plumbing around the scanner;
// match semantics live in the VM.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;

use crate::code::{Culture, Options, RegexCode, OPT_IGNORE_CASE, OPT_NONE, OPT_RIGHT_TO_LEFT};
use crate::error::Error;
use crate::interp::Runner;
use crate::matchrec::MatchData;
use crate::replace::Replacement;
use crate::scanner::ScanOutcome;
use crate::tree::Node;
use crate::writer;

// === Global default match timeout ===
//
// Milliseconds; zero means no deadline. Applies when a Regex has no
// timeout of its own.

static DEFAULT_MATCH_TIMEOUT_MS: AtomicU64 = AtomicU64::new(0);

pub fn set_default_match_timeout(timeout: Option<Duration>) {
    let ms = timeout.map_or(0, |t| t.as_millis().min(u64::MAX as u128) as u64);
    DEFAULT_MATCH_TIMEOUT_MS.store(ms, Ordering::Relaxed);
}

pub fn default_match_timeout() -> Option<Duration> {
    match DEFAULT_MATCH_TIMEOUT_MS.load(Ordering::Relaxed) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}

// === ExclusiveReference ===

/// Single-slot interpreter cache. Acquisition empties the slot with one
/// atomic exchange and remembers the borrowed instance; release restores
/// the borrowed instance, or caches a foreign one only into an empty
/// slot. At most one instance is ever cached; extra instances are
/// dropped.
pub(crate) struct ExclusiveReference {
    slot: AtomicPtr<Runner>,
    busy: AtomicPtr<Runner>,
}

// The raw pointers are owned exclusively by whichever path holds them;
// the atomics are the hand-off points.
unsafe impl Send for ExclusiveReference {}
unsafe impl Sync for ExclusiveReference {}

impl ExclusiveReference {
    fn new() -> ExclusiveReference {
        ExclusiveReference {
            slot: AtomicPtr::new(ptr::null_mut()),
            busy: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn get(&self) -> Option<Box<Runner>> {
        let p = self.slot.swap(ptr::null_mut(), Ordering::Acquire);
        if p.is_null() {
            None
        } else {
            self.busy.store(p, Ordering::Relaxed);
            Some(unsafe { Box::from_raw(p) })
        }
    }

    fn release(&self, runner: Box<Runner>) {
        let p = Box::into_raw(runner);
        let _ = self
            .busy
            .compare_exchange(p, ptr::null_mut(), Ordering::AcqRel, Ordering::Relaxed);
        if self
            .slot
            .compare_exchange(ptr::null_mut(), p, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

impl Drop for ExclusiveReference {
    fn drop(&mut self) {
        let p = self.slot.swap(ptr::null_mut(), Ordering::Acquire);
        if !p.is_null() {
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

// === Regex ===

/// A compiled pattern ready to scan text.
///
/// Built from a pattern tree (see [`crate::tree`]); the pattern-text
/// parser producing such trees is a separate front end.
///
/// # Examples
///
/// ```
/// use recurve::prelude::*;
/// use recurve::tree;
///
/// // a+b
/// let re = Regex::new(&tree::concat([tree::plus(tree::ch('a')), tree::ch('b')])).unwrap();
/// let m = re.find("xxaab").unwrap().unwrap();
/// assert_eq!(m.as_str(), "aab");
/// ```
pub struct Regex {
    code: Arc<RegexCode>,
    runner: ExclusiveReference,
    timeout: Option<Duration>,
}

impl Regex {
    /// Compiles a pattern tree with default options.
    pub fn new(root: &Node) -> Result<Regex, Error> {
        Regex::with_options(root, OPT_NONE)
    }

    /// Compiles a pattern tree with the given option bits.
    pub fn with_options(root: &Node, options: Options) -> Result<Regex, Error> {
        RegexBuilder::new().options(options).build(root)
    }

    /// A builder for fine-grained control over compilation.
    pub fn builder() -> RegexBuilder {
        RegexBuilder::new()
    }

    /// The compiled program.
    pub fn code(&self) -> &RegexCode {
        &self.code
    }

    /// Whether the program scans right to left.
    pub fn right_to_left(&self) -> bool {
        self.code.right_to_left
    }

    /// Number of capture slots, group 0 included.
    pub fn group_count(&self) -> usize {
        self.code.cap_size as usize
    }

    fn default_start(&self, text: &str) -> usize {
        if self.code.right_to_left {
            text.len()
        } else {
            0
        }
    }

    fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.or_else(default_match_timeout)
    }

    fn run_outcome(
        &self,
        quick: bool,
        prev_len: Option<usize>,
        text: &str,
        start: usize,
    ) -> Result<ScanOutcome, Error> {
        if start > text.len() || !text.is_char_boundary(start) {
            return Err(Error::invalid("start position out of range"));
        }
        let mut runner = self
            .runner
            .get()
            .unwrap_or_else(|| Box::new(Runner::new(Arc::clone(&self.code))));
        let result = runner.scan(
            text,
            0,
            text.len(),
            start,
            prev_len,
            quick,
            self.effective_timeout(),
        );
        // the borrowed runner goes back on every exit path
        self.runner.release(runner);
        result
    }

    fn run<'t>(
        &self,
        prev_len: Option<usize>,
        text: &'t str,
        start: usize,
    ) -> Result<Option<Match<'t>>, Error> {
        match self.run_outcome(false, prev_len, text, start)? {
            ScanOutcome::Matched(data) => Ok(Some(Match {
                text,
                code: Arc::clone(&self.code),
                data,
            })),
            ScanOutcome::QuickHit => Err(Error::internal("quick outcome from a full scan")),
            ScanOutcome::NoMatch => Ok(None),
        }
    }

    /// Does the pattern match anywhere in `text`?
    pub fn is_match(&self, text: &str) -> Result<bool, Error> {
        let start = self.default_start(text);
        Ok(!matches!(
            self.run_outcome(true, None, text, start)?,
            ScanOutcome::NoMatch
        ))
    }

    /// First match in `text`, if any.
    pub fn find<'t>(&self, text: &'t str) -> Result<Option<Match<'t>>, Error> {
        self.run(None, text, self.default_start(text))
    }

    /// First match at or after `start` (at or before, right to left).
    pub fn find_from<'t>(&self, text: &'t str, start: usize) -> Result<Option<Match<'t>>, Error> {
        self.run(None, text, start)
    }

    /// The match following `m`, continuing where it left off.
    pub fn next_match<'t>(&self, m: &Match<'t>) -> Result<Option<Match<'t>>, Error> {
        self.run(Some(m.len()), m.text, m.data.text_pos)
    }

    /// Iterator over all non-overlapping matches.
    pub fn find_iter<'r, 't>(&'r self, text: &'t str) -> FindIter<'r, 't> {
        FindIter {
            regex: self,
            text,
            next_start: self.default_start(text),
            prev_len: None,
            done: false,
        }
    }

    /// All matches collected up front.
    pub fn match_all<'t>(&self, text: &'t str) -> Result<Vec<Match<'t>>, Error> {
        self.find_iter(text).collect()
    }

    /// Compiles a `$`-escape replacement pattern against this regex.
    pub fn replacement(&self, pattern: &str) -> Result<Replacement, Error> {
        Replacement::parse(pattern, &self.code)
    }

    /// Replaces every match with the expansion of `rep`.
    pub fn replace_all(&self, text: &str, rep: &Replacement) -> Result<String, Error> {
        self.replace_n(text, rep, -1)
    }

    /// Replaces up to `count` matches (-1 for no limit).
    pub fn replace_n(&self, text: &str, rep: &Replacement, count: i32) -> Result<String, Error> {
        self.replace_with(text, count, |m, out, rtl| {
            if rtl {
                rep.expand_rtl(m, out);
            } else {
                rep.expand(m, out);
            }
        })
    }

    /// Replaces up to `count` matches (-1 for no limit) with the output
    /// of a callback.
    pub fn replace_func(
        &self,
        text: &str,
        count: i32,
        mut eval: impl FnMut(&Match<'_>) -> String,
    ) -> Result<String, Error> {
        self.replace_with(text, count, |m, out, rtl| {
            let s = eval(m);
            if rtl {
                out.extend(s.chars().rev());
            } else {
                out.push_str(&s);
            }
        })
    }

    fn replace_with(
        &self,
        text: &str,
        count: i32,
        mut emit: impl FnMut(&Match<'_>, &mut String, bool),
    ) -> Result<String, Error> {
        if count < -1 {
            return Err(Error::invalid("count cannot be less than -1"));
        }
        if count == 0 {
            return Ok(text.to_string());
        }
        let mut m = match self.find(text)? {
            Some(m) => m,
            None => return Ok(text.to_string()),
        };
        let mut out = String::new();
        let mut remaining = count;

        if !self.code.right_to_left {
            let mut prevat = 0;
            loop {
                if m.start() != prevat {
                    out.push_str(&text[prevat..m.start()]);
                }
                prevat = m.end();
                emit(&m, &mut out, false);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                match self.next_match(&m)? {
                    Some(next) => m = next,
                    None => break,
                }
            }
            if prevat < text.len() {
                out.push_str(&text[prevat..]);
            }
            Ok(out)
        } else {
            // build the output reversed so every emission appends forward
            let mut prevat = text.len();
            loop {
                if m.end() != prevat {
                    out.extend(text[m.end()..prevat].chars().rev());
                }
                prevat = m.start();
                emit(&m, &mut out, true);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                match self.next_match(&m)? {
                    Some(next) => m = next,
                    None => break,
                }
            }
            if prevat > 0 {
                out.extend(text[..prevat].chars().rev());
            }
            Ok(out.chars().rev().collect())
        }
    }

    /// Splits `text` around every match. Matched capture-group text is
    /// kept in the output between the surrounding pieces.
    pub fn split<'t>(&self, text: &'t str) -> Result<Vec<&'t str>, Error> {
        self.split_n(text, usize::MAX)
    }

    /// Splits into at most `count` pieces.
    pub fn split_n<'t>(&self, text: &'t str, count: usize) -> Result<Vec<&'t str>, Error> {
        if count == 0 {
            return Err(Error::invalid("split count cannot be zero"));
        }
        if count == 1 {
            return Ok(vec![text]);
        }
        let mut m = match self.find(text)? {
            Some(m) => m,
            None => return Ok(vec![text]),
        };
        let mut out: Vec<&'t str> = Vec::new();
        let mut remaining = count - 1;

        if !self.code.right_to_left {
            let mut prevat = 0;
            loop {
                out.push(&text[prevat..m.start()]);
                prevat = m.end();
                for slot in 1..self.code.cap_size {
                    if let Some((s, e)) = m.data.group_span(slot as usize) {
                        out.push(&text[s..e]);
                    }
                }
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                match self.next_match(&m)? {
                    Some(next) => m = next,
                    None => break,
                }
            }
            out.push(&text[prevat..]);
        } else {
            let mut prevat = text.len();
            loop {
                out.push(&text[m.end()..prevat]);
                prevat = m.start();
                for slot in 1..self.code.cap_size {
                    if let Some((s, e)) = m.data.group_span(slot as usize) {
                        out.push(&text[s..e]);
                    }
                }
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                match self.next_match(&m)? {
                    Some(next) => m = next,
                    None => break,
                }
            }
            out.push(&text[..prevat]);
            out.reverse();
        }
        Ok(out)
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Regex")
            .field("groups", &self.code.cap_size)
            .field("right_to_left", &self.code.right_to_left)
            .finish_non_exhaustive()
    }
}

// === RegexBuilder ===

/// Builder for compiling a [`Regex`] with custom options, timeout, and
/// culture.
///
/// # Examples
///
/// ```
/// use recurve::prelude::*;
/// use recurve::tree;
/// use std::time::Duration;
///
/// let re = Regex::builder()
///     .case_insensitive(true)
///     .timeout(Duration::from_millis(100))
///     .build(&tree::lit("hello"))
///     .unwrap();
/// assert!(re.is_match("say HELLO").unwrap());
/// ```
#[derive(Default)]
pub struct RegexBuilder {
    options: Options,
    timeout: Option<Duration>,
    culture: Option<Culture>,
}

impl RegexBuilder {
    pub fn new() -> RegexBuilder {
        RegexBuilder::default()
    }

    /// ORs raw option bits in. See the `OPT_*` constants.
    pub fn options(mut self, options: Options) -> Self {
        self.options |= options;
        self
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        if yes {
            self.options |= OPT_IGNORE_CASE;
        } else {
            self.options &= !OPT_IGNORE_CASE;
        }
        self
    }

    pub fn right_to_left(mut self, yes: bool) -> Self {
        if yes {
            self.options |= OPT_RIGHT_TO_LEFT;
        } else {
            self.options &= !OPT_RIGHT_TO_LEFT;
        }
        self
    }

    /// Per-regex match deadline. Overrides the process-wide default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Culture used for case folding at write time and scan time.
    pub fn culture(mut self, culture: Culture) -> Self {
        self.culture = Some(culture);
        self
    }

    pub fn build(self, root: &Node) -> Result<Regex, Error> {
        let culture = self.culture.unwrap_or_default();
        let code = writer::write(root, self.options, culture)?;
        Ok(Regex {
            code: Arc::new(code),
            runner: ExclusiveReference::new(),
            timeout: self.timeout,
        })
    }
}

// === Match / Group ===

/// One successful match, borrowing the haystack.
pub struct Match<'t> {
    text: &'t str,
    code: Arc<RegexCode>,
    data: MatchData,
}

impl<'t> Match<'t> {
    /// Byte offset where the match starts.
    pub fn start(&self) -> usize {
        self.data.index as usize
    }

    /// Byte offset just past the match.
    pub fn end(&self) -> usize {
        (self.data.index + self.data.length) as usize
    }

    pub fn len(&self) -> usize {
        self.data.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.length == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start()..self.end()
    }

    /// The matched text.
    pub fn as_str(&self) -> &'t str {
        &self.text[self.start()..self.end()]
    }

    /// Capture group by its declared number; `None` when the group did
    /// not participate in the match.
    pub fn group(&self, number: i32) -> Option<Group<'t>> {
        let slot = self.code.map_capnum(number)?;
        self.group_slot(slot, number)
    }

    /// Capture group by name.
    pub fn group_named(&self, name: &str) -> Option<Group<'t>> {
        let number = *self.code.cap_names.as_ref()?.get(name)?;
        self.group(number)
    }

    /// Number of capture slots, group 0 included.
    pub fn group_count(&self) -> usize {
        self.code.cap_size as usize
    }

    /// Iterates all groups in dense slot order; unmatched slots yield
    /// `None`.
    pub fn groups(&self) -> GroupsIter<'_, 't> {
        GroupsIter { m: self, slot: 0 }
    }

    /// The declared number behind a dense slot (identity when numbering
    /// is contiguous).
    fn declared_number(&self, slot: i32) -> i32 {
        match &self.code.caps {
            Some(caps) => caps
                .iter()
                .find(|&(_, &v)| v == slot)
                .map(|(&k, _)| k)
                .unwrap_or(slot),
            None => slot,
        }
    }

    fn group_slot(&self, slot: i32, number: i32) -> Option<Group<'t>> {
        let span = self.data.group_span(slot as usize)?;
        Some(Group {
            text: self.text,
            number,
            span,
            captures: self.data.capture_spans(slot as usize),
        })
    }

    // Accessors for replacement expansion.

    pub(crate) fn group_by_slot(&self, slot: i32) -> Option<&'t str> {
        let (s, e) = self.data.group_span(slot as usize)?;
        Some(&self.text[s..e])
    }

    pub(crate) fn left_portion(&self) -> &'t str {
        &self.text[self.data.text_beg..self.start()]
    }

    pub(crate) fn right_portion(&self) -> &'t str {
        &self.text[self.end()..self.data.text_end]
    }

    pub(crate) fn whole_text(&self) -> &'t str {
        &self.text[self.data.text_beg..self.data.text_end]
    }

    pub(crate) fn last_group_text(&self) -> Option<&'t str> {
        self.group_by_slot(self.code.cap_size - 1)
    }

    /// Expands a compiled replacement for this match.
    pub fn result(&self, rep: &Replacement) -> String {
        let mut out = String::new();
        if self.code.right_to_left {
            rep.expand_rtl(self, &mut out);
            out.chars().rev().collect()
        } else {
            rep.expand(self, &mut out);
            out
        }
    }
}

impl fmt::Debug for Match<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("start", &self.start())
            .field("end", &self.end())
            .field("text", &self.as_str())
            .finish()
    }
}

/// One matched group: the reported span plus every capture it made along
/// the winning path.
#[derive(Clone, Debug)]
pub struct Group<'t> {
    text: &'t str,
    number: i32,
    span: (usize, usize),
    captures: SmallVec<[(usize, usize); 4]>,
}

impl<'t> Group<'t> {
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn start(&self) -> usize {
        self.span.0
    }

    pub fn end(&self) -> usize {
        self.span.1
    }

    pub fn len(&self) -> usize {
        self.span.1 - self.span.0
    }

    pub fn is_empty(&self) -> bool {
        self.span.0 == self.span.1
    }

    pub fn as_str(&self) -> &'t str {
        &self.text[self.span.0..self.span.1]
    }

    /// Number of captures this group completed.
    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    /// All capture spans in completion order.
    pub fn captures(&self) -> impl Iterator<Item = &'t str> + '_ {
        self.captures.iter().map(move |&(s, e)| &self.text[s..e])
    }

    pub fn capture_spans(&self) -> &[(usize, usize)] {
        &self.captures
    }
}

/// Iterator over a match's groups in dense slot order.
pub struct GroupsIter<'m, 't> {
    m: &'m Match<'t>,
    slot: i32,
}

impl<'m, 't> Iterator for GroupsIter<'m, 't> {
    type Item = Option<Group<'t>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.slot >= self.m.code.cap_size {
            return None;
        }
        let slot = self.slot;
        self.slot += 1;
        Some(self.m.group_slot(slot, self.m.declared_number(slot)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.m.code.cap_size - self.slot).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GroupsIter<'_, '_> {}

// === FindIter ===

/// Iterator over all non-overlapping matches; yields an error item and
/// stops if a scan fails (deadline, for instance).
pub struct FindIter<'r, 't> {
    regex: &'r Regex,
    text: &'t str,
    next_start: usize,
    prev_len: Option<usize>,
    done: bool,
}

impl<'r, 't> Iterator for FindIter<'r, 't> {
    type Item = Result<Match<'t>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.regex.run(self.prev_len, self.text, self.next_start) {
            Ok(Some(m)) => {
                self.next_start = m.data.text_pos;
                self.prev_len = Some(m.len());
                Some(Ok(m))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
