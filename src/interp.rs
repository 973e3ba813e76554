// interp.rs - The backtracking VM.
//
// One dispatch loop over the current operator. Instructions that can be
// re-entered from the backtracking stack push a frame whose last value is
// the code position; a negative code position selects the second re-entry
// flavor. Three stacks carry three lifetimes: track frames for
// backtracking, the grouping stack for marks and counters, and the crawl
// stack for capture undo. They are integer stacks on purpose; frame
// layout is fixed per opcode.
//
// Naming note: the *_B / *_B2 constants are the BACK / BACK2 re-entry
// operators of the corresponding instruction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::code::*;
use crate::charclass::{is_ecma_word_char, is_word_char};
use crate::error::Error;
use crate::matchrec::MatchData;

/// Deadline polls happen once per this many dispatch iterations.
pub(crate) const TIMEOUT_CHECK_FREQUENCY: u32 = 1000;

const LAZYBRANCH_B: i32 = LAZYBRANCH | BACK;
const SETMARK_B: i32 = SETMARK | BACK;
const NULLMARK_B: i32 = NULLMARK | BACK;
const GETMARK_B: i32 = GETMARK | BACK;
const CAPTUREMARK_B: i32 = CAPTUREMARK | BACK;
const BRANCHMARK_B: i32 = BRANCHMARK | BACK;
const BRANCHMARK_B2: i32 = BRANCHMARK | BACK2;
const LAZYBRANCHMARK_B: i32 = LAZYBRANCHMARK | BACK;
const LAZYBRANCHMARK_B2: i32 = LAZYBRANCHMARK | BACK2;
const SETCOUNT_B: i32 = SETCOUNT | BACK;
const NULLCOUNT_B: i32 = NULLCOUNT | BACK;
const BRANCHCOUNT_B: i32 = BRANCHCOUNT | BACK;
const BRANCHCOUNT_B2: i32 = BRANCHCOUNT | BACK2;
const LAZYBRANCHCOUNT_B: i32 = LAZYBRANCHCOUNT | BACK;
const LAZYBRANCHCOUNT_B2: i32 = LAZYBRANCHCOUNT | BACK2;
const SETJUMP_B: i32 = SETJUMP | BACK;
const FOREJUMP_B: i32 = FOREJUMP | BACK;
const ONELOOP_B: i32 = ONELOOP | BACK;
const NOTONELOOP_B: i32 = NOTONELOOP | BACK;
const SETLOOP_B: i32 = SETLOOP | BACK;
const ONELAZY_B: i32 = ONELAZY | BACK;
const NOTONELAZY_B: i32 = NOTONELAZY | BACK;
const SETLAZY_B: i32 = SETLAZY | BACK;

/// Decodes the char starting at `pos`.
#[inline]
pub(crate) fn char_at(text: &str, pos: usize) -> char {
    match text[pos..].chars().next() {
        Some(ch) => ch,
        None => '\u{0}',
    }
}

/// Decodes the char ending at `pos`, with its encoded length.
#[inline]
pub(crate) fn char_before(text: &str, pos: usize) -> (char, usize) {
    match text[..pos].chars().next_back() {
        Some(ch) => (ch, ch.len_utf8()),
        None => ('\u{0}', 1),
    }
}

/// Per-program execution state: text window, decoded instruction, the
/// three stacks, and the deadline. Not thread-safe; an instance serves
/// one scan at a time and its stacks are kept for the next scan.
pub(crate) struct Runner {
    pub(crate) code: Arc<RegexCode>,
    pub(crate) culture: Culture,

    // text window for the current scan (byte offsets)
    pub(crate) text_beg: usize,
    pub(crate) text_end: usize,
    pub(crate) text_start: usize,
    pub(crate) text_pos: usize,

    // decoded instruction state
    pub(crate) operator: i32,
    pub(crate) code_pos: usize,
    pub(crate) rtl: bool,
    pub(crate) ci: bool,

    // the three stacks
    pub(crate) track: Vec<i32>,
    pub(crate) stack: Vec<i32>,
    pub(crate) crawl: Vec<i32>,

    // match record retained between scans when not handed to the caller
    pub(crate) spare: Option<MatchData>,

    // deadline
    pub(crate) deadline: Option<Instant>,
    pub(crate) timeout: Duration,
    pub(crate) ticks_left: u32,
}

impl Runner {
    pub(crate) fn new(code: Arc<RegexCode>) -> Runner {
        let culture = code.culture;
        Runner {
            code,
            culture,
            text_beg: 0,
            text_end: 0,
            text_start: 0,
            text_pos: 0,
            operator: 0,
            code_pos: 0,
            rtl: false,
            ci: false,
            track: Vec::new(),
            stack: Vec::new(),
            crawl: Vec::new(),
            spare: None,
            deadline: None,
            timeout: Duration::ZERO,
            ticks_left: TIMEOUT_CHECK_FREQUENCY,
        }
    }

    // === Instruction decoding ===

    #[inline]
    fn set_operator(&mut self, op: i32) {
        self.ci = op & CI != 0;
        self.rtl = op & RTL != 0;
        self.operator = op & !(CI | RTL);
    }

    #[inline]
    fn operand(&self, i: usize) -> i32 {
        self.code.codes[self.code_pos + 1 + i]
    }

    #[inline]
    fn advance(&mut self, operands: usize) {
        self.code_pos += operands + 1;
        let op = self.code.codes[self.code_pos];
        self.set_operator(op);
    }

    #[inline]
    fn goto_pos(&mut self, pos: usize) {
        // branching backward starts another loop pass; make room first
        if pos < self.code_pos {
            self.ensure_storage();
        }
        let op = self.code.codes[pos];
        self.set_operator(op);
        self.code_pos = pos;
    }

    fn ensure_storage(&mut self) {
        let need = self.code.track_count * 4;
        if self.stack.capacity() - self.stack.len() < need {
            self.stack.reserve(need.max(16));
        }
        if self.track.capacity() - self.track.len() < need {
            self.track.reserve(need.max(32));
        }
    }

    // === Stack primitives ===
    //
    // A track frame is its values in push order with the code position on
    // top; the Back2 flavors store the negated code position.

    #[inline]
    fn track_push0(&mut self) {
        self.track.push(self.code_pos as i32);
    }

    #[inline]
    fn track_push1(&mut self, v1: i32) {
        self.track.push(v1);
        self.track.push(self.code_pos as i32);
    }

    #[inline]
    fn track_push2(&mut self, v1: i32, v2: i32) {
        self.track.push(v1);
        self.track.push(v2);
        self.track.push(self.code_pos as i32);
    }

    #[inline]
    fn track_push3(&mut self, v1: i32, v2: i32, v3: i32) {
        self.track.push(v1);
        self.track.push(v2);
        self.track.push(v3);
        self.track.push(self.code_pos as i32);
    }

    #[inline]
    fn track_push2_1(&mut self, v1: i32) {
        self.track.push(v1);
        self.track.push(-(self.code_pos as i32));
    }

    #[inline]
    fn track_push2_2(&mut self, v1: i32, v2: i32) {
        self.track.push(v1);
        self.track.push(v2);
        self.track.push(-(self.code_pos as i32));
    }

    #[inline]
    fn track_pop(&mut self) -> i32 {
        let i = self.track.len() - 1;
        let v = self.track[i];
        self.track.truncate(i);
        v
    }

    #[inline]
    fn stack_push1(&mut self, v1: i32) {
        self.stack.push(v1);
    }

    #[inline]
    fn stack_push2(&mut self, v1: i32, v2: i32) {
        self.stack.push(v1);
        self.stack.push(v2);
    }

    #[inline]
    fn stack_pop(&mut self) -> i32 {
        let i = self.stack.len() - 1;
        let v = self.stack[i];
        self.stack.truncate(i);
        v
    }

    // === Capture bookkeeping ===

    fn capture(&mut self, m: &mut MatchData, cap: i32, start: i32, end: i32) {
        let (s, e) = if end < start { (end, start) } else { (start, end) };
        self.crawl.push(cap);
        m.add_match(cap as usize, s, e - s);
    }

    /// Balancing-group capture: pops the last capture of `uncap` and, when
    /// `cap` names a group, captures the interval between the two.
    fn transfer_capture(&mut self, m: &mut MatchData, cap: i32, uncap: i32, start: i32, end: i32) {
        let (mut start, mut end) = if end < start { (end, start) } else { (start, end) };
        let start2 = m.match_index(uncap as usize);
        let end2 = start2 + m.match_length(uncap as usize);

        // the new capture is the interval between the popped capture and
        // this one; overlapping intervals clamp to their intersection
        if start >= end2 {
            end = start;
            start = end2;
        } else if end <= start2 {
            start = end;
            end = start2;
        } else {
            if end > end2 {
                end = end2;
            }
            if start2 > start {
                start = start2;
            }
        }

        self.crawl.push(uncap);
        m.balance_match(uncap as usize);
        if cap != -1 {
            self.crawl.push(cap);
            m.add_match(cap as usize, start, end - start);
        }
    }

    fn uncapture(&mut self, m: &mut MatchData) {
        let i = self.crawl.len() - 1;
        let cap = self.crawl[i];
        self.crawl.truncate(i);
        m.remove_match(cap as usize);
    }

    // === Character helpers ===

    #[inline]
    fn fold(&self, ch: char) -> char {
        if self.ci {
            self.culture.lower(ch)
        } else {
            ch
        }
    }

    /// Next char in consume direction with the cursor position past it,
    /// or `None` at the window edge.
    #[inline]
    fn peek_next(&self, text: &str) -> Option<(char, usize)> {
        if self.rtl {
            if self.text_pos <= self.text_beg {
                return None;
            }
            let (ch, len) = char_before(text, self.text_pos);
            Some((ch, self.text_pos - len))
        } else {
            if self.text_pos >= self.text_end {
                return None;
            }
            let ch = char_at(text, self.text_pos);
            Some((ch, self.text_pos + ch.len_utf8()))
        }
    }

    /// One char back against the consume direction.
    #[inline]
    fn prev_in_dir(&self, text: &str, pos: usize) -> usize {
        if self.rtl {
            pos + char_at(text, pos).len_utf8()
        } else {
            let (_, len) = char_before(text, pos);
            pos - len
        }
    }

    /// Remaining window size in bytes in the consume direction. An upper
    /// bound on remaining chars, which is all the lazy budget needs.
    #[inline]
    fn forward_bytes(&self) -> usize {
        if self.rtl {
            self.text_pos - self.text_beg
        } else {
            self.text_end - self.text_pos
        }
    }

    fn string_match(&mut self, text: &str, s: &str) -> bool {
        if self.rtl {
            let mut pos = self.text_pos;
            for pc in s.chars().rev() {
                if pos <= self.text_beg {
                    return false;
                }
                let (ch, len) = char_before(text, pos);
                if self.fold(ch) != pc {
                    return false;
                }
                pos -= len;
            }
            self.text_pos = pos;
        } else {
            let mut pos = self.text_pos;
            for pc in s.chars() {
                if pos >= self.text_end {
                    return false;
                }
                let ch = char_at(text, pos);
                if self.fold(ch) != pc {
                    return false;
                }
                pos += ch.len_utf8();
            }
            self.text_pos = pos;
        }
        true
    }

    fn ref_match(&mut self, text: &str, index: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        if self.rtl {
            if self.text_pos - self.text_beg < len {
                return false;
            }
            let start = self.text_pos - len;
            if !text.is_char_boundary(start) {
                return false;
            }
            if self.ci {
                let cap = &text[index..index + len];
                let win = &text[start..self.text_pos];
                if !self.chars_fold_eq(cap, win) {
                    return false;
                }
            } else if text.as_bytes()[start..self.text_pos] != text.as_bytes()[index..index + len] {
                return false;
            }
            self.text_pos = start;
        } else {
            if self.text_end - self.text_pos < len {
                return false;
            }
            let end = self.text_pos + len;
            if !text.is_char_boundary(end) {
                return false;
            }
            if self.ci {
                let cap = &text[index..index + len];
                let win = &text[self.text_pos..end];
                if !self.chars_fold_eq(cap, win) {
                    return false;
                }
            } else if text.as_bytes()[self.text_pos..end] != text.as_bytes()[index..index + len] {
                return false;
            }
            self.text_pos = end;
        }
        true
    }

    fn chars_fold_eq(&self, a: &str, b: &str) -> bool {
        let mut ia = a.chars();
        let mut ib = b.chars();
        loop {
            match (ia.next(), ib.next()) {
                (None, None) => return true,
                (Some(ca), Some(cb)) => {
                    if self.culture.lower(ca) != self.culture.lower(cb) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    // === Zero-width predicates ===

    #[inline]
    fn is_boundary(&self, text: &str, pos: usize) -> bool {
        let left = pos > self.text_beg && is_word_char(char_before(text, pos).0);
        let right = pos < self.text_end && is_word_char(char_at(text, pos));
        left != right
    }

    #[inline]
    fn is_ecma_boundary(&self, text: &str, pos: usize) -> bool {
        let left = pos > self.text_beg && is_ecma_word_char(char_before(text, pos).0);
        let right = pos < self.text_end && is_ecma_word_char(char_at(text, pos));
        left != right
    }

    // === Deadline ===

    pub(crate) fn check_timeout(&mut self, text: &str) -> Result<(), Error> {
        self.ticks_left = self.ticks_left.wrapping_sub(1);
        if self.ticks_left != 0 {
            return Ok(());
        }
        self.ticks_left = TIMEOUT_CHECK_FREQUENCY;
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::timeout(
                    self.timeout,
                    &text[self.text_beg..self.text_end],
                ));
            }
        }
        Ok(())
    }

    // === The dispatch loop ===

    pub(crate) fn go(&mut self, text: &str, m: &mut MatchData) -> Result<(), Error> {
        let code = Arc::clone(&self.code);
        self.code_pos = 0;
        let op = code.codes[0];
        self.set_operator(op);

        loop {
            self.check_timeout(text)?;

            match self.operator {
                STOP => return Ok(()),

                NOTHING => {
                    self.advance(0);
                    continue;
                }

                GOTO => {
                    let target = self.operand(0) as usize;
                    self.goto_pos(target);
                    continue;
                }

                TESTREF => {
                    if m.is_matched(self.operand(0) as usize) {
                        self.advance(1);
                        continue;
                    }
                }

                LAZYBRANCH => {
                    self.track_push1(self.text_pos as i32);
                    self.advance(1);
                    continue;
                }
                LAZYBRANCH_B => {
                    let pos = self.track_pop();
                    self.text_pos = pos as usize;
                    let target = self.operand(0) as usize;
                    self.goto_pos(target);
                    continue;
                }

                SETMARK => {
                    self.stack_push1(self.text_pos as i32);
                    self.track_push0();
                    self.advance(0);
                    continue;
                }
                NULLMARK => {
                    self.stack_push1(-1);
                    self.track_push0();
                    self.advance(0);
                    continue;
                }
                SETMARK_B | NULLMARK_B => {
                    self.stack_pop();
                }

                GETMARK => {
                    let mark = self.stack_pop();
                    self.track_push1(mark);
                    self.text_pos = mark as usize;
                    self.advance(0);
                    continue;
                }
                GETMARK_B => {
                    let mark = self.track_pop();
                    self.stack_push1(mark);
                }

                CAPTUREMARK => {
                    let uncap = self.operand(1);
                    if uncap != -1 && !m.is_matched(uncap as usize) {
                        // nothing to balance against
                    } else {
                        let mark = self.stack_pop();
                        let cap = self.operand(0);
                        if uncap != -1 {
                            self.transfer_capture(m, cap, uncap, mark, self.text_pos as i32);
                        } else {
                            self.capture(m, cap, mark, self.text_pos as i32);
                        }
                        self.track_push1(mark);
                        self.advance(2);
                        continue;
                    }
                }
                CAPTUREMARK_B => {
                    let mark = self.track_pop();
                    self.stack_push1(mark);
                    self.uncapture(m);
                    if self.operand(0) != -1 && self.operand(1) != -1 {
                        self.uncapture(m);
                    }
                }

                BRANCHMARK => {
                    let mark = self.stack_pop();
                    if self.text_pos as i32 != mark {
                        // made progress: remember the straight path and loop
                        self.track_push2(mark, self.text_pos as i32);
                        self.stack_push1(self.text_pos as i32);
                        let target = self.operand(0) as usize;
                        self.goto_pos(target);
                    } else {
                        // empty iteration: fall through
                        self.track_push2_1(mark);
                        self.advance(1);
                    }
                    continue;
                }
                BRANCHMARK_B => {
                    let pos = self.track_pop();
                    let mark = self.track_pop();
                    self.stack_pop();
                    self.text_pos = pos as usize;
                    self.track_push2_1(mark);
                    self.advance(1);
                    continue;
                }
                BRANCHMARK_B2 => {
                    let mark = self.track_pop();
                    self.stack_push1(mark);
                }

                LAZYBRANCHMARK => {
                    let mark = self.stack_pop();
                    if self.text_pos as i32 != mark {
                        // progress: offer one more iteration on backtrack
                        if mark != -1 {
                            self.track_push2(mark, self.text_pos as i32);
                        } else {
                            self.track_push2(self.text_pos as i32, self.text_pos as i32);
                        }
                    } else {
                        self.stack_push1(mark);
                        self.track_push2_1(mark);
                    }
                    self.advance(1);
                    continue;
                }
                LAZYBRANCHMARK_B => {
                    let pos = self.track_pop();
                    let mark = self.track_pop();
                    self.track_push2_1(mark);
                    self.text_pos = pos as usize;
                    // new mark for the next arrival at this instruction
                    self.stack_push1(pos);
                    let target = self.operand(0) as usize;
                    self.goto_pos(target);
                    continue;
                }
                LAZYBRANCHMARK_B2 => {
                    self.stack_pop();
                    let mark = self.track_pop();
                    self.stack_push1(mark);
                }

                SETCOUNT => {
                    self.stack_push2(self.text_pos as i32, self.operand(0));
                    self.track_push0();
                    self.advance(1);
                    continue;
                }
                NULLCOUNT => {
                    self.stack_push2(-1, self.operand(0));
                    self.track_push0();
                    self.advance(1);
                    continue;
                }
                SETCOUNT_B | NULLCOUNT_B => {
                    self.stack_pop();
                    self.stack_pop();
                }

                BRANCHCOUNT => {
                    let count = self.stack_pop();
                    let mark = self.stack_pop();
                    let matched = self.text_pos as i32 - mark;
                    if count >= self.operand(1) || (matched == 0 && count >= 0) {
                        // max iterations reached, or empty past the minimum
                        self.track_push2_2(mark, count);
                        self.advance(2);
                    } else {
                        self.track_push1(mark);
                        self.stack_push2(self.text_pos as i32, count + 1);
                        let target = self.operand(0) as usize;
                        self.goto_pos(target);
                    }
                    continue;
                }
                BRANCHCOUNT_B => {
                    let count = self.stack_pop();
                    let mark_cur = self.stack_pop();
                    let mark_old = self.track_pop();
                    if count > 0 {
                        // iteration failed past the minimum: give it up
                        self.text_pos = mark_cur as usize;
                        self.track_push2_2(mark_old, count - 1);
                        self.advance(2);
                        continue;
                    }
                    self.stack_push2(mark_old, count - 1);
                }
                BRANCHCOUNT_B2 => {
                    let count = self.track_pop();
                    let mark = self.track_pop();
                    self.stack_push2(mark, count);
                }

                LAZYBRANCHCOUNT => {
                    let count = self.stack_pop();
                    let mark = self.stack_pop();
                    if count < 0 {
                        // still below the minimum: iterate now
                        self.track_push2_1(mark);
                        self.stack_push2(self.text_pos as i32, count + 1);
                        let target = self.operand(0) as usize;
                        self.goto_pos(target);
                    } else {
                        self.track_push3(mark, count, self.text_pos as i32);
                        self.advance(2);
                    }
                    continue;
                }
                LAZYBRANCHCOUNT_B => {
                    let pos = self.track_pop();
                    let count = self.track_pop();
                    let mark = self.track_pop();
                    if count < self.operand(1) && pos != mark {
                        self.text_pos = pos as usize;
                        self.stack_push2(pos, count + 1);
                        self.track_push2_1(mark);
                        let target = self.operand(0) as usize;
                        self.goto_pos(target);
                        continue;
                    }
                    self.stack_push2(mark, count);
                }
                LAZYBRANCHCOUNT_B2 => {
                    let mark_old = self.track_pop();
                    let count = self.stack_pop();
                    self.stack_pop();
                    self.stack_push2(mark_old, count - 1);
                }

                SETJUMP => {
                    self.stack_push2(self.track.len() as i32, self.crawl.len() as i32);
                    self.track_push0();
                    self.advance(0);
                    continue;
                }
                SETJUMP_B => {
                    self.stack_pop();
                    self.stack_pop();
                }

                BACKJUMP => {
                    let crawlpos = self.stack_pop();
                    let trackpos = self.stack_pop();
                    self.track.truncate(trackpos as usize);
                    while self.crawl.len() as i32 != crawlpos {
                        self.uncapture(m);
                    }
                }

                FOREJUMP => {
                    let crawlpos = self.stack_pop();
                    let trackpos = self.stack_pop();
                    self.track.truncate(trackpos as usize);
                    self.track_push1(crawlpos);
                    self.advance(0);
                    continue;
                }
                FOREJUMP_B => {
                    let crawlpos = self.track_pop();
                    while self.crawl.len() as i32 != crawlpos {
                        self.uncapture(m);
                    }
                }

                BOL => {
                    if self.text_pos <= self.text_beg || char_before(text, self.text_pos).0 == '\n'
                    {
                        self.advance(0);
                        continue;
                    }
                }
                EOL => {
                    if self.text_pos >= self.text_end || char_at(text, self.text_pos) == '\n' {
                        self.advance(0);
                        continue;
                    }
                }
                BOUNDARY => {
                    if self.is_boundary(text, self.text_pos) {
                        self.advance(0);
                        continue;
                    }
                }
                NONBOUNDARY => {
                    if !self.is_boundary(text, self.text_pos) {
                        self.advance(0);
                        continue;
                    }
                }
                ECMABOUNDARY => {
                    if self.is_ecma_boundary(text, self.text_pos) {
                        self.advance(0);
                        continue;
                    }
                }
                NONECMABOUNDARY => {
                    if !self.is_ecma_boundary(text, self.text_pos) {
                        self.advance(0);
                        continue;
                    }
                }
                BEGINNING => {
                    if self.text_pos <= self.text_beg {
                        self.advance(0);
                        continue;
                    }
                }
                START => {
                    if self.text_pos == self.text_start {
                        self.advance(0);
                        continue;
                    }
                }
                ENDZ => {
                    if self.text_pos >= self.text_end || &text[self.text_pos..self.text_end] == "\n"
                    {
                        self.advance(0);
                        continue;
                    }
                }
                END => {
                    if self.text_pos >= self.text_end {
                        self.advance(0);
                        continue;
                    }
                }

                ONE => {
                    if let Some((ch, np)) = self.peek_next(text) {
                        if self.fold(ch) as i32 == self.operand(0) {
                            self.text_pos = np;
                            self.advance(1);
                            continue;
                        }
                    }
                }
                NOTONE => {
                    if let Some((ch, np)) = self.peek_next(text) {
                        if self.fold(ch) as i32 != self.operand(0) {
                            self.text_pos = np;
                            self.advance(1);
                            continue;
                        }
                    }
                }
                SET => {
                    if let Some((ch, np)) = self.peek_next(text) {
                        let cc = &code.classes[self.operand(0) as usize];
                        if cc.contains(self.fold(ch)) {
                            self.text_pos = np;
                            self.advance(1);
                            continue;
                        }
                    }
                }

                MULTI => {
                    let s = &code.strings[self.operand(0) as usize];
                    if self.string_match(text, s) {
                        self.advance(1);
                        continue;
                    }
                }

                REF => {
                    let slot = self.operand(0) as usize;
                    if m.is_matched(slot) {
                        let index = m.match_index(slot) as usize;
                        let len = m.match_length(slot) as usize;
                        if self.ref_match(text, index, len) {
                            self.advance(1);
                            continue;
                        }
                    } else if opt_ecmascript(code.options) {
                        // unset group references match empty
                        self.advance(1);
                        continue;
                    }
                }

                ONEREP => {
                    let wanted = self.operand(0);
                    let n = self.operand(1);
                    let mut ok = true;
                    for _ in 0..n {
                        match self.peek_next(text) {
                            Some((ch, np)) if self.fold(ch) as i32 == wanted => {
                                self.text_pos = np;
                            }
                            _ => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if ok {
                        self.advance(2);
                        continue;
                    }
                }
                NOTONEREP => {
                    let banned = self.operand(0);
                    let n = self.operand(1);
                    let mut ok = true;
                    for _ in 0..n {
                        match self.peek_next(text) {
                            Some((ch, np)) if self.fold(ch) as i32 != banned => {
                                self.text_pos = np;
                            }
                            _ => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if ok {
                        self.advance(2);
                        continue;
                    }
                }
                SETREP => {
                    let idx = self.operand(0) as usize;
                    let n = self.operand(1);
                    let mut ok = true;
                    for _ in 0..n {
                        match self.peek_next(text) {
                            Some((ch, np)) if code.classes[idx].contains(self.fold(ch)) => {
                                self.text_pos = np;
                            }
                            _ => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if ok {
                        self.advance(2);
                        continue;
                    }
                }

                ONELOOP => {
                    let wanted = self.operand(0);
                    let limit = self.operand(1);
                    let mut i: i32 = 0;
                    while i < limit {
                        match self.peek_next(text) {
                            Some((ch, np)) if self.fold(ch) as i32 == wanted => {
                                self.text_pos = np;
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    if i > 0 {
                        let back = self.prev_in_dir(text, self.text_pos);
                        self.track_push2(i - 1, back as i32);
                    }
                    self.advance(2);
                    continue;
                }
                NOTONELOOP => {
                    let banned = self.operand(0);
                    let limit = self.operand(1);
                    let mut i: i32 = 0;
                    while i < limit {
                        match self.peek_next(text) {
                            Some((ch, np)) if self.fold(ch) as i32 != banned => {
                                self.text_pos = np;
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    if i > 0 {
                        let back = self.prev_in_dir(text, self.text_pos);
                        self.track_push2(i - 1, back as i32);
                    }
                    self.advance(2);
                    continue;
                }
                SETLOOP => {
                    let idx = self.operand(0) as usize;
                    let limit = self.operand(1);
                    let mut i: i32 = 0;
                    while i < limit {
                        match self.peek_next(text) {
                            Some((ch, np)) if code.classes[idx].contains(self.fold(ch)) => {
                                self.text_pos = np;
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    if i > 0 {
                        let back = self.prev_in_dir(text, self.text_pos);
                        self.track_push2(i - 1, back as i32);
                    }
                    self.advance(2);
                    continue;
                }
                ONELOOP_B | NOTONELOOP_B | SETLOOP_B => {
                    // hand one consumed char back and retry from there
                    let pos = self.track_pop();
                    let i = self.track_pop();
                    self.text_pos = pos as usize;
                    if i > 0 {
                        let back = self.prev_in_dir(text, pos as usize);
                        self.track_push2(i - 1, back as i32);
                    }
                    self.advance(2);
                    continue;
                }

                ONELAZY | NOTONELAZY | SETLAZY => {
                    let budget = (self.operand(1) as i64).min(self.forward_bytes() as i64) as i32;
                    if budget > 0 {
                        self.track_push2(budget - 1, self.text_pos as i32);
                    }
                    self.advance(2);
                    continue;
                }
                ONELAZY_B => {
                    let pos = self.track_pop();
                    let i = self.track_pop();
                    self.text_pos = pos as usize;
                    if let Some((ch, np)) = self.peek_next(text) {
                        if self.fold(ch) as i32 == self.operand(0) {
                            self.text_pos = np;
                            if i > 0 {
                                self.track_push2(i - 1, np as i32);
                            }
                            self.advance(2);
                            continue;
                        }
                    }
                }
                NOTONELAZY_B => {
                    let pos = self.track_pop();
                    let i = self.track_pop();
                    self.text_pos = pos as usize;
                    if let Some((ch, np)) = self.peek_next(text) {
                        if self.fold(ch) as i32 != self.operand(0) {
                            self.text_pos = np;
                            if i > 0 {
                                self.track_push2(i - 1, np as i32);
                            }
                            self.advance(2);
                            continue;
                        }
                    }
                }
                SETLAZY_B => {
                    let pos = self.track_pop();
                    let i = self.track_pop();
                    self.text_pos = pos as usize;
                    if let Some((ch, np)) = self.peek_next(text) {
                        let cc = &code.classes[self.operand(0) as usize];
                        if cc.contains(self.fold(ch)) {
                            self.text_pos = np;
                            if i > 0 {
                                self.track_push2(i - 1, np as i32);
                            }
                            self.advance(2);
                            continue;
                        }
                    }
                }

                other => {
                    return Err(Error::internal(format!(
                        "unrecognized operator {} ({})",
                        other,
                        opcode_name(other)
                    )));
                }
            }

            // === Backtrack ===
            // Pop the saved code position; the sign picks the re-entry
            // flavor of the instruction we restart.
            let newpos = match self.track.pop() {
                Some(v) => v,
                None => return Err(Error::internal("track stack underflow")),
            };
            if newpos < 0 {
                let np = (-newpos) as usize;
                let op = code.codes[np] | BACK2;
                self.set_operator(op);
                self.code_pos = np;
            } else {
                let np = newpos as usize;
                let op = code.codes[np] | BACK;
                self.set_operator(op);
                self.code_pos = np;
            }
        }
    }
}
