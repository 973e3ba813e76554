// scanner.rs - Outer search loop and start-position skipping.
//
// The scanner walks candidate start positions one char at a time in the
// program's direction. At each candidate it first lets the anchor bits,
// the Boyer-Moore prefix, or the first-char set veto or fast-forward the
// position, then runs the VM. Stacks are reset (not freed) between
// candidates.

use std::time::{Duration, Instant};

use crate::code::{ANCHOR_BEGINNING, ANCHOR_END, ANCHOR_ENDZ, ANCHOR_START};
use crate::error::Error;
use crate::interp::{char_at, char_before, Runner, TIMEOUT_CHECK_FREQUENCY};
use crate::matchrec::MatchData;

/// Result of one scan. The quick flavor reports success without paying
/// for a match record.
pub(crate) enum ScanOutcome {
    Matched(MatchData),
    QuickHit,
    NoMatch,
}

impl Runner {
    /// Searches `[beg, end)` for the first match at or after (or at or
    /// before, right to left) `start`. `prev_len == Some(0)` means the
    /// previous match at `start` was empty and one bump is owed before
    /// searching, which is what keeps empty matches making progress.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn scan(
        &mut self,
        text: &str,
        beg: usize,
        end: usize,
        start: usize,
        prev_len: Option<usize>,
        quick: bool,
        timeout: Option<Duration>,
    ) -> Result<ScanOutcome, Error> {
        self.text_beg = beg;
        self.text_end = end;
        self.text_start = start;
        self.text_pos = start;
        self.timeout = timeout.unwrap_or(Duration::ZERO);
        self.deadline = timeout.map(|t| Instant::now() + t);
        self.ticks_left = TIMEOUT_CHECK_FREQUENCY;

        let rtl = self.code.right_to_left;
        let stop = if rtl { beg } else { end };

        if prev_len == Some(0) {
            if self.text_pos == stop {
                return Ok(ScanOutcome::NoMatch);
            }
            self.bump(text);
        }

        let mut initted = false;
        let mut run_match: Option<MatchData> = None;

        loop {
            if self.find_first_char(text) {
                self.check_timeout(text)?;
                if !initted {
                    self.init_stacks();
                    run_match = Some(self.fresh_match(beg, end, start));
                    initted = true;
                }
                let m = match run_match.as_mut() {
                    Some(m) => m,
                    None => return Err(Error::internal("match record missing after init")),
                };
                self.go(text, m)?;
                if m.match_count[0] > 0 {
                    if quick {
                        // keep the record for reuse; captures are reset on
                        // the next scan
                        self.spare = run_match.take();
                        return Ok(ScanOutcome::QuickHit);
                    }
                    let mut data = match run_match.take() {
                        Some(d) => d,
                        None => return Err(Error::internal("match record missing on success")),
                    };
                    data.tidy(self.text_pos);
                    return Ok(ScanOutcome::Matched(data));
                }
                // failed candidate: reset stack tops, keep storage
                self.track.clear();
                self.stack.clear();
                self.crawl.clear();
            }
            if self.text_pos == stop {
                if let Some(rm) = run_match.take() {
                    self.spare = Some(rm);
                }
                return Ok(ScanOutcome::NoMatch);
            }
            self.bump(text);
        }
    }

    /// Advances the candidate position one char in scan direction.
    fn bump(&mut self, text: &str) {
        if self.code.right_to_left {
            let (_, len) = char_before(text, self.text_pos);
            self.text_pos -= len;
        } else {
            self.text_pos += char_at(text, self.text_pos).len_utf8();
        }
    }

    /// Applies anchors, the Boyer-Moore prefix, and the first-char set to
    /// the current position. Returns false when no candidate remains from
    /// here; the position is then already parked at the stop position.
    fn find_first_char(&mut self, text: &str) -> bool {
        let code = std::sync::Arc::clone(&self.code);
        let anchors = code.anchors;

        if anchors & (ANCHOR_BEGINNING | ANCHOR_START | ANCHOR_ENDZ | ANCHOR_END) != 0 {
            if !code.right_to_left {
                if (anchors & ANCHOR_BEGINNING != 0 && self.text_pos > self.text_beg)
                    || (anchors & ANCHOR_START != 0 && self.text_pos > self.text_start)
                {
                    self.text_pos = self.text_end;
                    return false;
                }
                if anchors & ANCHOR_ENDZ != 0 {
                    let last = self.last_char_start(text);
                    if self.text_pos < last {
                        self.text_pos = last;
                    }
                } else if anchors & ANCHOR_END != 0 && self.text_pos < self.text_end {
                    self.text_pos = self.text_end;
                }
            } else {
                let last = self.last_char_start(text);
                if (anchors & ANCHOR_END != 0 && self.text_pos < self.text_end)
                    || (anchors & ANCHOR_ENDZ != 0
                        && self.text_pos < self.text_end
                        && !(self.text_pos == last && char_at(text, self.text_pos) == '\n'))
                    || (anchors & ANCHOR_START != 0 && self.text_pos < self.text_start)
                {
                    self.text_pos = self.text_beg;
                    return false;
                }
                if anchors & ANCHOR_BEGINNING != 0 && self.text_pos > self.text_beg {
                    self.text_pos = self.text_beg;
                }
            }
            if let Some(bm) = &code.bm_prefix {
                return bm.is_match(text, self.text_pos, self.text_beg, self.text_end);
            }
            return true;
        }

        if let Some(bm) = &code.bm_prefix {
            return match bm.scan(text, self.text_pos, self.text_beg, self.text_end) {
                Some(pos) => {
                    self.text_pos = pos;
                    true
                }
                None => {
                    self.text_pos = if code.right_to_left {
                        self.text_beg
                    } else {
                        self.text_end
                    };
                    false
                }
            };
        }

        let fc = match &code.fc_prefix {
            Some(fc) => fc,
            None => return true,
        };
        let fold = fc.case_insensitive;
        let singleton = fc.class.singleton_char();

        if !code.right_to_left {
            let mut pos = self.text_pos;
            while pos < self.text_end {
                let raw = char_at(text, pos);
                let ch = if fold { self.culture.lower(raw) } else { raw };
                let hit = match singleton {
                    Some(s) => ch == s,
                    None => fc.class.contains(ch),
                };
                if hit {
                    self.text_pos = pos;
                    return true;
                }
                pos += raw.len_utf8();
            }
            self.text_pos = pos;
            false
        } else {
            let mut pos = self.text_pos;
            while pos > self.text_beg {
                let (raw, len) = char_before(text, pos);
                let ch = if fold { self.culture.lower(raw) } else { raw };
                let hit = match singleton {
                    Some(s) => ch == s,
                    None => fc.class.contains(ch),
                };
                if hit {
                    self.text_pos = pos;
                    return true;
                }
                pos -= len;
            }
            self.text_pos = pos;
            false
        }
    }

    /// Start position of the last char in the window, or the window start
    /// when the window is empty.
    fn last_char_start(&self, text: &str) -> usize {
        if self.text_end > self.text_beg {
            let (_, len) = char_before(text, self.text_end);
            self.text_end - len
        } else {
            self.text_beg
        }
    }

    /// Lazily sizes the three stacks from the program's declared track
    /// count; afterwards only resets the tops so storage is reused across
    /// scans for as long as the runner lives.
    fn init_stacks(&mut self) {
        if self.track.capacity() == 0 {
            self.track.reserve((self.code.track_count * 8).max(32));
            self.stack.reserve((self.code.track_count * 8).max(16));
            self.crawl.reserve(32);
        }
        self.track.clear();
        self.stack.clear();
        self.crawl.clear();
    }

    /// A reset match record: the spare one left from a scan that did not
    /// hand its record out, or a fresh allocation.
    fn fresh_match(&mut self, beg: usize, end: usize, start: usize) -> MatchData {
        let cap_size = self.code.cap_size as usize;
        let mut m = self
            .spare
            .take()
            .unwrap_or_else(|| MatchData::new(cap_size));
        m.reset(cap_size, beg, end, start);
        m
    }
}
