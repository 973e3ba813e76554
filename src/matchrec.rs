// matchrec.rs - The mutable match record.
//
// Capture state is a pair of parallel arrays per group: a completed-count
// and an interleaved (start, length) list that only ever grows during a
// pass. Backtracking retracts by decrementing the count; a later capture
// overwrites the stale tail. Balancing groups append a negative forward
// reference instead of a literal interval; `tidy` compacts those out once
// the overall match has succeeded.
//
// A negative entry v resolves through `index = -3 - v`. The map is its
// own inverse, so an entry can point at the slot that later points back.

use smallvec::SmallVec;

/// Per-scan capture state, transferred to the caller on success.
#[derive(Clone, Debug)]
pub struct MatchData {
    pub(crate) match_count: Vec<i32>,
    pub(crate) matches: Vec<SmallVec<[i32; 8]>>,
    pub(crate) balancing: bool,
    /// Group 0 start, filled by `tidy`.
    pub(crate) index: i32,
    /// Group 0 length, filled by `tidy`.
    pub(crate) length: i32,
    /// Cursor position after the match; the continuation point for the
    /// next scan.
    pub(crate) text_pos: usize,
    pub(crate) text_beg: usize,
    pub(crate) text_end: usize,
    pub(crate) text_start: usize,
}

#[inline]
pub(crate) fn resolve_ref(v: i32) -> i32 {
    -3 - v
}

impl MatchData {
    pub(crate) fn new(cap_size: usize) -> MatchData {
        MatchData {
            match_count: vec![0; cap_size],
            matches: vec![SmallVec::new(); cap_size],
            balancing: false,
            index: 0,
            length: 0,
            text_pos: 0,
            text_beg: 0,
            text_end: 0,
            text_start: 0,
        }
    }

    pub(crate) fn reset(&mut self, cap_size: usize, beg: usize, end: usize, start: usize) {
        self.match_count.clear();
        self.match_count.resize(cap_size, 0);
        if self.matches.len() != cap_size {
            self.matches.resize(cap_size, SmallVec::new());
        }
        self.balancing = false;
        self.index = 0;
        self.length = 0;
        self.text_pos = start;
        self.text_beg = beg;
        self.text_end = end;
        self.text_start = start;
    }

    /// Appends a completed capture for the group, overwriting any tail
    /// left behind by earlier retraction.
    pub(crate) fn add_match(&mut self, cap: usize, start: i32, len: i32) {
        let used = (self.match_count[cap] as usize) * 2;
        let arr = &mut self.matches[cap];
        arr.truncate(used);
        arr.push(start);
        arr.push(len);
        self.match_count[cap] += 1;
    }

    /// Pops the last capture of `cap` by appending a negative reference
    /// to it, keeping the original interval reachable for resolution.
    pub(crate) fn balance_match(&mut self, cap: usize) {
        self.balancing = true;
        let capcount = self.match_count[cap];
        let mut target = capcount * 2 - 2;
        if self.matches[cap][target as usize] < 0 {
            target = resolve_ref(self.matches[cap][target as usize]);
        }
        target -= 2;
        if target >= 0 && self.matches[cap][target as usize] < 0 {
            let s = self.matches[cap][target as usize];
            let l = self.matches[cap][target as usize + 1];
            self.add_match(cap, s, l);
        } else {
            self.add_match(cap, -3 - target, -4 - target);
        }
    }

    /// Retracts the last capture of the group.
    pub(crate) fn remove_match(&mut self, cap: usize) {
        self.match_count[cap] -= 1;
    }

    /// True when the group currently holds a capture. A trailing length
    /// entry of -2 marks a group whose captures have all been balanced
    /// away; such a group reports unmatched.
    #[inline]
    pub(crate) fn is_matched(&self, cap: usize) -> bool {
        cap < self.match_count.len()
            && self.match_count[cap] > 0
            && self.matches[cap][(self.match_count[cap] * 2 - 1) as usize] != -2
    }

    /// Start of the group's last capture, following one reference hop.
    #[inline]
    pub(crate) fn match_index(&self, cap: usize) -> i32 {
        let arr = &self.matches[cap];
        let v = arr[(self.match_count[cap] * 2 - 2) as usize];
        if v >= 0 {
            v
        } else {
            arr[resolve_ref(v) as usize]
        }
    }

    /// Length of the group's last capture, following one reference hop.
    #[inline]
    pub(crate) fn match_length(&self, cap: usize) -> i32 {
        let arr = &self.matches[cap];
        let v = arr[(self.match_count[cap] * 2 - 1) as usize];
        if v >= 0 {
            v
        } else {
            arr[resolve_ref(v) as usize]
        }
    }

    /// Finalizes the record after a successful pass: publishes group 0 and,
    /// when any balancing occurred, compacts the reference entries out of
    /// every group's list.
    pub(crate) fn tidy(&mut self, text_pos: usize) {
        self.index = self.matches[0][0];
        self.length = self.matches[0][1];
        self.text_pos = text_pos;

        if self.balancing {
            for cap in 0..self.match_count.len() {
                let limit = (self.match_count[cap] * 2) as usize;
                let arr = &mut self.matches[cap];

                let mut i = 0usize;
                while i < limit && arr[i] >= 0 {
                    i += 1;
                }
                // j trails i, counting the surviving entries; each negative
                // entry cancels one survivor.
                let mut j = i as i32;
                while i < limit {
                    if arr[i] < 0 {
                        j -= 1;
                    } else {
                        if i as i32 != j {
                            arr[j as usize] = arr[i];
                        }
                        j += 1;
                    }
                    i += 1;
                }
                self.match_count[cap] = j / 2;
            }
            self.balancing = false;
        }
    }

    /// Number of completed captures for a dense slot (post-tidy view).
    pub(crate) fn capture_count(&self, cap: usize) -> i32 {
        self.match_count[cap]
    }

    /// All capture spans of a dense slot as byte offsets into the text.
    pub(crate) fn capture_spans(&self, cap: usize) -> SmallVec<[(usize, usize); 4]> {
        let mut out = SmallVec::new();
        for k in 0..self.match_count[cap] as usize {
            let s = self.matches[cap][k * 2];
            let l = self.matches[cap][k * 2 + 1];
            out.push((s as usize, (s + l) as usize));
        }
        out
    }

    /// Last capture span of a dense slot, if the group matched.
    pub(crate) fn group_span(&self, cap: usize) -> Option<(usize, usize)> {
        if cap >= self.match_count.len() || self.match_count[cap] <= 0 {
            return None;
        }
        let s = self.match_index(cap);
        let l = self.match_length(cap);
        Some((s as usize, (s + l) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query() {
        let mut m = MatchData::new(2);
        m.reset(2, 0, 10, 0);
        m.add_match(1, 2, 3);
        assert!(m.is_matched(1));
        assert_eq!(m.match_index(1), 2);
        assert_eq!(m.match_length(1), 3);
        assert!(!m.is_matched(0));
    }

    #[test]
    fn remove_then_overwrite() {
        let mut m = MatchData::new(1);
        m.reset(1, 0, 10, 0);
        m.add_match(0, 1, 1);
        m.add_match(0, 4, 2);
        m.remove_match(0);
        assert_eq!(m.match_index(0), 1);
        m.add_match(0, 7, 1);
        assert_eq!(m.capture_count(0), 2);
        assert_eq!(m.match_index(0), 7);
    }

    #[test]
    fn reference_encoding_is_an_involution() {
        for v in [-3, -4, -10, -100] {
            assert_eq!(resolve_ref(resolve_ref(v)), v);
        }
        for idx in [0, 1, 2, 97] {
            assert_eq!(resolve_ref(resolve_ref(idx)), idx);
        }
    }

    #[test]
    fn balance_pops_last_capture() {
        let mut m = MatchData::new(1);
        m.reset(1, 0, 10, 0);
        m.add_match(0, 0, 1);
        m.add_match(0, 2, 1);
        m.balance_match(0);
        // the balance entry refers back to the first capture
        assert!(m.is_matched(0));
        assert_eq!(m.match_index(0), 0);
        assert_eq!(m.match_length(0), 1);
    }

    #[test]
    fn balance_to_empty_reports_unmatched() {
        let mut m = MatchData::new(1);
        m.reset(1, 0, 10, 0);
        m.add_match(0, 0, 1);
        m.balance_match(0);
        // single capture balanced away: sentinel length -2
        assert!(!m.is_matched(0));
    }

    #[test]
    fn tidy_compacts_balanced_entries() {
        let mut m = MatchData::new(2);
        m.reset(2, 0, 10, 0);
        m.add_match(0, 0, 4);
        m.add_match(1, 0, 1);
        m.add_match(1, 1, 1);
        m.balance_match(1); // pops (1,1), leaves (0,1) live via reference
        m.balance_match(1); // pops (0,1) too
        m.tidy(4);
        assert_eq!(m.index, 0);
        assert_eq!(m.length, 4);
        assert_eq!(m.capture_count(1), 0);
        assert!(!m.balancing);
        // no negative entries remain within the counted region
        for k in 0..(m.capture_count(1) * 2) as usize {
            assert!(m.matches[1][k] >= 0);
        }
    }

    #[test]
    fn tidy_keeps_unbalanced_captures() {
        let mut m = MatchData::new(2);
        m.reset(2, 0, 10, 0);
        m.add_match(0, 0, 6);
        m.add_match(1, 0, 1);
        m.add_match(1, 2, 1);
        m.add_match(1, 4, 1);
        m.balance_match(1); // pops (4,1); the group now reports (2,1)
        assert_eq!(m.match_index(1), 2);
        m.tidy(6);
        assert_eq!(m.capture_count(1), 2);
        assert_eq!(m.group_span(1), Some((2, 3)));
        assert_eq!(m.capture_spans(1).as_slice(), &[(0, 1), (2, 3)]);
    }

    #[test]
    fn spans_and_counts() {
        let mut m = MatchData::new(2);
        m.reset(2, 0, 10, 0);
        m.add_match(0, 0, 5);
        m.add_match(1, 0, 2);
        m.add_match(1, 3, 2);
        m.tidy(5);
        let spans = m.capture_spans(1);
        assert_eq!(spans.as_slice(), &[(0, 2), (3, 5)]);
        assert_eq!(m.group_span(1), Some((3, 5)));
    }

    #[test]
    fn reset_clears_counts_but_reuses_storage() {
        let mut m = MatchData::new(2);
        m.reset(2, 0, 10, 0);
        m.add_match(0, 0, 5);
        m.reset(2, 0, 8, 3);
        assert_eq!(m.capture_count(0), 0);
        assert!(!m.is_matched(0));
        assert_eq!(m.text_start, 3);
    }
}
