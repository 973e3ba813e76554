// charclass.rs - Character-class membership oracle.
//
// A class is a negation flag over sorted inclusive char ranges plus a
// handful of named categories. Anything finer-grained than the named
// categories (full Unicode general categories, scripts, blocks) is the
// front end's problem; it hands us classes already reduced to this form.

use std::fmt;

use smallvec::SmallVec;

/// Named category kinds usable inside a [`CharClass`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Word,
    NotWord,
    Digit,
    NotDigit,
    Space,
    NotSpace,
}

impl Category {
    #[inline]
    fn contains(self, ch: char) -> bool {
        match self {
            Category::Word => is_word_char(ch),
            Category::NotWord => !is_word_char(ch),
            Category::Digit => ch.is_numeric(),
            Category::NotDigit => !ch.is_numeric(),
            Category::Space => ch.is_whitespace(),
            Category::NotSpace => !ch.is_whitespace(),
        }
    }
}

/// A compiled character class: membership is
/// `negated XOR (in a range OR in a category)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharClass {
    negated: bool,
    ranges: Vec<(char, char)>,
    categories: SmallVec<[Category; 2]>,
}

impl CharClass {
    /// The empty class. Matches nothing; negated it matches everything.
    pub fn empty() -> CharClass {
        CharClass {
            negated: false,
            ranges: Vec::new(),
            categories: SmallVec::new(),
        }
    }

    /// Class matching every character.
    pub fn any() -> CharClass {
        let mut cc = CharClass::empty();
        cc.negated = true;
        cc
    }

    /// Class matching every character except `\n` (the default `.`).
    pub fn any_but_newline() -> CharClass {
        let mut cc = CharClass::empty();
        cc.add_char('\n');
        cc.negated = true;
        cc
    }

    /// Class holding a single character.
    pub fn from_char(ch: char) -> CharClass {
        let mut cc = CharClass::empty();
        cc.add_char(ch);
        cc
    }

    /// Class from a set of inclusive ranges.
    pub fn from_ranges<I: IntoIterator<Item = (char, char)>>(ranges: I) -> CharClass {
        let mut cc = CharClass::empty();
        for (lo, hi) in ranges {
            cc.add_range(lo, hi);
        }
        cc
    }

    /// Class from a named category.
    pub fn from_category(cat: Category) -> CharClass {
        let mut cc = CharClass::empty();
        cc.add_category(cat);
        cc
    }

    pub fn digit() -> CharClass {
        CharClass::from_category(Category::Digit)
    }

    pub fn word() -> CharClass {
        CharClass::from_category(Category::Word)
    }

    pub fn space() -> CharClass {
        CharClass::from_category(Category::Space)
    }

    /// Flips the membership sense of the whole class.
    pub fn negate(mut self) -> CharClass {
        self.negated = !self.negated;
        self
    }

    pub fn add_char(&mut self, ch: char) {
        self.add_range(ch, ch);
    }

    /// Adds an inclusive range, keeping the range list sorted and merged.
    pub fn add_range(&mut self, lo: char, hi: char) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let at = self.ranges.partition_point(|&(l, _)| l < lo);
        self.ranges.insert(at, (lo, hi));
        // merge neighbors that touch or overlap
        let mut merged: Vec<(char, char)> = Vec::with_capacity(self.ranges.len());
        for &(l, h) in &self.ranges {
            match merged.last_mut() {
                Some(&mut (_, ref mut ph)) if l as u32 <= *ph as u32 + 1 => {
                    if h > *ph {
                        *ph = h;
                    }
                }
                _ => merged.push((l, h)),
            }
        }
        self.ranges = merged;
    }

    pub fn add_category(&mut self, cat: Category) {
        if !self.categories.contains(&cat) {
            self.categories.push(cat);
        }
    }

    /// Membership test.
    #[inline]
    pub fn contains(&self, ch: char) -> bool {
        let inside = self.in_ranges(ch) || self.categories.iter().any(|c| c.contains(ch));
        inside != self.negated
    }

    #[inline]
    fn in_ranges(&self, ch: char) -> bool {
        // Binary search over sorted disjoint ranges.
        let mut lo = 0usize;
        let mut hi = self.ranges.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let (l, h) = self.ranges[mid];
            if ch < l {
                hi = mid;
            } else if ch > h {
                lo = mid + 1;
            } else {
                return true;
            }
        }
        false
    }

    /// True when this class matches exactly one character.
    pub fn is_singleton(&self) -> bool {
        self.singleton_char().is_some()
    }

    /// The single member of a one-character class, if it is one.
    pub fn singleton_char(&self) -> Option<char> {
        if self.negated || !self.categories.is_empty() || self.ranges.len() != 1 {
            return None;
        }
        let (lo, hi) = self.ranges[0];
        if lo == hi {
            Some(lo)
        } else {
            None
        }
    }

    /// True when the class has no members at all.
    pub fn is_empty_class(&self) -> bool {
        !self.negated && self.ranges.is_empty() && self.categories.is_empty()
    }

    pub(crate) fn is_negated(&self) -> bool {
        self.negated
    }

    /// Folds another (non-negated) class into this one. Used by the
    /// first-character analyzer; returns false when the union cannot be
    /// represented without widening (negated operand).
    pub(crate) fn try_union(&mut self, other: &CharClass) -> bool {
        if self.negated || other.negated {
            return false;
        }
        for &(lo, hi) in &other.ranges {
            self.add_range(lo, hi);
        }
        for &cat in &other.categories {
            self.add_category(cat);
        }
        true
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "^")?;
        }
        for &(lo, hi) in &self.ranges {
            if lo == hi {
                write!(f, "{:?}", lo)?;
            } else {
                write!(f, "{:?}-{:?}", lo, hi)?;
            }
        }
        for cat in &self.categories {
            write!(f, "<{:?}>", cat)?;
        }
        Ok(())
    }
}

// === Word-character predicates ===
//
// The word set is letters, digits and connector punctuation plus the two
// zero-width joiners. ECMAScript mode narrows it to the ASCII word set.

#[inline]
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '\u{200C}' || ch == '\u{200D}'
}

#[inline]
pub fn is_ecma_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_membership() {
        let cc = CharClass::from_char('a');
        assert!(cc.contains('a'));
        assert!(!cc.contains('b'));
    }

    #[test]
    fn range_membership() {
        let cc = CharClass::from_ranges([('a', 'z'), ('0', '9')]);
        assert!(cc.contains('m'));
        assert!(cc.contains('5'));
        assert!(!cc.contains('A'));
    }

    #[test]
    fn negated_class() {
        let cc = CharClass::from_char('\n').negate();
        assert!(cc.contains('x'));
        assert!(!cc.contains('\n'));
    }

    #[test]
    fn category_membership() {
        let cc = CharClass::digit();
        assert!(cc.contains('7'));
        assert!(!cc.contains('x'));
        let w = CharClass::word();
        assert!(w.contains('_'));
        assert!(w.contains('é'));
        assert!(!w.contains(' '));
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut cc = CharClass::empty();
        cc.add_range('a', 'f');
        cc.add_range('g', 'm');
        cc.add_range('c', 'j');
        assert!(cc.contains('a'));
        assert!(cc.contains('m'));
        assert!(!cc.contains('n'));
        assert!(cc.singleton_char().is_none());
    }

    #[test]
    fn singleton() {
        assert_eq!(CharClass::from_char('q').singleton_char(), Some('q'));
        assert_eq!(CharClass::from_ranges([('a', 'b')]).singleton_char(), None);
        assert_eq!(CharClass::from_char('q').negate().singleton_char(), None);
    }

    #[test]
    fn union() {
        let mut a = CharClass::from_char('a');
        let b = CharClass::from_char('b');
        assert!(a.try_union(&b));
        assert!(a.contains('a') && a.contains('b'));
        let neg = CharClass::any();
        assert!(!a.try_union(&neg));
    }

    #[test]
    fn any_but_newline() {
        let cc = CharClass::any_but_newline();
        assert!(cc.contains('a'));
        assert!(!cc.contains('\n'));
    }

    #[test]
    fn empty_class_matches_nothing() {
        let cc = CharClass::empty();
        assert!(cc.is_empty_class());
        assert!(!cc.contains('a'));
        assert!(!cc.contains('\0'));
    }

    #[test]
    fn word_char_predicates() {
        assert!(is_word_char('a') && is_word_char('0') && is_word_char('_'));
        assert!(is_word_char('λ'));
        assert!(!is_word_char('-'));
        assert!(is_ecma_word_char('z'));
        assert!(!is_ecma_word_char('λ'));
    }
}
