// writer.rs - Lowers a pattern tree to a RegexCode program.
//
// Single pass over the tree with absolute jump operands patched as
// targets become known. Group numbers are collected up front so capture
// instructions can carry dense slot indexes. Quantifiers over a single
// character lower to the dedicated rep/loop opcodes; everything else uses
// the mark/count loop machinery.

use std::collections::{BTreeSet, HashMap};

use crate::charclass::CharClass;
use crate::code::*;
use crate::error::Error;
use crate::prefix::{self, BoyerMoore};
use crate::tree::{Node, INFINITE};

struct Writer {
    codes: Vec<i32>,
    strings: Vec<String>,
    classes: Vec<CharClass>,
    track_count: usize,
    caps: Option<HashMap<i32, i32>>,
    cap_size: i32,
    culture: Culture,
}

/// Compiles a pattern tree into an immutable program.
pub fn write(root: &Node, options: Options, culture: Culture) -> Result<RegexCode, Error> {
    let mut groups: BTreeSet<i32> = BTreeSet::new();
    groups.insert(0);
    let mut names: HashMap<String, i32> = HashMap::new();
    collect_groups(root, &mut groups, &mut names)?;

    let contiguous = groups.iter().next_back() == Some(&(groups.len() as i32 - 1));
    let cap_size = groups.len() as i32;
    let caps = if contiguous {
        None
    } else {
        Some(
            groups
                .iter()
                .enumerate()
                .map(|(slot, &num)| (num, slot as i32))
                .collect::<HashMap<i32, i32>>(),
        )
    };

    let mut w = Writer {
        codes: Vec::new(),
        strings: Vec::new(),
        classes: Vec::new(),
        track_count: 0,
        caps,
        cap_size,
        culture,
    };

    // Program frame: a top-level Lazybranch whose alternative is the Stop
    // at the very end. Complete failure backtracks into it and terminates
    // with no captures instead of underflowing the track stack.
    let lb = w.emit_jump(LAZYBRANCH);
    w.emit1(SETMARK);
    w.emit_node(root, options)?;
    w.emit3(CAPTUREMARK, 0, -1);
    let stop_pos = w.cur();
    w.patch(lb, stop_pos);
    w.emit1(STOP);

    let bm_prefix = prefix::literal_prefix(root, options)
        .and_then(|(s, ci)| BoyerMoore::build(&s, ci, opt_right_to_left(options), &w.culture));
    let fc_prefix = prefix::first_chars(root, options, &w.culture);

    Ok(RegexCode {
        codes: w.codes,
        strings: w.strings,
        classes: w.classes,
        track_count: w.track_count,
        anchors: prefix::anchors(root, options),
        fc_prefix,
        bm_prefix,
        right_to_left: opt_right_to_left(options),
        caps: w.caps,
        cap_size,
        cap_names: if names.is_empty() { None } else { Some(names) },
        options,
        culture,
    })
}

fn collect_groups(
    node: &Node,
    groups: &mut BTreeSet<i32>,
    names: &mut HashMap<String, i32>,
) -> Result<(), Error> {
    match node {
        Node::Capture { group, uncapture, name, body } => {
            if *group == 0 {
                return Err(Error::invalid("group number 0 is reserved for the whole match"));
            }
            if *group < -1 || (*group == -1 && uncapture.is_none()) {
                return Err(Error::invalid("capture group number must be positive"));
            }
            if *group > 0 {
                groups.insert(*group);
            }
            if let Some(name) = name {
                match names.get(name.as_str()) {
                    Some(&existing) if existing != *group => {
                        return Err(Error::invalid(format!(
                            "group name {:?} bound to two different numbers",
                            name
                        )));
                    }
                    _ => {
                        names.insert(name.clone(), *group);
                    }
                }
            }
            collect_groups(body, groups, names)
        }
        Node::Concat(children) | Node::Alternate(children) => {
            for child in children {
                collect_groups(child, groups, names)?;
            }
            Ok(())
        }
        Node::Loop { body, .. }
        | Node::Atomic(body)
        | Node::Require { body, .. }
        | Node::Prevent { body, .. }
        | Node::OptionsGroup { body, .. } => collect_groups(body, groups, names),
        Node::TestRef { yes, no, .. } => {
            collect_groups(yes, groups, names)?;
            if let Some(no) = no {
                collect_groups(no, groups, names)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

impl Writer {
    #[inline]
    fn cur(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    fn count_track(&mut self, op: i32) {
        if opcode_backtracks(op) {
            self.track_count += 1;
        }
    }

    fn emit1(&mut self, op: i32) {
        self.count_track(op);
        self.codes.push(op);
    }

    fn emit2(&mut self, op: i32, a: i32) {
        self.count_track(op);
        self.codes.push(op);
        self.codes.push(a);
    }

    fn emit3(&mut self, op: i32, a: i32, b: i32) {
        self.count_track(op);
        self.codes.push(op);
        self.codes.push(a);
        self.codes.push(b);
    }

    /// Emits a jump instruction with a placeholder target; returns the
    /// operand slot for later patching.
    fn emit_jump(&mut self, op: i32) -> usize {
        self.emit2(op, 0);
        self.cur() - 1
    }

    fn patch(&mut self, slot: usize, target: usize) {
        self.codes[slot] = target as i32;
    }

    fn string_index(&mut self, s: String) -> i32 {
        if let Some(i) = self.strings.iter().position(|x| *x == s) {
            return i as i32;
        }
        self.strings.push(s);
        self.strings.len() as i32 - 1
    }

    fn class_index(&mut self, cc: &CharClass) -> i32 {
        if let Some(i) = self.classes.iter().position(|x| x == cc) {
            return i as i32;
        }
        self.classes.push(cc.clone());
        self.classes.len() as i32 - 1
    }

    fn map_capnum(&self, num: i32) -> Option<i32> {
        match &self.caps {
            Some(caps) => caps.get(&num).copied(),
            None => {
                if num >= 0 && num < self.cap_size {
                    Some(num)
                } else {
                    None
                }
            }
        }
    }

    #[inline]
    fn bits(&self, options: Options) -> i32 {
        let mut b = 0;
        if opt_ignore_case(options) {
            b |= CI;
        }
        if opt_right_to_left(options) {
            b |= RTL;
        }
        b
    }

    #[inline]
    fn fold(&self, options: Options, c: char) -> char {
        if opt_ignore_case(options) {
            self.culture.lower(c)
        } else {
            c
        }
    }

    /// Quantifier bodies consisting of one character test lower to the
    /// dedicated rep/loop families. Returns the family offset and the
    /// operand (char scalar or class index).
    fn char_payload(&mut self, body: &Node, options: Options) -> Option<(i32, i32)> {
        match body {
            Node::One(c) => Some((0, self.fold(options, *c) as i32)),
            Node::Notone(c) => Some((1, self.fold(options, *c) as i32)),
            Node::Set(cc) => Some((2, self.class_index(cc))),
            _ => None,
        }
    }

    fn emit_node(&mut self, node: &Node, options: Options) -> Result<(), Error> {
        let bits = self.bits(options);
        match node {
            Node::One(c) => self.emit2(ONE | bits, self.fold(options, *c) as i32),
            Node::Notone(c) => self.emit2(NOTONE | bits, self.fold(options, *c) as i32),
            Node::Set(cc) => {
                let idx = self.class_index(cc);
                self.emit2(SET | bits, idx);
            }
            Node::Multi(s) => {
                let s = if opt_ignore_case(options) {
                    s.chars().map(|c| self.culture.lower(c)).collect()
                } else {
                    s.clone()
                };
                let idx = self.string_index(s);
                self.emit2(MULTI | bits, idx);
            }
            Node::Ref(group) => {
                let slot = self
                    .map_capnum(*group)
                    .ok_or_else(|| Error::invalid("backreference to an undeclared group"))?;
                self.emit2(REF | bits, slot);
            }
            Node::Concat(children) => {
                if opt_right_to_left(options) {
                    for child in children.iter().rev() {
                        self.emit_node(child, options)?;
                    }
                } else {
                    for child in children {
                        self.emit_node(child, options)?;
                    }
                }
            }
            Node::Alternate(branches) => match branches.len() {
                0 => {}
                1 => self.emit_node(&branches[0], options)?,
                n => {
                    let mut goto_slots = Vec::with_capacity(n - 1);
                    for (k, branch) in branches.iter().enumerate() {
                        if k < n - 1 {
                            let lb = self.emit_jump(LAZYBRANCH);
                            self.emit_node(branch, options)?;
                            goto_slots.push(self.emit_jump(GOTO));
                            let next = self.cur();
                            self.patch(lb, next);
                        } else {
                            self.emit_node(branch, options)?;
                        }
                    }
                    let end = self.cur();
                    for slot in goto_slots {
                        self.patch(slot, end);
                    }
                }
            },
            Node::Loop { min, max, lazy, body } => {
                self.emit_loop(*min, *max, *lazy, body, options)?;
            }
            Node::Capture { group, uncapture, body, .. } => {
                let cap_slot = if *group >= 0 {
                    self.map_capnum(*group)
                        .ok_or_else(|| Error::internal("capture group missing from collection"))?
                } else {
                    -1
                };
                let uncap_slot = match uncapture {
                    Some(u) => self
                        .map_capnum(*u)
                        .ok_or_else(|| Error::invalid("balancing group pops an undeclared group"))?,
                    None => -1,
                };
                self.emit1(SETMARK);
                self.emit_node(body, options)?;
                self.emit3(CAPTUREMARK, cap_slot, uncap_slot);
            }
            Node::Atomic(body) => {
                self.emit1(SETJUMP);
                self.emit_node(body, options)?;
                self.emit1(FOREJUMP);
            }
            Node::Require { behind, body } => {
                let body_options = if *behind {
                    options | OPT_RIGHT_TO_LEFT
                } else {
                    options & !OPT_RIGHT_TO_LEFT
                };
                self.emit1(SETJUMP);
                self.emit1(SETMARK);
                self.emit_node(body, body_options)?;
                self.emit1(GETMARK);
                self.emit1(FOREJUMP);
            }
            Node::Prevent { behind, body } => {
                let body_options = if *behind {
                    options | OPT_RIGHT_TO_LEFT
                } else {
                    options & !OPT_RIGHT_TO_LEFT
                };
                self.emit1(SETJUMP);
                let lb = self.emit_jump(LAZYBRANCH);
                self.emit_node(body, body_options)?;
                self.emit1(BACKJUMP);
                let escape = self.cur();
                self.patch(lb, escape);
                self.emit1(FOREJUMP);
            }
            Node::TestRef { group, yes, no } => {
                let slot = self
                    .map_capnum(*group)
                    .ok_or_else(|| Error::invalid("conditional references an undeclared group"))?;
                self.emit1(SETJUMP);
                let lb = self.emit_jump(LAZYBRANCH);
                self.emit2(TESTREF, slot);
                self.emit1(FOREJUMP);
                self.emit_node(yes, options)?;
                let skip = self.emit_jump(GOTO);
                let alt = self.cur();
                self.patch(lb, alt);
                self.emit1(FOREJUMP);
                if let Some(no) = no {
                    self.emit_node(no, options)?;
                }
                let end = self.cur();
                self.patch(skip, end);
            }
            Node::OptionsGroup { add, remove, body } => {
                self.emit_node(body, (options | add) & !remove)?;
            }
            Node::Bol => self.emit1(BOL),
            Node::Eol => self.emit1(EOL),
            Node::Boundary => self.emit1(BOUNDARY),
            Node::NonBoundary => self.emit1(NONBOUNDARY),
            Node::EcmaBoundary => self.emit1(ECMABOUNDARY),
            Node::NonEcmaBoundary => self.emit1(NONECMABOUNDARY),
            Node::Beginning => self.emit1(BEGINNING),
            Node::Start => self.emit1(START),
            Node::End => self.emit1(END),
            Node::EndZ => self.emit1(ENDZ),
            Node::Empty => {}
            Node::Nothing => {
                // matches no character at all
                let idx = self.class_index(&CharClass::empty());
                self.emit2(SET | bits, idx);
            }
        }
        Ok(())
    }

    fn emit_loop(
        &mut self,
        min: u32,
        max: u32,
        lazy: bool,
        body: &Node,
        options: Options,
    ) -> Result<(), Error> {
        if max != INFINITE && max < min {
            return Err(Error::invalid("quantifier maximum below its minimum"));
        }
        let bits = self.bits(options);

        if let Some((kind, operand)) = self.char_payload(body, options) {
            if min > 0 {
                self.emit3((ONEREP + kind) | bits, operand, min as i32);
            }
            if max == INFINITE {
                self.emit3(
                    (if lazy { ONELAZY } else { ONELOOP } + kind) | bits,
                    operand,
                    i32::MAX,
                );
            } else if max > min {
                self.emit3(
                    (if lazy { ONELAZY } else { ONELOOP } + kind) | bits,
                    operand,
                    (max - min) as i32,
                );
            }
            return Ok(());
        }

        if max == INFINITE && min <= 1 {
            self.emit1(if min == 0 { NULLMARK } else { SETMARK });
            let skip = if min == 0 { Some(self.emit_jump(GOTO)) } else { None };
            let body_start = self.cur();
            self.emit_node(body, options)?;
            let branch_pos = self.cur();
            if let Some(slot) = skip {
                self.patch(slot, branch_pos);
            }
            self.emit2(
                if lazy { LAZYBRANCHMARK } else { BRANCHMARK },
                body_start as i32,
            );
        } else {
            self.emit2(
                if min == 0 { NULLCOUNT } else { SETCOUNT },
                if min == 0 { 0 } else { 1 - min as i32 },
            );
            let skip = if min == 0 { Some(self.emit_jump(GOTO)) } else { None };
            let body_start = self.cur();
            self.emit_node(body, options)?;
            let branch_pos = self.cur();
            if let Some(slot) = skip {
                self.patch(slot, branch_pos);
            }
            self.emit3(
                if lazy { LAZYBRANCHCOUNT } else { BRANCHCOUNT },
                body_start as i32,
                if max == INFINITE {
                    i32::MAX
                } else {
                    (max - min) as i32
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{self};

    fn compile(root: &Node) -> RegexCode {
        write(root, OPT_NONE, Culture::invariant()).unwrap()
    }

    fn ops(code: &RegexCode) -> Vec<i32> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < code.codes.len() {
            let op = code.codes[pos];
            out.push(op & OP_MASK);
            pos += opcode_size(op);
        }
        out
    }

    #[test]
    fn frame_wraps_pattern() {
        let code = compile(&tree::lit("ab"));
        assert_eq!(
            ops(&code),
            vec![LAZYBRANCH, SETMARK, MULTI, CAPTUREMARK, STOP]
        );
        // the frame lazybranch escapes to the stop instruction
        let stop_pos = code.codes.len() - 1;
        assert_eq!(code.codes[1] as usize, stop_pos);
        assert_eq!(code.strings[code.codes[4] as usize], "ab");
    }

    #[test]
    fn star_reduces_to_oneloop() {
        let code = compile(&tree::concat([tree::star(tree::ch('a')), tree::ch('b')]));
        assert_eq!(
            ops(&code),
            vec![LAZYBRANCH, SETMARK, ONELOOP, ONE, CAPTUREMARK, STOP]
        );
        // unbounded loop carries the max sentinel
        let loop_at = 3; // Lazybranch + operand, Setmark, then the loop
        assert_eq!(code.codes[loop_at] & OP_MASK, ONELOOP);
        assert_eq!(code.codes[loop_at + 1], 'a' as i32);
        assert_eq!(code.codes[loop_at + 2], i32::MAX);
    }

    #[test]
    fn bounded_repeat_emits_rep_then_loop() {
        let code = compile(&tree::repeat(2, 4, tree::ch('x')));
        let o = ops(&code);
        assert_eq!(
            o,
            vec![LAZYBRANCH, SETMARK, ONEREP, ONELOOP, CAPTUREMARK, STOP]
        );
        // rep count 2, loop budget 2
        assert_eq!(code.codes[5], 2);
        assert_eq!(code.codes[8], 2);
    }

    #[test]
    fn lazy_star_uses_lazy_family() {
        let code = compile(&tree::star_lazy(tree::any()));
        assert!(ops(&code).contains(&NOTONELAZY));
    }

    #[test]
    fn general_loop_uses_marks() {
        let body = tree::group(1, tree::lit("ab"));
        let code = compile(&tree::star(body));
        let o = ops(&code);
        assert_eq!(
            o,
            vec![
                LAZYBRANCH, SETMARK, NULLMARK, GOTO, SETMARK, MULTI, CAPTUREMARK, BRANCHMARK,
                CAPTUREMARK, STOP
            ]
        );
    }

    #[test]
    fn counted_loop_uses_counts() {
        let body = tree::group(1, tree::lit("ab"));
        let code = compile(&tree::repeat(2, 5, body));
        let o = ops(&code);
        assert!(o.contains(&SETCOUNT));
        assert!(o.contains(&BRANCHCOUNT));
        // Setcount operand is 1 - min
        let pos = code
            .codes
            .iter()
            .position(|&c| c & OP_MASK == SETCOUNT)
            .unwrap();
        assert_eq!(code.codes[pos + 1], -1);
    }

    #[test]
    fn alternation_shape() {
        let code = compile(&tree::alt([tree::ch('a'), tree::ch('b'), tree::ch('c')]));
        assert_eq!(
            ops(&code),
            vec![
                LAZYBRANCH, SETMARK, LAZYBRANCH, ONE, GOTO, LAZYBRANCH, ONE, GOTO, ONE,
                CAPTUREMARK, STOP
            ]
        );
    }

    #[test]
    fn lookahead_shape() {
        let code = compile(&tree::concat([
            tree::lookahead(tree::ch('a')),
            tree::ch('a'),
        ]));
        assert_eq!(
            ops(&code),
            vec![
                LAZYBRANCH, SETMARK, SETJUMP, SETMARK, ONE, GETMARK, FOREJUMP, ONE, CAPTUREMARK,
                STOP
            ]
        );
    }

    #[test]
    fn negative_lookahead_shape() {
        let code = compile(&tree::not_lookahead(tree::ch('a')));
        assert_eq!(
            ops(&code),
            vec![
                LAZYBRANCH, SETMARK, SETJUMP, LAZYBRANCH, ONE, BACKJUMP, FOREJUMP, CAPTUREMARK,
                STOP
            ]
        );
    }

    #[test]
    fn lookbehind_body_is_right_to_left() {
        let code = compile(&tree::lookbehind(tree::lit("ab")));
        let multi = code
            .codes
            .iter()
            .position(|&c| c & OP_MASK == MULTI)
            .unwrap();
        assert_ne!(code.codes[multi] & RTL, 0);
    }

    #[test]
    fn ignore_case_folds_literals() {
        let code = write(&tree::lit("AbC"), OPT_IGNORE_CASE, Culture::invariant()).unwrap();
        assert_eq!(code.strings[0], "abc");
        let multi = code
            .codes
            .iter()
            .position(|&c| c & OP_MASK == MULTI)
            .unwrap();
        assert_ne!(code.codes[multi] & CI, 0);
    }

    #[test]
    fn rtl_reverses_concat_emission() {
        let code = write(
            &tree::concat([tree::ch('a'), tree::ch('b')]),
            OPT_RIGHT_TO_LEFT,
            Culture::invariant(),
        )
        .unwrap();
        // 'b' must be tested before 'a' when consuming right to left
        let chars: Vec<i32> = code
            .codes
            .iter()
            .enumerate()
            .filter(|&(i, &c)| c & OP_MASK == ONE && i > 0)
            .map(|(i, _)| code.codes[i + 1])
            .collect();
        assert_eq!(chars, vec!['b' as i32, 'a' as i32]);
    }

    #[test]
    fn sparse_groups_get_dense_slots() {
        let t = tree::concat([
            tree::group(2, tree::ch('a')),
            tree::group(8, tree::ch('b')),
        ]);
        let code = compile(&t);
        assert_eq!(code.cap_size, 3);
        let caps = code.caps.as_ref().unwrap();
        assert_eq!(caps[&0], 0);
        assert_eq!(caps[&2], 1);
        assert_eq!(caps[&8], 2);
    }

    #[test]
    fn contiguous_groups_skip_the_map() {
        let t = tree::concat([
            tree::group(1, tree::ch('a')),
            tree::group(2, tree::ch('b')),
        ]);
        let code = compile(&t);
        assert!(code.caps.is_none());
        assert_eq!(code.cap_size, 3);
    }

    #[test]
    fn named_groups_recorded() {
        let t = tree::named_group(1, "word", tree::plus(tree::set(CharClass::word())));
        let code = compile(&t);
        assert_eq!(code.slot_from_name("word"), Some(1));
        assert_eq!(code.slot_from_name("missing"), None);
    }

    #[test]
    fn undeclared_backref_rejected() {
        let err = write(&tree::backref(3), OPT_NONE, Culture::invariant()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn group_zero_rejected() {
        let err = write(
            &tree::group(0, tree::ch('a')),
            OPT_NONE,
            Culture::invariant(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn track_count_counts_backtracking_opcodes() {
        let code = compile(&tree::lit("ab"));
        // frame: Lazybranch + Setmark + Capturemark
        assert_eq!(code.track_count, 3);
        let code = compile(&tree::star(tree::ch('a')));
        assert_eq!(code.track_count, 4);
    }

    #[test]
    fn max_below_min_rejected() {
        let err = write(
            &tree::repeat(3, 2, tree::ch('a')),
            OPT_NONE,
            Culture::invariant(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}
