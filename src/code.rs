// code.rs - The compiled program representation.
//
// A program is a flat stream of 32-bit slots. Each instruction is a base
// opcode with direction/case flags folded into the same slot, followed by
// zero, one or two operand slots. Operands are char scalar values, string
// or class table indices, absolute code positions, or counts.

use std::collections::HashMap;
use std::fmt;

use crate::charclass::CharClass;
use crate::prefix::{BoyerMoore, FirstCharPrefix};

// === Options ===

pub type Options = u32;

pub const OPT_NONE: Options = 0;
pub const OPT_IGNORE_CASE: Options = 1 << 0;
pub const OPT_MULTILINE: Options = 1 << 1;
pub const OPT_EXPLICIT_CAPTURE: Options = 1 << 2;
pub const OPT_COMPILED: Options = 1 << 3;
pub const OPT_SINGLELINE: Options = 1 << 4;
pub const OPT_IGNORE_WHITESPACE: Options = 1 << 5;
pub const OPT_RIGHT_TO_LEFT: Options = 1 << 6;
pub const OPT_ECMASCRIPT: Options = 1 << 8;
pub const OPT_CULTURE_INVARIANT: Options = 1 << 9;

#[inline]
pub fn opt_ignore_case(options: Options) -> bool {
    options & OPT_IGNORE_CASE != 0
}

#[inline]
pub fn opt_right_to_left(options: Options) -> bool {
    options & OPT_RIGHT_TO_LEFT != 0
}

#[inline]
pub fn opt_ecmascript(options: Options) -> bool {
    options & OPT_ECMASCRIPT != 0
}

#[inline]
pub fn opt_culture_invariant(options: Options) -> bool {
    options & OPT_CULTURE_INVARIANT != 0
}

// === Culture ===

/// Lower-casing configuration used for case-insensitive comparison.
///
/// The engine folds exactly one way: through the bound culture's
/// lower-case mapping, applied at write time to pattern literals and at
/// run time to input characters.
#[derive(Clone, Copy)]
pub struct Culture {
    lower: fn(char) -> char,
}

fn invariant_lower(ch: char) -> char {
    // Simple (single-char) lowercase mapping; multi-char expansions keep
    // their original character, same as a code-unit-wise fold.
    let mut it = ch.to_lowercase();
    match (it.next(), it.next()) {
        (Some(l), None) => l,
        _ => ch,
    }
}

impl Culture {
    /// Culture-invariant simple lower-casing.
    pub fn invariant() -> Culture {
        Culture { lower: invariant_lower }
    }

    /// A culture with a custom lower-case mapping.
    pub fn with_lower(lower: fn(char) -> char) -> Culture {
        Culture { lower }
    }

    #[inline]
    pub fn lower(&self, ch: char) -> char {
        (self.lower)(ch)
    }
}

impl Default for Culture {
    fn default() -> Culture {
        Culture::invariant()
    }
}

impl fmt::Debug for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Culture").finish_non_exhaustive()
    }
}

// === Opcodes ===
//
// Base opcodes occupy the low six bits. RTL/CI describe the instruction
// itself and are stored in the code stream; BACK/BACK2 are never stored,
// they are ORed in at run time when an instruction is re-entered from the
// backtracking stack.

pub const ONEREP: i32 = 0;
pub const NOTONEREP: i32 = 1;
pub const SETREP: i32 = 2;
pub const ONELOOP: i32 = 3;
pub const NOTONELOOP: i32 = 4;
pub const SETLOOP: i32 = 5;
pub const ONELAZY: i32 = 6;
pub const NOTONELAZY: i32 = 7;
pub const SETLAZY: i32 = 8;
pub const ONE: i32 = 9;
pub const NOTONE: i32 = 10;
pub const SET: i32 = 11;
pub const MULTI: i32 = 12;
pub const REF: i32 = 13;
pub const BOL: i32 = 14;
pub const EOL: i32 = 15;
pub const BOUNDARY: i32 = 16;
pub const NONBOUNDARY: i32 = 17;
pub const BEGINNING: i32 = 18;
pub const START: i32 = 19;
pub const ENDZ: i32 = 20;
pub const END: i32 = 21;
pub const NOTHING: i32 = 22;
pub const LAZYBRANCH: i32 = 23;
pub const BRANCHMARK: i32 = 24;
pub const LAZYBRANCHMARK: i32 = 25;
pub const NULLCOUNT: i32 = 26;
pub const SETCOUNT: i32 = 27;
pub const BRANCHCOUNT: i32 = 28;
pub const LAZYBRANCHCOUNT: i32 = 29;
pub const NULLMARK: i32 = 30;
pub const SETMARK: i32 = 31;
pub const CAPTUREMARK: i32 = 32;
pub const GETMARK: i32 = 33;
pub const SETJUMP: i32 = 34;
pub const BACKJUMP: i32 = 35;
pub const FOREJUMP: i32 = 36;
pub const TESTREF: i32 = 37;
pub const GOTO: i32 = 38;
pub const STOP: i32 = 39;
pub const ECMABOUNDARY: i32 = 40;
pub const NONECMABOUNDARY: i32 = 41;

pub const OP_MASK: i32 = 63;
pub const RTL: i32 = 64;
pub const BACK: i32 = 128;
pub const BACK2: i32 = 256;
pub const CI: i32 = 512;

/// Number of code slots the instruction occupies (opcode + operands).
pub fn opcode_size(op: i32) -> usize {
    match op & OP_MASK {
        NOTHING | BOL | EOL | BOUNDARY | NONBOUNDARY | ECMABOUNDARY | NONECMABOUNDARY
        | BEGINNING | START | ENDZ | END | STOP | SETMARK | NULLMARK | GETMARK | SETJUMP
        | BACKJUMP | FOREJUMP => 1,
        ONE | NOTONE | SET | MULTI | REF | TESTREF | GOTO | LAZYBRANCH | BRANCHMARK
        | LAZYBRANCHMARK | NULLCOUNT | SETCOUNT => 2,
        ONEREP | NOTONEREP | SETREP | ONELOOP | NOTONELOOP | SETLOOP | ONELAZY | NOTONELAZY
        | SETLAZY | CAPTUREMARK | BRANCHCOUNT | LAZYBRANCHCOUNT => 3,
        _ => 1,
    }
}

/// True for instructions that push a backtracking frame. The writer counts
/// these to derive the program's required track size.
pub fn opcode_backtracks(op: i32) -> bool {
    matches!(
        op & OP_MASK,
        ONELOOP | NOTONELOOP | SETLOOP | ONELAZY | NOTONELAZY | SETLAZY | LAZYBRANCH
            | BRANCHMARK | LAZYBRANCHMARK | NULLCOUNT | SETCOUNT | BRANCHCOUNT
            | LAZYBRANCHCOUNT | NULLMARK | SETMARK | CAPTUREMARK | GETMARK | SETJUMP
            | BACKJUMP | FOREJUMP | GOTO
    )
}

pub(crate) fn opcode_name(op: i32) -> &'static str {
    match op & OP_MASK {
        ONEREP => "Onerep",
        NOTONEREP => "Notonerep",
        SETREP => "Setrep",
        ONELOOP => "Oneloop",
        NOTONELOOP => "Notoneloop",
        SETLOOP => "Setloop",
        ONELAZY => "Onelazy",
        NOTONELAZY => "Notonelazy",
        SETLAZY => "Setlazy",
        ONE => "One",
        NOTONE => "Notone",
        SET => "Set",
        MULTI => "Multi",
        REF => "Ref",
        BOL => "Bol",
        EOL => "Eol",
        BOUNDARY => "Boundary",
        NONBOUNDARY => "Nonboundary",
        BEGINNING => "Beginning",
        START => "Start",
        ENDZ => "EndZ",
        END => "End",
        NOTHING => "Nothing",
        LAZYBRANCH => "Lazybranch",
        BRANCHMARK => "Branchmark",
        LAZYBRANCHMARK => "Lazybranchmark",
        NULLCOUNT => "Nullcount",
        SETCOUNT => "Setcount",
        BRANCHCOUNT => "Branchcount",
        LAZYBRANCHCOUNT => "Lazybranchcount",
        NULLMARK => "Nullmark",
        SETMARK => "Setmark",
        CAPTUREMARK => "Capturemark",
        GETMARK => "Getmark",
        SETJUMP => "Setjump",
        BACKJUMP => "Backjump",
        FOREJUMP => "Forejump",
        TESTREF => "Testref",
        GOTO => "Goto",
        STOP => "Stop",
        ECMABOUNDARY => "ECMABoundary",
        NONECMABOUNDARY => "NonECMABoundary",
        _ => "?",
    }
}

// === Anchor bits ===
//
// Only the anchors the scanner can exploit to move or reject a candidate
// start position. Line and boundary anchors stay inside the program.

pub const ANCHOR_BEGINNING: u32 = 1 << 0;
pub const ANCHOR_START: u32 = 1 << 1;
pub const ANCHOR_END: u32 = 1 << 2;
pub const ANCHOR_ENDZ: u32 = 1 << 3;

// === RegexCode ===

/// An immutable compiled program. Construction happens once in the writer;
/// afterwards the program is read-only and may be shared freely between
/// threads and concurrently running interpreters.
pub struct RegexCode {
    /// Instruction stream. Jump operands are absolute indexes into this.
    pub codes: Vec<i32>,
    /// Literal string table (lowercased at write time for CI instructions).
    pub strings: Vec<String>,
    /// Character class table referenced by Set-family operands.
    pub classes: Vec<CharClass>,
    /// Worst-case number of backtracking frames a single pass can push.
    pub track_count: usize,
    /// Start-anchor summary consumed by the scanner.
    pub anchors: u32,
    /// Allowed first characters, when the analyzer could derive them.
    pub fc_prefix: Option<FirstCharPrefix>,
    /// Fixed literal prefix automaton, when one exists.
    pub bm_prefix: Option<BoyerMoore>,
    /// Whole-program scan direction.
    pub right_to_left: bool,
    /// Sparse group number -> dense slot mapping; `None` when the declared
    /// numbers are already the contiguous range `0..cap_size`.
    pub caps: Option<HashMap<i32, i32>>,
    /// Dense capture slot count (including group 0).
    pub cap_size: i32,
    /// Group name -> declared group number.
    pub cap_names: Option<HashMap<String, i32>>,
    /// Options the program was written under.
    pub options: Options,
    /// Culture bound at write time for case-insensitive folding.
    pub culture: Culture,
}

impl RegexCode {
    /// Maps a declared group number to its dense slot, if the group exists.
    #[inline]
    pub fn map_capnum(&self, capnum: i32) -> Option<i32> {
        match &self.caps {
            Some(caps) => caps.get(&capnum).copied(),
            None => {
                if capnum >= 0 && capnum < self.cap_size {
                    Some(capnum)
                } else {
                    None
                }
            }
        }
    }

    /// Resolves a group name to its dense slot.
    pub fn slot_from_name(&self, name: &str) -> Option<i32> {
        let num = *self.cap_names.as_ref()?.get(name)?;
        self.map_capnum(num)
    }
}

impl fmt::Debug for RegexCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RegexCode {{ track_count: {}, anchors: {:#x}, rtl: {}, cap_size: {} }}",
            self.track_count, self.anchors, self.right_to_left, self.cap_size)?;
        let mut pos = 0usize;
        while pos < self.codes.len() {
            let op = self.codes[pos];
            let size = opcode_size(op);
            write!(f, "{:4}: {}", pos, opcode_name(op))?;
            if op & CI != 0 {
                write!(f, "-Ci")?;
            }
            if op & RTL != 0 {
                write!(f, "-Rtl")?;
            }
            for i in 1..size {
                write!(f, " {}", self.codes[pos + i])?;
            }
            writeln!(f)?;
            pos += size;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_sizes() {
        assert_eq!(opcode_size(STOP), 1);
        assert_eq!(opcode_size(ONE), 2);
        assert_eq!(opcode_size(ONE | CI | RTL), 2);
        assert_eq!(opcode_size(ONELOOP), 3);
        assert_eq!(opcode_size(CAPTUREMARK), 3);
        assert_eq!(opcode_size(BRANCHCOUNT), 3);
        assert_eq!(opcode_size(SETMARK), 1);
        assert_eq!(opcode_size(LAZYBRANCH), 2);
    }

    #[test]
    fn backtracking_opcodes() {
        assert!(opcode_backtracks(ONELOOP));
        assert!(opcode_backtracks(CAPTUREMARK));
        assert!(opcode_backtracks(GOTO));
        assert!(!opcode_backtracks(ONE));
        assert!(!opcode_backtracks(STOP));
        assert!(!opcode_backtracks(BOUNDARY));
    }

    #[test]
    fn flags_do_not_collide_with_opcodes() {
        for op in [ONEREP, STOP, NONECMABOUNDARY] {
            assert_eq!(op & OP_MASK, op);
            assert_eq!(op & (RTL | BACK | BACK2 | CI), 0);
        }
    }

    #[test]
    fn invariant_culture_lowers() {
        let c = Culture::invariant();
        assert_eq!(c.lower('A'), 'a');
        assert_eq!(c.lower('Λ'), 'λ');
        assert_eq!(c.lower('7'), '7');
    }

    #[test]
    fn map_capnum_dense_and_sparse() {
        let mut code = RegexCode {
            codes: vec![],
            strings: vec![],
            classes: vec![],
            track_count: 0,
            anchors: 0,
            fc_prefix: None,
            bm_prefix: None,
            right_to_left: false,
            caps: None,
            cap_size: 3,
            cap_names: None,
            options: OPT_NONE,
            culture: Culture::invariant(),
        };
        assert_eq!(code.map_capnum(2), Some(2));
        assert_eq!(code.map_capnum(3), None);

        let mut caps = HashMap::new();
        caps.insert(0, 0);
        caps.insert(5, 1);
        code.caps = Some(caps);
        code.cap_size = 2;
        assert_eq!(code.map_capnum(5), Some(1));
        assert_eq!(code.map_capnum(1), None);
    }
}
