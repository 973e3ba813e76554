// recurve - backtracking regular-expression bytecode core
//
// Module map:
//   tree.rs      -> pattern tree handed in by a front end
//   writer.rs    -> tree -> bytecode lowering, capture slot assignment
//   code.rs      -> opcodes, flags, options, the compiled program
//   prefix.rs    -> anchor / literal-prefix / first-char analysis
//   charclass.rs -> character class membership oracle
//   interp.rs    -> three-stack backtracking VM
//   scanner.rs   -> outer search loop, start-position skipping
//   matchrec.rs  -> capture record, balancing-group compaction
//   replace.rs   -> replacement mini-language
//   api.rs       -> Regex / Match / Group, runner cache

pub mod api;
pub mod charclass;
pub mod code;
pub mod error;
pub mod prefix;
pub mod prelude;
pub mod replace;
pub mod tree;
pub mod writer;

mod interp;
mod matchrec;
mod scanner;

pub use crate::api::{
    default_match_timeout, set_default_match_timeout, FindIter, Group, GroupsIter, Match, Regex,
    RegexBuilder,
};
pub use crate::charclass::CharClass;
pub use crate::code::{Culture, RegexCode};
pub use crate::error::Error;
pub use crate::replace::Replacement;
