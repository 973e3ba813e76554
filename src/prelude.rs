// prelude.rs - Convenient re-exports.
//
//! # Prelude
//!
//! ```
//! use recurve::prelude::*;
//! use recurve::tree;
//!
//! let re = Regex::new(&tree::lit("answer")).unwrap();
//! assert!(re.is_match("the answer is 42").unwrap());
//! ```

pub use crate::api::{Group, Match, Regex, RegexBuilder};
pub use crate::charclass::CharClass;
pub use crate::code::Culture;
pub use crate::error::Error;
pub use crate::replace::Replacement;
pub use crate::tree::Node;
