// replace.rs - The replacement mini-language.
//
// A replacement is compiled once into a literal table plus a rule list.
// Rules are single integers: a non-negative rule emits a literal table
// entry, a rule below -SPECIALS emits a capture group resolved through
// `-SPECIALS - 1 - r`, and the four values in [-SPECIALS, -1] emit the
// text around the match. Right-to-left application walks the rules
// backwards and emits reversed fragments into the accumulator, which is
// reversed once at the end; that way both directions append forward into
// the scratch buffer.

use crate::api::Match;
use crate::code::RegexCode;
use crate::error::Error;

pub(crate) const SPECIALS: i32 = 4;
pub(crate) const LEFT_PORTION: i32 = -1;
pub(crate) const RIGHT_PORTION: i32 = -2;
pub(crate) const LAST_GROUP: i32 = -3;
pub(crate) const WHOLE_STRING: i32 = -4;

#[inline]
fn group_rule(slot: i32) -> i32 {
    -SPECIALS - 1 - slot
}

#[inline]
fn rule_group(rule: i32) -> i32 {
    -SPECIALS - 1 - rule
}

/// A compiled replacement pattern.
#[derive(Clone, Debug)]
pub struct Replacement {
    pattern: String,
    strings: Vec<String>,
    rules: Vec<i32>,
}

impl Replacement {
    /// Parses the `$`-escape replacement syntax against a compiled
    /// program (group references resolve through its capture tables).
    ///
    /// Supported escapes: `$0`..`$n`, `${name}`, `$$`, `$&`, `` $` ``,
    /// `$'`, `$+`, `$_`.
    pub fn parse(rep: &str, code: &RegexCode) -> Result<Replacement, Error> {
        let mut strings = Vec::new();
        let mut rules = Vec::new();
        let mut literal = String::new();

        let mut flush = |literal: &mut String, rules: &mut Vec<i32>, strings: &mut Vec<String>| {
            if !literal.is_empty() {
                rules.push(strings.len() as i32);
                strings.push(std::mem::take(literal));
            }
        };

        let mut chars = rep.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('&') => {
                    chars.next();
                    flush(&mut literal, &mut rules, &mut strings);
                    rules.push(group_rule(0));
                }
                Some('`') => {
                    chars.next();
                    flush(&mut literal, &mut rules, &mut strings);
                    rules.push(LEFT_PORTION);
                }
                Some('\'') => {
                    chars.next();
                    flush(&mut literal, &mut rules, &mut strings);
                    rules.push(RIGHT_PORTION);
                }
                Some('+') => {
                    chars.next();
                    flush(&mut literal, &mut rules, &mut strings);
                    rules.push(LAST_GROUP);
                }
                Some('_') => {
                    chars.next();
                    flush(&mut literal, &mut rules, &mut strings);
                    rules.push(WHOLE_STRING);
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(nc) => name.push(nc),
                            None => {
                                return Err(Error::invalid("unterminated ${name} in replacement"))
                            }
                        }
                    }
                    let slot = if name.chars().all(|c| c.is_ascii_digit()) && !name.is_empty() {
                        name.parse::<i32>()
                            .ok()
                            .and_then(|n| code.map_capnum(n))
                    } else {
                        code.slot_from_name(&name)
                    };
                    match slot {
                        Some(slot) => {
                            flush(&mut literal, &mut rules, &mut strings);
                            rules.push(group_rule(slot));
                        }
                        None => {
                            return Err(Error::invalid(format!(
                                "replacement references undefined group {:?}",
                                name
                            )))
                        }
                    }
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut num: i64 = 0;
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() || num > i32::MAX as i64 {
                            break;
                        }
                        num = num * 10 + (d as i64 - '0' as i64);
                        chars.next();
                    }
                    if num > i32::MAX as i64 {
                        return Err(Error::invalid("replacement group number out of range"));
                    }
                    match code.map_capnum(num as i32) {
                        Some(slot) => {
                            flush(&mut literal, &mut rules, &mut strings);
                            rules.push(group_rule(slot));
                        }
                        None => {
                            return Err(Error::invalid(format!(
                                "replacement references undefined group {}",
                                num
                            )))
                        }
                    }
                }
                _ => literal.push('$'),
            }
        }
        flush(&mut literal, &mut rules, &mut strings);

        Ok(Replacement {
            pattern: rep.to_string(),
            strings,
            rules,
        })
    }

    /// The original replacement pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn emit(&self, rule: i32, m: &Match<'_>, out: &mut String) {
        if rule >= 0 {
            out.push_str(&self.strings[rule as usize]);
        } else if rule < -SPECIALS {
            if let Some(g) = m.group_by_slot(rule_group(rule)) {
                out.push_str(g);
            }
        } else {
            match rule {
                LEFT_PORTION => out.push_str(m.left_portion()),
                RIGHT_PORTION => out.push_str(m.right_portion()),
                LAST_GROUP => {
                    if let Some(g) = m.last_group_text() {
                        out.push_str(g);
                    }
                }
                WHOLE_STRING => out.push_str(m.whole_text()),
                _ => {}
            }
        }
    }

    /// Expands the replacement for one match, appending forward.
    pub(crate) fn expand(&self, m: &Match<'_>, out: &mut String) {
        for &rule in &self.rules {
            self.emit(rule, m, out);
        }
    }

    /// Right-to-left expansion: rules walk backwards, each fragment is
    /// appended reversed, and the caller reverses the accumulator once at
    /// the end.
    pub(crate) fn expand_rtl(&self, m: &Match<'_>, out: &mut String) {
        let mut scratch = String::new();
        for &rule in self.rules.iter().rev() {
            scratch.clear();
            self.emit(rule, m, &mut scratch);
            out.extend(scratch.chars().rev());
        }
    }
}
