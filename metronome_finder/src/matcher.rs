//! Matching of `foo.*.{a,b}.latency` query patterns against metric paths
use regex::Regex;

use crate::{Error, Result};

const DELIMITER: char = '.';

/// Outcome of testing one candidate path against a [`PathMatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult<'a> {
    NoMatch,
    /// The candidate is exactly the matched path
    Leaf(&'a str),
    /// The candidate lies below the matched path, which is returned without the remainder
    Branch(&'a str),
}

/// A compiled query pattern
///
/// `*` matches any run of characters within one path segment and `{a,b}` matches either
/// alternative. Alternatives may nest, as in `{a,{b,c}x}`. Everything else, including `,` outside
/// of braces, is matched literally.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
}

impl PathMatcher {
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }

        let mut body = String::with_capacity(pattern.len() * 2);
        let mut depth = 0usize;
        let mut buf = [0; 4];
        for c in pattern.chars() {
            match c {
                '{' => {
                    depth += 1;
                    body.push('(');
                }
                '}' if depth == 0 => return Err(invalid("unbalanced '}'")),
                '}' => {
                    depth -= 1;
                    body.push(')');
                }
                ',' if depth > 0 => body.push('|'),
                '*' => body.push_str(r"[^.]*"),
                c => body.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        if depth > 0 {
            return Err(invalid("unclosed '{'"));
        }

        let regex = Regex::new(&format!(r"^(?P<path>{body})(?P<extra>$|\..+$)"))
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self { regex })
    }

    /// Whether `pattern` contains no pattern syntax at all, in which case a set-membership test is
    /// all that is needed
    pub fn is_literal(pattern: &str) -> bool {
        !pattern.contains(['*', '{', '}'])
    }

    pub fn matches<'a>(&self, candidate: &'a str) -> MatchResult<'a> {
        let Some(caps) = self.regex.captures(candidate) else {
            return MatchResult::NoMatch;
        };
        let (Some(path), Some(extra)) = (caps.name("path"), caps.name("extra")) else {
            return MatchResult::NoMatch;
        };

        let path = &candidate[path.range()];
        if extra.as_str().starts_with(DELIMITER) {
            MatchResult::Branch(path)
        } else {
            MatchResult::Leaf(path)
        }
    }
}
