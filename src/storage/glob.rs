//! Glob pattern matcher for the KEYS command.
//!
//! Supported wildcards:
//! - `*` matches any sequence of characters, including the empty one
//! - `?` matches exactly one character
//!
//! Every other character matches itself. Matching is done per `char`, so
//! `?` consumes one Unicode scalar value rather than one byte.
//!
//! The matcher is iterative: on a mismatch it resumes from the most recent
//! `*`, letting that star absorb one more character. Only the latest star
//! needs remembering, which bounds the work at O(pattern * text) even for
//! patterns like `*a*a*a*a*b`.

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    tokens: Vec<char>,
    /// True when the pattern has no wildcard at all
    literal: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            tokens: pattern.chars().collect(),
            literal: !pattern.contains(|c: char| c == '*' || c == '?'),
        }
    }

    /// Returns true if the pattern is exactly `*`.
    pub fn matches_all(&self) -> bool {
        self.tokens.as_slice() == ['*']
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.matches_all() {
            return true;
        }
        if self.literal {
            return self.tokens.iter().copied().eq(text.chars());
        }

        let text: Vec<char> = text.chars().collect();
        let pattern = &self.tokens;

        let (mut p, mut t) = (0usize, 0usize);
        // (pattern index after the star, text index the star is anchored at)
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match pattern.get(p) {
                Some('*') => {
                    p += 1;
                    backtrack = Some((p, t));
                }
                Some('?') => {
                    p += 1;
                    t += 1;
                }
                Some(&c) if c == text[t] => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    Some((star_p, star_t)) => {
                        p = star_p;
                        t = star_t + 1;
                        backtrack = Some((star_p, t));
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}

/// Convenience wrapper for one-off matches.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    GlobPattern::new(pattern).matches(text)
}
