//! Shell-style filename matching

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled filespec such as `*.csv` or `report-[0-9]?.xlsx`.
#[derive(Debug, Clone)]
pub enum FileSpec {
    Glob(Pattern),
    /// Still rejected after normalising; matched as plain text.
    Literal(String),
}

impl FileSpec {
    pub fn new(spec: &str) -> Self {
        match Pattern::new(&normalize(spec)) {
            Ok(pattern) => FileSpec::Glob(pattern),
            Err(_) => FileSpec::Literal(spec.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            FileSpec::Glob(pattern) => pattern.matches_with(name, MATCH_OPTIONS),
            FileSpec::Literal(text) => text == name,
        }
    }
}

/// Rewrite shell wildcards into a form `glob` accepts: runs of `*` collapse
/// to one, and a `[` that never closes becomes a literal bracket.
fn normalize(spec: &str) -> String {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = String::with_capacity(spec.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
                i += 1;
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.extend(&chars[i..=end]);
                    i = end + 1;
                }
                None => {
                    out.push_str(&Pattern::escape("["));
                    i += 1;
                }
            },
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Index of the `]` closing the class opened at `start`. A `]` right after
/// `[` or `[!` is a member, not the end.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    chars[j..].iter().position(|&c| c == ']').map(|p| j + p)
}
