//! Question identifier recognition in column headers.
//!
//! Survey exports label the first column of every question with an
//! identifier such as `A1.`, `B3a.` or `M2)`, followed by the question text.
//! Columns without an identifier continue the previous question.

use std::sync::OnceLock;

use itertools::Itertools;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatch {
    /// Normalized identifier: upper-case block letter, digits, lower-case suffix.
    pub id: String,
    /// Parent question text, without the identifier.
    pub label: String,
    /// First sub-item when the header carries `parent: item` text.
    pub sub_label: Option<String>,
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*([A-Za-z])(\d+)([A-Za-z]?)[.):]\s*(\S.*)$")
            .expect("identifier pattern compiles")
    })
}

fn stem_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^(.+?)([.?!:;])\s+(\S.*)$").expect("stem pattern compiles")
    })
}

/// Recognizes `<letter><digits><optional suffix><separator><text>` headers.
pub fn match_header(header: &str) -> Option<HeaderMatch> {
    let captures = identifier_regex().captures(header)?;
    let id = format!(
        "{}{}{}",
        captures[1].to_ascii_uppercase(),
        &captures[2],
        captures[3].to_ascii_lowercase()
    );
    let text = captures[4].trim();
    let (label, sub_label) = split_stem(text);
    Some(HeaderMatch {
        id,
        label,
        sub_label,
    })
}

/// Splits `"Trust: govt"` into the parent stem `"Trust"` and the sub-item
/// `"govt"`. Question marks and exclamation marks stay on the stem.
pub fn split_stem(text: &str) -> (String, Option<String>) {
    match stem_regex().captures(text) {
        Some(captures) => {
            let stem = captures[1].trim();
            let punctuation = &captures[2];
            let label = match punctuation {
                "?" | "!" => format!("{stem}{punctuation}"),
                _ => stem.to_string(),
            };
            (label, Some(captures[3].trim().to_string()))
        }
        None => (text.to_string(), None),
    }
}

/// Case-folded, whitespace-collapsed form used for label comparisons.
pub fn normalize_label(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}
