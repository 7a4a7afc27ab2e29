//! Question type inference from column values.
//!
//! A [`GroupProfile`] accumulates what the cells of one provisional group
//! look like; [`GroupProfile::decide`] then applies the classification rules
//! in a fixed order:
//!
//! 1. integral numbers inside `0..=10` → `numeric_scale`
//! 2. `"<n>: label"` strings → `likert`
//! 3. several columns of mention markers → `multiple_choice`
//! 4. one column of at most 15 distinct strings → `single_choice`
//! 5. anything else → `skip`, with the reason kept for review
//!
//! Rule 1 only looks at cells that are already numeric, so Likert strings
//! never pass as numeric scales.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::data::Cell;
use crate::question::{ChartType, QuestionGroup, QuestionType};

pub const SCALE_VALUE_MIN: i64 = 0;
pub const SCALE_VALUE_MAX: i64 = 10;
pub const SINGLE_CHOICE_MAX_CATEGORIES: usize = 15;

/// Whole-cell answers that mean "no substantive answer".
const SPECIAL_RESPONSE_TOKENS: &[&str] = &[
    "-",
    "n/a",
    "n/d",
    "nd",
    "not applicable",
    "don't know",
    "dont know",
    "do not know",
    "refused",
    "hard to say",
    "nie wiem",
    "nie wiem/nie znam",
    "nie wiem/ nie znam",
    "trudno powiedzieć",
    "nie wiem, trudno powiedzieć",
    "nie wiem/ trudno powiedzieć",
    "odmowa",
    "odmowa odpowiedzi",
    "nie dotyczy",
];

/// Fragments that mark a Likert point as a special value.
const SPECIAL_LABEL_MARKERS: &[&str] = &[
    "don't know",
    "dont know",
    "do not know",
    "refus",
    "hard to say",
    "difficult to say",
    "nie wiem",
    "odmowa",
    "trudno",
];

const MENTION_POSITIVE: &[&str] = &[
    "mentioned",
    "selected",
    "yes",
    "true",
    "x",
    "wskazano",
    "wskazane",
];
const MENTION_NEGATIVE: &[&str] = &[
    "not mentioned",
    "not selected",
    "no",
    "false",
    "nie wskazano",
    "niewskazane",
];

fn likert_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(\d+)\s*:\s*(\S.*)$").expect("likert pattern compiles"))
}

pub fn is_special_response(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    SPECIAL_RESPONSE_TOKENS.contains(&lowered.as_str())
}

pub fn label_marks_special(label: &str) -> bool {
    let lowered = label.to_lowercase();
    SPECIAL_LABEL_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Splits a `"4: rather agree"` answer into its scale value and label.
pub fn parse_likert(text: &str) -> Option<(i64, &str)> {
    let captures = likert_regex().captures(text.trim())?;
    let value = captures.get(1)?.as_str().parse().ok()?;
    Some((value, captures.get(2)?.as_str().trim()))
}

/// True when the cell marks an option as chosen in a multiple choice block.
pub fn is_mention(cell: &Cell) -> bool {
    match cell {
        Cell::Number(n) => *n == 1.0,
        Cell::Text(text) => MENTION_POSITIVE.contains(&text.trim().to_lowercase().as_str()),
        Cell::Missing => false,
    }
}

/// Markers that only ever appear in multiple choice exports, unlike yes/no.
const EXPLICIT_MENTION_MARKERS: &[&str] = &[
    "mentioned",
    "not mentioned",
    "wskazano",
    "nie wskazano",
    "niewskazane",
];

fn is_explicit_mention_marker(text: &str) -> bool {
    EXPLICIT_MENTION_MARKERS.contains(&text.trim().to_lowercase().as_str())
}

fn is_mention_marker(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    MENTION_POSITIVE.contains(&lowered.as_str()) || MENTION_NEGATIVE.contains(&lowered.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub question_type: QuestionType,
    pub chart_type: ChartType,
    pub scale_min: Option<i64>,
    pub scale_max: Option<i64>,
    pub scale_labels: BTreeMap<i64, String>,
    pub special_values: BTreeSet<i64>,
    pub reason: Option<String>,
}

impl Classification {
    fn of_type(question_type: QuestionType, categories: Option<usize>) -> Self {
        Self {
            question_type,
            chart_type: ChartType::default_for(question_type, categories),
            scale_min: None,
            scale_max: None,
            scale_labels: BTreeMap::new(),
            special_values: BTreeSet::new(),
            reason: None,
        }
    }

    fn skip(reason: impl Into<String>) -> Self {
        let mut classification = Self::of_type(QuestionType::Skip, None);
        classification.reason = Some(reason.into());
        classification
    }

    fn with_bounds(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        if let (Some(min), Some(max)) = (min, max)
            && min < max
        {
            self.scale_min = Some(min);
            self.scale_max = Some(max);
        }
        self
    }

    /// New group carrying the provisional structure plus this classification.
    pub fn apply_to(self, group: &QuestionGroup) -> QuestionGroup {
        QuestionGroup {
            question_type: self.question_type,
            chart_type: self.chart_type,
            scale_min: self.scale_min,
            scale_max: self.scale_max,
            scale_labels: self.scale_labels,
            special_values: self.special_values,
            notes: self.reason,
            ..group.clone()
        }
    }
}

#[derive(Debug, Default)]
struct GroupProfile {
    columns: usize,
    observed: usize,
    numbers: usize,
    non_integral: usize,
    out_of_range: usize,
    number_min: Option<i64>,
    number_max: Option<i64>,
    texts: usize,
    likert: usize,
    mention_markers: usize,
    explicit_mentions: usize,
    distinct_texts: BTreeSet<String>,
    likert_labels: BTreeMap<i64, String>,
}

impl GroupProfile {
    fn new(columns: usize) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    fn update(&mut self, cell: &Cell) {
        match cell {
            Cell::Missing => {}
            Cell::Number(n) => {
                self.observed += 1;
                self.numbers += 1;
                if n.fract() != 0.0 {
                    self.non_integral += 1;
                    return;
                }
                let value = *n as i64;
                if !(SCALE_VALUE_MIN..=SCALE_VALUE_MAX).contains(&value) {
                    self.out_of_range += 1;
                }
                self.number_min = Some(self.number_min.map_or(value, |m| m.min(value)));
                self.number_max = Some(self.number_max.map_or(value, |m| m.max(value)));
            }
            Cell::Text(text) => {
                self.distinct_texts.insert(text.trim().to_string());
                if is_special_response(text) {
                    return;
                }
                self.observed += 1;
                self.texts += 1;
                if let Some((value, label)) = parse_likert(text) {
                    self.likert += 1;
                    self.likert_labels
                        .entry(value)
                        .or_insert_with(|| label.to_string());
                }
                if is_mention_marker(text) {
                    self.mention_markers += 1;
                }
                if is_explicit_mention_marker(text) {
                    self.explicit_mentions += 1;
                }
            }
        }
    }

    fn decide(self) -> Classification {
        if self.observed == 0 {
            return Classification::skip("no data");
        }
        if self.numbers == self.observed {
            return self.decide_numeric();
        }
        if self.texts == self.observed {
            return self.decide_text();
        }
        Classification::skip(format!(
            "mixed numeric and text values ({} numeric, {} text)",
            self.numbers, self.texts
        ))
    }

    fn decide_numeric(self) -> Classification {
        if self.non_integral > 0 {
            return Classification::skip(format!(
                "{} non-integer numeric value(s)",
                self.non_integral
            ));
        }
        if self.out_of_range > 0 {
            return Classification::skip(format!(
                "{} numeric value(s) outside the {SCALE_VALUE_MIN}..={SCALE_VALUE_MAX} scale range",
                self.out_of_range
            ));
        }
        Classification::of_type(QuestionType::NumericScale, None)
            .with_bounds(self.number_min, self.number_max)
    }

    fn decide_text(self) -> Classification {
        if self.likert == self.texts {
            return likert_classification(self.likert_labels);
        }
        if self.explicit_mentions == self.texts {
            return Classification::of_type(QuestionType::MultipleChoice, None);
        }
        if self.columns >= 2 {
            if self.mention_markers == self.texts {
                return Classification::of_type(QuestionType::MultipleChoice, None);
            }
            return Classification::skip(format!(
                "{} columns of free text cannot form one question",
                self.columns
            ));
        }
        let categories = self.distinct_texts.len();
        if categories > SINGLE_CHOICE_MAX_CATEGORIES {
            return Classification::skip(format!(
                "{categories} distinct values exceed the single choice limit of {SINGLE_CHOICE_MAX_CATEGORIES}"
            ));
        }
        Classification::of_type(QuestionType::SingleChoice, Some(categories))
    }
}

fn likert_classification(labels: BTreeMap<i64, String>) -> Classification {
    let special_values = labels
        .iter()
        .filter(|(_, label)| label_marks_special(label))
        .map(|(value, _)| *value)
        .collect::<BTreeSet<_>>();
    let regular = labels
        .keys()
        .copied()
        .filter(|value| !special_values.contains(value))
        .collect::<Vec<_>>();
    let (min, max) = if regular.is_empty() {
        (labels.keys().next().copied(), labels.keys().last().copied())
    } else {
        (regular.first().copied(), regular.last().copied())
    };

    let mut classification =
        Classification::of_type(QuestionType::Likert, None).with_bounds(min, max);
    if let (Some(lo), Some(hi)) = (classification.scale_min, classification.scale_max)
        && special_values.iter().any(|v| (lo..=hi).contains(v))
    {
        classification.scale_min = None;
        classification.scale_max = None;
        classification.reason =
            Some("special answers sit inside the scale range; bounds left unset".to_string());
    }
    classification.scale_labels = labels;
    classification.special_values = special_values;
    classification
}

/// Classifies one provisional group. `columns` holds the cells of each of the
/// group's columns, in the group's column order.
pub fn classify(group: &QuestionGroup, columns: &[Vec<&Cell>]) -> Classification {
    let mut profile = GroupProfile::new(group.columns.len());
    for cell in columns.iter().flatten() {
        profile.update(cell);
    }
    profile.decide()
}
