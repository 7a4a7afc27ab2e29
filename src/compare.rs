//! Cross-survey question matching for scale questions.
//!
//! Two surveys rarely share question numbering, so scale groups are paired
//! by label similarity instead: a character-level diff ratio over a short,
//! normalized label prefix.

use itertools::{EitherOrBoth, Itertools};
use log::debug;
use serde::Serialize;
use similar::TextDiff;

use crate::data::Survey;
use crate::error::Result;
use crate::header::normalize_label;
use crate::question::QuestionGroup;
use crate::stats::{ItemStatistics, StatisticsResult, compute_survey_statistics, format_metric};

/// Labels are compared on this many leading characters after normalization.
pub const LABEL_PREFIX_CHARS: usize = 40;
pub const MIN_LABEL_SIMILARITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionPair<'a> {
    pub left: &'a QuestionGroup,
    pub right: &'a QuestionGroup,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyMatch<'a> {
    pub pairs: Vec<QuestionPair<'a>>,
    pub unmatched_left: Vec<&'a QuestionGroup>,
    pub unmatched_right: Vec<&'a QuestionGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonPair<'a> {
    pub left: &'a QuestionGroup,
    pub right: &'a QuestionGroup,
    pub similarity: f64,
    pub left_stats: StatisticsResult,
    pub right_stats: StatisticsResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison<'a> {
    pub pairs: Vec<ComparisonPair<'a>>,
    pub unmatched_left: Vec<&'a QuestionGroup>,
    pub unmatched_right: Vec<&'a QuestionGroup>,
}

/// Lower-cased, whitespace-collapsed label prefix used for matching.
pub fn match_key(question: &QuestionGroup) -> String {
    normalize_label(question.matching_label())
        .chars()
        .take(LABEL_PREFIX_CHARS)
        .collect()
}

/// Diff ratio in `[0, 1]`; an empty key never matches anything.
pub fn label_similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(left, right).ratio())
}

/// Greedy one-to-one pairing: each left scale question, in order, takes the
/// most similar right question still available (earliest on ties) when the
/// similarity reaches [`MIN_LABEL_SIMILARITY`].
pub fn match_across_surveys<'a>(
    left: &'a [QuestionGroup],
    right: &'a [QuestionGroup],
) -> SurveyMatch<'a> {
    let candidates = right
        .iter()
        .filter(|q| q.question_type.is_scale())
        .map(|q| (q, match_key(q)))
        .collect::<Vec<_>>();
    let mut taken = vec![false; candidates.len()];
    let mut pairs = Vec::new();
    let mut unmatched_left = Vec::new();

    for question in left.iter().filter(|q| q.question_type.is_scale()) {
        let key = match_key(question);
        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, candidate_key)) in candidates.iter().enumerate() {
            if taken[idx] {
                continue;
            }
            let similarity = label_similarity(&key, candidate_key);
            if similarity < MIN_LABEL_SIMILARITY {
                continue;
            }
            if best.is_none_or(|(_, top)| similarity > top) {
                best = Some((idx, similarity));
            }
        }
        match best {
            Some((idx, similarity)) => {
                taken[idx] = true;
                debug!(
                    "Matched '{}' with '{}' (similarity {similarity:.3})",
                    question.id, candidates[idx].0.id
                );
                pairs.push(QuestionPair {
                    left: question,
                    right: candidates[idx].0,
                    similarity,
                });
            }
            None => unmatched_left.push(question),
        }
    }

    let unmatched_right = candidates
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|((question, _), _)| *question)
        .collect();

    SurveyMatch {
        pairs,
        unmatched_left,
        unmatched_right,
    }
}

/// Matches the two surveys' scale questions and attaches full statistics
/// for both sides of every pair.
pub fn compare_surveys<'a>(
    left_survey: &Survey,
    left: &'a [QuestionGroup],
    right_survey: &Survey,
    right: &'a [QuestionGroup],
) -> Result<Comparison<'a>> {
    let matched = match_across_surveys(left, right);
    let pairs = matched
        .pairs
        .into_iter()
        .map(|pair| {
            Ok(ComparisonPair {
                left_stats: compute_survey_statistics(pair.left, left_survey)?,
                right_stats: compute_survey_statistics(pair.right, right_survey)?,
                left: pair.left,
                right: pair.right,
                similarity: pair.similarity,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Comparison {
        pairs,
        unmatched_left: matched.unmatched_left,
        unmatched_right: matched.unmatched_right,
    })
}

fn scale_cells(item: Option<&ItemStatistics>) -> [String; 2] {
    match item.and_then(ItemStatistics::scale) {
        Some(summary) => [format_metric(summary.mean), format_metric(summary.median)],
        None => [String::new(), String::new()],
    }
}

impl Comparison<'_> {
    pub fn render_headers(left_label: &str, right_label: &str) -> Vec<String> {
        vec![
            format!("{left_label} question"),
            format!("{right_label} question"),
            "similarity".to_string(),
            "item".to_string(),
            format!("{left_label} mean"),
            format!("{right_label} mean"),
            format!("{left_label} median"),
            format!("{right_label} median"),
        ]
    }

    /// One row per sub-question position; groups with different item counts
    /// leave the missing side blank.
    pub fn render_rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for pair in &self.pairs {
            for items in pair.left_stats.items.iter().zip_longest(&pair.right_stats.items) {
                let (left, right) = match items {
                    EitherOrBoth::Both(l, r) => (Some(l), Some(r)),
                    EitherOrBoth::Left(l) => (Some(l), None),
                    EitherOrBoth::Right(r) => (None, Some(r)),
                };
                let label = left.or(right).map(|i| i.label.clone()).unwrap_or_default();
                let [left_mean, left_median] = scale_cells(left);
                let [right_mean, right_median] = scale_cells(right);
                rows.push(vec![
                    pair.left.id.clone(),
                    pair.right.id.clone(),
                    format!("{:.2}", pair.similarity),
                    label,
                    left_mean,
                    right_mean,
                    left_median,
                    right_median,
                ]);
            }
        }
        rows
    }
}
