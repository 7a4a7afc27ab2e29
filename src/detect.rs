//! Schema-free question detection over a loaded survey.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::classify::classify;
use crate::data::Survey;
use crate::error::Diagnostic;
use crate::grouping::group_headers;
use crate::header::match_header;
use crate::question::{QuestionGroup, QuestionType};

/// Block letter of the demographics section ("metryczka") in the source
/// questionnaires.
pub const DEMOGRAPHIC_BLOCK: char = 'M';

const METADATA_KEYWORDS: &[&str] = &[
    "weight",
    "waga",
    "wagi",
    "respondent id",
    "respondent_id",
    "interview",
    "numer wywiadu",
    "timestamp",
    "aranżacja",
    "imię",
    "nazwisko",
    "telefon",
    "kod pocztowy",
    "miejscowość",
    "[ogółem]",
    "wyniki dla",
    "makroregion",
    "segment",
];

/// Free-text "other, please specify" follow-ups.
const OPEN_ENDED_KEYWORDS: &[&str] = &[
    "inna, jaka",
    "inne (jakie",
    "other, specify",
    "other (specify",
    "other (please specify",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    pub questions: Vec<QuestionGroup>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Detection {
    pub fn question(&self, id: &str) -> Option<&QuestionGroup> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Groups the statistics engines accept.
    pub fn analyzable(&self) -> impl Iterator<Item = &QuestionGroup> {
        self.questions.iter().filter(|q| !q.is_skip())
    }

    /// Groups that need a human decision before reporting.
    pub fn needs_review(&self) -> impl Iterator<Item = &QuestionGroup> {
        self.questions.iter().filter(|q| q.is_skip())
    }

    pub fn type_counts(&self) -> BTreeMap<QuestionType, usize> {
        let mut counts = BTreeMap::new();
        for question in &self.questions {
            *counts.entry(question.question_type).or_insert(0) += 1;
        }
        counts
    }
}

/// Metadata columns carry respondent bookkeeping (weights, interview ids)
/// rather than answers. Headers with a question identifier never qualify.
pub fn is_metadata_header(header: &str) -> bool {
    if match_header(header).is_some() {
        return false;
    }
    let lowered = header.to_lowercase();
    METADATA_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// "Other, specify" follow-ups; matched even when the header carries an
/// identifier.
pub fn is_open_ended_header(header: &str) -> bool {
    let lowered = header.to_lowercase();
    OPEN_ENDED_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

fn excluded_column(
    survey: &Survey,
    column: usize,
    header: &str,
    seen: &mut BTreeMap<String, usize>,
) -> Option<Diagnostic> {
    if survey.weight_column() == Some(column) || is_metadata_header(header) {
        return Some(Diagnostic::MetadataColumn {
            column,
            header: header.to_string(),
        });
    }
    if is_open_ended_header(header) {
        return Some(Diagnostic::OpenEndedColumn {
            column,
            header: header.to_string(),
        });
    }
    let key = header.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    match seen.get(&key) {
        Some(&first) => Some(Diagnostic::DuplicateHeader {
            column,
            first,
            header: header.to_string(),
        }),
        None => {
            seen.insert(key, column);
            None
        }
    }
}

pub fn detect(survey: &Survey) -> Detection {
    let mut diagnostics = Vec::new();
    let mut candidates = Vec::with_capacity(survey.column_count());
    let mut seen = BTreeMap::new();
    for (column, header) in survey.headers().iter().enumerate() {
        match excluded_column(survey, column, header, &mut seen) {
            Some(diagnostic) => {
                debug!("{diagnostic}");
                diagnostics.push(diagnostic);
            }
            None => candidates.push((column, header.as_str())),
        }
    }

    let grouping = group_headers(&candidates);
    diagnostics.extend(grouping.anomalies);

    let mut questions = Vec::with_capacity(grouping.groups.len());
    for provisional in &grouping.groups {
        let values = provisional
            .columns
            .iter()
            .map(|&column| survey.column(column))
            .collect::<Vec<_>>();
        let mut question = classify(provisional, &values).apply_to(provisional);
        question.is_demographic = question.question_type == QuestionType::SingleChoice
            && question.id.starts_with(DEMOGRAPHIC_BLOCK);
        debug!(
            "Question '{}' ({} column(s)) classified as {}",
            question.id,
            question.columns.len(),
            question.question_type
        );
        if let (QuestionType::Skip, Some(reason)) = (question.question_type, &question.notes) {
            diagnostics.push(Diagnostic::AmbiguousDetection {
                question: question.id.clone(),
                reason: reason.clone(),
            });
        }
        questions.push(question);
    }

    let renamed = make_ids_unique(&mut questions);
    diagnostics.extend(renamed);

    info!("Auto-detected {} question group(s)", questions.len());
    Detection {
        questions,
        diagnostics,
    }
}

fn make_ids_unique(questions: &mut [QuestionGroup]) -> Vec<Diagnostic> {
    let mut seen = questions
        .iter()
        .map(|q| q.id.clone())
        .collect::<BTreeSet<_>>();
    let mut used: BTreeMap<String, usize> = BTreeMap::new();
    let mut diagnostics = Vec::new();
    for question in questions.iter_mut() {
        let occurrences = used.entry(question.id.clone()).or_insert(0);
        *occurrences += 1;
        if *occurrences == 1 {
            continue;
        }
        let mut suffix = *occurrences;
        let mut candidate = format!("{}_{suffix}", question.id);
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{suffix}", question.id);
        }
        seen.insert(candidate.clone());
        diagnostics.push(Diagnostic::DuplicateId {
            original: question.id.clone(),
            renamed: candidate.clone(),
        });
        question.id = candidate;
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_headers_require_no_identifier() {
        assert!(is_metadata_header("Waga"));
        assert!(is_metadata_header("Respondent ID"));
        assert!(!is_metadata_header("A3. How do you feel about your weight?"));
        assert!(!is_metadata_header("A1. Trust: govt"));
        assert!(is_metadata_header("Miejscowość"));
        assert!(is_metadata_header("Segmentacja rynku"));
    }

    #[test]
    fn open_ended_follow_ups_are_recognized() {
        assert!(is_open_ended_header("Inne (jakie?)"));
        assert!(is_open_ended_header("C4. Inna, jaka?"));
        assert!(is_open_ended_header("Other (please specify)"));
        assert!(!is_open_ended_header("C1. Which media do you use? Radio"));
    }

    #[test]
    fn duplicate_ids_receive_suffixes() {
        let mut questions = vec![
            QuestionGroup::provisional("A1", "x", vec![0], vec!["x".into()]),
            QuestionGroup::provisional("A1_2", "y", vec![1], vec!["y".into()]),
            QuestionGroup::provisional("A1", "z", vec![2], vec!["z".into()]),
        ];
        let diagnostics = make_ids_unique(&mut questions);
        assert_eq!(questions[2].id, "A1_3");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn demographics_block_flags_single_choice_questions() {
        let survey = Survey::from_raw(
            &["M1. Gender", "A1. Trust: govt"],
            &[vec!["female", "3"], vec!["male", "5"]],
        )
        .expect("survey");
        let detection = detect(&survey);
        let gender = detection.question("M1").expect("gender");
        assert!(gender.is_demographic);
        assert!(!detection.question("A1").expect("trust").is_demographic);
    }
}
