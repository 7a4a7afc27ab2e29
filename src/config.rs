//! User-editable question configuration.
//!
//! The configuration is a sparse patch over detection: every field of a
//! [`QuestionOverride`] is either absent (inherit the detected value) or
//! present (replace it). [`apply_overrides`] merges a [`SurveyConfig`] into
//! detected groups without touching them and reports every override it had
//! to reject.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;
use crate::question::{ChartType, QuestionGroup, QuestionType};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionOverride {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_demographic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_labels: Option<BTreeMap<i64, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_values: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl QuestionOverride {
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Override that pins every field of `question`.
    pub fn from_question(question: &QuestionGroup) -> Self {
        Self {
            id: question.id.clone(),
            label: Some(question.label.clone()),
            columns: Some(question.columns.clone()),
            column_labels: Some(question.column_labels.clone()),
            question_type: Some(question.question_type),
            chart_type: Some(question.chart_type),
            is_demographic: Some(question.is_demographic),
            scale_min: question.scale_min,
            scale_max: question.scale_max,
            scale_labels: (!question.scale_labels.is_empty())
                .then(|| question.scale_labels.clone()),
            special_values: (!question.special_values.is_empty())
                .then(|| question.special_values.clone()),
            notes: question.notes.clone(),
        }
    }

    /// Builds a question that detection never produced. Requires the label,
    /// the columns and the question type.
    fn to_question(&self) -> std::result::Result<QuestionGroup, String> {
        let (Some(label), Some(columns), Some(question_type)) =
            (&self.label, &self.columns, self.question_type)
        else {
            return Err(
                "unknown question id; defining a new question needs label, columns and question_type"
                    .to_string(),
            );
        };
        let column_labels = self.column_labels.clone().unwrap_or_else(|| {
            columns
                .iter()
                .map(|column| format!("column {column}"))
                .collect()
        });
        let base = QuestionGroup {
            question_type,
            chart_type: ChartType::default_for(question_type, None),
            ..QuestionGroup::provisional(self.id.clone(), label.clone(), columns.clone(), column_labels)
        };
        Ok(base.patched(self))
    }
}

impl QuestionGroup {
    /// New group equal to `self` with every field the override specifies
    /// replaced. A changed question type re-derives the chart hint and drops
    /// the detection note unless the override sets them too.
    pub fn patched(&self, patch: &QuestionOverride) -> QuestionGroup {
        let question_type = patch.question_type.unwrap_or(self.question_type);
        let type_changed = question_type != self.question_type;
        let chart_type = match patch.chart_type {
            Some(chart) => chart,
            None if type_changed => ChartType::default_for(question_type, None),
            None => self.chart_type,
        };
        let notes = match &patch.notes {
            Some(notes) => Some(notes.clone()),
            None if type_changed => None,
            None => self.notes.clone(),
        };
        QuestionGroup {
            id: self.id.clone(),
            label: patch.label.clone().unwrap_or_else(|| self.label.clone()),
            columns: patch.columns.clone().unwrap_or_else(|| self.columns.clone()),
            column_labels: patch
                .column_labels
                .clone()
                .unwrap_or_else(|| self.column_labels.clone()),
            question_type,
            chart_type,
            is_demographic: patch.is_demographic.unwrap_or(self.is_demographic),
            scale_min: patch.scale_min.or(self.scale_min),
            scale_max: patch.scale_max.or(self.scale_max),
            scale_labels: patch
                .scale_labels
                .clone()
                .unwrap_or_else(|| self.scale_labels.clone()),
            special_values: patch
                .special_values
                .clone()
                .unwrap_or_else(|| self.special_values.clone()),
            notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub questions: Vec<QuestionOverride>,
    /// Question ids used as breakdown dimensions. When present it replaces
    /// every `is_demographic` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical_questions: Option<Vec<String>>,
}

impl SurveyConfig {
    /// Full configuration pinning every detected question, ready for editing.
    pub fn from_questions(questions: &[QuestionGroup]) -> Self {
        Self {
            questions: questions.iter().map(QuestionOverride::from_question).collect(),
            categorical_questions: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: SurveyConfig =
            serde_yaml::from_reader(reader).context("Parsing question config YAML")?;
        if config.questions.is_empty() && config.categorical_questions.is_none() {
            bail!("Invalid config: missing or empty 'questions' section in {path:?}");
        }
        let categorical = config
            .categorical_questions
            .as_ref()
            .map(|ids| ids.iter().map(|id| id.trim().to_string()).collect());
        Ok(Self {
            categorical_questions: categorical,
            ..config
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing question config YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing question config to YAML string")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Overlay {
    pub questions: Vec<QuestionGroup>,
    pub diagnostics: Vec<Diagnostic>,
}

fn malformed(question: &str, reason: impl Into<String>) -> Diagnostic {
    Diagnostic::MalformedOverride {
        question: question.to_string(),
        reason: reason.into(),
    }
}

/// Merges `config` into `detected` for a survey with `column_count` columns.
/// Pure and idempotent: applying the result of one application again with
/// the same config changes nothing. A rejected override leaves the detected
/// group in place.
pub fn apply_overrides(
    detected: &[QuestionGroup],
    config: &SurveyConfig,
    column_count: usize,
) -> Overlay {
    let mut questions = detected.to_vec();
    let mut diagnostics = Vec::new();
    let mut seen = BTreeSet::new();

    for patch in &config.questions {
        if !seen.insert(patch.id.as_str()) {
            diagnostics.push(malformed(&patch.id, "duplicate override for the same id"));
            continue;
        }
        match questions.iter().position(|q| q.id == patch.id) {
            Some(pos) => {
                let merged = questions[pos].patched(patch);
                match merged.validate_for(column_count) {
                    Ok(()) => {
                        debug!("Applied override for '{}'", patch.id);
                        questions[pos] = merged;
                    }
                    Err(reason) => diagnostics.push(malformed(&patch.id, reason)),
                }
            }
            None => {
                let defined = patch
                    .to_question()
                    .and_then(|q| q.validate_for(column_count).map(|()| q));
                match defined {
                    Ok(question) => {
                        debug!("Override defines new question '{}'", question.id);
                        questions.push(question);
                    }
                    Err(reason) => diagnostics.push(malformed(&patch.id, reason)),
                }
            }
        }
    }

    if let Some(ids) = &config.categorical_questions {
        for id in ids {
            if !questions.iter().any(|q| &q.id == id) {
                diagnostics.push(malformed(
                    id,
                    "listed in categorical_questions but not defined",
                ));
            }
        }
        for question in &mut questions {
            question.is_demographic = ids.contains(&question.id);
        }
    }

    Overlay {
        questions,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: usize = 4;

    fn detected() -> Vec<QuestionGroup> {
        let mut trust = QuestionGroup::provisional(
            "A1",
            "Trust",
            vec![0, 1],
            vec!["govt".to_string(), "church".to_string()],
        );
        trust.question_type = QuestionType::NumericScale;
        trust.chart_type = ChartType::HorizontalBarMeans;
        trust.scale_min = Some(0);
        trust.scale_max = Some(10);

        let mut age =
            QuestionGroup::provisional("M2", "Age group", vec![2], vec!["Age group".to_string()]);
        age.question_type = QuestionType::SingleChoice;
        age.chart_type = ChartType::Pie;
        age.is_demographic = true;
        vec![trust, age]
    }

    #[test]
    fn sparse_override_keeps_detected_fields() {
        let mut patch = QuestionOverride::for_id("A1");
        patch.question_type = Some(QuestionType::Likert);
        let config = SurveyConfig {
            questions: vec![patch],
            categorical_questions: None,
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        let trust = &overlay.questions[0];
        assert_eq!(trust.question_type, QuestionType::Likert);
        assert_eq!(trust.columns, vec![0, 1]);
        assert_eq!(trust.label, "Trust");
        assert_eq!(trust.chart_type, ChartType::HorizontalBarMeans);
        assert!(overlay.diagnostics.is_empty());
    }

    #[test]
    fn changed_type_rederives_chart_unless_overridden() {
        let mut patch = QuestionOverride::for_id("A1");
        patch.question_type = Some(QuestionType::MultipleChoice);
        let base = &detected()[0];
        assert_eq!(base.patched(&patch).chart_type, ChartType::MultipleChoiceBar);

        patch.chart_type = Some(ChartType::FrequencyBar);
        assert_eq!(base.patched(&patch).chart_type, ChartType::FrequencyBar);
    }

    #[test]
    fn inconsistent_override_falls_back_to_detection() {
        let mut patch = QuestionOverride::for_id("A1");
        patch.scale_min = Some(7);
        patch.scale_max = Some(3);
        let config = SurveyConfig {
            questions: vec![patch],
            categorical_questions: None,
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        assert_eq!(overlay.questions, detected());
        assert!(matches!(
            &overlay.diagnostics[0],
            Diagnostic::MalformedOverride { question, .. } if question == "A1"
        ));
    }

    #[test]
    fn unknown_id_needs_a_complete_definition() {
        let partial = QuestionOverride {
            question_type: Some(QuestionType::Likert),
            ..QuestionOverride::for_id("Z9")
        };
        let complete = QuestionOverride {
            label: Some("Pride".to_string()),
            columns: Some(vec![3]),
            question_type: Some(QuestionType::NumericScale),
            ..QuestionOverride::for_id("Z8")
        };
        let config = SurveyConfig {
            questions: vec![partial, complete],
            categorical_questions: None,
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        assert_eq!(overlay.questions.len(), 3);
        let pride = &overlay.questions[2];
        assert_eq!(pride.id, "Z8");
        assert_eq!(pride.column_labels, vec!["column 3"]);
        assert_eq!(pride.chart_type, ChartType::HorizontalBarMeans);
        assert_eq!(overlay.diagnostics.len(), 1);
    }

    #[test]
    fn out_of_range_columns_keep_the_detected_group() {
        let moved = QuestionOverride {
            columns: Some(vec![0, 7]),
            column_labels: Some(vec!["govt".to_string(), "army".to_string()]),
            ..QuestionOverride::for_id("A1")
        };
        let repeated = QuestionOverride {
            label: Some("Repeated".to_string()),
            columns: Some(vec![3, 3]),
            question_type: Some(QuestionType::NumericScale),
            ..QuestionOverride::for_id("Z7")
        };
        let config = SurveyConfig {
            questions: vec![moved, repeated],
            categorical_questions: None,
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        assert_eq!(overlay.questions, detected());
        assert_eq!(overlay.diagnostics.len(), 2);
        assert!(matches!(
            &overlay.diagnostics[0],
            Diagnostic::MalformedOverride { question, reason }
                if question == "A1" && reason.contains("outside")
        ));
    }

    #[test]
    fn categorical_questions_replace_demographic_flags() {
        let config = SurveyConfig {
            questions: Vec::new(),
            categorical_questions: Some(vec!["A1".to_string(), "X1".to_string()]),
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        assert!(overlay.questions[0].is_demographic);
        assert!(!overlay.questions[1].is_demographic);
        assert_eq!(overlay.diagnostics.len(), 1);
    }

    #[test]
    fn duplicate_override_is_reported_and_ignored() {
        let first = QuestionOverride {
            label: Some("First".to_string()),
            ..QuestionOverride::for_id("A1")
        };
        let second = QuestionOverride {
            label: Some("Second".to_string()),
            ..QuestionOverride::for_id("A1")
        };
        let config = SurveyConfig {
            questions: vec![first, second],
            categorical_questions: None,
        };
        let overlay = apply_overrides(&detected(), &config, COLUMNS);
        assert_eq!(overlay.questions[0].label, "First");
        assert_eq!(overlay.diagnostics.len(), 1);
    }

    #[test]
    fn exported_config_reproduces_the_questions() {
        let questions = detected();
        let config = SurveyConfig::from_questions(&questions);
        let yaml = config.to_yaml_string().expect("yaml");
        let parsed: SurveyConfig = serde_yaml::from_str(&yaml).expect("parse");
        let overlay = apply_overrides(&questions, &parsed, COLUMNS);
        assert_eq!(overlay.questions, questions);
        assert!(overlay.diagnostics.is_empty());
    }
}
