//! Question model: the configurable unit every engine works on.
//!
//! A [`QuestionGroup`] is produced by detection and can be patched by user
//! configuration. Groups are plain values; every transformation builds a new
//! group instead of editing one in place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of distinct categories that still renders as a pie chart.
pub const PIE_CHART_MAX_CATEGORIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    NumericScale,
    Likert,
    SingleChoice,
    MultipleChoice,
    Skip,
}

/// Analysis family of a question type. `skip` has no kind and never reaches
/// the statistics engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Scale,
    Categorical,
}

impl QuestionType {
    pub fn kind(self) -> Option<QuestionKind> {
        match self {
            QuestionType::NumericScale | QuestionType::Likert => Some(QuestionKind::Scale),
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                Some(QuestionKind::Categorical)
            }
            QuestionType::Skip => None,
        }
    }

    pub fn is_scale(self) -> bool {
        self.kind() == Some(QuestionKind::Scale)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::NumericScale => "numeric_scale",
            QuestionType::Likert => "likert",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Skip => "skip",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    HorizontalBarMeans,
    Pie,
    FrequencyBar,
    MultipleChoiceBar,
}

impl ChartType {
    /// Default rendering hint for a question type. `categories` only matters
    /// for single choice questions; pass `None` when it is unknown.
    pub fn default_for(question_type: QuestionType, categories: Option<usize>) -> Self {
        match question_type {
            QuestionType::NumericScale | QuestionType::Likert => ChartType::HorizontalBarMeans,
            QuestionType::MultipleChoice => ChartType::MultipleChoiceBar,
            QuestionType::SingleChoice => match categories {
                Some(n) if n <= PIE_CHART_MAX_CATEGORIES => ChartType::Pie,
                _ => ChartType::FrequencyBar,
            },
            QuestionType::Skip => ChartType::FrequencyBar,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::HorizontalBarMeans => "horizontal_bar_means",
            ChartType::Pie => "pie",
            ChartType::FrequencyBar => "frequency_bar",
            ChartType::MultipleChoiceBar => "multiple_choice_bar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub id: String,
    pub label: String,
    pub columns: Vec<usize>,
    pub column_labels: Vec<String>,
    pub question_type: QuestionType,
    pub chart_type: ChartType,
    #[serde(default)]
    pub is_demographic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_max: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scale_labels: BTreeMap<i64, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub special_values: BTreeSet<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl QuestionGroup {
    /// Provisional group as emitted by the grouper, before classification.
    pub fn provisional(
        id: impl Into<String>,
        label: impl Into<String>,
        columns: Vec<usize>,
        column_labels: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            columns,
            column_labels,
            question_type: QuestionType::Skip,
            chart_type: ChartType::FrequencyBar,
            is_demographic: false,
            scale_min: None,
            scale_max: None,
            scale_labels: BTreeMap::new(),
            special_values: BTreeSet::new(),
            notes: None,
        }
    }

    pub fn kind(&self) -> Option<QuestionKind> {
        self.question_type.kind()
    }

    pub fn is_skip(&self) -> bool {
        self.question_type == QuestionType::Skip
    }

    pub fn is_special(&self, value: i64) -> bool {
        self.special_values.contains(&value)
    }

    /// Pairs of (column index, sub-question label).
    pub fn items(&self) -> impl Iterator<Item = (usize, &str)> {
        self.columns
            .iter()
            .copied()
            .zip(self.column_labels.iter().map(String::as_str))
    }

    /// Text used to recognize the same question in another survey.
    pub fn matching_label(&self) -> &str {
        if self.label.trim().is_empty() {
            self.column_labels.first().map(String::as_str).unwrap_or("")
        } else {
            &self.label
        }
    }

    /// Checks the structural invariants a group must satisfy before it is
    /// handed to the engines. Returns a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("question has no columns".to_string());
        }
        if self.columns.len() != self.column_labels.len() {
            return Err(format!(
                "{} column(s) but {} column label(s)",
                self.columns.len(),
                self.column_labels.len()
            ));
        }
        let mut distinct = BTreeSet::new();
        if let Some(column) = self.columns.iter().find(|&&c| !distinct.insert(c)) {
            return Err(format!("column {column} is listed more than once"));
        }
        if let (Some(min), Some(max)) = (self.scale_min, self.scale_max) {
            if min >= max {
                return Err(format!("scale_min ({min}) must be below scale_max ({max})"));
            }
            if let Some(value) = self
                .special_values
                .iter()
                .find(|v| (min..=max).contains(*v))
            {
                return Err(format!(
                    "special value {value} lies inside the scale range {min}..={max}"
                ));
            }
        }
        Ok(())
    }

    /// [`QuestionGroup::validate`] plus a bounds check against a survey with
    /// `column_count` columns.
    pub fn validate_for(&self, column_count: usize) -> Result<(), String> {
        self.validate()?;
        match self.columns.iter().find(|&&c| c >= column_count) {
            Some(column) => Err(format!(
                "column {column} is outside the survey's {column_count} column(s)"
            )),
            None => Ok(()),
        }
    }
}
