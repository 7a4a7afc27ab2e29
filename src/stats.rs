//! Weighted statistics for one question over one set of respondents.
//!
//! Every sub-question (column) of a group is aggregated independently.
//! Missing cells and special answers are excluded from the aggregates but
//! always counted among the respondents, so the exclusions stay visible.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::{is_mention, is_special_response, parse_likert};
use crate::data::{Cell, Row, Survey, format_number};
use crate::error::{Result, SurveyError};
use crate::question::{QuestionGroup, QuestionType};

const HALF_WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsResult {
    pub question_id: String,
    pub question_type: QuestionType,
    pub respondents: usize,
    pub total_weight: f64,
    pub items: Vec<ItemStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStatistics {
    pub column: usize,
    pub label: String,
    /// Every respondent in the subset, including excluded answers.
    pub respondents: usize,
    /// Respondents whose answer entered the aggregates.
    pub effective_n: usize,
    pub effective_weight: f64,
    pub missing: usize,
    pub special: usize,
    pub summary: ItemSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemSummary {
    Scale(ScaleSummary),
    Distribution { categories: Vec<CategoryShare> },
    Selection(SelectionShare),
}

/// `None` everywhere means "no data", never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleSummary {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: usize,
    pub weight: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionShare {
    pub selected: usize,
    pub selected_weight: f64,
    pub percent: Option<f64>,
}

impl ItemStatistics {
    pub fn scale(&self) -> Option<&ScaleSummary> {
        match &self.summary {
            ItemSummary::Scale(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn categories(&self) -> Option<&[CategoryShare]> {
        match &self.summary {
            ItemSummary::Distribution { categories } => Some(categories),
            _ => None,
        }
    }

    pub fn selection(&self) -> Option<&SelectionShare> {
        match &self.summary {
            ItemSummary::Selection(share) => Some(share),
            _ => None,
        }
    }
}

/// How one cell enters the aggregates of its question.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Observation {
    Missing,
    Special,
    Scale(f64),
    Category(String),
    Mention(bool),
}

pub(crate) fn observe(question: &QuestionGroup, cell: &Cell) -> Observation {
    match question.question_type {
        QuestionType::NumericScale | QuestionType::Likert => observe_scale(question, cell),
        QuestionType::SingleChoice => observe_category(question, cell),
        QuestionType::MultipleChoice => match cell {
            Cell::Missing => Observation::Missing,
            other => Observation::Mention(is_mention(other)),
        },
        QuestionType::Skip => Observation::Missing,
    }
}

fn observe_scale(question: &QuestionGroup, cell: &Cell) -> Observation {
    let value = match cell {
        Cell::Missing => return Observation::Missing,
        Cell::Number(n) => *n,
        Cell::Text(text) if is_special_response(text) => return Observation::Special,
        Cell::Text(text) => match parse_likert(text) {
            Some((value, _)) => value as f64,
            None => return Observation::Missing,
        },
    };
    if value.fract() == 0.0 && question.is_special(value as i64) {
        Observation::Special
    } else {
        Observation::Scale(value)
    }
}

fn observe_category(question: &QuestionGroup, cell: &Cell) -> Observation {
    match cell {
        Cell::Missing => Observation::Missing,
        Cell::Number(_) => match cell.as_integer() {
            Some(code) if question.is_special(code) => Observation::Special,
            Some(code) => Observation::Category(
                question
                    .scale_labels
                    .get(&code)
                    .cloned()
                    .unwrap_or_else(|| code.to_string()),
            ),
            None => Observation::Category(cell.as_display()),
        },
        Cell::Text(text) if is_special_response(text) => Observation::Special,
        Cell::Text(text) => Observation::Category(text.trim().to_string()),
    }
}

struct ItemAccumulator {
    column: usize,
    label: String,
    respondents: usize,
    missing: usize,
    special: usize,
    values: Vec<(f64, f64)>,
    categories: BTreeMap<String, (usize, f64)>,
    selected: usize,
    selected_weight: f64,
}

impl ItemAccumulator {
    fn new(column: usize, label: &str) -> Self {
        Self {
            column,
            label: label.to_string(),
            respondents: 0,
            missing: 0,
            special: 0,
            values: Vec::new(),
            categories: BTreeMap::new(),
            selected: 0,
            selected_weight: 0.0,
        }
    }

    fn add(&mut self, observation: Observation, weight: f64) {
        self.respondents += 1;
        match observation {
            Observation::Missing => self.missing += 1,
            Observation::Special => self.special += 1,
            Observation::Scale(value) => self.values.push((value, weight)),
            Observation::Category(category) => {
                let entry = self.categories.entry(category).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += weight;
            }
            Observation::Mention(selected) => {
                if selected {
                    self.selected += 1;
                    self.selected_weight += weight;
                }
            }
        }
    }

    fn finish(self, question: &QuestionGroup, total_weight: f64) -> ItemStatistics {
        let (effective_n, effective_weight, summary) = match question.question_type {
            QuestionType::MultipleChoice => (
                self.respondents,
                total_weight,
                ItemSummary::Selection(SelectionShare {
                    selected: self.selected,
                    selected_weight: self.selected_weight,
                    percent: percent_of(self.selected_weight, total_weight),
                }),
            ),
            QuestionType::SingleChoice => {
                let included: f64 = self.categories.values().map(|(_, w)| w).sum();
                let count: usize = self.categories.values().map(|(n, _)| n).sum();
                let categories = distribution(&self.categories, question, included);
                (count, included, ItemSummary::Distribution { categories })
            }
            _ => {
                let included: f64 = self.values.iter().map(|(_, w)| w).sum();
                (
                    self.values.len(),
                    included,
                    ItemSummary::Scale(scale_summary(&self.values)),
                )
            }
        };
        ItemStatistics {
            column: self.column,
            label: self.label,
            respondents: self.respondents,
            effective_n,
            effective_weight,
            missing: self.missing,
            special: self.special,
            summary,
        }
    }
}

fn percent_of(part: f64, whole: f64) -> Option<f64> {
    (whole > 0.0).then(|| part / whole * 100.0)
}

fn distribution(
    observed: &BTreeMap<String, (usize, f64)>,
    question: &QuestionGroup,
    included: f64,
) -> Vec<CategoryShare> {
    let mut shares = observed
        .iter()
        .filter(|(_, (_, weight))| *weight > 0.0)
        .map(|(category, (count, weight))| CategoryShare {
            category: category.clone(),
            count: *count,
            weight: *weight,
            percent: percent_of(*weight, included).unwrap_or(0.0),
        })
        .collect::<Vec<_>>();
    for (code, declared) in &question.scale_labels {
        if question.is_special(*code) || shares.iter().any(|s| &s.category == declared) {
            continue;
        }
        shares.push(CategoryShare {
            category: declared.clone(),
            count: 0,
            weight: 0.0,
            percent: 0.0,
        });
    }
    shares.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.category.cmp(&b.category))
    });
    shares
}

pub(crate) fn scale_summary(values: &[(f64, f64)]) -> ScaleSummary {
    ScaleSummary {
        mean: weighted_mean(values),
        median: weighted_median(values),
        std_dev: weighted_std_dev(values),
        min: values.iter().map(|(v, _)| *v).reduce(f64::min),
        max: values.iter().map(|(v, _)| *v).reduce(f64::max),
    }
}

/// Σ(w·x) / Σw over `(value, weight)` pairs.
pub fn weighted_mean(values: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    if values.is_empty() || total <= 0.0 {
        return None;
    }
    Some(values.iter().map(|(v, w)| v * w).sum::<f64>() / total)
}

/// First value whose cumulative weight passes half of the total weight.
/// When the cumulative weight lands exactly on the half, the value and its
/// successor are averaged, which reduces to the ordinary median for unit
/// weights.
pub fn weighted_median(values: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    if values.is_empty() || total <= 0.0 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = total / 2.0;
    let tolerance = HALF_WEIGHT_TOLERANCE * total.max(1.0);
    let mut cumulative = 0.0;
    for (idx, (value, weight)) in sorted.iter().enumerate() {
        cumulative += weight;
        if (cumulative - half).abs() <= tolerance {
            return Some(match sorted.get(idx + 1) {
                Some((next, _)) => (value + next) / 2.0,
                None => *value,
            });
        }
        if cumulative > half {
            return Some(*value);
        }
    }
    sorted.last().map(|(value, _)| *value)
}

/// Weighted population standard deviation; needs two or more values.
pub fn weighted_std_dev(values: &[(f64, f64)]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = weighted_mean(values)?;
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    let variance = values
        .iter()
        .map(|(v, w)| w * (v - mean) * (v - mean))
        .sum::<f64>()
        / total;
    Some(variance.max(0.0).sqrt())
}

pub(crate) fn ensure_columns(question: &QuestionGroup, rows: &[&Row]) -> Result<()> {
    let Some(available) = rows.first().map(|row| row.cells().len()) else {
        return Ok(());
    };
    match question.columns.iter().find(|&&column| column >= available) {
        Some(&column) => Err(SurveyError::ColumnOutOfRange {
            question: question.id.clone(),
            column,
            available,
        }),
        None => Ok(()),
    }
}

/// Aggregates `question` over `rows`, using each row's weight.
pub fn compute_statistics(question: &QuestionGroup, rows: &[&Row]) -> Result<StatisticsResult> {
    if question.is_skip() {
        return Err(SurveyError::SkippedQuestion(question.id.clone()));
    }
    ensure_columns(question, rows)?;

    let total_weight: f64 = rows.iter().map(|row| row.weight()).sum();
    let items = question
        .items()
        .map(|(column, label)| {
            let mut accumulator = ItemAccumulator::new(column, label);
            for row in rows {
                let cell = row.cell(column).unwrap_or(&Cell::Missing);
                accumulator.add(observe(question, cell), row.weight());
            }
            accumulator.finish(question, total_weight)
        })
        .collect();

    Ok(StatisticsResult {
        question_id: question.id.clone(),
        question_type: question.question_type,
        respondents: rows.len(),
        total_weight,
        items,
    })
}

/// Convenience wrapper over every row of the survey.
pub fn compute_survey_statistics(
    question: &QuestionGroup,
    survey: &Survey,
) -> Result<StatisticsResult> {
    compute_statistics(question, &survey.all_rows())
}

pub fn format_metric(metric: Option<f64>) -> String {
    metric
        .map(|value| {
            if value.fract() == 0.0 {
                format_number(value)
            } else {
                format!("{value:.2}")
            }
        })
        .unwrap_or_else(|| "no data".to_string())
}

pub fn format_percent(metric: Option<f64>) -> String {
    metric
        .map(|value| format!("{value:.1}%"))
        .unwrap_or_else(|| "no data".to_string())
}

impl StatisticsResult {
    /// Table headers matching [`StatisticsResult::render_rows`].
    pub fn render_headers(&self) -> Vec<String> {
        let names: &[&str] = match self.question_type {
            QuestionType::SingleChoice => &["item", "category", "n", "weight", "percent"],
            QuestionType::MultipleChoice => &["item", "selected", "weight", "percent"],
            _ => &["item", "n", "excluded", "mean", "median", "std_dev", "min", "max"],
        };
        names.iter().map(|name| name.to_string()).collect()
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for item in &self.items {
            match &item.summary {
                ItemSummary::Scale(summary) => rows.push(vec![
                    item.label.clone(),
                    item.effective_n.to_string(),
                    (item.missing + item.special).to_string(),
                    format_metric(summary.mean),
                    format_metric(summary.median),
                    format_metric(summary.std_dev),
                    format_metric(summary.min),
                    format_metric(summary.max),
                ]),
                ItemSummary::Distribution { categories } => {
                    if categories.is_empty() {
                        rows.push(vec![
                            item.label.clone(),
                            "no data".to_string(),
                            "0".to_string(),
                            "0".to_string(),
                            String::new(),
                        ]);
                    }
                    for share in categories {
                        rows.push(vec![
                            item.label.clone(),
                            share.category.clone(),
                            share.count.to_string(),
                            format!("{:.2}", share.weight),
                            format_percent(Some(share.percent)),
                        ]);
                    }
                }
                ItemSummary::Selection(share) => rows.push(vec![
                    item.label.clone(),
                    share.selected.to_string(),
                    format!("{:.2}", share.selected_weight),
                    format_percent(share.percent),
                ]),
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_cell;
    use crate::question::ChartType;

    fn row(values: &[&str], weight: f64) -> Row {
        Row::new(values.iter().map(|v| parse_cell(v)).collect()).with_weight(Some(weight))
    }

    fn question(question_type: QuestionType, columns: usize) -> QuestionGroup {
        QuestionGroup {
            question_type,
            chart_type: ChartType::default_for(question_type, None),
            ..QuestionGroup::provisional(
                "Q1",
                "Question",
                (0..columns).collect(),
                (0..columns).map(|c| format!("item {c}")).collect(),
            )
        }
    }

    #[test]
    fn weighted_median_averages_on_exact_half() {
        let unit = [(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (4.0, 1.0)];
        assert_eq!(weighted_median(&unit), Some(2.5));
        let odd = [(3.0, 1.0), (1.0, 1.0), (2.0, 1.0)];
        assert_eq!(weighted_median(&odd), Some(2.0));
        let weighted = [(8.0, 1.0), (3.0, 2.0)];
        assert_eq!(weighted_median(&weighted), Some(3.0));
        assert_eq!(weighted_median(&[]), None);
    }

    #[test]
    fn weighted_std_dev_needs_two_values() {
        assert_eq!(weighted_std_dev(&[(4.0, 1.0)]), None);
        let sd = weighted_std_dev(&[(2.0, 1.0), (4.0, 1.0)]).expect("sd");
        assert!((sd - 1.0).abs() < 1e-12);
    }

    #[test]
    fn likert_answers_exclude_special_codes() {
        let mut q = question(QuestionType::Likert, 1);
        q.special_values.insert(6);
        let rows = [
            row(&["4: rather agree"], 1.0),
            row(&["2: rather disagree"], 1.0),
            row(&["6: don't know"], 1.0),
            row(&[""], 1.0),
        ];
        let refs = rows.iter().collect::<Vec<_>>();
        let result = compute_statistics(&q, &refs).expect("stats");
        let item = &result.items[0];
        assert_eq!(item.respondents, 4);
        assert_eq!(item.effective_n, 2);
        assert_eq!(item.special, 1);
        assert_eq!(item.missing, 1);
        assert_eq!(item.scale().unwrap().mean, Some(3.0));
    }

    #[test]
    fn empty_scale_item_reports_no_data() {
        let q = question(QuestionType::NumericScale, 1);
        let rows = [row(&[""], 1.0), row(&["don't know"], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        let result = compute_statistics(&q, &refs).expect("stats");
        let summary = result.items[0].scale().unwrap();
        assert_eq!(summary.mean, None);
        assert_eq!(summary.median, None);
        assert_eq!(format_metric(summary.mean), "no data");
    }

    #[test]
    fn single_choice_distribution_includes_declared_categories() {
        let mut q = question(QuestionType::SingleChoice, 1);
        q.scale_labels.insert(1, "yes".to_string());
        q.scale_labels.insert(2, "no".to_string());
        q.scale_labels.insert(3, "maybe".to_string());
        let rows = [row(&["1"], 3.0), row(&["2"], 1.0), row(&[""], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        let result = compute_statistics(&q, &refs).expect("stats");
        let categories = result.items[0].categories().unwrap();
        let names = categories.iter().map(|c| c.category.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["yes", "no", "maybe"]);
        assert_eq!(categories[0].percent, 75.0);
        assert_eq!(categories[2].percent, 0.0);
        assert_eq!(result.items[0].effective_n, 2);
    }

    #[test]
    fn undeclared_categories_without_weight_are_omitted() {
        let q = question(QuestionType::SingleChoice, 1);
        let rows = [row(&["north"], 1.0), row(&["south"], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        let result = compute_statistics(&q, &refs).expect("stats");
        assert_eq!(result.items[0].categories().unwrap().len(), 2);
    }

    #[test]
    fn skip_questions_are_rejected() {
        let q = question(QuestionType::Skip, 1);
        let rows = [row(&["1"], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        assert_eq!(
            compute_statistics(&q, &refs).unwrap_err(),
            SurveyError::SkippedQuestion("Q1".to_string())
        );
    }

    #[test]
    fn dangling_columns_are_rejected() {
        let q = question(QuestionType::NumericScale, 3);
        let rows = [row(&["1", "2"], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        assert!(matches!(
            compute_statistics(&q, &refs).unwrap_err(),
            SurveyError::ColumnOutOfRange { column: 2, available: 2, .. }
        ));
    }

    #[test]
    fn render_rows_follow_question_type() {
        let q = question(QuestionType::NumericScale, 1);
        let rows = [row(&["2"], 1.0), row(&["4"], 1.0)];
        let refs = rows.iter().collect::<Vec<_>>();
        let result = compute_statistics(&q, &refs).expect("stats");
        assert_eq!(result.render_headers().len(), result.render_rows()[0].len());
        assert_eq!(result.render_rows()[0][3], "3");
    }
}
