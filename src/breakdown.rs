//! Demographic breakdown: one question's statistics per demographic
//! category, with a significance test per sub-question.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;

use crate::data::{Cell, Row, format_number};
use crate::error::{Diagnostic, Result, SurveyError};
use crate::question::{QuestionGroup, QuestionKind, QuestionType};
use crate::significance::{TestOutcome, chi_square_independence, kruskal_wallis, mann_whitney};
use crate::stats::{
    ItemSummary, Observation, StatisticsResult, compute_statistics, ensure_columns, format_metric,
    format_percent, observe,
};

/// Fewest effective answers a partition needs on an item to take part in
/// that item's significance test.
pub const MIN_PARTITION_SAMPLE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Sufficient,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownGroup {
    pub category: String,
    pub respondents: usize,
    pub weight: f64,
    /// One entry per sub-question, parallel to `statistics.items`.
    pub item_status: Vec<SampleStatus>,
    pub statistics: StatisticsResult,
}

impl BreakdownGroup {
    pub fn status(&self, idx: usize) -> SampleStatus {
        self.item_status
            .get(idx)
            .copied()
            .unwrap_or(SampleStatus::InsufficientData)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTest {
    pub column: usize,
    pub label: String,
    pub outcome: TestOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub question_id: String,
    pub demographic_id: String,
    pub groups: Vec<BreakdownGroup>,
    /// Rows left out because their demographic answer was missing or special.
    pub excluded_respondents: usize,
    pub tests: Vec<ItemTest>,
}

fn partition_key(demographic: &QuestionGroup, cell: &Cell) -> Option<String> {
    let key = match observe(demographic, cell) {
        Observation::Missing | Observation::Special => return None,
        Observation::Category(category) => category,
        Observation::Scale(value) => format_number(value),
        Observation::Mention(_) => cell.as_display(),
    };
    let key = key.trim().to_string();
    (!key.is_empty()).then_some(key)
}

fn partition<'a>(
    demographic: &QuestionGroup,
    rows: &[&'a Row],
) -> (BTreeMap<String, Vec<&'a Row>>, usize) {
    let mut partitions: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    let mut excluded = 0;
    for &row in rows {
        let key = demographic
            .columns
            .first()
            .and_then(|&column| row.cell(column))
            .and_then(|cell| partition_key(demographic, cell));
        match key {
            Some(key) => partitions.entry(key).or_default().push(row),
            None => excluded += 1,
        }
    }
    (partitions, excluded)
}

fn scale_sample(target: &QuestionGroup, column: usize, rows: &[&Row]) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| match observe(target, row.cell(column)?) {
            Observation::Scale(value) => Some(value),
            _ => None,
        })
        .collect()
}

/// Weighted contingency table: one row per answer category, one column per
/// partition.
fn contingency_table(
    target: &QuestionGroup,
    column: usize,
    partitions: &[&[&Row]],
) -> Vec<Vec<f64>> {
    let mut counts: Vec<BTreeMap<String, f64>> = Vec::with_capacity(partitions.len());
    for rows in partitions {
        let mut tally = BTreeMap::new();
        for row in rows.iter() {
            let Some(cell) = row.cell(column) else {
                continue;
            };
            let category = match observe(target, cell) {
                Observation::Category(category) => category,
                Observation::Mention(true) => "selected".to_string(),
                Observation::Mention(false) => "not selected".to_string(),
                Observation::Missing if target.question_type == QuestionType::MultipleChoice => {
                    "not selected".to_string()
                }
                _ => continue,
            };
            *tally.entry(category).or_insert(0.0) += row.weight();
        }
        counts.push(tally);
    }
    let categories = counts
        .iter()
        .flat_map(|tally| tally.keys().cloned())
        .collect::<BTreeSet<_>>();
    categories
        .iter()
        .map(|category| {
            counts
                .iter()
                .map(|tally| tally.get(category).copied().unwrap_or(0.0))
                .collect()
        })
        .collect()
}

fn item_test(target: &QuestionGroup, column: usize, usable: &[&[&Row]]) -> TestOutcome {
    match (target.kind(), usable.len()) {
        (_, 0 | 1) => TestOutcome::NotPerformed {
            reason: format!("fewer than two groups with at least {MIN_PARTITION_SAMPLE} answers"),
        },
        (Some(QuestionKind::Scale), 2) => mann_whitney(
            &scale_sample(target, column, usable[0]),
            &scale_sample(target, column, usable[1]),
        ),
        (Some(QuestionKind::Scale), _) => {
            let samples = usable
                .iter()
                .map(|rows| scale_sample(target, column, rows))
                .collect::<Vec<_>>();
            let refs = samples.iter().map(Vec::as_slice).collect::<Vec<_>>();
            kruskal_wallis(&refs)
        }
        (Some(QuestionKind::Categorical), _) => {
            chi_square_independence(&contingency_table(target, column, usable))
        }
        (None, _) => TestOutcome::NotPerformed {
            reason: "question is not analyzable".to_string(),
        },
    }
}

/// Splits `rows` by the answer to `demographic`'s first column and
/// aggregates `target` inside every category.
pub fn compute_breakdown(
    target: &QuestionGroup,
    demographic: &QuestionGroup,
    rows: &[&Row],
) -> Result<Breakdown> {
    for question in [target, demographic] {
        if question.is_skip() {
            return Err(SurveyError::SkippedQuestion(question.id.clone()));
        }
        ensure_columns(question, rows)?;
    }

    let (partitions, excluded_respondents) = partition(demographic, rows);
    debug!(
        "Breaking '{}' down by '{}': {} group(s), {} row(s) excluded",
        target.id,
        demographic.id,
        partitions.len(),
        excluded_respondents
    );

    let mut groups = Vec::with_capacity(partitions.len());
    for (category, members) in &partitions {
        let statistics = compute_statistics(target, members)?;
        let item_status = statistics
            .items
            .iter()
            .map(|item| {
                if item.effective_n < MIN_PARTITION_SAMPLE {
                    SampleStatus::InsufficientData
                } else {
                    SampleStatus::Sufficient
                }
            })
            .collect();
        groups.push(BreakdownGroup {
            category: category.clone(),
            respondents: members.len(),
            weight: statistics.total_weight,
            item_status,
            statistics,
        });
    }

    let members = partitions.values().collect::<Vec<_>>();
    let tests = target
        .items()
        .enumerate()
        .map(|(idx, (column, label))| {
            let usable = groups
                .iter()
                .zip(&members)
                .filter(|(group, _)| group.status(idx) == SampleStatus::Sufficient)
                .map(|(_, rows)| rows.as_slice())
                .collect::<Vec<_>>();
            ItemTest {
                column,
                label: label.to_string(),
                outcome: item_test(target, column, &usable),
            }
        })
        .collect();

    Ok(Breakdown {
        question_id: target.id.clone(),
        demographic_id: demographic.id.clone(),
        groups,
        excluded_respondents,
        tests,
    })
}

/// Picks the demographic dimensions for a crosstab run: the requested ids
/// when any are given, otherwise every analyzable group flagged
/// `is_demographic`.
pub fn demographic_dimensions<'a>(
    groups: &'a [QuestionGroup],
    requested: &[String],
) -> (Vec<&'a QuestionGroup>, Vec<Diagnostic>) {
    if requested.is_empty() {
        let flagged = groups
            .iter()
            .filter(|q| q.is_demographic && !q.is_skip())
            .collect();
        return (flagged, Vec::new());
    }
    let mut dimensions = Vec::with_capacity(requested.len());
    let mut diagnostics = Vec::new();
    for id in requested {
        match groups.iter().find(|q| &q.id == id && !q.is_skip()) {
            Some(group) => dimensions.push(group),
            None => diagnostics.push(Diagnostic::UnknownDemographic(id.clone())),
        }
    }
    (dimensions, diagnostics)
}

impl Breakdown {
    /// Headers and rows for one sub-question, one row per category.
    pub fn render_item(&self, idx: usize) -> (Vec<String>, Vec<Vec<String>>) {
        let mut headers = vec![
            self.demographic_id.clone(),
            "n".to_string(),
            "status".to_string(),
        ];
        let mut rows = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let Some(item) = group.statistics.items.get(idx) else {
                continue;
            };
            let status = match group.status(idx) {
                SampleStatus::Sufficient => "ok",
                SampleStatus::InsufficientData => "insufficient data",
            };
            let mut row = vec![
                group.category.clone(),
                item.effective_n.to_string(),
                status.to_string(),
            ];
            match &item.summary {
                ItemSummary::Scale(summary) => {
                    row.push(format_metric(summary.mean));
                    row.push(format_metric(summary.median));
                }
                ItemSummary::Distribution { categories } => {
                    row.push(
                        categories
                            .first()
                            .filter(|share| share.weight > 0.0)
                            .map(|share| share.category.clone())
                            .unwrap_or_else(|| "no data".to_string()),
                    );
                    row.push(format_percent(categories.first().map(|s| s.percent)));
                }
                ItemSummary::Selection(share) => row.push(format_percent(share.percent)),
            }
            rows.push(row);
        }
        let extra: &[&str] = match self.groups.first().and_then(|g| g.statistics.items.get(idx)) {
            Some(item) => match item.summary {
                ItemSummary::Scale(_) => &["mean", "median"],
                ItemSummary::Distribution { .. } => &["top category", "percent"],
                ItemSummary::Selection(_) => &["selected"],
            },
            None => &[],
        };
        headers.extend(extra.iter().map(|h| h.to_string()));
        (headers, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_cell;
    use crate::question::ChartType;
    use crate::significance::TestKind;

    fn question(id: &str, question_type: QuestionType, column: usize) -> QuestionGroup {
        QuestionGroup {
            question_type,
            chart_type: ChartType::default_for(question_type, None),
            ..QuestionGroup::provisional(id, id, vec![column], vec![id.to_string()])
        }
    }

    fn rows(data: &[(&str, &str)]) -> Vec<Row> {
        data.iter()
            .map(|(group, value)| Row::new(vec![parse_cell(group), parse_cell(value)]))
            .collect()
    }

    #[test]
    fn missing_and_special_demographics_exclude_rows() {
        let mut demographic = question("M1", QuestionType::SingleChoice, 0);
        demographic.special_values.insert(9);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[("a", "1"), ("a", "2"), ("", "3"), ("9", "4"), ("refused", "5")]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        assert_eq!(breakdown.groups.len(), 1);
        assert_eq!(breakdown.excluded_respondents, 3);
    }

    #[test]
    fn two_partitions_use_mann_whitney() {
        let demographic = question("M1", QuestionType::SingleChoice, 0);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[
            ("f", "1"),
            ("f", "2"),
            ("f", "3"),
            ("m", "7"),
            ("m", "8"),
            ("m", "9"),
        ]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        let test = breakdown.tests[0].outcome.test().expect("performed");
        assert_eq!(test.kind, TestKind::MannWhitney);
        assert_eq!(test.groups_tested, 2);
    }

    #[test]
    fn single_choice_targets_use_chi_square() {
        let demographic = question("M1", QuestionType::SingleChoice, 0);
        let target = question("B1", QuestionType::SingleChoice, 1);
        let data = rows(&[("f", "yes"), ("f", "yes"), ("m", "no"), ("m", "no"), ("m", "yes")]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        let test = breakdown.tests[0].outcome.test().expect("performed");
        assert_eq!(test.kind, TestKind::ChiSquare);
        assert_eq!(test.degrees_of_freedom, Some(1));
    }

    #[test]
    fn a_single_usable_partition_is_not_tested() {
        let demographic = question("M1", QuestionType::SingleChoice, 0);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[("f", "1"), ("f", "2"), ("m", "5")]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        assert_eq!(breakdown.groups[1].status(0), SampleStatus::InsufficientData);
        assert!(matches!(
            breakdown.tests[0].outcome,
            TestOutcome::NotPerformed { .. }
        ));
    }

    #[test]
    fn skip_demographic_is_rejected() {
        let demographic = question("M1", QuestionType::Skip, 0);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[("f", "1")]);
        let refs = data.iter().collect::<Vec<_>>();
        assert_eq!(
            compute_breakdown(&target, &demographic, &refs).unwrap_err(),
            SurveyError::SkippedQuestion("M1".to_string())
        );
    }

    #[test]
    fn dimensions_default_to_flagged_groups_and_report_unknown_ids() {
        let mut gender = question("M1", QuestionType::SingleChoice, 0);
        gender.is_demographic = true;
        let groups = vec![gender, question("A1", QuestionType::NumericScale, 1)];

        let (flagged, diagnostics) = demographic_dimensions(&groups, &[]);
        assert_eq!(flagged.len(), 1);
        assert!(diagnostics.is_empty());

        let requested = vec!["A1".to_string(), "M9".to_string()];
        let (chosen, diagnostics) = demographic_dimensions(&groups, &requested);
        assert_eq!(chosen[0].id, "A1");
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnknownDemographic("M9".to_string())]
        );
    }

    #[test]
    fn render_item_lists_every_category() {
        let demographic = question("M1", QuestionType::SingleChoice, 0);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[("f", "1"), ("f", "3"), ("m", "5")]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        let (headers, table) = breakdown.render_item(0);
        assert_eq!(headers, vec!["M1", "n", "status", "mean", "median"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0][3], "2");
    }

    #[test]
    fn partitions_without_usable_answers_are_marked_insufficient() {
        let demographic = question("M1", QuestionType::SingleChoice, 0);
        let target = question("A1", QuestionType::NumericScale, 1);
        let data = rows(&[
            ("a", "1"),
            ("a", "2"),
            ("b", "6"),
            ("b", "7"),
            ("c", "9"),
            ("c", "10"),
            ("d", ""),
            ("d", "don't know"),
            ("d", ""),
        ]);
        let refs = data.iter().collect::<Vec<_>>();
        let breakdown = compute_breakdown(&target, &demographic, &refs).expect("breakdown");
        let silent = &breakdown.groups[3];
        assert_eq!(silent.respondents, 3);
        assert_eq!(silent.statistics.items[0].effective_n, 0);
        assert_eq!(silent.status(0), SampleStatus::InsufficientData);

        let test = breakdown.tests[0].outcome.test().expect("performed");
        assert_eq!(test.groups_tested, 3);
        let (_, table) = breakdown.render_item(0);
        assert_eq!(table[3][2], "insufficient data");
        assert_eq!(table[0][2], "ok");
    }
}
