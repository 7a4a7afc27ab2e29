mod common;

use survey_analyzer::error::SurveyError;
use survey_analyzer::question::QuestionType;
use survey_analyzer::stats::{compute_statistics, compute_survey_statistics};

use common::{question, survey};

#[test]
fn multiple_choice_uses_every_respondent_as_denominator() {
    let survey = survey(
        &["C1. Media: tv", "C1. Media: radio"],
        &[&["1", "1"], &["", "0"], &["", "1"], &["0", "1"]],
        &[],
    );
    let media = question("C1", "Media", QuestionType::MultipleChoice, &[0, 1]);
    let result = compute_survey_statistics(&media, &survey).expect("statistics");
    assert_eq!(result.respondents, 4);

    let tv = result.items[0].selection().expect("selection");
    assert_eq!(tv.selected, 1);
    assert_eq!(tv.percent, Some(25.0));

    let radio = result.items[1].selection().expect("selection");
    assert_eq!(radio.selected, 3);
    assert_eq!(radio.percent, Some(75.0));
}

#[test]
fn unit_weights_reduce_to_plain_mean_and_median() {
    let survey = survey(&["A1. Trust"], &[&["2"], &["9"], &["4"], &["5"]], &[]);
    let trust = question("A1", "Trust", QuestionType::NumericScale, &[0]);
    let result = compute_survey_statistics(&trust, &survey).expect("statistics");
    let summary = result.items[0].scale().expect("scale summary");
    assert_eq!(summary.mean, Some(5.0));
    assert_eq!(summary.median, Some(4.5));
    assert_eq!(summary.min, Some(2.0));
    assert_eq!(summary.max, Some(9.0));
}

#[test]
fn special_values_are_counted_but_not_aggregated() {
    let survey = survey(
        &["A1. Trust"],
        &[&["2"], &["4"], &["99"], &["don't know"], &[""]],
        &[1.0, 1.0, 5.0, 5.0, 5.0],
    );
    let mut trust = question("A1", "Trust", QuestionType::NumericScale, &[0]);
    trust.special_values.insert(99);
    let result = compute_survey_statistics(&trust, &survey).expect("statistics");
    let item = &result.items[0];
    assert_eq!(item.respondents, 5);
    assert_eq!(item.effective_n, 2);
    assert_eq!(item.effective_weight, 2.0);
    assert_eq!(item.special, 2);
    assert_eq!(item.missing, 1);
    assert_eq!(item.scale().and_then(|s| s.mean), Some(3.0));
    assert_eq!(result.total_weight, 17.0);
}

#[test]
fn weighted_median_follows_cumulative_weight() {
    let survey = survey(
        &["A1. Trust"],
        &[&["1"], &["5"], &["9"]],
        &[1.0, 1.0, 4.0],
    );
    let trust = question("A1", "Trust", QuestionType::NumericScale, &[0]);
    let result = compute_survey_statistics(&trust, &survey).expect("statistics");
    let summary = result.items[0].scale().expect("scale summary");
    assert_eq!(summary.median, Some(9.0));
    assert_eq!(summary.mean, Some(7.0));
}

#[test]
fn distribution_percentages_sum_to_one_hundred() {
    let survey = survey(
        &["M1. Region"],
        &[&["north"], &["south"], &["east"], &["north"], &["refused"], &["west"]],
        &[1.5, 0.7, 2.2, 1.1, 3.0, 0.4],
    );
    let region = question("M1", "Region", QuestionType::SingleChoice, &[0]);
    let result = compute_survey_statistics(&region, &survey).expect("statistics");
    let categories = result.items[0].categories().expect("distribution");
    let total: f64 = categories.iter().map(|c| c.percent).sum();
    assert!((total - 100.0).abs() < 1e-9, "sum was {total}");
    assert_eq!(categories[0].category, "north");
    assert!(categories.iter().all(|c| c.category != "refused"));
    assert_eq!(result.items[0].special, 1);
    assert!(categories.windows(2).all(|w| w[0].weight >= w[1].weight));
}

#[test]
fn subsets_are_aggregated_independently() {
    let survey = survey(&["A1. Trust"], &[&["2"], &["4"], &["9"]], &[]);
    let trust = question("A1", "Trust", QuestionType::NumericScale, &[0]);
    let subset = survey.rows().iter().take(2).collect::<Vec<_>>();
    let result = compute_statistics(&trust, &subset).expect("statistics");
    assert_eq!(result.respondents, 2);
    assert_eq!(result.items[0].scale().and_then(|s| s.mean), Some(3.0));
}

#[test]
fn skip_questions_and_dangling_columns_are_errors() {
    let survey = survey(&["A1. Trust"], &[&["2"]], &[]);
    let skipped = question("A1", "Trust", QuestionType::Skip, &[0]);
    assert_eq!(
        compute_survey_statistics(&skipped, &survey).unwrap_err(),
        SurveyError::SkippedQuestion("A1".to_string())
    );
    let dangling = question("A9", "Ghost", QuestionType::NumericScale, &[4]);
    assert!(matches!(
        compute_survey_statistics(&dangling, &survey).unwrap_err(),
        SurveyError::ColumnOutOfRange { column: 4, available: 1, .. }
    ));
}
