pub mod breakdown;
pub mod classify;
pub mod cli;
pub mod compare;
pub mod config;
pub mod data;
pub mod detect;
pub mod error;
pub mod grouping;
pub mod header;
pub mod io_utils;
pub mod loader;
pub mod question;
pub mod significance;
pub mod stats;
pub mod table;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info, warn};

use crate::cli::{Cli, Commands, InputOptions};
use crate::config::{SurveyConfig, apply_overrides};
use crate::data::Survey;
use crate::error::Diagnostic;
use crate::question::QuestionGroup;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("survey_analyzer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => handle_detect(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Crosstab(args) => handle_crosstab(&args),
        Commands::Compare(args) => handle_compare(&args),
    }
}

fn log_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        warn!("{diagnostic}");
    }
}

/// Loads a survey, detects its questions and applies the optional config.
fn prepare(
    input: &Path,
    config: Option<&Path>,
    options: &InputOptions,
) -> Result<(Survey, Vec<QuestionGroup>)> {
    info!(
        "Reading '{}' with delimiter '{}'",
        input.display(),
        printable_delimiter(io_utils::resolve_input_delimiter(input, options.delimiter))
    );
    let survey = loader::load_survey(input, &options.load_options())?;
    let detection = detect::detect(&survey);
    log_diagnostics(&detection.diagnostics);

    let questions = match config {
        Some(path) => {
            let config = SurveyConfig::load(path)
                .with_context(|| format!("Loading question config from {path:?}"))?;
            let overlay = apply_overrides(&detection.questions, &config, survey.column_count());
            log_diagnostics(&overlay.diagnostics);
            info!(
                "Applied {} override(s) from {path:?}",
                config.questions.len()
            );
            overlay.questions
        }
        None => detection.questions,
    };
    Ok((survey, questions))
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    let survey = loader::load_survey(&args.input, &args.options.load_options())?;
    let detection = detect::detect(&survey);
    log_diagnostics(&detection.diagnostics);

    let summary = detection
        .type_counts()
        .iter()
        .map(|(question_type, count)| format!("{question_type}: {count}"))
        .join(", ");
    info!("Question types: {summary}");
    let review = detection.needs_review().map(|q| q.id.as_str()).join(", ");
    if !review.is_empty() {
        warn!("Questions needing manual review: {review}");
    }

    SurveyConfig::from_questions(&detection.questions)
        .save(&args.output)
        .with_context(|| format!("Writing question config to {:?}", args.output))?;

    let headers = ["id", "type", "chart", "columns", "label"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = detection
        .questions
        .iter()
        .map(|q| {
            vec![
                q.id.clone(),
                q.question_type.to_string(),
                q.chart_type.as_str().to_string(),
                q.columns.len().to_string(),
                q.matching_label().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "Config for {} question(s) written to {:?}",
        detection.questions.len(),
        args.output
    );
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let (survey, questions) = prepare(&args.input, args.config.as_deref(), &args.options)?;
    if survey.is_weighted() {
        info!("Statistics are weighted by respondent weights");
    }
    let rows = survey.all_rows();
    let mut results = Vec::new();
    for question in questions.iter().filter(|q| !q.is_skip()) {
        let result = stats::compute_statistics(question, &rows)
            .with_context(|| format!("Computing statistics for '{}'", question.id))?;
        debug!("Computed statistics for '{}'", question.id);
        results.push((question, result));
    }

    if args.json {
        let payload = results.iter().map(|(_, result)| result).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    for (question, result) in &results {
        let title = format!(
            "{} {} [{}]",
            question.id,
            question.matching_label(),
            question.question_type
        );
        table::print_titled(&title, &result.render_headers(), &result.render_rows());
    }
    info!("Reported {} question(s)", results.len());
    Ok(())
}

fn handle_crosstab(args: &cli::CrosstabArgs) -> Result<()> {
    let (survey, questions) = prepare(&args.input, args.config.as_deref(), &args.options)?;
    let (dimensions, diagnostics) =
        breakdown::demographic_dimensions(&questions, &args.demographics);
    log_diagnostics(&diagnostics);
    if dimensions.is_empty() {
        bail!("No demographic questions to break down by; flag some in the config or pass --demographics");
    }

    let rows = survey.all_rows();
    let mut breakdowns = Vec::new();
    for dimension in &dimensions {
        for target in questions
            .iter()
            .filter(|q| !q.is_skip() && !q.is_demographic && q.id != dimension.id)
        {
            let result = breakdown::compute_breakdown(target, dimension, &rows).with_context(
                || format!("Breaking '{}' down by '{}'", target.id, dimension.id),
            )?;
            breakdowns.push(result);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&breakdowns)?);
        return Ok(());
    }
    for result in &breakdowns {
        for (idx, test) in result.tests.iter().enumerate() {
            let (headers, rows) = result.render_item(idx);
            let title = format!(
                "{} by {}: {}",
                result.question_id, result.demographic_id, test.label
            );
            table::print_titled(&title, &headers, &rows);
            println!("test: {}\n", test.outcome.describe());
        }
    }
    let significant = breakdowns
        .iter()
        .flat_map(|b| &b.tests)
        .filter(|t| t.outcome.is_significant())
        .count();
    info!(
        "Computed {} breakdown(s) across {} dimension(s); {significant} significant difference(s)",
        breakdowns.len(),
        dimensions.len()
    );
    Ok(())
}

fn handle_compare(args: &cli::CompareArgs) -> Result<()> {
    let (left_survey, left) = prepare(&args.left, args.left_config.as_deref(), &args.options)?;
    let (right_survey, right) =
        prepare(&args.right, args.right_config.as_deref(), &args.options)?;
    let comparison = compare::compare_surveys(&left_survey, &left, &right_survey, &right)
        .context("Comparing surveys")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }
    table::print_titled(
        &format!("{} vs {}", args.left_label, args.right_label),
        &compare::Comparison::render_headers(&args.left_label, &args.right_label),
        &comparison.render_rows(),
    );
    for (label, unmatched) in [
        (&args.left_label, &comparison.unmatched_left),
        (&args.right_label, &comparison.unmatched_right),
    ] {
        if !unmatched.is_empty() {
            println!(
                "Unmatched in {label}: {}",
                unmatched.iter().map(|q| q.id.as_str()).join(", ")
            );
        }
    }
    info!(
        "Matched {} scale question(s); {} and {} left unmatched",
        comparison.pairs.len(),
        comparison.unmatched_left.len(),
        comparison.unmatched_right.len()
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
