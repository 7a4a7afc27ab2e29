//! Loading a survey export into a [`Survey`].

use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::data::{Row, Survey, parse_cell};
use crate::io_utils;

/// Header names recognized as the respondent weight when none is given.
pub const WEIGHT_HEADERS: &[&str] = &["weight", "waga", "wagi"];

#[derive(Debug, Clone, Default)]
pub struct LoadOptions<'a> {
    pub delimiter: Option<u8>,
    pub encoding: Option<&'a str>,
    pub weight_column: Option<&'a str>,
}

fn find_weight_column(headers: &[String], requested: Option<&str>) -> Result<Option<usize>> {
    let position = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name.trim()))
    };
    match requested {
        Some(name) => match position(name) {
            Some(idx) => Ok(Some(idx)),
            None => bail!("Weight column '{name}' not found in the header row"),
        },
        None => Ok(WEIGHT_HEADERS.iter().find_map(|name| position(name))),
    }
}

fn parse_weight(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
}

pub fn load_survey(path: &Path, options: &LoadOptions<'_>) -> Result<Survey> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let encoding = io_utils::resolve_encoding(options.encoding)?;
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    let weight_column = find_weight_column(&headers, options.weight_column)?;
    if let Some(idx) = weight_column {
        debug!("Using column {idx} ('{}') as respondent weight", headers[idx]);
    }

    let mut rows = Vec::new();
    let mut rejected_weights = 0usize;
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let fields = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", idx + 2))?;
        let weight = weight_column.and_then(|column| {
            let raw = fields.get(column).map(String::as_str).unwrap_or("");
            let parsed = parse_weight(raw);
            if parsed.is_none() {
                debug!("Row {}: weight '{raw}' replaced by the default", idx + 2);
                rejected_weights += 1;
            }
            parsed
        });
        let cells = fields.iter().map(|field| parse_cell(field)).collect();
        rows.push(Row::new(cells).with_weight(weight));
    }
    if rejected_weights > 0 {
        warn!("{rejected_weights} row(s) had a missing or invalid weight; using 1.0 for them");
    }

    let survey = Survey::new(headers, rows)
        .with_context(|| format!("Loading survey from {path:?}"))?
        .with_weight_column(weight_column);
    info!(
        "Loaded {} respondent(s) across {} column(s) from {path:?}",
        survey.row_count(),
        survey.column_count()
    );
    Ok(survey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_column_is_found_by_name() {
        let headers = vec!["A1. Trust".to_string(), " Waga ".to_string()];
        assert_eq!(find_weight_column(&headers, None).unwrap(), Some(1));
        assert_eq!(find_weight_column(&headers, Some("waga")).unwrap(), Some(1));
        assert!(find_weight_column(&headers, Some("w8")).is_err());
        assert_eq!(find_weight_column(&headers[..1], None).unwrap(), None);
    }

    #[test]
    fn weights_accept_decimal_commas_and_reject_non_positive() {
        assert_eq!(parse_weight("1,5"), Some(1.5));
        assert_eq!(parse_weight(" 2 "), Some(2.0));
        assert_eq!(parse_weight("0"), None);
        assert_eq!(parse_weight("-1"), None);
        assert_eq!(parse_weight("n/a"), None);
    }
}
