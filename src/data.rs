use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SurveyError};

pub const DEFAULT_WEIGHT: f64 = 1.0;

/// One survey answer as read from the input table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer value of a numeric cell, if it has no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
            .map(|n| n as i64)
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn parse_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_missing_token(trimmed) {
        return Cell::Missing;
    }
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => Cell::Number(number),
        _ => Cell::Text(trimmed.to_string()),
    }
}

fn is_missing_token(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "nan" | "none" | "null"
    )
}

/// One respondent's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<Cell>,
    weight: Option<f64>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            weight: None,
        }
    }

    /// Attach a respondent weight. Non-finite or non-positive weights are
    /// dropped and the row falls back to [`DEFAULT_WEIGHT`].
    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight.filter(|w| w.is_finite() && *w > 0.0);
        self
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn has_explicit_weight(&self) -> bool {
        self.weight.is_some()
    }
}

/// Headers plus the immutable row set of one loaded survey.
#[derive(Debug, Clone, PartialEq)]
pub struct Survey {
    headers: Vec<String>,
    rows: Vec<Row>,
    weight_column: Option<usize>,
}

impl Survey {
    /// Validates the table shape before any detection work happens. Short
    /// rows are padded with [`Cell::Missing`]; long rows are rejected.
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        if headers.is_empty() {
            return Err(SurveyError::NoColumns);
        }
        if rows.is_empty() {
            return Err(SurveyError::NoRows);
        }
        let expected = headers.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                let found = row.cells.len();
                if found > expected {
                    return Err(SurveyError::RaggedRow {
                        row: idx + 1,
                        expected,
                        found,
                    });
                }
                row.cells.resize(expected, Cell::Missing);
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            headers,
            rows,
            weight_column: None,
        })
    }

    /// Marks the column the row weights were read from, so detection treats
    /// it as metadata. Indices past the header are ignored.
    pub fn with_weight_column(mut self, column: Option<usize>) -> Self {
        self.weight_column = column.filter(|&idx| idx < self.headers.len());
        self
    }

    pub fn weight_column(&self) -> Option<usize> {
        self.weight_column
    }

    /// Builds a survey from raw string fields, one inner vector per row.
    pub fn from_raw<S: AsRef<str>>(headers: &[S], rows: &[Vec<S>]) -> Result<Self> {
        let headers = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let rows = rows
            .iter()
            .map(|fields| Row::new(fields.iter().map(|f| parse_cell(f.as_ref())).collect()))
            .collect();
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn header(&self, column: usize) -> Option<&str> {
        self.headers.get(column).map(String::as_str)
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Borrowed view of every row, the usual input for the engines.
    pub fn all_rows(&self) -> Vec<&Row> {
        self.rows.iter().collect()
    }

    /// Values of one column in row order.
    pub fn column(&self, column: usize) -> Vec<&Cell> {
        self.rows
            .iter()
            .map(|row| row.cell(column).unwrap_or(&Cell::Missing))
            .collect()
    }

    pub fn is_weighted(&self) -> bool {
        self.rows.iter().any(Row::has_explicit_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_recognizes_numbers_text_and_missing() {
        assert_eq!(parse_cell(" 7 "), Cell::Number(7.0));
        assert_eq!(parse_cell("2.5"), Cell::Number(2.5));
        assert_eq!(parse_cell(""), Cell::Missing);
        assert_eq!(parse_cell("NaN"), Cell::Missing);
        assert_eq!(
            parse_cell("4: rather agree"),
            Cell::Text("4: rather agree".to_string())
        );
        assert_eq!(parse_cell("inf"), Cell::Text("inf".to_string()));
    }

    #[test]
    fn cell_display_drops_integral_fraction() {
        assert_eq!(Cell::Number(3.0).as_display(), "3");
        assert_eq!(Cell::Number(3.25).as_display(), "3.25");
        assert_eq!(Cell::Missing.as_display(), "");
    }

    #[test]
    fn row_weight_defaults_and_rejects_non_positive() {
        let row = Row::new(vec![Cell::Number(1.0)]);
        assert_eq!(row.weight(), 1.0);
        assert_eq!(row.clone().with_weight(Some(2.5)).weight(), 2.5);
        assert_eq!(row.clone().with_weight(Some(0.0)).weight(), 1.0);
        assert_eq!(row.with_weight(Some(f64::NAN)).weight(), 1.0);
    }

    #[test]
    fn survey_rejects_empty_shapes() {
        let empty: Vec<Vec<&str>> = Vec::new();
        assert_eq!(
            Survey::from_raw::<&str>(&[], &[vec![]]).unwrap_err(),
            SurveyError::NoColumns
        );
        assert_eq!(
            Survey::from_raw(&["A1. Trust"], &empty).unwrap_err(),
            SurveyError::NoRows
        );
    }

    #[test]
    fn survey_pads_short_rows_and_rejects_long_ones() {
        let survey = Survey::from_raw(&["a", "b"], &[vec!["1"]]).expect("padded");
        assert_eq!(survey.rows()[0].cells(), &[Cell::Number(1.0), Cell::Missing]);

        let err = Survey::from_raw(&["a"], &[vec!["1", "2"]]).unwrap_err();
        assert_eq!(
            err,
            SurveyError::RaggedRow {
                row: 1,
                expected: 1,
                found: 2
            }
        );
    }
}
