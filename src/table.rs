//! Plain-text tables for terminal reports.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Text cells longer than this are shortened; survey labels can run to
/// whole paragraphs.
pub const MAX_TEXT_WIDTH: usize = 48;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![true; column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let cell = fit_cell(cell);
            widths[idx] = widths[idx].max(display_width(&cell));
            numeric[idx] &= cell.is_empty() || is_numeric_cell(&cell);
        }
    }
    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| fit_cell(h)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths, &numeric));

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator = separator_widths
        .iter()
        .map(|w| Cow::Owned("-".repeat(*w)))
        .collect::<Vec<_>>();
    let _ = writeln!(
        output,
        "{}",
        format_row(&separator, &separator_widths, &vec![false; column_count])
    );

    for row in rows {
        let cells = row.iter().map(|cell| fit_cell(cell)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&cells, &widths, &numeric));
    }
    output
}

/// A table preceded by an underlined title line.
pub fn render_titled(title: &str, headers: &[String], rows: &[Vec<String>]) -> String {
    let title = sanitize_cell(title);
    let mut output = String::new();
    let _ = writeln!(output, "{title}");
    let _ = writeln!(output, "{}", "=".repeat(display_width(&title).max(3)));
    output.push_str(&render_table(headers, rows));
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

pub fn print_titled(title: &str, headers: &[String], rows: &[Vec<String>]) {
    println!("{}", render_titled(title, headers, rows));
}

fn format_row(values: &[Cow<'_, str>], widths: &[usize], numeric: &[bool]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let padding = widths[idx].saturating_sub(display_width(value));
        let cell = if numeric.get(idx).copied().unwrap_or(false) {
            format!("{}{value}", " ".repeat(padding))
        } else {
            format!("{value}{}", " ".repeat(padding))
        };
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn is_numeric_cell(value: &str) -> bool {
    let trimmed = value.trim_end_matches(['%', '*', ' ']);
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn fit_cell(value: &str) -> Cow<'_, str> {
    let sanitized = sanitize_cell(value);
    if display_width(&sanitized) <= MAX_TEXT_WIDTH {
        return sanitized;
    }
    let mut shortened = sanitized
        .chars()
        .take(MAX_TEXT_WIDTH - 1)
        .collect::<String>();
    shortened.push('…');
    Cow::Owned(shortened)
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| match ch {
                    '\n' | '\r' | '\t' => ' ',
                    other => other,
                })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn numeric_columns_are_right_aligned() {
        let rendered = render_table(
            &strings(&["item", "mean"]),
            &[strings(&["govt", "4.67"]), strings(&["church", "10"])],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "item    mean");
        assert_eq!(lines[2], "govt    4.67");
        assert_eq!(lines[3], "church    10");
    }

    #[test]
    fn long_labels_are_shortened() {
        let long = "x".repeat(MAX_TEXT_WIDTH + 10);
        let rendered = render_table(&strings(&["label"]), &[vec![long]]);
        let last = rendered.lines().last().unwrap();
        assert_eq!(last.chars().count(), MAX_TEXT_WIDTH);
        assert!(last.ends_with('…'));
    }

    #[test]
    fn titled_tables_underline_the_title() {
        let rendered = render_titled("A1 Trust", &strings(&["n"]), &[strings(&["3"])]);
        assert!(rendered.starts_with("A1 Trust\n========\n"));
    }
}
