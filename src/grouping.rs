//! Partitioning of the ordered column list into provisional question groups.

use log::debug;

use crate::error::Diagnostic;
use crate::header::{HeaderMatch, match_header, normalize_label};
use crate::question::QuestionGroup;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grouping {
    pub groups: Vec<QuestionGroup>,
    pub anomalies: Vec<Diagnostic>,
}

struct OpenGroup {
    id: String,
    label: String,
    normalized_label: String,
    columns: Vec<usize>,
    column_labels: Vec<String>,
}

impl OpenGroup {
    fn seeded(column: usize, header: &str, matched: HeaderMatch) -> Self {
        let column_label = matched.sub_label.unwrap_or_else(|| header.to_string());
        Self {
            normalized_label: normalize_label(&matched.label),
            id: matched.id,
            label: matched.label,
            columns: vec![column],
            column_labels: vec![column_label],
        }
    }

    fn implicit(column: usize, header: &str) -> Self {
        Self {
            id: format!("group_{column}"),
            label: String::new(),
            normalized_label: String::new(),
            columns: vec![column],
            column_labels: vec![header.to_string()],
        }
    }

    /// A matched header continues this group when it repeats the identifier
    /// or restates the same parent label.
    fn continues_with(&self, matched: &HeaderMatch) -> bool {
        matched.id == self.id
            || (!self.normalized_label.is_empty()
                && normalize_label(&matched.label) == self.normalized_label)
    }

    fn push(&mut self, column: usize, header: &str) {
        self.columns.push(column);
        self.column_labels.push(header.to_string());
    }

    fn close(self) -> QuestionGroup {
        QuestionGroup::provisional(self.id, self.label, self.columns, self.column_labels)
    }
}

/// Scans headers left to right. A header with a new identifier opens a
/// group; headers without one (or restating the current question) become
/// sub-questions of the open group.
pub fn group_headers<S: AsRef<str>>(headers: &[(usize, S)]) -> Grouping {
    let mut grouping = Grouping::default();
    let mut current: Option<OpenGroup> = None;

    for (column, header) in headers {
        let column = *column;
        let header = header.as_ref();
        let matched = match_header(header);

        let continues = match (&current, &matched) {
            (Some(open), Some(matched)) => open.continues_with(matched),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if continues {
            if let Some(open) = current.as_mut() {
                open.push(column, header);
            }
            continue;
        }

        match matched {
            Some(matched) => {
                debug!("Column {column} opens question '{}'", matched.id);
                if let Some(done) = current.take() {
                    grouping.groups.push(done.close());
                }
                current = Some(OpenGroup::seeded(column, header, matched));
            }
            None => {
                let open = OpenGroup::implicit(column, header);
                grouping.anomalies.push(Diagnostic::UnlabeledLeadingColumns {
                    question: open.id.clone(),
                    column,
                    header: header.to_string(),
                });
                current = Some(open);
            }
        }
    }

    if let Some(done) = current {
        grouping.groups.push(done.close());
    }
    grouping
}
