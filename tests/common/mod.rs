#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use survey_analyzer::data::{Row, Survey, parse_cell};
use survey_analyzer::question::{ChartType, QuestionGroup, QuestionType};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Builds an in-memory survey; `weights` may be empty for an unweighted one.
pub fn survey(headers: &[&str], rows: &[&[&str]], weights: &[f64]) -> Survey {
    let rows = rows
        .iter()
        .enumerate()
        .map(|(idx, values)| {
            Row::new(values.iter().map(|v| parse_cell(v)).collect())
                .with_weight(weights.get(idx).copied())
        })
        .collect();
    Survey::new(headers.iter().map(|h| h.to_string()).collect(), rows).expect("valid survey")
}

/// A typed question over the given columns, bypassing detection.
pub fn question(id: &str, label: &str, question_type: QuestionType, columns: &[usize]) -> QuestionGroup {
    QuestionGroup {
        question_type,
        chart_type: ChartType::default_for(question_type, None),
        ..QuestionGroup::provisional(
            id,
            label,
            columns.to_vec(),
            columns.iter().map(|c| format!("{label} {c}")).collect(),
        )
    }
}
