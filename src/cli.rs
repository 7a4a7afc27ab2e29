use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::loader::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Detect survey questions and compute weighted statistics",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect question groups in a survey export and write them to a YAML config
    Detect(DetectArgs),
    /// Print weighted statistics for every analyzable question
    Report(ReportArgs),
    /// Break every question down by demographic groups with significance tests
    Crosstab(CrosstabArgs),
    /// Match scale questions across two surveys and compare their results
    Compare(CompareArgs),
}

/// Reading options shared by every command.
#[derive(Debug, Args, Clone, Default)]
pub struct InputOptions {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Column holding respondent weights (defaults to a column named weight/waga/wagi)
    #[arg(long = "weight-column")]
    pub weight_column: Option<String>,
}

impl InputOptions {
    pub fn load_options(&self) -> LoadOptions<'_> {
        LoadOptions {
            delimiter: self.delimiter,
            encoding: self.input_encoding.as_deref(),
            weight_column: self.weight_column.as_deref(),
        }
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Survey export (CSV/TSV, '-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination YAML config
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    #[command(flatten)]
    pub options: InputOptions,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Survey export (CSV/TSV, '-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML config with question overrides
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub options: InputOptions,
}

#[derive(Debug, Args)]
pub struct CrosstabArgs {
    /// Survey export (CSV/TSV, '-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML config with question overrides
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Demographic question ids to break down by (defaults to flagged questions)
    #[arg(short = 'g', long = "demographics", value_delimiter = ',')]
    pub demographics: Vec<String>,
    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub options: InputOptions,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// First survey export
    #[arg(long = "left")]
    pub left: PathBuf,
    /// Second survey export
    #[arg(long = "right")]
    pub right: PathBuf,
    /// YAML config for the first survey
    #[arg(long = "left-config")]
    pub left_config: Option<PathBuf>,
    /// YAML config for the second survey
    #[arg(long = "right-config")]
    pub right_config: Option<PathBuf>,
    /// Display name of the first survey
    #[arg(long = "left-label", default_value = "left")]
    pub left_label: String,
    /// Display name of the second survey
    #[arg(long = "right-label", default_value = "right")]
    pub right_label: String,
    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub options: InputOptions,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
