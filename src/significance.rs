//! Non-parametric significance tests used by the demographic breakdown.
//!
//! Rank tests work on raw (unweighted) values; the chi-square test accepts
//! weighted counts. Degenerate inputs never produce NaN: they come back as
//! [`TestOutcome::NotPerformed`] with a reason.

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Mann-Whitney uses the exact null distribution when either sample is at
/// most this large and no values are tied.
pub const EXACT_MANN_WHITNEY_MAX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    MannWhitney,
    KruskalWallis,
    ChiSquare,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::MannWhitney => "Mann-Whitney U",
            TestKind::KruskalWallis => "Kruskal-Wallis H",
            TestKind::ChiSquare => "chi-square",
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceTest {
    pub kind: TestKind,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<usize>,
    pub p_value: f64,
    pub significant: bool,
    /// Partitions that entered the test.
    pub groups_tested: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TestOutcome {
    Performed(SignificanceTest),
    NotPerformed { reason: String },
}

impl TestOutcome {
    fn not_performed(reason: impl Into<String>) -> Self {
        TestOutcome::NotPerformed {
            reason: reason.into(),
        }
    }

    pub fn test(&self) -> Option<&SignificanceTest> {
        match self {
            TestOutcome::Performed(test) => Some(test),
            TestOutcome::NotPerformed { .. } => None,
        }
    }

    pub fn is_significant(&self) -> bool {
        self.test().is_some_and(|test| test.significant)
    }

    pub fn describe(&self) -> String {
        match self {
            TestOutcome::Performed(test) => {
                let df = test
                    .degrees_of_freedom
                    .map(|df| format!(", df={df}"))
                    .unwrap_or_default();
                format!(
                    "{} = {:.3}{df}, p = {:.4}{}",
                    test.kind,
                    test.statistic,
                    test.p_value,
                    if test.significant { " *" } else { "" }
                )
            }
            TestOutcome::NotPerformed { reason } => format!("not performed ({reason})"),
        }
    }
}

fn performed(
    kind: TestKind,
    statistic: f64,
    degrees_of_freedom: Option<usize>,
    p_value: f64,
    groups_tested: usize,
) -> TestOutcome {
    let p_value = p_value.clamp(0.0, 1.0);
    TestOutcome::Performed(SignificanceTest {
        kind,
        statistic,
        degrees_of_freedom,
        p_value,
        significant: p_value < SIGNIFICANCE_LEVEL,
        groups_tested,
    })
}

fn chi_squared_sf(statistic: f64, df: usize) -> Option<f64> {
    let dist = ChiSquared::new(df as f64).ok()?;
    Some(1.0 - dist.cdf(statistic))
}

fn normal_sf(z: f64) -> Option<f64> {
    let dist = Normal::new(0.0, 1.0).ok()?;
    Some(1.0 - dist.cdf(z))
}

/// Ranks of the pooled samples (midranks for ties) plus Σ(t³ − t) over the
/// tie groups.
fn pooled_ranks(samples: &[&[f64]]) -> (Vec<Vec<f64>>, f64) {
    let mut pooled = samples
        .iter()
        .enumerate()
        .flat_map(|(group, values)| values.iter().map(move |&v| (v, group)))
        .collect::<Vec<_>>();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut ranks = samples
        .iter()
        .map(|values| Vec::with_capacity(values.len()))
        .collect::<Vec<Vec<f64>>>();
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < pooled.len() {
        let mut end = start + 1;
        while end < pooled.len() && pooled[end].0 == pooled[start].0 {
            end += 1;
        }
        let ties = (end - start) as f64;
        let midrank = (start + end + 1) as f64 / 2.0;
        for &(_, group) in &pooled[start..end] {
            ranks[group].push(midrank);
        }
        tie_term += ties * ties * ties - ties;
        start = end;
    }
    (ranks, tie_term)
}

/// Null distribution of U for samples of sizes `m` and `n`: entry `u` counts
/// the rank arrangements with that statistic. These are the coefficients of
/// the Gaussian binomial [m + n choose m]_q, built as
/// ∏ (1 − q^(large + i)) / (1 − q^i) for i in 1..=small.
fn u_frequencies(m: usize, n: usize) -> Vec<f64> {
    let (small, large) = (m.min(n), m.max(n));
    let mut coefficients = vec![0.0; small * large + 1];
    coefficients[0] = 1.0;
    for i in 1..=small {
        let shift = large + i;
        for k in (shift..coefficients.len()).rev() {
            coefficients[k] -= coefficients[k - shift];
        }
        for k in i..coefficients.len() {
            coefficients[k] += coefficients[k - i];
        }
    }
    coefficients
}

fn exact_two_sided_p(u: f64, n1: usize, n2: usize) -> f64 {
    let frequencies = u_frequencies(n1, n2);
    let total: f64 = frequencies.iter().sum();
    let upper = u.max((n1 * n2) as f64 - u).round() as usize;
    let tail: f64 = frequencies.iter().skip(upper).sum();
    (2.0 * tail / total).min(1.0)
}

/// Two-sided Mann-Whitney U. Small samples without ties get the exact p
/// value; everything else the tie-corrected normal approximation with
/// continuity correction. The statistic reported is U of the first sample.
pub fn mann_whitney(first: &[f64], second: &[f64]) -> TestOutcome {
    let (n1, n2) = (first.len() as f64, second.len() as f64);
    if first.is_empty() || second.is_empty() {
        return TestOutcome::not_performed("empty sample");
    }
    let (ranks, tie_term) = pooled_ranks(&[first, second]);
    let n = n1 + n2;
    let rank_sum: f64 = ranks[0].iter().sum();
    let u = rank_sum - n1 * (n1 + 1.0) / 2.0;
    if tie_term == 0.0 && first.len().min(second.len()) <= EXACT_MANN_WHITNEY_MAX {
        let p_value = exact_two_sided_p(u, first.len(), second.len());
        return performed(TestKind::MannWhitney, u, None, p_value, 2);
    }
    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if variance.is_nan() || variance <= 0.0 {
        return TestOutcome::not_performed("all values tied");
    }
    let z = ((u - mean).abs() - 0.5).max(0.0) / variance.sqrt();
    match normal_sf(z) {
        Some(tail) => performed(TestKind::MannWhitney, u, None, 2.0 * tail, 2),
        None => TestOutcome::not_performed("normal distribution unavailable"),
    }
}

/// Kruskal-Wallis H over k samples, tie-corrected, χ² with k − 1 df.
pub fn kruskal_wallis(samples: &[&[f64]]) -> TestOutcome {
    if samples.len() < 2 {
        return TestOutcome::not_performed("fewer than two groups");
    }
    if samples.iter().any(|s| s.is_empty()) {
        return TestOutcome::not_performed("empty sample");
    }
    let (ranks, tie_term) = pooled_ranks(samples);
    let n = samples.iter().map(|s| s.len()).sum::<usize>() as f64;
    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction.is_nan() || correction <= 0.0 {
        return TestOutcome::not_performed("all values tied");
    }
    let spread: f64 = ranks
        .iter()
        .map(|group| {
            let sum: f64 = group.iter().sum();
            sum * sum / group.len() as f64
        })
        .sum();
    let h = (12.0 / (n * (n + 1.0)) * spread - 3.0 * (n + 1.0)) / correction;
    let df = samples.len() - 1;
    match chi_squared_sf(h, df) {
        Some(p) => performed(TestKind::KruskalWallis, h, Some(df), p, samples.len()),
        None => TestOutcome::not_performed("chi-square distribution unavailable"),
    }
}

/// Chi-square test of independence over an r × c table of (weighted)
/// counts. Empty rows and columns are dropped first; 2 × 2 tables get the
/// Yates continuity correction.
pub fn chi_square_independence(table: &[Vec<f64>]) -> TestOutcome {
    let width = table.iter().map(|row| row.len()).max().unwrap_or(0);
    let cell = |r: usize, c: usize| table[r].get(c).copied().unwrap_or(0.0);
    let kept_rows = (0..table.len())
        .filter(|&r| (0..width).map(|c| cell(r, c)).sum::<f64>() > 0.0)
        .collect::<Vec<_>>();
    let kept_cols = (0..width)
        .filter(|&c| kept_rows.iter().map(|&r| cell(r, c)).sum::<f64>() > 0.0)
        .collect::<Vec<_>>();
    if kept_rows.len() < 2 || kept_cols.len() < 2 {
        return TestOutcome::not_performed("table needs at least two non-empty rows and columns");
    }

    let row_totals = kept_rows
        .iter()
        .map(|&r| kept_cols.iter().map(|&c| cell(r, c)).sum::<f64>())
        .collect::<Vec<_>>();
    let col_totals = kept_cols
        .iter()
        .map(|&c| kept_rows.iter().map(|&r| cell(r, c)).sum::<f64>())
        .collect::<Vec<_>>();
    let total: f64 = row_totals.iter().sum();
    let df = (kept_rows.len() - 1) * (kept_cols.len() - 1);

    let mut statistic = 0.0;
    for (i, &r) in kept_rows.iter().enumerate() {
        for (j, &c) in kept_cols.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            let mut deviation = (cell(r, c) - expected).abs();
            if df == 1 {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }
    match chi_squared_sf(statistic, df) {
        Some(p) => performed(TestKind::ChiSquare, statistic, Some(df), p, kept_cols.len()),
        None => TestOutcome::not_performed("chi-square distribution unavailable"),
    }
}
