/// Expression preprocessing: drop silent and rarely expressed genes, then
/// log-transform with `ln(x + 1)`.
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::cli::PreprocessArgs;
use crate::error::EqtlError;
use crate::table::{self, SampleMatrix};

/// A gene is kept when strictly more than this fraction of samples express it.
pub const DEFAULT_MIN_EXPRESSED_FRACTION: f64 = 0.10;

/// Gene counts through the two filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreprocessSummary {
    pub input_genes: usize,
    pub all_zero_dropped: usize,
    pub below_threshold_dropped: usize,
    pub kept_genes: usize,
}

/// Filter and log-transform an expression matrix.
///
/// The fraction is computed over all samples (missing values count as not
/// expressed). Running this on its own output keeps every gene, since
/// `ln(x + 1) > 0` exactly when `x > 0`.
pub fn preprocess_expression(
    expression: &SampleMatrix,
    min_fraction: f64,
) -> Result<(SampleMatrix, PreprocessSummary)> {
    anyhow::ensure!(
        (0.0..1.0).contains(&min_fraction),
        "--min-expressed-fraction must be in [0, 1), got {}",
        min_fraction
    );
    let n = expression.n_samples();
    anyhow::ensure!(
        n > 0,
        EqtlError::validation("expression", "no samples")
    );

    let mut all_zero = 0usize;
    let mut below = 0usize;
    let mut keep = Vec::with_capacity(expression.n_columns());
    for (j, gene) in expression.columns().iter().enumerate() {
        let col = expression.column(j);
        if let Some(neg) = col.iter().find(|v| **v < 0.0) {
            return Err(EqtlError::validation(
                "expression",
                format!("gene '{}' has negative value {}", gene, neg),
            )
            .into());
        }
        let expressed = col.iter().filter(|v| **v > 0.0).count();
        if expressed == 0 {
            all_zero += 1;
        } else if (expressed as f64) / (n as f64) > min_fraction {
            keep.push(j);
        } else {
            below += 1;
        }
    }

    let mut filtered = expression.select_columns(&keep);
    filtered.map_values_inplace(f64::ln_1p);

    let summary = PreprocessSummary {
        input_genes: expression.n_columns(),
        all_zero_dropped: all_zero,
        below_threshold_dropped: below,
        kept_genes: keep.len(),
    };
    Ok((filtered, summary))
}

pub fn log_summary(summary: &PreprocessSummary, min_fraction: f64) {
    info!(
        "Expression filter: {} genes in, {} all-zero dropped, {} expressed in <= {:.0}% of samples dropped, {} kept",
        summary.input_genes,
        summary.all_zero_dropped,
        summary.below_threshold_dropped,
        min_fraction * 100.0,
        summary.kept_genes
    );
}

/// Entry point for the `preprocess` subcommand.
pub fn run(args: PreprocessArgs) -> Result<()> {
    let expression = table::read_sample_matrix(&args.expression, "expression", &args.sample_col)
        .with_context(|| format!("reading expression '{}'", args.expression))?;
    info!(
        "Read expression: {} samples × {} genes",
        expression.n_samples(),
        expression.n_columns()
    );
    let (filtered, summary) = preprocess_expression(&expression, args.min_expressed_fraction)?;
    log_summary(&summary, args.min_expressed_fraction);
    table::write_sample_matrix(&args.out, &filtered, &args.sample_col)?;
    info!("Wrote filtered expression to '{}'", args.out);
    Ok(())
}
