/// Error taxonomy for the eQTL pipeline.
///
/// `Validation` and `InsufficientTests` are fatal and propagate through
/// `anyhow` to the command boundary. The gene-scoped variants and
/// [`SkippedPairWarning`] are recovered per gene / per pair and only logged.
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EqtlError {
    /// Malformed or misaligned input table.
    #[error("invalid {table}: {reason}")]
    Validation { table: String, reason: String },

    /// A single gene has too few usable samples for its regression.
    #[error("gene '{gene}': {n_samples} usable samples for {n_params} regression parameters")]
    InsufficientData {
        gene: String,
        n_samples: usize,
        n_params: usize,
    },

    /// The least-squares solver did not converge for a gene.
    #[error("gene '{gene}': regression failed: {reason}")]
    FitFailed { gene: String, reason: String },

    /// The prior round's lead SNP for a gene is not in the genotype matrix.
    #[error("gene '{gene}': conditioning SNP '{snp}' is not in the genotype matrix")]
    ConditioningSnpMissing { gene: String, snp: String },

    /// Too few p-values in a round for FDR correction.
    #[error("round {round}: {n_tests} valid p-value(s); FDR correction needs at least 2")]
    InsufficientTests { round: usize, n_tests: usize },
}

impl EqtlError {
    pub fn validation(table: impl Into<String>, reason: impl Into<String>) -> Self {
        EqtlError::Validation {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Gene the error is scoped to, for per-gene failures.
    pub fn gene(&self) -> Option<&str> {
        match self {
            EqtlError::InsufficientData { gene, .. }
            | EqtlError::FitFailed { gene, .. }
            | EqtlError::ConditioningSnpMissing { gene, .. } => Some(gene),
            _ => None,
        }
    }
}

/// Why a gene/SNP pair produced no association row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No sample has both a residual and a genotype value.
    NoOverlappingSamples,
    /// Fewer than three usable samples; the t-statistic has no degrees of freedom.
    TooFewSamples(usize),
    /// Residual or genotype is constant over the usable samples.
    ConstantValues,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoOverlappingSamples => write!(f, "no overlapping samples"),
            SkipReason::TooFewSamples(n) => write!(f, "only {} usable sample(s)", n),
            SkipReason::ConstantValues => write!(f, "constant values"),
        }
    }
}

/// A gene/SNP pair omitted from the association results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPairWarning {
    pub gene: String,
    pub snp: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedPairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped pair {} / {}: {}",
            self.gene, self.snp, self.reason
        )
    }
}
