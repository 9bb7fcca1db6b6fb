/// Per-gene residualization.
///
/// Round 1 regresses log-expression on intercept + covariates. Later rounds
/// regress the previous round's residual on intercept + the gene's previous
/// lead SNP. Each gene is an independent OLS fit dispatched on the rayon pool;
/// a gene that cannot be fit is reported and left out, never fatal.
use log::{trace, warn};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::error::EqtlError;
use crate::ols::{design_with_intercept, ols};
use crate::table::SampleMatrix;

/// Residual matrix of one round plus the genes that dropped out of it.
#[derive(Debug)]
pub struct Residualized {
    pub residuals: SampleMatrix,
    pub failures: Vec<EqtlError>,
}

impl Residualized {
    pub fn log_failures(&self) {
        for f in &self.failures {
            warn!("{}", f);
        }
    }
}

/// Residualize one gene's response on `regressors` (all indexed like `y`).
///
/// Only samples finite in `y` and in every regressor enter the fit; the
/// others get NaN in the returned vector.
pub fn residualize_gene(
    gene: &str,
    y: ArrayView1<'_, f64>,
    regressors: &[ArrayView1<'_, f64>],
) -> Result<Array1<f64>, EqtlError> {
    let rows: Vec<usize> = (0..y.len())
        .filter(|&i| y[i].is_finite() && regressors.iter().all(|r| r[i].is_finite()))
        .collect();
    let n_params = regressors.len() + 1;
    if rows.len() <= n_params {
        return Err(EqtlError::InsufficientData {
            gene: gene.to_string(),
            n_samples: rows.len(),
            n_params,
        });
    }

    let x = design_with_intercept(regressors, &rows);
    let response: Array1<f64> = rows.iter().map(|&i| y[i]).collect();
    let fit = ols(&x, &response).map_err(|e| EqtlError::FitFailed {
        gene: gene.to_string(),
        reason: e.to_string(),
    })?;
    trace!(
        "{}: n={} coefficients={:?}",
        gene,
        rows.len(),
        fit.coefficients.to_vec()
    );

    let mut out = Array1::from_elem(y.len(), f64::NAN);
    for (k, &i) in rows.iter().enumerate() {
        out[i] = fit.residuals[k];
    }
    Ok(out)
}

/// Reorder `other`'s rows to `samples`; samples it lacks become NaN rows.
pub fn align_to(samples: &[String], other: &SampleMatrix) -> Array2<f64> {
    let rows = other.aligned_rows(samples);
    let mut out = Array2::<f64>::from_elem((samples.len(), other.n_columns()), f64::NAN);
    for (i, row) in rows.iter().enumerate() {
        if let Some(r) = row {
            out.row_mut(i).assign(&other.values().row(*r));
        }
    }
    out
}

fn collect_outcome(
    samples: &[String],
    results: Vec<(String, Result<Array1<f64>, EqtlError>)>,
) -> Result<Residualized, EqtlError> {
    let mut columns = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (gene, res) in results {
        match res {
            Ok(r) => columns.push((gene, r.to_vec())),
            Err(e) => failures.push(e),
        }
    }
    let residuals = SampleMatrix::from_columns("residuals", samples.to_vec(), columns)?;
    Ok(Residualized {
        residuals,
        failures,
    })
}

/// Round 1: regress every expression column on intercept + covariates.
///
/// With no covariates the model is intercept-only and the residual is the
/// centred log-expression.
pub fn residualize_covariates(
    expression: &SampleMatrix,
    covariates: Option<&SampleMatrix>,
) -> Result<Residualized, EqtlError> {
    let aligned = covariates.map(|c| align_to(expression.samples(), c));
    let regressors: Vec<ArrayView1<'_, f64>> = match &aligned {
        Some(a) => a.columns().into_iter().collect(),
        None => Vec::new(),
    };

    let results: Vec<(String, Result<Array1<f64>, EqtlError>)> = expression
        .columns()
        .par_iter()
        .enumerate()
        .map(|(j, gene)| {
            (
                gene.clone(),
                residualize_gene(gene, expression.column(j), &regressors),
            )
        })
        .collect();

    collect_outcome(expression.samples(), results)
}

/// Round ≥ 2: regress each gene's prior residual on intercept + its lead SNP.
///
/// `leads` maps gene id to lead SNP id. Genes of `prior` without a lead are
/// not carried into the round. `genotypes` must already use the residual
/// matrix's sample ids.
pub fn residualize_lead_snps(
    prior: &SampleMatrix,
    genotypes: &SampleMatrix,
    leads: &HashMap<String, String>,
) -> Result<Residualized, EqtlError> {
    let snp_index = genotypes.column_index();
    let geno_rows = genotypes.aligned_rows(prior.samples());

    let carried: Vec<usize> = (0..prior.n_columns())
        .filter(|&j| leads.contains_key(&prior.columns()[j]))
        .collect();

    let results: Vec<(String, Result<Array1<f64>, EqtlError>)> = carried
        .par_iter()
        .map(|&j| {
            let gene = &prior.columns()[j];
            let snp = &leads[gene];
            let res = match snp_index.get(snp.as_str()) {
                None => Err(EqtlError::ConditioningSnpMissing {
                    gene: gene.clone(),
                    snp: snp.clone(),
                }),
                Some(&k) => {
                    let column = genotypes.column(k);
                    let dosage: Array1<f64> = geno_rows
                        .iter()
                        .map(|row| row.map_or(f64::NAN, |r| column[r]))
                        .collect();
                    residualize_gene(gene, prior.column(j), &[dosage.view()])
                }
            };
            (gene.clone(), res)
        })
        .collect();

    collect_outcome(prior.samples(), results)
}
