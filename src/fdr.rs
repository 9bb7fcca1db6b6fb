/// Benjamini–Hochberg correction across a round's tests and lead-SNP selection.
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;

use crate::error::EqtlError;
use crate::scan::AssociationRow;
use crate::table::{self, format_f64};

/// BH q-values. Non-finite p-values get NaN and do not count towards `m`.
///
/// q is non-decreasing in p and capped at 1.
pub fn benjamini_hochberg(pvals: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..pvals.len()).filter(|&i| pvals[i].is_finite()).collect();
    order.sort_by(|&a, &b| pvals[a].total_cmp(&pvals[b]));
    let m = order.len() as f64;

    let mut q = vec![f64::NAN; pvals.len()];
    let mut running = 1.0f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        running = running.min(pvals[i] * m / (rank + 1) as f64).min(1.0);
        q[i] = running;
    }
    q
}

/// An association row with its round-wide q-value.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificantRow {
    pub row: AssociationRow,
    pub q_value: f64,
}

/// All corrected associations of one round, ordered by gene id, then q, then
/// p, then the order they were tested in.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificantSnpTable {
    pub round: usize,
    pub rows: Vec<SignificantRow>,
}

fn by_gene_q_p(a: &SignificantRow, b: &SignificantRow) -> Ordering {
    a.row
        .gene_id
        .cmp(&b.row.gene_id)
        .then(a.q_value.total_cmp(&b.q_value))
        .then(a.row.p_value.total_cmp(&b.row.p_value))
}

impl SignificantSnpTable {
    /// Correct a round's merged scan results.
    ///
    /// Fewer than two valid p-values is an error; the round cannot be
    /// corrected and the run must stop.
    pub fn from_associations(
        round: usize,
        associations: Vec<AssociationRow>,
    ) -> Result<Self, EqtlError> {
        let associations: Vec<AssociationRow> = associations
            .into_iter()
            .filter(|r| r.p_value.is_finite())
            .collect();
        if associations.len() < 2 {
            return Err(EqtlError::InsufficientTests {
                round,
                n_tests: associations.len(),
            });
        }
        let pvals: Vec<f64> = associations.iter().map(|r| r.p_value).collect();
        let q = benjamini_hochberg(&pvals);
        let mut rows: Vec<SignificantRow> = associations
            .into_iter()
            .zip(q)
            .map(|(row, q_value)| SignificantRow { row, q_value })
            .collect();
        // stable: equal (gene, q, p) keep their scan order
        rows.sort_by(by_gene_q_p);
        Ok(SignificantSnpTable { round, rows })
    }

    /// One row per gene: the first after sorting.
    pub fn lead_snps(&self) -> Vec<&SignificantRow> {
        let mut leads: Vec<&SignificantRow> = Vec::new();
        for r in &self.rows {
            match leads.last() {
                Some(prev) if prev.row.gene_id == r.row.gene_id => {}
                _ => leads.push(r),
            }
        }
        leads
    }

    /// gene id → lead SNP id.
    pub fn lead_snp_ids(&self) -> HashMap<String, String> {
        self.lead_snps()
            .into_iter()
            .map(|r| (r.row.gene_id.clone(), r.row.snp_id.clone()))
            .collect()
    }

    pub fn n_significant(&self, alpha: f64) -> usize {
        self.rows.iter().filter(|r| r.q_value < alpha).count()
    }

    /// Write as `geneid snpid coef p_value q_value n_samples chromosome position locus round`.
    pub fn write(&self, path: &str) -> Result<()> {
        table::write_text(path, |w: &mut dyn Write| {
            writeln!(
                w,
                "geneid\tsnpid\tcoef\tp_value\tq_value\tn_samples\tchromosome\tposition\tlocus\tround"
            )?;
            for r in &self.rows {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    r.row.gene_id,
                    r.row.snp_id,
                    format_f64(r.row.coef),
                    format_f64(r.row.p_value),
                    format_f64(r.q_value),
                    r.row.n_samples,
                    r.row.chromosome,
                    r.row.position,
                    r.row.locus(),
                    r.row.round
                )?;
            }
            Ok(())
        })
    }

    /// Read a persisted table. Column synonyms are accepted (`p.value`, `FDR`,
    /// `rho`, ...); only gene id, SNP id and p-value are required. A missing
    /// q-value column is recomputed from the p-values.
    pub fn read(path: &str, round: usize) -> Result<Self> {
        let name = "significant SNPs";
        let df = table::read_tsv(path)?;
        let cols = table::canonical_columns(&df, name)?;
        let genes = table::string_values(&df, table::require_column(&cols, "geneid", name)?, name)?;
        let snps = table::string_values(&df, table::require_column(&cols, "snpid", name)?, name)?;
        let pvals = table::f64_values(&df, table::require_column(&cols, "p_value", name)?, name)?;
        let n = genes.len();

        let optional_f64 = |canonical: &str| -> Result<Option<Vec<f64>>> {
            match cols.get(canonical) {
                Some(c) => Ok(Some(table::f64_values(&df, c, name)?)),
                None => Ok(None),
            }
        };
        let coef = optional_f64("coef")?.unwrap_or_else(|| vec![f64::NAN; n]);
        let q = match optional_f64("q_value")? {
            Some(q) => q,
            None => benjamini_hochberg(&pvals),
        };
        let n_samples = optional_f64("n_samples")?.unwrap_or_else(|| vec![0.0; n]);
        let positions = optional_f64("pos")?.unwrap_or_else(|| vec![f64::NAN; n]);
        let chroms = match cols.get("chr") {
            Some(c) => table::string_values(&df, c, name)?,
            None => vec![String::new(); n],
        };
        let loci = match cols.get("locus") {
            Some(c) => Some(table::string_values(&df, c, name)?),
            None => None,
        };

        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let (chromosome, position) = if positions[i].is_finite() {
                (table::normalize_chrom(&chroms[i]), positions[i] as i64)
            } else {
                loci.as_ref()
                    .and_then(|l| crate::scan::parse_locus(&l[i]))
                    .or_else(|| crate::scan::parse_locus(&snps[i]))
                    .unwrap_or_default()
            };
            rows.push(SignificantRow {
                row: AssociationRow {
                    gene_id: genes[i].clone(),
                    snp_id: snps[i].clone(),
                    coef: coef[i],
                    p_value: pvals[i],
                    n_samples: n_samples[i].max(0.0) as usize,
                    chromosome,
                    position,
                    round,
                },
                q_value: q[i],
            });
        }
        rows.sort_by(by_gene_q_p);
        Ok(SignificantSnpTable { round, rows })
    }
}
