/// Cis association scan: every SNP within ±1 Mb of a gene body is tested
/// against the gene's residual with Spearman's ρ.
use log::{debug, info, warn};
use ndarray::ArrayView1;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::error::SkippedPairWarning;
use crate::spearman::spearman;
use crate::table::{GeneLocation, SampleMatrix, SnpLocation, normalize_chrom};

/// Half-width of the cis window in base pairs.
pub const CIS_WINDOW_BP: i64 = 1_000_000;

/// Inclusive interval `[start - 1 Mb, end + 1 Mb]` on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CisWindow {
    pub chrom: String,
    pub lo: i64,
    pub hi: i64,
}

impl CisWindow {
    pub fn around(gene: &GeneLocation) -> Self {
        CisWindow {
            chrom: gene.chrom.clone(),
            lo: gene.start - CIS_WINDOW_BP,
            hi: gene.end + CIS_WINDOW_BP,
        }
    }

    pub fn contains(&self, chrom: &str, pos: i64) -> bool {
        self.chrom == chrom && self.lo <= pos && pos <= self.hi
    }
}

/// One tested gene/SNP pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRow {
    pub gene_id: String,
    pub snp_id: String,
    /// Spearman's ρ.
    pub coef: f64,
    pub p_value: f64,
    pub n_samples: usize,
    pub chromosome: String,
    pub position: i64,
    pub round: usize,
}

impl AssociationRow {
    /// `chromosome:position`
    pub fn locus(&self) -> String {
        format!("{}:{}", self.chromosome, self.position)
    }
}

/// Chromosome and position encoded in a SNP id: `chrom:pos`, `chrom:pos_ref_alt`
/// or `chrom:pos:ref:alt`.
pub fn parse_locus(snp_id: &str) -> Option<(String, i64)> {
    let mut parts = snp_id.splitn(3, ':');
    let chrom = parts.next()?;
    let rest = parts.next()?;
    let pos = rest.split('_').next()?.parse::<i64>().ok()?;
    if chrom.is_empty() {
        return None;
    }
    Some((normalize_chrom(chrom), pos))
}

#[derive(Debug, Clone)]
struct SnpEntry {
    pos: i64,
    column: usize,
    chromosome: String,
    position: i64,
}

/// Genotyped SNPs bucketed by chromosome and sorted by position.
#[derive(Debug)]
pub struct SnpIndex {
    by_chrom: HashMap<String, Vec<SnpEntry>>,
    n_snps: usize,
    n_not_genotyped: usize,
}

impl SnpIndex {
    /// Index the located SNPs that have a genotype column. Located SNPs
    /// missing from the genotype matrix are never candidates.
    pub fn build(genotypes: &SampleMatrix, locations: &[SnpLocation]) -> SnpIndex {
        let columns = genotypes.column_index();
        let mut by_chrom: HashMap<String, Vec<SnpEntry>> = HashMap::new();
        let mut n_not_genotyped = 0usize;
        let mut n_snps = 0usize;
        for loc in locations {
            let Some(&column) = columns.get(loc.snp_id.as_str()) else {
                n_not_genotyped += 1;
                continue;
            };
            let (chromosome, position) =
                parse_locus(&loc.snp_id).unwrap_or_else(|| (loc.chrom.clone(), loc.pos));
            by_chrom.entry(loc.chrom.clone()).or_default().push(SnpEntry {
                pos: loc.pos,
                column,
                chromosome,
                position,
            });
            n_snps += 1;
        }
        for entries in by_chrom.values_mut() {
            entries.sort_by_key(|e| e.pos);
        }
        SnpIndex {
            by_chrom,
            n_snps,
            n_not_genotyped,
        }
    }

    pub fn n_snps(&self) -> usize {
        self.n_snps
    }

    pub fn n_not_genotyped(&self) -> usize {
        self.n_not_genotyped
    }

    fn window(&self, w: &CisWindow) -> &[SnpEntry] {
        let Some(entries) = self.by_chrom.get(&w.chrom) else {
            return &[];
        };
        let lo = entries.partition_point(|e| e.pos < w.lo);
        let hi = entries.partition_point(|e| e.pos <= w.hi);
        &entries[lo..hi]
    }
}

/// Everything a round's scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub rows: Vec<AssociationRow>,
    pub skipped: Vec<SkippedPairWarning>,
    pub genes_scanned: usize,
    pub genes_without_location: Vec<String>,
}

/// Test one gene against the SNPs in its cis window.
///
/// `geno_rows[i]` is the genotype row of residual sample `i`. SNP ids in
/// `exclude` are left out.
pub fn scan_gene(
    gene: &GeneLocation,
    residual: ArrayView1<'_, f64>,
    genotypes: &SampleMatrix,
    geno_rows: &[Option<usize>],
    index: &SnpIndex,
    exclude: Option<&HashSet<String>>,
    round: usize,
) -> (Vec<AssociationRow>, Vec<SkippedPairWarning>) {
    let residual: Vec<f64> = residual.to_vec();
    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    let mut dosage = vec![f64::NAN; residual.len()];

    for entry in index.window(&CisWindow::around(gene)) {
        let snp_id = &genotypes.columns()[entry.column];
        if exclude.is_some_and(|ex| ex.contains(snp_id)) {
            continue;
        }
        let column = genotypes.column(entry.column);
        for (d, row) in dosage.iter_mut().zip(geno_rows) {
            *d = row.map_or(f64::NAN, |r| column[r]);
        }
        match spearman(&residual, &dosage) {
            Ok(r) => rows.push(AssociationRow {
                gene_id: gene.gene_id.clone(),
                snp_id: snp_id.clone(),
                coef: r.rho,
                p_value: r.p_value,
                n_samples: r.n,
                chromosome: entry.chromosome.clone(),
                position: entry.position,
                round,
            }),
            Err(reason) => skipped.push(SkippedPairWarning {
                gene: gene.gene_id.clone(),
                snp: snp_id.clone(),
                reason,
            }),
        }
    }
    (rows, skipped)
}

/// Scan every residual column that has a gene location, in parallel, and
/// merge the per-gene results in residual-column order.
pub fn scan_round(
    residuals: &SampleMatrix,
    genotypes: &SampleMatrix,
    genes: &[GeneLocation],
    index: &SnpIndex,
    exclusions: &HashMap<String, HashSet<String>>,
    round: usize,
) -> ScanOutcome {
    let by_id: HashMap<&str, &GeneLocation> =
        genes.iter().map(|g| (g.gene_id.as_str(), g)).collect();
    let geno_rows = genotypes.aligned_rows(residuals.samples());

    let mut outcome = ScanOutcome::default();
    let mut located = Vec::with_capacity(residuals.n_columns());
    for (j, gene_id) in residuals.columns().iter().enumerate() {
        match by_id.get(gene_id.as_str()) {
            Some(g) => located.push((j, *g)),
            None => outcome.genes_without_location.push(gene_id.clone()),
        }
    }
    if !outcome.genes_without_location.is_empty() {
        warn!(
            "Round {}: {} gene(s) have no location and are not scanned",
            round,
            outcome.genes_without_location.len()
        );
    }
    if index.n_not_genotyped() > 0 {
        info!(
            "Round {}: {} located SNP(s) are not in the genotype matrix and are not tested",
            round,
            index.n_not_genotyped()
        );
    }

    let per_gene: Vec<(Vec<AssociationRow>, Vec<SkippedPairWarning>)> = located
        .par_iter()
        .map(|&(j, gene)| {
            scan_gene(
                gene,
                residuals.column(j),
                genotypes,
                &geno_rows,
                index,
                exclusions.get(&gene.gene_id),
                round,
            )
        })
        .collect();

    outcome.genes_scanned = located.len();
    for (rows, skipped) in per_gene {
        outcome.rows.extend(rows);
        outcome.skipped.extend(skipped);
    }
    for w in &outcome.skipped {
        debug!("Round {}: {}", round, w);
    }
    if !outcome.skipped.is_empty() {
        warn!(
            "Round {}: {} gene/SNP pair(s) skipped (no usable samples or undefined correlation)",
            round,
            outcome.skipped.len()
        );
    }
    outcome
}
