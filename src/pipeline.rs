/// Round orchestration: preprocess → residualize → scan → correct, then
/// condition on each gene's lead SNP and repeat for a fixed number of rounds.
///
/// Every round's residual matrix is written as soon as it exists and its
/// significant-SNP table right after correction, so a run that stops early
/// leaves all completed rounds on disk.
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::cli::{ConditionArgs, RunArgs};
use crate::error::EqtlError;
use crate::fdr::SignificantSnpTable;
use crate::preprocess::{self, PreprocessSummary};
use crate::residualize::{self, Residualized};
use crate::samples::{self, SampleKeyMap};
use crate::scan::{self, SnpIndex};
use crate::table::{self, GeneLocation, SampleMatrix};

/// q-value cut-off used only for the per-round counts in the summary.
const SUMMARY_ALPHA: f64 = 0.05;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Effective settings of a run; written to `{prefix}.config.json`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub expression: String,
    pub genotype: String,
    pub geneloc: String,
    pub snploc: String,
    pub covariates: Option<String>,
    /// Empty means every covariate column.
    pub covariate_columns: Vec<String>,
    pub sample_map: Option<String>,
    pub sample_col: String,
    pub output_prefix: String,
    /// Number of rounds; no convergence check.
    pub fixed_iteration_count: usize,
    pub min_expressed_fraction: f64,
    pub test_subset_genes: Option<usize>,
    pub compress: bool,
}

impl PipelineConfig {
    pub fn from_args(args: RunArgs) -> Result<Self> {
        anyhow::ensure!(args.iterations >= 1, "--iterations must be at least 1");
        if let Some(n) = args.test_subset_genes {
            anyhow::ensure!(n >= 1, "--test-subset-genes must be at least 1");
        }
        Ok(PipelineConfig {
            expression: args.expression,
            genotype: args.genotype,
            geneloc: args.geneloc,
            snploc: args.snploc,
            covariates: args.covariates,
            covariate_columns: args.covariate_columns,
            sample_map: args.sample_map,
            sample_col: args.sample_col,
            output_prefix: args.output_prefix,
            fixed_iteration_count: args.iterations,
            min_expressed_fraction: args.min_expressed_fraction,
            test_subset_genes: args.test_subset_genes,
            compress: args.compress,
        })
    }

    fn output(&self) -> OutputLayout {
        OutputLayout {
            prefix: self.output_prefix.clone(),
            compress: self.compress,
        }
    }
}

/// File naming under an output prefix.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub prefix: String,
    pub compress: bool,
}

impl OutputLayout {
    fn ext(&self) -> &'static str {
        if self.compress { ".tsv.gz" } else { ".tsv" }
    }

    pub fn residuals(&self, round: usize) -> String {
        format!("{}.round{}.residuals{}", self.prefix, round, self.ext())
    }

    pub fn significant(&self, round: usize) -> String {
        format!("{}.round{}.significant_snps{}", self.prefix, round, self.ext())
    }

    pub fn config(&self) -> String {
        format!("{}.config.json", self.prefix)
    }

    pub fn summary(&self) -> String {
        format!("{}.summary.json", self.prefix)
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.prefix).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory '{}'", parent.display()))?;
            }
        }
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &str, value: &T) -> Result<()> {
    table::write_text(path, |w: &mut dyn Write| {
        serde_json::to_writer_pretty(&mut *w, value)?;
        writeln!(w)?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Counts for one completed round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round: usize,
    pub genes_residualized: usize,
    pub genes_failed: Vec<String>,
    pub genes_scanned: usize,
    pub genes_without_location: usize,
    pub tests: usize,
    pub skipped_pairs: usize,
    pub significant_q_below_0_05: usize,
    pub lead_snps: usize,
    pub residuals_path: String,
    pub significant_path: String,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub preprocess: Option<PreprocessSummary>,
    pub rounds: Vec<RoundSummary>,
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// Position in the fixed-iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Round(usize),
    Complete,
}

impl RoundState {
    pub fn next(self, fixed_iteration_count: usize) -> RoundState {
        match self {
            RoundState::Round(n) if n < fixed_iteration_count => RoundState::Round(n + 1),
            _ => RoundState::Complete,
        }
    }
}

/// Read-only inputs shared by every round.
pub struct RoundInputs {
    /// Genotypes with sample ids already in the expression id scheme.
    pub genotypes: SampleMatrix,
    pub genes: Vec<GeneLocation>,
    pub snp_index: SnpIndex,
}

/// What a round hands to the next one.
pub struct RoundOutput {
    pub residuals: SampleMatrix,
    pub table: SignificantSnpTable,
    pub summary: RoundSummary,
}

/// Scan, correct and persist round `round` from already residualized data.
///
/// The residual matrix is written before the scan starts.
fn finish_round(
    round: usize,
    residualized: Residualized,
    inputs: &RoundInputs,
    exclusions: &HashMap<String, HashSet<String>>,
    layout: &OutputLayout,
    sample_col: &str,
    started: Instant,
) -> Result<RoundOutput> {
    residualized.log_failures();
    let residuals = residualized.residuals;
    let residuals_path = layout.residuals(round);
    table::write_sample_matrix(&residuals_path, &residuals, sample_col)?;
    info!(
        "Round {}: {} gene(s) residualized, {} failed; wrote '{}'",
        round,
        residuals.n_columns(),
        residualized.failures.len(),
        residuals_path
    );

    let scanned = scan::scan_round(
        &residuals,
        &inputs.genotypes,
        &inputs.genes,
        &inputs.snp_index,
        exclusions,
        round,
    );
    let tests = scanned.rows.len();
    info!(
        "Round {}: {} gene(s) scanned, {} gene/SNP test(s)",
        round, scanned.genes_scanned, tests
    );

    let table = SignificantSnpTable::from_associations(round, scanned.rows)
        .with_context(|| format!("correcting round {}", round))?;
    let significant_path = layout.significant(round);
    table.write(&significant_path)?;

    let n_sig = table.n_significant(SUMMARY_ALPHA);
    let n_leads = table.lead_snps().len();
    info!(
        "Round {}: {} test(s) with q < {}, {} lead SNP(s); wrote '{}'",
        round, n_sig, SUMMARY_ALPHA, n_leads, significant_path
    );

    let summary = RoundSummary {
        round,
        genes_residualized: residuals.n_columns(),
        genes_failed: residualized
            .failures
            .iter()
            .filter_map(|e| e.gene().map(str::to_string))
            .collect(),
        genes_scanned: scanned.genes_scanned,
        genes_without_location: scanned.genes_without_location.len(),
        tests,
        skipped_pairs: scanned.skipped.len(),
        significant_q_below_0_05: n_sig,
        lead_snps: n_leads,
        residuals_path,
        significant_path,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    Ok(RoundOutput {
        residuals,
        table,
        summary,
    })
}

/// Add every lead of `table` to the per-gene exclusion sets.
fn record_leads(exclusions: &mut HashMap<String, HashSet<String>>, table: &SignificantSnpTable) {
    for lead in table.lead_snps() {
        exclusions
            .entry(lead.row.gene_id.clone())
            .or_default()
            .insert(lead.row.snp_id.clone());
    }
}

/// Drives rounds 1..=N over fixed inputs.
pub struct RoundOrchestrator {
    config: PipelineConfig,
    expression: SampleMatrix,
    covariates: Option<SampleMatrix>,
    inputs: RoundInputs,
    preprocess: Option<PreprocessSummary>,
}

impl RoundOrchestrator {
    pub fn new(
        config: PipelineConfig,
        expression: SampleMatrix,
        covariates: Option<SampleMatrix>,
        inputs: RoundInputs,
    ) -> Self {
        RoundOrchestrator {
            config,
            expression,
            covariates,
            inputs,
            preprocess: None,
        }
    }

    pub fn with_preprocess_summary(mut self, summary: PreprocessSummary) -> Self {
        self.preprocess = Some(summary);
        self
    }

    /// Run all rounds. A round that cannot be corrected stops the loop with
    /// an error; earlier rounds' files and the summary stay on disk.
    pub fn run(&self) -> Result<RunSummary> {
        let layout = self.config.output();
        layout.ensure_parent_dir()?;
        write_json(&layout.config(), &self.config)?;

        let mut summary = RunSummary {
            preprocess: self.preprocess,
            rounds: Vec::new(),
        };
        let mut exclusions: HashMap<String, HashSet<String>> = HashMap::new();
        let mut prior: Option<RoundOutput> = None;
        let mut state = RoundState::Round(1);

        while let RoundState::Round(n) = state {
            let started = Instant::now();
            info!("Round {}/{}", n, self.config.fixed_iteration_count);
            let residualized = match &prior {
                None => residualize::residualize_covariates(
                    &self.expression,
                    self.covariates.as_ref(),
                )?,
                Some(prev) => residualize::residualize_lead_snps(
                    &prev.residuals,
                    &self.inputs.genotypes,
                    &prev.table.lead_snp_ids(),
                )?,
            };
            let output = finish_round(
                n,
                residualized,
                &self.inputs,
                &exclusions,
                &layout,
                &self.config.sample_col,
                started,
            )?;
            record_leads(&mut exclusions, &output.table);
            summary.rounds.push(output.summary.clone());
            write_json(&layout.summary(), &summary)?;

            prior = Some(output);
            state = state.next(self.config.fixed_iteration_count);
        }
        debug_assert_eq!(state, RoundState::Complete);
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Input loading
// ---------------------------------------------------------------------------

/// Genotypes translated into expression sample ids, checked for overlap.
fn load_genotypes(
    path: &str,
    sample_map: Option<&str>,
    sample_col: &str,
    expression_samples: &[String],
) -> Result<SampleMatrix> {
    let key_map = match sample_map {
        Some(p) => SampleKeyMap::load(p)?,
        None => {
            info!("No sample map given; genotype sample ids are used as-is");
            SampleKeyMap::Identity
        }
    };
    let raw = table::read_sample_matrix(path, "genotype", sample_col)
        .with_context(|| format!("reading genotypes '{}'", path))?;
    info!(
        "Read genotypes: {} samples × {} SNPs",
        raw.n_samples(),
        raw.n_columns()
    );
    let genotypes = key_map.apply(raw)?;
    let shared = samples::check_overlap(expression_samples, &genotypes, "genotype")?;
    info!("{} sample(s) shared between expression and genotypes", shared);
    Ok(genotypes)
}

fn load_round_inputs(
    genotype: &str,
    geneloc: &str,
    snploc: &str,
    sample_map: Option<&str>,
    sample_col: &str,
    expression_samples: &[String],
) -> Result<RoundInputs> {
    let genotypes = load_genotypes(genotype, sample_map, sample_col, expression_samples)?;
    let genes = table::read_gene_locations(geneloc)
        .with_context(|| format!("reading gene locations '{}'", geneloc))?;
    let snps = table::read_snp_locations(snploc)
        .with_context(|| format!("reading SNP locations '{}'", snploc))?;
    let snp_index = SnpIndex::build(&genotypes, &snps);
    info!(
        "Read {} gene location(s), {} SNP location(s); {} SNP(s) genotyped and located",
        genes.len(),
        snps.len(),
        snp_index.n_snps()
    );
    Ok(RoundInputs {
        genotypes,
        genes,
        snp_index,
    })
}

/// Keep the first `n` expression genes that have a location.
fn subset_genes(expression: &SampleMatrix, genes: &[GeneLocation], n: usize) -> SampleMatrix {
    let located: HashSet<&str> = genes.iter().map(|g| g.gene_id.as_str()).collect();
    let keep: Vec<usize> = expression
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, g)| located.contains(g.as_str()))
        .map(|(j, _)| j)
        .take(n)
        .collect();
    expression.select_columns(&keep)
}

fn select_covariates(covariates: SampleMatrix, names: &[String]) -> Result<SampleMatrix> {
    if names.is_empty() {
        return Ok(covariates);
    }
    let index = covariates.column_index();
    let mut keep = Vec::with_capacity(names.len());
    for name in names {
        let j = index.get(name.as_str()).copied().ok_or_else(|| {
            EqtlError::validation("covariates", format!("column '{}' not found", name))
        })?;
        keep.push(j);
    }
    Ok(covariates.select_columns(&keep))
}

/// Entry point for the `run` subcommand.
pub fn run(args: RunArgs) -> Result<()> {
    let start = Instant::now();
    let config = PipelineConfig::from_args(args)?;

    let raw = table::read_sample_matrix(&config.expression, "expression", &config.sample_col)
        .with_context(|| format!("reading expression '{}'", config.expression))?;
    info!(
        "Read expression: {} samples × {} genes",
        raw.n_samples(),
        raw.n_columns()
    );
    let (mut expression, pre) =
        preprocess::preprocess_expression(&raw, config.min_expressed_fraction)?;
    preprocess::log_summary(&pre, config.min_expressed_fraction);

    let covariates = match &config.covariates {
        Some(path) => {
            let c = table::read_sample_matrix(path, "covariates", &config.sample_col)
                .with_context(|| format!("reading covariates '{}'", path))?;
            let c = select_covariates(c, &config.covariate_columns)?;
            samples::check_overlap(expression.samples(), &c, "covariates")?;
            info!("Using {} covariate(s): {}", c.n_columns(), c.columns().join(", "));
            Some(c)
        }
        None => {
            info!("No covariates; round 1 regresses on the intercept only");
            None
        }
    };

    let inputs = load_round_inputs(
        &config.genotype,
        &config.geneloc,
        &config.snploc,
        config.sample_map.as_deref(),
        &config.sample_col,
        expression.samples(),
    )?;

    if let Some(n) = config.test_subset_genes {
        expression = subset_genes(&expression, &inputs.genes, n);
        warn!(
            "Test mode: restricted to the first {} located gene(s)",
            expression.n_columns()
        );
    }

    let summary = RoundOrchestrator::new(config, expression, covariates, inputs)
        .with_preprocess_summary(pre)
        .run()?;
    info!(
        "Completed {} round(s) in {:.1}s",
        summary.rounds.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Entry point for the `condition` subcommand: one conditional round from a
/// persisted residual matrix and significant-SNP table.
pub fn run_condition(args: ConditionArgs) -> Result<()> {
    anyhow::ensure!(
        args.round >= 2,
        "--round must be at least 2 (round 1 has no conditioning SNPs)"
    );
    let started = Instant::now();
    let prev_round = args.round - 1;

    let prior = table::read_sample_matrix(&args.residuals, "residuals", &args.sample_col)
        .with_context(|| format!("reading residuals '{}'", args.residuals))?;
    let table = SignificantSnpTable::read(&args.significant, prev_round)
        .with_context(|| format!("reading significant SNPs '{}'", args.significant))?;
    let leads = table.lead_snp_ids();
    info!(
        "Round {}: conditioning {} gene(s) on their round-{} lead SNP",
        args.round,
        leads.len(),
        table.round
    );

    let mut exclusions: HashMap<String, HashSet<String>> = HashMap::new();
    record_leads(&mut exclusions, &table);
    for path in &args.exclude_leads_from {
        let earlier = SignificantSnpTable::read(path, 0)
            .with_context(|| format!("reading significant SNPs '{}'", path))?;
        record_leads(&mut exclusions, &earlier);
    }

    let inputs = load_round_inputs(
        &args.genotype,
        &args.geneloc,
        &args.snploc,
        args.sample_map.as_deref(),
        &args.sample_col,
        prior.samples(),
    )?;

    let layout = OutputLayout {
        prefix: args.output_prefix.clone(),
        compress: args.compress,
    };
    layout.ensure_parent_dir()?;
    let residualized = residualize::residualize_lead_snps(&prior, &inputs.genotypes, &leads)?;
    let output = finish_round(
        args.round,
        residualized,
        &inputs,
        &exclusions,
        &layout,
        &args.sample_col,
        started,
    )?;
    write_json(
        &layout.summary(),
        &RunSummary {
            preprocess: None,
            rounds: vec![output.summary],
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn config(prefix: &str, iterations: usize) -> PipelineConfig {
        PipelineConfig {
            expression: "expr.tsv".into(),
            genotype: "geno.tsv".into(),
            geneloc: "geneloc.tsv".into(),
            snploc: "snploc.tsv".into(),
            covariates: None,
            covariate_columns: Vec::new(),
            sample_map: None,
            sample_col: "sampleid".into(),
            output_prefix: prefix.into(),
            fixed_iteration_count: iterations,
            min_expressed_fraction: 0.1,
            test_subset_genes: None,
            compress: false,
        }
    }

    /// Two genes on chr1 and three SNPs, six samples.
    fn fixture() -> (SampleMatrix, RoundInputs) {
        let samples = ids(&["s1", "s2", "s3", "s4", "s5", "s6"]);
        let expression = SampleMatrix::new(
            "expression",
            samples.clone(),
            ids(&["G1", "G2"]),
            array![
                [0.1, 2.0],
                [0.9, 1.1],
                [2.2, 0.4],
                [2.9, 3.0],
                [4.1, 0.2],
                [5.3, 1.7]
            ],
        )
        .unwrap();
        let genotypes = SampleMatrix::new(
            "genotype",
            samples,
            ids(&["1:100_A_G", "1:200_C_T", "1:300_G_A"]),
            array![
                [0.0, 1.0, 2.0],
                [0.0, 2.0, 1.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 2.0],
                [2.0, 0.0, 1.0],
                [2.0, 2.0, 0.0]
            ],
        )
        .unwrap();
        let snps = vec![
            table::SnpLocation {
                snp_id: "1:100_A_G".into(),
                chrom: "1".into(),
                pos: 100,
            },
            table::SnpLocation {
                snp_id: "1:200_C_T".into(),
                chrom: "1".into(),
                pos: 200,
            },
            table::SnpLocation {
                snp_id: "1:300_G_A".into(),
                chrom: "1".into(),
                pos: 300,
            },
        ];
        let snp_index = SnpIndex::build(&genotypes, &snps);
        let genes = vec![
            GeneLocation {
                gene_id: "G1".into(),
                chrom: "1".into(),
                start: 150,
                end: 250,
            },
            GeneLocation {
                gene_id: "G2".into(),
                chrom: "1".into(),
                start: 150,
                end: 250,
            },
        ];
        (
            expression,
            RoundInputs {
                genotypes,
                genes,
                snp_index,
            },
        )
    }

    #[test]
    fn test_round_state_transitions() {
        assert_eq!(RoundState::Round(1).next(1), RoundState::Complete);
        assert_eq!(RoundState::Round(1).next(3), RoundState::Round(2));
        assert_eq!(RoundState::Round(3).next(3), RoundState::Complete);
        assert_eq!(RoundState::Complete.next(3), RoundState::Complete);
    }

    #[test]
    fn test_output_layout_names() {
        let l = OutputLayout {
            prefix: "out/chr22".into(),
            compress: true,
        };
        assert_eq!(l.residuals(2), "out/chr22.round2.residuals.tsv.gz");
        assert_eq!(l.significant(1), "out/chr22.round1.significant_snps.tsv.gz");
        assert_eq!(l.summary(), "out/chr22.summary.json");
    }

    /// A single round writes one residual matrix and one table.
    #[test]
    fn test_single_iteration_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("chr1").to_str().unwrap().to_string();
        let (expression, inputs) = fixture();
        let summary = RoundOrchestrator::new(config(&prefix, 1), expression, None, inputs)
            .run()
            .unwrap();
        assert_eq!(summary.rounds.len(), 1);
        assert_eq!(summary.rounds[0].tests, 6);
        assert!(Path::new(&format!("{}.round1.residuals.tsv", prefix)).exists());
        assert!(Path::new(&format!("{}.round1.significant_snps.tsv", prefix)).exists());
        assert!(!Path::new(&format!("{}.round2.residuals.tsv", prefix)).exists());
        assert!(Path::new(&format!("{}.config.json", prefix)).exists());
    }

    /// Later rounds never retest a gene's earlier lead SNPs.
    #[test]
    fn test_prior_leads_excluded_across_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("chr1").to_str().unwrap().to_string();
        let (expression, inputs) = fixture();
        let summary = RoundOrchestrator::new(config(&prefix, 3), expression, None, inputs)
            .run()
            .unwrap();
        assert_eq!(summary.rounds.len(), 3);
        assert_eq!(
            summary.rounds.iter().map(|r| r.tests).collect::<Vec<_>>(),
            vec![6, 4, 2]
        );

        let mut seen: HashMap<String, HashSet<String>> = HashMap::new();
        for round in 1..=3 {
            let t = SignificantSnpTable::read(&format!("{}.round{}.significant_snps.tsv", prefix, round), round)
                .unwrap();
            for r in &t.rows {
                let prior = seen.get(&r.row.gene_id);
                assert!(
                    prior.is_none_or(|s| !s.contains(&r.row.snp_id)),
                    "round {} retested lead {} for {}",
                    round,
                    r.row.snp_id,
                    r.row.gene_id
                );
            }
            record_leads(&mut seen, &t);
        }
    }

    /// Too few tests in a round stops the run; round-1 files remain.
    #[test]
    fn test_insufficient_tests_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("chr1").to_str().unwrap().to_string();
        let (expression, inputs) = fixture();
        // one gene, three SNPs: rounds 1-3 test 3, 2, 1 SNP(s)
        let expression = expression.select_columns(&[0]);
        let err = RoundOrchestrator::new(config(&prefix, 4), expression, None, inputs)
            .run()
            .unwrap_err();
        let e = err.downcast_ref::<EqtlError>().expect("typed error");
        assert_eq!(e, &EqtlError::InsufficientTests { round: 3, n_tests: 1 });
        assert!(Path::new(&format!("{}.round2.significant_snps.tsv", prefix)).exists());
        assert!(Path::new(&format!("{}.round3.residuals.tsv", prefix)).exists());
        assert!(!Path::new(&format!("{}.round3.significant_snps.tsv", prefix)).exists());

        let summary = std::fs::read_to_string(format!("{}.summary.json", prefix)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(json["rounds"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_subset_genes_keeps_located_in_order() {
        let (expression, inputs) = fixture();
        let with_unlocated = SampleMatrix::from_columns(
            "expression",
            expression.samples().to_vec(),
            vec![
                ("NOLOC".into(), vec![1.0; 6]),
                ("G2".into(), expression.column(1).to_vec()),
                ("G1".into(), expression.column(0).to_vec()),
            ],
        )
        .unwrap();
        let s = subset_genes(&with_unlocated, &inputs.genes, 1);
        assert_eq!(s.columns(), &ids(&["G2"]));
    }

    #[test]
    fn test_select_covariates_by_name() {
        let cov = SampleMatrix::new(
            "covariates",
            ids(&["s1", "s2"]),
            ids(&["sex", "age", "pc1"]),
            array![[0.0, 30.0, 0.1], [1.0, 40.0, 0.2]],
        )
        .unwrap();
        let c = select_covariates(cov.clone(), &ids(&["pc1", "sex"])).unwrap();
        assert_eq!(c.columns(), &ids(&["pc1", "sex"]));
        assert!(select_covariates(cov, &ids(&["bmi"])).is_err());
    }
}
