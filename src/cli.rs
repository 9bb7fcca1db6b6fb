/// CLI argument definitions using clap derive macros.
use clap::{Args, Parser, Subcommand};

use crate::preprocess::DEFAULT_MIN_EXPRESSED_FRACTION;

#[cfg(feature = "blas-openblas-static")]
const CLI_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (openblas-static)");
#[cfg(feature = "blas-openblas-system")]
const CLI_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (openblas-system)");
#[cfg(not(any(feature = "blas-openblas-static", feature = "blas-openblas-system")))]
const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "cis-eqtl",
    about = "Iterative conditional cis-eQTL mapping (Spearman rank correlation)",
    version = CLI_VERSION
)]
pub struct Cli {
    /// Number of OpenBLAS threads (global; default 4).
    /// Per-gene fits are small; parallelism comes from Rayon, not BLAS.
    #[arg(long, default_value_t = 4, global = true)]
    pub blas_threads: usize,

    /// Number of Rayon threads (global). Defaults to Rayon’s internal heuristic.
    #[arg(long, global = true)]
    pub rayon_threads: Option<usize>,

    /// Number of Polars threads (global). Defaults to Polars’ internal heuristic.
    #[arg(long, global = true)]
    pub polars_threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run all conditional rounds for one cell type / chromosome
    Run(RunArgs),
    /// Filter lowly expressed genes and apply ln(x + 1)
    Preprocess(PreprocessArgs),
    /// Run one conditional round from a previous round's outputs
    Condition(ConditionArgs),
    /// Check an input directory and write a cell type × chromosome job manifest
    Plan(PlanArgs),
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RunArgs {
    /// Expression matrix: sample-id column + one column per gene (TSV, .gz/.bz2 ok)
    #[arg(long)]
    pub expression: String,

    /// Genotype matrix: sample-id column + one dosage column per SNP
    #[arg(long)]
    pub genotype: String,

    /// Gene locations: geneid, chr, start, end
    #[arg(long)]
    pub geneloc: String,

    /// SNP locations: snpid, chr, pos
    #[arg(long)]
    pub snploc: String,

    /// Covariates: sample-id column + numeric covariates (sex, age, PCs, PEER factors).
    /// Without it round 1 regresses on the intercept only.
    #[arg(long)]
    pub covariates: Option<String>,

    /// Comma-separated covariate columns to use (default: all)
    #[arg(long, value_delimiter = ',')]
    pub covariate_columns: Vec<String>,

    /// Two-column TSV translating genotype sample ids (first column) to
    /// expression sample ids (second column). Default: ids already match.
    #[arg(long)]
    pub sample_map: Option<String>,

    /// Name of the sample-identifier column in every sample × feature table
    #[arg(long, default_value = "sampleid")]
    pub sample_col: String,

    /// Output prefix; files are {prefix}.round{n}.residuals.tsv etc.
    #[arg(long)]
    pub output_prefix: String,

    /// Number of rounds (round 1 plus conditional rounds)
    #[arg(long, default_value_t = 4)]
    pub iterations: usize,

    /// Keep genes expressed (> 0) in strictly more than this fraction of samples
    #[arg(long, default_value_t = DEFAULT_MIN_EXPRESSED_FRACTION)]
    pub min_expressed_fraction: f64,

    /// Only analyse the first N located genes (smoke tests)
    #[arg(long)]
    pub test_subset_genes: Option<usize>,

    /// Gzip the per-round TSV outputs
    #[arg(long, default_value_t = false)]
    pub compress: bool,
}

// ---------------------------------------------------------------------------
// preprocess
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct PreprocessArgs {
    /// Expression matrix: sample-id column + one column per gene
    #[arg(long)]
    pub expression: String,

    /// Output path (.gz to compress)
    #[arg(long)]
    pub out: String,

    /// Keep genes expressed (> 0) in strictly more than this fraction of samples
    #[arg(long, default_value_t = DEFAULT_MIN_EXPRESSED_FRACTION)]
    pub min_expressed_fraction: f64,

    /// Name of the sample-identifier column
    #[arg(long, default_value = "sampleid")]
    pub sample_col: String,
}

// ---------------------------------------------------------------------------
// condition
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConditionArgs {
    /// Residual matrix of the previous round
    #[arg(long)]
    pub residuals: String,

    /// Significant-SNP table of the previous round (its lead SNPs are conditioned on)
    #[arg(long)]
    pub significant: String,

    /// Comma-separated significant-SNP tables of earlier rounds whose lead SNPs
    /// are also excluded from the scan
    #[arg(long, value_delimiter = ',')]
    pub exclude_leads_from: Vec<String>,

    /// Genotype matrix: sample-id column + one dosage column per SNP
    #[arg(long)]
    pub genotype: String,

    /// Gene locations: geneid, chr, start, end
    #[arg(long)]
    pub geneloc: String,

    /// SNP locations: snpid, chr, pos
    #[arg(long)]
    pub snploc: String,

    /// Number of the round to run (>= 2)
    #[arg(long)]
    pub round: usize,

    /// Output prefix; files are {prefix}.round{n}.residuals.tsv etc.
    #[arg(long)]
    pub output_prefix: String,

    /// Two-column TSV translating genotype sample ids to residual sample ids
    #[arg(long)]
    pub sample_map: Option<String>,

    /// Name of the sample-identifier column
    #[arg(long, default_value = "sampleid")]
    pub sample_col: String,

    /// Gzip the TSV outputs
    #[arg(long, default_value_t = false)]
    pub compress: bool,
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct PlanArgs {
    /// Directory holding expression_files/, covariates_files/, genotype_files/,
    /// gene_location_files/ and snp_location_files/
    #[arg(long)]
    pub input_path: String,

    /// Comma-separated chromosomes (e.g. 1,2,22)
    #[arg(long, value_delimiter = ',', required = true)]
    pub chromosomes: Vec<String>,

    /// Comma-separated cell types (default: every {cell_type}_expression.tsv found)
    #[arg(long, value_delimiter = ',')]
    pub cell_types: Vec<String>,

    /// Root of the per-job output prefixes
    #[arg(long)]
    pub output_dir: String,

    /// Manifest path (default: {output_dir}/manifest.tsv)
    #[arg(long)]
    pub manifest: Option<String>,
}
