/// Input-layout planning for cell type × chromosome jobs.
///
/// Checks that every file each job needs is present and writes a manifest
/// with one `run` invocation's inputs per row. Nothing is scheduled.
use anyhow::{Context, Result};
use log::{error, info};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cli::PlanArgs;
use crate::table::{self, normalize_chrom};

const EXPRESSION_SUFFIX: &str = "_expression.tsv";

/// The fixed directory layout under an input root.
#[derive(Debug, Clone)]
pub struct InputLayout {
    root: PathBuf,
}

impl InputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        InputLayout { root: root.into() }
    }

    pub fn expression(&self, cell_type: &str) -> PathBuf {
        self.root
            .join("expression_files")
            .join(format!("{}{}", cell_type, EXPRESSION_SUFFIX))
    }

    pub fn covariates(&self, cell_type: &str) -> PathBuf {
        self.root
            .join("covariates_files")
            .join(format!("{}_peer_factors.tsv", cell_type))
    }

    pub fn genotype(&self, chrom: &str) -> PathBuf {
        self.root
            .join("genotype_files")
            .join(format!("tob_genotype_chr{}.tsv", chrom))
    }

    pub fn geneloc(&self, chrom: &str) -> PathBuf {
        self.root
            .join("gene_location_files")
            .join(format!("GRCh38_geneloc_chr{}.tsv", chrom))
    }

    pub fn snploc(&self, chrom: &str) -> PathBuf {
        self.root
            .join("snp_location_files")
            .join(format!("snpsloc_chr{}.tsv", chrom))
    }

    /// Cell types with a `{cell_type}_expression.tsv` file, sorted.
    pub fn discover_cell_types(&self) -> Result<Vec<String>> {
        let dir = self.root.join("expression_files");
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("listing '{}'", dir.display()))?
        {
            let entry = entry.with_context(|| format!("listing '{}'", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(cell_type) = name.strip_suffix(EXPRESSION_SUFFIX) {
                if !cell_type.is_empty() {
                    found.push(cell_type.to_string());
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Inputs and output prefix of one cell type × chromosome run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub cell_type: String,
    pub chromosome: String,
    pub expression: PathBuf,
    pub covariates: PathBuf,
    pub genotype: PathBuf,
    pub geneloc: PathBuf,
    pub snploc: PathBuf,
    pub output_prefix: PathBuf,
}

impl Job {
    fn inputs(&self) -> [&Path; 5] {
        [
            self.expression.as_path(),
            self.covariates.as_path(),
            self.genotype.as_path(),
            self.geneloc.as_path(),
            self.snploc.as_path(),
        ]
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub jobs: Vec<Job>,
    /// Each missing file once, in the order first needed.
    pub missing: Vec<PathBuf>,
}

/// Build the job list and check which inputs are absent.
pub fn plan_jobs(
    layout: &InputLayout,
    cell_types: &[String],
    chromosomes: &[String],
    output_dir: &Path,
) -> Plan {
    let mut plan = Plan::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    for cell_type in cell_types {
        for chrom in chromosomes {
            let chrom = normalize_chrom(chrom);
            let job = Job {
                cell_type: cell_type.clone(),
                chromosome: chrom.clone(),
                expression: layout.expression(cell_type),
                covariates: layout.covariates(cell_type),
                genotype: layout.genotype(&chrom),
                geneloc: layout.geneloc(&chrom),
                snploc: layout.snploc(&chrom),
                output_prefix: output_dir
                    .join(format!("eqtl_results_{}", cell_type))
                    .join(format!("chr{}", chrom)),
            };
            for path in job.inputs() {
                if !path.exists() && seen.insert(path.to_path_buf()) {
                    plan.missing.push(path.to_path_buf());
                }
            }
            plan.jobs.push(job);
        }
    }
    plan
}

pub fn write_manifest(path: &str, jobs: &[Job]) -> Result<()> {
    table::write_text(path, |w: &mut dyn Write| {
        writeln!(
            w,
            "cell_type\tchromosome\texpression\tcovariates\tgenotype\tgeneloc\tsnploc\toutput_prefix"
        )?;
        for j in jobs {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                j.cell_type,
                j.chromosome,
                j.expression.display(),
                j.covariates.display(),
                j.genotype.display(),
                j.geneloc.display(),
                j.snploc.display(),
                j.output_prefix.display()
            )?;
        }
        Ok(())
    })
}

/// Entry point for the `plan` subcommand.
pub fn run(args: PlanArgs) -> Result<()> {
    let layout = InputLayout::new(&args.input_path);
    let cell_types = if args.cell_types.is_empty() {
        let found = layout.discover_cell_types()?;
        info!("Found {} cell type(s): {}", found.len(), found.join(", "));
        found
    } else {
        args.cell_types.clone()
    };
    anyhow::ensure!(
        !cell_types.is_empty(),
        "no cell types given or found under '{}'",
        args.input_path
    );

    let output_dir = PathBuf::from(&args.output_dir);
    let plan = plan_jobs(&layout, &cell_types, &args.chromosomes, &output_dir);
    for path in &plan.missing {
        error!("File {} is missing", path.display());
    }

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory '{}'", args.output_dir))?;
    let manifest = args
        .manifest
        .clone()
        .unwrap_or_else(|| output_dir.join("manifest.tsv").to_string_lossy().into_owned());
    write_manifest(&manifest, &plan.jobs)?;
    info!(
        "Wrote {} job(s) for {} cell type(s) × {} chromosome(s) to '{}'",
        plan.jobs.len(),
        cell_types.len(),
        args.chromosomes.len(),
        manifest
    );

    anyhow::ensure!(
        plan.missing.is_empty(),
        "{} input file(s) missing",
        plan.missing.len()
    );
    Ok(())
}
