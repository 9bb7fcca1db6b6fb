/// Tabular I/O: Polars readers for the pipeline's TSV inputs and plain
/// writers for its outputs.
///
/// Every input is a tab-separated file with a header row; `NA` and empty
/// fields are missing. `.gz` and `.bz2` inputs are decompressed to a temp file
/// first. Outputs ending in `.gz` are gzip-compressed.
use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView1, Axis};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use bzip2_rs::DecoderReader;
use flate2::read::MultiGzDecoder;
use tempfile::Builder as TempBuilder;

use crate::error::EqtlError;

static DECOMPRESSED_TEMPFILES: OnceLock<Mutex<Vec<tempfile::TempPath>>> = OnceLock::new();

/// Return a path Polars can read directly, decompressing `.gz`/`.bz2` inputs
/// into a temp file that lives until the process exits.
pub fn resolve_text_path(path: &str) -> Result<PathBuf> {
    let is_gz = path.ends_with(".gz");
    if !is_gz && !path.ends_with(".bz2") {
        return Ok(PathBuf::from(path));
    }

    let input = File::open(path).with_context(|| format!("opening compressed file '{}'", path))?;
    let mut tmp = TempBuilder::new()
        .prefix("cis_eqtl_")
        .suffix(".tsv")
        .tempfile()
        .context("creating temp file for decompression")?;
    let copied = if is_gz {
        std::io::copy(&mut MultiGzDecoder::new(input), &mut tmp)
    } else {
        std::io::copy(&mut DecoderReader::new(input), &mut tmp)
    };
    copied.with_context(|| format!("decompressing '{}'", path))?;

    let temp_path = tmp.into_temp_path();
    let temp_buf = temp_path.to_path_buf();
    DECOMPRESSED_TEMPFILES
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .expect("tempfile registry mutex poisoned")
        .push(temp_path);

    Ok(temp_buf)
}

/// Read a tab-separated file with a header into a DataFrame.
pub fn read_tsv(path: &str) -> Result<DataFrame> {
    let resolved = resolve_text_path(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        // Types from the whole file; a sample-major column can change late.
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_separator(b'\t')
                .with_null_values(Some(NullValues::AllColumns(vec![
                    "NA".into(),
                    "".into(),
                ])))
        })
        .try_into_reader_with_file_path(Some(resolved))
        .with_context(|| format!("opening '{}'", path))?
        .finish()
        .with_context(|| format!("parsing '{}'", path))?;
    Ok(df)
}

// ---------------------------------------------------------------------------
// Column-name synonym map
// ---------------------------------------------------------------------------

/// (uppercase_synonym, canonical_name) pairs.
const CNAME_MAP: &[(&str, &str)] = &[
    // Sample identifier
    ("SAMPLEID", "sampleid"),
    ("SAMPLE_ID", "sampleid"),
    ("SAMPLE", "sampleid"),
    ("IID", "sampleid"),
    // Gene identifier
    ("GENEID", "geneid"),
    ("GENE_ID", "geneid"),
    ("GENE", "geneid"),
    ("PHENOTYPE_ID", "geneid"),
    // SNP identifier
    ("SNPID", "snpid"),
    ("SNP_ID", "snpid"),
    ("SNP", "snpid"),
    ("RSID", "snpid"),
    ("VARIANT_ID", "snpid"),
    // Chromosome
    ("CHR", "chr"),
    ("CHROM", "chr"),
    ("#CHROM", "chr"),
    ("CHROMOSOME", "chr"),
    // Gene body
    ("START", "start"),
    ("S1", "start"),
    ("GENE_START", "start"),
    ("END", "end"),
    ("S2", "end"),
    ("GENE_END", "end"),
    // SNP position
    ("POS", "pos"),
    ("POSITION", "pos"),
    ("BP", "pos"),
    ("LOCUS", "locus"),
    // Association statistics
    ("COEF", "coef"),
    ("RHO", "coef"),
    ("P", "p_value"),
    ("P.VALUE", "p_value"),
    ("P_VALUE", "p_value"),
    ("PVALUE", "p_value"),
    ("PVAL", "p_value"),
    ("Q", "q_value"),
    ("Q_VALUE", "q_value"),
    ("QVALUE", "q_value"),
    ("FDR", "q_value"),
    ("N_SAMPLES", "n_samples"),
    ("ROUND", "round"),
];

fn cname_lookup(upper: &str) -> Option<&'static str> {
    CNAME_MAP.iter().find(|(k, _)| *k == upper).map(|(_, v)| *v)
}

/// Map canonical column names to the actual header names of `df`.
///
/// Two header columns mapping to the same canonical name is a validation
/// error; silently picking one would hide a misaligned file.
pub fn canonical_columns(df: &DataFrame, table: &str) -> Result<HashMap<&'static str, String>> {
    let mut found: HashMap<&'static str, String> = HashMap::new();
    for name in df.get_column_names() {
        if let Some(canonical) = cname_lookup(&name.to_uppercase()) {
            if let Some(previous) = found.insert(canonical, name.to_string()) {
                return Err(EqtlError::validation(
                    table,
                    format!(
                        "columns '{}' and '{}' both map to '{}'",
                        previous, name, canonical
                    ),
                )
                .into());
            }
        }
    }
    Ok(found)
}

pub(crate) fn require_column<'a>(
    columns: &'a HashMap<&'static str, String>,
    canonical: &str,
    table: &str,
) -> Result<&'a str> {
    columns.get(canonical).map(|s| s.as_str()).ok_or_else(|| {
        EqtlError::validation(table, format!("required column '{}' not found", canonical)).into()
    })
}

/// Resolve the sample-identifier column: the requested name (case-insensitive),
/// or any sample-id synonym when the default name is requested.
fn resolve_sample_column(names: &[String], requested: &str) -> Option<String> {
    if let Some(found) = names.iter().find(|n| n.eq_ignore_ascii_case(requested)) {
        return Some(found.clone());
    }
    if cname_lookup(&requested.to_uppercase()) != Some("sampleid") {
        return None;
    }
    names
        .iter()
        .find(|n| cname_lookup(&n.to_uppercase()) == Some("sampleid"))
        .cloned()
}

pub(crate) fn string_values(df: &DataFrame, name: &str, table: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .with_context(|| format!("column '{}' in {}", name, table))?
        .cast(&DataType::String)
        .with_context(|| format!("casting column '{}' to string", name))?;
    let ca = column
        .str()
        .with_context(|| format!("column '{}' as string", name))?;
    ca.into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.map(|s| s.trim().to_string()).ok_or_else(|| {
                EqtlError::validation(table, format!("missing '{}' at data row {}", name, i + 1))
                    .into()
            })
        })
        .collect()
}

pub(crate) fn f64_values(df: &DataFrame, name: &str, table: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .with_context(|| format!("column '{}' in {}", name, table))?;
    // Polars infers an all-missing column as strings.
    if column.null_count() == column.len() {
        return Ok(vec![f64::NAN; column.len()]);
    }
    if matches!(column.dtype(), DataType::String) {
        return Err(EqtlError::validation(
            table,
            format!("column '{}' is not numeric", name),
        )
        .into());
    }
    let cast = column
        .cast(&DataType::Float64)
        .with_context(|| format!("casting column '{}' to f64", name))?;
    let ca = cast
        .f64()
        .with_context(|| format!("column '{}' as f64", name))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub(crate) fn i64_values(df: &DataFrame, name: &str, table: &str) -> Result<Vec<i64>> {
    f64_values(df, name, table)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            if v.is_finite() && v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(EqtlError::validation(
                    table,
                    format!("column '{}' row {}: '{}' is not a coordinate", name, i + 1, v),
                )
                .into())
            }
        })
        .collect()
}

/// Strip a leading `chr` so `chr22` and `22` compare equal.
pub fn normalize_chrom(chrom: &str) -> String {
    chrom.trim().trim_start_matches("chr").to_string()
}

// ---------------------------------------------------------------------------
// Sample × feature matrices
// ---------------------------------------------------------------------------

/// A samples × columns numeric table keyed by sample id (NaN = missing).
///
/// Used for expression, genotype, covariate and residual matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    samples: Vec<String>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl SampleMatrix {
    pub fn new(
        table: &str,
        samples: Vec<String>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, EqtlError> {
        if values.dim() != (samples.len(), columns.len()) {
            return Err(EqtlError::validation(
                table,
                format!(
                    "{} samples × {} columns do not match a {:?} value matrix",
                    samples.len(),
                    columns.len(),
                    values.dim()
                ),
            ));
        }
        if let Some(dup) = first_duplicate(&samples) {
            return Err(EqtlError::validation(
                table,
                format!("duplicate sample id '{}'", dup),
            ));
        }
        if let Some(dup) = first_duplicate(&columns) {
            return Err(EqtlError::validation(
                table,
                format!("duplicate column '{}'", dup),
            ));
        }
        Ok(SampleMatrix {
            samples,
            columns,
            values,
        })
    }

    /// Build from named columns of equal length.
    pub fn from_columns(
        table: &str,
        samples: Vec<String>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, EqtlError> {
        let n = samples.len();
        let mut values = Array2::<f64>::from_elem((n, columns.len()), f64::NAN);
        let mut names = Vec::with_capacity(columns.len());
        for (j, (name, col)) in columns.into_iter().enumerate() {
            if col.len() != n {
                return Err(EqtlError::validation(
                    table,
                    format!("column '{}' has {} values for {} samples", name, col.len(), n),
                ));
            }
            for (i, v) in col.into_iter().enumerate() {
                values[[i, j]] = v;
            }
            names.push(name);
        }
        SampleMatrix::new(table, samples, names, values)
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
        self.values.column(j)
    }

    pub fn column_index(&self) -> HashMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(j, c)| (c.as_str(), j))
            .collect()
    }

    pub fn sample_index(&self) -> HashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect()
    }

    /// Keep the given columns, in the given order.
    pub fn select_columns(&self, keep: &[usize]) -> SampleMatrix {
        SampleMatrix {
            samples: self.samples.clone(),
            columns: keep.iter().map(|&j| self.columns[j].clone()).collect(),
            values: self.values.select(Axis(1), keep),
        }
    }

    pub fn map_values_inplace(&mut self, f: impl Fn(f64) -> f64) {
        self.values.mapv_inplace(f);
    }

    /// Replace the sample ids (same order), re-checking uniqueness.
    pub fn with_samples(self, table: &str, samples: Vec<String>) -> Result<Self, EqtlError> {
        SampleMatrix::new(table, samples, self.columns, self.values)
    }

    /// Keep the given sample rows, in the given order.
    pub fn select_samples(&self, keep: &[usize]) -> SampleMatrix {
        SampleMatrix {
            samples: keep.iter().map(|&i| self.samples[i].clone()).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), keep),
        }
    }

    /// For each id in `target`, the row of this matrix holding that sample.
    pub fn aligned_rows(&self, target: &[String]) -> Vec<Option<usize>> {
        let index = self.sample_index();
        target.iter().map(|s| index.get(s.as_str()).copied()).collect()
    }
}

fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().find(|id| !seen.insert(id.as_str())).map(|s| s.as_str())
}

/// Read a sample-id column plus numeric columns into a [`SampleMatrix`].
pub fn read_sample_matrix(path: &str, table: &str, sample_col: &str) -> Result<SampleMatrix> {
    let df = read_tsv(path)?;
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let sample_name = resolve_sample_column(&names, sample_col).ok_or_else(|| {
        EqtlError::validation(
            table,
            format!("sample-identifier column '{}' not found in '{}'", sample_col, path),
        )
    })?;
    let samples = string_values(&df, &sample_name, table)?;

    let mut columns = Vec::with_capacity(names.len().saturating_sub(1));
    for name in names.iter().filter(|n| **n != sample_name) {
        columns.push((name.clone(), f64_values(&df, name, table)?));
    }
    Ok(SampleMatrix::from_columns(table, samples, columns)?)
}

// ---------------------------------------------------------------------------
// Location tables
// ---------------------------------------------------------------------------

/// Genomic coordinates of one gene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneLocation {
    pub gene_id: String,
    /// Chromosome without a `chr` prefix.
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

/// Genomic coordinate of one SNP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnpLocation {
    pub snp_id: String,
    /// Chromosome without a `chr` prefix.
    pub chrom: String,
    pub pos: i64,
}

/// Read `geneid chr start end` rows.
pub fn read_gene_locations(path: &str) -> Result<Vec<GeneLocation>> {
    let table = "gene locations";
    let df = read_tsv(path)?;
    let cols = canonical_columns(&df, table)?;
    let ids = string_values(&df, require_column(&cols, "geneid", table)?, table)?;
    let chroms = string_values(&df, require_column(&cols, "chr", table)?, table)?;
    let starts = i64_values(&df, require_column(&cols, "start", table)?, table)?;
    let ends = i64_values(&df, require_column(&cols, "end", table)?, table)?;

    if let Some(dup) = first_duplicate(&ids) {
        return Err(EqtlError::validation(table, format!("duplicate gene id '{}'", dup)).into());
    }

    let mut genes = Vec::with_capacity(ids.len());
    for (((gene_id, chrom), start), end) in ids.into_iter().zip(chroms).zip(starts).zip(ends) {
        if start > end {
            return Err(EqtlError::validation(
                table,
                format!("gene '{}' starts at {} after its end {}", gene_id, start, end),
            )
            .into());
        }
        genes.push(GeneLocation {
            gene_id,
            chrom: normalize_chrom(&chrom),
            start,
            end,
        });
    }
    Ok(genes)
}

/// Read `snpid chr pos` rows.
pub fn read_snp_locations(path: &str) -> Result<Vec<SnpLocation>> {
    let table = "SNP locations";
    let df = read_tsv(path)?;
    let cols = canonical_columns(&df, table)?;
    let ids = string_values(&df, require_column(&cols, "snpid", table)?, table)?;
    let chroms = string_values(&df, require_column(&cols, "chr", table)?, table)?;
    let positions = i64_values(&df, require_column(&cols, "pos", table)?, table)?;

    if let Some(dup) = first_duplicate(&ids) {
        return Err(EqtlError::validation(table, format!("duplicate SNP id '{}'", dup)).into());
    }

    Ok(ids
        .into_iter()
        .zip(chroms)
        .zip(positions)
        .map(|((snp_id, chrom), pos)| SnpLocation {
            snp_id,
            chrom: normalize_chrom(&chrom),
            pos,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Create `path` and hand a writer to `body`; gzip when the path ends in `.gz`.
pub fn write_text<F>(path: &str, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let file = File::create(path).with_context(|| format!("creating '{}'", path))?;
    if path.ends_with(".gz") {
        let mut gz = GzEncoder::new(BufWriter::new(file), Compression::fast());
        body(&mut gz).with_context(|| format!("writing '{}'", path))?;
        gz.finish()
            .context("finalising gzip output")?
            .flush()
            .with_context(|| format!("flushing '{}'", path))?;
    } else {
        let mut w = BufWriter::new(file);
        body(&mut w).with_context(|| format!("writing '{}'", path))?;
        w.flush().with_context(|| format!("flushing '{}'", path))?;
    }
    Ok(())
}

/// Format a value for output; NaN is written as `NA`.
pub fn format_f64(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{}", v)
    }
}

/// Write a matrix as `sample_col  col1  col2 …`, one row per sample.
pub fn write_sample_matrix(path: &str, matrix: &SampleMatrix, sample_col: &str) -> Result<()> {
    write_text(path, |w| {
        write!(w, "{}", sample_col)?;
        for c in matrix.columns() {
            write!(w, "\t{}", c)?;
        }
        writeln!(w)?;
        for (i, sample) in matrix.samples().iter().enumerate() {
            write!(w, "{}", sample)?;
            for v in matrix.values().row(i) {
                write!(w, "\t{}", format_f64(*v))?;
            }
            writeln!(w)?;
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
