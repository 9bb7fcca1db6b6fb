/// Sample-identifier translation between the genotype and expression id schemes.
///
/// Genotype files and expression/covariate files may use different sample id
/// schemes (e.g. internal vs. cohort ids). The translation is always an
/// explicit input: either the identity map or a two-column key file.
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::{HashMap, HashSet};

use crate::error::EqtlError;
use crate::table::{self, SampleMatrix};

#[derive(Debug, Clone, PartialEq)]
pub enum SampleKeyMap {
    /// Genotype sample ids already match expression sample ids.
    Identity,
    /// genotype-side id → expression-side id.
    Table(HashMap<String, String>),
}

impl SampleKeyMap {
    /// Build a translation table from (genotype id, expression id) pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, EqtlError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let table = "sample map";
        let mut forward = HashMap::new();
        let mut targets = HashSet::new();
        for (from, to) in pairs {
            if !targets.insert(to.clone()) {
                return Err(EqtlError::validation(
                    table,
                    format!("expression-side id '{}' is mapped more than once", to),
                ));
            }
            if forward.insert(from.clone(), to).is_some() {
                return Err(EqtlError::validation(
                    table,
                    format!("genotype-side id '{}' is mapped more than once", from),
                ));
            }
        }
        if forward.is_empty() {
            return Err(EqtlError::validation(table, "no id pairs"));
        }
        Ok(SampleKeyMap::Table(forward))
    }

    /// Load a key file: header row, first column genotype-side ids, second
    /// column expression-side ids. Further columns are ignored.
    pub fn load(path: &str) -> Result<Self> {
        let df = table::read_tsv(path)?;
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        anyhow::ensure!(
            names.len() >= 2,
            EqtlError::validation(
                "sample map",
                format!("'{}' needs two columns, found {}", path, names.len())
            )
        );
        let from = table::string_values(&df, &names[0], "sample map")?;
        let to = table::string_values(&df, &names[1], "sample map")?;
        let map = SampleKeyMap::from_pairs(from.into_iter().zip(to))
            .with_context(|| format!("loading sample map '{}'", path))?;
        if let SampleKeyMap::Table(ref m) = map {
            info!(
                "Loaded {} sample id pairs ('{}' → '{}') from '{}'",
                m.len(),
                names[0],
                names[1],
                path
            );
        }
        Ok(map)
    }

    pub fn translate<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        match self {
            SampleKeyMap::Identity => Some(id),
            SampleKeyMap::Table(m) => m.get(id).map(|s| s.as_str()),
        }
    }

    /// Rename the genotype matrix's samples into the expression id scheme,
    /// dropping samples the map does not cover.
    pub fn apply(&self, genotypes: SampleMatrix) -> Result<SampleMatrix, EqtlError> {
        if matches!(self, SampleKeyMap::Identity) {
            return Ok(genotypes);
        }
        let mut keep = Vec::with_capacity(genotypes.n_samples());
        let mut renamed = Vec::with_capacity(genotypes.n_samples());
        for (i, id) in genotypes.samples().iter().enumerate() {
            if let Some(to) = self.translate(id) {
                keep.push(i);
                renamed.push(to.to_string());
            }
        }
        let n_dropped = genotypes.n_samples() - keep.len();
        if n_dropped > 0 {
            warn!(
                "{} genotype sample(s) have no entry in the sample map and are dropped",
                n_dropped
            );
        }
        genotypes
            .select_samples(&keep)
            .with_samples("genotype", renamed)
    }
}

/// Count expression samples that also appear in `other`; zero overlap is a
/// validation error since every downstream join would be empty.
pub fn check_overlap(
    expression_samples: &[String],
    other: &SampleMatrix,
    other_table: &str,
) -> Result<usize, EqtlError> {
    let index = other.sample_index();
    let n = expression_samples
        .iter()
        .filter(|s| index.contains_key(s.as_str()))
        .count();
    if n == 0 {
        return Err(EqtlError::validation(
            other_table,
            "no sample ids in common with the expression matrix (is a sample map needed?)",
        ));
    }
    if n < expression_samples.len() {
        warn!(
            "{}: {}/{} expression samples present",
            other_table,
            n,
            expression_samples.len()
        );
    }
    Ok(n)
}
