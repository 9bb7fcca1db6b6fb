/// Integration tests: invoke the compiled `cis-eqtl` binary end-to-end on
/// small fixtures written to a temp directory.
///
/// Run with:
///   cargo test --test integration
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Resolve the path to the compiled binary.
fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cis-eqtl"))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const EXPRESSION: &str = "\
sampleid\tG1\tG2\tZERO
s1\t1\t5\t0
s2\t2\t0\t0
s3\t4\t3\t0
s4\t3\t8\t0
s5\t6\t1\t0
s6\t9\t2\t0
";

const GENOTYPE: &str = "\
sampleid\t1:100_A_G\t1:200_C_T\t1:300_G_A
s1\t0\t1\t2
s2\t0\t2\t1
s3\t1\t0\t0
s4\t1\t1\t2
s5\t2\t0\t1
s6\t2\t2\t0
";

const GENELOC: &str = "\
geneid\tchr\tstart\tend
G1\tchr1\t150\t250
G2\tchr1\t150\t250
ZERO\tchr1\t150\t250
";

const SNPLOC: &str = "\
snpid\tchr\tpos
1:100_A_G\t1\t100
1:200_C_T\t1\t200
1:300_G_A\t1\t300
";

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let f = Fixture { dir };
        f.write("expr.tsv", EXPRESSION);
        f.write("geno.tsv", GENOTYPE);
        f.write("geneloc.tsv", GENELOC);
        f.write("snploc.tsv", SNPLOC);
        f
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_str().unwrap().to_string()
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.dir.path().join(name), content).expect("write fixture");
    }

    fn prefix(&self) -> String {
        self.path("out/chr1")
    }

    /// `run` over the fixture with extra arguments.
    fn run(&self, extra: &[&str]) -> Output {
        let mut args = vec![
            "run".to_string(),
            "--expression".into(),
            self.path("expr.tsv"),
            "--genotype".into(),
            self.path("geno.tsv"),
            "--geneloc".into(),
            self.path("geneloc.tsv"),
            "--snploc".into(),
            self.path("snploc.tsv"),
            "--output-prefix".into(),
            self.prefix(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Command::new(binary())
            .args(&args)
            .output()
            .expect("failed to launch cis-eqtl")
    }
}

/// (geneid, snpid) of every row of a significant-SNP table, in file order.
fn table_pairs(content: &str) -> Vec<(String, String)> {
    let mut lines = content.lines();
    let header = lines.next().expect("empty table");
    assert_eq!(
        header,
        "geneid\tsnpid\tcoef\tp_value\tq_value\tn_samples\tchromosome\tposition\tlocus\tround"
    );
    lines
        .map(|l| {
            let f: Vec<&str> = l.split('\t').collect();
            (f[0].to_string(), f[1].to_string())
        })
        .collect()
}

/// First row per gene (the table is sorted so this is the lead SNP).
fn leads(pairs: &[(String, String)]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (g, s) in pairs {
        out.entry(g.clone()).or_insert_with(|| s.clone());
    }
    out
}

fn files_matching(dir: &Path, needle: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(needle))
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn help_exits_zero() {
    let status = Command::new(binary())
        .arg("--help")
        .status()
        .expect("failed to launch cis-eqtl --help");
    assert!(status.success(), "cis-eqtl --help failed");
}

/// One iteration: exactly one residual matrix and one significant table,
/// all-zero gene removed, every cis SNP tested once per gene.
#[test]
fn run_single_iteration() {
    let f = Fixture::new();
    let out = f.run(&["--iterations", "1"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out_dir = f.dir.path().join("out");
    assert_eq!(files_matching(&out_dir, "residuals"), vec!["chr1.round1.residuals.tsv"]);
    assert_eq!(
        files_matching(&out_dir, "significant_snps"),
        vec!["chr1.round1.significant_snps.tsv"]
    );
    assert!(out_dir.join("chr1.config.json").exists());
    assert!(out_dir.join("chr1.summary.json").exists());

    let residuals = fs::read_to_string(out_dir.join("chr1.round1.residuals.tsv")).unwrap();
    assert_eq!(residuals.lines().next().unwrap(), "sampleid\tG1\tG2");
    assert_eq!(residuals.lines().count(), 7);

    let sig = fs::read_to_string(out_dir.join("chr1.round1.significant_snps.tsv")).unwrap();
    let pairs = table_pairs(&sig);
    assert_eq!(pairs.len(), 6);
    assert!(pairs.iter().all(|(g, _)| g != "ZERO"));
    assert_eq!(leads(&pairs).len(), 2);
}

/// Global thread flags are accepted together ahead of the subcommand.
#[test]
fn run_with_thread_flags() {
    let f = Fixture::new();
    let out = Command::new(binary())
        .args(["--polars-threads", "2", "--rayon-threads", "2", "--blas-threads", "1"])
        .args([
            "run",
            "--expression",
            &f.path("expr.tsv"),
            "--genotype",
            &f.path("geno.tsv"),
            "--geneloc",
            &f.path("geneloc.tsv"),
            "--snploc",
            &f.path("snploc.tsv"),
            "--output-prefix",
            &f.prefix(),
            "--iterations",
            "1",
        ])
        .output()
        .expect("failed to launch cis-eqtl");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(Path::new(&format!("{}.round1.significant_snps.tsv", f.prefix())).exists());
}

/// Across rounds a gene's earlier lead SNPs are never tested again; outputs
/// are gzip-compressed on request.
#[test]
fn run_multiple_rounds_excludes_prior_leads() {
    let f = Fixture::new();
    let out = f.run(&["--iterations", "3", "--compress"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let mut excluded: HashMap<String, HashSet<String>> = HashMap::new();
    for round in 1..=3 {
        let path = format!("{}.round{}.significant_snps.tsv.gz", f.prefix(), round);
        let pairs = table_pairs(&read_gz(&path));
        assert_eq!(pairs.len(), 2 * (4 - round), "round {}", round);
        for (g, s) in &pairs {
            assert!(
                !excluded.get(g).is_some_and(|e| e.contains(s)),
                "round {}: {} retested prior lead {}",
                round,
                g,
                s
            );
        }
        for (g, s) in leads(&pairs) {
            excluded.entry(g).or_default().insert(s);
        }
        assert!(PathBuf::from(format!("{}.round{}.residuals.tsv.gz", f.prefix(), round)).exists());
    }

    let summary = fs::read_to_string(format!("{}.summary.json", f.prefix())).unwrap();
    let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
    assert_eq!(json["rounds"].as_array().unwrap().len(), 3);
    assert_eq!(json["preprocess"]["all_zero_dropped"], 1);
}

/// A round with fewer than two tests fails the run; earlier rounds remain.
#[test]
fn run_stops_on_insufficient_tests() {
    let f = Fixture::new();
    // G1 alone: rounds test 3, 2, then 1 SNP.
    f.write(
        "expr.tsv",
        "sampleid\tG1\ns1\t1\ns2\t2\ns3\t4\ns4\t3\ns5\t6\ns6\t9\n",
    );
    let out = f.run(&["--iterations", "4"]);
    assert!(!out.status.success(), "expected failure");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("round 3"), "{}", stderr);

    let prefix = f.prefix();
    assert!(PathBuf::from(format!("{}.round1.significant_snps.tsv", prefix)).exists());
    assert!(PathBuf::from(format!("{}.round2.significant_snps.tsv", prefix)).exists());
    assert!(PathBuf::from(format!("{}.round3.residuals.tsv", prefix)).exists());
    assert!(!PathBuf::from(format!("{}.round3.significant_snps.tsv", prefix)).exists());
}

/// Covariates and a sample-id map are joined by id, not by row order.
#[test]
fn run_with_covariates_and_sample_map() {
    let f = Fixture::new();
    f.write("geno.tsv", &GENOTYPE.replace("\ns", "\nCPG"));
    f.write(
        "keys.tsv",
        "internal_id\texternal_id\nCPG6\ts6\nCPG5\ts5\nCPG4\ts4\nCPG3\ts3\nCPG2\ts2\nCPG1\ts1\n",
    );
    f.write(
        "cov.tsv",
        "sampleid\tsex\tage\tpc1\ns6\t1\t60\t0.3\ns1\t0\t31\t-0.2\ns2\t1\t45\t0.1\ns3\t0\t52\t0.0\ns4\t1\t38\t-0.1\ns5\t0\t49\t0.2\n",
    );
    let out = f.run(&[
        "--iterations",
        "1",
        "--covariates",
        &f.path("cov.tsv"),
        "--covariate-columns",
        "sex,age",
        "--sample-map",
        &f.path("keys.tsv"),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let sig = fs::read_to_string(format!("{}.round1.significant_snps.tsv", f.prefix())).unwrap();
    assert_eq!(table_pairs(&sig).len(), 6);

    let config = fs::read_to_string(format!("{}.config.json", f.prefix())).unwrap();
    let json: serde_json::Value = serde_json::from_str(&config).unwrap();
    assert_eq!(json["fixed_iteration_count"], 1);
    assert_eq!(json["covariate_columns"][1], "age");
}

/// Genotype ids that share nothing with expression ids are rejected.
#[test]
fn run_rejects_disjoint_sample_ids() {
    let f = Fixture::new();
    f.write("geno.tsv", &GENOTYPE.replace("\ns", "\nCPG"));
    let out = f.run(&["--iterations", "1"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no sample ids in common"), "{}", stderr);
}

#[test]
fn preprocess_drops_silent_genes() {
    let f = Fixture::new();
    let out_path = f.path("filtered.tsv");
    let status = Command::new(binary())
        .args([
            "preprocess",
            "--expression",
            &f.path("expr.tsv"),
            "--out",
            &out_path,
        ])
        .status()
        .expect("failed to launch cis-eqtl");
    assert!(status.success());
    let content = fs::read_to_string(&out_path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next().unwrap(), "sampleid\tG1\tG2");
    let s1: Vec<&str> = lines.next().unwrap().split('\t').collect();
    assert_eq!(s1[0], "s1");
    let g1: f64 = s1[1].parse().unwrap();
    assert!((g1 - 2f64.ln()).abs() < 1e-12, "g1={}", g1);
}

/// `condition` reproduces round 2 from persisted round-1 outputs.
#[test]
fn condition_runs_one_round_from_files() {
    let f = Fixture::new();
    let out = f.run(&["--iterations", "1"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let round1 = fs::read_to_string(format!("{}.round1.significant_snps.tsv", f.prefix())).unwrap();
    let round1_leads = leads(&table_pairs(&round1));

    let cond_prefix = f.path("cond/chr1");
    let status = Command::new(binary())
        .args([
            "condition",
            "--residuals",
            &format!("{}.round1.residuals.tsv", f.prefix()),
            "--significant",
            &format!("{}.round1.significant_snps.tsv", f.prefix()),
            "--genotype",
            &f.path("geno.tsv"),
            "--geneloc",
            &f.path("geneloc.tsv"),
            "--snploc",
            &f.path("snploc.tsv"),
            "--round",
            "2",
            "--output-prefix",
            &cond_prefix,
        ])
        .status()
        .expect("failed to launch cis-eqtl");
    assert!(status.success());

    let round2 = fs::read_to_string(format!("{}.round2.significant_snps.tsv", cond_prefix)).unwrap();
    let pairs = table_pairs(&round2);
    assert_eq!(pairs.len(), 4);
    for (g, s) in &pairs {
        assert_ne!(round1_leads.get(g), Some(s), "{} retested {}", g, s);
    }
    assert!(round2.lines().skip(1).all(|l| l.ends_with("\t2")));
}

/// `plan` writes a manifest and fails when an input is missing.
#[test]
fn plan_reports_missing_inputs() {
    let f = Fixture::new();
    let root = f.dir.path().join("inputs");
    for rel in [
        "expression_files/Bnaive_expression.tsv",
        "covariates_files/Bnaive_peer_factors.tsv",
        "genotype_files/tob_genotype_chr1.tsv",
        "gene_location_files/GRCh38_geneloc_chr1.tsv",
        "snp_location_files/snpsloc_chr1.tsv",
        "genotype_files/tob_genotype_chr2.tsv",
        "gene_location_files/GRCh38_geneloc_chr2.tsv",
    ] {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "x\n").unwrap();
    }
    let plan_dir = f.path("plan");

    let ok = Command::new(binary())
        .args([
            "plan",
            "--input-path",
            root.to_str().unwrap(),
            "--chromosomes",
            "1",
            "--output-dir",
            &plan_dir,
        ])
        .status()
        .expect("failed to launch cis-eqtl");
    assert!(ok.success());
    let manifest = fs::read_to_string(format!("{}/manifest.tsv", plan_dir)).unwrap();
    assert_eq!(manifest.lines().count(), 2);
    assert!(manifest.contains("eqtl_results_Bnaive/chr1"));

    let missing = Command::new(binary())
        .args([
            "plan",
            "--input-path",
            root.to_str().unwrap(),
            "--chromosomes",
            "1,2",
            "--output-dir",
            &plan_dir,
        ])
        .output()
        .expect("failed to launch cis-eqtl");
    assert!(!missing.status.success());
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.contains("snpsloc_chr2.tsv"), "{}", stderr);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_gz(path: &str) -> String {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let file = fs::File::open(path).expect("open gz file");
    let mut decoder = GzDecoder::new(file);
    let mut s = String::new();
    decoder.read_to_string(&mut s).expect("decompress gz");
    s
}
