/// Spearman rank correlation with mid-ranks for ties and a two-sided
/// Student's t p-value.
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::SkipReason;

/// ρ, its p-value, and the number of complete pairs it was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpearmanResult {
    pub rho: f64,
    pub p_value: f64,
    pub n: usize,
}

/// 1-based ranks; tied values share the mean of the ranks they span.
pub fn mid_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j (0-based) hold ranks i+1..=j
        let rank = (i + j + 1) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        i = j;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Two-sided p-value of ρ from Student's t with `n - 2` degrees of freedom.
fn rho_p_value(rho: f64, n: usize) -> f64 {
    if rho.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = rho * (df / ((1.0 - rho) * (1.0 + rho))).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).expect("df is positive for n >= 3");
    (2.0 * dist.sf(t.abs())).min(1.0)
}

/// Spearman's ρ over the pairs where both values are finite.
///
/// Returns the reason the pair cannot be scored when fewer than three
/// complete pairs remain or either side is constant.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<SpearmanResult, SkipReason> {
    debug_assert_eq!(x.len(), y.len());
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();
    let n = xs.len();
    if n == 0 {
        return Err(SkipReason::NoOverlappingSamples);
    }
    if n < 3 {
        return Err(SkipReason::TooFewSamples(n));
    }
    let rho = pearson(&mid_ranks(&xs), &mid_ranks(&ys)).ok_or(SkipReason::ConstantValues)?;
    Ok(SpearmanResult {
        rho,
        p_value: rho_p_value(rho, n),
        n,
    })
}
