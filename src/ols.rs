/// Ordinary least squares via SVD, used to residualize expression.
use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::LeastSquaresSvd;

/// Coefficients and residuals of a least-squares fit.
#[derive(Debug)]
pub struct OlsFit {
    /// One estimate per design column, intercept first when present.
    pub coefficients: Array1<f64>,
    /// `y - x · coefficients`
    pub residuals: Array1<f64>,
}

/// Fit `y ~ x` by SVD least squares. `x` must already carry its intercept
/// column. Rank-deficient designs get the minimum-norm solution, so the
/// residuals are still the projection of `y` off the column space of `x`.
pub fn ols(x: &Array2<f64>, y: &Array1<f64>) -> Result<OlsFit> {
    anyhow::ensure!(
        x.nrows() == y.len(),
        "design has {} rows but response has {} values",
        x.nrows(),
        y.len()
    );
    let solution = x.least_squares(y)?.solution;
    let fitted = x.dot(&solution);
    let residuals = y - &fitted;
    Ok(OlsFit {
        coefficients: solution,
        residuals,
    })
}

/// Stack `[1, r_1, .., r_k]` for the selected rows of each regressor.
pub fn design_with_intercept(regressors: &[ArrayView1<'_, f64>], rows: &[usize]) -> Array2<f64> {
    let mut x = Array2::<f64>::ones((rows.len(), regressors.len() + 1));
    for (j, r) in regressors.iter().enumerate() {
        for (i, &row) in rows.iter().enumerate() {
            x[[i, j + 1]] = r[row];
        }
    }
    x
}
