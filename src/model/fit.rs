//! Per-gene weighted least squares fitting

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::design::DesignInfo;
use crate::error::{LimmaError, Result};

/// Fitted linear models for every gene.
/// R equivalent: the MArrayLM object returned by lmFit()
#[derive(Debug, Clone)]
pub struct LmFit {
    /// Gene identifiers, in expression-matrix order
    pub gene_ids: Vec<String>,
    /// Coefficient names, one per design column (or contrast after rotation)
    pub coef_names: Vec<String>,
    /// Estimated coefficients (genes x coefficients)
    pub coefficients: Array2<f64>,
    /// Unscaled standard deviations: sqrt of the diagonal of (X'WX)^-1
    pub stdev_unscaled: Array2<f64>,
    /// Unscaled coefficient covariance per gene (genes x coefs x coefs)
    pub cov_unscaled: Array3<f64>,
    /// Residual standard deviation per gene
    pub sigma: Array1<f64>,
    /// Residual degrees of freedom per gene
    pub df_residual: Array1<f64>,
    /// Average expression per gene (mean of the response row)
    pub amean: Array1<f64>,
}

impl LmFit {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }
}

struct GeneFit {
    coefficients: Vec<f64>,
    cov_unscaled: Vec<f64>,
    sigma: f64,
    ok: bool,
}

/// Fit one weighted least squares model per gene, in parallel.
/// R equivalent: lmFit(object, design, weights=...)
///
/// `weights` carries one precision weight per observation (the voom
/// output); pass None for an unweighted fit. Genes whose expression row
/// contains non-finite values yield NaN estimates rather than an error.
pub fn lm_fit(
    expr: ArrayView2<f64>,
    weights: Option<ArrayView2<f64>>,
    design: &Array2<f64>,
    info: &DesignInfo,
    gene_ids: &[String],
) -> Result<LmFit> {
    let (n_genes, n_samples) = expr.dim();
    let n_coefs = design.ncols();

    if design.nrows() != n_samples {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("design with {} rows", n_samples),
            got: format!("{} rows", design.nrows()),
        });
    }
    if gene_ids.len() != n_genes {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("{} gene ids", n_genes),
            got: format!("{} gene ids", gene_ids.len()),
        });
    }
    if let Some(w) = &weights {
        if w.dim() != expr.dim() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("weights {:?}", expr.dim()),
                got: format!("{:?}", w.dim()),
            });
        }
        if w.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(LimmaError::InvalidInput {
                reason: "Observation weights must be non-negative finite values".to_string(),
            });
        }
    }
    if n_samples <= n_coefs {
        return Err(LimmaError::InvalidDesignMatrix {
            reason: format!(
                "No residual degrees of freedom: {} samples for {} coefficients",
                n_samples, n_coefs
            ),
        });
    }

    let fits: Vec<GeneFit> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            let y = expr.row(i);
            let w = weights.as_ref().map(|w| w.row(i));
            fit_single_gene(y, w, design)
        })
        .collect();

    let df = (n_samples - n_coefs) as f64;
    let mut coefficients = Array2::from_elem((n_genes, n_coefs), f64::NAN);
    let mut stdev_unscaled = Array2::from_elem((n_genes, n_coefs), f64::NAN);
    let mut cov_unscaled = Array3::from_elem((n_genes, n_coefs, n_coefs), f64::NAN);
    let mut sigma = Array1::from_elem(n_genes, f64::NAN);
    let mut df_residual = Array1::from_elem(n_genes, f64::NAN);
    let mut amean = Array1::from_elem(n_genes, f64::NAN);
    let mut n_failed = 0usize;

    for (i, fit) in fits.into_iter().enumerate() {
        amean[i] = expr.row(i).sum() / n_samples as f64;
        if !fit.ok {
            n_failed += 1;
            continue;
        }
        for j in 0..n_coefs {
            coefficients[[i, j]] = fit.coefficients[j];
            let var = fit.cov_unscaled[j * n_coefs + j];
            stdev_unscaled[[i, j]] = if var >= 0.0 { var.sqrt() } else { f64::NAN };
            for k in 0..n_coefs {
                cov_unscaled[[i, j, k]] = fit.cov_unscaled[j * n_coefs + k];
            }
        }
        sigma[i] = fit.sigma;
        df_residual[i] = df;
    }

    if n_failed > 0 {
        log::warn!(
            "Weighted least squares failed for {} of {} genes; their statistics are NaN",
            n_failed,
            n_genes
        );
    }

    Ok(LmFit {
        gene_ids: gene_ids.to_vec(),
        coef_names: info.coef_names.clone(),
        coefficients,
        stdev_unscaled,
        cov_unscaled,
        sigma,
        df_residual,
        amean,
    })
}

/// Weighted least squares for one gene via Cholesky on the normal equations
fn fit_single_gene(
    y: ArrayView1<f64>,
    w: Option<ArrayView1<f64>>,
    design: &Array2<f64>,
) -> GeneFit {
    let n = y.len();
    let p = design.ncols();
    let failed = || GeneFit {
        coefficients: vec![f64::NAN; p],
        cov_unscaled: vec![f64::NAN; p * p],
        sigma: f64::NAN,
        ok: false,
    };

    if y.iter().any(|v| !v.is_finite()) {
        return failed();
    }

    let weight = |i: usize| w.as_ref().map_or(1.0, |w| w[i]);

    // Normal equations: (X'WX) beta = X'Wy
    let mut xtwx = vec![0.0; p * p];
    let mut xtwy = vec![0.0; p];
    for i in 0..n {
        let wi = weight(i);
        if wi == 0.0 {
            continue;
        }
        for j in 0..p {
            let xij = design[[i, j]];
            xtwy[j] += wi * xij * y[i];
            for k in j..p {
                xtwx[j * p + k] += wi * xij * design[[i, k]];
            }
        }
    }
    // Mirror the upper triangle
    for j in 0..p {
        for k in 0..j {
            xtwx[j * p + k] = xtwx[k * p + j];
        }
    }

    let l = match cholesky_decompose(&xtwx, p) {
        Some(l) => l,
        None => return failed(),
    };

    let beta = cholesky_solve(&l, &xtwy, p);
    let cov = cholesky_inverse(&l, p);

    // Weighted residual sum of squares
    let mut rss = 0.0;
    for i in 0..n {
        let mut fitted = 0.0;
        for j in 0..p {
            fitted += design[[i, j]] * beta[j];
        }
        let r = y[i] - fitted;
        rss += weight(i) * r * r;
    }

    let df = (n - p) as f64;
    let sigma = (rss / df).max(0.0).sqrt();

    GeneFit {
        coefficients: beta,
        cov_unscaled: cov,
        sigma,
        ok: true,
    }
}

/// Cholesky factor L (row-major lower triangle) of a symmetric positive
/// definite matrix, or None when the matrix is singular.
fn cholesky_decompose(a: &[f64], p: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; p * p];
    for j in 0..p {
        let mut diag = a[j * p + j];
        for k in 0..j {
            diag -= l[j * p + k] * l[j * p + k];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let dj = diag.sqrt();
        l[j * p + j] = dj;
        for i in (j + 1)..p {
            let mut v = a[i * p + j];
            for k in 0..j {
                v -= l[i * p + k] * l[j * p + k];
            }
            l[i * p + j] = v / dj;
        }
    }
    Some(l)
}

/// Solve L L' x = b by forward then back substitution
fn cholesky_solve(l: &[f64], b: &[f64], p: usize) -> Vec<f64> {
    let mut z = vec![0.0; p];
    for i in 0..p {
        let mut v = b[i];
        for k in 0..i {
            v -= l[i * p + k] * z[k];
        }
        z[i] = v / l[i * p + i];
    }
    let mut x = vec![0.0; p];
    for i in (0..p).rev() {
        let mut v = z[i];
        for k in (i + 1)..p {
            v -= l[k * p + i] * x[k];
        }
        x[i] = v / l[i * p + i];
    }
    x
}

/// Full inverse (L L')^-1 by solving against unit vectors
fn cholesky_inverse(l: &[f64], p: usize) -> Vec<f64> {
    let mut inv = vec![0.0; p * p];
    let mut e = vec![0.0; p];
    for j in 0..p {
        e[j] = 1.0;
        let col = cholesky_solve(l, &e, p);
        for i in 0..p {
            inv[i * p + j] = col[i];
        }
        e[j] = 0.0;
    }
    inv
}
