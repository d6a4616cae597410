//! Contrast matrices and coefficient rotation

use ndarray::{Array2, Array3};

use super::fit::LmFit;
use crate::error::{LimmaError, Result};

/// Named linear combinations of design coefficients.
/// R equivalent: makeContrasts() output
#[derive(Debug, Clone)]
pub struct ContrastMatrix {
    /// Contrast names, one per column
    pub names: Vec<String>,
    /// Weights (n_coefs x n_contrasts)
    pub weights: Array2<f64>,
}

impl ContrastMatrix {
    /// Build from explicit weight columns
    pub fn from_weights(
        coef_names: &[String],
        names: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if names.len() != columns.len() || names.is_empty() {
            return Err(LimmaError::InvalidContrast {
                reason: "Need one name per contrast column".to_string(),
            });
        }
        let n_coefs = coef_names.len();
        for col in &columns {
            if col.len() != n_coefs {
                return Err(LimmaError::InvalidContrast {
                    reason: format!(
                        "Contrast weight vector has length {}, design has {} coefficients",
                        col.len(),
                        n_coefs
                    ),
                });
            }
        }
        let n_contrasts = columns.len();
        let mut weights = Array2::zeros((n_coefs, n_contrasts));
        for (c, col) in columns.iter().enumerate() {
            for (j, &w) in col.iter().enumerate() {
                weights[[j, c]] = w;
            }
        }
        Ok(Self { names, weights })
    }

    /// Parse a contrast expression against the design's coefficient names.
    /// R equivalent: makeContrasts(treated - control, levels=design)
    ///
    /// Accepts either a single coefficient name or `a - b` where both sides
    /// are coefficient names (typically group-means columns).
    pub fn parse(expr: &str, coef_names: &[String]) -> Result<Self> {
        let find = |name: &str| -> Result<usize> {
            coef_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| LimmaError::InvalidContrast {
                    reason: format!(
                        "Coefficient '{}' not found. Available: {:?}",
                        name, coef_names
                    ),
                })
        };

        let n_coefs = coef_names.len();
        let mut col = vec![0.0; n_coefs];

        // Whole-expression match first, so coefficient names containing a
        // hyphen are never mis-split
        if let Some(a) = coef_names.iter().position(|n| n == expr.trim()) {
            col[a] = 1.0;
        } else {
            match expr.split_once('-') {
                Some((lhs, rhs)) => {
                    let a = find(lhs.trim())?;
                    let b = find(rhs.trim())?;
                    if a == b {
                        return Err(LimmaError::InvalidContrast {
                            reason: format!("Contrast '{}' compares a coefficient to itself", expr),
                        });
                    }
                    col[a] = 1.0;
                    col[b] = -1.0;
                }
                None => {
                    let a = find(expr.trim())?;
                    col[a] = 1.0;
                }
            }
        }

        Self::from_weights(coef_names, vec![expr.trim().to_string()], vec![col])
    }

    pub fn n_contrasts(&self) -> usize {
        self.names.len()
    }
}

/// Rotate fitted coefficients and covariances into contrast space.
/// R equivalent: contrasts.fit()
///
/// Each contrast c gets estimate c'beta with unscaled variance c'Uc, where
/// U is the per-gene unscaled covariance. Because U is stored per gene the
/// rotation is exact even with gene-specific observation weights.
pub fn contrasts_fit(fit: &LmFit, contrasts: &ContrastMatrix) -> Result<LmFit> {
    let n_coefs = fit.n_coefs();
    let n_genes = fit.n_genes();
    let n_contrasts = contrasts.n_contrasts();

    if contrasts.weights.nrows() != n_coefs {
        return Err(LimmaError::InvalidContrast {
            reason: format!(
                "Contrast matrix has {} rows, fit has {} coefficients",
                contrasts.weights.nrows(),
                n_coefs
            ),
        });
    }

    // beta_c = beta . C
    let coefficients = fit.coefficients.dot(&contrasts.weights);

    let mut stdev_unscaled = Array2::from_elem((n_genes, n_contrasts), f64::NAN);
    let mut cov_unscaled = Array3::from_elem((n_genes, n_contrasts, n_contrasts), f64::NAN);

    for g in 0..n_genes {
        for a in 0..n_contrasts {
            for b in a..n_contrasts {
                // c_a' U c_b
                let mut v = 0.0;
                for j in 0..n_coefs {
                    let wa = contrasts.weights[[j, a]];
                    if wa == 0.0 {
                        continue;
                    }
                    for k in 0..n_coefs {
                        let wb = contrasts.weights[[k, b]];
                        if wb != 0.0 {
                            v += wa * wb * fit.cov_unscaled[[g, j, k]];
                        }
                    }
                }
                cov_unscaled[[g, a, b]] = v;
                cov_unscaled[[g, b, a]] = v;
            }
            let var = cov_unscaled[[g, a, a]];
            stdev_unscaled[[g, a]] = if var >= 0.0 { var.sqrt() } else { f64::NAN };
        }
    }

    Ok(LmFit {
        gene_ids: fit.gene_ids.clone(),
        coef_names: contrasts.names.clone(),
        coefficients,
        stdev_unscaled,
        cov_unscaled,
        sigma: fit.sigma.clone(),
        df_residual: fit.df_residual.clone(),
        amean: fit.amean.clone(),
    })
}
