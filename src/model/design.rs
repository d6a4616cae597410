//! Design matrix construction from sample metadata

use ndarray::Array2;
use std::collections::HashMap;

use crate::data::SampleMetadata;
use crate::error::{LimmaError, Result};

/// Information about a built design matrix
/// R equivalent: the colnames/attr metadata of model.matrix() output
#[derive(Debug, Clone)]
pub struct DesignInfo {
    /// Names of the coefficients, one per design column
    pub coef_names: Vec<String>,
    /// Reference level chosen for each treatment-coded factor
    pub reference_levels: HashMap<String, String>,
}

impl DesignInfo {
    /// Index of a coefficient by name
    pub fn coef_index(&self, name: &str) -> Option<usize> {
        self.coef_names.iter().position(|n| n == name)
    }
}

/// Builder for design matrices over categorical factors and continuous
/// covariates.
/// R equivalent: model.matrix() over a ~ formula
///
/// With an intercept, every factor is treatment-coded against a reference
/// level (alphabetically first unless overridden). Without an intercept the
/// first factor is group-means coded (one column per level, the ~0+group
/// parameterization that pairs naturally with two-group contrasts) and any
/// further factor stays treatment-coded.
pub struct DesignBuilder<'a> {
    metadata: &'a SampleMetadata,
    factors: Vec<String>,
    continuous: Vec<String>,
    reference_levels: HashMap<String, String>,
    intercept: bool,
}

impl<'a> DesignBuilder<'a> {
    pub fn new(metadata: &'a SampleMetadata) -> Self {
        Self {
            metadata,
            factors: Vec::new(),
            continuous: Vec::new(),
            reference_levels: HashMap::new(),
            intercept: true,
        }
    }

    /// Add a categorical factor term
    pub fn factor(mut self, name: &str) -> Self {
        self.factors.push(name.to_string());
        self
    }

    /// Add a continuous covariate term
    pub fn continuous(mut self, name: &str) -> Self {
        self.continuous.push(name.to_string());
        self
    }

    /// Override the reference level for a factor
    pub fn reference_level(mut self, factor: &str, level: &str) -> Self {
        self.reference_levels
            .insert(factor.to_string(), level.to_string());
        self
    }

    /// Drop the intercept; the first factor becomes group-means coded
    pub fn no_intercept(mut self) -> Self {
        self.intercept = false;
        self
    }

    /// Build the design matrix and its coefficient metadata
    pub fn build(self) -> Result<(Array2<f64>, DesignInfo)> {
        if self.factors.is_empty() && self.continuous.is_empty() && !self.intercept {
            return Err(LimmaError::InvalidDesignMatrix {
                reason: "Design has no terms".to_string(),
            });
        }

        let n_samples = self.metadata.n_samples();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut coef_names: Vec<String> = Vec::new();
        let mut reference_levels: HashMap<String, String> = HashMap::new();

        if self.intercept {
            columns.push(vec![1.0; n_samples]);
            coef_names.push("Intercept".to_string());
        }

        for (fi, factor) in self.factors.iter().enumerate() {
            let levels = self.metadata.levels(factor)?;
            if levels.is_empty() {
                return Err(LimmaError::InvalidDesignMatrix {
                    reason: format!("factor '{}' has no levels", factor),
                });
            }

            let group_means = !self.intercept && fi == 0;
            if group_means {
                // One indicator column per level, named by the level
                for level in &levels {
                    let col: Vec<f64> = (0..n_samples)
                        .map(|i| {
                            let v = self.metadata.factor_value(factor, i)?;
                            Ok(if v == level.as_str() { 1.0 } else { 0.0 })
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    columns.push(col);
                    coef_names.push(level.clone());
                }
            } else {
                let reference = match self.reference_levels.get(factor) {
                    Some(r) => {
                        if !levels.contains(r) {
                            return Err(LimmaError::InvalidDesignMatrix {
                                reason: format!(
                                    "reference level '{}' is not a level of factor '{}'",
                                    r, factor
                                ),
                            });
                        }
                        r.clone()
                    }
                    None => levels[0].clone(),
                };

                for level in levels.iter().filter(|l| **l != reference) {
                    let col: Vec<f64> = (0..n_samples)
                        .map(|i| {
                            let v = self.metadata.factor_value(factor, i)?;
                            Ok(if v == level.as_str() { 1.0 } else { 0.0 })
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    columns.push(col);
                    coef_names.push(format!("{}_{}_vs_{}", factor, level, reference));
                }
                reference_levels.insert(factor.clone(), reference);
            }
        }

        for cov in &self.continuous {
            let col: Vec<f64> = (0..n_samples)
                .map(|i| self.metadata.continuous_value(cov, i))
                .collect::<Result<Vec<f64>>>()?;
            columns.push(col);
            coef_names.push(cov.clone());
        }

        let n_coefs = columns.len();
        let mut design = Array2::zeros((n_samples, n_coefs));
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                design[[i, j]] = v;
            }
        }

        if design.iter().any(|v| !v.is_finite()) {
            return Err(LimmaError::InvalidDesignMatrix {
                reason: "Design matrix contains non-finite values; check continuous covariates"
                    .to_string(),
            });
        }
        check_full_rank(&design)?;

        Ok((
            design,
            DesignInfo {
                coef_names,
                reference_levels,
            },
        ))
    }
}

/// Check that a design matrix has full column rank.
/// R equivalent: the is.fullrank() guard limma applies before lmFit
///
/// Distinguishes the two common failure modes: a level with no samples
/// (all-zero column) versus redundant terms (linear combinations).
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();

    if nrow == 0 || ncol == 0 {
        return Err(LimmaError::InvalidDesignMatrix {
            reason: "Design matrix has zero rows or columns".to_string(),
        });
    }

    if column_rank(matrix) < ncol {
        let has_zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if has_zero_column {
            "the design matrix is not full rank: a factor level with no samples \
             has produced an all-zero column"
        } else {
            "the design matrix is not full rank: one or more terms are linear \
             combinations of the others and must be removed"
        };
        return Err(LimmaError::InvalidDesignMatrix {
            reason: reason.to_string(),
        });
    }

    Ok(())
}

/// Numerical column rank via modified Gram-Schmidt with column pivoting.
///
/// At each step the remaining column with the largest norm is chosen; the
/// process stops when that norm falls below `max(nrow, ncol) * eps * norm0`
/// where norm0 is the largest pivot norm seen.
fn column_rank(matrix: &Array2<f64>) -> usize {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();

    let mut cols: Vec<Vec<f64>> = (0..ncol)
        .map(|j| matrix.column(j).to_vec())
        .collect();
    let mut active: Vec<usize> = (0..ncol).collect();

    let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mut rank = 0;
    let mut max_pivot = 0.0_f64;
    let tol_scale = nrow.max(ncol) as f64 * f64::EPSILON;

    while !active.is_empty() {
        // Pivot: largest remaining column
        let (pos, &pivot_idx) = active
            .iter()
            .enumerate()
            .max_by(|(_, &a), (_, &b)| {
                norm(&cols[a]).partial_cmp(&norm(&cols[b])).unwrap()
            })
            .unwrap();
        let pivot_norm = norm(&cols[pivot_idx]);
        max_pivot = max_pivot.max(pivot_norm);

        if pivot_norm <= tol_scale * max_pivot {
            break;
        }
        rank += 1;
        active.remove(pos);

        // Orthogonalize the remaining columns against the pivot
        let q: Vec<f64> = cols[pivot_idx].iter().map(|v| v / pivot_norm).collect();
        for &j in &active {
            let dot: f64 = q.iter().zip(cols[j].iter()).map(|(a, b)| a * b).sum();
            for (c, &qi) in cols[j].iter_mut().zip(q.iter()) {
                *c -= dot * qi;
            }
        }
    }

    rank
}
