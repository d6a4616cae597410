//! The voom transform: log-scale normalization with precision weights
//!
//! Counts become log2-CPM values, and every observation gets a precision
//! weight read off a smoothed mean-variance trend. Downstream weighted
//! least squares then treats the heteroscedastic count data as if it were
//! well-behaved continuous expression data.

mod lowess;

pub use lowess::{lowess, LowessCurve};

use ndarray::Array2;

use crate::data::DgeList;
use crate::error::{LimmaError, Result};
use crate::model::{lm_fit, DesignInfo};
use crate::normalization::log2_cpm;

/// Output of the voom transform.
/// R equivalent: the EList returned by voom()
#[derive(Debug, Clone)]
pub struct VoomResult {
    /// Gene identifiers, matching the DgeList order
    pub gene_ids: Vec<String>,
    /// log2-CPM expression values (genes x samples)
    pub log2_cpm: Array2<f64>,
    /// Precision weights (genes x samples), positive and finite
    pub weights: Array2<f64>,
    /// Mean-variance trend x coordinates (average log2 count), sorted
    pub trend_x: Vec<f64>,
    /// Smoothed trend y coordinates (sqrt of residual sd)
    pub trend_y: Vec<f64>,
}

/// Run the voom transform against a design matrix.
/// R equivalent: voom(counts, design, span=0.5)
///
/// The design must be the same matrix later passed to the weighted fit:
/// the mean-variance trend is estimated from this model's residuals.
pub fn voom(
    dge: &DgeList,
    design: &Array2<f64>,
    info: &DesignInfo,
    span: f64,
) -> Result<VoomResult> {
    let n_genes = dge.n_genes();
    let n_samples = dge.n_samples();
    if n_genes < 2 {
        return Err(LimmaError::VoomFailed {
            reason: "Need at least 2 genes to estimate the mean-variance trend".to_string(),
        });
    }

    let lib_sizes = dge.effective_library_sizes();
    if !dge.has_norm_factors() {
        log::debug!("voom running on raw library sizes (no normalization factors set)");
    }

    // log2-CPM with the 0.5 count / +1 library offsets
    let expr = log2_cpm(dge.counts().counts(), &lib_sizes);

    // First pass: unweighted fit to get per-gene residual sd and mean
    let first_pass = lm_fit(
        expr.view(),
        None,
        design,
        info,
        dge.counts().gene_ids(),
    )?;

    // Trend coordinates: average log2 COUNT on x (undo the CPM scaling),
    // quarter-root variance (sqrt of residual sd) on y
    let mean_log2_lib: f64 = lib_sizes
        .iter()
        .map(|l| (l + 1.0).log2())
        .sum::<f64>()
        / n_samples as f64;
    let cpm_to_count = mean_log2_lib - 1e6_f64.log2();

    let mut sx = Vec::with_capacity(n_genes);
    let mut sy = Vec::with_capacity(n_genes);
    for i in 0..n_genes {
        let x = first_pass.amean[i] + cpm_to_count;
        let y = first_pass.sigma[i].sqrt();
        if x.is_finite() && y.is_finite() {
            sx.push(x);
            sy.push(y);
        }
    }
    if sx.len() < 2 {
        return Err(LimmaError::VoomFailed {
            reason: "Fewer than 2 genes with a finite mean-variance point".to_string(),
        });
    }

    let curve = lowess(&sx, &sy, span, 3)?;

    // Fitted log2 counts per observation, then weights from the trend:
    // w = trend(fitted log2 count)^-4
    let fitted = first_pass.coefficients.dot(&design.t());
    let mut weights = Array2::zeros((n_genes, n_samples));
    for i in 0..n_genes {
        for j in 0..n_samples {
            let fitted_logcount = fitted[[i, j]] + (lib_sizes[j] + 1.0).log2() - 1e6_f64.log2();
            let predicted = curve.interpolate(fitted_logcount);
            let w = if predicted.is_finite() {
                predicted.max(1e-6).powi(-4)
            } else {
                1.0
            };
            weights[[i, j]] = w;
        }
    }

    log::info!(
        "voom transform: {} genes x {} samples, span {}",
        n_genes,
        n_samples,
        span
    );

    Ok(VoomResult {
        gene_ids: dge.counts().gene_ids().to_vec(),
        log2_cpm: expr,
        weights,
        trend_x: curve.x,
        trend_y: curve.y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};
    use crate::model::DesignBuilder;
    use ndarray::Array2;

    /// 3+3 two-group dataset: noisy low-count genes and stable high-count
    /// genes so the mean-variance trend decreases
    fn trend_dataset() -> (DgeList, Array2<f64>, DesignInfo) {
        let sample_ids: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
        let groups = vec!["a", "a", "a", "b", "b", "b"];

        // Rows: pairs of (base count, multiplicative jitter per sample)
        let gene_rows: Vec<(f64, [f64; 6])> = vec![
            (8.0, [0.4, 1.9, 0.7, 1.6, 0.5, 1.9]),
            (12.0, [1.8, 0.5, 1.5, 0.6, 1.7, 0.9]),
            (25.0, [1.4, 0.7, 1.2, 0.8, 1.3, 0.6]),
            (60.0, [1.2, 0.85, 1.1, 0.9, 1.15, 0.8]),
            (150.0, [1.08, 0.94, 1.05, 0.96, 1.07, 0.9]),
            (400.0, [1.04, 0.97, 1.02, 0.98, 1.03, 0.96]),
            (1000.0, [1.02, 0.99, 1.01, 0.99, 1.02, 0.97]),
            (2500.0, [1.01, 0.995, 1.005, 0.996, 1.01, 0.99]),
        ];
        let n_genes = gene_rows.len();
        let mut counts = Array2::zeros((n_genes, 6));
        for (i, (base, jitter)) in gene_rows.iter().enumerate() {
            for j in 0..6 {
                counts[[i, j]] = (base * jitter[j]).round();
            }
        }
        let gene_ids: Vec<String> = (0..n_genes).map(|i| format!("g{}", i)).collect();
        let matrix = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();
        let mut meta = SampleMetadata::new(sample_ids);
        meta.add_factor("group", groups.into_iter().map(String::from).collect())
            .unwrap();
        let dge = DgeList::new(matrix, meta).unwrap();

        let (design, info) = DesignBuilder::new(dge.sample_metadata())
            .no_intercept()
            .factor("group")
            .build()
            .unwrap();
        (dge, design, info)
    }

    #[test]
    fn test_voom_shapes_and_finiteness() {
        let (dge, design, info) = trend_dataset();
        let v = voom(&dge, &design, &info, 0.5).unwrap();
        assert_eq!(v.log2_cpm.dim(), (8, 6));
        assert_eq!(v.weights.dim(), (8, 6));
        assert!(v.weights.iter().all(|&w| w.is_finite() && w > 0.0));
        assert_eq!(v.trend_x.len(), 8);
    }

    #[test]
    fn test_voom_log2_cpm_closed_form() {
        let (dge, design, info) = trend_dataset();
        let v = voom(&dge, &design, &info, 0.5).unwrap();
        let lib = dge.effective_library_sizes();
        let c = dge.counts().counts()[[3, 2]];
        let expected = ((c + 0.5) / (lib[2] + 1.0) * 1e6).log2();
        assert!((v.log2_cpm[[3, 2]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_voom_weights_follow_trend() {
        // The jitter shrinks as counts grow, so the trend decreases and
        // high-count genes must earn larger precision weights
        let (dge, design, info) = trend_dataset();
        let v = voom(&dge, &design, &info, 0.5).unwrap();
        let mean_weight = |i: usize| v.weights.row(i).sum() / 6.0;
        assert!(
            mean_weight(7) > mean_weight(0),
            "high-count gene weight {} should exceed low-count gene weight {}",
            mean_weight(7),
            mean_weight(0)
        );
    }

    #[test]
    fn test_voom_needs_two_genes() {
        let counts = Array2::from_shape_vec((1, 4), vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let sample_ids: Vec<String> = (0..4).map(|j| format!("s{}", j)).collect();
        let matrix =
            CountMatrix::new(counts, vec!["g0".to_string()], sample_ids.clone()).unwrap();
        let mut meta = SampleMetadata::new(sample_ids);
        meta.add_factor(
            "group",
            vec!["a".to_string(), "a".to_string(), "b".to_string(), "b".to_string()],
        )
        .unwrap();
        let dge = DgeList::new(matrix, meta).unwrap();
        let (design, info) = DesignBuilder::new(dge.sample_metadata())
            .no_intercept()
            .factor("group")
            .build()
            .unwrap();
        assert!(voom(&dge, &design, &info, 0.5).is_err());
    }
}
