//! Normalization factor estimation using trimmed mean of M-values
//!
//! TMM (Robinson & Oshlack 2010) corrects for both sequencing depth and
//! RNA composition bias: a sample dominated by a few very highly expressed
//! genes otherwise looks under-sequenced for everything else.

use ndarray::{ArrayView1, ArrayView2};

use crate::data::DgeList;
use crate::error::{LimmaError, Result};
use crate::stats::quantile;

/// Method for normalization factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMethod {
    /// Trimmed mean of M-values (edgeR default)
    Tmm,
    /// Upper-quartile scaling (Bullard et al. 2010)
    UpperQuartile,
    /// All factors set to 1 (library-size-only normalization)
    None,
}

/// Trim fractions and cutoffs for the TMM estimator.
/// R equivalent: calcNormFactors(logratioTrim=0.3, sumTrim=0.05, Acutoff=-1e10)
#[derive(Debug, Clone, Copy)]
struct TmmParams {
    logratio_trim: f64,
    sum_trim: f64,
    a_cutoff: f64,
}

impl Default for TmmParams {
    fn default() -> Self {
        Self {
            logratio_trim: 0.3,
            sum_trim: 0.05,
            a_cutoff: -1e10,
        }
    }
}

/// Estimate normalization factors and store them on the DgeList.
/// R equivalent: edgeR::calcNormFactors()
///
/// Factors are rescaled so their geometric mean is 1; multiplying a raw
/// library size by its factor gives the effective library size.
pub fn calc_norm_factors(dge: &mut DgeList, method: NormMethod) -> Result<()> {
    let counts = dge.counts().counts();
    let lib_sizes = dge.library_sizes().to_vec();

    let factors = match method {
        NormMethod::Tmm => calc_factors_tmm(counts, &lib_sizes, &TmmParams::default())?,
        NormMethod::UpperQuartile => calc_factors_quantile(counts, &lib_sizes, 0.75)?,
        NormMethod::None => vec![1.0; dge.n_samples()],
    };

    dge.set_norm_factors(factors)
}

/// Rescale factors to geometric mean 1
fn center_factors(mut factors: Vec<f64>) -> Vec<f64> {
    let n = factors.len() as f64;
    let mean_log: f64 = factors.iter().map(|f| f.ln()).sum::<f64>() / n;
    let center = mean_log.exp();
    for f in factors.iter_mut() {
        *f /= center;
    }
    factors
}

/// Per-sample quantile of counts scaled by library size.
/// R equivalent: .calcFactorQuantile() in calcNormFactors.R
fn sample_quantiles(counts: ArrayView2<f64>, lib_sizes: &[f64], p: f64) -> Vec<f64> {
    let (n_genes, n_samples) = counts.dim();
    (0..n_samples)
        .map(|j| {
            let scaled: Vec<f64> = (0..n_genes).map(|i| counts[[i, j]] / lib_sizes[j]).collect();
            quantile(&scaled, p)
        })
        .collect()
}

/// Upper-quartile factors
fn calc_factors_quantile(
    counts: ArrayView2<f64>,
    lib_sizes: &[f64],
    p: f64,
) -> Result<Vec<f64>> {
    let factors = sample_quantiles(counts, lib_sizes, p);
    if factors.iter().any(|&f| f <= 0.0 || !f.is_finite()) {
        return Err(LimmaError::NormalizationFailed {
            reason: format!(
                "One or more samples have a zero {}th-percentile count; \
                 too many zero counts for quantile normalization",
                (p * 100.0) as u32
            ),
        });
    }
    Ok(center_factors(factors))
}

/// TMM factors for all samples against an automatically chosen reference
fn calc_factors_tmm(
    counts: ArrayView2<f64>,
    lib_sizes: &[f64],
    params: &TmmParams,
) -> Result<Vec<f64>> {
    let n_samples = counts.ncols();
    if n_samples == 0 {
        return Err(LimmaError::EmptyData {
            reason: "Count matrix has no samples".to_string(),
        });
    }

    // Reference sample: 75th percentile of scaled counts closest to the mean
    let f75 = sample_quantiles(counts, lib_sizes, 0.75);
    let mean_f75 = f75.iter().sum::<f64>() / n_samples as f64;
    if mean_f75 < 1e-20 {
        return Err(LimmaError::NormalizationFailed {
            reason: "All samples have essentially zero upper-quartile counts".to_string(),
        });
    }
    let ref_idx = f75
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - mean_f75)
                .abs()
                .partial_cmp(&(*b - mean_f75).abs())
                .unwrap()
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    log::debug!("TMM reference sample index: {}", ref_idx);

    let ref_col = counts.column(ref_idx);
    let ref_lib = lib_sizes[ref_idx];

    let factors: Vec<f64> = (0..n_samples)
        .map(|j| {
            if j == ref_idx {
                1.0
            } else {
                tmm_pair(counts.column(j), ref_col, lib_sizes[j], ref_lib, params)
            }
        })
        .collect();

    Ok(center_factors(factors))
}

/// TMM factor for one observation sample against the reference sample.
/// R equivalent: .calcFactorTMM() in calcNormFactors.R
///
/// M = log2 ratio of scaled counts, A = average log2 abundance,
/// v = delta-method binomial variance of M. After the double trim
/// (30% each tail on M, 5% each tail on A) the factor is
/// 2^(inverse-variance weighted mean of the kept M values).
fn tmm_pair(
    obs: ArrayView1<f64>,
    reference: ArrayView1<f64>,
    obs_lib: f64,
    ref_lib: f64,
    params: &TmmParams,
) -> f64 {
    let mut log_ratio = Vec::new();
    let mut abs_expr = Vec::new();
    let mut variance = Vec::new();

    for (&o, &r) in obs.iter().zip(reference.iter()) {
        if o <= 0.0 || r <= 0.0 {
            continue;
        }
        let po = o / obs_lib;
        let pr = r / ref_lib;
        let m = (po / pr).log2();
        let a = (po.log2() + pr.log2()) / 2.0;
        if !m.is_finite() || !a.is_finite() || a <= params.a_cutoff {
            continue;
        }
        log_ratio.push(m);
        abs_expr.push(a);
        variance.push((obs_lib - o) / (obs_lib * o) + (ref_lib - r) / (ref_lib * r));
    }

    let n = log_ratio.len();
    if n == 0 {
        return 1.0;
    }

    // Degenerate case: samples already on the same scale
    if log_ratio.iter().map(|m| m.abs()).fold(0.0_f64, f64::max) < 1e-6 {
        return 1.0;
    }

    // Double trim by rank: keep the middle of the M distribution and of
    // the A distribution, intersected
    let lo_l = ((n as f64) * params.logratio_trim).floor() as usize + 1;
    let hi_l = n + 1 - lo_l;
    let lo_s = ((n as f64) * params.sum_trim).floor() as usize + 1;
    let hi_s = n + 1 - lo_s;

    let rank_m = ranks(&log_ratio);
    let rank_a = ranks(&abs_expr);

    let mut num = 0.0;
    let mut denom = 0.0;
    for i in 0..n {
        let keep = rank_m[i] >= lo_l as f64
            && rank_m[i] <= hi_l as f64
            && rank_a[i] >= lo_s as f64
            && rank_a[i] <= hi_s as f64;
        if keep && variance[i] > 0.0 {
            num += log_ratio[i] / variance[i];
            denom += 1.0 / variance[i];
        }
    }

    if denom == 0.0 {
        return 1.0;
    }
    let f = num / denom;
    if f.is_finite() {
        2.0_f64.powf(f)
    } else {
        1.0
    }
}

/// 1-based ranks with average ranks for ties.
/// R equivalent: rank()
fn ranks(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut result = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && x[order[j + 1]] == x[order[i]] {
            j += 1;
        }
        // Average rank across the tie run [i, j]
        let avg = (i + j + 2) as f64 / 2.0;
        for k in i..=j {
            result[order[k]] = avg;
        }
        i = j + 1;
    }
    result
}
