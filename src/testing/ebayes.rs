//! Empirical Bayes variance moderation and moderated t-statistics
//!
//! Per-gene residual variances from a handful of samples are noisy. The
//! empirical Bayes step pools them: a scaled F-distribution is fitted to
//! the observed variances, and each gene's variance is squeezed toward the
//! fitted prior with strength proportional to the prior degrees of
//! freedom. The moderated t-statistic uses the squeezed variance and the
//! augmented degrees of freedom.

use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{LimmaError, Result};
use crate::model::LmFit;
use crate::stats::{digamma_fn, trigamma, trigamma_inverse};

/// Fitted scaled-F prior for the per-gene variances.
/// R equivalent: the df.prior/var.prior pair from limma::fitFDist()
#[derive(Debug, Clone, Copy)]
pub struct FDistFit {
    /// Prior degrees of freedom; infinite when the observed variances show
    /// no excess spread beyond chi-square sampling noise
    pub df_prior: f64,
    /// Prior (location) variance s0^2
    pub s2_prior: f64,
}

/// Moderated statistics for every gene and coefficient.
/// R equivalent: the t/p.value/s2.post slots eBayes() adds to a fit
#[derive(Debug, Clone)]
pub struct Ebayes {
    pub df_prior: f64,
    pub s2_prior: f64,
    /// Posterior (squeezed) variances per gene
    pub s2_post: Array1<f64>,
    /// Total degrees of freedom per gene
    pub df_total: Array1<f64>,
    /// Moderated t-statistics (genes x coefficients)
    pub t: Array2<f64>,
    /// Two-sided p-values (genes x coefficients)
    pub p_value: Array2<f64>,
}

/// Fit a scaled F-distribution to observed sample variances by the method
/// of moments on the log scale.
/// R equivalent: limma::fitFDist(x, df1)
///
/// Works on the log variances: E[ln s^2] and Var[ln s^2] have closed forms
/// in terms of digamma/trigamma under the scaled-F model, so matching the
/// first two moments gives the prior df via the trigamma inverse.
pub fn fit_f_dist(s2: &[f64], df: &[f64]) -> Result<FDistFit> {
    assert_eq!(s2.len(), df.len());

    // Usable genes: positive finite variance with positive df
    let pairs: Vec<(f64, f64)> = s2
        .iter()
        .zip(df.iter())
        .filter(|(&v, &d)| v > 0.0 && v.is_finite() && d > 0.0 && d.is_finite())
        .map(|(&v, &d)| (v, d))
        .collect();

    let n = pairs.len();
    if n < 2 {
        return Err(LimmaError::EbayesFailed {
            reason: format!(
                "Need at least 2 genes with positive residual variance, found {}",
                n
            ),
        });
    }

    let e: Vec<f64> = pairs
        .iter()
        .map(|&(v, d)| v.ln() - digamma_fn(d / 2.0) + (d / 2.0).ln())
        .collect();
    let e_mean = e.iter().sum::<f64>() / n as f64;
    let e_var =
        e.iter().map(|x| (x - e_mean) * (x - e_mean)).sum::<f64>() / (n as f64 - 1.0);

    let mean_trigamma = pairs
        .iter()
        .map(|&(_, d)| trigamma(d / 2.0))
        .sum::<f64>()
        / n as f64;

    // Spread of the log variances in excess of pure sampling noise
    let excess = e_var - mean_trigamma;

    if excess > 0.0 {
        let df_prior = 2.0 * trigamma_inverse(excess);
        let s2_prior = (e_mean + digamma_fn(df_prior / 2.0) - (df_prior / 2.0).ln()).exp();
        Ok(FDistFit { df_prior, s2_prior })
    } else {
        Ok(FDistFit {
            df_prior: f64::INFINITY,
            s2_prior: e_mean.exp(),
        })
    }
}

/// Squeeze per-gene variances toward the fitted prior.
/// R equivalent: limma::squeezeVar()
pub fn squeeze_var(s2: &[f64], df: &[f64], prior: &FDistFit) -> Vec<f64> {
    assert_eq!(s2.len(), df.len());
    s2.iter()
        .zip(df.iter())
        .map(|(&v, &d)| {
            if !v.is_finite() || !(d > 0.0) {
                return f64::NAN;
            }
            if prior.df_prior.is_infinite() {
                prior.s2_prior
            } else {
                (prior.df_prior * prior.s2_prior + d * v) / (prior.df_prior + d)
            }
        })
        .collect()
}

/// Empirical Bayes moderation of a fitted model.
/// R equivalent: eBayes(fit)
pub fn ebayes(fit: &LmFit) -> Result<Ebayes> {
    let n_genes = fit.n_genes();
    let n_coefs = fit.n_coefs();

    let s2: Vec<f64> = fit.sigma.iter().map(|s| s * s).collect();
    let df: Vec<f64> = fit.df_residual.to_vec();

    let prior = fit_f_dist(&s2, &df)?;
    if prior.df_prior.is_finite() {
        log::info!(
            "Empirical Bayes prior: df {:.2}, variance {:.4}",
            prior.df_prior,
            prior.s2_prior
        );
    } else {
        log::info!(
            "Empirical Bayes prior: infinite df, variance {:.4} (variances fully pooled)",
            prior.s2_prior
        );
    }

    let s2_post = Array1::from_vec(squeeze_var(&s2, &df, &prior));

    // Cap total df at the pooled residual df so p-values never claim more
    // information than the experiment contains
    let df_pooled: f64 = df.iter().filter(|d| d.is_finite()).sum();
    let df_total = Array1::from_vec(
        df.iter()
            .map(|&d| {
                if !(d > 0.0) {
                    f64::NAN
                } else {
                    (d + prior.df_prior).min(df_pooled)
                }
            })
            .collect(),
    );

    let mut t = Array2::from_elem((n_genes, n_coefs), f64::NAN);
    let mut p_value = Array2::from_elem((n_genes, n_coefs), f64::NAN);

    for i in 0..n_genes {
        let s_post = s2_post[i].sqrt();
        if !s_post.is_finite() || s_post <= 0.0 {
            continue;
        }
        for j in 0..n_coefs {
            let beta = fit.coefficients[[i, j]];
            let su = fit.stdev_unscaled[[i, j]];
            if !beta.is_finite() || !(su > 0.0) {
                continue;
            }
            let stat = beta / (su * s_post);
            t[[i, j]] = stat;
            p_value[[i, j]] = two_sided_t_pvalue(stat, df_total[i]);
        }
    }

    Ok(Ebayes {
        df_prior: prior.df_prior,
        s2_prior: prior.s2_prior,
        s2_post,
        df_total,
        t,
        p_value,
    })
}

/// Two-sided p-value from a t-statistic with given degrees of freedom.
/// R equivalent: 2 * pt(abs(t), df, lower.tail=FALSE)
fn two_sided_t_pvalue(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() || !(df > 0.0) || !df.is_finite() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * dist.cdf(-stat.abs()),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, Array3};

    fn fit_with_sigmas(sigmas: &[f64], betas: &[f64], su: f64, df: f64) -> LmFit {
        let n = sigmas.len();
        let mut stdev_unscaled = Array2::zeros((n, 1));
        let mut coefficients = Array2::zeros((n, 1));
        for i in 0..n {
            stdev_unscaled[[i, 0]] = su;
            coefficients[[i, 0]] = betas[i];
        }
        LmFit {
            gene_ids: (0..n).map(|i| format!("g{}", i)).collect(),
            coef_names: vec!["contrast".to_string()],
            coefficients,
            stdev_unscaled,
            cov_unscaled: Array3::from_elem((n, 1, 1), su * su),
            sigma: Array1::from_vec(sigmas.to_vec()),
            df_residual: Array1::from_elem(n, df),
            amean: Array1::from_elem(n, 5.0),
        }
    }

    #[test]
    fn test_squeeze_moves_toward_prior() {
        let prior = FDistFit {
            df_prior: 4.0,
            s2_prior: 1.0,
        };
        let s2 = vec![4.0, 0.25];
        let df = vec![4.0, 4.0];
        let post = squeeze_var(&s2, &df, &prior);
        // Squeezed values sit strictly between observed and prior
        assert!(post[0] < 4.0 && post[0] > 1.0);
        assert!(post[1] > 0.25 && post[1] < 1.0);
        // Equal df and prior df: posterior is the midpoint
        assert!((post[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_squeeze_infinite_prior_collapses() {
        let prior = FDistFit {
            df_prior: f64::INFINITY,
            s2_prior: 0.7,
        };
        let post = squeeze_var(&[4.0, 0.1], &[4.0, 4.0], &prior);
        assert_eq!(post, vec![0.7, 0.7]);
    }

    #[test]
    fn test_fit_f_dist_homogeneous_variances() {
        // Identical variances: no excess spread, prior df infinite
        let s2 = vec![1.0; 20];
        let df = vec![4.0; 20];
        let prior = fit_f_dist(&s2, &df).unwrap();
        assert!(prior.df_prior.is_infinite());
        // Location close to the common variance after bias correction
        assert!(prior.s2_prior > 0.5 && prior.s2_prior < 2.5);
    }

    #[test]
    fn test_fit_f_dist_spread_variances() {
        // Strongly heterogeneous variances: finite prior df
        let s2: Vec<f64> = (1..=40).map(|i| (i as f64 / 4.0).exp()).collect();
        let df = vec![4.0; 40];
        let prior = fit_f_dist(&s2, &df).unwrap();
        assert!(prior.df_prior.is_finite());
        assert!(prior.df_prior > 0.0);
        assert!(prior.s2_prior > 0.0);
    }

    #[test]
    fn test_fit_f_dist_needs_data() {
        assert!(fit_f_dist(&[1.0], &[4.0]).is_err());
        assert!(fit_f_dist(&[f64::NAN, f64::NAN], &[4.0, 4.0]).is_err());
    }

    #[test]
    fn test_ebayes_pvalues_in_range() {
        let sigmas: Vec<f64> = (0..30).map(|i| 0.5 + 0.05 * i as f64).collect();
        let betas: Vec<f64> = (0..30).map(|i| (i as f64 - 15.0) / 5.0).collect();
        let fit = fit_with_sigmas(&sigmas, &betas, 0.5, 4.0);
        let eb = ebayes(&fit).unwrap();
        for i in 0..30 {
            let p = eb.p_value[[i, 0]];
            assert!(p.is_finite() && (0.0..=1.0).contains(&p), "p={}", p);
        }
        // Larger |beta| gives larger |t| under shared noise scale
        assert!(eb.t[[0, 0]].abs() > eb.t[[15, 0]].abs());
    }

    #[test]
    fn test_ebayes_df_total_capped() {
        let sigmas = vec![1.0; 10];
        let betas = vec![1.0; 10];
        let fit = fit_with_sigmas(&sigmas, &betas, 0.5, 4.0);
        let eb = ebayes(&fit).unwrap();
        // Homogeneous variances give infinite prior df; the cap keeps the
        // total at the pooled residual df
        assert!(eb.df_prior.is_infinite());
        for i in 0..10 {
            assert_eq!(eb.df_total[i], 40.0);
        }
    }

    #[test]
    fn test_moderation_shrinks_extreme_t() {
        // A gene with tiny observed variance gets an honest (larger)
        // denominator after squeezing toward the prior
        let mut sigmas = vec![1.0; 20];
        sigmas[0] = 0.01;
        let betas = vec![1.0; 20];
        let fit = fit_with_sigmas(&sigmas, &betas, 0.5, 4.0);
        let eb = ebayes(&fit).unwrap();

        let raw_t = 1.0 / (0.5 * 0.01);
        assert!(
            eb.t[[0, 0]].abs() < raw_t,
            "moderated t {} should be shrunk below raw t {}",
            eb.t[[0, 0]],
            raw_t
        );
    }
}
