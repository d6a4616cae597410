//! Statistical testing: empirical Bayes moderation, moderated t-tests,
//! and multiple-testing correction

mod ebayes;
mod fdr;
mod toptable;

pub use ebayes::{ebayes, fit_f_dist, squeeze_var, Ebayes, FDistFit};
pub use fdr::{adjust_pvalues, AdjustMethod};
pub use toptable::{top_table, SortBy, TopTable, TopTableRow};

use crate::error::{LimmaError, Result};
use crate::io::TestResults;
use crate::model::LmFit;

/// Assemble per-gene test results for one fitted coefficient or contrast.
/// R equivalent: the column extraction topTable() performs on an eBayes fit
///
/// Adjusted p-values are computed once, across the full set of genes in
/// the fit, with the requested correction method.
pub fn test_results(
    fit: &LmFit,
    eb: &Ebayes,
    coef: usize,
    method: AdjustMethod,
) -> Result<TestResults> {
    if coef >= fit.n_coefs() {
        return Err(LimmaError::InvalidContrast {
            reason: format!(
                "Coefficient index {} out of range for {} coefficients",
                coef,
                fit.n_coefs()
            ),
        });
    }

    let n_genes = fit.n_genes();
    let log_fc: Vec<f64> = (0..n_genes).map(|i| fit.coefficients[[i, coef]]).collect();
    let t: Vec<f64> = (0..n_genes).map(|i| eb.t[[i, coef]]).collect();
    let p_value: Vec<f64> = (0..n_genes).map(|i| eb.p_value[[i, coef]]).collect();
    let adj_p_value = adjust_pvalues(&p_value, method);

    Ok(TestResults {
        gene_ids: fit.gene_ids.clone(),
        coefficient: fit.coef_names[coef].clone(),
        log_fc,
        ave_expr: fit.amean.to_vec(),
        t,
        p_value,
        adj_p_value,
        df_prior: eb.df_prior,
        s2_prior: eb.s2_prior,
    })
}
