//! Expression filtering parameterized by the smallest experimental group
//!
//! Genes with too few reads carry no usable information for the linear
//! model and inflate the multiple-testing burden. Filtering must run
//! before model fitting, never after, and the returned set is always a
//! subset of the input genes.

use crate::data::DgeList;
use crate::error::{LimmaError, Result};
use crate::stats::median;

/// Thresholds for the expression filter.
/// R equivalent: filterByExpr(min.count=10, min.total.count=15, large.n=10, min.prop=0.7)
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    /// Minimum count required in at least `smallest group size` samples,
    /// expressed on the CPM scale of the median library
    pub min_count: f64,
    /// Minimum total count across all samples
    pub min_total_count: f64,
    /// Group size above which the required sample count is relaxed
    pub large_n: usize,
    /// Proportion of a large group that must pass the CPM cutoff
    pub min_prop: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_count: 10.0,
            min_total_count: 15.0,
            large_n: 10,
            min_prop: 0.7,
        }
    }
}

/// Indices of genes worth keeping for the linear model.
/// R equivalent: edgeR::filterByExpr()
///
/// `group_factor` names the metadata factor whose smallest level determines
/// how many samples must exceed the CPM cutoff.
pub fn filter_by_expr(
    dge: &DgeList,
    group_factor: &str,
    params: &FilterParams,
) -> Result<Vec<usize>> {
    let group_sizes = dge.sample_metadata().group_sizes(group_factor)?;
    let smallest = *group_sizes.first().ok_or_else(|| LimmaError::InvalidMetadata {
        reason: format!("factor '{}' has no levels", group_factor),
    })?;
    if smallest == 0 {
        return Err(LimmaError::InvalidMetadata {
            reason: format!("factor '{}' has an empty level", group_factor),
        });
    }

    let lib_sizes = dge.effective_library_sizes();
    let median_lib = median(&lib_sizes);
    if !(median_lib > 0.0) {
        return Err(LimmaError::EmptyData {
            reason: "Median library size is zero".to_string(),
        });
    }

    // CPM value that corresponds to min_count reads in the median library
    let cpm_cutoff = params.min_count / median_lib * 1e6;

    // Required number of samples above the cutoff: the smallest group,
    // relaxed for very large groups
    let mut sample_size = smallest as f64;
    if smallest > params.large_n {
        sample_size =
            params.large_n as f64 + (smallest - params.large_n) as f64 * params.min_prop;
    }

    let cpm = dge.cpm();
    let counts = dge.counts().counts();
    let tol = 1e-14;

    let keep: Vec<usize> = (0..dge.n_genes())
        .filter(|&i| {
            let n_above = cpm
                .row(i)
                .iter()
                .filter(|&&x| x >= cpm_cutoff)
                .count() as f64;
            let total: f64 = counts.row(i).sum();
            n_above >= sample_size - tol && total >= params.min_total_count - tol
        })
        .collect();

    log::info!(
        "Expression filter kept {} of {} genes (CPM cutoff {:.3}, {} samples required)",
        keep.len(),
        dge.n_genes(),
        cpm_cutoff,
        sample_size
    );

    if keep.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "No genes passed the expression filter".to_string(),
        });
    }

    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};
    use ndarray::Array2;

    fn make_dge(counts: Array2<f64>, groups: Vec<&str>) -> DgeList {
        let n_genes = counts.nrows();
        let n_samples = counts.ncols();
        let gene_ids: Vec<String> = (0..n_genes).map(|i| format!("g{}", i)).collect();
        let sample_ids: Vec<String> = (0..n_samples).map(|j| format!("s{}", j)).collect();
        let matrix = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();
        let mut meta = SampleMetadata::new(sample_ids);
        meta.add_factor("group", groups.into_iter().map(String::from).collect())
            .unwrap();
        DgeList::new(matrix, meta).unwrap()
    }

    #[test]
    fn test_filter_keeps_expressed_drops_silent() {
        // Library sizes ~ 1000; cutoff = 10/1000*1e6 = 10000 CPM = 10 counts
        let mut counts = Array2::zeros((3, 4));
        // gene 0: well expressed everywhere
        for j in 0..4 {
            counts[[0, j]] = 500.0;
        }
        // gene 1: almost silent
        for j in 0..4 {
            counts[[1, j]] = 1.0;
        }
        // gene 2: expressed in only one sample, group size is 2
        counts[[2, 0]] = 400.0;
        let dge = make_dge(counts, vec!["a", "a", "b", "b"]);

        let keep = filter_by_expr(&dge, "group", &FilterParams::default()).unwrap();
        assert_eq!(keep, vec![0]);
    }

    #[test]
    fn test_filter_output_is_subset() {
        let mut counts = Array2::zeros((10, 4));
        for i in 0..10 {
            for j in 0..4 {
                counts[[i, j]] = (i * j) as f64 + 1.0;
            }
        }
        let dge = make_dge(counts, vec!["a", "a", "b", "b"]);
        let keep = filter_by_expr(&dge, "group", &FilterParams::default());
        if let Ok(keep) = keep {
            assert!(keep.iter().all(|&i| i < 10));
            let mut sorted = keep.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), keep.len());
        }
    }

    #[test]
    fn test_filter_total_count_rule() {
        // Gene passes the CPM rule in enough samples but fails the total-count rule
        let mut counts = Array2::zeros((2, 2));
        counts[[0, 0]] = 7.0;
        counts[[0, 1]] = 7.0;
        counts[[1, 0]] = 500.0;
        counts[[1, 1]] = 500.0;
        let dge = make_dge(counts, vec!["a", "b"]);
        // min_count lowered so gene 0 clears the CPM rule in both samples,
        // leaving only the 14 < 15 total-count rule to exclude it
        let params = FilterParams {
            min_count: 5.0,
            ..FilterParams::default()
        };
        let keep = filter_by_expr(&dge, "group", &params).unwrap();
        assert!(!keep.contains(&0));
        assert!(keep.contains(&1));
    }

    #[test]
    fn test_filter_none_pass_errors() {
        let mut counts = Array2::zeros((2, 2));
        counts[[0, 0]] = 1.0;
        counts[[1, 1]] = 1.0;
        let dge = make_dge(counts, vec!["a", "b"]);
        assert!(filter_by_expr(&dge, "group", &FilterParams::default()).is_err());
    }

    #[test]
    fn test_filter_unknown_factor_errors() {
        let mut counts = Array2::zeros((1, 2));
        counts[[0, 0]] = 100.0;
        counts[[0, 1]] = 100.0;
        let dge = make_dge(counts, vec!["a", "b"]);
        assert!(filter_by_expr(&dge, "nope", &FilterParams::default()).is_err());
    }
}
