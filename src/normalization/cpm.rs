//! Counts-per-million transformations
//!
//! CPM scales each sample's counts to a common library size of one million.
//! The log2 variant uses the voom offsets (0.5 on counts, 1 on library
//! size) so that zero counts stay finite and the transform matches the
//! expression values the precision-weighting step models.

use ndarray::{Array2, ArrayView2};

/// Counts per million by effective library size.
/// R equivalent: edgeR::cpm(y, normalized.lib.sizes=TRUE)
pub fn cpm(counts: ArrayView2<f64>, lib_sizes: &[f64]) -> Array2<f64> {
    let (n_genes, n_samples) = counts.dim();
    debug_assert_eq!(lib_sizes.len(), n_samples);

    let mut result = counts.to_owned();
    for j in 0..n_samples {
        let lib = lib_sizes[j].max(1.0);
        for i in 0..n_genes {
            result[[i, j]] = result[[i, j]] * 1e6 / lib;
        }
    }
    result
}

/// log2 counts per million with voom offsets.
/// R equivalent: log2((counts + 0.5) / (lib.size + 1) * 1e6) in voom()
pub fn log2_cpm(counts: ArrayView2<f64>, lib_sizes: &[f64]) -> Array2<f64> {
    let (n_genes, n_samples) = counts.dim();
    debug_assert_eq!(lib_sizes.len(), n_samples);

    let mut result = Array2::zeros((n_genes, n_samples));
    for j in 0..n_samples {
        let lib = lib_sizes[j] + 1.0;
        for i in 0..n_genes {
            result[[i, j]] = ((counts[[i, j]] + 0.5) / lib * 1e6).log2();
        }
    }
    result
}
