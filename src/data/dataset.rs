//! DgeList - the central container for counts, metadata, and normalization state

use ndarray::Array2;

use super::{CountMatrix, GeneAnnotation, SampleMetadata};
use crate::error::{LimmaError, Result};

/// Container tying the count matrix to sample metadata and normalization state.
/// R equivalent: edgeR's DGEList (counts + samples + genes)
#[derive(Debug, Clone)]
pub struct DgeList {
    /// Raw count matrix
    counts: CountMatrix,
    /// Sample metadata (experimental covariates)
    sample_metadata: SampleMetadata,
    /// Optional gene annotation carried into the results table
    annotation: Option<GeneAnnotation>,
    /// Raw library sizes (column sums of counts)
    library_sizes: Vec<f64>,
    /// Per-sample normalization factors; None until estimated
    norm_factors: Option<Vec<f64>>,
}

impl DgeList {
    /// Create a new DgeList.
    ///
    /// Sample ids in counts and metadata must match exactly, in order.
    /// A misaligned metadata table would silently attribute samples to the
    /// wrong experimental groups, so this is a hard error.
    pub fn new(counts: CountMatrix, sample_metadata: SampleMetadata) -> Result<Self> {
        if counts.sample_ids() != sample_metadata.sample_ids() {
            let in_counts: Vec<&str> = counts
                .sample_ids()
                .iter()
                .filter(|id| !sample_metadata.sample_ids().contains(id))
                .map(|s| s.as_str())
                .collect();
            let in_meta: Vec<&str> = sample_metadata
                .sample_ids()
                .iter()
                .filter(|id| !counts.sample_ids().contains(id))
                .map(|s| s.as_str())
                .collect();
            let reason = if in_counts.is_empty() && in_meta.is_empty() {
                "Sample ids match as sets but not in order; reorder the metadata rows \
                 to match the count matrix columns"
                    .to_string()
            } else {
                format!(
                    "Sample ids do not match between counts and metadata. \
                     In counts only: {:?}. In metadata only: {:?}",
                    in_counts, in_meta
                )
            };
            return Err(LimmaError::InvalidMetadata { reason });
        }

        let library_sizes = counts.library_sizes();
        if library_sizes.iter().any(|&s| s <= 0.0) {
            return Err(LimmaError::InvalidCountMatrix {
                reason: "One or more samples have a zero library size".to_string(),
            });
        }

        Ok(Self {
            counts,
            sample_metadata,
            annotation: None,
            library_sizes,
            norm_factors: None,
        })
    }

    /// Attach a gene annotation table. Ids present in the annotation but not
    /// in the count matrix are ignored; the reverse direction yields empty
    /// annotation fields in the report.
    pub fn with_annotation(mut self, annotation: GeneAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    // Getters
    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn sample_metadata(&self) -> &SampleMetadata {
        &self.sample_metadata
    }

    pub fn annotation(&self) -> Option<&GeneAnnotation> {
        self.annotation.as_ref()
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    /// Raw library sizes (column sums)
    pub fn library_sizes(&self) -> &[f64] {
        &self.library_sizes
    }

    /// Normalization factors, if estimated
    pub fn norm_factors(&self) -> Option<&[f64]> {
        self.norm_factors.as_deref()
    }

    pub fn has_norm_factors(&self) -> bool {
        self.norm_factors.is_some()
    }

    /// Set normalization factors (one per sample, positive finite)
    pub fn set_norm_factors(&mut self, factors: Vec<f64>) -> Result<()> {
        if factors.len() != self.n_samples() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} factors", self.n_samples()),
                got: format!("{} factors", factors.len()),
            });
        }
        if factors.iter().any(|&f| f <= 0.0 || !f.is_finite()) {
            return Err(LimmaError::NormalizationFailed {
                reason: "Normalization factors must be positive finite values".to_string(),
            });
        }
        self.norm_factors = Some(factors);
        Ok(())
    }

    /// Effective library sizes: raw library size times normalization factor.
    /// Falls back to raw library sizes when no factors have been estimated.
    pub fn effective_library_sizes(&self) -> Vec<f64> {
        match &self.norm_factors {
            Some(factors) => self
                .library_sizes
                .iter()
                .zip(factors.iter())
                .map(|(&lib, &f)| lib * f)
                .collect(),
            None => self.library_sizes.clone(),
        }
    }

    /// Subset to specific genes, recomputing library sizes.
    ///
    /// Note that library sizes are recomputed from the remaining counts and
    /// normalization factors are cleared; edgeR instead keeps the original
    /// library sizes through filterByExpr (keep.lib.sizes=FALSE matches this).
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.subset_genes(gene_indices)?;
        let library_sizes = counts.library_sizes();
        Ok(Self {
            counts,
            sample_metadata: self.sample_metadata.clone(),
            annotation: self.annotation.clone(),
            library_sizes,
            norm_factors: None,
        })
    }

    /// Raw counts scaled to counts-per-million by effective library size
    pub fn cpm(&self) -> Array2<f64> {
        crate::normalization::cpm(self.counts.counts(), &self.effective_library_sizes())
    }

    /// log2 counts-per-million with the voom offsets
    pub fn log2_cpm(&self) -> Array2<f64> {
        crate::normalization::log2_cpm(self.counts.counts(), &self.effective_library_sizes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_counts() -> CountMatrix {
        CountMatrix::new(
            array![[10.0, 20.0], [30.0, 40.0]],
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_alignment_enforced() {
        let counts = toy_counts();
        let meta = SampleMetadata::new(vec!["s2".to_string(), "s1".to_string()]);
        let err = DgeList::new(counts, meta).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("not in order"), "got: {}", msg);
    }

    #[test]
    fn test_mismatched_ids_reported() {
        let counts = toy_counts();
        let meta = SampleMetadata::new(vec!["s1".to_string(), "sX".to_string()]);
        let err = DgeList::new(counts, meta).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("sX"), "got: {}", msg);
    }

    #[test]
    fn test_effective_library_sizes() {
        let counts = toy_counts();
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s2".to_string()]);
        let mut dge = DgeList::new(counts, meta).unwrap();
        assert_eq!(dge.effective_library_sizes(), vec![40.0, 60.0]);

        dge.set_norm_factors(vec![0.5, 2.0]).unwrap();
        assert_eq!(dge.effective_library_sizes(), vec![20.0, 120.0]);
    }

    #[test]
    fn test_bad_norm_factors_rejected() {
        let counts = toy_counts();
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s2".to_string()]);
        let mut dge = DgeList::new(counts, meta).unwrap();
        assert!(dge.set_norm_factors(vec![1.0]).is_err());
        assert!(dge.set_norm_factors(vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_subset_clears_norm_factors() {
        let counts = toy_counts();
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s2".to_string()]);
        let mut dge = DgeList::new(counts, meta).unwrap();
        dge.set_norm_factors(vec![1.0, 1.0]).unwrap();
        let sub = dge.subset_genes(&[0]).unwrap();
        assert!(!sub.has_norm_factors());
        assert_eq!(sub.library_sizes(), &[10.0, 20.0]);
    }
}
