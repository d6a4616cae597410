//! Count matrix representation for RNA-seq data

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{LimmaError, Result};

/// Deduplicate names by appending _1, _2, etc. to duplicates (R auto-renames behavior)
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *seen.entry(name.clone()).or_insert(0) += 1;
    }
    if !seen.values().any(|&c| c > 1) {
        return names;
    }
    seen.clear();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(name);
        } else {
            let new_name = format!("{}_{}", name, *count - 1);
            log::warn!("Duplicate gene id '{}' renamed to '{}'", name, new_name);
            result.push(new_name);
        }
    }
    result
}

/// A count matrix of RNA-seq read counts.
/// R equivalent: the counts component of an edgeR DGEList
/// Rows are genes, columns are samples.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    /// Gene identifiers
    gene_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} gene ids", n_genes),
                got: format!("{} gene ids", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} sample ids", n_samples),
                got: format!("{} sample ids", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(LimmaError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if !counts.is_empty() && counts.iter().all(|&x| x == 0.0) {
            return Err(LimmaError::InvalidCountMatrix {
                reason: "All samples have 0 counts for all genes".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            log::warn!(
                "Some count values are not integers. The voom pipeline expects raw read counts; \
                 pre-normalized values will distort the mean-variance trend."
            );
        }

        let gene_ids = deduplicate_names(gene_ids);

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific gene
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    /// Get counts for a specific sample
    pub fn sample_counts(&self, sample_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.column(sample_idx)
    }

    /// Get gene index by ID
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Calculate sum of counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts
            .axis_iter(Axis(1))
            .map(|col| col.sum())
            .collect()
    }

    /// Calculate mean counts per gene across samples
    pub fn gene_means(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.sum() / n)
            .collect()
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        if gene_indices.is_empty() {
            return Err(LimmaError::EmptyData {
                reason: "Gene subset is empty".to_string(),
            });
        }
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids: Vec<String> = gene_indices
            .iter()
            .map(|&i| self.gene_ids[i].clone())
            .collect();

        Self::new(new_counts, new_gene_ids, self.sample_ids.clone())
    }

    /// Subset to specific samples
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        if sample_indices.is_empty() {
            return Err(LimmaError::EmptyData {
                reason: "Sample subset is empty".to_string(),
            });
        }
        let new_counts = self.counts.select(Axis(1), sample_indices);
        let new_sample_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        Self::new(new_counts, self.gene_ids.clone(), new_sample_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let gene_ids = vec!["gene1".to_string(), "gene2".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string(), "s3".to_string()];

        let matrix = CountMatrix::new(counts, gene_ids, sample_ids).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let gene_ids = vec!["gene1".to_string(), "gene2".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];

        assert!(CountMatrix::new(counts, gene_ids, sample_ids).is_err());
    }

    #[test]
    fn test_all_zero_rejected() {
        let counts = array![[0.0, 0.0], [0.0, 0.0]];
        let gene_ids = vec!["gene1".to_string(), "gene2".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];

        assert!(CountMatrix::new(counts, gene_ids, sample_ids).is_err());
    }

    #[test]
    fn test_duplicate_gene_ids_renamed() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let gene_ids = vec!["geneA".to_string(), "geneA".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];

        let matrix = CountMatrix::new(counts, gene_ids, sample_ids).unwrap();
        assert_eq!(matrix.gene_ids(), &["geneA".to_string(), "geneA_1".to_string()]);
    }

    #[test]
    fn test_library_sizes() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let gene_ids = vec!["gene1".to_string(), "gene2".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];

        let matrix = CountMatrix::new(counts, gene_ids, sample_ids).unwrap();
        assert_eq!(matrix.library_sizes(), vec![15.0, 35.0]);
    }

    #[test]
    fn test_subset_genes() {
        let counts = array![[10.0, 20.0], [5.0, 15.0], [1.0, 2.0]];
        let gene_ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];

        let matrix = CountMatrix::new(counts, gene_ids, sample_ids).unwrap();
        let sub = matrix.subset_genes(&[0, 2]).unwrap();
        assert_eq!(sub.n_genes(), 2);
        assert_eq!(sub.gene_ids(), &["a".to_string(), "c".to_string()]);
        assert_eq!(sub.counts()[[1, 1]], 2.0);
    }
}
