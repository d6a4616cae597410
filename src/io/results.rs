//! Per-gene test result structures

use serde::{Deserialize, Serialize};

/// Results of a moderated t-test for one contrast.
/// R equivalent: the data frame topTable() returns (before sorting)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    /// Gene identifiers
    pub gene_ids: Vec<String>,
    /// Name of the tested coefficient or contrast
    pub coefficient: String,
    /// Log2 fold change (contrast estimate)
    pub log_fc: Vec<f64>,
    /// Average log2-CPM expression
    pub ave_expr: Vec<f64>,
    /// Moderated t-statistic
    pub t: Vec<f64>,
    /// Raw p-value
    pub p_value: Vec<f64>,
    /// Adjusted p-value
    pub adj_p_value: Vec<f64>,
    /// Prior degrees of freedom from the empirical Bayes fit
    pub df_prior: f64,
    /// Prior variance from the empirical Bayes fit
    pub s2_prior: f64,
}

impl TestResults {
    /// Number of genes
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Genes significant at the given adjusted-p threshold
    pub fn significant_genes(&self, alpha: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_value.iter())
            .filter(|(_, &p)| p.is_finite() && p < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Up-regulated significant genes (log_fc >= min_lfc)
    pub fn upregulated_genes(&self, alpha: f64, min_lfc: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_value.iter().zip(self.log_fc.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc >= min_lfc)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Down-regulated significant genes (log_fc <= -min_lfc)
    pub fn downregulated_genes(&self, alpha: f64, min_lfc: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_value.iter().zip(self.log_fc.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc <= -min_lfc)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Summary statistics at a significance threshold
    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        ResultsSummary {
            coefficient: self.coefficient.clone(),
            total_genes: self.n_genes(),
            genes_tested: self.p_value.iter().filter(|p| p.is_finite()).count(),
            significant: self.significant_genes(alpha).len(),
            upregulated: self.upregulated_genes(alpha, 0.0).len(),
            downregulated: self.downregulated_genes(alpha, 0.0).len(),
            alpha,
        }
    }
}

/// Summary of a differential expression test
#[derive(Debug, Clone)]
pub struct ResultsSummary {
    pub coefficient: String,
    pub total_genes: usize,
    pub genes_tested: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub alpha: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "limma-voom results: {}", self.coefficient)?;
        writeln!(f, "===================")?;
        writeln!(f, "Total genes: {}", self.total_genes)?;
        writeln!(f, "Genes tested: {}", self.genes_tested)?;
        writeln!(
            f,
            "Significant (adj.P < {}): {}",
            self.alpha, self.significant
        )?;
        writeln!(f, "  Up-regulated: {}", self.upregulated)?;
        writeln!(f, "  Down-regulated: {}", self.downregulated)?;
        Ok(())
    }
}
