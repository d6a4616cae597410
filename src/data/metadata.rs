//! Metadata structures for samples and genes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{LimmaError, Result};

/// Sample metadata containing experimental covariates.
/// R equivalent: the targets/samples data frame of a limma analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Sample identifiers
    sample_ids: Vec<String>,
    /// Categorical factors (column name -> values for each sample)
    factors: HashMap<String, Vec<String>>,
    /// Continuous covariates (column name -> values for each sample)
    continuous: HashMap<String, Vec<f64>>,
}

impl SampleMetadata {
    /// Create new sample metadata
    pub fn new(sample_ids: Vec<String>) -> Self {
        {
            let mut seen = std::collections::HashSet::new();
            for id in &sample_ids {
                if !seen.insert(id) {
                    log::warn!("Duplicate sample id detected: '{}'. Sample ids should be unique.", id);
                }
            }
        }
        Self {
            sample_ids,
            factors: HashMap::new(),
            continuous: HashMap::new(),
        }
    }

    /// Add a categorical factor column
    pub fn add_factor(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.factors.insert(name.to_string(), values);
        Ok(())
    }

    /// Add a continuous covariate column
    pub fn add_continuous(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.continuous.insert(name.to_string(), values);
        Ok(())
    }

    /// Promote a factor column to a continuous covariate, parsing each value
    /// as f64. Fails if any value does not parse.
    pub fn factor_to_continuous(&mut self, name: &str) -> Result<()> {
        let values = self.factors.remove(name).ok_or_else(|| LimmaError::InvalidMetadata {
            reason: format!("column '{}' not found", name),
        })?;
        let parsed: Result<Vec<f64>> = values
            .iter()
            .map(|v| {
                v.parse::<f64>().map_err(|_| LimmaError::InvalidMetadata {
                    reason: format!("column '{}' has non-numeric value '{}'", name, v),
                })
            })
            .collect();
        match parsed {
            Ok(nums) => {
                self.continuous.insert(name.to_string(), nums);
                Ok(())
            }
            Err(e) => {
                // Restore the column so the metadata stays intact on failure
                self.factors.insert(name.to_string(), values);
                Err(e)
            }
        }
    }

    /// Get factor values for a specific column
    pub fn factor(&self, name: &str) -> Option<&Vec<String>> {
        self.factors.get(name)
    }

    /// Get continuous covariate values for a specific column
    pub fn continuous(&self, name: &str) -> Option<&Vec<f64>> {
        self.continuous.get(name)
    }

    /// Get the value of a factor for a specific sample
    pub fn factor_value(&self, name: &str, sample_idx: usize) -> Result<&str> {
        self.factors
            .get(name)
            .and_then(|v| v.get(sample_idx))
            .map(|s| s.as_str())
            .ok_or_else(|| LimmaError::InvalidInput {
                reason: format!("factor '{}' or sample index {} not found", name, sample_idx),
            })
    }

    /// Get the value of a continuous covariate for a specific sample
    pub fn continuous_value(&self, name: &str, sample_idx: usize) -> Result<f64> {
        self.continuous
            .get(name)
            .and_then(|v| v.get(sample_idx))
            .copied()
            .ok_or_else(|| LimmaError::InvalidInput {
                reason: format!(
                    "continuous covariate '{}' or sample index {} not found",
                    name, sample_idx
                ),
            })
    }

    /// Get unique levels for a factor (sorted)
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        self.factors
            .get(name)
            .map(|values| {
                let mut unique: Vec<String> = values.clone();
                unique.sort();
                unique.dedup();
                unique
            })
            .ok_or_else(|| LimmaError::InvalidInput {
                reason: format!("factor '{}' not found", name),
            })
    }

    /// Get sample indices for a specific factor level
    pub fn samples_with_level(&self, name: &str, level: &str) -> Vec<usize> {
        self.factors
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_str() == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of samples in each level of a factor, smallest first.
    /// The first entry is the smallest group size used by the expression filter.
    pub fn group_sizes(&self, name: &str) -> Result<Vec<usize>> {
        let levels = self.levels(name)?;
        let mut sizes: Vec<usize> = levels
            .iter()
            .map(|level| self.samples_with_level(name, level).len())
            .collect();
        sizes.sort_unstable();
        Ok(sizes)
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get all factor names
    pub fn factor_names(&self) -> Vec<&str> {
        self.factors.keys().map(|s| s.as_str()).collect()
    }

    /// Subset metadata to specific samples
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        let mut new_meta = SampleMetadata::new(new_ids);

        for (name, values) in &self.factors {
            let new_values: Vec<String> =
                sample_indices.iter().map(|&i| values[i].clone()).collect();
            new_meta.add_factor(name, new_values)?;
        }
        for (name, values) in &self.continuous {
            let new_values: Vec<f64> = sample_indices.iter().map(|&i| values[i]).collect();
            new_meta.add_continuous(name, new_values)?;
        }

        Ok(new_meta)
    }
}

/// Gene annotation carried through to the results table.
/// R equivalent: the genes data frame of a DGEList, merged into topTable output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneAnnotation {
    /// Gene identifiers, in table order
    gene_ids: Vec<String>,
    /// Annotation column names, in file order
    column_names: Vec<String>,
    /// Annotation values (column name -> values per gene)
    columns: HashMap<String, Vec<String>>,
    /// Gene id -> row index lookup
    index: HashMap<String, usize>,
}

impl GeneAnnotation {
    /// Create new gene annotation
    pub fn new(gene_ids: Vec<String>) -> Self {
        let index = gene_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self {
            gene_ids,
            column_names: Vec::new(),
            columns: HashMap::new(),
            index,
        }
    }

    /// Add an annotation column
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.gene_ids.len() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} values", self.gene_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if !self.columns.contains_key(name) {
            self.column_names.push(name.to_string());
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Annotation column names in table order
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Look up one annotation value by gene id and column name.
    /// Missing genes or columns yield an empty string (left-join semantics).
    pub fn value(&self, gene_id: &str, column: &str) -> &str {
        self.index
            .get(gene_id)
            .and_then(|&row| self.columns.get(column).map(|v| v[row].as_str()))
            .unwrap_or("")
    }
}
