//! rust_limma: limma-voom differential expression analysis in Rust
//!
//! This crate implements the voom/limma pipeline for RNA-seq count data:
//! TMM normalization, expression filtering, the voom precision-weighting
//! transform, per-gene weighted least squares, contrast evaluation,
//! empirical Bayes variance moderation, and multiple-testing correction.
//!
//! # Example
//!
//! ```ignore
//! use rust_limma::prelude::*;
//!
//! // Load data
//! let counts = read_count_matrix("counts.tsv")?;
//! let metadata = read_sample_metadata("metadata.csv")?;
//! let mut dge = DgeList::new(counts, metadata)?;
//!
//! // Normalize and filter
//! calc_norm_factors(&mut dge, NormMethod::Tmm)?;
//! let keep = filter_by_expr(&dge, "group", &FilterParams::default())?;
//! let mut dge = dge.subset_genes(&keep)?;
//!
//! // Design, contrast, and the pipeline
//! let (design, info) = DesignBuilder::new(dge.sample_metadata())
//!     .no_intercept()
//!     .factor("group")
//!     .build()?;
//! let contrast = ContrastMatrix::parse("treated - control", &info.coef_names)?;
//! let results = run_voom_limma(&mut dge, &design, &info, &contrast, 0.5, AdjustMethod::BH)?;
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod filter;
pub mod io;
pub mod model;
pub mod normalization;
pub mod stats;
pub mod testing;
pub mod voom;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{CountMatrix, DgeList, GeneAnnotation, SampleMetadata};
    pub use crate::error::{LimmaError, Result};
    pub use crate::filter::{filter_by_expr, FilterParams};
    pub use crate::io::{
        read_count_matrix, read_gene_annotation, read_sample_metadata, write_expression_matrix,
        write_top_table, TestResults,
    };
    pub use crate::model::{contrasts_fit, lm_fit, ContrastMatrix, DesignBuilder, DesignInfo};
    pub use crate::normalization::{calc_norm_factors, NormMethod};
    pub use crate::testing::{
        adjust_pvalues, ebayes, test_results, top_table, AdjustMethod, SortBy,
    };
    pub use crate::voom::{voom, VoomResult};
    pub use crate::run_voom_limma;
}

use ndarray::Array2;

use error::Result;
use model::{ContrastMatrix, DesignInfo};

/// Run the voom/limma pipeline against a design and contrast.
/// R equivalent: voom() |> lmFit() |> contrasts.fit() |> eBayes() |> topTable()
///
/// Estimates TMM normalization factors when none are set, then chains the
/// transform, weighted fit, contrast rotation, empirical Bayes moderation,
/// and one BH-style correction over all genes in the DgeList. Expression
/// filtering is the caller's job and must happen before this call.
pub fn run_voom_limma(
    dge: &mut data::DgeList,
    design: &Array2<f64>,
    info: &DesignInfo,
    contrast: &ContrastMatrix,
    span: f64,
    adjust: testing::AdjustMethod,
) -> Result<io::TestResults> {
    // Step 1: normalization factors (skip if already set)
    if !dge.has_norm_factors() {
        normalization::calc_norm_factors(dge, normalization::NormMethod::Tmm)?;
    }

    // Step 2: voom transform
    let v = voom::voom(dge, design, info, span)?;

    // Step 3: weighted linear model per gene
    let fit = model::lm_fit(
        v.log2_cpm.view(),
        Some(v.weights.view()),
        design,
        info,
        &v.gene_ids,
    )?;

    // Step 4: contrast rotation
    let cfit = model::contrasts_fit(&fit, contrast)?;

    // Step 5: empirical Bayes moderation and testing
    let eb = testing::ebayes(&cfit)?;

    // Step 6: adjusted p-values over the full tested set
    testing::test_results(&cfit, &eb, 0, adjust)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use ndarray::Array2;

    fn synthetic_dataset() -> DgeList {
        // 12 genes x 6 samples (3 control, 3 treated): two up-regulated,
        // two down-regulated, the rest stable across a range of expression
        let rows: Vec<[f64; 6]> = vec![
            [100.0, 110.0, 90.0, 400.0, 420.0, 380.0],   // up ~4x
            [150.0, 160.0, 140.0, 300.0, 320.0, 280.0],  // up ~2x
            [300.0, 310.0, 290.0, 75.0, 80.0, 70.0],     // down ~4x
            [400.0, 420.0, 380.0, 100.0, 110.0, 90.0],   // down ~4x
            [500.0, 520.0, 480.0, 500.0, 510.0, 490.0],  // stable
            [50.0, 55.0, 45.0, 50.0, 52.0, 48.0],        // stable low
            [200.0, 220.0, 180.0, 200.0, 210.0, 190.0],  // stable
            [80.0, 85.0, 75.0, 80.0, 82.0, 78.0],        // stable
            [600.0, 620.0, 580.0, 600.0, 610.0, 590.0],  // stable high
            [1000.0, 1040.0, 960.0, 1000.0, 1020.0, 980.0], // stable high
            [30.0, 33.0, 27.0, 30.0, 31.0, 29.0],        // stable low
            [250.0, 260.0, 240.0, 250.0, 255.0, 245.0],  // stable
        ];
        let n_genes = rows.len();
        let mut counts = Array2::zeros((n_genes, 6));
        for (i, row) in rows.iter().enumerate() {
            for j in 0..6 {
                counts[[i, j]] = row[j];
            }
        }
        let gene_ids = vec![
            "gene_up".to_string(),
            "gene_up2".to_string(),
            "gene_down".to_string(),
            "gene_down2".to_string(),
            "gene_nc1".to_string(),
            "gene_nc2".to_string(),
            "gene_nc3".to_string(),
            "gene_nc4".to_string(),
            "gene_nc5".to_string(),
            "gene_nc6".to_string(),
            "gene_nc7".to_string(),
            "gene_nc8".to_string(),
        ];
        let sample_ids: Vec<String> = (1..=6).map(|j| format!("s{}", j)).collect();
        let matrix = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();

        let mut metadata = SampleMetadata::new(sample_ids);
        metadata
            .add_factor(
                "treatment",
                vec![
                    "control".to_string(),
                    "control".to_string(),
                    "control".to_string(),
                    "treated".to_string(),
                    "treated".to_string(),
                    "treated".to_string(),
                ],
            )
            .unwrap();

        DgeList::new(matrix, metadata).unwrap()
    }

    #[test]
    fn test_full_pipeline() {
        let dge = synthetic_dataset();

        // Filter first: everything here is well expressed, so the kept set
        // must be the full gene set
        let keep = filter_by_expr(&dge, "treatment", &FilterParams::default()).unwrap();
        assert_eq!(keep.len(), 12);
        let mut dge = dge.subset_genes(&keep).unwrap();

        let (design, info) = DesignBuilder::new(dge.sample_metadata())
            .no_intercept()
            .factor("treatment")
            .build()
            .unwrap();
        let contrast = ContrastMatrix::parse("treated - control", &info.coef_names).unwrap();

        let results =
            run_voom_limma(&mut dge, &design, &info, &contrast, 0.5, AdjustMethod::BH).unwrap();

        assert_eq!(results.n_genes(), 12);

        let idx = |id: &str| results.gene_ids.iter().position(|g| g == id).unwrap();

        // Directions
        assert!(results.log_fc[idx("gene_up")] > 1.0, "gene_up should be up-regulated");
        assert!(results.log_fc[idx("gene_up2")] > 0.5);
        assert!(results.log_fc[idx("gene_down")] < -1.0, "gene_down should be down-regulated");
        assert!(results.log_fc[idx("gene_down2")] < -1.0);

        // Significance calls
        assert!(results.adj_p_value[idx("gene_up")] < 0.05);
        assert!(results.adj_p_value[idx("gene_down")] < 0.05);
        assert!(results.adj_p_value[idx("gene_nc1")] > 0.05, "stable gene should not be called");

        // Adjusted never below raw
        for (p, q) in results.p_value.iter().zip(results.adj_p_value.iter()) {
            if p.is_finite() {
                assert!(q >= p);
            }
        }

        let summary = results.summary(0.05);
        assert!(summary.significant >= 3);
        println!("{}", summary);
    }

    #[test]
    fn test_pipeline_top_table_ordering() {
        let mut dge = synthetic_dataset();
        let (design, info) = DesignBuilder::new(dge.sample_metadata())
            .no_intercept()
            .factor("treatment")
            .build()
            .unwrap();
        let contrast = ContrastMatrix::parse("treated - control", &info.coef_names).unwrap();
        let results =
            run_voom_limma(&mut dge, &design, &info, &contrast, 0.5, AdjustMethod::BH).unwrap();

        let table = top_table(&results, None, SortBy::PValue, Some(4));
        assert_eq!(table.rows.len(), 4);
        // The four DE genes dominate the head of the ranking
        for row in &table.rows {
            assert!(
                row.gene_id.contains("up") || row.gene_id.contains("down"),
                "unexpected top gene {}",
                row.gene_id
            );
        }
        // Sorted ascending by p
        for w in table.rows.windows(2) {
            assert!(w[0].p_value <= w[1].p_value);
        }
    }

    #[test]
    fn test_pipeline_respects_preset_norm_factors() {
        let mut dge = synthetic_dataset();
        dge.set_norm_factors(vec![1.0; 6]).unwrap();
        let (design, info) = DesignBuilder::new(dge.sample_metadata())
            .no_intercept()
            .factor("treatment")
            .build()
            .unwrap();
        let contrast = ContrastMatrix::parse("treated - control", &info.coef_names).unwrap();
        let results =
            run_voom_limma(&mut dge, &design, &info, &contrast, 0.5, AdjustMethod::BH).unwrap();
        // Factors untouched
        assert_eq!(dge.norm_factors().unwrap(), &[1.0; 6]);
        assert_eq!(results.n_genes(), 12);
    }
}
