//! P-value adjustment for multiple testing
//!
//! The correction runs once, over the full vector of tested genes. NaN
//! entries (genes that could not be tested) stay NaN and do not count
//! toward the number of tests.

/// P-value adjustment method.
/// R equivalent: the method argument of p.adjust()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustMethod {
    /// Benjamini-Hochberg false discovery rate (default)
    BH,
    /// Benjamini-Yekutieli FDR under arbitrary dependence
    BY,
    /// Holm step-down family-wise error rate
    Holm,
    /// Bonferroni family-wise error rate
    Bonferroni,
    /// No adjustment
    None,
}

impl std::str::FromStr for AdjustMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bh" | "fdr" => Ok(AdjustMethod::BH),
            "by" => Ok(AdjustMethod::BY),
            "holm" => Ok(AdjustMethod::Holm),
            "bonferroni" => Ok(AdjustMethod::Bonferroni),
            "none" => Ok(AdjustMethod::None),
            other => Err(format!(
                "Unknown adjustment method '{}'. Use: BH, BY, holm, bonferroni, none",
                other
            )),
        }
    }
}

/// Adjust p-values for multiple testing.
/// R equivalent: p.adjust(p, method=...)
pub fn adjust_pvalues(pvalues: &[f64], method: AdjustMethod) -> Vec<f64> {
    match method {
        AdjustMethod::BH => step_up_fdr(pvalues, 1.0),
        AdjustMethod::BY => {
            let m = n_tested(pvalues) as f64;
            // Harmonic-sum inflation for arbitrary dependence
            let c: f64 = (1..=m as usize).map(|i| 1.0 / i as f64).sum();
            step_up_fdr(pvalues, c)
        }
        AdjustMethod::Holm => holm(pvalues),
        AdjustMethod::Bonferroni => {
            let m = n_tested(pvalues) as f64;
            pvalues
                .iter()
                .map(|&p| if p.is_nan() { f64::NAN } else { (p * m).min(1.0) })
                .collect()
        }
        AdjustMethod::None => pvalues.to_vec(),
    }
}

fn n_tested(pvalues: &[f64]) -> usize {
    pvalues.iter().filter(|p| p.is_finite()).count()
}

/// Indices of finite p-values sorted ascending, NaN excluded
fn sorted_tested_indices(pvalues: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..pvalues.len())
        .filter(|&i| pvalues[i].is_finite())
        .collect();
    idx.sort_by(|&a, &b| pvalues[a].partial_cmp(&pvalues[b]).unwrap());
    idx
}

/// Step-up FDR control: BH with scale 1, BY with the harmonic-sum scale.
/// R equivalent: p.adjust(method="BH"/"BY")
fn step_up_fdr(pvalues: &[f64], scale: f64) -> Vec<f64> {
    let idx = sorted_tested_indices(pvalues);
    let m = idx.len();
    let mut adjusted = vec![f64::NAN; pvalues.len()];
    if m == 0 {
        return adjusted;
    }

    // Walk from the largest p-value down, carrying the cumulative minimum
    let mut running_min = f64::INFINITY;
    for (rank0, &i) in idx.iter().enumerate().rev() {
        let rank = rank0 + 1;
        let candidate = (pvalues[i] * scale * m as f64 / rank as f64).min(1.0);
        running_min = running_min.min(candidate);
        adjusted[i] = running_min;
    }
    adjusted
}

/// Holm step-down adjustment.
/// R equivalent: p.adjust(method="holm")
fn holm(pvalues: &[f64]) -> Vec<f64> {
    let idx = sorted_tested_indices(pvalues);
    let m = idx.len();
    let mut adjusted = vec![f64::NAN; pvalues.len()];

    let mut running_max = 0.0_f64;
    for (rank0, &i) in idx.iter().enumerate() {
        let candidate = ((m - rank0) as f64 * pvalues[i]).min(1.0);
        running_max = running_max.max(candidate);
        adjusted[i] = running_max;
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_matches_r_reference() {
        // R: p.adjust(c(0.01, 0.04, 0.03, 0.02), method="BH")
        //    -> 0.04 0.04 0.04 0.04
        let padj = adjust_pvalues(&[0.01, 0.04, 0.03, 0.02], AdjustMethod::BH);
        for &v in &padj {
            assert!((v - 0.04).abs() < 1e-12, "got {:?}", padj);
        }
    }

    #[test]
    fn test_bh_distinct_values() {
        // R: p.adjust(c(0.001, 0.01, 0.05, 0.2), method="BH")
        //    -> 0.004, 0.02, 0.06666667, 0.2
        let padj = adjust_pvalues(&[0.001, 0.01, 0.05, 0.2], AdjustMethod::BH);
        let expected = [0.004, 0.02, 0.05 * 4.0 / 3.0, 0.2];
        for (a, e) in padj.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-10, "{:?} vs {:?}", padj, expected);
        }
    }

    #[test]
    fn test_bh_monotone_in_sorted_order() {
        let p = vec![0.3, 0.001, 0.04, 0.9, 0.02, 0.06];
        let padj = adjust_pvalues(&p, AdjustMethod::BH);
        let mut pairs: Vec<(f64, f64)> = p.iter().copied().zip(padj.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1 + 1e-15);
        }
        // Adjusted never below raw
        for (raw, adj) in &pairs {
            assert!(adj >= raw);
        }
    }

    #[test]
    fn test_nan_preserved_and_excluded() {
        let p = vec![0.01, f64::NAN, 0.02];
        let padj = adjust_pvalues(&p, AdjustMethod::BH);
        assert!(padj[1].is_nan());
        // m = 2, not 3: padj[1] would change if NaN were counted
        assert!((padj[0] - 0.02).abs() < 1e-12);
        assert!((padj[2] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_by_more_conservative_than_bh() {
        let p = vec![0.01, 0.02, 0.03, 0.04, 0.05];
        let bh = adjust_pvalues(&p, AdjustMethod::BH);
        let by = adjust_pvalues(&p, AdjustMethod::BY);
        for (b, y) in bh.iter().zip(by.iter()) {
            assert!(y >= b);
        }
    }

    #[test]
    fn test_holm_matches_r_reference() {
        // R: p.adjust(c(0.01, 0.02, 0.03), method="holm") -> 0.03 0.04 0.04
        let padj = adjust_pvalues(&[0.01, 0.02, 0.03], AdjustMethod::Holm);
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!((padj[1] - 0.04).abs() < 1e-12);
        assert!((padj[2] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_bonferroni_clamped() {
        let padj = adjust_pvalues(&[0.4, 0.001], AdjustMethod::Bonferroni);
        assert_eq!(padj[0], 0.8f64.min(1.0));
        assert!((padj[1] - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_none_identity() {
        let p = vec![0.1, 0.5];
        assert_eq!(adjust_pvalues(&p, AdjustMethod::None), p);
    }
}
