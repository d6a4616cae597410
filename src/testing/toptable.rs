//! Top-table assembly: ranked results with annotation columns

use crate::data::GeneAnnotation;
use crate::io::TestResults;

/// Sort order for the top table.
/// R equivalent: topTable(sort.by=...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Ascending raw p-value (default); untested genes sort last
    PValue,
    /// Descending absolute log fold change
    AbsLogFc,
    /// Input order
    None,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p" | "pvalue" | "p-value" => Ok(SortBy::PValue),
            "logfc" | "lfc" => Ok(SortBy::AbsLogFc),
            "none" => Ok(SortBy::None),
            other => Err(format!(
                "Unknown sort order '{}'. Use: pvalue, logfc, none",
                other
            )),
        }
    }
}

/// One row of the top table
#[derive(Debug, Clone)]
pub struct TopTableRow {
    pub gene_id: String,
    pub log_fc: f64,
    pub ave_expr: f64,
    pub t: f64,
    pub p_value: f64,
    pub adj_p_value: f64,
    /// Annotation values, aligned with TopTable::annotation_columns
    pub annotation: Vec<String>,
}

/// Ranked result table with optional annotation columns
#[derive(Debug, Clone)]
pub struct TopTable {
    /// Names of the annotation columns appended to each row
    pub annotation_columns: Vec<String>,
    /// Tested coefficient or contrast name
    pub coefficient: String,
    pub rows: Vec<TopTableRow>,
}

/// Assemble the ranked top table from test results.
/// R equivalent: topTable(fit, coef, number=n, sort.by=...)
///
/// Annotation columns are merged by gene id with left-join semantics:
/// unannotated genes get empty strings. `n = None` keeps every gene.
pub fn top_table(
    results: &TestResults,
    annotation: Option<&GeneAnnotation>,
    sort: SortBy,
    n: Option<usize>,
) -> TopTable {
    let annotation_columns: Vec<String> = annotation
        .map(|a| a.column_names().to_vec())
        .unwrap_or_default();

    let mut order: Vec<usize> = (0..results.n_genes()).collect();
    match sort {
        SortBy::PValue => {
            order.sort_by(|&a, &b| {
                let pa = results.p_value[a];
                let pb = results.p_value[b];
                match (pa.is_nan(), pb.is_nan()) {
                    (true, true) => std::cmp::Ordering::Equal,
                    (true, false) => std::cmp::Ordering::Greater,
                    (false, true) => std::cmp::Ordering::Less,
                    (false, false) => pa.partial_cmp(&pb).unwrap(),
                }
            });
        }
        SortBy::AbsLogFc => {
            order.sort_by(|&a, &b| {
                let fa = results.log_fc[a].abs();
                let fb = results.log_fc[b].abs();
                match (fa.is_nan(), fb.is_nan()) {
                    (true, true) => std::cmp::Ordering::Equal,
                    (true, false) => std::cmp::Ordering::Greater,
                    (false, true) => std::cmp::Ordering::Less,
                    (false, false) => fb.partial_cmp(&fa).unwrap(),
                }
            });
        }
        SortBy::None => {}
    }

    if let Some(limit) = n {
        order.truncate(limit);
    }

    let rows: Vec<TopTableRow> = order
        .into_iter()
        .map(|i| {
            let gene_id = results.gene_ids[i].clone();
            let annotation_values: Vec<String> = annotation
                .map(|a| {
                    annotation_columns
                        .iter()
                        .map(|col| a.value(&gene_id, col).to_string())
                        .collect()
                })
                .unwrap_or_default();
            TopTableRow {
                gene_id,
                log_fc: results.log_fc[i],
                ave_expr: results.ave_expr[i],
                t: results.t[i],
                p_value: results.p_value[i],
                adj_p_value: results.adj_p_value[i],
                annotation: annotation_values,
            }
        })
        .collect();

    TopTable {
        annotation_columns,
        coefficient: results.coefficient.clone(),
        rows,
    }
}
