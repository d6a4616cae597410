//! Input/Output: delimited-text tables and result structures

mod results;
mod table;

pub use results::{ResultsSummary, TestResults};
pub use table::{
    read_count_matrix, read_gene_annotation, read_sample_metadata, write_expression_matrix,
    write_top_table,
};
