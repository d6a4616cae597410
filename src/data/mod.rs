//! Data structures for limma-voom analysis

mod count_matrix;
mod dataset;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::DgeList;
pub use metadata::{GeneAnnotation, SampleMetadata};
