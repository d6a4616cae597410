//! Normalization methods for RNA-seq count data

mod cpm;
mod tmm;

pub use cpm::{cpm, log2_cpm};
pub use tmm::{calc_norm_factors, NormMethod};
