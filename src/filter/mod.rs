//! Pre-model gene filtering

mod expression;

pub use expression::{filter_by_expr, FilterParams};
