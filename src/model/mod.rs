//! Linear modelling: design matrices, per-gene weighted least squares,
//! and contrast evaluation

mod contrasts;
mod design;
mod fit;

pub use contrasts::{contrasts_fit, ContrastMatrix};
pub use design::{check_full_rank, DesignBuilder, DesignInfo};
pub use fit::{lm_fit, LmFit};
