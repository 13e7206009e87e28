//! Planar point-set alignment: weighted 2-D similarity transforms, singular
//! point removal, and robust (IRLS) outlier detection.

pub mod helmert;
pub mod irls;
pub mod singular;

pub use helmert::{
    helmert_key, homothetic_key, match_ratio_circle, match_ratio_tissot, residual_std_dev,
    transform_points, HelmertKey, HomotheticKey,
};
pub use irls::irls_k_best;
pub use singular::remove_singular_points;
