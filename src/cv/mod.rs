//! Cross-validation splitting

mod split;

pub use split::{fold_dir_name, stratified_k_fold, Fold, FoldPlan, SplitFingerprint};
