//! Expression image registry.

use crate::error::AnimationAssetError;
use crate::viseme::Expression;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Image paths for the expressions that loaded.
///
/// Missing images are recorded and logged, never fatal; the synchronizer
/// skips frames it has no image for.
#[derive(Debug, Clone, Default)]
pub struct ExpressionAssets {
    paths: HashMap<Expression, PathBuf>,
    missing: Vec<AnimationAssetError>,
}

impl ExpressionAssets {
    /// Scan `dir` for every expression's image.
    pub fn load(dir: &Path) -> Result<Self, AnimationAssetError> {
        if !dir.is_dir() {
            return Err(AnimationAssetError::Directory(dir.display().to_string()));
        }

        let mut assets = Self::default();
        for expression in Expression::ALL {
            let path = dir.join(expression.asset_file());
            if path.is_file() {
                assets.paths.insert(expression, path);
            } else {
                let err = AnimationAssetError::Missing {
                    expression: expression.name(),
                    path: path.display().to_string(),
                };
                warn!("{err}");
                assets.missing.push(err);
            }
        }
        info!(
            "loaded {} of {} expression images",
            assets.paths.len(),
            Expression::ALL.len()
        );
        Ok(assets)
    }

    /// Image for `expression`, if it loaded.
    pub fn path(&self, expression: Expression) -> Option<&Path> {
        self.paths.get(&expression).map(PathBuf::as_path)
    }

    /// Whether `expression` can be shown.
    pub fn is_available(&self, expression: Expression) -> bool {
        self.paths.contains_key(&expression)
    }

    /// Images that failed to load.
    pub fn missing(&self) -> &[AnimationAssetError] {
        &self.missing
    }
}
