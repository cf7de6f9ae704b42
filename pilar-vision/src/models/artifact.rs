//! Serialized model artifact
//!
//! An artifact bundles everything inference needs: the feature recipe, an
//! optional feature scaler, the classifier, the label decoder (`classes`) and
//! the per-label waste-category hints. `.json` files are read with
//! serde_json, `.bin` files with bincode.

use super::forest::TreeEnsemble;
use super::linear::LinearModel;
use super::Scores;
use crate::error::VisionError;
use crate::features::FeatureSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

pub const FORMAT_VERSION: u32 = 1;

/// Serialization format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Bincode,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Result<Self, VisionError> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Ok(ArtifactFormat::Json),
            Some("bin") => Ok(ArtifactFormat::Bincode),
            other => Err(VisionError::Artifact(format!(
                "unsupported artifact extension {:?} (expected .json or .bin)",
                other.unwrap_or("")
            ))),
        }
    }
}

/// Feature scaling applied before the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScaler {
    /// `(x - data_min) / (data_max - data_min)` mapped onto `range`
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        range: (f64, f64),
    },
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
}

impl FeatureScaler {
    pub fn width(&self) -> usize {
        match self {
            FeatureScaler::MinMax { data_min, .. } => data_min.len(),
            FeatureScaler::Standard { mean, .. } => mean.len(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let values: Vec<&f64> = match self {
            FeatureScaler::MinMax { data_min, data_max, range } => {
                if data_min.len() != data_max.len() {
                    return Err(format!(
                        "min_max scaler has {} minimums and {} maximums",
                        data_min.len(),
                        data_max.len()
                    ));
                }
                if !(range.0 < range.1) {
                    return Err(format!("min_max scaler range {:?} is empty", range));
                }
                data_min.iter().chain(data_max).collect()
            }
            FeatureScaler::Standard { mean, scale } => {
                if mean.len() != scale.len() {
                    return Err(format!(
                        "standard scaler has {} means and {} scales",
                        mean.len(),
                        scale.len()
                    ));
                }
                mean.iter().chain(scale).collect()
            }
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err("scaler contains non-finite statistics".to_string());
        }
        Ok(())
    }

    /// Constant columns are passed through unscaled
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        match self {
            FeatureScaler::MinMax { data_min, data_max, range } => features
                .iter()
                .zip(data_min.iter().zip(data_max))
                .map(|(x, (lo, hi))| {
                    let span = hi - lo;
                    let span = if span == 0.0 { 1.0 } else { span };
                    (x - lo) / span * (range.1 - range.0) + range.0
                })
                .collect(),
            FeatureScaler::Standard { mean, scale } => features
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (mu, sigma))| {
                    let sigma = if *sigma == 0.0 { 1.0 } else { *sigma };
                    (x - mu) / sigma
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
}

impl Classifier {
    pub fn input_width(&self) -> usize {
        match self {
            Classifier::Linear(model) => model.input_width(),
            Classifier::TreeEnsemble(model) => model.input_width(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::Linear(_) => "linear",
            Classifier::TreeEnsemble(_) => "tree_ensemble",
        }
    }

    fn validate(&self, num_classes: usize) -> Result<(), String> {
        match self {
            Classifier::Linear(model) => model.validate(num_classes),
            Classifier::TreeEnsemble(model) => model.validate(num_classes),
        }
    }

    fn decide(&self, features: &[f64]) -> Scores {
        match self {
            Classifier::Linear(model) => model.decide(features),
            Classifier::TreeEnsemble(model) => model.decide(features),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub name: String,
    pub features: FeatureSpec,
    #[serde(default)]
    pub scaler: Option<FeatureScaler>,
    pub classifier: Classifier,
    /// Label decoder: class index to label
    pub classes: Vec<String>,
    /// Label to category hint recorded at training time
    #[serde(default)]
    pub waste_map: BTreeMap<String, String>,
    /// Training-time confidence floor as a probability in [0, 1]
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

impl ModelArtifact {
    /// Read and validate an artifact file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let format = ArtifactFormat::from_path(path)?;
        let bytes = fs::read(path)?;
        let artifact = Self::from_bytes(&bytes, format)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_bytes(bytes: &[u8], format: ArtifactFormat) -> Result<Self, VisionError> {
        match format {
            ArtifactFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| VisionError::Artifact(format!("invalid JSON artifact: {}", e))),
            ArtifactFormat::Bincode => bincode::deserialize(bytes)
                .map_err(|e| VisionError::Artifact(format!("invalid binary artifact: {}", e))),
        }
    }

    pub fn to_bytes(&self, format: ArtifactFormat) -> Result<Vec<u8>, VisionError> {
        match format {
            ArtifactFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| VisionError::Artifact(format!("failed to encode artifact: {}", e))),
            ArtifactFormat::Bincode => bincode::serialize(self)
                .map_err(|e| VisionError::Artifact(format!("failed to encode artifact: {}", e))),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VisionError> {
        let path = path.as_ref();
        let bytes = self.to_bytes(ArtifactFormat::from_path(path)?)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Check that every component agrees on widths and class counts
    pub fn validate(&self) -> Result<(), VisionError> {
        let fail = |msg: String| Err(VisionError::Artifact(msg));

        if self.format_version != FORMAT_VERSION {
            return fail(format!(
                "unsupported format_version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        self.features.validate().map_err(VisionError::Artifact)?;

        if self.classes.len() < 2 {
            return fail(format!("artifact needs at least two classes, has {}", self.classes.len()));
        }
        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.trim().is_empty() {
                return fail("artifact contains an empty class label".to_string());
            }
            if !seen.insert(class.as_str()) {
                return fail(format!("duplicate class label '{}'", class));
            }
        }

        let width = self.features.len();
        if let Some(scaler) = &self.scaler {
            scaler.validate().map_err(VisionError::Artifact)?;
            if scaler.width() != width {
                return fail(format!("scaler expects {} features, extractor yields {}", scaler.width(), width));
            }
        }

        self.classifier.validate(self.classes.len()).map_err(VisionError::Artifact)?;
        if self.classifier.input_width() != width {
            return fail(format!(
                "classifier expects {} features, extractor yields {}",
                self.classifier.input_width(),
                width
            ));
        }

        if let Some(label) = self.waste_map.keys().find(|label| !seen.contains(label.as_str())) {
            return fail(format!("waste_map entry '{}' is not a known class", label));
        }
        if let Some(threshold) = self.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return fail(format!("confidence_threshold {} is outside [0, 1]", threshold));
            }
        }
        Ok(())
    }

    /// Width of the vectors the classifier accepts
    pub fn input_width(&self) -> usize {
        self.classifier.input_width()
    }

    /// Scale the features and run the classifier
    pub fn decide(&self, features: &[f64]) -> Result<Scores, VisionError> {
        if features.len() != self.input_width() {
            return Err(VisionError::Inference(format!(
                "feature vector has {} values, model expects {}",
                features.len(),
                self.input_width()
            )));
        }
        let scores = match &self.scaler {
            Some(scaler) => self.classifier.decide(&scaler.transform(features)),
            None => self.classifier.decide(features),
        };
        if scores.values().len() != self.classes.len() {
            return Err(VisionError::Inference(format!(
                "classifier produced {} scores for {} classes",
                scores.values().len(),
                self.classes.len()
            )));
        }
        Ok(scores)
    }

    /// Confidence floor on the percentage scale
    pub fn threshold_percent(&self) -> Option<f64> {
        self.confidence_threshold.map(|t| t * 100.0)
    }
}
