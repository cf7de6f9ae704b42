//! Model artifacts, classifiers and the process-wide registry

pub mod artifact;
pub mod forest;
pub mod linear;
pub mod registry;

pub use artifact::{ArtifactFormat, Classifier, FeatureScaler, ModelArtifact, FORMAT_VERSION};
pub use forest::{Tree, TreeEnsemble, TreeNode};
pub use linear::{LinearModel, LinearOutput};
pub use registry::{LoadedModel, ModelInfo, ModelRegistry, RegistryStatus};

/// Per-class output of a classifier, in artifact class order
#[derive(Debug, Clone, PartialEq)]
pub enum Scores {
    /// Calibrated probabilities in [0, 1]
    Probabilities(Vec<f64>),
    /// Unbounded decision margins
    Margins(Vec<f64>),
}

impl Scores {
    pub fn values(&self) -> &[f64] {
        match self {
            Scores::Probabilities(values) | Scores::Margins(values) => values,
        }
    }
}
