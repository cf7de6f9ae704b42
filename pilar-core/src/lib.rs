pub mod error;
pub mod config;
pub mod catalog;
pub mod types;

pub use error::{Error, Result};
pub use config::{PilarConfig, ConfigError, AppMode};
pub use catalog::{CategoryTable, CategoryProfile, LabelEntry, MatchRule, Tip, WasteCategory};
pub use types::{
    Confidence, RawPrediction, ClassScore, PredictionResult, ModelInsight,
    ClassProbability, format_waste_type,
};
