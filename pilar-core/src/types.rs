// Prediction value types shared by the vision pipeline and the HTTP surface

use crate::catalog::{CategoryTable, Tip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence on a percentage scale, always within [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    /// Saturates at the bounds; NaN maps to 0
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() {
            return Self(Self::MIN);
        }
        Self(percent.clamp(Self::MIN, Self::MAX))
    }

    /// Probability in [0, 1]
    pub fn from_probability(probability: f64) -> Self {
        Self::from_percent(probability * 100.0)
    }

    /// Unbounded decision-function margin, squashed through the logistic curve
    pub fn from_margin(margin: f64) -> Self {
        Self::from_probability(logistic(margin))
    }

    pub fn percent(self) -> f64 {
        self.0
    }

    /// One decimal of precision, as rendered to clients
    pub fn rounded(self) -> f64 {
        (self.0 * 10.0).round() / 10.0
    }

    /// Strictly below a percentage threshold
    pub fn is_below(self, threshold: f64) -> bool {
        self.0 < threshold
    }
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Score for one class of the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub confidence: Confidence,
}

/// Top-ranked label straight out of the predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Label exactly as decoded by the artifact's label encoder
    pub label: String,
    pub confidence: Confidence,
    /// Category recorded for this label in the artifact, if any
    pub category_hint: Option<String>,
    /// Every class in artifact order
    pub scores: Vec<ClassScore>,
}

/// Per-class probability rendered in verbose responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProbability {
    pub probability: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInsight {
    pub probabilities_per_class: BTreeMap<String, ClassProbability>,
}

/// Response payload for one classified image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub waste_type: String,
    pub category: String,
    /// Percent with one decimal
    pub confidence: f64,
    pub tips: Vec<Tip>,
    pub description: String,
    /// Set when confidence falls below the active uncertainty threshold
    pub uncertain: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInsight>,
}

impl PredictionResult {
    /// Map a raw prediction through the category table.
    ///
    /// `uncertain_below` is a percentage; `None` disables the flag.
    pub fn from_prediction(
        raw: &RawPrediction,
        table: &CategoryTable,
        uncertain_below: Option<f64>,
        verbose: bool,
    ) -> Self {
        let waste_type = format_waste_type(&raw.label);
        let profile = table.map(&raw.label, raw.category_hint.as_deref());

        let model_info = verbose.then(|| ModelInsight {
            probabilities_per_class: raw
                .scores
                .iter()
                .map(|score| {
                    let category = table.map(&score.label, None);
                    (
                        format_waste_type(&score.label),
                        ClassProbability {
                            probability: score.confidence.rounded(),
                            category: category.name.clone(),
                        },
                    )
                })
                .collect(),
        });

        Self {
            description: profile.describe(&waste_type),
            category: profile.name.clone(),
            tips: profile.tips.clone(),
            confidence: raw.confidence.rounded(),
            uncertain: uncertain_below.map_or(false, |t| raw.confidence.is_below(t)),
            waste_type,
            model_info,
        }
    }
}

/// `botol_plastik` -> `Botol Plastik`
pub fn format_waste_type(label: &str) -> String {
    label
        .replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
