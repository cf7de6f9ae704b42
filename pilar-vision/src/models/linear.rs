//! Linear classifiers: multinomial/binary logistic regression and
//! one-vs-rest margin models

use super::Scores;
use crate::utils::{dot, softmax};
use pilar_core::types::logistic;
use serde::{Deserialize, Serialize};

/// How raw linear outputs become class scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearOutput {
    /// Softmax over rows (or a sigmoid when a single row scores two classes)
    Softmax,
    /// Raw decision-function margins
    Margin,
}

/// One weight row and intercept per class. A single row with two classes
/// scores the positive (second) class, as in binary logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    pub output: LinearOutput,
}

impl LinearModel {
    pub fn input_width(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    pub fn validate(&self, num_classes: usize) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("linear model has no weight rows".to_string());
        }
        let width = self.input_width();
        if width == 0 {
            return Err("linear model has zero-width weight rows".to_string());
        }
        if let Some(row) = self.weights.iter().position(|row| row.len() != width) {
            return Err(format!("weight row {} has {} columns, expected {}", row, self.weights[row].len(), width));
        }
        if self.intercepts.len() != self.weights.len() {
            return Err(format!(
                "{} intercepts for {} weight rows",
                self.intercepts.len(),
                self.weights.len()
            ));
        }
        let rows = self.weights.len();
        if !(rows == num_classes || (rows == 1 && num_classes == 2)) {
            return Err(format!("{} weight rows cannot score {} classes", rows, num_classes));
        }
        if self.weights.iter().flatten().chain(&self.intercepts).any(|v| !v.is_finite()) {
            return Err("linear model contains non-finite coefficients".to_string());
        }
        Ok(())
    }

    /// Caller guarantees `features.len() == input_width()`
    pub fn decide(&self, features: &[f64]) -> Scores {
        let raw: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, intercept)| dot(row, features) + intercept)
            .collect();

        match (self.output, raw.as_slice()) {
            (LinearOutput::Softmax, [z]) => {
                let positive = logistic(*z);
                Scores::Probabilities(vec![1.0 - positive, positive])
            }
            (LinearOutput::Softmax, _) => Scores::Probabilities(softmax(&raw)),
            (LinearOutput::Margin, [z]) => Scores::Margins(vec![-z, *z]),
            (LinearOutput::Margin, _) => Scores::Margins(raw),
        }
    }
}
