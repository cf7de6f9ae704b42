//! Gradient-boosted tree ensembles
//!
//! Trees are interleaved by output group: tree `i` contributes to group
//! `i % num_groups`. A single group is a binary model whose raw score goes
//! through a sigmoid; several groups are turned into probabilities by softmax.

use super::Scores;
use crate::utils::softmax;
use pilar_core::types::logistic;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Go to `left` when `features[feature] < threshold`, else `right`.
    /// Missing (NaN) values follow `default_left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf { value: f64 },
}

/// Flat node list; node 0 is the root and children always sit after their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn validate(&self, width: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, threshold, left, right, .. } => {
                    if *feature >= width {
                        return Err(format!("node {} splits on feature {} of {}", index, feature, width));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", index));
                    }
                    for child in [left, right] {
                        if *child <= index || *child >= self.nodes.len() {
                            return Err(format!("node {} points to invalid child {}", index, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} is not finite", index));
                    }
                }
            }
        }
        Ok(())
    }

    /// Caller guarantees the tree passed `validate`
    fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right, default_left } => {
                    let x = features[*feature];
                    let go_left = if x.is_nan() { *default_left } else { x < *threshold };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub num_features: usize,
    pub num_groups: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn input_width(&self) -> usize {
        self.num_features
    }

    pub fn validate(&self, num_classes: usize) -> Result<(), String> {
        if self.num_features == 0 {
            return Err("tree ensemble declares zero features".to_string());
        }
        if self.num_groups == 0 {
            return Err("tree ensemble declares zero output groups".to_string());
        }
        let expected_classes = if self.num_groups == 1 { 2 } else { self.num_groups };
        if num_classes != expected_classes {
            return Err(format!(
                "{} output groups score {} classes, artifact lists {}",
                self.num_groups, expected_classes, num_classes
            ));
        }
        if self.trees.is_empty() {
            return Err("tree ensemble has no trees".to_string());
        }
        if !self.base_score.is_finite() {
            return Err("base_score is not finite".to_string());
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_features).map_err(|e| format!("tree {}: {}", index, e))?;
        }
        Ok(())
    }

    /// Summed leaf values per group, before the link function
    pub fn raw_scores(&self, features: &[f64]) -> Vec<f64> {
        let mut sums = vec![self.base_score; self.num_groups];
        for (index, tree) in self.trees.iter().enumerate() {
            sums[index % self.num_groups] += tree.leaf_value(features);
        }
        sums
    }

    pub fn decide(&self, features: &[f64]) -> Scores {
        let raw = self.raw_scores(features);
        match raw.as_slice() {
            [z] => {
                let positive = logistic(*z);
                Scores::Probabilities(vec![1.0 - positive, positive])
            }
            _ => Scores::Probabilities(softmax(&raw)),
        }
    }
}
