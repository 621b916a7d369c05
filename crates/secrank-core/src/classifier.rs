//! Fallback heading classifier
//!
//! Consulted for spans whose font size falls in a tier that maps onto no
//! heading level. The classifier sees an 8-feature vector describing the
//! span and answers with a heading level or "not a heading".
//!
//! [`TreeEnsemble`] evaluates a gradient-boosted tree ensemble exported to
//! JSON. Training happens elsewhere; this module only loads and evaluates.

use crate::error::{Error, Result};
use crate::span::Span;
use crate::tiering::HeadingLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; 8] = [
    "size",
    "gap",
    "width",
    "text_len",
    "is_bold",
    "ends_with_colon",
    "has_digits",
    "is_title_case",
];

/// Number of features per span
pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// Per-span features fed to the fallback classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureVector {
    pub size: f32,
    pub gap: f32,
    pub width: f32,
    /// Length of the normalized text in characters
    pub text_len: f32,
    pub is_bold: f32,
    pub ends_with_colon: f32,
    pub has_digits: f32,
    pub is_title_case: f32,
}

impl FeatureVector {
    /// Extract features from a normalized span.
    pub fn from_span(span: &Span) -> Self {
        Self {
            size: span.size,
            gap: span.gap,
            width: span.bbox.width(),
            text_len: span.norm_text.chars().count() as f32,
            is_bold: flag(span.is_bold),
            ends_with_colon: flag(span.text.ends_with(':')),
            has_digits: flag(span.norm_text.chars().any(|c| c.is_ascii_digit())),
            is_title_case: flag(is_title_case(&span.text)),
        }
    }

    /// Features in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f32; NUM_FEATURES] {
        [
            self.size,
            self.gap,
            self.width,
            self.text_len,
            self.is_bold,
            self.ends_with_colon,
            self.has_digits,
            self.is_title_case,
        ]
    }
}

#[inline]
fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Title case: every run of cased characters starts with an uppercase
/// letter followed only by lowercase ones, and at least one cased
/// character exists.
pub fn is_title_case(text: &str) -> bool {
    let mut prev_cased = false;
    let mut any_cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            if prev_cased {
                return false;
            }
            prev_cased = true;
            any_cased = true;
        } else if c.is_lowercase() {
            if !prev_cased {
                return false;
            }
            prev_cased = true;
            any_cased = true;
        } else {
            prev_cased = false;
        }
    }
    any_cased
}

/// Classifier verdict for one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Heading(HeadingLevel),
    /// Not a heading
    Other,
}

impl std::str::FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "O" | "o" | "none" | "None" | "" => Ok(Self::Other),
            other => other.parse().map(Self::Heading),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heading(level) => write!(f, "{level}"),
            Self::Other => write!(f, "O"),
        }
    }
}

/// Per-span heading classifier used when tiering is inconclusive.
pub trait FallbackClassifier: Send + Sync {
    /// Classify one span.
    fn predict(&self, features: &FeatureVector) -> Result<Label>;

    /// Classifier name for logging
    fn name(&self) -> &str;
}

/// One node of a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// `features[feature] <= threshold` goes left, otherwise right
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f32,
    },
}

/// A regression tree stored as a flat node list, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, x: &[f32; NUM_FEATURES]) -> f32 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Children must point forward so evaluation always terminates.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= NUM_FEATURES {
                    return Err(format!("node {i}: feature index {feature} out of range"));
                }
                for child in [left, right] {
                    if *child <= i || *child >= self.nodes.len() {
                        return Err(format!("node {i}: invalid child index {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_learning_rate() -> f32 {
    1.0
}

/// Gradient-boosted tree ensemble, one tree per class per round.
///
/// ```json
/// {
///   "classes": ["H1", "H2", "H3", "H4", "O"],
///   "base_score": [0.0, 0.0, 0.0, 0.0, 0.0],
///   "learning_rate": 0.1,
///   "rounds": [[{"nodes": [{"feature": 0, "threshold": 14.0, "left": 1, "right": 2},
///                          {"leaf": -0.5}, {"leaf": 0.5}]}, ...]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Feature names the model was trained on; checked against
    /// [`FEATURE_NAMES`] when present
    #[serde(default)]
    pub features: Vec<String>,
    pub classes: Vec<String>,
    #[serde(default)]
    pub base_score: Vec<f32>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    pub rounds: Vec<Vec<Tree>>,
    #[serde(skip)]
    labels: Vec<Label>,
}

impl TreeEnsemble {
    /// Load and validate an ensemble from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Classifier(format!("Failed to read model {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate an ensemble from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| Error::Classifier(format!("Failed to parse model: {e}")))?;
        model.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if !self.features.is_empty() && self.features != FEATURE_NAMES {
            return Err(Error::Classifier(format!(
                "Model features {:?} do not match expected {:?}",
                self.features, FEATURE_NAMES
            )));
        }
        if self.classes.is_empty() {
            return Err(Error::Classifier("Model has no classes".to_string()));
        }
        self.labels = self
            .classes
            .iter()
            .map(|c| c.parse::<Label>())
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::Classifier)?;

        if self.base_score.is_empty() {
            self.base_score = vec![0.0; self.classes.len()];
        } else if self.base_score.len() != self.classes.len() {
            return Err(Error::Classifier(format!(
                "base_score has {} entries for {} classes",
                self.base_score.len(),
                self.classes.len()
            )));
        }

        for (r, round) in self.rounds.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(Error::Classifier(format!(
                    "round {r} has {} trees for {} classes",
                    round.len(),
                    self.classes.len()
                )));
            }
            for tree in round {
                tree.validate()
                    .map_err(|e| Error::Classifier(format!("round {r}: {e}")))?;
            }
        }
        Ok(self)
    }

    /// Raw per-class scores for a feature vector.
    pub fn scores(&self, features: &FeatureVector) -> Vec<f32> {
        let x = features.to_array();
        let mut scores = self.base_score.clone();
        for round in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += self.learning_rate * tree.evaluate(&x);
            }
        }
        scores
    }
}

impl FallbackClassifier for TreeEnsemble {
    fn predict(&self, features: &FeatureVector) -> Result<Label> {
        let scores = self.scores(features);
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        self.labels
            .get(best)
            .copied()
            .ok_or_else(|| Error::Classifier("Model was not validated".to_string()))
    }

    fn name(&self) -> &str {
        "tree-ensemble"
    }
}
