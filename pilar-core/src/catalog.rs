//! Waste category table and label-to-category mapping.
//!
//! The table holds known waste-type labels, an ordered list of keyword rules
//! and one profile per category. A label is first looked up among the known
//! labels (case-insensitive, `_` and `-` read as spaces). Otherwise rules are
//! checked in order and the first rule with a keyword contained in the label
//! wins, so more specific markers must come first: "anorganik" contains
//! "organik".

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Placeholder substituted with the formatted waste type in descriptions
pub const WASTE_TYPE_PLACEHOLDER: &str = "{waste_type}";

/// Coarse waste classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteCategory {
    Organic,
    Inorganic,
    /// Hazardous waste (B3), kept for older three-class models
    Hazardous,
    Unknown,
}

/// Short actionable advice shown next to a prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub title: String,
    /// Display color as `#RRGGBB`
    pub color: String,
}

impl Tip {
    pub fn new(title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: color.into(),
        }
    }
}

/// Static presentation data for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProfile {
    pub category: WasteCategory,
    /// Display name, e.g. "Sampah Organik"
    pub name: String,
    /// Description template; `{waste_type}` is replaced on render
    pub description: String,
    #[serde(default)]
    pub tips: Vec<Tip>,
}

impl CategoryProfile {
    /// Render the description for a concrete waste type
    pub fn describe(&self, waste_type: &str) -> String {
        self.description.replace(WASTE_TYPE_PLACEHOLDER, waste_type)
    }
}

/// A fine-grained label the trained models are known to emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    pub category: WasteCategory,
}

impl LabelEntry {
    pub fn new(label: &str, category: WasteCategory) -> Self {
        Self {
            label: label.to_string(),
            category,
        }
    }
}

/// One ordered matching rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub category: WasteCategory,
    pub keywords: Vec<String>,
}

impl MatchRule {
    pub fn new(category: WasteCategory, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// `normalized` must come from `normalize_label`
    fn matches(&self, normalized: &str) -> bool {
        self.keywords
            .iter()
            .map(|keyword| normalize_label(keyword))
            .any(|keyword| !keyword.is_empty() && normalized.contains(&keyword))
    }
}

/// Immutable lookup table from predicted labels to category profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable {
    #[serde(default)]
    pub labels: Vec<LabelEntry>,
    pub rules: Vec<MatchRule>,
    pub profiles: Vec<CategoryProfile>,
    pub fallback: CategoryProfile,
}

impl CategoryTable {
    /// The table shipped with the service
    pub fn builtin() -> Self {
        let labels = [
            ("botol plastik", WasteCategory::Inorganic),
            ("kantong plastik", WasteCategory::Inorganic),
            ("kaleng", WasteCategory::Inorganic),
            ("kertas", WasteCategory::Inorganic),
            ("kardus", WasteCategory::Inorganic),
            ("kaca", WasteCategory::Inorganic),
            ("logam", WasteCategory::Inorganic),
            ("styrofoam", WasteCategory::Inorganic),
            ("daun kering", WasteCategory::Organic),
            ("sisa makanan", WasteCategory::Organic),
            ("kulit buah", WasteCategory::Organic),
            ("sayuran", WasteCategory::Organic),
            ("ranting", WasteCategory::Organic),
            ("baterai", WasteCategory::Hazardous),
            ("lampu", WasteCategory::Hazardous),
        ]
        .iter()
        .map(|(label, category)| LabelEntry::new(label, *category))
        .collect();

        let rules = vec![
            MatchRule::new(
                WasteCategory::Inorganic,
                &["anorganik", "inorganic", "non-organik", "non organik", "nonorganic"],
            ),
            MatchRule::new(WasteCategory::Hazardous, &["b3", "hazardous", "berbahaya"]),
            MatchRule::new(WasteCategory::Organic, &["organik", "organic"]),
        ];

        let profiles = vec![
            CategoryProfile {
                category: WasteCategory::Organic,
                name: "Sampah Organik".to_string(),
                description: "{waste_type} termasuk dalam kategori Sampah Organik".to_string(),
                tips: vec![
                    Tip::new("Pisahkan sampah organik dari anorganik", "#10B981"),
                    Tip::new("Buat kompos dari sisa makanan", "#4DB8AC"),
                    Tip::new("Gunakan untuk pakan ternak jika memungkinkan", "#F59E0B"),
                    Tip::new("Hindari mencampur dengan plastik", "#8B5CF6"),
                    Tip::new("Proses dalam waktu 24 jam untuk menghindari bau", "#EF4444"),
                ],
            },
            CategoryProfile {
                category: WasteCategory::Inorganic,
                name: "Sampah Anorganik".to_string(),
                description: "{waste_type} termasuk dalam kategori Sampah Anorganik".to_string(),
                tips: vec![
                    Tip::new("Bersihkan sampah anorganik sebelum dibuang", "#4DB8AC"),
                    Tip::new("Pisahkan plastik, kaca, dan logam", "#F59E0B"),
                    Tip::new("Gunakan ulang wadah yang masih layak", "#8B5CF6"),
                    Tip::new("Tekan plastik/kardus agar hemat ruang", "#EF4444"),
                    Tip::new("Setorkan ke bank sampah terdekat", "#10B981"),
                ],
            },
            CategoryProfile {
                category: WasteCategory::Hazardous,
                name: "Sampah B3".to_string(),
                description: "{waste_type} termasuk dalam kategori Sampah B3 (Bahan Berbahaya dan Beracun)"
                    .to_string(),
                tips: vec![
                    Tip::new("Jangan buang sembarangan, berbahaya!", "#EF4444"),
                    Tip::new("Simpan dalam wadah tertutup khusus", "#F59E0B"),
                    Tip::new("Serahkan ke tempat pengolahan B3", "#8B5CF6"),
                    Tip::new("Jauhkan dari jangkauan anak-anak", "#EF4444"),
                    Tip::new("Gunakan label peringatan pada wadah", "#10B981"),
                ],
            },
        ];

        let fallback = CategoryProfile {
            category: WasteCategory::Unknown,
            name: "Sampah Tidak Dikenal".to_string(),
            description: "{waste_type} belum dapat dikategorikan dengan pasti".to_string(),
            tips: Vec::new(),
        };

        Self {
            labels,
            rules,
            profiles,
            fallback,
        }
    }

    /// Load a table from file (JSON, TOML, or YAML by extension) and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let table: CategoryTable = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?
            }
            _ => serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?,
        };

        table.validate()?;
        info!(
            "Loaded category table from {:?} ({} rules, {} profiles)",
            path,
            table.rules.len(),
            table.profiles.len()
        );
        Ok(table)
    }

    /// Every rule must point at a profile, every category must appear at most
    /// once, and every tip color must be `#RRGGBB`.
    pub fn validate(&self) -> Result<()> {
        for (index, profile) in self.profiles.iter().enumerate() {
            if profile.category == WasteCategory::Unknown {
                return Err(Error::Catalog(
                    "the unknown category is reserved for the fallback profile".to_string(),
                ));
            }
            if self.profiles[..index]
                .iter()
                .any(|other| other.category == profile.category)
            {
                return Err(Error::Catalog(format!(
                    "duplicate profile for {:?}",
                    profile.category
                )));
            }
        }

        for entry in &self.labels {
            if self.profile(entry.category).is_none() {
                return Err(Error::Catalog(format!(
                    "label '{}' targets {:?} but no profile exists for it",
                    entry.label, entry.category
                )));
            }
        }

        for rule in &self.rules {
            if self.profile(rule.category).is_none() {
                return Err(Error::Catalog(format!(
                    "rule targets {:?} but no profile exists for it",
                    rule.category
                )));
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(Error::Catalog(format!(
                    "rule for {:?} has no keywords",
                    rule.category
                )));
            }
        }

        for profile in self.profiles.iter().chain(std::iter::once(&self.fallback)) {
            if let Some(tip) = profile.tips.iter().find(|tip| !is_hex_color(&tip.color)) {
                return Err(Error::Catalog(format!(
                    "tip '{}' has invalid color '{}'",
                    tip.title, tip.color
                )));
            }
        }

        Ok(())
    }

    /// Profile registered for a category, if any
    pub fn profile(&self, category: WasteCategory) -> Option<&CategoryProfile> {
        if category == WasteCategory::Unknown {
            return Some(&self.fallback);
        }
        self.profiles.iter().find(|p| p.category == category)
    }

    /// Known label first, then the first matching rule
    pub fn resolve(&self, label: &str) -> Option<WasteCategory> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }

        if let Some(entry) = self
            .labels
            .iter()
            .find(|entry| normalize_label(&entry.label) == normalized)
        {
            return Some(entry.category);
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(&normalized))
            .map(|rule| rule.category)
    }

    /// Map a predicted label to its profile.
    ///
    /// The label itself is checked first. The artifact's category hint is
    /// only consulted when no rule matches the label. Anything left
    /// unresolved maps to the fallback profile; this never fails.
    pub fn map(&self, label: &str, hint: Option<&str>) -> &CategoryProfile {
        self.resolve(label)
            .or_else(|| hint.and_then(|h| self.resolve(h)))
            .and_then(|category| self.profile(category))
            .unwrap_or(&self.fallback)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lower-case, read `_` and `-` as spaces, collapse whitespace
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}
