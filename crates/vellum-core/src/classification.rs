//! Classification results and chunking strategies.
//!
//! The classifier's output is a closed set of values so that routing over it is
//! exhaustive. Labels coming back from the remote model are normalized and
//! anything unrecognised lands in an explicit `Other` variant.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Normalize a free-form label: lowercase, `_`/`-` become spaces, whitespace collapsed.
fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Subject domain of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDomain {
    ComputerScience,
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    Medicine,
    Engineering,
    Economics,
    SocialScience,
    Humanities,
    Law,
    General,
    Other,
}

impl ContentDomain {
    pub const ALL: [ContentDomain; 13] = [
        ContentDomain::ComputerScience,
        ContentDomain::Mathematics,
        ContentDomain::Physics,
        ContentDomain::Chemistry,
        ContentDomain::Biology,
        ContentDomain::Medicine,
        ContentDomain::Engineering,
        ContentDomain::Economics,
        ContentDomain::SocialScience,
        ContentDomain::Humanities,
        ContentDomain::Law,
        ContentDomain::General,
        ContentDomain::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ContentDomain::ComputerScience => "computer science",
            ContentDomain::Mathematics => "mathematics",
            ContentDomain::Physics => "physics",
            ContentDomain::Chemistry => "chemistry",
            ContentDomain::Biology => "biology",
            ContentDomain::Medicine => "medicine",
            ContentDomain::Engineering => "engineering",
            ContentDomain::Economics => "economics",
            ContentDomain::SocialScience => "social science",
            ContentDomain::Humanities => "humanities",
            ContentDomain::Law => "law",
            ContentDomain::General => "general",
            ContentDomain::Other => "other",
        }
    }

    /// Map a model-provided label onto the closed set. Never fails.
    pub fn from_label(label: &str) -> Self {
        let normalized = normalize_label(label);
        match normalized.as_str() {
            "computer science" | "cs" | "computing" => ContentDomain::ComputerScience,
            "mathematics" | "math" | "maths" | "statistics" => ContentDomain::Mathematics,
            "physics" | "astronomy" => ContentDomain::Physics,
            "chemistry" => ContentDomain::Chemistry,
            "biology" | "life sciences" => ContentDomain::Biology,
            "medicine" | "medical" | "health" => ContentDomain::Medicine,
            "engineering" => ContentDomain::Engineering,
            "economics" | "finance" | "business" => ContentDomain::Economics,
            "social science" | "social sciences" | "sociology" | "psychology" => {
                ContentDomain::SocialScience
            }
            "humanities" | "history" | "philosophy" | "literature" => ContentDomain::Humanities,
            "law" | "legal" => ContentDomain::Law,
            "general" => ContentDomain::General,
            _ => ContentDomain::Other,
        }
    }
}

impl std::fmt::Display for ContentDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Structural shape of a document, which drives the chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralCategory {
    /// Continuous prose: theses, monographs, review articles.
    DenseAcademicText,
    /// Prose interleaved with figures, equations and tables.
    MixedScientificPaper,
    /// Predominantly tables: datasets, spec sheets, financial statements.
    TabularDocument,
    /// Informal or narrative writing.
    Narrative,
    Other,
}

impl StructuralCategory {
    pub const ALL: [StructuralCategory; 5] = [
        StructuralCategory::DenseAcademicText,
        StructuralCategory::MixedScientificPaper,
        StructuralCategory::TabularDocument,
        StructuralCategory::Narrative,
        StructuralCategory::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StructuralCategory::DenseAcademicText => "dense academic text",
            StructuralCategory::MixedScientificPaper => "mixed scientific paper",
            StructuralCategory::TabularDocument => "tabular document",
            StructuralCategory::Narrative => "narrative",
            StructuralCategory::Other => "other",
        }
    }

    /// Map a model-provided label onto the closed set. Never fails.
    pub fn from_label(label: &str) -> Self {
        let normalized = normalize_label(label);
        match normalized.as_str() {
            "dense academic text" | "dense academic" | "academic text" => {
                StructuralCategory::DenseAcademicText
            }
            "mixed scientific paper" | "mixed scientific" | "scientific paper" => {
                StructuralCategory::MixedScientificPaper
            }
            "tabular document" | "tabular" | "table" | "tables" => {
                StructuralCategory::TabularDocument
            }
            "narrative" | "narrative text" => StructuralCategory::Narrative,
            _ => StructuralCategory::Other,
        }
    }
}

impl std::fmt::Display for StructuralCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Output of the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub domain: ContentDomain,
    pub category: StructuralCategory,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    pub reasoning: String,
}

impl Classification {
    pub fn new(
        domain: ContentDomain,
        category: StructuralCategory,
        confidence: f32,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            category,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        }
    }

    /// Whether the result is confident enough to pick a category-specific strategy.
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// Concrete chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Separator-hierarchy splitting with a fixed window and overlap.
    Recursive,
    /// Keeps table blocks intact and splits surrounding prose recursively.
    TableAware,
    /// Packs whole paragraphs, then sentences, up to the window size.
    Paragraph,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Recursive => "recursive",
            ChunkingStrategy::TableAware => "table_aware",
            ChunkingStrategy::Paragraph => "paragraph",
        }
    }
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_label(s).as_str() {
            "recursive" => Ok(ChunkingStrategy::Recursive),
            "table aware" => Ok(ChunkingStrategy::TableAware),
            "paragraph" => Ok(ChunkingStrategy::Paragraph),
            other => Err(Error::InvalidInput(format!("unknown chunking strategy: {}", other))),
        }
    }
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
