//! Request and response types exchanged with providers.

use serde::{Deserialize, Serialize};

use crate::core::{EntityId, RawPayload, TextAttributes, VisualAttributes};

/// A fetched wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// Canonical page URL, e.g. `https://wiki/w/Hans#Ghost`.
    pub page_url: String,
    /// Page body converted to markdown.
    pub markdown: String,
    /// Image URLs in page order.
    #[serde(default)]
    pub media_refs: Vec<String>,
}

/// The NPC a request is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// The NPC.
    pub entity_id: EntityId,
    /// Display name.
    pub name: String,
    /// Variant, if any.
    pub variant: Option<String>,
}

impl From<&RawPayload> for Subject {
    fn from(raw: &RawPayload) -> Self {
        Self {
            entity_id: raw.entity_id,
            name: raw.name.clone(),
            variant: raw.variant.clone(),
        }
    }
}

/// Input to text analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRequest {
    /// The NPC.
    pub subject: Subject,
    /// Page markdown.
    pub markdown: String,
}

/// Result of text analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    /// Extracted attributes.
    pub attributes: TextAttributes,
    /// Model confidence.
    pub confidence: f64,
    /// Model reasoning.
    #[serde(default)]
    pub reasoning: String,
}

/// Result of visual analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    /// Extracted attributes.
    pub attributes: VisualAttributes,
    /// Model confidence.
    pub confidence: f64,
    /// Model reasoning.
    #[serde(default)]
    pub reasoning: String,
    /// True if the image was missing or unreadable.
    #[serde(default)]
    pub no_image: bool,
}

impl VisualAnalysis {
    /// The degraded analysis returned when there is no image.
    #[must_use]
    pub fn no_image(reasoning: impl Into<String>) -> Self {
        Self {
            attributes: VisualAttributes::unknown(),
            confidence: 0.0,
            reasoning: reasoning.into(),
            no_image: true,
        }
    }
}

/// Result of synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResponse {
    /// Chosen character archetype.
    pub archetype: String,
    /// How disagreements between text and image were resolved.
    pub conflict_resolution: String,
    /// What was inferred to cover missing attributes.
    pub gap_filling: String,
}
