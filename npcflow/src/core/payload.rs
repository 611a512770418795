//! Stage payloads and the versioned envelope they are persisted in.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::outcome::QualityFlag;
use super::record::{PipelineRecord, StageSlot};
use super::stage::{EntityId, Stage};

/// A payload type with a schema version and a home slot on the record.
pub trait StageData: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Schema version written into the envelope.
    const SCHEMA_VERSION: u32;

    /// The stage whose slot holds this payload.
    const STAGE: Stage;

    /// Borrows this payload's slot from a record.
    fn slot(record: &PipelineRecord) -> Option<&StageSlot<Self>>;

    /// Mutably borrows this payload's slot from a record.
    fn slot_mut(record: &mut PipelineRecord) -> &mut Option<StageSlot<Self>>;

    /// Advisory quality flags carried by the payload.
    fn quality(&self) -> Vec<QualityFlag> {
        Vec::new()
    }

    /// Wraps the payload in the type-erased form used by outcomes.
    fn into_stage_payload(self) -> StagePayload;
}

/// Versioned wrapper around a persisted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Schema version the payload was written with.
    pub schema_version: u32,
    /// The payload.
    pub payload: T,
}

impl<T: StageData> Envelope<T> {
    /// Wraps a payload with its current schema version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            schema_version: T::SCHEMA_VERSION,
            payload,
        }
    }
}

/// Output of the raw-fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    /// The NPC this page belongs to.
    pub entity_id: EntityId,
    /// Display name parsed from the page title.
    pub name: String,
    /// Variant parsed from the page title fragment.
    pub variant: Option<String>,
    /// Canonical wiki URL.
    pub page_url: String,
    /// Page content as markdown.
    pub markdown: String,
    /// Image references, in page order.
    pub media_refs: Vec<String>,
    /// Hex SHA-256 of `markdown`.
    pub checksum: String,
    /// When the page was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl RawPayload {
    /// Returns "Name (Variant)" or just the name.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{} ({variant})", self.name),
            None => self.name.clone(),
        }
    }
}

/// Character attributes derived from page text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAttributes {
    /// Core traits, e.g. "gruff, loyal, suspicious of outsiders".
    pub personality_traits: String,
    /// Job or role, e.g. "blacksmith".
    pub occupation: String,
    /// Place in society.
    pub social_role: String,
    /// How the character speaks.
    pub dialogue_patterns: String,
    /// Typical emotional register.
    pub emotional_range: String,
    /// Relevant history and lore.
    pub background_lore: String,
}

/// Output of the text-analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    /// Extracted attributes.
    pub attributes: TextAttributes,
    /// Provider confidence, clamped to [0, 1].
    pub confidence: f64,
    /// Provider's explanation.
    pub reasoning: String,
    /// True when confidence fell below the configured threshold.
    pub low_confidence: bool,
}

/// Character attributes derived from an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAttributes {
    /// Apparent age bracket.
    pub age_category: String,
    /// Body build.
    pub build_type: String,
    /// Clothing style.
    pub attire_style: String,
    /// Notable visual traits.
    pub distinctive_features: String,
    /// Dominant colors.
    pub color_palette: String,
    /// Archetype suggested by appearance.
    pub visual_archetype: String,
}

impl VisualAttributes {
    /// Placeholder used when no image could be analyzed.
    pub const UNKNOWN: &'static str = "unknown";

    /// Returns attributes with every field set to "unknown".
    #[must_use]
    pub fn unknown() -> Self {
        let unknown = Self::UNKNOWN.to_string();
        Self {
            age_category: unknown.clone(),
            build_type: unknown.clone(),
            attire_style: unknown.clone(),
            distinctive_features: unknown.clone(),
            color_palette: unknown.clone(),
            visual_archetype: unknown,
        }
    }
}

impl Default for VisualAttributes {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Output of the visual-analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPayload {
    /// The image that was analyzed.
    pub media_ref: Option<String>,
    /// Extracted attributes.
    pub attributes: VisualAttributes,
    /// Provider confidence, clamped to [0, 1]. Zero when `no_image`.
    pub confidence: f64,
    /// Provider's explanation.
    pub reasoning: String,
    /// True when there was no image to analyze.
    pub no_image: bool,
}

impl VisualPayload {
    /// Degraded payload for an entity with no usable image.
    #[must_use]
    pub fn no_image(reasoning: impl Into<String>) -> Self {
        Self {
            media_ref: None,
            attributes: VisualAttributes::unknown(),
            confidence: 0.0,
            reasoning: reasoning.into(),
            no_image: true,
        }
    }
}

/// Merged profile produced by synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// The NPC.
    pub entity_id: EntityId,
    /// Display name.
    pub name: String,
    /// Variant, if any.
    pub variant: Option<String>,
    /// Text-derived attributes.
    pub text: TextAttributes,
    /// Image-derived attributes ("unknown" when no image).
    pub visual: VisualAttributes,
    /// Image the visual attributes came from.
    pub media_ref: Option<String>,
    /// Archetype chosen by synthesis.
    pub character_archetype: String,
    /// Text stage confidence.
    pub text_confidence: f64,
    /// Visual stage confidence; zero for text-only profiles.
    pub visual_confidence: f64,
    /// Weighted combination of text and visual confidence.
    pub overall_confidence: f64,
    /// "Archetype: .. Conflicts: .. Gaps filled: .."
    pub synthesis_notes: String,
    /// True when the profile was built from text alone.
    pub no_image: bool,
}

/// Type-erased payload attached to a [`StageOutcome`](super::StageOutcome).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum StagePayload {
    /// Raw fetch output.
    Raw(RawPayload),
    /// Text analysis output.
    Text(TextPayload),
    /// Visual analysis output.
    Visual(VisualPayload),
    /// Synthesis output.
    Synthesis(CharacterProfile),
}

impl StageData for RawPayload {
    const SCHEMA_VERSION: u32 = 1;
    const STAGE: Stage = Stage::Raw;

    fn slot(record: &PipelineRecord) -> Option<&StageSlot<Self>> {
        record.raw.as_ref()
    }

    fn slot_mut(record: &mut PipelineRecord) -> &mut Option<StageSlot<Self>> {
        &mut record.raw
    }

    fn into_stage_payload(self) -> StagePayload {
        StagePayload::Raw(self)
    }
}

impl StageData for TextPayload {
    const SCHEMA_VERSION: u32 = 1;
    const STAGE: Stage = Stage::Text;

    fn slot(record: &PipelineRecord) -> Option<&StageSlot<Self>> {
        record.text.as_ref()
    }

    fn slot_mut(record: &mut PipelineRecord) -> &mut Option<StageSlot<Self>> {
        &mut record.text
    }

    fn quality(&self) -> Vec<QualityFlag> {
        if self.low_confidence {
            vec![QualityFlag::LowConfidence {
                confidence: self.confidence,
            }]
        } else {
            Vec::new()
        }
    }

    fn into_stage_payload(self) -> StagePayload {
        StagePayload::Text(self)
    }
}

impl StageData for VisualPayload {
    const SCHEMA_VERSION: u32 = 1;
    const STAGE: Stage = Stage::Visual;

    fn slot(record: &PipelineRecord) -> Option<&StageSlot<Self>> {
        record.visual.as_ref()
    }

    fn slot_mut(record: &mut PipelineRecord) -> &mut Option<StageSlot<Self>> {
        &mut record.visual
    }

    fn quality(&self) -> Vec<QualityFlag> {
        if self.no_image {
            vec![QualityFlag::NoImage]
        } else {
            Vec::new()
        }
    }

    fn into_stage_payload(self) -> StagePayload {
        StagePayload::Visual(self)
    }
}

impl StageData for CharacterProfile {
    const SCHEMA_VERSION: u32 = 1;
    const STAGE: Stage = Stage::Synthesis;

    fn slot(record: &PipelineRecord) -> Option<&StageSlot<Self>> {
        record.synthesis.as_ref()
    }

    fn slot_mut(record: &mut PipelineRecord) -> &mut Option<StageSlot<Self>> {
        &mut record.synthesis
    }

    fn quality(&self) -> Vec<QualityFlag> {
        if self.no_image {
            vec![QualityFlag::NoImage]
        } else {
            Vec::new()
        }
    }

    fn into_stage_payload(self) -> StagePayload {
        StagePayload::Synthesis(self)
    }
}
