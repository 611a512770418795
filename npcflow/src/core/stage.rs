//! Entity identifiers and the stage enum.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable integer key of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A step of the extraction pipeline.
///
/// Variants are declared in pipeline order so the derived `Ord` matches
/// `None < Raw < Text < Visual < Synthesis < Complete`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has completed yet.
    #[default]
    None,
    /// Wiki page fetched.
    Raw,
    /// Text analysis done.
    Text,
    /// Visual analysis done.
    Visual,
    /// Synthesis done.
    Synthesis,
    /// Terminal stage.
    Complete,
}

impl Stage {
    /// Stages that run an extractor, in execution order.
    pub const EXTRACTION_ORDER: [Self; 4] = [Self::Raw, Self::Text, Self::Visual, Self::Synthesis];

    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Raw),
            Self::Raw => Some(Self::Text),
            Self::Text => Some(Self::Visual),
            Self::Visual => Some(Self::Synthesis),
            Self::Synthesis => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Returns the stage that precedes this one, if any.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::None => None,
            Self::Raw => Some(Self::None),
            Self::Text => Some(Self::Raw),
            Self::Visual => Some(Self::Text),
            Self::Synthesis => Some(Self::Visual),
            Self::Complete => Some(Self::Synthesis),
        }
    }

    /// Returns true if the stage owns a payload slot on the record.
    #[must_use]
    pub const fn has_slot(self) -> bool {
        matches!(self, Self::Raw | Self::Text | Self::Visual | Self::Synthesis)
    }

    /// Returns the snake_case name used in storage and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Raw => "raw",
            Self::Text => "text",
            Self::Visual => "visual",
            Self::Synthesis => "synthesis",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "raw" => Ok(Self::Raw),
            "text" => Ok(Self::Text),
            "visual" => Ok(Self::Visual),
            "synthesis" => Ok(Self::Synthesis),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::None < Stage::Raw);
        assert!(Stage::Raw < Stage::Text);
        assert!(Stage::Text < Stage::Visual);
        assert!(Stage::Visual < Stage::Synthesis);
        assert!(Stage::Synthesis < Stage::Complete);
    }

    #[test]
    fn test_next_and_previous_are_inverse() {
        let mut stage = Stage::None;
        while let Some(next) = stage.next() {
            assert_eq!(next.previous(), Some(stage));
            stage = next;
        }
        assert_eq!(stage, Stage::Complete);
    }

    #[test]
    fn test_only_extraction_stages_have_slots() {
        assert!(!Stage::None.has_slot());
        assert!(!Stage::Complete.has_slot());
        for stage in Stage::EXTRACTION_ORDER {
            assert!(stage.has_slot());
        }
    }

    #[test]
    fn test_stage_serde_and_parse() {
        let json = serde_json::to_string(&Stage::Synthesis).unwrap();
        assert_eq!(json, r#""synthesis""#);
        assert_eq!("Visual".parse::<Stage>().unwrap(), Stage::Visual);
        assert!("audio".parse::<Stage>().is_err());
    }

    #[test]
    fn test_entity_id_is_transparent() {
        let id = EntityId::new(1274);
        assert_eq!(serde_json::to_string(&id).unwrap(), "1274");
        assert_eq!(id.to_string(), "1274");
        assert_eq!(EntityId::from(1274), id);
    }
}
