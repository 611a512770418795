//! The per-entity pipeline record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::{
    CharacterProfile, Envelope, RawPayload, StageData, TextPayload, VisualPayload,
};
use super::stage::{EntityId, Stage};
use crate::errors::{FailureRecord, NpcflowError};

/// Contents of one stage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageSlot<T> {
    /// The stage produced a payload.
    Succeeded(Envelope<T>),
    /// The stage failed.
    Failed(FailureRecord),
}

impl<T> StageSlot<T> {
    /// Returns the payload if the slot holds a success.
    #[must_use]
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Succeeded(envelope) => Some(&envelope.payload),
            Self::Failed(_) => None,
        }
    }

    /// Returns the failure if the slot holds one.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Returns true if the slot holds a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl<T: StageData> StageSlot<T> {
    /// Wraps a payload in a successful slot.
    #[must_use]
    pub fn succeeded(payload: T) -> Self {
        Self::Succeeded(Envelope::new(payload))
    }
}

/// Durable state of one entity's pipeline.
///
/// `stage` is the furthest completed stage. A slot after the first
/// non-successful one is always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    /// The NPC.
    pub entity_id: EntityId,
    /// Furthest completed stage.
    pub stage: Stage,
    /// Raw fetch slot.
    pub raw: Option<StageSlot<RawPayload>>,
    /// Text analysis slot.
    pub text: Option<StageSlot<TextPayload>>,
    /// Visual analysis slot.
    pub visual: Option<StageSlot<VisualPayload>>,
    /// Synthesis slot.
    pub synthesis: Option<StageSlot<CharacterProfile>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl PipelineRecord {
    /// Creates an empty record at [`Stage::None`].
    #[must_use]
    pub fn new(entity_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            stage: Stage::None,
            raw: None,
            text: None,
            visual: None,
            synthesis: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the stage pointer one step forward.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::IllegalTransition`] unless `next` directly
    /// follows the current stage.
    pub fn advance_to(&mut self, next: Stage) -> Result<(), NpcflowError> {
        if self.stage.next() != Some(next) {
            return Err(NpcflowError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Clears `stage` and every later slot, and moves the pointer back to
    /// the stage preceding `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::InvalidRefreshTarget`] for stages without a slot.
    pub fn clear_from(&mut self, stage: Stage) -> Result<(), NpcflowError> {
        let Some(previous) = stage.previous().filter(|_| stage.has_slot()) else {
            return Err(NpcflowError::InvalidRefreshTarget(stage));
        };

        if stage <= Stage::Raw {
            self.raw = None;
        }
        if stage <= Stage::Text {
            self.text = None;
        }
        if stage <= Stage::Visual {
            self.visual = None;
        }
        self.synthesis = None;
        self.stage = self.stage.min(previous);
        Ok(())
    }

    /// Returns the successful payload of type `T`, if present.
    #[must_use]
    pub fn payload<T: StageData>(&self) -> Option<&T> {
        T::slot(self).and_then(StageSlot::payload)
    }

    /// Returns true if `stage` holds a successful payload.
    #[must_use]
    pub fn has_success(&self, stage: Stage) -> bool {
        match stage {
            Stage::Raw => self.raw.as_ref().is_some_and(StageSlot::is_success),
            Stage::Text => self.text.as_ref().is_some_and(StageSlot::is_success),
            Stage::Visual => self.visual.as_ref().is_some_and(StageSlot::is_success),
            Stage::Synthesis => self.synthesis.as_ref().is_some_and(StageSlot::is_success),
            Stage::None | Stage::Complete => false,
        }
    }

    /// Returns true if `stage`'s slot is filled, with either outcome.
    #[must_use]
    pub fn has_slot(&self, stage: Stage) -> bool {
        match stage {
            Stage::Raw => self.raw.is_some(),
            Stage::Text => self.text.is_some(),
            Stage::Visual => self.visual.is_some(),
            Stage::Synthesis => self.synthesis.is_some(),
            Stage::None | Stage::Complete => false,
        }
    }

    /// Returns the failure stored for `stage`, if any.
    #[must_use]
    pub fn failure(&self, stage: Stage) -> Option<&FailureRecord> {
        match stage {
            Stage::Raw => self.raw.as_ref().and_then(StageSlot::failure),
            Stage::Text => self.text.as_ref().and_then(StageSlot::failure),
            Stage::Visual => self.visual.as_ref().and_then(StageSlot::failure),
            Stage::Synthesis => self.synthesis.as_ref().and_then(StageSlot::failure),
            Stage::None | Stage::Complete => None,
        }
    }

    /// Returns the merged profile once the record is complete.
    #[must_use]
    pub fn profile(&self) -> Option<&CharacterProfile> {
        self.payload::<CharacterProfile>()
    }

    /// Returns true if the pipeline reached [`Stage::Complete`].
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    /// Copies every filled slot and the stage pointer from `other`.
    ///
    /// Empty slots in `other` leave the existing slot untouched.
    pub fn merge_from(&mut self, other: &Self) {
        if other.raw.is_some() {
            self.raw.clone_from(&other.raw);
        }
        if other.text.is_some() {
            self.text.clone_from(&other.text);
        }
        if other.visual.is_some() {
            self.visual.clone_from(&other.visual);
        }
        if other.synthesis.is_some() {
            self.synthesis.clone_from(&other.synthesis);
        }
        self.stage = other.stage;
    }
}
