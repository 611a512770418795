//! Stage extractors.
//!
//! One extractor per stage. Each consumes the previous stage's payload,
//! calls its provider and returns the stage's payload or a
//! [`ProviderError`]. Extractors never touch the record store.

mod raw;
mod synthesis;
mod text;
mod visual;

pub use raw::{parse_page_title, RawExtractor};
pub use synthesis::{SynthesisExtractor, SynthesisInput};
pub use text::TextExtractor;
pub use visual::VisualExtractor;

use async_trait::async_trait;

use crate::core::{Stage, StageData};
use crate::errors::ProviderError;
use crate::providers::ProviderConfig;

/// A single pipeline stage.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// What the stage consumes.
    type Input: Send + Sync;
    /// What the stage produces.
    type Output: StageData;

    /// The stage this extractor fills.
    fn stage(&self) -> Stage {
        <Self::Output as StageData>::STAGE
    }

    /// Runs the stage.
    async fn run(
        &self,
        input: &Self::Input,
        config: &ProviderConfig,
    ) -> Result<Self::Output, ProviderError>;
}

/// Clamps a provider confidence into [0, 1]; NaN becomes 0.
pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }
}
