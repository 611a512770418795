//! Cache gate.

use crate::core::{PipelineRecord, Stage};

/// Returns false when `record` already holds a successful payload for
/// `stage` and `force_refresh_from` does not target `stage` or an earlier
/// stage.
///
/// A failed slot is not a cached result, so failed stages always run again.
#[must_use]
pub fn should_run(
    record: &PipelineRecord,
    stage: Stage,
    force_refresh_from: Option<Stage>,
) -> bool {
    if force_refresh_from.is_some_and(|from| from <= stage) {
        return true;
    }
    !record.has_success(stage)
}
