use serde_json::json;

use crate::delayed::{DelayedTask, DelayedTaskStore};
use crate::scheduler::Summary;

pub const VISIBILITY_RECHECK_TASK: &str = "visibility-recheck";
pub const VISIBILITY_RECHECK_DELAY_DAYS: u32 = 14;

/// Schedule a visibility re-check for a published draft, keyed by the draft
/// id so republishing replaces the pending check.
///
/// Returns `None` when the task store is unreachable; publishing goes ahead
/// regardless.
pub async fn schedule_visibility_recheck(
    store: &DelayedTaskStore,
    draft_id: &str,
    target_query: &str,
) -> Option<DelayedTask> {
    let mut payload = Summary::new();
    payload.insert("draftId".into(), json!(draft_id));
    payload.insert("targetQuery".into(), json!(target_query));

    store
        .schedule(
            draft_id,
            VISIBILITY_RECHECK_TASK,
            VISIBILITY_RECHECK_DELAY_DAYS,
            payload,
        )
        .await
}
