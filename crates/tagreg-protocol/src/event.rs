use crate::ids::ObjectId;
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published by the index for every net-new tag association.
///
/// Idempotent re-tags and removals publish nothing; subscriptions are
/// one-shot arrival notifications. `sequence` is assigned under the index's
/// relation lock, so a membership snapshot taken together with the current
/// sequence watermark already reflects every event stamped at or below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEvent {
    pub object: ObjectId,
    pub tag: Tag,
    pub sequence: u64,
    pub at: DateTime<Utc>,
}

impl TagEvent {
    pub fn now(object: ObjectId, tag: Tag, sequence: u64) -> Self {
        Self {
            object,
            tag,
            sequence,
            at: Utc::now(),
        }
    }
}
