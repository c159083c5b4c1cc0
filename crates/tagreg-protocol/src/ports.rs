//! Collaborator boundary for the registry.
//!
//! These traits are the only runtime seam between the registry core and the
//! external systems it leans on: the object system that owns object
//! lifetimes, and the telemetry sink that receives operation records.
//!
//! Both ports are synchronous. The index validates liveness and resolves
//! names while servicing lookups and must never await mid-operation, so the
//! contract requires cheap, non-blocking calls; a telemetry sink that wants
//! to do real I/O is expected to hand the record off to its own task.

use crate::error::RegistryResult;
use crate::ids::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured operation record forwarded to the telemetry collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: String,
    pub details: Option<Value>,
    pub at: DateTime<Utc>,
}

/// The object/runtime system that creates, destroys, and clones managed
/// objects. The registry only ever references objects by [`ObjectId`] and
/// revalidates liveness through this port before returning a handle.
pub trait ObjectSystemPort: Send + Sync {
    /// Construct a new object of the named class.
    fn construct(&self, class_name: &str) -> RegistryResult<ObjectId>;

    /// Deep-clone an object and its subtree, returning the clone's id.
    fn clone_object(&self, object: ObjectId) -> RegistryResult<ObjectId>;

    /// The transitive descendant set of an object, excluding the object
    /// itself. Empty when the object is a leaf or unknown.
    fn descendants(&self, object: ObjectId) -> Vec<ObjectId>;

    /// The object's display name, or `None` once it has been destroyed.
    /// Names are not required to be unique.
    fn display_name(&self, object: ObjectId) -> Option<String>;

    /// Set a single property on the object.
    fn set_property(&self, object: ObjectId, key: &str, value: Value) -> RegistryResult<()>;

    /// Whether the object still exists in the object system.
    fn is_alive(&self, object: ObjectId) -> bool;
}

/// Fire-and-forget telemetry sink. Must not block the caller.
pub trait TelemetryPort: Send + Sync {
    fn record(&self, record: OperationRecord);
}
