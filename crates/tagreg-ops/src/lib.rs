//! Object lifecycle façade over the index and the object system.
//!
//! Everything here is thin glue: create and clone delegate to the object
//! system and stamp the reserved `Framework` tag through the index, settings
//! application is per-key isolated, and operation logging forwards structured
//! records to the telemetry collaborator.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tagreg_index::TagIndex;
use tagreg_protocol::{
    FRAMEWORK_TAG, ObjectId, ObjectSystemPort, OperationRecord, RegistryError, RegistryResult,
    TelemetryPort, fold_key,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Telemetry sink that emits records through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingTelemetry;

impl TelemetryPort for TracingTelemetry {
    fn record(&self, record: OperationRecord) {
        info!(
            target: "tagreg::telemetry",
            operation = %record.operation,
            details = ?record.details,
            at = %record.at,
            "operation recorded"
        );
    }
}

/// Telemetry sink that drops every record.
#[derive(Debug, Default, Clone)]
pub struct NullTelemetry;

impl TelemetryPort for NullTelemetry {
    fn record(&self, _record: OperationRecord) {}
}

/// Outcome of a settings batch: which keys applied, which failed and why.
/// Partial application is the designed behavior, not an error.
#[derive(Debug, Clone, Default)]
pub struct SettingsReport {
    pub applied: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SettingsReport {
    pub fn fully_applied(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Façade for object creation, cloning, batch settings, and operation
/// logging.
#[derive(Clone)]
pub struct ObjectOps {
    index: Arc<TagIndex>,
    objects: Arc<dyn ObjectSystemPort>,
    telemetry: Arc<dyn TelemetryPort>,
}

impl ObjectOps {
    pub fn new(
        index: Arc<TagIndex>,
        objects: Arc<dyn ObjectSystemPort>,
        telemetry: Arc<dyn TelemetryPort>,
    ) -> Self {
        Self {
            index,
            objects,
            telemetry,
        }
    }

    /// Construct an object of the named class and tag it `Framework`.
    /// An unknown class surfaces as `InvalidClass`; the caller decides.
    #[instrument(skip(self))]
    pub fn create(&self, class_name: &str) -> RegistryResult<ObjectId> {
        let object = self.objects.construct(class_name)?;
        self.index.tag(object, FRAMEWORK_TAG)?;
        debug!(%object, class = class_name, "object created and tagged");
        self.log_operation(
            "create",
            Some(serde_json::json!({ "class": class_name, "object": object })),
        )?;
        Ok(object)
    }

    /// Clone an object and tag every member of the clone's descendant set
    /// with `Framework`. The original's tag memberships are untouched.
    #[instrument(skip(self))]
    pub fn clone_object(&self, object: ObjectId) -> RegistryResult<ObjectId> {
        if !self.objects.is_alive(object) {
            return Err(RegistryError::InvalidArgument(format!(
                "cannot clone dead or unknown object: {object}"
            )));
        }
        let clone = self.objects.clone_object(object)?;
        let descendants = self.objects.descendants(clone);
        for descendant in &descendants {
            self.index.tag(*descendant, FRAMEWORK_TAG)?;
        }
        debug!(source = %object, %clone, tagged = descendants.len(), "object cloned");
        self.log_operation(
            "clone",
            Some(serde_json::json!({ "source": object, "clone": clone })),
        )?;
        Ok(clone)
    }

    /// Apply a property bag to an object. Each key is attempted
    /// independently: a failure is logged and collected without aborting the
    /// rest of the batch.
    #[instrument(skip(self, settings), fields(keys = settings.len()))]
    pub fn apply_settings(
        &self,
        object: ObjectId,
        settings: &IndexMap<String, Value>,
    ) -> RegistryResult<SettingsReport> {
        if !self.objects.is_alive(object) {
            return Err(RegistryError::InvalidArgument(format!(
                "cannot apply settings to dead or unknown object: {object}"
            )));
        }
        let mut report = SettingsReport::default();
        for (key, value) in settings {
            match self.objects.set_property(object, key, value.clone()) {
                Ok(()) => report.applied.push(key.clone()),
                Err(error) => {
                    warn!(%object, key, %error, "property failed to apply, continuing");
                    report.failed.push((key.clone(), error.to_string()));
                }
            }
        }
        debug!(
            %object,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "settings batch applied"
        );
        Ok(report)
    }

    /// A fresh universally-unique identifier. No uniqueness registry is
    /// kept; v4 collision probability is accepted as negligible.
    pub fn generate_unique_id(&self) -> String {
        Uuid::new_v4().hyphenated().to_string()
    }

    /// Forward a structured operation record to the telemetry collaborator.
    /// A call without details is a no-op beyond name validation.
    pub fn log_operation(&self, operation: &str, details: Option<Value>) -> RegistryResult<()> {
        let operation = fold_key(operation);
        if operation.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "operation name must not be empty".to_owned(),
            ));
        }
        let Some(details) = details else {
            return Ok(());
        };
        self.telemetry.record(OperationRecord {
            operation,
            details: Some(details),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Caller-facing lookup: an empty result is a soft diagnostic, not an
    /// error.
    pub fn objects_with_tag(&self, raw_tag: &str) -> RegistryResult<Vec<ObjectId>> {
        let members = self.index.objects_with_tag(raw_tag)?;
        if members.is_empty() {
            warn!(tag = raw_tag, "no objects carry this tag");
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use serde_json::json;
    use tagreg_index::TagIndex;
    use tagreg_objects::InMemoryObjectSystem;
    use tagreg_protocol::{
        FRAMEWORK_TAG, ObjectSystemPort, OperationRecord, RegistryError, TelemetryPort,
    };

    use crate::{NullTelemetry, ObjectOps};

    #[derive(Default)]
    struct RecordingTelemetry {
        records: Mutex<Vec<OperationRecord>>,
    }

    impl TelemetryPort for RecordingTelemetry {
        fn record(&self, record: OperationRecord) {
            self.records.lock().push(record);
        }
    }

    fn fixture() -> (Arc<InMemoryObjectSystem>, Arc<TagIndex>, ObjectOps) {
        let system = Arc::new(InMemoryObjectSystem::new());
        system.register_class(
            "Door",
            IndexMap::from([
                ("open".to_owned(), json!(false)),
                ("label".to_owned(), json!("")),
            ]),
        );
        let index = Arc::new(TagIndex::new(system.clone()));
        let ops = ObjectOps::new(index.clone(), system.clone(), Arc::new(NullTelemetry));
        (system, index, ops)
    }

    #[test]
    fn create_tags_the_new_object_framework() -> Result<()> {
        let (_system, index, ops) = fixture();
        let door = ops.create("Door")?;
        assert_eq!(index.objects_with_tag(FRAMEWORK_TAG)?, vec![door]);
        Ok(())
    }

    #[test]
    fn create_with_unknown_class_is_recoverable() {
        let (_system, index, ops) = fixture();
        let err = ops.create("Window").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidClass(name) if name == "Window"));
        // no partial mutation
        assert!(index.objects_with_tag(FRAMEWORK_TAG).unwrap().is_empty());
    }

    #[test]
    fn clone_tags_the_descendant_set_only() -> Result<()> {
        let (system, index, ops) = fixture();
        let root = system.construct("Door")?;
        let child = system.construct("Door")?;
        let grandchild = system.construct("Door")?;
        system.add_child(root, child)?;
        system.add_child(child, grandchild)?;

        let clone = ops.clone_object(root)?;
        let framework = index.objects_with_tag(FRAMEWORK_TAG)?;
        let descendants = system.descendants(clone);
        assert_eq!(descendants.len(), 2);
        for descendant in &descendants {
            assert!(framework.contains(descendant));
        }
        // the original subtree picked up nothing
        assert!(!framework.contains(&root));
        assert!(!framework.contains(&child));
        assert!(!framework.contains(&grandchild));
        Ok(())
    }

    #[test]
    fn clone_of_unknown_object_is_invalid_argument() {
        let (_system, _index, ops) = fixture();
        let ghost = tagreg_protocol::ObjectId::new();
        assert!(matches!(
            ops.clone_object(ghost),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn apply_settings_is_per_key_isolated() -> Result<()> {
        let (system, _index, ops) = fixture();
        let door = system.construct("Door")?;

        let settings = IndexMap::from([
            ("open".to_owned(), json!(true)),
            ("mass".to_owned(), json!(12.5)),
            ("label".to_owned(), json!("front door")),
        ]);
        let report = ops.apply_settings(door, &settings)?;

        assert_eq!(report.applied, vec!["open".to_owned(), "label".to_owned()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "mass");
        assert!(!report.fully_applied());
        // the good keys took effect despite the bad one
        assert_eq!(system.property(door, "open"), Some(json!(true)));
        assert_eq!(system.property(door, "label"), Some(json!("front door")));
        Ok(())
    }

    #[test]
    fn generate_unique_id_is_a_uuid() {
        let (_system, _index, ops) = fixture();
        let a = ops.generate_unique_id();
        let b = ops.generate_unique_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn log_operation_forwards_only_with_details() -> Result<()> {
        let (system, index, _ops) = fixture();
        let telemetry = Arc::new(RecordingTelemetry::default());
        let ops = ObjectOps::new(index, system, telemetry.clone());

        ops.log_operation("  DoorOpened ", None)?;
        assert!(telemetry.records.lock().is_empty());

        ops.log_operation("  DoorOpened ", Some(json!({ "who": "player" })))?;
        let records = telemetry.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "dooropened");
        Ok(())
    }

    #[test]
    fn log_operation_rejects_empty_name() {
        let (_system, _index, ops) = fixture();
        assert!(matches!(
            ops.log_operation("  ", Some(json!({}))),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_lookup_is_ok_not_an_error() -> Result<()> {
        let (_system, _index, ops) = fixture();
        assert!(ops.objects_with_tag("interactive")?.is_empty());
        Ok(())
    }
}
