//! # tagreg — tag-indexed object registry
//!
//! A process-wide registry over externally owned objects: attach string tags,
//! look up members, block until a named object appears, or subscribe to a tag
//! and hear about every current and future member.
//!
//! [`RegistryBuilder`] wires the index, retriever, watcher, and ops façade
//! over one shared [`TagIndex`]; [`Registry`] is the delegating entry point.
//! Build inside a Tokio runtime — the watcher spawns its dispatcher on
//! construction.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::instrument;

pub use tagreg_index::{TagEventHub, TagIndex};
pub use tagreg_ops::{NullTelemetry, ObjectOps, SettingsReport, TracingTelemetry};
pub use tagreg_protocol::{
    FRAMEWORK_TAG, ObjectId, ObjectSystemPort, OperationRecord, RegistryError, RegistryResult,
    RetryPolicy, SubscriptionId, Tag, TagEvent, TelemetryPort,
};
pub use tagreg_retrieve::Retriever;
pub use tagreg_watch::{SubscriptionHandle, TagWatcher};

#[derive(Clone)]
pub struct RegistryBuilder {
    objects: Arc<dyn ObjectSystemPort>,
    telemetry: Arc<dyn TelemetryPort>,
    poll_interval: Option<Duration>,
    event_buffer: usize,
}

impl RegistryBuilder {
    pub fn new(objects: Arc<dyn ObjectSystemPort>) -> Self {
        Self {
            objects,
            telemetry: Arc::new(TracingTelemetry),
            poll_interval: None,
            event_buffer: 1024,
        }
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryPort>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn build(self) -> Registry {
        let index = Arc::new(TagIndex::with_event_buffer(
            self.objects.clone(),
            self.event_buffer,
        ));
        let mut retriever = Retriever::new(index.clone());
        if let Some(poll_interval) = self.poll_interval {
            retriever = retriever.with_poll_interval(poll_interval);
        }
        let watcher = TagWatcher::new(index.clone());
        let ops = ObjectOps::new(index.clone(), self.objects, self.telemetry);

        Registry {
            index,
            retriever,
            watcher,
            ops,
        }
    }
}

/// The assembled registry. All components share one index; the registry is
/// cheap to clone-by-Arc through [`Registry::index`] if a caller needs the
/// raw structure.
pub struct Registry {
    index: Arc<TagIndex>,
    retriever: Retriever,
    watcher: TagWatcher,
    ops: ObjectOps,
}

impl Registry {
    pub fn index(&self) -> Arc<TagIndex> {
        self.index.clone()
    }

    pub fn tag(&self, object: ObjectId, tag: &str) -> RegistryResult<()> {
        self.index.tag(object, tag)
    }

    pub fn untag(&self, object: ObjectId, tag: &str) -> RegistryResult<()> {
        self.index.untag(object, tag)
    }

    pub fn objects_with_tag(&self, tag: &str) -> RegistryResult<Vec<ObjectId>> {
        self.ops.objects_with_tag(tag)
    }

    pub fn find_by_name(&self, tag: &str, name: &str) -> RegistryResult<Option<ObjectId>> {
        self.index.find_by_name(tag, name)
    }

    pub fn tags_of(&self, object: ObjectId) -> Vec<Tag> {
        self.index.tags_of(object)
    }

    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        tag: &str,
        name: &str,
        policy: RetryPolicy,
    ) -> RegistryResult<ObjectId> {
        self.retriever.retrieve(tag, name, policy).await
    }

    pub fn bind(
        &self,
        tag: &str,
        callback: impl Fn(ObjectId) + Send + Sync + 'static,
    ) -> RegistryResult<SubscriptionHandle> {
        self.watcher.bind(tag, callback)
    }

    pub fn cancel(&self, handle: &SubscriptionHandle) {
        self.watcher.cancel(handle)
    }

    pub fn create(&self, class_name: &str) -> RegistryResult<ObjectId> {
        self.ops.create(class_name)
    }

    pub fn clone_object(&self, object: ObjectId) -> RegistryResult<ObjectId> {
        self.ops.clone_object(object)
    }

    pub fn apply_settings(
        &self,
        object: ObjectId,
        settings: &IndexMap<String, Value>,
    ) -> RegistryResult<SettingsReport> {
        self.ops.apply_settings(object, settings)
    }

    pub fn generate_unique_id(&self) -> String {
        self.ops.generate_unique_id()
    }

    pub fn log_operation(&self, operation: &str, details: Option<Value>) -> RegistryResult<()> {
        self.ops.log_operation(operation, details)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<TagEvent> {
        self.index.subscribe()
    }

    /// Eagerly sweep index entries whose objects are gone.
    pub fn prune(&self) -> usize {
        self.index.prune()
    }
}
