//! The core tag/object relation.
//!
//! [`TagIndex`] keeps a bidirectional many-to-many mapping between normalized
//! tags and object ids. Entries are purely referential: the index never owns
//! object lifetime, and entries for destroyed objects are pruned on the next
//! touch of their tag. Every net-new association is published through the
//! [`TagEventHub`] so subscribers can react without polling.
//!
//! All relation access serializes through one `parking_lot::RwLock`; port
//! calls (liveness, names) happen strictly outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use tagreg_protocol::{
    ObjectId, ObjectSystemPort, RegistryError, RegistryResult, Tag, TagEvent, fold_key,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Broadcast fan-out for membership events. Publishing never blocks and
/// never fails: events sent while nobody listens are simply dropped.
#[derive(Clone, Debug)]
pub struct TagEventHub {
    sender: broadcast::Sender<TagEvent>,
}

impl TagEventHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn publish(&self, event: TagEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TagEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<TagEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

#[derive(Debug, Default)]
struct Relation {
    by_tag: IndexMap<Tag, IndexSet<ObjectId>>,
    by_object: HashMap<ObjectId, IndexSet<Tag>>,
    last_sequence: u64,
}

impl Relation {
    /// Returns the event sequence when the association is net-new.
    /// Sequences are stamped here, under the write lock, so they agree with
    /// the membership any concurrent snapshot observes.
    fn insert(&mut self, object: ObjectId, tag: &Tag) -> Option<u64> {
        let inserted = self.by_tag.entry(tag.clone()).or_default().insert(object);
        if !inserted {
            return None;
        }
        self.by_object.entry(object).or_default().insert(tag.clone());
        self.last_sequence += 1;
        Some(self.last_sequence)
    }

    fn remove(&mut self, object: ObjectId, tag: &Tag) -> bool {
        let removed = self
            .by_tag
            .get_mut(tag)
            .is_some_and(|members| members.shift_remove(&object));
        if removed
            && let Some(tags) = self.by_object.get_mut(&object)
        {
            tags.shift_remove(tag);
            if tags.is_empty() {
                self.by_object.remove(&object);
            }
        }
        removed
    }

    fn remove_object(&mut self, object: ObjectId) -> usize {
        let Some(tags) = self.by_object.remove(&object) else {
            return 0;
        };
        let mut removed = 0;
        for tag in &tags {
            if let Some(members) = self.by_tag.get_mut(tag)
                && members.shift_remove(&object)
            {
                removed += 1;
            }
        }
        removed
    }

    fn members(&self, tag: &Tag) -> Vec<ObjectId> {
        self.by_tag
            .get(tag)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Bidirectional tag ↔ object index with weak references into the object
/// system.
pub struct TagIndex {
    objects: Arc<dyn ObjectSystemPort>,
    relation: RwLock<Relation>,
    hub: TagEventHub,
}

impl TagIndex {
    pub fn new(objects: Arc<dyn ObjectSystemPort>) -> Self {
        Self::with_event_buffer(objects, 1024)
    }

    pub fn with_event_buffer(objects: Arc<dyn ObjectSystemPort>, buffer: usize) -> Self {
        Self {
            objects,
            relation: RwLock::new(Relation::default()),
            hub: TagEventHub::new(buffer),
        }
    }

    /// Attach `raw_tag` to an object. Idempotent: re-tagging an existing
    /// association is a no-op and publishes no event.
    pub fn tag(&self, object: ObjectId, raw_tag: &str) -> RegistryResult<()> {
        let tag = Tag::new(raw_tag)?;
        if !self.objects.is_alive(object) {
            return Err(RegistryError::InvalidArgument(format!(
                "cannot tag dead or unknown object: {object}"
            )));
        }
        if let Some(sequence) = self.relation.write().insert(object, &tag) {
            debug!(%object, %tag, sequence, "tag association added");
            self.hub.publish(TagEvent::now(object, tag, sequence));
        }
        Ok(())
    }

    /// Detach `raw_tag` from an object. Removing a non-existent association
    /// is a no-op; removals never publish events.
    pub fn untag(&self, object: ObjectId, raw_tag: &str) -> RegistryResult<()> {
        let tag = Tag::new(raw_tag)?;
        if self.relation.write().remove(object, &tag) {
            debug!(%object, %tag, "tag association removed");
        }
        Ok(())
    }

    /// All live objects carrying the tag, in insertion order. Stale entries
    /// for destroyed objects are pruned before returning.
    pub fn objects_with_tag(&self, raw_tag: &str) -> RegistryResult<Vec<ObjectId>> {
        self.snapshot(raw_tag).map(|(members, _)| members)
    }

    /// Members plus the event-sequence watermark, read atomically under the
    /// relation lock. Every event stamped at or below the watermark is
    /// already reflected in the returned membership, which lets subscribers
    /// deduplicate a replayed snapshot against routed events.
    pub fn snapshot(&self, raw_tag: &str) -> RegistryResult<(Vec<ObjectId>, u64)> {
        let tag = Tag::new(raw_tag)?;
        let (members, watermark) = {
            let relation = self.relation.read();
            (relation.members(&tag), relation.last_sequence)
        };
        let (alive, stale): (Vec<_>, Vec<_>) = members
            .into_iter()
            .partition(|id| self.objects.is_alive(*id));
        if !stale.is_empty() {
            let mut relation = self.relation.write();
            for id in &stale {
                relation.remove_object(*id);
            }
            debug!(%tag, pruned = stale.len(), "stale index entries pruned");
        }
        Ok((alive, watermark))
    }

    /// First object under the tag whose case-folded name matches `name`.
    /// Tie-break is insertion order into the index.
    pub fn find_by_name(&self, raw_tag: &str, name: &str) -> RegistryResult<Option<ObjectId>> {
        let wanted = fold_key(name);
        if wanted.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "name must not be empty".to_owned(),
            ));
        }
        for id in self.objects_with_tag(raw_tag)? {
            if let Some(display) = self.objects.display_name(id)
                && fold_key(&display) == wanted
            {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Reverse side of the relation: every tag the object currently carries.
    pub fn tags_of(&self, object: ObjectId) -> Vec<Tag> {
        self.relation
            .read()
            .by_object
            .get(&object)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Eagerly sweep every entry whose object is gone. Returns the number of
    /// associations dropped.
    pub fn prune(&self) -> usize {
        let ids: Vec<ObjectId> = self.relation.read().by_object.keys().copied().collect();
        let dead: Vec<ObjectId> = ids
            .into_iter()
            .filter(|id| !self.objects.is_alive(*id))
            .collect();
        if dead.is_empty() {
            return 0;
        }
        let mut relation = self.relation.write();
        let removed = dead.iter().map(|id| relation.remove_object(*id)).sum();
        debug!(removed, "eager prune swept dead entries");
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TagEvent> {
        self.hub.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<TagEvent> {
        self.hub.subscribe_stream()
    }
}
