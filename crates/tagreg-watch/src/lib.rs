//! Tag subscriptions: a callback fires once for every object currently
//! carrying a tag and once for every future net-new association, until the
//! subscription is cancelled.
//!
//! Each subscription owns an unbounded FIFO queue drained by its own worker
//! task, so a slow or panicking callback never blocks other subscribers, the
//! dispatcher, or the index. Bind reads the membership snapshot together
//! with the index's event-sequence watermark; routed events stamped at or
//! below the watermark are already covered by the snapshot and are skipped,
//! so each association is delivered exactly once. The FIFO queue keeps
//! snapshot deliveries ahead of any delivery for a `tag()` issued after
//! bind returns.
//!
//! Limitation: if the broadcast backlog overflows, the dispatcher logs a
//! warning and continues; events lost to the lag are not replayed.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tagreg_index::TagIndex;
use tagreg_protocol::{ObjectId, RegistryResult, SubscriptionId, Tag};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Callback invoked once per delivered object.
pub type TagCallback = Arc<dyn Fn(ObjectId) + Send + Sync + 'static>;

/// Returned by [`TagWatcher::bind`]; pass back to [`TagWatcher::cancel`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    tag: Tag,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

struct Subscription {
    tag: Tag,
    /// Events stamped at or below this sequence were part of the bind
    /// snapshot and must not be delivered again.
    after_sequence: u64,
    deliveries: mpsc::UnboundedSender<ObjectId>,
}

/// Routes membership events from the index to active subscriptions.
///
/// Must be created inside a Tokio runtime: construction spawns the dispatcher
/// task that consumes the index's broadcast stream.
pub struct TagWatcher {
    index: Arc<TagIndex>,
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl TagWatcher {
    pub fn new(index: Arc<TagIndex>) -> Self {
        let subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let mut events = index.subscribe();
        let routes = subscriptions.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let targets: Vec<mpsc::UnboundedSender<ObjectId>> = routes
                            .read()
                            .values()
                            .filter(|subscription| {
                                subscription.tag == event.tag
                                    && event.sequence > subscription.after_sequence
                            })
                            .map(|subscription| subscription.deliveries.clone())
                            .collect();
                        for sender in targets {
                            let _ = sender.send(event.object);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "tag event stream lagged, deliveries may be missed");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            index,
            subscriptions,
        }
    }

    /// Subscribe a callback to a tag.
    ///
    /// The current membership snapshot is queued for delivery before bind
    /// returns; bind itself never waits on callback execution.
    pub fn bind(
        &self,
        raw_tag: &str,
        callback: impl Fn(ObjectId) + Send + Sync + 'static,
    ) -> RegistryResult<SubscriptionHandle> {
        let tag = Tag::new(raw_tag)?;
        let (deliveries, mut queue) = mpsc::unbounded_channel::<ObjectId>();

        let invoke: TagCallback = Arc::new(callback);
        let worker_tag = tag.clone();
        tokio::spawn(async move {
            while let Some(object) = queue.recv().await {
                if catch_unwind(AssertUnwindSafe(|| invoke(object))).is_err() {
                    warn!(%object, tag = %worker_tag, "subscriber callback panicked, delivery skipped");
                }
            }
        });

        // The watermark fences routed events: associations stamped at or
        // below it are in the snapshot, including events still queued in the
        // broadcast backlog that the dispatcher has not consumed yet. The
        // FIFO queue keeps snapshot deliveries ahead of everything routed
        // later.
        let (members, watermark) = self.index.snapshot(tag.as_str())?;
        for object in members {
            let _ = deliveries.send(object);
        }

        let id = SubscriptionId::new();
        self.subscriptions.write().insert(
            id,
            Subscription {
                tag: tag.clone(),
                after_sequence: watermark,
                deliveries,
            },
        );
        debug!(%id, %tag, "subscription bound");
        Ok(SubscriptionHandle { id, tag })
    }

    /// Stop future deliveries for a subscription. Deliveries already queued
    /// drain to the callback; cancelling twice is a no-op.
    pub fn cancel(&self, handle: &SubscriptionHandle) {
        if self.subscriptions.write().remove(&handle.id).is_some() {
            debug!(id = %handle.id, tag = %handle.tag, "subscription cancelled");
        }
    }

    /// Number of active subscriptions.
    pub fn active(&self) -> usize {
        self.subscriptions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use tagreg_index::TagIndex;
    use tagreg_objects::InMemoryObjectSystem;
    use tagreg_protocol::{ObjectId, ObjectSystemPort, RegistryError};

    use crate::TagWatcher;

    fn fixture() -> (Arc<InMemoryObjectSystem>, Arc<TagIndex>, TagWatcher) {
        let system = Arc::new(InMemoryObjectSystem::new());
        system.register_class("Door", IndexMap::new());
        let index = Arc::new(TagIndex::new(system.clone()));
        let watcher = TagWatcher::new(index.clone());
        (system, index, watcher)
    }

    async fn settle(counter: &AtomicUsize, expected: usize) {
        for _ in 0..500 {
            if counter.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // one extra settle pass to catch over-delivery
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn snapshot_members_are_delivered_once_each() -> Result<()> {
        let (system, index, watcher) = fixture();
        for _ in 0..3 {
            let door = system.construct("Door")?;
            index.tag(door, "interactive")?;
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let handle = watcher.bind("interactive", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })?;
        // cancel right away; queued snapshot deliveries are not revoked
        watcher.cancel(&handle);

        settle(&hits, 3).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(watcher.active(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn member_tagged_before_bind_is_delivered_exactly_once() -> Result<()> {
        let (system, index, watcher) = fixture();
        let door = system.construct("Door")?;
        // the association event is still sitting in the broadcast backlog
        // when bind takes its snapshot
        index.tag(door, "interactive")?;

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        watcher.bind("interactive", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })?;

        settle(&hits, 1).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn future_net_new_tags_fire_exactly_once() -> Result<()> {
        let (system, index, watcher) = fixture();

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        watcher.bind("interactive", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })?;

        let door = system.construct("Door")?;
        index.tag(door, "interactive")?;
        index.tag(door, "interactive")?; // idempotent re-tag, no event

        settle(&hits, 1).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_precedes_events_tagged_after_bind() -> Result<()> {
        let (system, index, watcher) = fixture();
        let existing = system.construct("Door")?;
        index.tag(existing, "interactive")?;

        let order: Arc<Mutex<Vec<ObjectId>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = order.clone();
        watcher.bind("interactive", move |object| {
            recorder.lock().push(object);
        })?;

        let later = system.construct("Door")?;
        index.tag(later, "interactive")?;

        for _ in 0..500 {
            if order.lock().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(*order.lock(), vec![existing, later]);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_stops_future_deliveries() -> Result<()> {
        let (system, index, watcher) = fixture();

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let handle = watcher.bind("interactive", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })?;
        watcher.cancel(&handle);
        watcher.cancel(&handle); // idempotent

        let door = system.construct("Door")?;
        index.tag(door, "interactive")?;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn panicking_callback_is_isolated() -> Result<()> {
        let (system, index, watcher) = fixture();

        let healthy_hits = Arc::new(AtomicUsize::new(0));
        let healthy_seen = healthy_hits.clone();
        watcher.bind("interactive", move |_| {
            healthy_seen.fetch_add(1, Ordering::SeqCst);
        })?;

        let faulty_hits = Arc::new(AtomicUsize::new(0));
        let faulty_seen = faulty_hits.clone();
        watcher.bind("interactive", move |_| {
            faulty_seen.fetch_add(1, Ordering::SeqCst);
            panic!("subscriber bug");
        })?;

        let first = system.construct("Door")?;
        index.tag(first, "interactive")?;
        let second = system.construct("Door")?;
        index.tag(second, "interactive")?;

        settle(&healthy_hits, 2).await;
        assert_eq!(healthy_hits.load(Ordering::SeqCst), 2);
        // the faulty subscription keeps receiving after its own panic
        assert_eq!(faulty_hits.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn subscribers_on_other_tags_stay_quiet() -> Result<()> {
        let (system, index, watcher) = fixture();

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        watcher.bind("openable", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })?;

        let door = system.construct("Door")?;
        index.tag(door, "interactive")?;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn bind_rejects_empty_tag() {
        let (_system, _index, watcher) = fixture();
        let err = watcher.bind("   ", |_| {}).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }
}
