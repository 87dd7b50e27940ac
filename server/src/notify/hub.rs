use crate::protocol::ChangeEvent;
use futures_util::Stream;
use metrics::counter;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub type ObserverId = Uuid;

/// Receiving end of one observer registration.
///
/// The queue is unbounded: a stalled reader never blocks a publisher.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    user_id: String,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Wait for the next event. Returns `None` once the observer is removed
    /// and its queue drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }
}

struct Registration {
    id: ObserverId,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

/// Registry of live observers keyed by user id
#[derive(Default)]
pub struct ChangeNotificationHub {
    observers: Mutex<HashMap<String, Vec<Registration>>>,
}

impl ChangeNotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer for `user_id`
    pub fn create_observer(&self, user_id: &str) -> Observer {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        self.registry()
            .entry(user_id.to_string())
            .or_default()
            .push(Registration { id, sender });

        counter!("tinytodo_observers_created_total").increment(1);
        debug!("Observer {} registered for user {}", id, user_id);

        Observer {
            id,
            user_id: user_id.to_string(),
            receiver,
        }
    }

    /// Unregister an observer. Removing an unknown or already removed id is a no-op.
    pub fn remove_observer(&self, user_id: &str, observer_id: ObserverId) {
        let mut registry = self.registry();
        let Some(registrations) = registry.get_mut(user_id) else {
            return;
        };

        let before = registrations.len();
        registrations.retain(|r| r.id != observer_id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            registry.remove(user_id);
        }
        if removed {
            debug!("Observer {} removed for user {}", observer_id, user_id);
        }
    }

    /// Enqueue `event` on every observer of `user_id` and return how many got it.
    ///
    /// The fan-out runs under the registry lock, so it is atomic with respect
    /// to registration and removal, and events reach each observer in publish
    /// order. Registrations whose receiver was dropped are pruned here.
    pub fn publish(&self, user_id: &str, event: ChangeEvent) -> usize {
        let mut registry = self.registry();
        let Some(registrations) = registry.get_mut(user_id) else {
            return 0;
        };

        registrations.retain(|r| r.sender.send(event.clone()).is_ok());
        let delivered = registrations.len();
        if registrations.is_empty() {
            registry.remove(user_id);
        }

        counter!("tinytodo_events_published_total", "kind" => event.kind.as_str()).increment(1);
        delivered
    }

    /// Register an observer whose registration is released when the returned
    /// guard is dropped, whichever way its owner exits.
    pub fn subscribe(self: &Arc<Self>, user_id: &str) -> Subscription {
        Subscription {
            observer: self.create_observer(user_id),
            hub: Arc::clone(self),
        }
    }

    /// Drop every registration. Each observer drains what is already queued
    /// and then sees the end of its stream; used on server shutdown.
    pub fn close_all(&self) -> usize {
        let mut registry = self.registry();
        let closed = registry.values().map(Vec::len).sum();
        registry.clear();
        closed
    }

    pub fn observer_count(&self, user_id: &str) -> usize {
        self.registry().get(user_id).map_or(0, Vec::len)
    }

    pub fn total_observers(&self) -> usize {
        self.registry().values().map(Vec::len).sum()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped observer registration
pub struct Subscription {
    hub: Arc<ChangeNotificationHub>,
    observer: Observer,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.observer.id()
    }

    pub fn user_id(&self) -> &str {
        self.observer.user_id()
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.observer.recv().await
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.observer.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub
            .remove_observer(self.observer.user_id(), self.observer.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TodoItem;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn added(source: &str, id: &str) -> ChangeEvent {
        ChangeEvent::add(source, TodoItem::new(id, format!("item {}", id)))
    }

    #[test]
    fn test_publish_reaches_every_observer_of_user() {
        let hub = ChangeNotificationHub::new();
        let mut first = hub.create_observer("alice");
        let mut second = hub.create_observer("alice");

        let event = added("tab-1", "1");
        assert_eq!(hub.publish("alice", event.clone()), 2);

        assert_eq!(first.try_recv(), Some(event.clone()));
        assert_eq!(first.try_recv(), None);
        assert_eq!(second.try_recv(), Some(event));
        assert_eq!(second.try_recv(), None);
    }

    #[test]
    fn test_publish_is_scoped_to_user() {
        let hub = ChangeNotificationHub::new();
        let mut first = hub.create_observer("alice");
        let mut second = hub.create_observer("alice");

        hub.publish("bob", added("tab-9", "2"));

        assert_eq!(first.try_recv(), None);
        assert_eq!(second.try_recv(), None);
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let hub = ChangeNotificationHub::new();
        let mut observer = hub.create_observer("alice");

        let events: Vec<_> = (0..10).map(|i| added("tab", &i.to_string())).collect();
        for event in &events {
            hub.publish("alice", event.clone());
        }

        for event in events {
            assert_eq!(observer.try_recv(), Some(event));
        }
    }

    #[test]
    fn test_removed_observer_stops_receiving() {
        let hub = ChangeNotificationHub::new();
        let mut removed = hub.create_observer("alice");
        let mut kept = hub.create_observer("alice");

        hub.remove_observer("alice", removed.id());
        let event = added("tab-1", "3");
        assert_eq!(hub.publish("alice", event.clone()), 1);

        assert_eq!(removed.try_recv(), None);
        assert_eq!(kept.try_recv(), Some(event));
    }

    #[test]
    fn test_remove_observer_is_idempotent() {
        let hub = ChangeNotificationHub::new();
        let observer = hub.create_observer("alice");

        hub.remove_observer("alice", observer.id());
        hub.remove_observer("alice", observer.id());
        hub.remove_observer("nobody", observer.id());
        assert_eq!(hub.observer_count("alice"), 0);
        assert_eq!(hub.total_observers(), 0);
    }

    #[test]
    fn test_publish_without_observers_is_noop() {
        let hub = ChangeNotificationHub::new();
        assert_eq!(hub.publish("ghost", added("tab", "1")), 0);
        assert_eq!(hub.total_observers(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned_on_publish() {
        let hub = ChangeNotificationHub::new();
        let observer = hub.create_observer("alice");
        drop(observer);

        assert_eq!(hub.observer_count("alice"), 1);
        assert_eq!(hub.publish("alice", added("tab", "1")), 0);
        assert_eq!(hub.observer_count("alice"), 0);
    }

    #[test]
    fn test_subscription_deregisters_on_drop() {
        let hub = Arc::new(ChangeNotificationHub::new());
        let subscription = hub.subscribe("alice");
        let _other = hub.subscribe("alice");
        assert_eq!(hub.observer_count("alice"), 2);

        drop(subscription);
        assert_eq!(hub.observer_count("alice"), 1);
    }

    #[tokio::test]
    async fn test_subscription_stream_yields_events() {
        let hub = Arc::new(ChangeNotificationHub::new());
        let mut subscription = hub.subscribe("alice");

        hub.publish("alice", added("tab", "1"));
        hub.publish("alice", added("tab", "2"));

        let first = subscription.next().await.unwrap();
        let second = subscription.recv().await.unwrap();
        assert_eq!(first.item.unwrap().id, "1");
        assert_eq!(second.item.unwrap().id, "2");
    }

    #[tokio::test]
    async fn test_cancelled_waiter_deregisters() {
        let hub = Arc::new(ChangeNotificationHub::new());
        let mut subscription = hub.subscribe("alice");

        let task = tokio::spawn(async move {
            while subscription.recv().await.is_some() {}
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hub.observer_count("alice"), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(hub.observer_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_close_all_ends_streams_after_draining() {
        let hub = Arc::new(ChangeNotificationHub::new());
        let mut alice = hub.subscribe("alice");
        let mut bob = hub.subscribe("bob");
        hub.publish("alice", added("tab", "1"));

        assert_eq!(hub.close_all(), 2);
        assert_eq!(hub.total_observers(), 0);

        assert!(alice.recv().await.is_some());
        assert!(alice.recv().await.is_none());
        assert!(bob.next().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_publishers_deliver_everything() {
        let hub = Arc::new(ChangeNotificationHub::new());
        let mut observer = hub.create_observer("alice");

        let publishers: Vec<_> = (0..4)
            .map(|p| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        hub.publish("alice", added(&format!("pub-{}", p), &i.to_string()));
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.await.unwrap();
        }

        let mut per_source: HashMap<String, Vec<String>> = HashMap::new();
        while let Some(event) = observer.try_recv() {
            per_source
                .entry(event.source)
                .or_default()
                .push(event.item.unwrap().id);
        }

        assert_eq!(per_source.len(), 4);
        for ids in per_source.values() {
            let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
            assert_eq!(ids, &expected, "each publisher's events stay in order");
        }
    }
}
