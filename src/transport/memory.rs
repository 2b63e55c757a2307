//! In-memory messaging substrate.
//!
//! This module provides a pure in-process implementation of the domain-level
//! [`Substrate`] trait. It is intended for testing, single-process pipelines,
//! and as the reference for substrate semantics.
//!
//! ## Reference Semantics
//!
//! - Names are resolved against the bus namespace (see [`crate::names`]).
//! - Subscriber counts are exact and reflect the bus at call time.
//! - Connect callbacks fire when a subscriber attaches to an advertised topic,
//!   including subscribers that were waiting before the topic was advertised.
//!   Disconnect callbacks fire when a [`SubscriptionHandle`] is dropped.
//! - Latched topics redeliver the last published envelope to new subscribers.
//! - Each subscriber inbox holds at most `queue_size` envelopes, including
//!   subscribers that attached before the advertisement (capped at 16 for
//!   those). Further envelopes for a slow subscriber are dropped, never
//!   blocking the publisher.
//!
//! ## Non-Goals
//!
//! Persistence, network behavior, and emulation of any specific middleware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{
    // ---
    log_debug,
    names,
    util::lock_ignore_poison,
    AdvertiseOptions,
    Envelope,
    FanoutError,
    Result,
    Substrate,
    SubscriberEvent,
    SubscriberId,
    SubscriptionHandle,
    TopicPublisher,
    TopicPublisherPtr,
};

/// Inbox capacity for subscribers that attach before the topic is advertised.
///
/// Delivery to such a subscriber is still limited to the advertised
/// `queue_size`, up to this bound.
const DEFAULT_INBOX_CAPACITY: usize = 16;

struct SubscriberSlot {
    id: SubscriberId,
    tx: mpsc::Sender<Envelope>,
}

struct Advertisement {
    generation: u64,
    options: AdvertiseOptions,
}

#[derive(Default)]
struct TopicEntry {
    advertisement: Option<Advertisement>,
    subscribers: Vec<SubscriberSlot>,
    latched: Option<Envelope>,
}

impl TopicEntry {
    fn is_idle(&self) -> bool {
        self.advertisement.is_none() && self.subscribers.is_empty()
    }
}

type TopicTable = HashMap<String, TopicEntry>;

/// Shared in-process message bus.
///
/// All publishers and subscribers created from the same `MemoryBus` see each
/// other, exactly as nodes connected to a real middleware would.
///
/// # Example
///
/// ```
/// # use image_fanout::{AdvertiseOptions, MemoryBus, Substrate};
/// # async fn example() -> image_fanout::Result<()> {
/// let bus = MemoryBus::with_namespace("/robot");
///
/// let topic = bus.advertise("camera/image", &AdvertiseOptions::new(1)).await?;
/// assert_eq!(topic.topic(), "/robot/camera/image");
///
/// let _sub = bus.subscribe("/robot/camera/image").await?;
/// assert_eq!(topic.num_subscribers(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryBus {
    // ---
    namespace: String,
    params: Mutex<HashMap<String, String>>,
    topics: Arc<Mutex<TopicTable>>,
    next_generation: AtomicU64,
}

impl MemoryBus {
    /// Create a bus rooted at the global namespace.
    pub fn new() -> Arc<Self> {
        Self::with_namespace("/")
    }

    /// Create a bus whose relative names resolve under `namespace`.
    pub fn with_namespace(namespace: impl AsRef<str>) -> Arc<Self> {
        // ---
        Arc::new(Self {
            namespace: names::normalize(namespace.as_ref()),
            params: Mutex::new(HashMap::new()),
            topics: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Namespace relative names resolve under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Currently advertised topics, sorted.
    pub fn advertised_topics(&self) -> Vec<String> {
        // ---
        let topics = lock_ignore_poison(&self.topics);
        let mut advertised: Vec<String> = topics
            .iter()
            .filter(|(_, entry)| entry.advertisement.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        advertised.sort();
        advertised
    }

    /// Subscribers attached to `topic`, advertised or not.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        // ---
        let Ok(topic) = self.resolve_name(topic) else {
            return 0;
        };
        let topics = lock_ignore_poison(&self.topics);
        topics.get(&topic).map_or(0, |entry| entry.subscribers.len())
    }
}

#[async_trait::async_trait]
impl Substrate for MemoryBus {
    // ---
    fn resolve_name(&self, name: &str) -> Result<String> {
        names::resolve(&self.namespace, name)
    }

    fn set_param(&self, key: &str, value: &str) {
        // ---
        log_debug!("set param {key} = {value}");
        lock_ignore_poison(&self.params).insert(key.to_string(), value.to_string());
    }

    fn param(&self, key: &str) -> Option<String> {
        lock_ignore_poison(&self.params).get(key).cloned()
    }

    /// Advertise a topic.
    ///
    /// Subscribers already waiting on the topic are attached immediately and
    /// reported through the connect callback.
    async fn advertise(&self, topic: &str, options: &AdvertiseOptions) -> Result<TopicPublisherPtr> {
        // ---
        let topic = self.resolve_name(topic)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let waiting: Vec<SubscriberId> = {
            let mut topics = lock_ignore_poison(&self.topics);
            let entry = topics.entry(topic.clone()).or_default();

            if entry.advertisement.is_some() {
                return Err(FanoutError::Substrate(format!(
                    "topic {topic} is already advertised"
                )));
            }

            entry.advertisement = Some(Advertisement {
                generation,
                options: options.clone(),
            });
            entry.latched = None;
            entry.subscribers.iter().map(|slot| slot.id).collect()
        };

        log_debug!(
            "advertise {topic} (queue_size={}, latch={}, waiting={})",
            options.queue_size,
            options.latch,
            waiting.len()
        );

        for subscriber_id in waiting {
            options.notify_connect(&SubscriberEvent {
                topic: topic.clone(),
                subscriber_id,
            });
        }

        Ok(Arc::new(MemoryTopicPublisher {
            topic,
            generation,
            topics: Arc::downgrade(&self.topics),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// Subscribe to a topic, advertised or not.
    async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle> {
        // ---
        let topic = self.resolve_name(topic)?;
        let subscriber_id = SubscriberId::generate();

        let (options, rx) = {
            let mut topics = lock_ignore_poison(&self.topics);
            let entry = topics.entry(topic.clone()).or_default();

            let capacity = entry
                .advertisement
                .as_ref()
                .map_or(DEFAULT_INBOX_CAPACITY, |ad| ad.options.queue_size.max(1));
            let (tx, rx) = mpsc::channel(capacity);

            if let (Some(ad), Some(latched)) = (&entry.advertisement, &entry.latched) {
                if ad.options.latch {
                    let _ = tx.try_send(latched.clone());
                }
            }

            entry.subscribers.push(SubscriberSlot {
                id: subscriber_id,
                tx,
            });

            let options = entry.advertisement.as_ref().map(|ad| ad.options.clone());
            (options, rx)
        };

        log_debug!("{subscriber_id}: subscribe to {topic}");

        let event = SubscriberEvent {
            topic: topic.clone(),
            subscriber_id,
        };
        if let Some(options) = &options {
            options.notify_connect(&event);
        }

        let weak_topics = Arc::downgrade(&self.topics);
        Ok(SubscriptionHandle::new(topic, subscriber_id, rx, move || {
            unsubscribe(&weak_topics, event)
        }))
    }
}

fn unsubscribe(topics: &Weak<Mutex<TopicTable>>, event: SubscriberEvent) {
    // ---
    let Some(topics) = topics.upgrade() else {
        return;
    };

    let options = {
        let mut topics = lock_ignore_poison(&topics);
        let Some(entry) = topics.get_mut(&event.topic) else {
            return;
        };
        entry.subscribers.retain(|slot| slot.id != event.subscriber_id);
        let options = entry.advertisement.as_ref().map(|ad| ad.options.clone());
        if entry.is_idle() {
            topics.remove(&event.topic);
        }
        options
    };

    log_debug!("{}: unsubscribe from {}", event.subscriber_id, event.topic);

    if let Some(options) = options {
        options.notify_disconnect(&event);
    }
}

/// One advertisement on a [`MemoryBus`].
///
/// The generation guards against a stale handle touching a later
/// re-advertisement of the same topic.
struct MemoryTopicPublisher {
    // ---
    topic: String,
    generation: u64,
    topics: Weak<Mutex<TopicTable>>,
    shut_down: AtomicBool,
}

impl MemoryTopicPublisher {
    fn with_entry<R>(&self, f: impl FnOnce(&mut TopicEntry) -> R) -> Option<R> {
        // ---
        let topics = self.topics.upgrade()?;
        let mut topics = lock_ignore_poison(&topics);
        let entry = topics.get_mut(&self.topic)?;
        let current = entry
            .advertisement
            .as_ref()
            .is_some_and(|ad| ad.generation == self.generation);
        current.then(|| f(entry))
    }
}

#[async_trait::async_trait]
impl TopicPublisher for MemoryTopicPublisher {
    // ---
    fn topic(&self) -> &str {
        &self.topic
    }

    fn num_subscribers(&self) -> u32 {
        // ---
        if self.shut_down.load(Ordering::Acquire) {
            return 0;
        }
        self.with_entry(|entry| entry.subscribers.len() as u32)
            .unwrap_or(0)
    }

    /// Deliver to every current subscriber without waiting on slow ones.
    async fn publish(&self, env: Envelope) -> Result<()> {
        // ---
        if self.shut_down.load(Ordering::Acquire) {
            return Err(FanoutError::TopicShutdown(self.topic.clone()));
        }

        let (depth, senders) = self
            .with_entry(|entry| {
                let (depth, latch) = entry
                    .advertisement
                    .as_ref()
                    .map_or((1, false), |ad| (ad.options.queue_size.max(1), ad.options.latch));
                if latch {
                    entry.latched = Some(env.clone());
                }
                let senders = entry
                    .subscribers
                    .iter()
                    .map(|slot| (slot.id, slot.tx.clone()))
                    .collect::<Vec<_>>();
                (depth, senders)
            })
            .ok_or_else(|| FanoutError::TopicShutdown(self.topic.clone()))?;

        for (_subscriber_id, tx) in senders {
            // Inboxes opened before the advertisement may be larger than
            // `queue_size`; the advertised depth still applies.
            let queued = tx.max_capacity() - tx.capacity();
            if queued >= depth {
                log_debug!("{}: queue full for {_subscriber_id}, dropping", self.topic);
                continue;
            }

            match tx.try_send(env.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log_debug!("{}: queue full for {_subscriber_id}, dropping", self.topic);
                }
                Err(TrySendError::Closed(_)) => {
                    // Handle dropped; its guard removes the slot.
                }
            }
        }

        Ok(())
    }

    fn shutdown(&self) {
        // ---
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let Some(topics) = self.topics.upgrade() else {
            return;
        };
        let mut topics = lock_ignore_poison(&topics);
        let Some(entry) = topics.get_mut(&self.topic) else {
            return;
        };
        if entry
            .advertisement
            .as_ref()
            .is_some_and(|ad| ad.generation == self.generation)
        {
            entry.advertisement = None;
            entry.latched = None;
            log_debug!("unadvertise {}", self.topic);
        }
        if entry.is_idle() {
            topics.remove(&self.topic);
        }
    }
}

impl Drop for MemoryTopicPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{timeout, Duration};

    fn envelope(topic: &str, body: &'static [u8]) -> Envelope {
        Envelope::new(topic, Bytes::from_static(body), None)
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        // ---
        let bus = MemoryBus::new();
        let topic = bus.advertise("/cam", &AdvertiseOptions::new(4)).await.unwrap();
        let mut sub = bus.subscribe("/cam").await.unwrap();

        topic.publish(envelope("/cam", b"frame")).await.unwrap();

        let received = timeout(Duration::from_millis(100), sub.inbox.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(received.payload, Bytes::from_static(b"frame"));
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_handles() {
        // ---
        let bus = MemoryBus::new();
        let topic = bus.advertise("/cam", &AdvertiseOptions::default()).await.unwrap();
        assert_eq!(topic.num_subscribers(), 0);

        let a = bus.subscribe("/cam").await.unwrap();
        let b = bus.subscribe("/cam").await.unwrap();
        assert_eq!(topic.num_subscribers(), 2);

        drop(a);
        assert_eq!(topic.num_subscribers(), 1);
        drop(b);
        assert_eq!(topic.num_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_double_advertise_rejected() {
        // ---
        let bus = MemoryBus::new();
        let _topic = bus.advertise("/cam", &AdvertiseOptions::default()).await.unwrap();
        let again = bus.advertise("/cam", &AdvertiseOptions::default()).await;
        assert!(matches!(again, Err(FanoutError::Substrate(_))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_blocks_publish() {
        // ---
        let bus = MemoryBus::new();
        let topic = bus.advertise("/cam", &AdvertiseOptions::default()).await.unwrap();
        let _sub = bus.subscribe("/cam").await.unwrap();

        topic.shutdown();
        topic.shutdown();

        assert_eq!(topic.num_subscribers(), 0);
        assert!(bus.advertised_topics().is_empty());
        assert!(matches!(
            topic.publish(envelope("/cam", b"late")).await,
            Err(FanoutError::TopicShutdown(_))
        ));
    }

    #[tokio::test]
    async fn test_waiting_subscriber_connects_on_advertise() {
        // ---
        let bus = MemoryBus::new();
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();

        let _sub = bus.subscribe("/cam").await.unwrap();
        let opts = AdvertiseOptions::new(1).with_connect_callback(Arc::new(
            move |_ev: &SubscriberEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        let topic = bus.advertise("/cam", &opts).await.unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(topic.num_subscribers(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        // ---
        let bus = MemoryBus::new();
        let topic = bus.advertise("/cam", &AdvertiseOptions::new(1)).await.unwrap();
        let mut sub = bus.subscribe("/cam").await.unwrap();

        topic.publish(envelope("/cam", b"first")).await.unwrap();
        topic.publish(envelope("/cam", b"second")).await.unwrap();

        let first = sub.inbox.recv().await.unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"first"));
        assert!(sub.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_waiting_subscriber_gets_advertised_queue_depth() {
        // ---
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("/cam").await.unwrap();
        let topic = bus.advertise("/cam", &AdvertiseOptions::new(1)).await.unwrap();

        topic.publish(envelope("/cam", b"first")).await.unwrap();
        topic.publish(envelope("/cam", b"second")).await.unwrap();

        let first = sub.inbox.recv().await.unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"first"));
        assert!(sub.inbox.try_recv().is_err());

        // Draining frees the slot again.
        topic.publish(envelope("/cam", b"third")).await.unwrap();
        let third = sub.inbox.recv().await.unwrap();
        assert_eq!(third.payload, Bytes::from_static(b"third"));
    }

    #[test]
    fn test_params_roundtrip() {
        // ---
        let bus = MemoryBus::with_namespace("/robot");
        assert_eq!(bus.param("/cam/transport_type"), None);
        bus.set_param("/cam/transport_type", "raw");
        assert_eq!(bus.param("/cam/transport_type").as_deref(), Some("raw"));
    }
}
