// src/domain/substrate.rs

//! Messaging substrate abstractions.
//!
//! This module defines the narrow interface the fan-out layer and its
//! transport plugins need from the underlying messaging system: name
//! resolution, a parameter store, per-topic advertisement with subscriber
//! tracking, and subscription for consumers.
//!
//! It intentionally avoids any reference to a concrete middleware. Routing,
//! QoS and wire framing are the substrate's business.
//!
//! The in-process reference implementation lives in `src/transport/memory.rs`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Result, SubscriberId};

/// An opaque, already-encoded message on a concrete sub-topic.
///
/// The substrate does not interpret the payload; `content_type` is
/// informational and lets consumers pick a decoder.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    // ---
    /// Fully qualified topic the envelope was published on.
    pub topic: Arc<str>,

    /// Encoded message bytes.
    pub payload: Bytes,

    /// Optional payload format (e.g. `"application/json"`).
    pub content_type: Option<Arc<str>>,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(topic: impl Into<Arc<str>>, payload: Bytes, content_type: Option<Arc<str>>) -> Self {
        // ---
        Self {
            topic: topic.into(),
            payload,
            content_type,
        }
    }
}

/// Subscriber connect/disconnect notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriberEvent {
    /// Sub-topic the subscriber attached to or left.
    pub topic: String,
    /// The subscriber in question.
    pub subscriber_id: SubscriberId,
}

/// Callback fired when a subscriber connects to or disconnects from a
/// sub-topic.
pub type SubscriberStatusCallback = Arc<dyn Fn(&SubscriberEvent) + Send + Sync>;

/// Owner token for "only notify while this object is alive" semantics.
pub type TrackedObject = Arc<dyn Any + Send + Sync>;

/// Per-advertisement options.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use image_fanout::{AdvertiseOptions, SubscriberEvent};
///
/// let opts = AdvertiseOptions::new(5)
///     .with_latch(true)
///     .with_connect_callback(Arc::new(|ev: &SubscriberEvent| {
///         println!("{} joined", ev.subscriber_id)
///     }));
/// assert_eq!(opts.queue_size, 5);
/// ```
#[derive(Clone)]
pub struct AdvertiseOptions {
    /// Outgoing queue depth per subscriber.
    ///
    /// Applies to subscribers that attached before the advertisement as well.
    pub queue_size: usize,

    /// Retain the last message and redeliver it to late subscribers.
    pub latch: bool,

    /// Fired when a subscriber connects.
    pub connect_cb: Option<SubscriberStatusCallback>,

    /// Fired when a subscriber disconnects.
    pub disconnect_cb: Option<SubscriberStatusCallback>,

    /// Callbacks are suppressed once this owner has been dropped.
    pub tracked_object: Option<Weak<dyn Any + Send + Sync>>,
}

impl AdvertiseOptions {
    /// Options with the given queue depth and everything else off.
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size,
            latch: false,
            connect_cb: None,
            disconnect_cb: None,
            tracked_object: None,
        }
    }

    /// Enable or disable latching.
    pub fn with_latch(mut self, latch: bool) -> Self {
        self.latch = latch;
        self
    }

    /// Set the connect callback.
    pub fn with_connect_callback(mut self, cb: SubscriberStatusCallback) -> Self {
        self.connect_cb = Some(cb);
        self
    }

    /// Set the disconnect callback.
    pub fn with_disconnect_callback(mut self, cb: SubscriberStatusCallback) -> Self {
        self.disconnect_cb = Some(cb);
        self
    }

    /// Only fire callbacks while `owner` is alive.
    ///
    /// A weak reference is kept; the options never extend the owner's life.
    pub fn with_tracked_object(mut self, owner: &TrackedObject) -> Self {
        self.tracked_object = Some(Arc::downgrade(owner));
        self
    }

    /// True when there is no tracked owner, or it is still alive.
    pub fn owner_alive(&self) -> bool {
        match &self.tracked_object {
            Some(weak) => weak.strong_count() > 0,
            None => true,
        }
    }

    /// Fire the connect callback, if any and if the owner is alive.
    pub fn notify_connect(&self, event: &SubscriberEvent) {
        if let Some(cb) = &self.connect_cb {
            if self.owner_alive() {
                cb(event);
            }
        }
    }

    /// Fire the disconnect callback, if any and if the owner is alive.
    pub fn notify_disconnect(&self, event: &SubscriberEvent) {
        if let Some(cb) = &self.disconnect_cb {
            if self.owner_alive() {
                cb(event);
            }
        }
    }
}

impl Default for AdvertiseOptions {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for AdvertiseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvertiseOptions")
            .field("queue_size", &self.queue_size)
            .field("latch", &self.latch)
            .field("connect_cb", &self.connect_cb.is_some())
            .field("disconnect_cb", &self.disconnect_cb.is_some())
            .field("tracked_object", &self.tracked_object.is_some())
            .finish()
    }
}

/// Handle returned from a successful subscription.
///
/// The subscription remains active until the handle is dropped or the
/// topic is shut down. Dropping the handle unsubscribes and fires the
/// publisher's disconnect callback.
pub struct SubscriptionHandle {
    // ---
    /// Fully qualified topic this handle is attached to.
    pub topic: String,

    /// Identity reported to subscriber-status callbacks.
    pub subscriber_id: SubscriberId,

    /// Receiver channel for delivered envelopes.
    pub inbox: mpsc::Receiver<Envelope>,

    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Create a handle; `on_drop` runs exactly once when the handle goes away.
    pub fn new(
        topic: impl Into<String>,
        subscriber_id: SubscriberId,
        inbox: mpsc::Receiver<Envelope>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        // ---
        Self {
            topic: topic.into(),
            subscriber_id,
            inbox,
            on_drop: Some(Box::new(on_drop)),
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("subscriber_id", &self.subscriber_id)
            .finish_non_exhaustive()
    }
}

/// One advertised topic on the substrate.
///
/// Implementations must ensure that:
/// - `num_subscribers()` reflects the substrate's state at call time.
/// - `shutdown()` is idempotent and never fails.
/// - `publish()` after `shutdown()` returns an error instead of delivering.
#[async_trait::async_trait]
pub trait TopicPublisher: Send + Sync {
    // ---
    /// Fully qualified topic name.
    fn topic(&self) -> &str;

    /// Number of currently connected subscribers.
    fn num_subscribers(&self) -> u32;

    /// Deliver an envelope to every current subscriber.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Stop advertising this topic.
    fn shutdown(&self);
}

/// Shared topic publisher pointer.
pub type TopicPublisherPtr = Arc<dyn TopicPublisher>;

/// Messaging substrate abstraction.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat the async methods as
/// normal `async fn`s.
#[async_trait::async_trait]
pub trait Substrate: Send + Sync {
    // ---
    /// Qualify `name` against the substrate's namespace.
    fn resolve_name(&self, name: &str) -> Result<String>;

    /// Store a string parameter.
    fn set_param(&self, key: &str, value: &str);

    /// Read a string parameter.
    fn param(&self, key: &str) -> Option<String>;

    /// Advertise a topic and return the handle used to publish on it.
    async fn advertise(&self, topic: &str, options: &AdvertiseOptions) -> Result<TopicPublisherPtr>;

    /// Subscribe to a topic.
    async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle>;
}

/// Shared substrate pointer.
///
/// `.clone()` only bumps a reference count; clones talk to the same bus.
pub type SubstratePtr = Arc<dyn Substrate>;
