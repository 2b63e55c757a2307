//! Publisher builder.
//!
//! Provides a fluent API for configuring which transports a [`Publisher`]
//! brings up, where each one publishes, and how its topics are advertised.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    // ---
    log_warn,
    AdvertiseOptions,
    FanoutError,
    PluginLoader,
    PluginRegistryPtr,
    Publisher,
    Result,
    SubscriberStatusCallback,
    SubstratePtr,
    TrackedObject,
};

/// Builder for creating advertised publishers.
///
/// # Examples
///
/// ## Default transports with a custom raw topic
/// ```
/// use image_fanout::{MemoryBus, PublisherBuilder, SubstratePtr};
///
/// # async fn example() -> image_fanout::Result<()> {
/// let substrate: SubstratePtr = MemoryBus::new();
///
/// let publisher = PublisherBuilder::new(substrate)
///     .topic("/cam")
///     .queue_size(5)
///     .topic_override("raw", "/cam/raw_custom")
///     .build()
///     .await?;
///
/// assert_eq!(publisher.transports(), vec![("raw".to_string(), "/cam/raw_custom".to_string())]);
/// # Ok(())
/// # }
/// ```
///
/// ## Only some transports, latched
/// ```no_run
/// use image_fanout::{MemoryBus, PublisherBuilder, SubstratePtr};
///
/// # async fn example() -> image_fanout::Result<()> {
/// let substrate: SubstratePtr = MemoryBus::new();
///
/// let publisher = PublisherBuilder::new(substrate)
///     .topic("camera/image")
///     .only_transports(["raw", "compressed"])
///     .latch(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct PublisherBuilder {
    substrate: SubstratePtr,
    registry: Option<PluginRegistryPtr>,
    topic: Option<String>,
    options: AdvertiseOptions,

    // Topic map edits, applied in this order at build()
    only: Option<BTreeSet<String>>,
    disabled: BTreeSet<String>,
    overrides: BTreeMap<String, String>,
}

impl PublisherBuilder {
    /// Create a builder that advertises through `substrate`.
    ///
    /// Defaults: built-in transports, queue size 1, no latching, no callbacks.
    pub fn new(substrate: SubstratePtr) -> Self {
        // ---
        Self {
            substrate,
            registry: None,
            topic: None,
            options: AdvertiseOptions::default(),
            only: None,
            disabled: BTreeSet::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Use `registry` instead of the built-in transports.
    pub fn registry(mut self, registry: PluginRegistryPtr) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the base topic (required).
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the per-subscriber queue depth.
    ///
    /// Must be greater than zero.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.options.queue_size = queue_size;
        self
    }

    /// Retain the last message for late subscribers.
    pub fn latch(mut self, latch: bool) -> Self {
        self.options.latch = latch;
        self
    }

    /// Callback fired when a subscriber connects to any transport.
    pub fn on_connect(mut self, cb: SubscriberStatusCallback) -> Self {
        self.options.connect_cb = Some(cb);
        self
    }

    /// Callback fired when a subscriber disconnects from any transport.
    pub fn on_disconnect(mut self, cb: SubscriberStatusCallback) -> Self {
        self.options.disconnect_cb = Some(cb);
        self
    }

    /// Suppress callbacks once `owner` is dropped.
    pub fn tracked_object(mut self, owner: &TrackedObject) -> Self {
        self.options = self.options.with_tracked_object(owner);
        self
    }

    /// Publish `transport_id` on `topic` instead of its default sub-topic.
    pub fn topic_override(
        mut self,
        transport_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        self.overrides.insert(transport_id.into(), topic.into());
        self
    }

    /// Leave `transport_id` out.
    pub fn disable_transport(mut self, transport_id: impl Into<String>) -> Self {
        self.disabled.insert(transport_id.into());
        self
    }

    /// Bring up only the listed transports.
    pub fn only_transports<I, S>(mut self, transport_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(transport_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Build and advertise the publisher (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `topic` is missing or cannot be resolved
    /// - `queue_size` is zero
    /// - a topic override names a transport that is not configured
    ///
    /// Transports that fail to load are logged and skipped, as in
    /// [`Publisher::advertise_with_options`].
    pub async fn build(self) -> Result<Publisher> {
        // ---
        let topic = self
            .topic
            .ok_or_else(|| FanoutError::MissingConfig("topic".into()))?;

        if self.options.queue_size == 0 {
            return Err(FanoutError::ConfigConflict(
                "queue_size must be greater than zero".into(),
            ));
        }

        let registry = self
            .registry
            .unwrap_or_else(|| PluginLoader::builtin().into_ptr());
        let publisher = Publisher::new(registry);

        publisher.edit_topic_map(|topic_map| {
            if let Some(only) = &self.only {
                for transport_id in only.iter().filter(|id| !topic_map.contains_key(*id)) {
                    log_warn!("requested transport {transport_id} is not declared");
                }
                topic_map.retain(|id, _| only.contains(id));
            }

            topic_map.retain(|id, _| !self.disabled.contains(id));

            for (transport_id, sub_topic) in self.overrides {
                match topic_map.get_mut(&transport_id) {
                    Some(slot) => *slot = sub_topic,
                    None => {
                        return Err(FanoutError::ConfigConflict(format!(
                            "topic override for transport {transport_id}, which is not configured"
                        )))
                    }
                }
            }
            Ok(())
        })?;

        publisher
            .advertise_with_options(&self.substrate, &topic, self.options)
            .await?;

        Ok(publisher)
    }
}
