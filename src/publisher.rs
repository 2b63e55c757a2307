//! Multi-transport fan-out publisher.
//!
//! A [`Publisher`] is the single publish surface for one logical image
//! stream. At advertise time it asks the plugin registry for one plugin per
//! entry in its [`TransportTopicMap`], advertises each plugin on its own
//! sub-topic, and from then on forwards every message only to the plugins
//! that currently have subscribers.
//!
//! A transport that cannot be loaded or advertised is logged and left out;
//! it never prevents the remaining transports from coming up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::registry::{canonical_transport_id, lookup_name};
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    util::lock_ignore_poison,
    AdvertiseOptions,
    FanoutError,
    Image,
    PluginLoader,
    PluginRegistryPtr,
    PublisherPluginPtr,
    Result,
    SubstratePtr,
};

/// Transport id → sub-topic override.
///
/// An empty override means "use the plugin's default sub-topic".
pub type TransportTopicMap = BTreeMap<String, String>;

/// Fan-out publisher handle.
///
/// # Shared state
///
/// `Publisher` has **reference semantics**. `.clone()` returns another handle
/// to the same topic, topic map and plugin instances; it does not create an
/// independent publisher. Calling [`shutdown`](Self::shutdown) on any clone
/// shuts down every clone, and the plugins are shut down automatically when
/// the last clone is dropped.
///
/// # Example
///
/// ```
/// # use image_fanout::{Image, MemoryBus, Publisher, Substrate, SubstratePtr};
/// # async fn example() -> image_fanout::Result<()> {
/// let bus = MemoryBus::new();
/// let substrate: SubstratePtr = bus.clone();
///
/// let publisher = Publisher::with_builtin_transports();
/// publisher.advertise(&substrate, "camera/image", 1, false).await?;
/// assert_eq!(publisher.topic(), "/camera/image");
///
/// // Nobody is listening yet, so nothing is encoded.
/// publisher.publish(&Image::new(1, 1, "mono8", 1, vec![0u8])).await?;
///
/// let _viewer = bus.subscribe("/camera/image").await?;
/// assert_eq!(publisher.num_subscribers(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: PluginRegistryPtr,

    // Set once, by the first advertise.
    topic: OnceLock<String>,
    topic_map: Mutex<TransportTopicMap>,

    // Live plugins in advertise order.
    plugins: Mutex<Vec<PublisherPluginPtr>>,
}

impl Inner {
    fn live(&self) -> Vec<PublisherPluginPtr> {
        lock_ignore_poison(&self.plugins).clone()
    }

    fn shutdown(&self) {
        // ---
        let plugins = std::mem::take(&mut *lock_ignore_poison(&self.plugins));
        for plugin in plugins {
            plugin.shutdown();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Publisher {
    /// Create a publisher whose topic map covers every transport the
    /// registry declares, each with its default sub-topic.
    ///
    /// Lookup names that reduce to the same transport id collapse into one
    /// entry; the last one declared wins.
    pub fn new(registry: PluginRegistryPtr) -> Self {
        // ---
        let mut topic_map = TransportTopicMap::new();

        for class in registry.declared_classes() {
            let transport_id = canonical_transport_id(&class);
            if topic_map.insert(transport_id.to_string(), String::new()).is_some() {
                log_debug!("{class} collides with an earlier plugin as transport {transport_id}");
            }
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                topic: OnceLock::new(),
                topic_map: Mutex::new(topic_map),
                plugins: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a publisher backed by the transports shipped in this crate.
    pub fn with_builtin_transports() -> Self {
        Self::new(PluginLoader::builtin().into_ptr())
    }

    /// Advertise every configured transport under `topic`.
    ///
    /// Shorthand for [`advertise_with_options`](Self::advertise_with_options)
    /// without subscriber callbacks or a tracked object.
    pub async fn advertise(
        &self,
        substrate: &SubstratePtr,
        topic: &str,
        queue_size: usize,
        latch: bool,
    ) -> Result<()> {
        // ---
        let options = AdvertiseOptions::new(queue_size).with_latch(latch);
        self.advertise_with_options(substrate, topic, options).await
    }

    /// Advertise every configured transport under `topic`.
    ///
    /// For each topic-map entry, in map order: instantiate the plugin, pick
    /// the override or the plugin's default sub-topic, record the transport
    /// type as the `<sub_topic>/transport_type` parameter, and advertise.
    /// A plugin that fails to load or advertise is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::InvalidTopic`] if `topic` cannot be resolved and
    /// [`FanoutError::AlreadyAdvertised`] on a second call. Individual
    /// transport failures are never returned.
    pub async fn advertise_with_options(
        &self,
        substrate: &SubstratePtr,
        topic: &str,
        options: AdvertiseOptions,
    ) -> Result<()> {
        // ---
        let base_topic = substrate.resolve_name(topic)?;

        if self.inner.topic.set(base_topic.clone()).is_err() {
            let existing = self.topic();
            return Err(FanoutError::AlreadyAdvertised(existing));
        }

        let topic_map = self.topic_map();

        for (transport_id, sub_topic_override) in &topic_map {
            let lookup = lookup_name(transport_id);

            let plugin = match self.inner.registry.instantiate(&lookup) {
                Ok(plugin) => plugin,
                Err(err) => {
                    log_warn!("failed to load plugin {lookup}, error string: {err}");
                    continue;
                }
            };

            let sub_topic = if sub_topic_override.is_empty() {
                plugin.default_topic(&base_topic)
            } else {
                sub_topic_override.clone()
            };

            let sub_topic = match substrate.resolve_name(&sub_topic) {
                Ok(resolved) => resolved,
                Err(err) => {
                    log_warn!("{transport_id}: cannot use sub-topic {sub_topic}: {err}");
                    plugin.shutdown();
                    continue;
                }
            };

            substrate.set_param(
                &format!("{sub_topic}/transport_type"),
                plugin.transport_name(),
            );

            if let Err(err) = plugin.advertise(substrate, &sub_topic, &options).await {
                log_warn!("{transport_id}: failed to advertise {sub_topic}: {err}");
                plugin.shutdown();
                continue;
            }

            lock_ignore_poison(&self.inner.plugins).push(plugin);
        }

        log_info!(
            "advertised {base_topic} on {} of {} transports",
            self.num_transports(),
            topic_map.len()
        );

        Ok(())
    }

    /// Publish `message` on every transport that has at least one subscriber.
    ///
    /// Transports without subscribers are skipped before any encoding work.
    /// Before [`advertise`](Self::advertise) this is a no-op.
    ///
    /// # Errors
    ///
    /// A failing transport does not stop delivery to the others; the first
    /// failure is returned once every transport has been tried.
    pub async fn publish(&self, message: &Image) -> Result<()> {
        // ---
        let mut first_err = None;

        for plugin in self.inner.live() {
            if plugin.num_subscribers() == 0 {
                continue;
            }
            if let Err(err) = plugin.publish(message).await {
                log_error!("{}: publish failed: {err}", plugin.transport_name());
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Publish a shared message. See [`publish`](Self::publish).
    pub async fn publish_shared(&self, message: &Arc<Image>) -> Result<()> {
        self.publish(message.as_ref()).await
    }

    /// Total subscribers across all live transports, queried now.
    pub fn num_subscribers(&self) -> u32 {
        self.inner
            .live()
            .iter()
            .map(|plugin| plugin.num_subscribers())
            .sum()
    }

    /// Resolved base topic; empty before [`advertise`](Self::advertise).
    pub fn topic(&self) -> String {
        self.inner.topic.get().cloned().unwrap_or_default()
    }

    /// True once [`advertise`](Self::advertise) has resolved the base topic.
    pub fn is_advertised(&self) -> bool {
        self.inner.topic.get().is_some()
    }

    /// Snapshot of the transport topic map.
    pub fn topic_map(&self) -> TransportTopicMap {
        lock_ignore_poison(&self.inner.topic_map).clone()
    }

    /// Edit the transport topic map.
    ///
    /// Meant for use before [`advertise`](Self::advertise): override
    /// sub-topics or remove unwanted transports. `edit` works on a copy that
    /// replaces the map when it returns, so it may call back into this
    /// publisher. Changes made after advertise do not affect transports that
    /// are already live.
    ///
    /// ```
    /// # use image_fanout::Publisher;
    /// let publisher = Publisher::with_builtin_transports();
    /// publisher.edit_topic_map(|map| {
    ///     map.clear();
    ///     map.insert("raw".into(), "/cam/raw_custom".into());
    /// });
    /// assert_eq!(publisher.topic_map()["raw"], "/cam/raw_custom");
    /// ```
    pub fn edit_topic_map<R>(&self, edit: impl FnOnce(&mut TransportTopicMap) -> R) -> R {
        // ---
        let mut topic_map = self.topic_map();
        let out = edit(&mut topic_map);
        self.set_topic_map(topic_map);
        out
    }

    /// Replace the transport topic map. See [`edit_topic_map`](Self::edit_topic_map).
    pub fn set_topic_map(&self, topic_map: TransportTopicMap) {
        *lock_ignore_poison(&self.inner.topic_map) = topic_map;
    }

    /// Number of live transport plugins.
    pub fn num_transports(&self) -> usize {
        lock_ignore_poison(&self.inner.plugins).len()
    }

    /// `(transport name, sub-topic)` for every live transport, in advertise
    /// order.
    pub fn transports(&self) -> Vec<(String, String)> {
        // ---
        self.inner
            .live()
            .iter()
            .map(|plugin| {
                (
                    plugin.transport_name().to_string(),
                    plugin.topic().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Shut down every live transport.
    ///
    /// Affects all clones of this handle. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic())
            .field("topic_map", &self.topic_map())
            .field("transports", &self.transports())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{MemoryBus, PluginLoader, Substrate};

    #[test]
    fn test_default_map_strips_suffix() {
        // ---
        let registry = PluginLoader::new()
            .declare("raw_pub")
            .declare("compressed_pub")
            .declare("theora_pub")
            .into_ptr();

        let publisher = Publisher::new(registry);
        let map = publisher.topic_map();

        assert_eq!(map.len(), 3);
        assert!(map.values().all(String::is_empty));
        assert_eq!(
            map.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["compressed", "raw", "theora"]
        );
    }

    #[test]
    fn test_default_map_collisions_collapse() {
        // ---
        let registry = PluginLoader::new()
            .declare("raw")
            .declare("raw_pub")
            .declare("compressed_pub")
            .into_ptr();

        let publisher = Publisher::new(registry);

        // three declared names, one collision
        assert_eq!(publisher.topic_map().len(), 2);
    }

    #[tokio::test]
    async fn test_topic_empty_until_advertised() {
        // ---
        let bus = MemoryBus::with_namespace("/robot");
        let substrate: SubstratePtr = bus.clone();
        let publisher = Publisher::with_builtin_transports();

        assert_eq!(publisher.topic(), "");
        assert!(!publisher.is_advertised());

        publisher.advertise(&substrate, "cam", 1, false).await.unwrap();

        assert_eq!(publisher.topic(), "/robot/cam");
        assert!(publisher.is_advertised());
        assert_eq!(bus.param("/robot/cam/transport_type").as_deref(), Some("raw"));
    }

    #[tokio::test]
    async fn test_second_advertise_rejected() {
        // ---
        let substrate: SubstratePtr = MemoryBus::new();
        let publisher = Publisher::with_builtin_transports();

        publisher.advertise(&substrate, "/cam", 1, false).await.unwrap();
        let again = publisher.advertise(&substrate, "/other", 1, false).await;

        assert!(matches!(again, Err(FanoutError::AlreadyAdvertised(t)) if t == "/cam"));
        assert_eq!(publisher.topic(), "/cam");
        assert_eq!(publisher.num_transports(), 1);
    }

    #[tokio::test]
    async fn test_invalid_base_topic_rejected() {
        // ---
        let substrate: SubstratePtr = MemoryBus::new();
        let publisher = Publisher::with_builtin_transports();

        let result = publisher.advertise(&substrate, "bad topic", 1, false).await;

        assert!(matches!(result, Err(FanoutError::InvalidTopic(_))));
        assert!(!publisher.is_advertised());
    }

    #[tokio::test]
    async fn test_use_before_advertise_is_noop() {
        // ---
        let publisher = Publisher::with_builtin_transports();

        publisher
            .publish(&Image::new(1, 1, "mono8", 1, vec![0u8]))
            .await
            .unwrap();
        assert_eq!(publisher.num_subscribers(), 0);
        assert_eq!(publisher.num_transports(), 0);
        publisher.shutdown();
    }
}
