//! Single-topic publisher plugin skeleton.
//!
//! Most transports advertise exactly one sub-topic and differ only in how an
//! [`Image`] becomes bytes. [`SimplePublisherPlugin`] implements the
//! [`PublisherPlugin`] contract once; a transport supplies a
//! [`MessageEncoder`].

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::{
    // ---
    log_debug,
    names,
    util::lock_ignore_poison,
    AdvertiseOptions,
    Envelope,
    FanoutError,
    Image,
    PublisherPlugin,
    Result,
    SubstratePtr,
    TopicPublisherPtr,
};

/// Transport-specific half of a [`SimplePublisherPlugin`].
pub trait MessageEncoder: Send + Sync + 'static {
    // ---
    /// Transport name, e.g. `"raw"`.
    fn transport_name(&self) -> &str;

    /// Sub-topic used when no override is configured.
    ///
    /// Default implementation appends the transport name to the base topic.
    fn default_topic(&self, base_topic: &str) -> String {
        names::join(base_topic, self.transport_name())
    }

    /// Content type stamped on every envelope.
    fn content_type(&self) -> &str;

    /// Encode one message.
    fn encode(&self, message: &Image) -> Result<Bytes>;
}

/// Publisher plugin that advertises one topic and publishes encoded images
/// on it.
pub struct SimplePublisherPlugin<E> {
    // ---
    encoder: E,
    content_type: Arc<str>,
    advertised: Mutex<Option<TopicPublisherPtr>>,
}

impl<E: MessageEncoder> SimplePublisherPlugin<E> {
    /// Wrap an encoder.
    pub fn new(encoder: E) -> Self {
        // ---
        let content_type = Arc::from(encoder.content_type());
        Self {
            encoder,
            content_type,
            advertised: Mutex::new(None),
        }
    }

    /// The wrapped encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    fn current(&self) -> Option<TopicPublisherPtr> {
        lock_ignore_poison(&self.advertised).clone()
    }
}

#[async_trait::async_trait]
impl<E: MessageEncoder> PublisherPlugin for SimplePublisherPlugin<E> {
    // ---
    fn transport_name(&self) -> &str {
        self.encoder.transport_name()
    }

    fn default_topic(&self, base_topic: &str) -> String {
        self.encoder.default_topic(base_topic)
    }

    async fn advertise(
        &self,
        substrate: &SubstratePtr,
        topic: &str,
        options: &AdvertiseOptions,
    ) -> Result<()> {
        // ---
        if let Some(existing) = self.current() {
            return Err(FanoutError::Substrate(format!(
                "{} publisher already advertised on {}",
                self.transport_name(),
                existing.topic()
            )));
        }

        let publisher = substrate.advertise(topic, options).await?;
        log_debug!("{}: advertised on {}", self.transport_name(), publisher.topic());

        *lock_ignore_poison(&self.advertised) = Some(publisher);
        Ok(())
    }

    fn topic(&self) -> Option<String> {
        self.current().map(|publisher| publisher.topic().to_string())
    }

    fn num_subscribers(&self) -> u32 {
        self.current()
            .map_or(0, |publisher| publisher.num_subscribers())
    }

    async fn publish(&self, message: &Image) -> Result<()> {
        // ---
        let publisher = self.current().ok_or_else(|| {
            FanoutError::Substrate(format!(
                "{} publisher is not advertised",
                self.transport_name()
            ))
        })?;

        let payload = self.encoder.encode(message)?;
        let env = Envelope::new(publisher.topic(), payload, Some(self.content_type.clone()));

        publisher.publish(env).await
    }

    fn shutdown(&self) {
        // ---
        let publisher = lock_ignore_poison(&self.advertised).take();
        if let Some(publisher) = publisher {
            log_debug!("{}: shutting down {}", self.transport_name(), publisher.topic());
            publisher.shutdown();
        }
    }
}

impl<E> fmt::Debug for SimplePublisherPlugin<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topic = lock_ignore_poison(&self.advertised)
            .as_ref()
            .map(|publisher| publisher.topic().to_string());
        f.debug_struct("SimplePublisherPlugin")
            .field("content_type", &self.content_type)
            .field("topic", &topic)
            .finish_non_exhaustive()
    }
}
