// src/domain/plugin.rs

//! Transport plugin capability interface.
//!
//! A publisher plugin is one strategy for putting an [`Image`] on the wire
//! (raw, compressed, ...). The fan-out publisher instantiates one plugin per
//! configured transport, advertises each on its own sub-topic, and calls
//! `publish` only on plugins that currently have subscribers.
//!
//! Concrete plugins live under `src/transport/`.

use std::sync::Arc;

use crate::{names, AdvertiseOptions, Image, Result, SubstratePtr};

/// Publisher side of a transport plugin.
///
/// Implementations must ensure that:
/// - `num_subscribers()` is cheap and reflects the substrate at call time;
///   it is queried before every publish.
/// - `publish()` does all encoding work itself, so that a skipped call
///   costs nothing.
/// - `shutdown()` is idempotent and safe to call on a plugin that was never
///   advertised.
#[async_trait::async_trait]
pub trait PublisherPlugin: Send + Sync {
    // ---
    /// Transport name, e.g. `"raw"` or `"compressed"`.
    fn transport_name(&self) -> &str;

    /// Sub-topic this transport uses when no override is configured.
    ///
    /// Default implementation appends the transport name to the base topic.
    fn default_topic(&self, base_topic: &str) -> String {
        names::join(base_topic, self.transport_name())
    }

    /// Advertise on `topic` through `substrate`.
    async fn advertise(
        &self,
        substrate: &SubstratePtr,
        topic: &str,
        options: &AdvertiseOptions,
    ) -> Result<()>;

    /// Sub-topic this plugin is advertised on, if any.
    fn topic(&self) -> Option<String>;

    /// Number of subscribers on this plugin's sub-topic.
    fn num_subscribers(&self) -> u32;

    /// Encode and publish one message.
    async fn publish(&self, message: &Image) -> Result<()>;

    /// Stop advertising.
    fn shutdown(&self);
}

/// Shared plugin pointer, as produced by a plugin registry.
pub type PublisherPluginPtr = Arc<dyn PublisherPlugin>;
