//! Publish one image stream through every available transport plugin.
//!
//! A [`Publisher`] discovers the transports a [`PluginRegistry`] declares,
//! advertises each one on its own sub-topic derived from a shared base topic,
//! and forwards every published message only to the transports that currently
//! have subscribers. Transports that fail to load are logged and skipped.
//!
//! ```
//! use image_fanout::{Image, MemoryBus, PublisherBuilder, Substrate, SubstratePtr};
//!
//! # async fn example() -> image_fanout::Result<()> {
//! let bus = MemoryBus::new();
//! let substrate: SubstratePtr = bus.clone();
//!
//! let publisher = PublisherBuilder::new(substrate)
//!     .topic("camera/image")
//!     .build()
//!     .await?;
//!
//! let mut viewer = bus.subscribe("/camera/image").await?;
//! publisher.publish(&Image::new(1, 1, "mono8", 1, vec![128u8])).await?;
//!
//! let frame = viewer.inbox.recv().await;
//! assert!(frame.is_some());
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod domain;
mod error;
mod macros;
mod publisher;
mod publisher_builder;
mod registry;
mod subscriber_id;
mod transport;
mod util;

pub mod names;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use publisher::{Publisher, TransportTopicMap};
pub use publisher_builder::PublisherBuilder;

pub use error::{FanoutError, PluginLoadError, Result};
pub use subscriber_id::SubscriberId;

pub use registry::{
    //
    canonical_transport_id,
    lookup_name,
    PluginFactory,
    PluginLoader,
    PluginRegistry,
    PluginRegistryPtr,
    PUBLISHER_SUFFIX,
};

pub use transport::{
    //
    create_raw_plugin,
    decode_raw,
    MemoryBus,
    MessageEncoder,
    RawEncoder,
    SimplePublisherPlugin,
    RAW_CONTENT_TYPE,
};

// --- public re-exports
pub use domain::{
    //
    AdvertiseOptions,
    Envelope,
    Header,
    Image,
    PublisherPlugin,
    PublisherPluginPtr,
    Substrate,
    SubstratePtr,
    SubscriberEvent,
    SubscriberStatusCallback,
    SubscriptionHandle,
    TopicPublisher,
    TopicPublisherPtr,
    TrackedObject,
};
