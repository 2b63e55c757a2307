//! Domain layer public interface.
//!
//! This module defines the abstractions the fan-out publisher is written
//! against: the message it carries, the messaging substrate it advertises on,
//! and the capability interface every transport plugin implements.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod message;
mod plugin;
mod substrate;

// --- Message re-exports ---

pub use message::{Header, Image};

// --- Plugin re-exports ---

pub use plugin::{PublisherPlugin, PublisherPluginPtr};

// --- Substrate re-exports ---

pub use substrate::{
    //
    AdvertiseOptions,
    Envelope,
    Substrate,
    SubstratePtr,
    SubscriberEvent,
    SubscriberStatusCallback,
    SubscriptionHandle,
    TopicPublisher,
    TopicPublisherPtr,
    TrackedObject,
};
