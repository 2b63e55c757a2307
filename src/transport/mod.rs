//! Transport implementations.
//!
//! This module provides the concrete pieces behind the domain-level traits:
//! the in-memory reference [`Substrate`](crate::Substrate), the shared
//! single-topic plugin skeleton, and the transports shipped with the crate.
//!
//! Domain code must not depend on transport-specific types.

mod memory;
mod raw;
mod simple;

pub use memory::MemoryBus;
pub use raw::{create_raw_plugin, decode_raw, RawEncoder, RAW_CONTENT_TYPE};
pub use simple::{MessageEncoder, SimplePublisherPlugin};
