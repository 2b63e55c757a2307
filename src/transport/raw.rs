//! Raw transport.
//!
//! Publishes the image unchanged, serialized as JSON, on the base topic
//! itself. It is the transport every consumer can rely on being present.

use std::sync::Arc;

use bytes::Bytes;

use crate::{names, Image, PublisherPluginPtr, Result};

use super::simple::{MessageEncoder, SimplePublisherPlugin};

/// Content type of raw payloads.
pub const RAW_CONTENT_TYPE: &str = "application/json";

/// Encoder for the `raw` transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawEncoder;

impl MessageEncoder for RawEncoder {
    fn transport_name(&self) -> &str {
        "raw"
    }

    /// Raw images go out on the base topic, not a sub-topic.
    fn default_topic(&self, base_topic: &str) -> String {
        names::normalize(base_topic)
    }

    fn content_type(&self) -> &str {
        RAW_CONTENT_TYPE
    }

    fn encode(&self, message: &Image) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(message)?))
    }
}

/// Decode a payload produced by the raw transport.
pub fn decode_raw(payload: &[u8]) -> Result<Image> {
    Ok(serde_json::from_slice(payload)?)
}

/// Create a fresh, unadvertised raw publisher plugin.
pub fn create_raw_plugin() -> PublisherPluginPtr {
    Arc::new(SimplePublisherPlugin::new(RawEncoder))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{AdvertiseOptions, FanoutError, Header, MemoryBus, Substrate, SubstratePtr};
    use tokio::time::{timeout, Duration};

    fn frame() -> Image {
        Image::new(2, 1, "mono8", 2, vec![7u8, 9u8]).with_header(Header {
            seq: 3,
            stamp_nanos: 42,
            frame_id: "camera".into(),
        })
    }

    #[test]
    fn test_default_topic_is_base_topic() {
        // ---
        let plugin = create_raw_plugin();
        assert_eq!(plugin.transport_name(), "raw");
        assert_eq!(plugin.default_topic("/cam"), "/cam");
        assert_eq!(plugin.default_topic("/cam/"), "/cam");
    }

    #[tokio::test]
    async fn test_publish_delivers_decodable_payload() {
        // ---
        let bus = MemoryBus::new();
        let substrate: SubstratePtr = bus.clone();
        let plugin = create_raw_plugin();

        plugin
            .advertise(&substrate, "/cam", &AdvertiseOptions::new(2))
            .await
            .unwrap();
        assert_eq!(plugin.topic().as_deref(), Some("/cam"));

        let mut sub = bus.subscribe("/cam").await.unwrap();
        assert_eq!(plugin.num_subscribers(), 1);

        plugin.publish(&frame()).await.unwrap();

        let env = timeout(Duration::from_millis(100), sub.inbox.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(env.content_type.as_deref(), Some(RAW_CONTENT_TYPE));
        assert_eq!(decode_raw(&env.payload).unwrap(), frame());
    }

    #[tokio::test]
    async fn test_publish_before_advertise_fails() {
        // ---
        let plugin = create_raw_plugin();
        assert_eq!(plugin.num_subscribers(), 0);
        assert!(matches!(
            plugin.publish(&frame()).await,
            Err(FanoutError::Substrate(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_unadvertises_and_is_idempotent() {
        // ---
        let bus = MemoryBus::new();
        let substrate: SubstratePtr = bus.clone();
        let plugin = create_raw_plugin();

        plugin
            .advertise(&substrate, "/cam", &AdvertiseOptions::default())
            .await
            .unwrap();
        assert_eq!(bus.advertised_topics(), vec!["/cam"]);

        plugin.shutdown();
        plugin.shutdown();

        assert!(bus.advertised_topics().is_empty());
        assert_eq!(plugin.topic(), None);
    }
}
