//! Camera fan-out over the in-memory bus.
//!
//! Publishes a synthetic gradient through every loadable transport while a
//! viewer attaches halfway through. Frames published before the viewer
//! connects are never encoded.
//!
//! Run with: RUST_LOG=debug cargo run --example camera_memory

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::sync::Arc;

use image_fanout::{
    decode_raw, Header, Image, MemoryBus, PluginLoader, PluginRegistry, PublisherBuilder, Result,
    Substrate, SubscriberEvent, SubstratePtr,
};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

fn gradient(seq: u32, width: u32, height: u32) -> Image {
    // ---
    let data: Vec<u8> = (0..width * height)
        .map(|i| ((i + seq) % 256) as u8)
        .collect();

    Image::new(width, height, "mono8", width, data).with_header(Header {
        seq,
        stamp_nanos: u64::from(seq) * 33_333_333,
        frame_id: "camera_optical".into(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let bus = MemoryBus::with_namespace("/robot");
    let substrate: SubstratePtr = bus.clone();

    // "compressed" is declared but not linked in; it is reported and skipped.
    let registry = PluginLoader::builtin().declare("compressed_pub");
    println!("declared transports: {:?}", registry.declared_transports());
    println!("loadable transports: {:?}", registry.loadable_transports());

    let publisher = PublisherBuilder::new(substrate)
        .registry(registry.into_ptr())
        .topic("camera/image")
        .queue_size(4)
        .on_connect(Arc::new(|ev: &SubscriberEvent| {
            println!("viewer {} connected to {}", ev.subscriber_id, ev.topic)
        }))
        .on_disconnect(Arc::new(|ev: &SubscriberEvent| {
            println!("viewer {} left {}", ev.subscriber_id, ev.topic)
        }))
        .build()
        .await?;

    for (transport, topic) in publisher.transports() {
        println!("{transport} -> {topic}");
    }

    let mut viewer = None;

    for seq in 0..6 {
        if seq == 3 {
            viewer = Some(bus.subscribe("/robot/camera/image").await?);
        }

        println!(
            "frame {seq}: {} subscriber(s)",
            publisher.num_subscribers()
        );
        publisher.publish(&gradient(seq, 8, 4)).await?;
    }

    if let Some(mut viewer) = viewer {
        while let Ok(env) = viewer.inbox.try_recv() {
            let image = decode_raw(&env.payload)?;
            println!(
                "viewer got frame {} ({}x{} {})",
                image.header.seq, image.width, image.height, image.encoding
            );
        }
    }

    publisher.shutdown();
    Ok(())
}
