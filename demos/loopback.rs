//! Loopback fan-out example.
//!
//! Discovers three scripted peers, connects two of them and streams a
//! generated tone to both. One peer drops out halfway through and the other
//! keeps playing.
//!
//! Run with: RUST_LOG=syncstream=debug cargo run --example loopback

use std::sync::Arc;

use syncstream::transport::mock::{MockConnector, MockDiscovery, MockTransport, PeerPlan};
use syncstream::{
    ChannelFallback, FormatPreset, MockSource, PeerCandidate, ServiceProfile, StreamConfig,
    StreamEvent, SyncStream,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("syncstream=info".parse()?))
        .init();

    let format = FormatPreset::Speech.format();

    // The car kit accepts five chunks, then its link fails
    let car_kit = MockTransport::new().fail_after(5);
    let connector = Arc::new(
        MockConnector::new()
            .with_peer(0xA1_u64, PeerPlan::accept_on(ServiceProfile::AudioSink))
            .with_peer(0xB2_u64, PeerPlan::always_fail())
            .with_peer(
                0xC3_u64,
                PeerPlan::accept_on(ServiceProfile::Handsfree).with_transport(car_kit),
            ),
    );
    let discovery = MockDiscovery::found(
        "scripted",
        vec![
            PeerCandidate::new(0xA1_u64, "Kitchen Speaker"),
            PeerCandidate::new(0xB2_u64, "Old Headphones"),
            PeerCandidate::new(0xC3_u64, "Car Kit"),
        ],
    );

    let (local_tx, mut local_rx) = mpsc::channel(32);
    let stream = SyncStream::builder()
        .discovery(discovery)
        .shared_connector(connector.clone())
        .fallback_sink(ChannelFallback::with_name("speakers", local_tx))
        .with_config(StreamConfig {
            format,
            ..Default::default()
        })
        .on_event(|event| match event {
            StreamEvent::PeerDropped { name, reason, .. } => {
                println!("  {name} dropped: {reason}");
            }
            StreamEvent::ConnectionFailed { name, attempts, .. } => {
                println!("  gave up on {name} after {attempts} passes");
            }
            _ => {}
        })
        .build()?;

    println!("Discovering...");
    let summary = stream.discover_and_connect().await;
    println!(
        "{} of {} candidates connected",
        summary.added, summary.attempted
    );

    let mut source = MockSource::with_format(&format);
    source.generate_sine(440.0, 1000);

    let sender = stream.start_session().await?;
    let forwarded = source.stream_into(sender).join().await;
    stream.stop_session().await;

    println!("Streamed {forwarded} chunks");
    if let Some(speaker) = connector.transport(0xA1_u64) {
        println!("Kitchen Speaker received {} chunks", speaker.write_count());
    }
    if let Some(car) = connector.transport(0xC3_u64) {
        println!("Car Kit received {} chunks", car.write_count());
    }

    let mut played_locally = 0;
    while local_rx.try_recv().is_ok() {
        played_locally += 1;
    }
    println!("Played locally: {played_locally}");

    if let Some(stats) = stream.session_stats().await {
        println!("Stats: {stats:?}");
    }

    Ok(())
}
