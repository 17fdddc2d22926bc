//! Local fallback example.
//!
//! With no peer in range, every chunk goes to the fallback sink. This writes
//! them to `undelivered.wav`. Pass `--mic` to capture from the default input
//! device instead of a generated tone.
//!
//! Run with: cargo run --example wav_fallback [-- --mic]

use std::time::Duration;

use syncstream::source::AudioDevice;
use syncstream::transport::mock::{MockConnector, MockDiscovery};
use syncstream::{FileFallback, MockSource, PcmFormat, StreamConfig, SyncStream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let use_mic = std::env::args().any(|arg| arg == "--mic");
    let chunk_duration = Duration::from_millis(100);

    let (format, device) = if use_mic {
        let device = AudioDevice::open_default()?;
        let (sample_rate, channels) = device.native_config()?;
        println!("Capturing from {} ({sample_rate}Hz, {channels}ch)", device.name());
        let format = PcmFormat {
            sample_rate,
            channels,
            bits_per_sample: 16,
        };
        (format, Some(device))
    } else {
        (PcmFormat::default(), None)
    };

    let stream = SyncStream::builder()
        .discovery(MockDiscovery::empty("nobody-home"))
        .connector(MockConnector::new())
        .fallback_sink(FileFallback::wav("undelivered.wav", format))
        .with_config(StreamConfig {
            format,
            chunk_duration,
            ..Default::default()
        })
        .on_event(|e| tracing::info!(?e, "stream event"))
        .build()?;

    let summary = stream.discover_and_connect().await;
    println!("{} peers in range", summary.added);

    let sender = stream.start_session().await?;
    let capture = match device {
        Some(device) => device.stream_into(sender)?,
        None => {
            let mut source = MockSource::for_session(&sender);
            source.generate_sine(440.0, 3000);
            source.stream_into(sender)
        }
    };

    println!("Recording to undelivered.wav for 3 seconds...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    let chunks = capture.stop().await;
    stream.stop_session().await;

    println!("Saved {chunks} chunks to undelivered.wav");
    if let Some(stats) = stream.session_stats().await {
        println!("Stats: {stats:?}");
    }

    Ok(())
}
