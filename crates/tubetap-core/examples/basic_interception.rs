//! Basic interception example
//!
//! Feeds a few requests through an interceptor backed by in-memory providers
//! and prints what the player sink receives.
//!
//! Run with: cargo run -p tubetap-core --example basic_interception

use async_trait::async_trait;
use std::sync::Arc;
use tubetap_core::{
    manifest::byte_stream, ByteStream, Command, CommandExecutor, ErrorKind, Interceptor,
    InterceptorConfig, MetadataEnvelope, MetadataProvider, PlaybackRequest, PlaybackSink,
    StreamDescriptor, StreamProvider, VideoClassification,
};

const MANIFEST: &str = "status=ok\
    &hlsvp=https%3A%2F%2Fmanifest.example%2Flive%2Fmaster.m3u8\
    &adaptive_fmts=itag%3D140%26url%3Dhttps%253A%252F%252Fr1.example%252Faudio%26type%3Daudio%252Fmp4";

struct PrintSink;

impl PlaybackSink for PrintSink {
    fn on_start(&self) {
        println!("  [sink] start");
    }
    fn on_metadata(&self, metadata: MetadataEnvelope) {
        println!("  [sink] metadata: {:?} by {:?}", metadata.title, metadata.author);
    }
    fn on_stream_found(&self, stream: StreamDescriptor) {
        println!("  [sink] stream: {:?} {}", stream.kind, stream.url);
    }
    fn on_false_call(&self) {
        println!("  [sink] back to previous screen");
    }
    fn on_error(&self, kind: ErrorKind) {
        println!("  [sink] error: {}", kind);
    }
    fn on_done(&self) {
        println!("  [sink] done");
    }
}

struct InMemory;

#[async_trait]
impl MetadataProvider for InMemory {
    async fn get_metadata(
        &self,
        video_id: Option<&str>,
        playlist_id: Option<&str>,
    ) -> tubetap_core::Result<MetadataEnvelope> {
        Ok(MetadataEnvelope::new(video_id.unwrap_or("unknown"), playlist_id.map(str::to_owned))
            .with_title("Example broadcast")
            .with_author("Example channel"))
    }
}

#[async_trait]
impl StreamProvider for InMemory {
    async fn get_stream_bytes(&self, request: &PlaybackRequest) -> tubetap_core::Result<ByteStream> {
        println!("  [provider] fetching {}", request.url());
        Ok(byte_stream(MANIFEST))
    }
}

struct PrintExecutor;

impl CommandExecutor for PrintExecutor {
    fn submit(&self, command: Command, force_run: bool) {
        println!("  [page] run {} (force: {})", command, force_run);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Tubetap Core - Basic Interception Example");
    println!("=========================================\n");

    let config = InterceptorConfig {
        classification: VideoClassification::Live,
        ..Default::default()
    };

    let interceptor = Interceptor::builder()
        .config(config)
        .embedded_sink(Arc::new(PrintSink))
        .metadata_provider(Arc::new(InMemory))
        .stream_provider(Arc::new(InMemory))
        .command_executor(Arc::new(PrintExecutor))
        .build()?;

    let url = "https://www.youtube.com/get_video_info?video_id=LIVE01&c=TVHTML5&cver=6.2";

    println!("First request:");
    let first = interceptor.process(url);
    println!("  decision: {:?}", first.decision);
    if let Some(activation) = first.activation {
        activation.join().await;
    }

    println!("\nSame request fired again before the player opened:");
    println!("  decision: {:?}", interceptor.process(url).decision);

    println!("\nUser skips to the next video:");
    interceptor.jump_to_next_video();
    let next = interceptor.process(url);
    println!("  decision: {:?}", next.decision);
    if let Some(activation) = next.activation {
        activation.join().await;
    }

    println!("\nFinal state: {} (generation {})", interceptor.state(), interceptor.generation());
    Ok(())
}
