//! Tubetap Core - request interception for an embedded video player
//!
//! This crate decides, for every request an embedded browser makes toward the
//! video service, whether to:
//! - let it pass untouched
//! - cancel it as a re-fired duplicate
//! - start a new playback session
//!
//! A new session fetches video metadata and the stream manifest in the
//! background and feeds both into the bound playback sink.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Tubetap Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  request url ──► ┌──────────────┐     ┌──────────────┐          │
//! │                  │     URL      │────►│   Session    │          │
//! │                  │  Normalizer  │     │ State Machine│          │
//! │                  └──────────────┘     └──────┬───────┘          │
//! │                                              │ activate         │
//! │                                       ┌──────┴───────┐          │
//! │                                       │     Task     │          │
//! │                                       │ Coordinator  │          │
//! │                                       └──┬────────┬──┘          │
//! │                              metadata    │        │  manifest   │
//! │                                          │  ┌─────┴──────┐      │
//! │                                          │  │  Manifest  │      │
//! │                                          │  │   Parser   │      │
//! │                                          │  └─────┬──────┘      │
//! │                                    ┌─────┴────────┴──┐          │
//! │  close / next ──► ┌───────────┐    │ Delivery Guard  │          │
//! │                   │  Command  │    │  (generation)   │          │
//! │                   │   Relay   │    └────────┬────────┘          │
//! │                   └───────────┘             ▼                   │
//! │                                  Playback Sink (embedded/ext)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod error;
pub mod interceptor;
pub mod manifest;
pub mod normalize;
pub mod relay;
pub mod request;
pub mod session;
pub mod sink;
pub mod types;

pub use coordinator::{
    Activation, DeliveryGuard, LogNotifier, MetadataProvider, Notifier, StreamProvider,
    TaskCoordinator, TaskOutcome, TaskReport,
};
pub use error::{Error, ErrorKind, Result};
pub use interceptor::{Interception, Interceptor, InterceptorBuilder, Preferences, StaticPreferences};
pub use manifest::{parse_stream, ByteStream, ManifestEvents, ManifestParser, VideoInfoParser};
pub use normalize::normalize;
pub use relay::{CommandExecutor, CommandRelay};
pub use request::PlaybackRequest;
pub use session::{Decision, Session, SessionState};
pub use sink::{BoundSink, MediaEvent, PlaybackSink, SinkBinding, SinkKind};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "Tubetap Core initialized");
}
