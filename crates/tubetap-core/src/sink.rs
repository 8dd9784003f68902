//! Playback sinks and the events delivered to them

use crate::{
    error::ErrorKind,
    types::{MetadataEnvelope, StreamDescriptor},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which kind of player a sink drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Embedded,
    External,
}

/// Playback destination. Invoked only by the interceptor.
pub trait PlaybackSink: Send + Sync {
    /// A new activation started
    fn on_start(&self);

    fn on_metadata(&self, metadata: MetadataEnvelope);

    fn on_stream_found(&self, stream: StreamDescriptor);

    /// The request was cancelled after the sink became visible; go back
    fn on_false_call(&self);

    fn on_error(&self, kind: ErrorKind);

    /// Manifest fully delivered
    fn on_done(&self) {}
}

/// Lifecycle event for a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MediaEvent {
    Start,
    Metadata(MetadataEnvelope),
    StreamFound(StreamDescriptor),
    FalseCall,
    Error(ErrorKind),
    Done,
}

impl MediaEvent {
    /// Invoke the matching sink callback
    pub fn dispatch(self, sink: &dyn PlaybackSink) {
        match self {
            MediaEvent::Start => sink.on_start(),
            MediaEvent::Metadata(metadata) => sink.on_metadata(metadata),
            MediaEvent::StreamFound(stream) => sink.on_stream_found(stream),
            MediaEvent::FalseCall => sink.on_false_call(),
            MediaEvent::Error(kind) => sink.on_error(kind),
            MediaEvent::Done => sink.on_done(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::Start => "start",
            MediaEvent::Metadata(_) => "metadata",
            MediaEvent::StreamFound(_) => "stream_found",
            MediaEvent::FalseCall => "false_call",
            MediaEvent::Error(_) => "error",
            MediaEvent::Done => "done",
        }
    }
}

/// The sink currently receiving events
#[derive(Clone)]
pub enum BoundSink {
    Embedded(Arc<dyn PlaybackSink>),
    External(Arc<dyn PlaybackSink>),
}

impl BoundSink {
    pub fn sink(&self) -> &dyn PlaybackSink {
        match self {
            BoundSink::Embedded(sink) | BoundSink::External(sink) => sink.as_ref(),
        }
    }

    pub fn kind(&self) -> SinkKind {
        match self {
            BoundSink::Embedded(_) => SinkKind::Embedded,
            BoundSink::External(_) => SinkKind::External,
        }
    }
}

impl std::fmt::Debug for BoundSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundSink::{:?}", self.kind())
    }
}

/// Bound sink plus the embedded sink to fall back to
#[derive(Clone)]
pub struct SinkBinding {
    bound: BoundSink,
    real: Option<Arc<dyn PlaybackSink>>,
}

impl std::fmt::Debug for SinkBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkBinding")
            .field("bound", &self.bound)
            .field("has_real", &self.has_real())
            .finish()
    }
}

impl SinkBinding {
    /// Embedded player bound; it is also the fallback
    pub fn embedded(sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            bound: BoundSink::Embedded(sink.clone()),
            real: Some(sink),
        }
    }

    /// External player bound with no embedded fallback
    pub fn external(sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            bound: BoundSink::External(sink),
            real: None,
        }
    }

    pub fn bound(&self) -> &BoundSink {
        &self.bound
    }

    pub fn has_real(&self) -> bool {
        self.real.is_some()
    }

    /// True when events go to the embedded fallback sink
    pub fn is_real_bound(&self) -> bool {
        match (&self.bound, &self.real) {
            (BoundSink::Embedded(bound), Some(real)) => Arc::ptr_eq(bound, real),
            _ => false,
        }
    }

    /// Rebind the embedded sink if one exists. Returns true if the binding changed.
    pub fn restore_real(&mut self) -> bool {
        match &self.real {
            Some(real) if !self.is_real_bound() => {
                self.bound = BoundSink::Embedded(real.clone());
                true
            }
            _ => false,
        }
    }

    /// Hand playback to an external player, keeping the fallback
    pub fn bind_external(&mut self, sink: Arc<dyn PlaybackSink>) {
        self.bound = BoundSink::External(sink);
    }

    pub fn dispatch(&self, event: MediaEvent) {
        event.dispatch(self.bound.sink());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<&'static str>>);

    impl PlaybackSink for Log {
        fn on_start(&self) {
            self.0.lock().push("start");
        }
        fn on_metadata(&self, _metadata: MetadataEnvelope) {
            self.0.lock().push("metadata");
        }
        fn on_stream_found(&self, _stream: StreamDescriptor) {
            self.0.lock().push("stream");
        }
        fn on_false_call(&self) {
            self.0.lock().push("false_call");
        }
        fn on_error(&self, _kind: ErrorKind) {
            self.0.lock().push("error");
        }
    }

    #[test]
    fn test_dispatch_routes_events() {
        let log = Log::default();
        MediaEvent::Start.dispatch(&log);
        MediaEvent::FalseCall.dispatch(&log);
        MediaEvent::Error(ErrorKind::Metadata).dispatch(&log);
        MediaEvent::Done.dispatch(&log);
        assert_eq!(*log.0.lock(), vec!["start", "false_call", "error"]);
    }

    #[test]
    fn test_binding_fallback() {
        let embedded: Arc<dyn PlaybackSink> = Arc::new(Log::default());
        let external: Arc<dyn PlaybackSink> = Arc::new(Log::default());

        let mut binding = SinkBinding::embedded(embedded);
        assert!(binding.is_real_bound());
        assert!(!binding.restore_real());

        binding.bind_external(external);
        assert!(!binding.is_real_bound());
        assert_eq!(binding.bound().kind(), SinkKind::External);

        assert!(binding.restore_real());
        assert!(binding.is_real_bound());
    }

    #[test]
    fn test_external_only_binding_never_real() {
        let mut binding = SinkBinding::external(Arc::new(Log::default()));
        assert!(!binding.has_real());
        assert!(!binding.restore_real());
        assert!(!binding.is_real_bound());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_string(&MediaEvent::Error(ErrorKind::MalformedManifest)).unwrap();
        assert_eq!(json, r#"{"event":"error","data":"malformed_manifest"}"#);
    }
}
