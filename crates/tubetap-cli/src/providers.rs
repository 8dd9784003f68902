//! File-backed collaborators for driving an interceptor without a browser

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tubetap_core::{
    manifest::chunked_stream, ByteStream, Command, CommandExecutor, Error, ErrorKind,
    MediaEvent, MetadataEnvelope, MetadataProvider, Notice, Notifier, PlaybackRequest,
    PlaybackSink, StreamDescriptor, StreamProvider,
};

/// Manifests are handed out in chunks of this size to exercise incremental parsing
const CHUNK_SIZE: usize = 4096;

/// Serves `<dir>/<video_id>` as the manifest body
pub struct FileStreamProvider {
    dir: PathBuf,
}

impl FileStreamProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl StreamProvider for FileStreamProvider {
    async fn get_stream_bytes(&self, request: &PlaybackRequest) -> tubetap_core::Result<ByteStream> {
        let video_id = request
            .video_id()
            .ok_or_else(|| Error::unavailable("request carries no video id"))?;

        let path = self.dir.join(video_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::unavailable(format!("no manifest at {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        let chunks = body
            .chunks(CHUNK_SIZE)
            .map(Bytes::copy_from_slice)
            .collect();
        Ok(chunked_stream(chunks))
    }
}

/// Reads `<dir>/<video_id>.json` when present, otherwise returns a bare envelope
pub struct FileMetadataProvider {
    dir: Option<PathBuf>,
}

impl FileMetadataProvider {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    async fn load(dir: &Path, video_id: &str) -> tubetap_core::Result<Option<serde_json::Value>> {
        let path = dir.join(format!("{}.json", video_id));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MetadataProvider for FileMetadataProvider {
    async fn get_metadata(
        &self,
        video_id: Option<&str>,
        playlist_id: Option<&str>,
    ) -> tubetap_core::Result<MetadataEnvelope> {
        let video_id = video_id.ok_or_else(|| Error::Metadata {
            video_id: String::new(),
            reason: "request carries no video id".into(),
        })?;

        let mut envelope = MetadataEnvelope::new(video_id, playlist_id.map(str::to_owned));
        let Some(dir) = &self.dir else {
            return Ok(envelope);
        };

        let document = Self::load(dir, video_id).await.map_err(|e| Error::Metadata {
            video_id: video_id.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(mut document) = document {
            if let Some(fields) = document.as_object_mut() {
                envelope.title = fields
                    .remove("title")
                    .and_then(|v| v.as_str().map(str::to_owned));
                envelope.author = fields
                    .remove("author")
                    .and_then(|v| v.as_str().map(str::to_owned));
            }
            envelope.extra = document;
        }
        Ok(envelope)
    }
}

/// Logs and records every event it receives
pub struct LoggingSink {
    name: &'static str,
    events: Mutex<Vec<MediaEvent>>,
}

impl LoggingSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<MediaEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: MediaEvent) {
        info!(sink = self.name, event = event.name(), "Sink event");
        self.events.lock().push(event);
    }
}

impl PlaybackSink for LoggingSink {
    fn on_start(&self) {
        self.record(MediaEvent::Start);
    }

    fn on_metadata(&self, metadata: MetadataEnvelope) {
        self.record(MediaEvent::Metadata(metadata));
    }

    fn on_stream_found(&self, stream: StreamDescriptor) {
        self.record(MediaEvent::StreamFound(stream));
    }

    fn on_false_call(&self) {
        self.record(MediaEvent::FalseCall);
    }

    fn on_error(&self, kind: ErrorKind) {
        self.record(MediaEvent::Error(kind));
    }

    fn on_done(&self) {
        self.record(MediaEvent::Done);
    }
}

/// Prints notices to stderr and keeps them for the summary
#[derive(Default)]
pub struct StderrNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl StderrNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        warn!(code = %notice.code, generation = notice.generation, "Notice raised");
        eprintln!("{}", notice.message);
        self.notices.lock().push(notice);
    }
}

/// One relayed command
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubmittedCommand {
    pub command: Command,
    pub force_run: bool,
}

/// Logs commands instead of running them on a page
#[derive(Default)]
pub struct LoggingExecutor {
    submitted: Mutex<Vec<SubmittedCommand>>,
}

impl LoggingExecutor {
    pub fn submitted(&self) -> Vec<SubmittedCommand> {
        self.submitted.lock().clone()
    }
}

impl CommandExecutor for LoggingExecutor {
    fn submit(&self, command: Command, force_run: bool) {
        info!(%command, force_run, "Command submitted");
        self.submitted.lock().push(SubmittedCommand { command, force_run });
    }
}
