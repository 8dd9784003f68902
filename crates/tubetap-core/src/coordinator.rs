//! Task coordination
//!
//! Every activation launches two independent background tasks on the runtime:
//! one asks the metadata provider for title info, the other fetches and parses
//! the stream manifest. Neither is ever aborted. Instead, each re-checks its
//! captured generation right before handing anything to the sink and drops
//! the result if a newer activation has happened since.

use crate::{
    error::Error,
    manifest::{parse_stream, ByteStream, ManifestEvents, VideoInfoParser},
    request::PlaybackRequest,
    sink::{MediaEvent, SinkBinding, SinkKind},
    types::{MetadataEnvelope, Notice, StreamDescriptor},
    Result,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

/// Source of video titles and related info. May block; only called from background tasks.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_metadata(
        &self,
        video_id: Option<&str>,
        playlist_id: Option<&str>,
    ) -> Result<MetadataEnvelope>;
}

/// Source of raw manifest bytes for a request
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn get_stream_bytes(&self, request: &PlaybackRequest) -> Result<ByteStream>;
}

/// Presents one-shot messages to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        warn!(code = %notice.code, generation = notice.generation, "{}", notice.message);
    }
}

/// Generation and sink binding, always read and written together
#[derive(Debug)]
struct Guarded {
    generation: u64,
    binding: SinkBinding,
}

/// Current generation plus the sink binding it guards.
///
/// The lock is only held to read or swap the (generation, binding) pair; sink
/// callbacks run after it is released, so a callback may call back into the
/// interceptor and control calls never wait on a slow sink. A delivery either
/// sees the pair from before a rebind or the pair from after it. An event whose
/// generation check passed before an advance is ordered before that advance.
#[derive(Debug)]
pub struct DeliveryGuard {
    state: RwLock<Guarded>,
}

impl DeliveryGuard {
    pub fn new(binding: SinkBinding) -> Self {
        Self {
            state: RwLock::new(Guarded {
                generation: 0,
                binding,
            }),
        }
    }

    pub fn current(&self) -> u64 {
        self.state.read().generation
    }

    /// Deliver `event` if `generation` is still current. Returns false when dropped.
    pub fn deliver(&self, generation: u64, event: MediaEvent) -> bool {
        let sink = {
            let state = self.state.read();
            if state.generation != generation {
                trace!(generation, event = event.name(), "Dropping stale event");
                return false;
            }
            state.binding.bound().clone()
        };
        event.dispatch(sink.sink());
        true
    }

    /// Deliver regardless of generation
    pub fn deliver_now(&self, event: MediaEvent) {
        let sink = self.state.read().binding.bound().clone();
        event.dispatch(sink.sink());
    }

    /// Make `generation` current
    pub fn advance(&self, generation: u64) {
        self.state.write().generation = generation;
    }

    /// Edit the binding and optionally advance, as one step for deliveries.
    /// `edit` must not call into a sink.
    pub fn rebind<R>(&self, generation: Option<u64>, edit: impl FnOnce(&mut SinkBinding) -> R) -> R {
        let mut state = self.state.write();
        let result = edit(&mut state.binding);
        if let Some(generation) = generation {
            state.generation = generation;
        }
        result
    }

    pub fn is_real_bound(&self) -> bool {
        self.state.read().binding.is_real_bound()
    }

    pub fn bound_kind(&self) -> SinkKind {
        self.state.read().binding.bound().kind()
    }
}

/// How the manifest task of one activation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { streams: usize },
    Failed { code: &'static str },
}

/// Manifest task result sent back to the control side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub generation: u64,
    pub outcome: TaskOutcome,
}

/// Handles of the two tasks launched for one activation
#[derive(Debug)]
pub struct Activation {
    pub generation: u64,
    pub metadata: JoinHandle<()>,
    pub manifest: JoinHandle<()>,
}

impl Activation {
    /// Wait for both tasks. Panics inside a task are logged, not propagated.
    pub async fn join(self) {
        let (metadata, manifest) = tokio::join!(self.metadata, self.manifest);
        for (task, result) in [("metadata", metadata), ("manifest", manifest)] {
            if let Err(e) = result {
                warn!(task, generation = self.generation, error = %e, "Background task aborted");
            }
        }
    }
}

/// Forwards parser callbacks to the sink under the generation guard
struct GuardedEvents<'a> {
    guard: &'a DeliveryGuard,
    generation: u64,
    delivered: usize,
    dropped: usize,
}

impl ManifestEvents for GuardedEvents<'_> {
    fn on_stream_found(&mut self, stream: StreamDescriptor) {
        if self.guard.deliver(self.generation, MediaEvent::StreamFound(stream)) {
            self.delivered += 1;
        } else {
            self.dropped += 1;
        }
    }

    fn on_done(&mut self) {
        self.guard.deliver(self.generation, MediaEvent::Done);
    }
}

/// Launches and supervises the background work of each activation
pub struct TaskCoordinator {
    guard: Arc<DeliveryGuard>,
    metadata: Arc<dyn MetadataProvider>,
    streams: Arc<dyn StreamProvider>,
    notifier: Arc<dyn Notifier>,
    reports: mpsc::UnboundedSender<TaskReport>,
    runtime: Handle,
    notice_prefix: String,
}

impl TaskCoordinator {
    pub fn new(
        guard: Arc<DeliveryGuard>,
        metadata: Arc<dyn MetadataProvider>,
        streams: Arc<dyn StreamProvider>,
        notifier: Arc<dyn Notifier>,
        reports: mpsc::UnboundedSender<TaskReport>,
        runtime: Handle,
        notice_prefix: impl Into<String>,
    ) -> Self {
        Self {
            guard,
            metadata,
            streams,
            notifier,
            reports,
            runtime,
            notice_prefix: notice_prefix.into(),
        }
    }

    /// Signal `Start` and spawn both tasks. Never blocks on I/O.
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub fn launch(&self, generation: u64, request: PlaybackRequest) -> Activation {
        self.guard.deliver(generation, MediaEvent::Start);

        let metadata = self.spawn_metadata(generation, &request);
        let manifest = self.spawn_manifest(generation, request);

        debug!(generation, "Background tasks launched");
        Activation { generation, metadata, manifest }
    }

    fn spawn_metadata(&self, generation: u64, request: &PlaybackRequest) -> JoinHandle<()> {
        let guard = self.guard.clone();
        let provider = self.metadata.clone();
        let video_id = request.video_id().map(str::to_owned);
        let playlist_id = request.playlist_id().map(str::to_owned);

        self.runtime.spawn(async move {
            let event = match provider
                .get_metadata(video_id.as_deref(), playlist_id.as_deref())
                .await
            {
                Ok(metadata) => MediaEvent::Metadata(metadata),
                Err(e) => {
                    warn!(generation, error = %e, code = e.error_code(), "Metadata fetch failed");
                    MediaEvent::Error(e.kind())
                }
            };

            if !guard.deliver(generation, event) {
                debug!(generation, "Metadata dropped, session moved on");
            }
        })
    }

    fn spawn_manifest(&self, generation: u64, request: PlaybackRequest) -> JoinHandle<()> {
        let guard = self.guard.clone();
        let provider = self.streams.clone();
        let notifier = self.notifier.clone();
        let reports = self.reports.clone();
        let prefix = self.notice_prefix.clone();

        self.runtime.spawn(async move {
            let mut events = GuardedEvents {
                guard: &guard,
                generation,
                delivered: 0,
                dropped: 0,
            };

            let outcome = match fetch_and_parse(provider.as_ref(), &request, &mut events).await {
                Ok(streams) => {
                    info!(
                        generation,
                        streams,
                        delivered = events.delivered,
                        dropped = events.dropped,
                        "Manifest parsed"
                    );
                    TaskOutcome::Completed { streams }
                }
                Err(e) => {
                    warn!(generation, error = %e, code = e.error_code(), "Manifest task failed");
                    report_failure(&e, &request, generation, &prefix, notifier.as_ref(), &guard);
                    TaskOutcome::Failed { code: e.error_code() }
                }
            };

            if reports.send(TaskReport { generation, outcome }).is_err() {
                debug!(generation, "Dropping task report, interceptor gone");
            }
        })
    }
}

async fn fetch_and_parse(
    provider: &dyn StreamProvider,
    request: &PlaybackRequest,
    events: &mut GuardedEvents<'_>,
) -> Result<usize> {
    let stream = provider.get_stream_bytes(request).await?;
    debug!("Video manifest received");
    parse_stream(VideoInfoParser::new(), stream, events).await
}

/// Manifest and fetch failures become a user notice; anything else goes to the sink
fn report_failure(
    error: &Error,
    request: &PlaybackRequest,
    generation: u64,
    prefix: &str,
    notifier: &dyn Notifier,
    guard: &DeliveryGuard,
) {
    if error.is_notice_worthy() {
        notifier.notify(Notice {
            code: error.error_code().to_string(),
            message: format!("{}: {}", prefix, request.url()),
            generation,
            timestamp: Utc::now(),
        });
    } else {
        guard.deliver(generation, MediaEvent::Error(error.kind()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::manifest::byte_stream;
    use crate::sink::PlaybackSink;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl PlaybackSink for Recorder {
        fn on_start(&self) {
            self.0.lock().push("start".into());
        }
        fn on_metadata(&self, metadata: MetadataEnvelope) {
            self.0.lock().push(format!("metadata:{}", metadata.video_id));
        }
        fn on_stream_found(&self, stream: StreamDescriptor) {
            self.0.lock().push(format!("stream:{}", stream.itag.unwrap_or_default()));
        }
        fn on_false_call(&self) {
            self.0.lock().push("false_call".into());
        }
        fn on_error(&self, kind: ErrorKind) {
            self.0.lock().push(format!("error:{}", kind));
        }
        fn on_done(&self) {
            self.0.lock().push("done".into());
        }
    }

    struct Fixed;

    #[async_trait]
    impl MetadataProvider for Fixed {
        async fn get_metadata(
            &self,
            video_id: Option<&str>,
            playlist_id: Option<&str>,
        ) -> Result<MetadataEnvelope> {
            match video_id {
                Some(id) => Ok(MetadataEnvelope::new(id, playlist_id.map(str::to_owned))),
                None => Err(Error::Metadata {
                    video_id: String::new(),
                    reason: "no id".into(),
                }),
            }
        }
    }

    #[async_trait]
    impl StreamProvider for Fixed {
        async fn get_stream_bytes(&self, request: &PlaybackRequest) -> Result<ByteStream> {
            match request.video_id() {
                Some("broken") => Err(Error::unavailable("404")),
                Some("internal") => Err(Error::Internal("bug".into())),
                _ => Ok(byte_stream("status=ok&adaptive_fmts=itag%3D140%26url%3Dhttps%253A%252F%252Fr.example%252Fa")),
            }
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<Notice>>);

    impl Notifier for Notices {
        fn notify(&self, notice: Notice) {
            self.0.lock().push(notice);
        }
    }

    fn setup() -> (
        Arc<Recorder>,
        Arc<DeliveryGuard>,
        Arc<Notices>,
        TaskCoordinator,
        mpsc::UnboundedReceiver<TaskReport>,
    ) {
        let sink = Arc::new(Recorder::default());
        let guard = Arc::new(DeliveryGuard::new(SinkBinding::embedded(sink.clone())));
        let notices = Arc::new(Notices::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = TaskCoordinator::new(
            guard.clone(),
            Arc::new(Fixed),
            Arc::new(Fixed),
            notices.clone(),
            tx,
            Handle::current(),
            "Url doesn't exist or broken",
        );
        (sink, guard, notices, coordinator, rx)
    }

    #[tokio::test]
    async fn test_launch_delivers_everything() {
        let (sink, guard, notices, coordinator, mut rx) = setup();
        guard.advance(1);
        coordinator
            .launch(1, PlaybackRequest::parse("https://h/get_video_info?video_id=V1"))
            .join()
            .await;

        let events = sink.0.lock().clone();
        assert_eq!(events[0], "start");
        assert!(events.contains(&"metadata:V1".to_string()));
        assert!(events.contains(&"stream:140".to_string()));
        assert!(events.contains(&"done".to_string()));
        assert!(notices.0.lock().is_empty());
        assert_eq!(
            rx.recv().await.unwrap(),
            TaskReport { generation: 1, outcome: TaskOutcome::Completed { streams: 1 } }
        );
    }

    #[tokio::test]
    async fn test_tasks_finish_after_reports_receiver_dropped() {
        let (sink, guard, _notices, coordinator, rx) = setup();
        drop(rx);
        guard.advance(1);
        let activation =
            coordinator.launch(1, PlaybackRequest::parse("https://h/get_video_info?video_id=V1"));
        assert!(activation.metadata.await.is_ok());
        assert!(activation.manifest.await.is_ok());
        assert!(sink.0.lock().contains(&"done".to_string()));
    }

    #[tokio::test]
    async fn test_stale_generation_drops_events() {
        let (sink, guard, _notices, coordinator, _rx) = setup();
        guard.advance(2);
        coordinator
            .launch(1, PlaybackRequest::parse("https://h/get_video_info?video_id=V1"))
            .join()
            .await;
        assert!(sink.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_stream_becomes_notice() {
        let (sink, guard, notices, coordinator, mut rx) = setup();
        guard.advance(1);
        let url = "https://h/get_video_info?video_id=broken";
        coordinator.launch(1, PlaybackRequest::parse(url)).join().await;

        let notices = notices.0.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, format!("Url doesn't exist or broken: {}", url));
        assert_eq!(notices[0].code, "STREAM_UNAVAILABLE");
        assert!(!sink.0.lock().iter().any(|e| e.starts_with("stream:") || e.starts_with("error:")));
        assert_eq!(
            rx.recv().await.unwrap().outcome,
            TaskOutcome::Failed { code: "STREAM_UNAVAILABLE" }
        );
    }

    #[tokio::test]
    async fn test_unexpected_failure_goes_to_sink() {
        let (sink, guard, notices, coordinator, _rx) = setup();
        guard.advance(1);
        coordinator
            .launch(1, PlaybackRequest::parse("https://h/get_video_info?video_id=internal"))
            .join()
            .await;
        assert!(notices.0.lock().is_empty());
        assert!(sink.0.lock().contains(&"error:internal".to_string()));
    }

    #[tokio::test]
    async fn test_metadata_failure_goes_to_sink() {
        let (sink, guard, _notices, coordinator, _rx) = setup();
        guard.advance(1);
        coordinator
            .launch(1, PlaybackRequest::parse("https://h/get_video_info?list=PL1"))
            .join()
            .await;
        assert!(sink.0.lock().contains(&"error:metadata".to_string()));
    }

    #[test]
    fn test_rebind_advances_atomically() {
        let guard = DeliveryGuard::new(SinkBinding::embedded(Arc::new(Recorder::default())));
        let changed = guard.rebind(Some(5), |binding| {
            binding.bind_external(Arc::new(Recorder::default()));
            true
        });
        assert!(changed);
        assert_eq!(guard.current(), 5);
        assert_eq!(guard.bound_kind(), SinkKind::External);
        assert!(!guard.is_real_bound());
    }

    /// Blocks inside `on_start` until released
    struct Blocking {
        entered: std::sync::mpsc::Sender<()>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl PlaybackSink for Blocking {
        fn on_start(&self) {
            let _ = self.entered.send(());
            let _ = self.release.lock().recv();
        }
        fn on_metadata(&self, _metadata: MetadataEnvelope) {}
        fn on_stream_found(&self, _stream: StreamDescriptor) {}
        fn on_false_call(&self) {}
        fn on_error(&self, _kind: ErrorKind) {}
    }

    #[test]
    fn test_rebind_does_not_wait_for_sink_callback() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let sink = Arc::new(Blocking {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let guard = Arc::new(DeliveryGuard::new(SinkBinding::embedded(sink)));
        guard.advance(1);

        let delivering = {
            let guard = guard.clone();
            std::thread::spawn(move || guard.deliver(1, MediaEvent::Start))
        };
        entered_rx.recv().unwrap();

        // the callback is still running; swapping the binding must not wait for it
        let external = Arc::new(Recorder::default());
        guard.rebind(Some(2), |binding| binding.bind_external(external.clone()));
        assert_eq!(guard.current(), 2);
        assert!(!guard.deliver(1, MediaEvent::Done));
        assert!(external.0.lock().is_empty());

        release_tx.send(()).unwrap();
        assert!(delivering.join().unwrap());
        assert!(external.0.lock().is_empty());
    }

    #[test]
    fn test_deliveries_never_reach_a_sink_bound_later() {
        let embedded = Arc::new(Recorder::default());
        let external = Arc::new(Recorder::default());
        let guard = Arc::new(DeliveryGuard::new(SinkBinding::embedded(embedded.clone())));
        guard.advance(1);

        let delivering = {
            let guard = guard.clone();
            std::thread::spawn(move || {
                let mut delivered = 0;
                for _ in 0..10_000 {
                    if guard.deliver(1, MediaEvent::Done) {
                        delivered += 1;
                    }
                }
                delivered
            })
        };

        std::thread::yield_now();
        guard.rebind(Some(2), |binding| binding.bind_external(external.clone()));
        let delivered = delivering.join().unwrap();

        assert!(external.0.lock().is_empty());
        assert_eq!(embedded.0.lock().len(), delivered);
        assert!(!guard.deliver(1, MediaEvent::Done));
    }
}
