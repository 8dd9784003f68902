//! Interceptor - entry point for observed video requests
//!
//! Coordinates:
//! - URL normalization
//! - Session decisions (pass through, cancel, activate)
//! - Background metadata and manifest tasks
//! - Sink binding (embedded player, external player)
//! - Player control commands

use crate::{
    coordinator::{
        Activation, DeliveryGuard, LogNotifier, MetadataProvider, Notifier, StreamProvider,
        TaskCoordinator, TaskOutcome, TaskReport,
    },
    normalize::normalize,
    relay::{CommandExecutor, CommandRelay},
    request::PlaybackRequest,
    session::{Decision, Session, SessionState},
    sink::{MediaEvent, PlaybackSink, SinkBinding, SinkKind},
    types::{Command, InterceptorConfig, InterceptorId, SyntheticResponse, VideoClassification},
    Error, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// User preferences consulted on every request
pub trait Preferences: Send + Sync {
    fn video_classification(&self) -> VideoClassification;

    fn use_external_player(&self) -> bool;
}

/// Preferences fixed at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPreferences {
    pub classification: VideoClassification,
    pub use_external_player: bool,
}

impl From<&InterceptorConfig> for StaticPreferences {
    fn from(config: &InterceptorConfig) -> Self {
        Self {
            classification: config.classification,
            use_external_player: config.use_external_player,
        }
    }
}

impl Preferences for StaticPreferences {
    fn video_classification(&self) -> VideoClassification {
        self.classification
    }

    fn use_external_player(&self) -> bool {
        self.use_external_player
    }
}

/// Result of processing one request
#[derive(Debug)]
pub struct Interception {
    pub decision: Decision,
    /// Body to serve instead of the real response; always `None` for now
    pub response: Option<SyntheticResponse>,
    /// Background tasks, present on activation
    pub activation: Option<Activation>,
}

/// State touched only by the control side
struct Control {
    session: Session,
    reports: mpsc::UnboundedReceiver<TaskReport>,
    current: Option<PlaybackRequest>,
}

impl Control {
    fn drain_reports(&mut self) {
        while let Ok(report) = self.reports.try_recv() {
            let applied = match report.outcome {
                TaskOutcome::Completed { .. } => self.session.complete(report.generation),
                TaskOutcome::Failed { .. } => self.session.fail(report.generation),
            };
            if !applied {
                debug!(generation = report.generation, "Ignoring stale task report");
            }
        }
    }
}

/// Decides what to do with each intercepted request
pub struct Interceptor {
    id: InterceptorId,
    config: InterceptorConfig,
    preferences: Arc<dyn Preferences>,
    control: Mutex<Control>,
    guard: Arc<DeliveryGuard>,
    coordinator: TaskCoordinator,
    relay: CommandRelay,
}

impl Interceptor {
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::default()
    }

    pub fn id(&self) -> InterceptorId {
        self.id
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Whether `url` belongs to the handled family. Every request qualifies.
    pub fn handles(&self, _url: &str) -> bool {
        true
    }

    /// Interception entry point. Returns immediately; work happens in the background.
    pub fn intercept(&self, url: &str) -> Option<SyntheticResponse> {
        self.process(url).response
    }

    /// Like [`Interceptor::intercept`] but also reports the decision and task handles
    #[instrument(skip(self), fields(interceptor = %self.id))]
    pub fn process(&self, url: &str) -> Interception {
        debug!("Video intercepted");

        if !self.handles(url) {
            return Interception {
                decision: Decision::PassThrough,
                response: None,
                activation: None,
            };
        }

        let classification = self.preferences.video_classification();
        let request = PlaybackRequest::parse(normalize(url, classification));
        debug!(client = ?request.client(), video_id = ?request.video_id(), "Request parsed");

        // Lock order is control, then the guard. The guard lock is never held
        // across a sink callback, so nothing here waits on a sink.
        let decision = {
            let mut control = self.control.lock();
            control.drain_reports();
            control.current = Some(request.clone());

            // playback may have been handed to an external player last time
            self.guard.rebind(None, |binding| binding.restore_real());

            let decision = control.session.decide(&request, self.config.cancel_policy);
            if let Decision::Activate { generation } = decision {
                self.guard.advance(generation);
            }
            decision
        };

        let activation = match decision {
            Decision::Activate { generation } => Some(self.coordinator.launch(generation, request)),
            Decision::Cancel { false_call } => {
                info!(url = %request.url(), "Video canceled");
                if false_call {
                    self.guard.deliver_now(MediaEvent::FalseCall);
                }
                None
            }
            Decision::PassThrough => None,
        };

        Interception {
            decision,
            response: None,
            activation,
        }
    }

    /// Hand the current request to `sink` under a fresh generation
    #[instrument(skip(self, sink), fields(interceptor = %self.id))]
    pub fn open_externally(&self, sink: Arc<dyn PlaybackSink>) -> Option<Activation> {
        let (generation, request) = {
            let mut control = self.control.lock();
            let Some(request) = control.current.clone() else {
                warn!("Nothing to open externally");
                return None;
            };
            let generation = control.session.reactivate();
            self.guard.rebind(Some(generation), |binding| binding.bind_external(sink));
            (generation, request)
        };

        info!(generation, "Opening externally");
        Some(self.coordinator.launch(generation, request))
    }

    /// Close the player. No-op while an external player is bound.
    pub fn close_video(&self) -> bool {
        if !self.guard.is_real_bound() {
            debug!("Ignoring close, external player bound");
            return false;
        }
        self.relay.relay(Command::Close);
        self.control.lock().session.on_cancel();
        true
    }

    /// Skip to the next video. No-op while an external player is bound.
    pub fn jump_to_next_video(&self) -> bool {
        if !self.guard.is_real_bound() {
            debug!("Ignoring next, external player bound");
            return false;
        }
        self.relay.relay(Command::Next);
        self.control.lock().session.on_continue();
        true
    }

    /// Relay an arbitrary command
    pub fn update_last_command(&self, command: Command) {
        self.relay.relay(command);
    }

    pub fn relay(&self) -> &CommandRelay {
        &self.relay
    }

    /// The sink shows its first frame
    pub fn on_player_opened(&self) {
        self.control.lock().session.on_open();
    }

    /// The sink was dismissed
    pub fn on_player_closed(&self) {
        self.control.lock().session.on_closed();
    }

    pub fn state(&self) -> SessionState {
        let mut control = self.control.lock();
        control.drain_reports();
        control.session.state()
    }

    pub fn generation(&self) -> u64 {
        self.control.lock().session.generation()
    }

    pub fn is_open(&self) -> bool {
        self.control.lock().session.is_open()
    }

    /// Last intercepted URL after normalization
    pub fn current_url(&self) -> Option<String> {
        self.control
            .lock()
            .current
            .as_ref()
            .map(|request| request.url().to_string())
    }

    pub fn bound_sink(&self) -> SinkKind {
        self.guard.bound_kind()
    }
}

/// Builder for [`Interceptor`]
#[derive(Default)]
pub struct InterceptorBuilder {
    config: InterceptorConfig,
    preferences: Option<Arc<dyn Preferences>>,
    embedded: Option<Arc<dyn PlaybackSink>>,
    external: Option<Arc<dyn PlaybackSink>>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    streams: Option<Arc<dyn StreamProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
    executor: Option<Arc<dyn CommandExecutor>>,
    runtime: Option<Handle>,
}

impl InterceptorBuilder {
    pub fn config(mut self, config: InterceptorConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to the classification and player choice from the config
    pub fn preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn embedded_sink(mut self, sink: Arc<dyn PlaybackSink>) -> Self {
        self.embedded = Some(sink);
        self
    }

    pub fn external_sink(mut self, sink: Arc<dyn PlaybackSink>) -> Self {
        self.external = Some(sink);
        self
    }

    pub fn metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    pub fn stream_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.streams = Some(provider);
        self
    }

    /// Defaults to [`LogNotifier`]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn command_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Defaults to the runtime `build` is called from
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Interceptor> {
        self.config.validate()?;

        let preferences = self
            .preferences
            .unwrap_or_else(|| Arc::new(StaticPreferences::from(&self.config)) as Arc<dyn Preferences>);

        let binding = if preferences.use_external_player() {
            let sink = self.external.ok_or_else(|| {
                Error::InvalidConfig("external player requested but no external sink set".into())
            })?;
            SinkBinding::external(sink)
        } else {
            let sink = self
                .embedded
                .ok_or_else(|| Error::InvalidConfig("embedded sink is required".into()))?;
            SinkBinding::embedded(sink)
        };

        let metadata = self
            .metadata
            .ok_or_else(|| Error::InvalidConfig("metadata provider is required".into()))?;
        let streams = self
            .streams
            .ok_or_else(|| Error::InvalidConfig("stream provider is required".into()))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::InvalidConfig("command executor is required".into()))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier) as Arc<dyn Notifier>);
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| Error::InvalidConfig(format!("no tokio runtime: {}", e)))?,
        };

        let id = InterceptorId::new();
        let guard = Arc::new(DeliveryGuard::new(binding));
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let coordinator = TaskCoordinator::new(
            guard.clone(),
            metadata,
            streams,
            notifier,
            reports_tx,
            runtime,
            self.config.notice_prefix.clone(),
        );

        info!(
            interceptor = %id,
            external = preferences.use_external_player(),
            policy = ?self.config.cancel_policy,
            "Interceptor created"
        );

        Ok(Interceptor {
            id,
            config: self.config,
            preferences,
            control: Mutex::new(Control {
                session: Session::new(),
                reports: reports_rx,
                current: None,
            }),
            guard,
            coordinator,
            relay: CommandRelay::new(executor),
        })
    }
}
