//! CLI command implementations

use crate::output::format_output;
use crate::providers::{
    FileMetadataProvider, FileStreamProvider, LoggingExecutor, LoggingSink, StderrNotifier,
    SubmittedCommand,
};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tracing::{debug, info};
use tubetap_core::{
    manifest::{byte_stream, parse_stream, VideoInfoParser},
    normalize::{force_html5_client, strip_tracking_params, unlock_60fps_formats},
    Activation, Decision, Interceptor, InterceptorConfig, MediaEvent, Notice, SessionState,
    SinkKind, StreamDescriptor, VideoClassification,
};

// =============================================================================
// normalize
// =============================================================================

#[derive(Serialize, Tabled)]
struct RewriteRow {
    strategy: String,
    url: String,
}

impl std::fmt::Display for RewriteRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<22} {}", self.strategy, self.url)
    }
}

#[derive(Serialize)]
struct NormalizeReport<'a> {
    input: &'a str,
    classification: VideoClassification,
    normalized: &'a str,
    rewrites: &'a [RewriteRow],
}

/// Show how a request URL is rewritten
pub fn normalize(url: &str, classification: &str, format: &str) -> anyhow::Result<()> {
    let classification: VideoClassification = classification.parse()?;
    let normalized = tubetap_core::normalize(url, classification);

    let rows = vec![
        RewriteRow {
            strategy: format!("classification:{}", classification),
            url: normalized.clone(),
        },
        RewriteRow {
            strategy: "force_html5_client".into(),
            url: force_html5_client(url),
        },
        RewriteRow {
            strategy: "unlock_60fps_formats".into(),
            url: unlock_60fps_formats(url),
        },
        RewriteRow {
            strategy: "strip_tracking_params".into(),
            url: strip_tracking_params(url),
        },
    ];

    let report = NormalizeReport {
        input: url,
        classification,
        normalized: &normalized,
        rewrites: &rows,
    };
    println!("{}", format_output(&report, &rows, format));
    Ok(())
}

// =============================================================================
// parse
// =============================================================================

#[derive(Serialize, Tabled)]
struct StreamRow {
    itag: String,
    kind: String,
    mime: String,
    quality: String,
    bitrate: String,
    url: String,
}

impl From<&StreamDescriptor> for StreamRow {
    fn from(stream: &StreamDescriptor) -> Self {
        let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
        Self {
            itag: or_dash(stream.itag.map(|i| i.to_string())),
            kind: match (stream.is_playlist(), stream.is_audio_only()) {
                (true, _) => format!("{:?} playlist", stream.kind).to_lowercase(),
                (false, true) => format!("{:?} audio", stream.kind).to_lowercase(),
                (false, false) => format!("{:?}", stream.kind).to_lowercase(),
            },
            mime: or_dash(stream.mime_type.clone()),
            quality: or_dash(
                stream
                    .quality_label
                    .clone()
                    .or_else(|| stream.resolution.map(|r| r.quality_name().to_string())),
            ),
            bitrate: or_dash(stream.bitrate.map(|b| b.to_string())),
            url: stream.url.clone(),
        }
    }
}

impl std::fmt::Display for StreamRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>4} {:<8} {:<11} {:<7} {}",
            self.itag, self.kind, self.mime, self.quality, self.url
        )
    }
}

/// List the streams of a video info manifest
pub async fn parse(file: &Path, format: &str) -> anyhow::Result<()> {
    let body = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut streams: Vec<StreamDescriptor> = Vec::new();
    let count = parse_stream(VideoInfoParser::new(), byte_stream(body), &mut streams)
        .await
        .with_context(|| format!("failed to parse {}", file.display()))?;
    info!(count, "Manifest parsed");

    let rows: Vec<StreamRow> = streams.iter().map(StreamRow::from).collect();
    println!("{}", format_output(&streams, &rows, format));
    Ok(())
}

// =============================================================================
// replay
// =============================================================================

/// Settings for [`replay`]
pub struct ReplayOptions {
    pub manifests: PathBuf,
    pub metadata: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub external: bool,
    pub settle_ms: u64,
}

/// One line of a request log
#[derive(Debug, PartialEq, Eq)]
enum ReplayLine<'a> {
    Opened,
    Closed,
    CloseVideo,
    NextVideo,
    OpenExternally,
    Request(&'a str),
}

impl<'a> ReplayLine<'a> {
    /// `None` for blank lines and `#` comments
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some(match line {
            "open" => ReplayLine::Opened,
            "closed" => ReplayLine::Closed,
            "close" => ReplayLine::CloseVideo,
            "next" => ReplayLine::NextVideo,
            "external" => ReplayLine::OpenExternally,
            url => ReplayLine::Request(url),
        })
    }
}

fn describe(decision: Decision) -> String {
    match decision {
        Decision::PassThrough => "pass through".to_string(),
        Decision::Cancel { false_call: false } => "cancel".to_string(),
        Decision::Cancel { false_call: true } => "cancel (false call)".to_string(),
        Decision::Activate { generation } => format!("activate #{}", generation),
    }
}

#[derive(Serialize, Tabled)]
struct StepRow {
    line: usize,
    input: String,
    outcome: String,
    state: SessionState,
}

impl std::fmt::Display for StepRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>3}  {:<20} {:<10} {}",
            self.line, self.outcome, self.state, self.input
        )
    }
}

#[derive(Serialize)]
struct ReplaySummary {
    steps: Vec<StepRow>,
    generation: u64,
    state: SessionState,
    bound_sink: SinkKind,
    embedded_events: Vec<MediaEvent>,
    external_events: Vec<MediaEvent>,
    notices: Vec<Notice>,
    commands: Vec<SubmittedCommand>,
}

/// Feed a request log through an interceptor backed by local files
pub async fn replay(requests: &Path, options: ReplayOptions, format: &str) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => InterceptorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => InterceptorConfig::default(),
    };
    if options.external {
        config.use_external_player = true;
    }

    let content = tokio::fs::read_to_string(requests)
        .await
        .with_context(|| format!("failed to read {}", requests.display()))?;

    let embedded = Arc::new(LoggingSink::new("embedded"));
    let external = Arc::new(LoggingSink::new("external"));
    let notifier = Arc::new(StderrNotifier::default());
    let executor = Arc::new(LoggingExecutor::default());
    let streams = Arc::new(FileStreamProvider::new(&options.manifests));

    let interceptor = Interceptor::builder()
        .config(config)
        .embedded_sink(embedded.clone())
        .external_sink(external.clone())
        .metadata_provider(Arc::new(FileMetadataProvider::new(options.metadata.clone())))
        .stream_provider(streams)
        .notifier(notifier.clone())
        .command_executor(executor.clone())
        .build()?;

    info!(
        interceptor = %interceptor.id(),
        policy = ?interceptor.config().cancel_policy,
        requests = %requests.display(),
        "Replaying"
    );

    let mut activations: Vec<Activation> = Vec::new();
    let mut steps = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let Some(line) = ReplayLine::parse(raw) else {
            continue;
        };
        debug!(line = index + 1, ?line, "Replay step");

        let outcome = match line {
            ReplayLine::Opened => {
                interceptor.on_player_opened();
                "opened".to_string()
            }
            ReplayLine::Closed => {
                interceptor.on_player_closed();
                "dismissed".to_string()
            }
            ReplayLine::CloseVideo => applied(&interceptor, "close", interceptor.close_video()),
            ReplayLine::NextVideo => {
                applied(&interceptor, "next", interceptor.jump_to_next_video())
            }
            ReplayLine::OpenExternally => match interceptor.open_externally(external.clone()) {
                Some(activation) => {
                    let outcome = format!("external #{}", activation.generation);
                    activations.push(activation);
                    outcome
                }
                None => "external ignored".to_string(),
            },
            ReplayLine::Request(url) => {
                let interception = interceptor.process(url);
                activations.extend(interception.activation);
                describe(interception.decision)
            }
        };

        steps.push(StepRow {
            line: index + 1,
            input: raw.trim().to_string(),
            outcome,
            state: interceptor.state(),
        });

        if options.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.settle_ms)).await;
        }
    }

    for activation in activations {
        activation.join().await;
    }

    let summary = ReplaySummary {
        generation: interceptor.generation(),
        state: interceptor.state(),
        bound_sink: interceptor.bound_sink(),
        embedded_events: embedded.events(),
        external_events: external.events(),
        notices: notifier.notices(),
        commands: executor.submitted(),
        steps,
    };

    println!("{}", format_output(&summary, &summary.steps, format));
    if format != "json" {
        println!(
            "\ngeneration {} | state {} | {} embedded / {} external events | {} notices",
            summary.generation,
            summary.state,
            summary.embedded_events.len(),
            summary.external_events.len(),
            summary.notices.len()
        );
    }
    Ok(())
}

/// The logging executor runs commands as soon as they are submitted, so the
/// relay's pending slot is consumed right away
fn applied(interceptor: &Interceptor, command: &str, done: bool) -> String {
    if !done {
        return format!("{} ignored", command);
    }
    match interceptor.relay().take_pending() {
        Some(executed) => {
            debug!(command = %executed, "Command executed");
            format!("{} ran", executed)
        }
        None => command.to_string(),
    }
}
