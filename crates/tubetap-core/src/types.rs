//! Core types for Tubetap

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::{Error, Result};

/// Unique identifier for an interceptor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterceptorId(pub Uuid);

impl InterceptorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InterceptorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of video the user is about to watch, as reported by preferences
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoClassification {
    #[default]
    Default,
    Live,
    Upcoming,
    Undefined,
}

impl std::str::FromStr for VideoClassification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(VideoClassification::Default),
            "live" => Ok(VideoClassification::Live),
            "upcoming" => Ok(VideoClassification::Upcoming),
            "undefined" => Ok(VideoClassification::Undefined),
            other => Err(Error::InvalidConfig(format!("unknown video type: {}", other))),
        }
    }
}

impl std::fmt::Display for VideoClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoClassification::Default => write!(f, "default"),
            VideoClassification::Live => write!(f, "live"),
            VideoClassification::Upcoming => write!(f, "upcoming"),
            VideoClassification::Undefined => write!(f, "undefined"),
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse the `WIDTHxHEIGHT` form used by stream entries
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once('x')?;
        Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where a stream descriptor came from in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio and video in one container
    Muxed,
    /// Separate audio or video track
    Adaptive,
    /// HLS master playlist URL (live content)
    Hls,
    /// DASH MPD URL
    Dash,
}

/// A playable representation of one manifest entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format tag (absent for playlist URLs)
    pub itag: Option<u32>,
    /// Stream location
    pub url: String,
    pub kind: StreamKind,
    /// MIME type without parameters, e.g. `video/mp4`
    pub mime_type: Option<String>,
    /// Codec list from the MIME parameters
    pub codecs: Option<String>,
    /// Bitrate in bits per second
    pub bitrate: Option<u64>,
    pub resolution: Option<Resolution>,
    pub fps: Option<u32>,
    pub quality_label: Option<String>,
    /// Encrypted signature that must be deciphered before playback
    pub signature: Option<String>,
}

impl StreamDescriptor {
    /// Create a descriptor that only carries a location
    pub fn new(kind: StreamKind, url: impl Into<String>) -> Self {
        Self {
            itag: None,
            url: url.into(),
            kind,
            mime_type: None,
            codecs: None,
            bitrate: None,
            resolution: None,
            fps: None,
            quality_label: None,
            signature: None,
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("audio/"))
            .unwrap_or(false)
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self.kind, StreamKind::Hls | StreamKind::Dash)
    }
}

/// Video title and related info handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEnvelope {
    pub video_id: String,
    pub playlist_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Anything else the provider returned
    #[serde(default)]
    pub extra: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl MetadataEnvelope {
    pub fn new(video_id: impl Into<String>, playlist_id: Option<String>) -> Self {
        Self {
            video_id: video_id.into(),
            playlist_id,
            title: None,
            author: None,
            extra: serde_json::Value::Null,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Discrete UI action replayed through the command relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Close,
    Next,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Close => write!(f, "close"),
            Command::Next => write!(f, "next"),
        }
    }
}

/// One-shot user-visible message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Error code of the failure that caused the notice
    pub code: String,
    pub message: String,
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
}

/// Response body the interceptor could hand back instead of the real one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub mime_type: String,
    pub body: Vec<u8>,
}

/// How aggressively repeated requests are cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Cancel only an identical request that arrives before the player opened
    #[default]
    Duplicate,
    /// Also cancel requests for the video the user just closed
    DuplicateOrClosed,
}

/// Interceptor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Classification used when no preferences collaborator is supplied
    pub classification: VideoClassification,
    /// Delegate playback to an external player
    pub use_external_player: bool,
    pub cancel_policy: CancelPolicy,
    /// Prefix of the notice shown when the manifest cannot be used
    pub notice_prefix: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            classification: VideoClassification::Default,
            use_external_player: false,
            cancel_policy: CancelPolicy::Duplicate,
            notice_prefix: "Url doesn't exist or broken".to_string(),
        }
    }
}

impl InterceptorConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.notice_prefix.trim().is_empty() {
            return Err(Error::InvalidConfig("notice_prefix must not be empty".into()));
        }
        Ok(())
    }
}
