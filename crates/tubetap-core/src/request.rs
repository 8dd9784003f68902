//! Intercepted playback requests

use url::form_urlencoded;

/// An observed request and the facts extractable from its query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    url: String,
    video_id: Option<String>,
    playlist_id: Option<String>,
    client: Option<String>,
}

impl PlaybackRequest {
    /// Extract ids from a request URL. Never fails: unknown shapes yield `None` fields.
    pub fn parse(url: impl Into<String>) -> Self {
        let url = url.into();
        let mut video_id = None;
        let mut fallback_id = None;
        let mut playlist_id = None;
        let mut client = None;

        if let Some(query) = query_part(&url) {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                if value.is_empty() {
                    continue;
                }
                match key.as_ref() {
                    "video_id" => video_id = Some(value.into_owned()),
                    "v" => fallback_id = Some(value.into_owned()),
                    "list" => playlist_id = Some(value.into_owned()),
                    "c" => client = Some(value.into_owned()),
                    _ => {}
                }
            }
        }

        Self {
            url,
            video_id: video_id.or(fallback_id),
            playlist_id,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    /// Client type token (`c=` query value)
    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    /// Pair compared by the session tie-break
    pub fn id_pair(&self) -> (Option<&str>, Option<&str>) {
        (self.video_id(), self.playlist_id())
    }
}

fn query_part(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once('?')?;
    Some(rest.split('#').next().unwrap_or(rest))
}
