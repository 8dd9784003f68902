//! Video info manifest parser
//!
//! The body is a form-urlencoded list of `key=value` pairs. Stream lists live
//! in two keys, each a comma separated list of form-urlencoded entries:
//! - `url_encoded_fmt_stream_map`: muxed audio+video formats
//! - `adaptive_fmts`: separate audio and video tracks
//!
//! Live content adds an HLS master playlist under `hlsvp`; a DASH manifest
//! may be offered under `dashmpd`.

use super::{ManifestEvents, ManifestParser};
use crate::{
    error::Error,
    types::{Resolution, StreamDescriptor, StreamKind},
    Result,
};
use tracing::{debug, trace};
use url::form_urlencoded;

const KEY_MUXED: &str = "url_encoded_fmt_stream_map";
const KEY_ADAPTIVE: &str = "adaptive_fmts";
const KEY_HLS: &str = "hlsvp";
const KEY_DASH: &str = "dashmpd";

/// Streaming parser for video info bodies
#[derive(Debug, Default)]
pub struct VideoInfoParser {
    /// Bytes of the pair still being received
    pending: Vec<u8>,
    bytes_seen: usize,
    emitted: usize,
    failed_status: bool,
    reason: Option<String>,
}

impl VideoInfoParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_pair(&mut self, raw: &[u8], events: &mut dyn ManifestEvents) -> Result<()> {
        if raw.is_empty() {
            return Ok(());
        }

        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::malformed("manifest is not valid UTF-8"))?;
        if !text.contains('=') {
            return Err(Error::malformed(format!(
                "expected key=value pair, got {:?}",
                truncate(text)
            )));
        }

        let Some((key, value)) = form_urlencoded::parse(raw).next() else {
            return Ok(());
        };
        trace!(key = %key, len = value.len(), "Manifest pair");

        match key.as_ref() {
            "status" => self.failed_status = value == "fail",
            "reason" => self.reason = Some(value.into_owned()),
            KEY_MUXED => self.emit_list(&value, StreamKind::Muxed, events)?,
            KEY_ADAPTIVE => self.emit_list(&value, StreamKind::Adaptive, events)?,
            KEY_HLS if !value.is_empty() => {
                self.emit(StreamDescriptor::new(StreamKind::Hls, value.into_owned()), events)
            }
            KEY_DASH if !value.is_empty() => {
                self.emit(StreamDescriptor::new(StreamKind::Dash, value.into_owned()), events)
            }
            _ => {}
        }

        Ok(())
    }

    fn emit_list(
        &mut self,
        list: &str,
        kind: StreamKind,
        events: &mut dyn ManifestEvents,
    ) -> Result<()> {
        for entry in list.split(',').filter(|e| !e.is_empty()) {
            let stream = parse_entry(entry, kind)?;
            self.emit(stream, events);
        }
        Ok(())
    }

    fn emit(&mut self, stream: StreamDescriptor, events: &mut dyn ManifestEvents) {
        debug!(itag = ?stream.itag, kind = ?stream.kind, "Stream found");
        self.emitted += 1;
        events.on_stream_found(stream);
    }
}

impl ManifestParser for VideoInfoParser {
    fn feed(&mut self, chunk: &[u8], events: &mut dyn ManifestEvents) -> Result<()> {
        self.bytes_seen += chunk.len();
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'&') {
            let pair: Vec<u8> = self.pending.drain(..=pos).take(pos).collect();
            self.handle_pair(&pair, events)?;
        }
        Ok(())
    }

    fn finish(mut self, events: &mut dyn ManifestEvents) -> Result<usize> {
        if self.bytes_seen == 0 {
            return Err(Error::malformed("empty manifest"));
        }

        let rest = std::mem::take(&mut self.pending);
        let trimmed = rest.trim_ascii_end();
        self.handle_pair(trimmed, events)?;

        if self.failed_status {
            let reason = self.reason.take().unwrap_or_else(|| "status=fail".to_string());
            return Err(Error::unavailable(reason));
        }
        if self.emitted == 0 {
            return Err(Error::malformed("manifest contains no playable streams"));
        }

        events.on_done();
        Ok(self.emitted)
    }
}

/// Parse one entry of a stream list
fn parse_entry(entry: &str, kind: StreamKind) -> Result<StreamDescriptor> {
    let mut itag = None;
    let mut url = None;
    let mut stream = StreamDescriptor::new(kind, String::new());

    for (key, value) in form_urlencoded::parse(entry.as_bytes()) {
        match key.as_ref() {
            "itag" => {
                itag = Some(value.parse::<u32>().map_err(|_| {
                    Error::malformed(format!("invalid itag {:?}", value))
                })?)
            }
            "url" => url = Some(value.into_owned()),
            "type" => {
                let (mime, codecs) = split_mime(&value);
                stream.mime_type = Some(mime);
                stream.codecs = codecs;
            }
            "bitrate" => stream.bitrate = value.parse().ok(),
            "size" => stream.resolution = Resolution::parse(&value),
            "fps" => stream.fps = value.parse().ok(),
            "quality_label" => stream.quality_label = Some(value.into_owned()),
            "s" => stream.signature = Some(value.into_owned()),
            _ => {}
        }
    }

    match (itag, url) {
        (Some(itag), Some(url)) if !url.is_empty() => {
            stream.itag = Some(itag);
            stream.url = url;
            Ok(stream)
        }
        _ => Err(Error::malformed(format!(
            "stream entry without itag or url: {:?}",
            truncate(entry)
        ))),
    }
}

/// Split `video/mp4; codecs="avc1.4d401f, mp4a.40.2"` into MIME type and codecs
fn split_mime(value: &str) -> (String, Option<String>) {
    let mut parts = value.splitn(2, ';');
    let mime = parts.next().unwrap_or_default().trim().to_string();
    let codecs = parts.next().and_then(|params| {
        let (_, codecs) = params.split_once("codecs=")?;
        Some(codecs.trim().trim_matches('"').to_string())
    });
    (mime, codecs)
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(48) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
