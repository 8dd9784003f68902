//! Manifest parsing
//!
//! Parsers are fed raw bytes as they arrive and report every playable stream
//! through [`ManifestEvents`] callbacks. A parser runs once; a new byte stream
//! needs a new parser.

mod video_info;

pub use video_info::VideoInfoParser;

use crate::{types::StreamDescriptor, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

/// Raw manifest bytes as produced by a stream provider
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Callbacks fired while a manifest is parsed
pub trait ManifestEvents: Send {
    fn on_stream_found(&mut self, stream: StreamDescriptor);

    /// Called once after the last stream when parsing succeeded
    fn on_done(&mut self) {}
}

impl ManifestEvents for Vec<StreamDescriptor> {
    fn on_stream_found(&mut self, stream: StreamDescriptor) {
        self.push(stream);
    }
}

/// Incremental, single-pass manifest parser
pub trait ManifestParser: Send {
    /// Consume the next chunk, emitting every stream it completes
    fn feed(&mut self, chunk: &[u8], events: &mut dyn ManifestEvents) -> Result<()>;

    /// Flush buffered input and validate the whole manifest.
    /// Returns the number of streams emitted.
    fn finish(self, events: &mut dyn ManifestEvents) -> Result<usize>
    where
        Self: Sized;
}

/// Drive `parser` over `stream` until it ends or fails
pub async fn parse_stream<P>(
    mut parser: P,
    mut stream: ByteStream,
    events: &mut dyn ManifestEvents,
) -> Result<usize>
where
    P: ManifestParser,
{
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        parser.feed(&chunk, events)?;
    }
    parser.finish(events)
}

/// Wrap an in-memory body as a single-chunk stream
pub fn byte_stream(body: impl Into<Bytes>) -> ByteStream {
    let body = body.into();
    stream::once(async move { Ok(body) }).boxed()
}

/// Wrap pre-split chunks as a stream
pub fn chunked_stream(chunks: Vec<Bytes>) -> ByteStream {
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_parse_stream_collects() {
        let body = "status=ok&hlsvp=https%3A%2F%2Fm.example%2Fmaster.m3u8";
        let mut found: Vec<StreamDescriptor> = Vec::new();
        let count = parse_stream(VideoInfoParser::new(), byte_stream(body), &mut found)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(found[0].url, "https://m.example/master.m3u8");
    }

    #[tokio::test]
    async fn test_parse_stream_propagates_source_error() {
        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"status=ok&")),
            Err(Error::unavailable("connection reset")),
        ])
        .boxed();
        let mut found: Vec<StreamDescriptor> = Vec::new();
        let err = parse_stream(VideoInfoParser::new(), failing, &mut found)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamUnavailable(_)));
    }

    #[test]
    fn test_chunked_stream_matches_single_chunk() {
        let body = "status=ok&adaptive_fmts=itag%3D140%26url%3Dhttps%253A%252F%252Fr.example%252Fa\
                    %2Citag%3D137%26url%3Dhttps%253A%252F%252Fr.example%252Fv";
        let chunks = body
            .as_bytes()
            .chunks(7)
            .map(Bytes::copy_from_slice)
            .collect();

        let mut whole: Vec<StreamDescriptor> = Vec::new();
        let mut split: Vec<StreamDescriptor> = Vec::new();
        let whole_count = tokio_test::block_on(parse_stream(
            VideoInfoParser::new(),
            byte_stream(body),
            &mut whole,
        ));
        let split_count = tokio_test::block_on(parse_stream(
            VideoInfoParser::new(),
            chunked_stream(chunks),
            &mut split,
        ));

        assert_eq!(tokio_test::assert_ok!(whole_count), 2);
        assert_eq!(tokio_test::assert_ok!(split_count), 2);
        assert_eq!(whole, split);
    }
}
