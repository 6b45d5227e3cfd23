//! Framing of streamed query results.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use crate::domain::Document;
use crate::error::FerretError;

/// Byte stream of framed documents.
pub type DocumentStream = BoxStream<'static, Result<Bytes, FerretError>>;

/// How streamed documents are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StreamFraming {
    /// A single JSON array, `[` and `]` included.
    #[default]
    #[serde(rename = "array")]
    Array,
    /// One JSON document per line.
    #[serde(rename = "ndjson", alias = "ndJSON")]
    NdJson,
}

impl StreamFraming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::NdJson => "ndjson",
        }
    }
}

impl fmt::Display for StreamFraming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamFraming {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "array" | "json" => Ok(Self::Array),
            "ndjson" => Ok(Self::NdJson),
            other => Err(format!("unknown stream framing `{other}`")),
        }
    }
}

/// Turns documents into framed chunks, one chunk per document.
#[derive(Debug)]
pub(crate) struct Framer {
    framing: StreamFraming,
    emitted: usize,
}

impl Framer {
    pub(crate) fn new(framing: StreamFraming) -> Self {
        Self {
            framing,
            emitted: 0,
        }
    }

    pub(crate) fn frame(&mut self, document: &Document) -> Result<Bytes, FerretError> {
        let body = serde_json::to_vec(document).map_err(|err| {
            FerretError::serialization(format!("failed to serialise document: {err}"))
        })?;

        let mut chunk = Vec::with_capacity(body.len() + 1);
        match self.framing {
            StreamFraming::Array => {
                chunk.push(if self.emitted == 0 { b'[' } else { b',' });
                chunk.extend_from_slice(&body);
            }
            StreamFraming::NdJson => {
                chunk.extend_from_slice(&body);
                chunk.push(b'\n');
            }
        }
        self.emitted += 1;
        Ok(Bytes::from(chunk))
    }

    /// Closing chunk, if the framing needs one.
    pub(crate) fn finish(self) -> Option<Bytes> {
        match (self.framing, self.emitted) {
            (StreamFraming::Array, 0) => Some(Bytes::from_static(b"[]")),
            (StreamFraming::Array, _) => Some(Bytes::from_static(b"]")),
            (StreamFraming::NdJson, _) => None,
        }
    }
}

/// Stream an already materialised result set.
pub(crate) fn from_documents(framing: StreamFraming, documents: Vec<Document>) -> DocumentStream {
    let mut framer = Framer::new(framing);
    let mut chunks: Vec<Result<Bytes, FerretError>> = documents
        .iter()
        .map(|document| framer.frame(document))
        .collect();
    chunks.extend(framer.finish().map(Ok));
    stream::iter(chunks).boxed()
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;

    fn documents(count: i64) -> Vec<Document> {
        (0..count)
            .map(|n| Document::from_json(json!({ "n": n })).expect("valid document"))
            .collect()
    }

    async fn render(stream: DocumentStream) -> String {
        let chunks: Vec<Bytes> = stream.try_collect().await.expect("stream succeeds");
        chunks
            .iter()
            .map(|chunk| std::str::from_utf8(chunk).expect("utf8"))
            .collect()
    }

    #[tokio::test]
    async fn array_framing_wraps_documents() {
        let rendered = render(from_documents(StreamFraming::Array, documents(3))).await;
        assert_eq!(rendered, r#"[{"n":0},{"n":1},{"n":2}]"#);
    }

    #[tokio::test]
    async fn empty_array_stream_is_brackets() {
        let rendered = render(from_documents(StreamFraming::Array, Vec::new())).await;
        assert_eq!(rendered, "[]");
    }

    #[tokio::test]
    async fn ndjson_framing_emits_lines() {
        let rendered = render(from_documents(StreamFraming::NdJson, documents(2))).await;
        assert_eq!(rendered, "{\"n\":0}\n{\"n\":1}\n");

        let empty = render(from_documents(StreamFraming::NdJson, Vec::new())).await;
        assert!(empty.is_empty());
    }

    #[test]
    fn framing_parses_from_text() {
        assert_eq!("ndJSON".parse::<StreamFraming>(), Ok(StreamFraming::NdJson));
        assert_eq!("array".parse::<StreamFraming>(), Ok(StreamFraming::Array));
        assert!("xml".parse::<StreamFraming>().is_err());
    }
}
