//! Turns a chat-completions SSE body into text fragments.
//!
//! The body arrives as arbitrary byte chunks; lines (and multi-byte
//! characters) may be split across chunk boundaries. Lines are framed on raw
//! `\n` bytes, so a partial line or character is buffered until complete, and
//! each line is decoded lossily: stray invalid UTF-8 becomes U+FFFD instead
//! of ending the stream.

use bytes::Bytes;
use futures_util::{future, Stream, StreamExt};
use serde::Deserialize;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

use crate::errors::AppError;

const DONE_SENTINEL: &str = "[DONE]";
const LINE_DELIMITER: &[u8] = b"\n";

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Classification of one body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

/// Classifies a single line of the body. Anything that is not a `data:` line
/// carrying a non-empty `choices[0].delta.content` is skipped.
pub fn parse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    if data == DONE_SENTINEL {
        return SseLine::Done;
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty())
            .map(SseLine::Fragment)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            trace!("Skipping malformed stream chunk: {e}");
            SseLine::Skip
        }
    }
}

/// Lazily decodes `body` into fragments, in arrival order, ending at the
/// `[DONE]` sentinel or at the end of the body. A read failure is yielded
/// once as an error and ends the sequence.
pub fn decode_fragments<S, E>(body: S) -> impl Stream<Item = Result<String, AppError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<std::io::Error>,
{
    let codec = AnyDelimiterCodec::new(LINE_DELIMITER.to_vec(), LINE_DELIMITER.to_vec());
    FramedRead::new(StreamReader::new(body), codec)
        .map(|line| match line {
            Ok(line) => Ok(parse_line(&String::from_utf8_lossy(&line))),
            Err(AnyDelimiterCodecError::Io(e)) => Err(AppError::StreamRead(e.to_string())),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                Err(AppError::StreamRead("Max line length exceeded".to_string()))
            }
        })
        .take_while(|item| {
            let done = matches!(item, Ok(SseLine::Done));
            if done {
                debug!("Stream end marker [DONE] received");
            }
            future::ready(!done)
        })
        .filter_map(|item| {
            future::ready(match item {
                Ok(SseLine::Fragment(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
}
