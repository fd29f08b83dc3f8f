//! Server-sent-event framing: raw text chunks to [`WireFrame`]s.

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;

use crate::error::Result;
use crate::types::WireFrame;

/// Split an arbitrarily-chunked SSE body into wire frames.
///
/// Partial lines are buffered across chunks. A transport error is forwarded
/// and ends the stream; a trailing unterminated line is flushed at the end.
pub fn sse_frames<S>(chunks: S) -> BoxStream<'static, Result<WireFrame>>
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer = String::new();
        let mut failed = false;
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    failed = true;
                    break;
                }
            };
            buffer.push_str(&chunk);

            while let Some(line_end) = buffer.find('\n') {
                let line: String = buffer.drain(..=line_end).collect();
                if let Some(frame) = WireFrame::from_sse_line(&line) {
                    yield frame;
                }
            }
        }

        if !failed {
            if let Some(frame) = WireFrame::from_sse_line(&buffer) {
                yield frame;
            }
        }
    };
    Box::pin(stream)
}
