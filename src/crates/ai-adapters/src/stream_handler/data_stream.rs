use crate::decoder::{decode_payload, DataStreamCodec};
use crate::types::unified::StreamEvent;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use log::{debug, error, trace, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct StreamReadOptions {
    /// Longest wait for the next chunk before the stream is failed.
    pub idle_timeout: Duration,
    /// Stops reading without emitting anything when cancelled.
    pub cancel_token: CancellationToken,
}

impl Default for StreamReadOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            cancel_token: CancellationToken::new(),
        }
    }
}

type EventBatchStream = BoxStream<'static, Result<Vec<StreamEvent>, String>>;

/// Convert an HTTP response body into a stream of chat events
///
/// # Arguments
/// * `response` - HTTP response whose body speaks the Data Stream Protocol
/// * `tx_event` - decoded event sender
/// * `options` - idle timeout and cancellation
///
/// Transport failures, idle timeouts and a body that ends without `finish`
/// are reported as a terminal [`StreamEvent::Error`].
pub async fn handle_data_stream(
    response: Response,
    tx_event: mpsc::UnboundedSender<StreamEvent>,
    options: StreamReadOptions,
) {
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .map(|ct| ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes()))
        .unwrap_or(false);
    debug!(
        "Reading data stream: status={}, event_stream={}",
        response.status(),
        is_event_stream
    );
    pump_data_stream(response.bytes_stream(), is_event_stream, tx_event, options).await;
}

/// Same as [`handle_data_stream`] for any byte stream.
///
/// With `is_event_stream` the body is parsed as Server-Sent Events and each
/// `data` field is decoded as one frame; otherwise it is read as plain
/// newline-delimited frames.
pub async fn pump_data_stream<S, B, E>(
    byte_stream: S,
    is_event_stream: bool,
    tx_event: mpsc::UnboundedSender<StreamEvent>,
    options: StreamReadOptions,
) where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + bytes::Buf + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut stream: EventBatchStream = if is_event_stream {
        sse_batches(byte_stream)
    } else {
        line_batches(byte_stream)
    };
    let StreamReadOptions {
        idle_timeout,
        cancel_token,
    } = options;

    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Data stream cancelled by caller");
                return;
            }
            next = timeout(idle_timeout, stream.next()) => next,
        };

        let batch = match next {
            Ok(Some(Ok(batch))) => batch,
            Ok(None) => {
                let error_msg = "Data stream closed before response completed";
                error!("{}", error_msg);
                let _ = tx_event.send(StreamEvent::error(error_msg));
                return;
            }
            Ok(Some(Err(e))) => {
                let error_msg = format!("Data stream error: {}", e);
                error!("{}", error_msg);
                let _ = tx_event.send(StreamEvent::error(error_msg));
                return;
            }
            Err(_) => {
                let error_msg = format!(
                    "Data stream timeout after {}s without data",
                    idle_timeout.as_secs()
                );
                error!("{}", error_msg);
                let _ = tx_event.send(StreamEvent::error(error_msg));
                return;
            }
        };

        for event in batch {
            trace!("Data stream event: {:?}", event);
            let terminal = event.is_terminal();
            if tx_event.send(event).is_err() {
                debug!("Data stream receiver dropped, stop reading");
                return;
            }
            if terminal {
                return;
            }
        }
    }
}

fn sse_batches<S, B, E>(byte_stream: S) -> EventBatchStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    byte_stream
        .eventsource()
        .map(|result| match result {
            Ok(sse) => {
                trace!("Data stream SSE: {:?}", sse);
                match decode_payload(&sse.data) {
                    Ok(events) => Ok(events),
                    Err(e) => {
                        warn!("Skipping malformed data stream frame: {}, data: {}", e, sse.data);
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e.to_string()),
        })
        .boxed()
}

fn line_batches<S, B, E>(byte_stream: S) -> EventBatchStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: bytes::Buf + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(byte_stream.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    FramedRead::new(reader, DataStreamCodec::new())
        .map(|result| result.map(|event| vec![event]).map_err(|e| e.to_string()))
        .boxed()
}
