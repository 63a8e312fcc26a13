use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::config::ChatApiConfig;
use crate::decode::NdjsonStreamDecoder;
use crate::error::{parse_error_message, ChatApiError};
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::record::{parse_line, ParsedRecord};
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

/// Per-stream line accounting. Malformed lines are counted, never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub deltas: usize,
    pub skipped: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub deltas: Vec<String>,
    pub stats: StreamStats,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, user_agent);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        validate_request_payload_shape(request)?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let payload = request_with_transport_defaults(request);
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    /// Single-shot send: a non-success status becomes [`ChatApiError::Status`]
    /// with a message parsed from the response body. Failed requests are not
    /// retried.
    pub async fn send(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<reqwest::Response, ChatApiError> {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        let response = self.build_request(request)?.send();
        let response = await_or_cancel(response, cancellation)
            .await?
            .map_err(ChatApiError::from)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        Err(ChatApiError::Status(status, parse_error_message(status, &body)))
    }

    /// Stream a chat response, invoking the handler once per parsed record in
    /// arrival order. Skip records are counted but not surfaced. At
    /// end-of-stream the decode pipeline is flushed so an unterminated final
    /// line is still parsed.
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_record: F,
    ) -> Result<StreamStats, ChatApiError>
    where
        F: FnMut(ParsedRecord),
    {
        let response = self.send(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut decoder = NdjsonStreamDecoder::default();
        let mut stats = StreamStats::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = chunk.map_err(ChatApiError::from)?;
            for line in decoder.feed(&chunk) {
                process_line(&line, &mut stats, &mut on_record);
            }
        }

        for line in decoder.finish() {
            process_line(&line, &mut stats, &mut on_record);
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        Ok(stats)
    }

    /// Collecting variant of [`stream_with_handler`].
    ///
    /// [`stream_with_handler`]: ChatApiClient::stream_with_handler
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamOutcome, ChatApiError> {
        let mut deltas = Vec::new();
        let stats = self
            .stream_with_handler(request, cancellation, |record| {
                if let ParsedRecord::Delta(text) = record {
                    deltas.push(text);
                }
            })
            .await?;

        Ok(StreamOutcome { deltas, stats })
    }
}

fn request_with_transport_defaults(request: &ChatRequest) -> ChatRequest {
    let mut payload = request.clone();
    payload.stream = true;
    payload
}

fn validate_request_payload_shape(request: &ChatRequest) -> Result<(), ChatApiError> {
    if request.model.trim().is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'model' must be non-empty".to_string(),
        ));
    }
    if request.messages.is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'messages' must contain at least one message".to_string(),
        ));
    }
    Ok(())
}

fn process_line<F>(line: &str, stats: &mut StreamStats, on_record: &mut F)
where
    F: FnMut(ParsedRecord),
{
    match parse_line(line) {
        ParsedRecord::Skip => stats.skipped += 1,
        record @ ParsedRecord::Delta(_) => {
            stats.deltas += 1;
            on_record(record);
        }
        ParsedRecord::Malformed { raw } => {
            stats.malformed += 1;
            tracing::debug!(line = %raw, "skipping malformed stream record");
            on_record(ParsedRecord::Malformed { raw });
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
