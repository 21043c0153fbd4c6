use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{Assembler, StreamEvent};
use crate::config::Config;
use crate::decoder::LineDecoder;
use crate::envelope::parse_line;
use crate::error::{Result, WonderError};
use crate::retry::RetryPolicy;

/// Events for one streamed reply. Ends after the first terminal item.
pub type ResponseStream = BoxStream<'static, Result<StreamEvent>>;

#[derive(Serialize)]
struct StreamRequest<'a> {
    content: &'a str,
}

/// HTTP client for the WonderAI backend.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    idle_timeout: Option<Duration>,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            idle_timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retry: config.retry_policy(),
            idle_timeout: config.stream_idle_timeout(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| WonderError::Config(format!("invalid base URL '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| WonderError::Config(format!("base URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying retryable failures under `policy`.
    pub(crate) async fn send_with<F>(&self, policy: &RetryPolicy, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (err, retry_after) = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let retry_after = retry_after(&resp);
                    let body = resp.text().await.unwrap_or_default();
                    (
                        WonderError::Status {
                            status,
                            body: error_message(&body),
                        },
                        retry_after,
                    )
                }
                Err(e) => (WonderError::Transport(e), None),
            };

            if !policy.should_retry(attempt, &err) {
                if attempt > 1 && err.is_retryable() {
                    return Err(WonderError::RetryLimit {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                return Err(err);
            }

            // A server-sent Retry-After never exceeds the policy ceiling.
            let delay = retry_after
                .map(|d| d.min(policy.max_delay))
                .unwrap_or_else(|| policy.delay_for(attempt));
            warn!(
                "request failed: {err}; retrying {attempt}/{} in {delay:?}",
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(%url, "GET");
        let resp = self
            .send_with(&self.retry, || self.http.get(url.clone()).query(query))
            .await?;
        Ok(resp.json().await?)
    }

    /// POST for lookups that are safe to repeat.
    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        self.post_json_with(&self.retry, url, query, body).await
    }

    /// POST that creates something on the server. Sent once: a 5xx may
    /// arrive after the write already happened.
    pub(crate) async fn post_json_once<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        self.post_json_with(&RetryPolicy::none(), url, query, body)
            .await
    }

    async fn post_json_with<B: Serialize, T: DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        url: Url,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        debug!(%url, "POST");
        let resp = self
            .send_with(policy, || {
                self.http.post(url.clone()).query(query).json(body)
            })
            .await?;
        Ok(resp.json().await?)
    }

    /// Send `content` to a conversation and stream the assistant's reply.
    ///
    /// Only opening the request is retried. Once the body starts flowing, a
    /// broken connection surfaces as [`WonderError::Interrupted`]. Cancelling
    /// `cancel` ends the stream with [`WonderError::Cancelled`].
    pub async fn stream_message(
        &self,
        conversation_id: &str,
        content: &str,
        user_id: &str,
        cancel: CancellationToken,
    ) -> Result<ResponseStream> {
        let url = self.endpoint(&["api", "chat", "conversations", conversation_id, "stream"])?;
        let body = StreamRequest { content };
        debug!(%url, "POST (stream)");

        let open = self.send_with(&self.retry, || {
            self.http
                .post(url.clone())
                .query(&[("user_id", user_id)])
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&body)
        });
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WonderError::Cancelled),
            resp = open => resp?,
        };

        Ok(read_stream(
            Box::pin(resp.bytes_stream()),
            self.idle_timeout,
            cancel,
        ))
    }

    /// Probe the health endpoint until it answers or `policy` gives up.
    pub async fn reconnect(&self, policy: &RetryPolicy) -> Result<crate::api::HealthStatus> {
        let url = self.endpoint(&["api", "health"])?;
        let resp = self
            .send_with(policy, || self.http.get(url.clone()))
            .await?;
        let status = resp.json().await?;
        info!("backend reachable at {}", self.base_url);
        Ok(status)
    }
}

enum Next {
    Chunk(reqwest::Result<Bytes>),
    End,
    Idle(Duration),
    Cancelled,
}

/// Turn a response body into assembled stream events.
pub fn read_stream<S>(
    mut body: S,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> ResponseStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send + 'static,
{
    let s = async_stream::stream! {
        let mut decoder = LineDecoder::new();
        let mut assembler = Assembler::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Cancelled,
                next = next_chunk(&mut body, idle_timeout) => next,
            };

            match next {
                Next::Chunk(Ok(bytes)) => {
                    for line in decoder.push(&bytes) {
                        if let Some(item) = accept_line(&mut assembler, &line) {
                            yield item;
                        }
                        if assembler.is_done() {
                            return;
                        }
                    }
                }
                Next::Chunk(Err(e)) => {
                    if let Some(err) = assembler.fail(e.to_string()) {
                        yield Err(err);
                    }
                    return;
                }
                Next::End => {
                    if let Some(line) = decoder.finish() {
                        if let Some(item) = accept_line(&mut assembler, &line) {
                            yield item;
                        }
                    }
                    if let Some(event) = assembler.finish() {
                        yield Ok(event);
                    }
                    return;
                }
                Next::Idle(after) => {
                    yield Err(WonderError::IdleTimeout(after));
                    return;
                }
                Next::Cancelled => {
                    debug!("stream cancelled");
                    yield Err(WonderError::Cancelled);
                    return;
                }
            }
        }
    };
    Box::pin(s)
}

async fn next_chunk<S>(body: &mut S, idle_timeout: Option<Duration>) -> Next
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let next = match idle_timeout {
        Some(after) => match tokio::time::timeout(after, body.next()).await {
            Ok(next) => next,
            Err(_) => return Next::Idle(after),
        },
        None => body.next().await,
    };
    match next {
        Some(chunk) => Next::Chunk(chunk),
        None => Next::End,
    }
}

fn accept_line(assembler: &mut Assembler, line: &str) -> Option<Result<StreamEvent>> {
    match parse_line(line) {
        Ok(Some(envelope)) => assembler.accept(envelope),
        Ok(None) => None,
        Err(e) => {
            warn!("skipping malformed stream line: {e}");
            None
        }
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pull a readable message out of an error body.
///
/// Understands `{"error":{"message":..}}` and `{"detail":..}`; anything else
/// is returned as-is.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("detail"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
