//! OpenAI-compatible streaming transport for the completion driver.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::completion::{ChatRequest, CompletionBackend, FragmentStream};
use crate::config::Credential;
use crate::error::CompletionError;

// Shapes of the `chat.completion.chunk` objects carried on `data:` lines.
#[derive(Deserialize, Debug)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

/// Incremental `text/event-stream` decoder. Network chunks may split lines
/// (and UTF-8 sequences) anywhere, so bytes are buffered until a newline.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every complete line in the buffer. Decoding stops at the first
    /// error or at `[DONE]`; events before that point are still returned.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<SseEvent, CompletionError>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match decode_line(&line) {
                Ok(None) => {}
                Ok(Some(event)) => {
                    let done = event == SseEvent::Done;
                    events.push(Ok(event));
                    if done {
                        self.buffer.clear();
                        break;
                    }
                }
                Err(e) => {
                    events.push(Err(e));
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, CompletionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<SseEvent>, CompletionError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| CompletionError::Decode(format!("invalid UTF-8 in event stream: {}", e)))?
        .trim_end_matches(['\r', '\n']);

    // Comments, blank separators and non-data fields carry no fragments.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: ChunkEnvelope = serde_json::from_str(data)
        .map_err(|e| CompletionError::Decode(format!("{} in chunk {}", e, data)))?;
    if let Some(err) = chunk.error {
        return Err(CompletionError::Remote(err.message));
    }
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Fragment(text)))
    }
}

struct StreamState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    queue: VecDeque<Result<String, CompletionError>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn enqueue(&mut self, event: Result<SseEvent, CompletionError>) {
        if self.finished {
            return;
        }
        match event {
            Ok(SseEvent::Fragment(text)) => self.queue.push_back(Ok(text)),
            Ok(SseEvent::Done) => self.finished = true,
            Err(e) => {
                error!(error = %e, "Completion stream error");
                self.queue.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Adapts a raw byte stream into a fragment stream. The first error ends the
/// stream; nothing after it is yielded.
pub fn fragment_stream<S, B>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.feed(chunk.as_ref()) {
                        state.enqueue(event);
                    }
                }
                Some(Err(e)) => state.enqueue(Err(CompletionError::Transport(e))),
                None => {
                    if let Some(tail) = state.decoder.finish().transpose() {
                        state.enqueue(tail);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

// Longest slice of a non-JSON error body (proxy pages etc.) shown to the user.
const ERROR_BODY_LIMIT: usize = 200;

/// Prefers the service's `error.message`; otherwise keeps a short prefix of
/// the raw body.
fn summarize_error_body(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let body = body.trim();
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(ERROR_BODY_LIMIT).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

/// Talks to `{base_url}/chat/completions`. Timeouts are the HTTP client's
/// defaults.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn open_stream(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<FragmentStream, CompletionError> {
        let url = self.endpoint();
        debug!(%url, model = %request.model, "Sending streamed completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let message = summarize_error_body(&error_body);
            warn!(%status, %message, "Completion service rejected request");
            return Err(CompletionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(fragment_stream(response.bytes_stream()))
    }
}
