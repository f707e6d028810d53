//! Completion cycle: request construction, fragment assembly and the commit
//! into the session store.
//!
//! Transports implement [`CompletionBackend`] and hand back a finite stream of
//! text fragments. [`assemble`] consumes any such stream, so the assembly rules
//! can be exercised with an in-memory producer instead of a live service.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Credential, RequestConfig};
use crate::error::{CompletionError, PortalError};
use crate::session::{Session, Turn};

/// Lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, CompletionError>>;

/// Outbound payload for a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatRequest {
    /// System prompt first, then the whole history verbatim. Nothing is
    /// truncated; the full conversation goes out on every request.
    pub fn build(history: &[Turn], config: &RequestConfig) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Turn::system(config.system_prompt()));
        messages.extend(history.iter().cloned());
        Self {
            model: config.backend_model().to_string(),
            messages,
            temperature: config.temperature(),
            stream: true,
        }
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends the request and returns the fragment stream once the service has
    /// accepted it.
    async fn open_stream(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<FragmentStream, CompletionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingFirstFragment,
    Streaming,
    Committed,
    Failed,
}

/// Accumulates fragments for one cycle. Text is only released by
/// [`ResponseAssembler::commit`]; a failed assembler drops what it collected.
#[derive(Debug)]
pub struct ResponseAssembler {
    state: CycleState,
    text: String,
    fragments: usize,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self {
            state: CycleState::Idle,
            text: String::new(),
            fragments: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn begin(&mut self) {
        if self.state == CycleState::Idle {
            self.state = CycleState::AwaitingFirstFragment;
        }
    }

    pub fn push(&mut self, fragment: &str) {
        match self.state {
            CycleState::AwaitingFirstFragment | CycleState::Streaming => {
                self.state = CycleState::Streaming;
                self.text.push_str(fragment);
                self.fragments += 1;
            }
            other => warn!(state = ?other, "Dropping fragment outside of an active cycle"),
        }
    }

    pub fn fail(&mut self) {
        self.state = CycleState::Failed;
        self.text.clear();
    }

    /// Moves to `Committed` and hands back the full reply. A failed cycle stays
    /// failed and yields nothing.
    pub fn commit(&mut self) -> String {
        if self.state == CycleState::Failed {
            return String::new();
        }
        self.state = CycleState::Committed;
        std::mem::take(&mut self.text)
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains `stream`, forwarding each fragment to `on_fragment` as soon as it
/// arrives, and returns the concatenation in arrival order.
pub async fn assemble<F>(
    mut stream: FragmentStream,
    assembler: &mut ResponseAssembler,
    mut on_fragment: F,
) -> Result<String, CompletionError>
where
    F: FnMut(&str),
{
    assembler.begin();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                on_fragment(&fragment);
                assembler.push(&fragment);
            }
            Err(e) => {
                assembler.fail();
                return Err(e);
            }
        }
    }
    Ok(assembler.commit())
}

/// Runs completion cycles against one backend. Cheap to share between
/// connections; it holds no per-session state.
#[derive(Clone)]
pub struct CompletionDriver {
    backend: Arc<dyn CompletionBackend>,
}

impl CompletionDriver {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// One request/response cycle. On success exactly one assistant turn is
    /// appended to `session` and returned; on any failure the session is left
    /// untouched.
    #[instrument(skip_all, fields(session = %session.id(), model = config.model()))]
    pub async fn complete<F>(
        &self,
        session: &mut Session,
        config: &RequestConfig,
        api_key: Option<&str>,
        on_fragment: F,
    ) -> Result<Turn, PortalError>
    where
        F: FnMut(&str) + Send,
    {
        let credential = Credential::new(api_key)?;
        let request = ChatRequest::build(session.all(), config);
        debug!(
            backend_model = %request.model,
            temperature = request.temperature,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let mut assembler = ResponseAssembler::new();
        assembler.begin();
        let stream = match self.backend.open_stream(&request, &credential).await {
            Ok(stream) => stream,
            Err(e) => {
                assembler.fail();
                warn!(error = %e, "Completion request failed before streaming");
                return Err(e.into());
            }
        };

        let reply = match assemble(stream, &mut assembler, on_fragment).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    error = %e,
                    fragments = assembler.fragments(),
                    "Completion stream failed, discarding partial reply"
                );
                return Err(e.into());
            }
        };

        info!(
            fragments = assembler.fragments(),
            chars = reply.len(),
            "Completion committed"
        );
        let turn = Turn::assistant(reply);
        session.append(turn.clone());
        Ok(turn)
    }
}
