//! Per-client conversation handling, independent of the socket transport.
//!
//! A [`ChatConnection`] owns exactly one [`Session`]. Inbound messages are
//! handled one at a time, so a submission arriving while a cycle is streaming
//! waits until that cycle has committed or failed.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::completion::CompletionDriver;
use crate::config::{Credential, RequestConfig};
use crate::constants;
use crate::error::PortalError;
use crate::session::{Session, Turn};
use crate::sidebar::{self, Acknowledgment};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Submit {
        text: String,
        model: String,
        temperature: f32,
        system_prompt: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    NewChat,
    SelectKnowledgeBase { name: String },
    AddKnowledgeBase,
    BuildRag,
    OpenRecent { title: String },
    Attach { file_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready { session_id: Uuid },
    History { turns: Vec<Turn> },
    UserTurn { content: String },
    AssistantStarted,
    Fragment { text: String },
    AssistantCommitted { content: String },
    CredentialRequired { message: String },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Info { message: String },
    Success { message: String },
}

impl ServerMessage {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            hint: None,
        }
    }
}

impl From<Acknowledgment> for ServerMessage {
    fn from(ack: Acknowledgment) -> Self {
        match ack {
            Acknowledgment::Info(message) => Self::Info { message },
            Acknowledgment::Success(message) => Self::Success { message },
            Acknowledgment::Rejected(message) => Self::error(message),
        }
    }
}

pub struct ChatConnection {
    session: Session,
    driver: CompletionDriver,
}

impl ChatConnection {
    pub fn new(driver: CompletionDriver) -> Self {
        Self {
            session: Session::new(),
            driver,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Messages sent right after the client connects.
    pub fn greeting(&self) -> Vec<ServerMessage> {
        vec![
            ServerMessage::Ready {
                session_id: self.session.id(),
            },
            ServerMessage::History {
                turns: self.session.all().to_vec(),
            },
        ]
    }

    /// Parses and handles a raw text frame. Malformed input is reported back
    /// to the client and otherwise ignored.
    pub async fn handle_text(&mut self, text: &str, out: &UnboundedSender<ServerMessage>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message, out).await,
            Err(e) => {
                warn!(session = %self.session.id(), error = %e, "Unreadable client message");
                let _ = out.send(ServerMessage::error(format!("Unreadable message: {}", e)));
            }
        }
    }

    pub async fn handle(&mut self, message: ClientMessage, out: &UnboundedSender<ServerMessage>) {
        let reply = match message {
            ClientMessage::Submit {
                text,
                model,
                temperature,
                system_prompt,
                api_key,
            } => {
                self.submit(text, model, temperature, system_prompt, api_key, out)
                    .await;
                return;
            }
            ClientMessage::NewChat => {
                info!(session = %self.session.id(), "Starting new chat");
                self.session.reset();
                ServerMessage::History { turns: Vec::new() }
            }
            ClientMessage::SelectKnowledgeBase { name } => sidebar::select_knowledge_base(&name).into(),
            ClientMessage::AddKnowledgeBase => sidebar::add_knowledge_base().into(),
            ClientMessage::BuildRag => sidebar::build_rag().into(),
            ClientMessage::OpenRecent { title } => sidebar::open_recent(&title).into(),
            ClientMessage::Attach { file_name } => sidebar::attach(&file_name).into(),
        };
        let _ = out.send(reply);
    }

    async fn submit(
        &mut self,
        text: String,
        model: String,
        temperature: f32,
        system_prompt: String,
        api_key: Option<String>,
        out: &UnboundedSender<ServerMessage>,
    ) {
        // Without a key the chat input is unavailable: nothing gets stored.
        if let Err(PortalError::MissingCredential) = Credential::new(api_key.as_deref()) {
            let _ = out.send(ServerMessage::CredentialRequired {
                message: constants::CREDENTIAL_PROMPT.to_string(),
            });
            return;
        }
        let config = match RequestConfig::new(model, temperature, system_prompt) {
            Ok(config) => config,
            Err(e) => {
                let _ = out.send(ServerMessage::error(e.to_string()));
                return;
            }
        };
        if text.trim().is_empty() {
            debug!(session = %self.session.id(), "Ignoring blank submission");
            return;
        }

        self.session.append(Turn::user(text.clone()));
        let _ = out.send(ServerMessage::UserTurn { content: text });
        let _ = out.send(ServerMessage::AssistantStarted);

        let result = self
            .driver
            .complete(&mut self.session, &config, api_key.as_deref(), |fragment| {
                let _ = out.send(ServerMessage::Fragment {
                    text: fragment.to_string(),
                });
            })
            .await;

        let reply = match result {
            Ok(turn) => ServerMessage::AssistantCommitted {
                content: turn.content,
            },
            Err(PortalError::MissingCredential) => ServerMessage::CredentialRequired {
                message: constants::CREDENTIAL_PROMPT.to_string(),
            },
            Err(e) => ServerMessage::Error {
                message: format!("Error: {}", e),
                hint: Some(constants::COMPLETION_FAILURE_HINT.to_string()),
            },
        };
        let _ = out.send(reply);
    }
}
