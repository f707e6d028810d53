//! Strategy Labs AI Portal: a chat front end that streams replies from a
//! hosted completion API into a per-connection conversation session.
//!
//! The knowledge-base, RAG and recent-chat controls are placeholders that
//! only acknowledge clicks; see [`sidebar`].

pub mod completion;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod openai;
pub mod session;
pub mod sidebar;
pub mod web_server;

pub use completion::{ChatRequest, CompletionBackend, CompletionDriver, FragmentStream};
pub use config::{backend_model, Credential, RequestConfig};
pub use error::{CompletionError, ConfigError, PortalError};
pub use session::{Role, Session, Turn};
