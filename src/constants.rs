// Deployment defaults, overridable from the environment (or a .env file).
// The API key is deliberately absent: it is entered through the interface.

use std::env;

lazy_static::lazy_static! {
    pub static ref API_BASE: String = env::var("PORTAL_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("PORTAL_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("PORTAL_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

pub const DEFAULT_PORT: u16 = 8501;

/// Display names offered in the model selector, in menu order.
pub const MODEL_OPTIONS: &[&str] = &["GPT-4.1", "GPT-4", "Claude-3.5-Sonnet", "Claude-3-Opus"];
pub const DEFAULT_MODEL: &str = "GPT-4.1";

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const TEMPERATURE_STEP: f32 = 0.1;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Strategy Labs' helpful internal assistant. Be concise, cite sources, and follow brand voice.";

pub const CREDENTIAL_PROMPT: &str = "Please add your OpenAI API key to continue.";
pub const COMPLETION_FAILURE_HINT: &str = "Please check your API key and try again.";
