use thiserror::Error;

/// Failure of a single completion cycle as seen by its caller.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("no API key was provided")]
    MissingCredential,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureOutOfRange(f32),
}

/// The remote call failed, before streaming started or mid-stream.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to completion service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("completion service reported an error: {0}")]
    Remote(String),
    #[error("malformed response from completion service: {0}")]
    Decode(String),
}
