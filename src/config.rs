use std::fmt;

use crate::constants;
use crate::error::{ConfigError, PortalError};

/// Transport model id used for any display name containing `GPT-4`.
pub const GPT4_BACKEND_MODEL: &str = "gpt-4";
/// Transport model id for every other display name, Claude options included.
pub const FALLBACK_BACKEND_MODEL: &str = "gpt-3.5-turbo";

/// Maps a model selector display name to the id sent to the completion
/// service. Claude-named options do not get a Claude backend; they fall
/// through to the GPT fallback like any other unknown name.
pub fn backend_model(display_name: &str) -> &'static str {
    if display_name.contains("GPT-4") {
        GPT4_BACKEND_MODEL
    } else {
        FALLBACK_BACKEND_MODEL
    }
}

/// Control values read fresh from the interface on every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl RequestConfig {
    pub fn new(
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if !temperature.is_finite()
            || !(constants::MIN_TEMPERATURE..=constants::MAX_TEMPERATURE).contains(&temperature)
        {
            return Err(ConfigError::TemperatureOutOfRange(temperature));
        }
        Ok(Self {
            model: model.into(),
            temperature,
            system_prompt: system_prompt.into(),
        })
    }

    /// The display name as chosen in the selector.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_model(&self) -> &'static str {
        backend_model(&self.model)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: constants::DEFAULT_MODEL.to_string(),
            temperature: constants::DEFAULT_TEMPERATURE,
            system_prompt: constants::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// A non-empty bearer credential for the completion service.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Rejects absent or whitespace-only keys.
    pub fn new(raw: Option<&str>) -> Result<Self, PortalError> {
        match raw.map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Self(key.to_string())),
            _ => Err(PortalError::MissingCredential),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt4_display_names_share_backend() {
        assert_eq!(backend_model("GPT-4.1"), GPT4_BACKEND_MODEL);
        assert_eq!(backend_model("GPT-4"), GPT4_BACKEND_MODEL);
    }

    #[test]
    fn test_claude_display_names_fall_back_to_gpt() {
        assert_eq!(backend_model("Claude-3.5-Sonnet"), FALLBACK_BACKEND_MODEL);
        assert_eq!(backend_model("Claude-3-Opus"), FALLBACK_BACKEND_MODEL);
    }

    #[test]
    fn test_marker_match_is_case_sensitive() {
        assert_eq!(backend_model("gpt-4"), FALLBACK_BACKEND_MODEL);
    }

    #[test]
    fn test_temperature_bounds_are_inclusive() {
        assert!(RequestConfig::new("GPT-4", 0.0, "p").is_ok());
        assert!(RequestConfig::new("GPT-4", 2.0, "p").is_ok());
    }

    #[test]
    fn test_temperature_out_of_range_is_rejected() {
        assert_eq!(
            RequestConfig::new("GPT-4", 2.1, "p"),
            Err(ConfigError::TemperatureOutOfRange(2.1))
        );
        assert!(RequestConfig::new("GPT-4", -0.1, "p").is_err());
        assert!(RequestConfig::new("GPT-4", f32::NAN, "p").is_err());
    }

    #[test]
    fn test_default_config_matches_controls() {
        let config = RequestConfig::default();
        assert_eq!(config.model(), "GPT-4.1");
        assert_eq!(config.backend_model(), "gpt-4");
        assert_eq!(config.temperature(), 0.7);
        assert!(config.system_prompt().starts_with("You are Strategy Labs'"));
    }

    #[test]
    fn test_blank_credentials_are_missing() {
        assert!(matches!(Credential::new(None), Err(PortalError::MissingCredential)));
        assert!(matches!(Credential::new(Some("")), Err(PortalError::MissingCredential)));
        assert!(matches!(Credential::new(Some("   ")), Err(PortalError::MissingCredential)));
    }

    #[test]
    fn test_credential_is_trimmed_and_redacted() {
        let credential = Credential::new(Some("  sk-test  ")).unwrap();
        assert_eq!(credential.expose(), "sk-test");
        assert!(!format!("{:?}", credential).contains("sk-test"));
    }
}
