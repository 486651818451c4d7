use std::collections::HashMap;
use std::env;
use std::fmt;

use scrawl_core::OwnerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Bearer token to the owner it authenticates
    pub tokens: HashMap<String, OwnerId>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut owners = self
            .tokens
            .values()
            .map(OwnerId::as_str)
            .collect::<Vec<_>>();
        owners.sort_unstable();
        owners.dedup();
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("tokens", &"[REDACTED]")
            .field("owners", &owners)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SCRAWL_API_BIND_ADDR", "127.0.0.1:8080");
        let raw_tokens = required_trimmed(&lookup, "SCRAWL_API_TOKENS")?;
        let tokens = parse_tokens(&raw_tokens)?;

        Ok(Self { bind_addr, tokens })
    }
}

/// Parse `token:owner,token:owner`; a token may appear only once.
fn parse_tokens(raw: &str) -> Result<HashMap<String, OwnerId>, ConfigError> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (token, owner) = entry.split_once(':').ok_or_else(|| {
            ConfigError::Invalid(
                "SCRAWL_API_TOKENS entries must look like `token:owner`".to_string(),
            )
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid(
                "SCRAWL_API_TOKENS contains an empty token".to_string(),
            ));
        }
        let owner = OwnerId::new(owner.trim())
            .map_err(|error| ConfigError::Invalid(format!("SCRAWL_API_TOKENS: {error}")))?;
        if tokens.insert(token.to_string(), owner).is_some() {
            return Err(ConfigError::Invalid(
                "SCRAWL_API_TOKENS lists the same token twice".to_string(),
            ));
        }
    }

    if tokens.is_empty() {
        return Err(ConfigError::Invalid(
            "SCRAWL_API_TOKENS must define at least one token".to_string(),
        ));
    }
    Ok(tokens)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
