// AI configuration and secrets management
//
// API keys are looked up in:
// 1. System keychain (with the `keychain` feature)
// 2. Environment variables (PROMPTGRID_GEMINI_KEY, ...)
//
// Keys are NEVER stored in settings.json

use std::env;

use thiserror::Error;

use crate::settings::{AIProvider, ResponseFormat, ResponseStructure, Settings};

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "promptgrid";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("keychain support not enabled; set {0} instead")]
    KeychainDisabled(String),
    #[error("keychain error: {0}")]
    Keychain(String),
}

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of key lookup
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

impl KeyLookup {
    pub fn missing() -> Self {
        Self { key: None, source: KeySource::None }
    }
}

/// Environment variable holding the key for a provider
pub fn env_var_name(provider: &str) -> String {
    format!("PROMPTGRID_{}_KEY", provider.to_uppercase())
}

#[cfg(feature = "keychain")]
fn keychain_account(provider: &str) -> String {
    format!("ai/{}", provider.to_lowercase())
}

/// Get an API key for the specified provider
pub fn get_api_key(provider: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider)) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup {
                    key: Some(key),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    if let Ok(key) = env::var(env_var_name(provider)) {
        let key = key.trim();
        if !key.is_empty() {
            return KeyLookup {
                key: Some(key.to_string()),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup::missing()
}

/// Store an API key in the system keychain
#[cfg(feature = "keychain")]
pub fn set_api_key(provider: &str, key: &str) -> Result<(), CredentialError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider))
        .map_err(|e| CredentialError::Keychain(e.to_string()))?;
    entry
        .set_password(key)
        .map_err(|e| CredentialError::Keychain(e.to_string()))
}

#[cfg(not(feature = "keychain"))]
pub fn set_api_key(provider: &str, _key: &str) -> Result<(), CredentialError> {
    Err(CredentialError::KeychainDisabled(env_var_name(provider)))
}

/// Delete an API key from the system keychain
#[cfg(feature = "keychain")]
pub fn delete_api_key(provider: &str) -> Result<(), CredentialError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider))
        .map_err(|e| CredentialError::Keychain(e.to_string()))?;
    entry
        .delete_credential()
        .map_err(|e| CredentialError::Keychain(e.to_string()))
}

#[cfg(not(feature = "keychain"))]
pub fn delete_api_key(provider: &str) -> Result<(), CredentialError> {
    Err(CredentialError::KeychainDisabled(env_var_name(provider)))
}

pub fn keychain_available() -> bool {
    cfg!(feature = "keychain")
}

// ============================================================================
// Resolved AI Configuration
// ============================================================================

/// Status of the AI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIConfigStatus {
    Ready,
    /// Provider is selected but no API key was found
    MissingKey,
}

impl AIConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::MissingKey => "missing_key",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The effective AI configuration, fully resolved from settings and secrets.
/// Providers and column jobs are built from this, never from raw settings.
#[derive(Debug, Clone)]
pub struct ResolvedAIConfig {
    pub provider: AIProvider,
    /// Settings model, or the provider default when unset
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
    pub response_structure: ResponseStructure,
    pub api_key: Option<String>,
    pub key_source: KeySource,
    pub status: AIConfigStatus,
    /// Human-readable reason if not ready
    pub blocking_reason: Option<String>,
}

impl ResolvedAIConfig {
    /// Resolve against the keychain and environment
    pub fn from_settings(settings: &Settings) -> Self {
        let lookup = get_api_key(settings.ai_provider.name());
        Self::resolve(settings, lookup)
    }

    /// Resolve with an already looked-up key
    pub fn resolve(settings: &Settings, lookup: KeyLookup) -> Self {
        let settings = settings.clone().validated();
        let provider = settings.ai_provider;

        let (status, blocking_reason) = match lookup.key {
            Some(_) => (AIConfigStatus::Ready, None),
            None => (
                AIConfigStatus::MissingKey,
                Some(format!(
                    "No API key found for {}. Set via keychain or {}",
                    provider.label(),
                    env_var_name(provider.name())
                )),
            ),
        };

        Self {
            provider,
            model: settings.effective_model().to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            response_format: settings.response_format,
            response_structure: settings.response_structure,
            api_key: lookup.key,
            key_source: lookup.source,
            status,
            blocking_reason,
        }
    }

    /// Load settings and resolve in one call
    pub fn load() -> Self {
        Self::from_settings(&Settings::load())
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One-line summary for `ai doctor` style output
    pub fn describe(&self) -> String {
        match self.status {
            AIConfigStatus::Ready => format!(
                "{} ({}) ready, key from {}",
                self.provider.label(),
                self.model,
                self.key_source.as_str()
            ),
            AIConfigStatus::MissingKey => self
                .blocking_reason
                .clone()
                .unwrap_or_else(|| "No API key configured".to_string()),
        }
    }
}
