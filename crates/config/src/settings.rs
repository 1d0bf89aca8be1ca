// Application settings
// Loaded from ~/.config/promptgrid/settings.json

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Temperature range accepted by every provider
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
/// Max-token range accepted by every provider
pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 4096);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("invalid settings in {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// AI provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    /// Google Gemini (default)
    #[default]
    Gemini,
    /// OpenAI chat completions
    #[serde(rename = "chatgpt", alias = "openai")]
    ChatGpt,
    /// Mistral chat completions
    Mistral,
}

impl AIProvider {
    pub const ALL: [AIProvider; 3] = [AIProvider::Gemini, AIProvider::ChatGpt, AIProvider::Mistral];

    /// Stable lowercase name, used for key lookup and display
    pub fn name(&self) -> &'static str {
        match self {
            AIProvider::Gemini => "gemini",
            AIProvider::ChatGpt => "chatgpt",
            AIProvider::Mistral => "mistral",
        }
    }

    /// Human-facing name
    pub fn label(&self) -> &'static str {
        match self {
            AIProvider::Gemini => "Gemini",
            AIProvider::ChatGpt => "ChatGPT",
            AIProvider::Mistral => "Mistral",
        }
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::Gemini => "gemini-pro",
            AIProvider::ChatGpt => "gpt-3.5-turbo",
            AIProvider::Mistral => "mistral-tiny",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gemini" => Some(AIProvider::Gemini),
            "chatgpt" | "openai" => Some(AIProvider::ChatGpt),
            "mistral" => Some(AIProvider::Mistral),
            _ => None,
        }
    }
}

/// Shape the provider is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Html,
    Csv,
}

/// Sections the provider is asked to include in each answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseStructure {
    pub title: bool,
    pub description: bool,
    pub keywords: bool,
    pub categories: bool,
    pub summary: bool,
    pub analysis: bool,
    pub custom: Vec<String>,
}

impl Default for ResponseStructure {
    fn default() -> Self {
        Self {
            title: true,
            description: true,
            keywords: false,
            categories: false,
            summary: false,
            analysis: false,
            custom: Vec::new(),
        }
    }
}

/// Where a column job reports guidance and failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusChannel {
    /// The column's own status field; cell data is never overwritten
    #[default]
    ColumnStatus,
    /// The first cell of the column (legacy behaviour)
    FirstCell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub ai_provider: AIProvider,

    /// Model identifier (empty = provider default)
    pub ai_model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Pause between two rows of a column job
    pub processing_delay_ms: u64,

    /// Requests per minute across all providers
    pub rate_limit_per_minute: u32,

    pub auto_save: bool,

    pub response_format: ResponseFormat,

    pub response_structure: ResponseStructure,

    pub status_channel: StatusChannel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_provider: AIProvider::Gemini,
            ai_model: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
            processing_delay_ms: 1000,
            rate_limit_per_minute: 60,
            auto_save: false,
            response_format: ResponseFormat::Text,
            response_structure: ResponseStructure::default(),
            status_channel: StatusChannel::ColumnStatus,
        }
    }
}

impl Settings {
    /// Get the effective model (user-specified or provider default)
    pub fn effective_model(&self) -> &str {
        if self.ai_model.trim().is_empty() {
            self.ai_provider.default_model()
        } else {
            &self.ai_model
        }
    }

    /// Clamp numeric settings into the ranges providers accept
    pub fn validated(mut self) -> Self {
        let temperature = if self.temperature.is_finite() { self.temperature } else { 0.7 };
        self.temperature = temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self.max_tokens = self.max_tokens.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1);
        self.rate_limit_per_minute = self.rate_limit_per_minute.max(1);
        self
    }

    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promptgrid");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file. Lines starting with `//` are
    /// treated as comments.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse settings JSON (comment lines allowed)
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let settings: Self = serde_json::from_str(&cleaned)?;
        Ok(settings.validated())
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;

        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
