use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_APP_URL: &str = "http://localhost:5174";
pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODELS_FILE: &str = "models.txt";

const PLACEHOLDER_API_KEY: &str = "your_openrouter_api_key_here";

/// Relay server settings, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// `None` when unset, blank, or still the `.env.example` placeholder.
    pub api_key: Option<String>,
    pub port: u16,
    pub app_url: String,
    pub upstream_url: String,
    pub models_file: PathBuf,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = lookup("OPENROUTER_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY);
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            api_key,
            port,
            app_url: lookup("APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            upstream_url: lookup("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            models_file: lookup("MODELS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_FILE)),
        }
    }
}
