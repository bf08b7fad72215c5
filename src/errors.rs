use thiserror::Error;

/// Top-level application error shared by the core and the relay.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Please select at least one model")]
    NoModelSelected,

    #[error("No completed responses to synthesize")]
    NothingToSynthesize,

    #[error("{what} is already running")]
    AlreadyRunning { what: String },

    // ── Transport errors ─────────────────────────────────────────────────────
    #[error("API error: {status} - {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream read failed: {0}")]
    StreamRead(String),

    // ── Configuration / catalog ──────────────────────────────────────────────
    #[error("API key not configured on server")]
    MissingApiKey,

    #[error("Failed to load model catalog from {path}: {source}")]
    CatalogUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn empty_field(field_name: impl Into<String>) -> Self {
        AppError::EmptyField { field_name: field_name.into() }
    }

    pub fn already_running(what: impl Into<String>) -> Self {
        AppError::AlreadyRunning { what: what.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::NoModelSelected
                | AppError::NothingToSynthesize
                | AppError::AlreadyRunning { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamStatus { .. } | AppError::Network(_) | AppError::StreamRead(_)
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Network(e.to_string())
    }
}
