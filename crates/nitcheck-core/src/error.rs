use thiserror::Error;

/// Core error types for NitCheck operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unsupported country: {0}")]
    UnsupportedCountry(String),

    #[error("Invalid website URL: {0}")]
    InvalidWebsite(String),

    #[error("Invalid reference id: {0}")]
    InvalidReferenceId(String),

    #[error("Invalid clinic record: {message}")]
    InvalidClinic { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time formatting error: {0}")]
    TimeError(#[from] time::error::Format),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new UnsupportedCountry error
    pub fn unsupported_country(country: impl Into<String>) -> Self {
        Self::UnsupportedCountry(country.into())
    }

    /// Create a new InvalidClinic error
    pub fn invalid_clinic(message: impl Into<String>) -> Self {
        Self::InvalidClinic {
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCountry(_)
                | Self::InvalidWebsite(_)
                | Self::InvalidReferenceId(_)
                | Self::InvalidClinic { .. }
                | Self::JsonError(_)
                | Self::UrlError(_)
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::TimeError(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedCountry(_)
            | Self::InvalidWebsite(_)
            | Self::InvalidReferenceId(_)
            | Self::InvalidClinic { .. }
            | Self::UrlError(_) => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeError(_) => ErrorCategory::System,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
    System,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
