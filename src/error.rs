//! Error types for the analysis pipeline
//!
//! Collaborator failures (`ClassifierError`, `TranslationError`,
//! `GeneratorError`) are absorbed by defaults and fallbacks and only ever
//! reach the logs. `RecommendationError` is the caller-visible rejection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Request exceeded the per-classifier timeout
    #[error("classifier request timed out")]
    Timeout,

    /// HTTP 503: the hosted model is still warming up
    #[error("classifier model is loading")]
    Loading,

    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("classifier request failed: {0}")]
    Network(String),

    #[error("could not parse classifier response: {0}")]
    Parse(String),
}

impl ClassifierError {
    /// Only cold starts and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Loading | Self::Timeout)
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("translator returned status {0}")]
    Status(u16),

    #[error("translator returned an empty translation")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("text generator is not configured")]
    NotConfigured,

    #[error("generator request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator returned no text")]
    EmptyResponse,
}

#[derive(Debug, Error, PartialEq)]
pub enum RecommendationError {
    #[error(
        "at least {required} student messages from the last {window_days} days are needed \
         to generate a recommendation (found {found})"
    )]
    InsufficientData {
        found: usize,
        required: usize,
        window_days: i64,
    },

    #[error("no significant emotional pattern was detected in the last {window_days} days")]
    NoSignificantPattern { window_days: i64 },
}
