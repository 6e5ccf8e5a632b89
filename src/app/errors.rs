use crate::cache::CacheError;
use crate::llm::LlmError;
use crate::pubmed::FetchError;
use crate::qa::QaError;
use crate::translate::TranslateError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no PMIDs given (expected a comma-separated list such as \"12345, 67890\")")]
    NoPmids,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("abstract fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Qa(#[from] QaError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl AppError {
    /// Actionable follow-up for errors the user can fix or retry.
    pub fn hint(&self) -> Option<String> {
        let llm = match self {
            AppError::Llm(e) | AppError::Qa(QaError::Model(e)) => Some(e),
            _ => None,
        };
        if let Some(e) = llm {
            return llm_hint(e);
        }

        match self {
            AppError::Timeout(_) => Some("raise --timeout or ask about fewer PMIDs".to_string()),
            AppError::Fetch(FetchError::Status(429)) => {
                Some("NCBI rate limit hit (retriable); wait a moment and rerun".to_string())
            }
            AppError::Fetch(FetchError::Cache(e))
            | AppError::Qa(QaError::Cache(e))
            | AppError::Translate(TranslateError::Cache(e))
            | AppError::Cache(e) => cache_hint(e),
            AppError::Translate(TranslateError::Unit { .. }) => {
                Some("rerun without --strict to keep the other translations".to_string())
            }
            _ => None,
        }
    }
}

fn llm_hint(e: &LlmError) -> Option<String> {
    match e {
        LlmError::ApiKeyNotSet | LlmError::Unauthorized(_) => {
            Some("set OPENAI_API_KEY to a valid key".to_string())
        }
        LlmError::RateLimited => Some("rate limited (retriable); retry later".to_string()),
        LlmError::Api { code: 500..=599, .. } => {
            Some("model service error (retriable); retry later".to_string())
        }
        _ => None,
    }
}

fn cache_hint(e: &CacheError) -> Option<String> {
    match e {
        CacheError::Corrupt { path, .. } => Some(format!(
            "move {} aside or pass --cache with another file",
            path.display()
        )),
        CacheError::Io { path, .. } => Some(format!(
            "check that {} is writable, or pass --no-cache-file",
            path.display()
        )),
        CacheError::Serialize(_) => None,
    }
}
