//! Code classification collaborator trait.

use async_trait::async_trait;

use super::error::ClassifierError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known {
        language: String,
        explanation: Option<String>,
    },
    Unknown,
}

impl Classification {
    /// Normalize a raw classifier answer: an empty language or "unknown"
    /// (any case) is `Unknown`.
    pub fn from_raw(language: &str, explanation: Option<String>) -> Self {
        let language = language.trim();
        if language.is_empty() || language.eq_ignore_ascii_case("unknown") {
            return Self::Unknown;
        }
        Self::Known {
            language: language.to_string(),
            explanation: explanation.filter(|text| !text.trim().is_empty()),
        }
    }
}

/// Identifies the language of a code snippet and explains it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeClassifier: Send + Sync {
    async fn classify(&self, code: &str) -> Result<Classification, ClassifierError>;
}
