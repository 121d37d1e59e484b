//! Natural-language-to-SQL translation.
//!
//! The translator is an external collaborator: it turns a question plus a
//! schema description into candidate SQL and an optional summary template.
//! Its output is untrusted and always goes through the validator.

pub mod mock;
pub mod openai;
pub mod prompt;
pub mod response;

pub use mock::MockTranslator;
pub use openai::OpenAiTranslator;
pub use prompt::{build_prompt, describe_schema, SYSTEM_PROMPT};
pub use response::parse_response;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from a translation attempt. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("question is empty")]
    EmptyQuestion,

    /// No API key or endpoint.
    #[error("translator is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("translation timed out after {0}s")]
    Timeout(u64),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Output could not be read as SQL.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Kind of operation a question most likely asks for.
///
/// Only used to pick the worked examples embedded in the prompt; the
/// validator decides what may actually run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationHint {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

const DELETE_WORDS: &[&str] = &["delete", "remove", "drop"];
const UPDATE_WORDS: &[&str] = &["update", "modify", "change"];
const INSERT_WORDS: &[&str] = &["insert", "add", "create"];
const SELECT_WORDS: &[&str] = &[
    "join", "select", "find", "list", "show", "retrieve", "get", "count",
];

impl OperationHint {
    /// Classify a question by keyword, checked in the order delete, update,
    /// insert, select.
    pub fn detect(question: &str) -> Self {
        let lower = question.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_any = |list: &[&str]| words.iter().any(|w| list.contains(w));

        if has_any(DELETE_WORDS) {
            OperationHint::Delete
        } else if has_any(UPDATE_WORDS) {
            OperationHint::Update
        } else if has_any(INSERT_WORDS) {
            OperationHint::Insert
        } else if has_any(SELECT_WORDS) || lower.contains("how many") {
            OperationHint::Select
        } else {
            OperationHint::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationHint::Select => "select",
            OperationHint::Insert => "insert",
            OperationHint::Update => "update",
            OperationHint::Delete => "delete",
            OperationHint::Other => "other",
        }
    }
}

impl fmt::Display for OperationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to a translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationRequest {
    pub question: String,
    /// Rendered by [`describe_schema`].
    pub schema_description: String,
    pub operation_hint: OperationHint,
}

impl TranslationRequest {
    pub fn new(question: impl Into<String>, schema_description: impl Into<String>) -> Self {
        let question = question.into();
        let operation_hint = OperationHint::detect(&question);
        Self {
            question,
            schema_description: schema_description.into(),
            operation_hint,
        }
    }
}

/// Candidate SQL plus an optional summary template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub sql: String,
    pub template: Option<String>,
}

/// Turns a question into candidate SQL. Implementations make exactly one
/// attempt per call.
pub trait SqlTranslator: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslationError>;
}

impl<T: SqlTranslator + ?Sized> SqlTranslator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslationError> {
        (**self).translate(request)
    }
}
