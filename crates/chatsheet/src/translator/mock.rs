//! Mock translator for deterministic tests and offline use.
//!
//! Replies are queued and consumed in order. With an empty queue the mock
//! returns an error, unless it was built with [`MockTranslator::echo`], in
//! which case the question itself is parsed as the reply.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{parse_response, SqlTranslator, Translation, TranslationError, TranslationRequest};

pub struct MockTranslator {
    /// Raw replies, parsed with [`parse_response`] when consumed
    responses: Mutex<VecDeque<Result<String, TranslationError>>>,
    /// Every request received, for assertions
    received: Mutex<Vec<TranslationRequest>>,
    echo: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTranslator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Translator that answers each question with the question itself, so
    /// `SELECT ...` typed at the prompt runs as-is.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Queue a raw model reply (`SQL: ...` / `TEMPLATE: ...`).
    pub fn queue_response(&self, text: impl Into<String>) {
        lock(&self.responses).push_back(Ok(text.into()));
    }

    /// Queue a reply that is just `sql`.
    pub fn queue_sql(&self, sql: impl Into<String>) {
        self.queue_response(format!("SQL: {}", sql.into()));
    }

    pub fn queue_error(&self, error: TranslationError) {
        lock(&self.responses).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<TranslationRequest> {
        lock(&self.received).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlTranslator for MockTranslator {
    fn name(&self) -> &str {
        if self.echo {
            "echo"
        } else {
            "mock"
        }
    }

    fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslationError> {
        lock(&self.received).push(request.clone());

        let next = lock(&self.responses).pop_front();
        match next {
            Some(reply) => parse_response(&reply?),
            None if self.echo => parse_response(&request.question),
            None => Err(TranslationError::Internal(
                "no mock responses queued".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(question: &str) -> TranslationRequest {
        TranslationRequest::new(question, "Table: people")
    }

    #[test]
    fn test_queued_in_order() {
        let mock = MockTranslator::new();
        mock.queue_sql("SELECT 1");
        mock.queue_response("SQL: SELECT 2\nTEMPLATE: two");
        assert_eq!(mock.remaining(), 2);

        assert_eq!(mock.translate(&request("a")).unwrap().sql, "SELECT 1");
        let second = mock.translate(&request("b")).unwrap();
        assert_eq!(second.sql, "SELECT 2");
        assert_eq!(second.template.as_deref(), Some("two"));

        let asked: Vec<String> = mock.requests().into_iter().map(|r| r.question).collect();
        assert_eq!(asked, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_queue_is_an_error() {
        let mock = MockTranslator::new();
        let err = mock.translate(&request("anything")).unwrap_err();
        assert!(matches!(err, TranslationError::Internal(_)));
    }

    #[test]
    fn test_queued_error() {
        let mock = MockTranslator::new();
        mock.queue_error(TranslationError::Timeout(30));
        assert_eq!(
            mock.translate(&request("q")).unwrap_err(),
            TranslationError::Timeout(30)
        );
    }

    #[test]
    fn test_echo() {
        let mock = MockTranslator::echo();
        let translation = mock.translate(&request("SELECT name FROM people")).unwrap();
        assert_eq!(translation.sql, "SELECT name FROM people");
        assert!(mock.translate(&request("who is here?")).is_err());
    }
}
