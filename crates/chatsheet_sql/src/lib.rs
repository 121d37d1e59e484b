//! SQL validation for ChatSheet.
//!
//! Every statement, whether typed by a user or produced by a language model,
//! passes through [`Validator::validate`] before it reaches the database.
//!
//! ```rust,ignore
//! use chatsheet_sql::validate;
//!
//! let result = validate(&registry, "SELECT name FROM people;");
//! assert_eq!(result.normalized_sql.as_deref(), Some("SELECT name FROM people"));
//! ```

pub mod lexer;
pub mod parser;
pub mod validator;

pub use lexer::{tokenize, LexError, Token, TokenKind};
pub use parser::{parse, ColumnRef, ParseError, References, Statement, StatementKind, TableRef};
pub use validator::{
    validate, Rejection, ValidationResult, Validator, ValidatorConfig, FORBIDDEN_KEYWORDS,
};
