//! Restricted SQL grammar.
//!
//! Recognises the clause structure of `SELECT` (with `WITH`, set operations,
//! joins and subqueries), `INSERT`, `UPDATE` and `DELETE`. Expressions are
//! scanned rather than parsed: the scanner only tells column references
//! apart from keywords, literals, function names, type names and aliases.
//! Any other leading keyword becomes [`Statement::Other`].

pub mod ast;

pub use ast::{
    ColumnRef, CommonTable, DeleteStatement, InsertStatement, OutputColumn, QueryScope,
    References, Statement, StatementKind, TableRef, TableSource, UpdateStatement,
};

use thiserror::Error;

use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// Bracket and subquery nesting accepted before giving up.
pub const MAX_NESTING: usize = 256;

/// Keywords that end an expression at clause level.
const CLAUSE_KEYWORDS: &[&str] = &[
    "ANTI", "ASOF", "CROSS", "EXCEPT", "FETCH", "FROM", "FULL", "GROUP", "HAVING", "INNER",
    "INTERSECT", "INTO", "JOIN", "LEFT", "LIMIT", "NATURAL", "OFFSET", "ON", "ORDER",
    "POSITIONAL", "QUALIFY", "RETURNING", "RIGHT", "SEMI", "SET", "UNION", "USING", "VALUES",
    "WHERE", "WINDOW",
];

/// Keywords that may appear inside expressions and are never column names.
const EXPR_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "AT", "BETWEEN", "BOTH", "BY", "CASE", "COLLATE",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "ELSE", "END", "ESCAPE", "EXCLUDE", "EXISTS", "FALSE", "FILTER",
    "FOLLOWING", "FOR", "GLOB", "GROUPS", "ILIKE", "IN", "INSERT", "INTERVAL", "IS", "LATERAL",
    "LEADING", "LIKE", "LOCALTIME", "LOCALTIMESTAMP", "MATERIALIZED", "NOT", "NULL", "NULLS",
    "ONLY", "OR", "OTHERS", "OVER", "PARTITION", "PRECEDING", "RANGE", "RECURSIVE", "RENAME",
    "REPLACE", "ROW", "ROWS", "SELECT", "SIMILAR", "SOME", "THEN", "TIES", "TO", "TRAILING",
    "TRUE", "UNBOUNDED", "UPDATE", "WHEN", "WITH", "WITHIN",
];

/// Keywords that end an operand, so a following bare word is an alias.
const OPERAND_KEYWORDS: &[&str] = &[
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "DEFAULT",
    "END",
    "FALSE",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NULL",
    "TRUE",
];

/// Keywords that double as function names when followed by `(`.
const FUNCTION_KEYWORDS: &[&str] = &["LEFT", "REPLACE", "RIGHT"];

/// Trailing words of multi-word type names (`DOUBLE PRECISION`, ...).
const TYPE_SUFFIX_WORDS: &[&str] = &["PRECISION", "VARYING", "WITH", "WITHOUT", "TIME", "ZONE"];

const JOIN_MODIFIERS: &[&str] = &[
    "NATURAL",
    "INNER",
    "LEFT",
    "RIGHT",
    "FULL",
    "OUTER",
    "CROSS",
    "SEMI",
    "ANTI",
    "POSITIONAL",
    "ASOF",
];

fn contains(list: &[&str], upper: &str) -> bool {
    list.contains(&upper)
}

fn is_clause_keyword(upper: &str) -> bool {
    contains(CLAUSE_KEYWORDS, upper)
}

/// Any word that is never treated as a table, column or alias name.
pub fn is_keyword(upper: &str) -> bool {
    is_clause_keyword(upper) || contains(EXPR_KEYWORDS, upper) || upper == "OUTER"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    /// Top-level select list or `RETURNING` list: aliases are recorded.
    SelectList,
    /// `WHERE`, `GROUP BY`, `ORDER BY`, ...
    Clause { stop_on_comma: bool },
    /// Inside brackets: only a closing bracket ends the scan.
    Nested,
}

/// Parse one statement (no trailing `;`).
pub fn parse(tokens: &[Token]) -> Result<Statement, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope: 0,
        depth: 0,
        item_alias: None,
        refs: References {
            scopes: vec![QueryScope::root()],
            ..References::default()
        },
    };
    let statement = parser.statement()?;
    if matches!(statement, Statement::Other(_)) {
        return Ok(statement);
    }
    if let Some(tok) = parser.peek() {
        return Err(parser.error_at(tok, format!("unexpected '{}'", tok.kind)));
    }
    Ok(statement)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Query scope new tables and columns are recorded in.
    scope: usize,
    depth: usize,
    /// Alias of the select-list item being scanned.
    item_alias: Option<String>,
    refs: References,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n)
    }

    fn peek_upper(&self) -> Option<String> {
        self.peek().and_then(Token::word_upper)
    }

    fn peek_is_word(&self, upper: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(upper))
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    fn eat_word(&mut self, upper: &str) -> bool {
        if self.peek_is_word(upper) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_is(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, upper: &str) -> Result<(), ParseError> {
        if self.eat_word(upper) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", upper)))
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", kind)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let offset = self
            .peek()
            .map(|t| t.offset)
            .or_else(|| self.tokens.last().map(|t| t.offset))
            .unwrap_or(0);
        let mut message = message.into();
        match self.peek() {
            Some(tok) => message.push_str(&format!(", found '{}'", tok.kind)),
            None => message.push_str(", found end of statement"),
        }
        ParseError { message, offset }
    }

    fn error_at(&self, tok: &Token, message: String) -> ParseError {
        ParseError {
            message,
            offset: tok.offset,
        }
    }

    fn take_refs(&mut self) -> References {
        std::mem::take(&mut self.refs)
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {MAX_NESTING} levels")));
        }
        Ok(())
    }

    /// Open a child scope of the current one. Returns the scope to restore.
    fn enter_scope(&mut self) -> usize {
        let id = self.refs.scopes.len();
        self.refs.scopes.push(QueryScope {
            parent: Some(self.scope),
            outputs: Some(Vec::new()),
        });
        std::mem::replace(&mut self.scope, id)
    }

    fn push_output(&mut self, output: Option<OutputColumn>) {
        let Some(scope) = self.refs.scopes.get_mut(self.scope) else {
            return;
        };
        match output {
            Some(output) => {
                if let Some(outputs) = scope.outputs.as_mut() {
                    outputs.push(output);
                }
            }
            None => scope.outputs = None,
        }
    }

    fn push_column(&mut self, qualifier: Option<String>, name: String) {
        self.refs.columns.push(ColumnRef {
            qualifier,
            name,
            scope: self.scope,
        });
    }

    /// Identifier (bare non-keyword word or quoted).
    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(w)) if !is_keyword(&w.to_ascii_uppercase()) => {
                self.pos += 1;
                Ok(w.clone())
            }
            Some(TokenKind::QuotedIdent(w)) => {
                self.pos += 1;
                Ok(w.clone())
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// `a`, `a.b`, `a.*`: words, quoted identifiers and `*` joined by dots.
    fn name_chain(&mut self) -> Vec<String> {
        let mut parts = Vec::new();
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(w)) | Some(TokenKind::QuotedIdent(w)) => {
                parts.push(w.clone());
                self.pos += 1;
            }
            _ => return parts,
        }
        while self.peek_is(&TokenKind::Dot) {
            match self.peek_at(1).map(|t| &t.kind) {
                Some(TokenKind::Word(w)) | Some(TokenKind::QuotedIdent(w)) => {
                    parts.push(w.clone());
                    self.pos += 2;
                }
                Some(TokenKind::Operator(op)) if op == "*" => {
                    parts.push("*".to_string());
                    self.pos += 2;
                }
                _ => break,
            }
        }
        parts
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let Some(first) = self.peek() else {
            return Err(self.error("empty statement"));
        };

        if first.kind == TokenKind::LParen {
            self.query()?;
            return Ok(Statement::Select(self.take_refs()));
        }

        let Some(upper) = first.word_upper() else {
            return Ok(Statement::Other(first.kind.to_string()));
        };

        match upper.as_str() {
            "WITH" => {
                self.pos += 1;
                self.with_clause()?;
                match self.peek_upper().as_deref() {
                    Some("INSERT") => self.insert(),
                    Some("UPDATE") => self.update(),
                    Some("DELETE") => self.delete(),
                    _ => {
                        self.set_expr()?;
                        Ok(Statement::Select(self.take_refs()))
                    }
                }
            }
            "SELECT" | "VALUES" | "FROM" => {
                self.query()?;
                Ok(Statement::Select(self.take_refs()))
            }
            "INSERT" => self.insert(),
            "UPDATE" => self.update(),
            "DELETE" => self.delete(),
            _ => Ok(Statement::Other(upper)),
        }
    }

    fn insert(&mut self) -> Result<Statement, ParseError> {
        self.expect_word("INSERT")?;
        if self.eat_word("OR") && !(self.eat_word("REPLACE") || self.eat_word("IGNORE")) {
            return Err(self.error("expected REPLACE or IGNORE"));
        }
        self.expect_word("INTO")?;
        let table = self.target_table()?;

        let mut columns = Vec::new();
        let column_list = self.peek_is(&TokenKind::LParen)
            && match self.peek_at(1).map(|t| &t.kind) {
                Some(TokenKind::QuotedIdent(_)) => true,
                Some(TokenKind::Word(w)) => !matches!(
                    w.to_ascii_uppercase().as_str(),
                    "SELECT" | "WITH" | "VALUES" | "FROM"
                ),
                _ => false,
            };
        if column_list {
            self.pos += 1;
            loop {
                columns.push(self.ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }

        if self.eat_word("BY") && !(self.eat_word("NAME") || self.eat_word("POSITION")) {
            return Err(self.error("expected NAME or POSITION"));
        }

        if self.eat_word("DEFAULT") {
            self.expect_word("VALUES")?;
        } else {
            self.query()?;
        }

        if self.eat_word("ON") {
            self.expect_word("CONFLICT")?;
            if self.eat(&TokenKind::LParen) {
                self.scan(Ctx::Nested)?;
                self.expect(&TokenKind::RParen)?;
            }
            self.expect_word("DO")?;
            self.expect_word("NOTHING")?;
        }
        if self.eat_word("RETURNING") {
            self.scan(Ctx::SelectList)?;
        }

        Ok(Statement::Insert(InsertStatement {
            table,
            columns,
            refs: self.take_refs(),
        }))
    }

    fn update(&mut self) -> Result<Statement, ParseError> {
        self.expect_word("UPDATE")?;
        let table = self.target_table()?;
        self.expect_word("SET")?;

        let mut assignments = Vec::new();
        loop {
            let parts = self.name_chain();
            let Some(column) = parts.last() else {
                return Err(self.error("expected column name"));
            };
            assignments.push(column.clone());
            if !self.peek().is_some_and(|t| t.is_operator("=")) {
                return Err(self.error("expected '='"));
            }
            self.pos += 1;
            self.scan(Ctx::Clause {
                stop_on_comma: true,
            })?;
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        if self.eat_word("FROM") {
            self.from_list()?;
        }
        if self.eat_word("WHERE") {
            self.scan(Ctx::Clause {
                stop_on_comma: false,
            })?;
        }
        if self.eat_word("RETURNING") {
            self.scan(Ctx::SelectList)?;
        }

        Ok(Statement::Update(UpdateStatement {
            table,
            assignments,
            refs: self.take_refs(),
        }))
    }

    fn delete(&mut self) -> Result<Statement, ParseError> {
        self.expect_word("DELETE")?;
        self.expect_word("FROM")?;
        let table = self.target_table()?;

        if self.eat_word("USING") {
            self.from_list()?;
        }
        if self.eat_word("WHERE") {
            self.scan(Ctx::Clause {
                stop_on_comma: false,
            })?;
        }
        if self.eat_word("RETURNING") {
            self.scan(Ctx::SelectList)?;
        }

        Ok(Statement::Delete(DeleteStatement {
            table,
            refs: self.take_refs(),
        }))
    }

    /// DML target: a plain table name with an optional alias.
    fn target_table(&mut self) -> Result<TableRef, ParseError> {
        let parts = self.name_chain();
        let Some(name) = parts.last().cloned() else {
            return Err(self.error("expected table name"));
        };
        if parts.len() > 1 {
            self.refs.qualified_tables.push(parts.join("."));
        }
        let alias = self.optional_alias()?;
        let table = TableRef {
            name,
            alias,
            source: TableSource::Table,
            columns: Vec::new(),
            body: None,
            scope: self.scope,
        };
        self.refs.tables.push(table.clone());
        Ok(table)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Returns the scope of the first `SELECT` body, which names the
    /// query's output columns.
    fn query(&mut self) -> Result<usize, ParseError> {
        self.descend()?;
        if self.eat_word("WITH") {
            self.with_clause()?;
        }
        let first = self.set_expr()?;
        self.depth -= 1;
        Ok(first)
    }

    fn with_clause(&mut self) -> Result<(), ParseError> {
        self.eat_word("RECURSIVE");
        loop {
            let name = self.ident()?;
            let mut columns = Vec::new();
            if self.eat(&TokenKind::LParen) {
                loop {
                    columns.push(self.ident()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
            }
            // Registered before the body so recursive references resolve.
            let index = self.refs.ctes.len();
            self.refs.ctes.push(CommonTable {
                name,
                columns,
                body: None,
            });
            self.expect_word("AS")?;
            self.eat_word("NOT");
            self.eat_word("MATERIALIZED");
            self.expect(&TokenKind::LParen)?;
            let body = self.query()?;
            self.expect(&TokenKind::RParen)?;
            if let Some(cte) = self.refs.ctes.get_mut(index) {
                cte.body = Some(body);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(())
    }

    fn set_expr(&mut self) -> Result<usize, ParseError> {
        let first = self.select_core()?;
        while matches!(
            self.peek_upper().as_deref(),
            Some("UNION") | Some("INTERSECT") | Some("EXCEPT")
        ) {
            self.pos += 1;
            if !self.eat_word("ALL") {
                self.eat_word("DISTINCT");
            }
            if self.eat_word("BY") {
                self.expect_word("NAME")?;
            }
            self.select_core()?;
        }

        // ORDER BY and LIMIT cover the whole set and resolve like its first body.
        let outer = std::mem::replace(&mut self.scope, first);
        self.query_tail()?;
        self.scope = outer;
        Ok(first)
    }

    fn select_core(&mut self) -> Result<usize, ParseError> {
        if self.eat(&TokenKind::LParen) {
            let inner = self.query()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(inner);
        }

        let outer = self.enter_scope();
        let core = self.scope;

        if self.eat_word("VALUES") {
            loop {
                self.expect(&TokenKind::LParen)?;
                self.scan(Ctx::Nested)?;
                self.expect(&TokenKind::RParen)?;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.push_output(None);
        } else if self.eat_word("FROM") {
            // DuckDB's FROM-first form: `FROM t [SELECT ...]`.
            self.from_list()?;
            if self.eat_word("SELECT") {
                self.select_list()?;
            } else {
                self.push_output(Some(OutputColumn::Wildcard(None)));
            }
            self.core_clauses()?;
        } else {
            self.expect_word("SELECT")?;
            self.select_list()?;
            if self.eat_word("FROM") {
                self.from_list()?;
            }
            self.core_clauses()?;
        }

        self.scope = outer;
        Ok(core)
    }

    fn select_list(&mut self) -> Result<(), ParseError> {
        if self.eat_word("DISTINCT") {
            if self.eat_word("ON") {
                self.expect(&TokenKind::LParen)?;
                self.scan(Ctx::Nested)?;
                self.expect(&TokenKind::RParen)?;
            }
        } else {
            self.eat_word("ALL");
        }
        self.scan(Ctx::SelectList)
    }

    /// `WHERE` through `WINDOW`, in any order.
    fn core_clauses(&mut self) -> Result<(), ParseError> {
        let clause = Ctx::Clause {
            stop_on_comma: false,
        };
        loop {
            match self.peek_upper().as_deref() {
                Some("WHERE") | Some("HAVING") | Some("QUALIFY") => {
                    self.pos += 1;
                    self.scan(clause)?;
                }
                Some("GROUP") => {
                    self.pos += 1;
                    self.expect_word("BY")?;
                    self.scan(clause)?;
                }
                Some("WINDOW") => {
                    self.pos += 1;
                    loop {
                        self.ident()?;
                        self.expect_word("AS")?;
                        self.expect(&TokenKind::LParen)?;
                        self.scan(Ctx::Nested)?;
                        self.expect(&TokenKind::RParen)?;
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// `ORDER BY`, `LIMIT`, `OFFSET` and `FETCH`, in any order.
    fn query_tail(&mut self) -> Result<(), ParseError> {
        let clause = Ctx::Clause {
            stop_on_comma: false,
        };
        loop {
            match self.peek_upper().as_deref() {
                Some("LIMIT") | Some("OFFSET") => {
                    self.pos += 1;
                    self.scan(clause)?;
                }
                Some("ORDER") => {
                    self.pos += 1;
                    self.expect_word("BY")?;
                    self.scan(clause)?;
                }
                Some("FETCH") => {
                    self.pos += 1;
                    while let Some(tok) = self.peek() {
                        let skip = match &tok.kind {
                            TokenKind::Number(_) => true,
                            TokenKind::Word(w) => matches!(
                                w.to_ascii_uppercase().as_str(),
                                "FIRST" | "NEXT" | "ROW" | "ROWS" | "ONLY" | "WITH" | "TIES"
                            ),
                            _ => false,
                        };
                        if !skip {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    // ---------------------------------------------------------------------
    // FROM
    // ---------------------------------------------------------------------

    fn from_list(&mut self) -> Result<(), ParseError> {
        self.descend()?;
        loop {
            self.from_item()?;
            while self.at_join() {
                self.join()?;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn at_join(&self) -> bool {
        let mut n = 0;
        while let Some(upper) = self.peek_at(n).and_then(Token::word_upper) {
            if upper == "JOIN" {
                return true;
            }
            if !contains(JOIN_MODIFIERS, &upper) {
                return false;
            }
            n += 1;
        }
        false
    }

    fn join(&mut self) -> Result<(), ParseError> {
        while !self.eat_word("JOIN") && self.peek().is_some() {
            self.pos += 1;
        }
        self.from_item()?;
        if self.eat_word("ON") {
            self.scan(Ctx::Clause {
                stop_on_comma: true,
            })?;
        } else if self.eat_word("USING") {
            self.expect(&TokenKind::LParen)?;
            loop {
                let name = self.ident()?;
                self.push_column(None, name);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        Ok(())
    }

    fn from_item(&mut self) -> Result<(), ParseError> {
        self.eat_word("LATERAL");

        let Some(tok) = self.peek() else {
            return Err(self.error("expected table"));
        };

        match &tok.kind {
            TokenKind::LParen => {
                self.pos += 1;
                let subquery = matches!(
                    self.peek_upper().as_deref(),
                    Some("SELECT") | Some("WITH") | Some("VALUES") | Some("FROM")
                ) || self.peek_is(&TokenKind::LParen);
                if subquery {
                    let body = self.query()?;
                    self.expect(&TokenKind::RParen)?;
                    let alias = self.optional_alias()?;
                    let columns = self.column_aliases()?;
                    self.refs.tables.push(TableRef {
                        name: alias.clone().unwrap_or_default(),
                        alias,
                        source: TableSource::Derived,
                        columns,
                        body: Some(body),
                        scope: self.scope,
                    });
                } else {
                    self.from_list()?;
                    self.expect(&TokenKind::RParen)?;
                    self.optional_alias()?;
                }
            }
            TokenKind::Str(path) => {
                self.pos += 1;
                self.refs.file_references.push(path.clone());
                self.optional_alias()?;
                self.column_aliases()?;
            }
            TokenKind::Word(_) | TokenKind::QuotedIdent(_) => {
                if let TokenKind::Word(w) = &tok.kind {
                    let upper = w.to_ascii_uppercase();
                    if is_clause_keyword(&upper) || upper == "SELECT" || upper == "WITH" {
                        return Err(self.error("expected table name"));
                    }
                }
                let parts = self.name_chain();
                let name = parts.last().cloned().unwrap_or_default();

                if self.eat(&TokenKind::LParen) {
                    self.refs.table_functions.push(parts.join("."));
                    self.scan(Ctx::Nested)?;
                    self.expect(&TokenKind::RParen)?;
                    self.optional_alias()?;
                    self.column_aliases()?;
                    return Ok(());
                }

                if parts.len() > 1 {
                    self.refs.qualified_tables.push(parts.join("."));
                }
                let cte = match parts.len() {
                    1 => self.refs.cte(&name).cloned(),
                    _ => None,
                };
                let alias = self.optional_alias()?;
                let mut columns = self.column_aliases()?;
                let (source, body) = match cte {
                    Some(cte) => {
                        if columns.is_empty() {
                            columns = cte.columns;
                        }
                        (TableSource::Cte, cte.body)
                    }
                    None => (TableSource::Table, None),
                };
                self.refs.tables.push(TableRef {
                    name,
                    alias,
                    source,
                    columns,
                    body,
                    scope: self.scope,
                });
            }
            _ => return Err(self.error("expected table")),
        }
        Ok(())
    }

    fn optional_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.eat_word("AS") {
            return self.ident().map(Some);
        }
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(w)) if !is_keyword(&w.to_ascii_uppercase()) => {
                self.pos += 1;
                Ok(Some(w.clone()))
            }
            Some(TokenKind::QuotedIdent(w)) => {
                self.pos += 1;
                Ok(Some(w.clone()))
            }
            _ => Ok(None),
        }
    }

    /// `alias(a, b)` column renames after a FROM item.
    fn column_aliases(&mut self) -> Result<Vec<String>, ParseError> {
        let mut columns = Vec::new();
        let is_list = self.peek_is(&TokenKind::LParen)
            && matches!(
                self.peek_at(1).map(|t| &t.kind),
                Some(TokenKind::Word(_)) | Some(TokenKind::QuotedIdent(_))
            );
        if !is_list {
            return Ok(columns);
        }
        self.pos += 1;
        loop {
            columns.push(self.ident()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(columns)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// Body of `( ... )` after the opening bracket, up to but excluding `)`.
    fn paren_body(&mut self) -> Result<(), ParseError> {
        let subquery = matches!(
            self.peek_upper().as_deref(),
            Some("SELECT") | Some("WITH") | Some("VALUES") | Some("FROM")
        );
        if subquery {
            self.query().map(drop)
        } else {
            self.scan(Ctx::Nested)
        }
    }

    /// Skip a type name after `::` or `AS` in a cast.
    fn skip_type_name(&mut self) -> Result<(), ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(_)) | Some(TokenKind::QuotedIdent(_)) => {
                self.name_chain();
            }
            _ => return Err(self.error("expected type name")),
        }
        while self
            .peek_upper()
            .is_some_and(|u| contains(TYPE_SUFFIX_WORDS, &u))
        {
            self.pos += 1;
        }
        if self.eat(&TokenKind::LParen) {
            self.scan(Ctx::Nested)?;
            self.expect(&TokenKind::RParen)?;
        }
        while self.peek_is(&TokenKind::LBracket) {
            self.pos += 1;
            self.scan(Ctx::Nested)?;
            self.expect(&TokenKind::RBracket)?;
        }
        Ok(())
    }

    /// Scan an expression (or comma-separated list of them) collecting
    /// column references, functions and aliases.
    fn scan(&mut self, ctx: Ctx) -> Result<(), ParseError> {
        self.descend()?;
        self.scan_tokens(ctx)?;
        self.depth -= 1;
        Ok(())
    }

    fn scan_tokens(&mut self, ctx: Ctx) -> Result<(), ParseError> {
        let select_list = ctx == Ctx::SelectList;
        let mut item = self.start_item(select_list);
        let mut prev_operand = false;
        let mut prev_words: [Option<String>; 2] = [None, None];

        while let Some(tok) = self.peek() {
            let upper = tok.word_upper();
            let pushed_word = upper.clone();

            match &tok.kind {
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => break,
                TokenKind::Semicolon => break,
                TokenKind::Comma => {
                    if matches!(
                        ctx,
                        Ctx::Clause {
                            stop_on_comma: true
                        }
                    ) {
                        break;
                    }
                    if select_list {
                        self.finish_item(item);
                    }
                    self.pos += 1;
                    item = self.start_item(select_list);
                    prev_operand = false;
                }
                TokenKind::LParen => {
                    self.pos += 1;
                    self.paren_body()?;
                    self.expect(&TokenKind::RParen)?;
                    prev_operand = true;
                }
                TokenKind::LBracket => {
                    self.pos += 1;
                    self.scan(Ctx::Nested)?;
                    self.expect(&TokenKind::RBracket)?;
                    prev_operand = true;
                }
                TokenKind::LBrace => {
                    self.pos += 1;
                    self.scan(Ctx::Nested)?;
                    self.expect(&TokenKind::RBrace)?;
                    prev_operand = true;
                }
                TokenKind::Operator(op) if op == "::" => {
                    self.pos += 1;
                    self.skip_type_name()?;
                    prev_operand = true;
                }
                TokenKind::Operator(op) if op == "*" && !prev_operand => {
                    // Wildcard, not multiplication.
                    self.pos += 1;
                    prev_operand = true;
                }
                TokenKind::Operator(_) => {
                    self.pos += 1;
                    prev_operand = false;
                }
                TokenKind::Dot => {
                    // Field access on a bracketed expression: `(s).field`.
                    self.pos += 1;
                    if matches!(
                        self.peek().map(|t| &t.kind),
                        Some(TokenKind::Word(_)) | Some(TokenKind::QuotedIdent(_))
                    ) {
                        self.pos += 1;
                    }
                    prev_operand = true;
                }
                TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Parameter(_) => {
                    self.pos += 1;
                    prev_operand = true;
                }
                TokenKind::Word(_) | TokenKind::QuotedIdent(_) => {
                    let upper_ref = upper.as_deref().unwrap_or("");
                    if ctx != Ctx::Nested && self.is_stop_word(upper_ref, &prev_words) {
                        break;
                    }
                    prev_operand = self.word(ctx, tok, upper.as_deref(), prev_operand)?;
                }
            }

            prev_words = [prev_words[1].take(), pushed_word];
        }
        if select_list {
            self.finish_item(item);
        }
        Ok(())
    }

    /// Start of a select-list item: token position and column count.
    fn start_item(&mut self, select_list: bool) -> (usize, usize) {
        if select_list {
            self.item_alias = None;
        }
        (self.pos, self.refs.columns.len())
    }

    /// Record the output name of the select-list item ending here.
    fn finish_item(&mut self, (start, columns_before): (usize, usize)) {
        let alias = self.item_alias.take();
        let tokens = self.tokens;
        let span = tokens.get(start..self.pos).unwrap_or(&[]);
        let Some(first) = span.first() else {
            return;
        };
        let output = if let Some(alias) = alias {
            Some(OutputColumn::Named(alias))
        } else if first.is_operator("*") {
            Some(OutputColumn::Wildcard(None))
        } else {
            let bare = span.iter().all(|t| {
                matches!(
                    t.kind,
                    TokenKind::Word(_) | TokenKind::QuotedIdent(_) | TokenKind::Dot
                ) || t.is_operator("*")
            });
            match self.refs.columns.get(columns_before..) {
                Some([column]) if bare && column.is_wildcard() => {
                    Some(OutputColumn::Wildcard(column.qualifier.clone()))
                }
                Some([column]) if bare => Some(OutputColumn::Named(column.name.clone())),
                _ => None,
            }
        };
        self.push_output(output);
    }

    fn is_stop_word(&self, upper: &str, prev_words: &[Option<String>; 2]) -> bool {
        if !is_clause_keyword(upper) {
            return false;
        }
        let next_is_paren = matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::LParen));
        if contains(FUNCTION_KEYWORDS, upper) && next_is_paren {
            return false;
        }
        let last = prev_words[1].as_deref();
        let before = prev_words[0].as_deref();
        // `a IS [NOT] DISTINCT FROM b`
        if upper == "FROM" && last == Some("DISTINCT") && matches!(before, Some("IS") | Some("NOT"))
        {
            return false;
        }
        // `WITHIN GROUP (ORDER BY ...)`
        if upper == "GROUP" && last == Some("WITHIN") {
            return false;
        }
        true
    }

    /// Handle one word or quoted identifier inside an expression. Returns
    /// whether the consumed tokens ended an operand.
    fn word(
        &mut self,
        ctx: Ctx,
        tok: &'t Token,
        upper: Option<&str>,
        prev_operand: bool,
    ) -> Result<bool, ParseError> {
        let keyword = upper.filter(|u| is_keyword(u));

        // Aliases in select lists.
        if ctx == Ctx::SelectList {
            if keyword == Some("AS") {
                self.pos += 1;
                let alias = match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::Word(w))
                    | Some(TokenKind::QuotedIdent(w))
                    | Some(TokenKind::Str(w)) => w.clone(),
                    _ => return Err(self.error("expected alias after AS")),
                };
                self.pos += 1;
                self.item_alias = Some(alias.clone());
                self.refs.output_aliases.push(alias);
                return Ok(false);
            }
            if prev_operand && keyword.is_none() {
                let next_is_paren =
                    matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::LParen));
                let next_is_dot = matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Dot));
                if !next_is_paren && !next_is_dot {
                    let alias = match &tok.kind {
                        TokenKind::Word(w) | TokenKind::QuotedIdent(w) => w.clone(),
                        _ => String::new(),
                    };
                    self.pos += 1;
                    self.item_alias = Some(alias.clone());
                    self.refs.output_aliases.push(alias);
                    return Ok(false);
                }
            }
        }

        if let Some(kw) = keyword {
            let next_is_paren = matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::LParen));
            if !(contains(FUNCTION_KEYWORDS, kw) && next_is_paren) {
                return self.keyword(kw);
            }
        }

        if upper == Some("EXTRACT")
            && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::LParen))
        {
            self.refs.functions.push("extract".to_string());
            self.pos += 2;
            // Date part: `year`, `'year'`, ...
            if self.peek().is_some_and(|t| {
                matches!(
                    t.kind,
                    TokenKind::Word(_) | TokenKind::Str(_) | TokenKind::QuotedIdent(_)
                )
            }) {
                self.pos += 1;
            }
            self.scan(Ctx::Nested)?;
            self.expect(&TokenKind::RParen)?;
            return Ok(true);
        }

        // Typed literal: DATE '2024-01-01'
        if matches!(tok.kind, TokenKind::Word(_))
            && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Str(_)))
        {
            self.pos += 2;
            return Ok(true);
        }

        let parts = self.name_chain();

        if self.eat(&TokenKind::LParen) {
            if let Some(name) = parts.last() {
                self.refs.functions.push(name.to_ascii_lowercase());
            }
            self.paren_body()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(true);
        }

        // Lambda parameter: `x -> x + 1`
        if self.peek().is_some_and(|t| t.is_operator("->")) && parts.len() == 1 {
            self.pos += 1;
            self.refs.output_aliases.extend(parts);
            return Ok(false);
        }

        let mut parts = parts;
        let Some(name) = parts.pop() else {
            return Err(self.error("expected expression"));
        };
        let qualifier = parts.pop();
        self.push_column(qualifier, name);
        Ok(true)
    }

    /// Consume a keyword inside an expression.
    fn keyword(&mut self, kw: &str) -> Result<bool, ParseError> {
        self.pos += 1;
        match kw {
            "AS" => {
                // CAST(x AS type) or an alias outside a select list.
                if self.peek().is_some_and(|t| {
                    matches!(t.kind, TokenKind::Word(_) | TokenKind::QuotedIdent(_))
                }) {
                    self.skip_type_name()?;
                }
                Ok(true)
            }
            "INTERVAL" => {
                if self.peek().is_some_and(|t| {
                    matches!(t.kind, TokenKind::Number(_) | TokenKind::Str(_))
                }) {
                    self.pos += 1;
                }
                if self
                    .peek_upper()
                    .is_some_and(|u| !is_keyword(&u) && is_interval_unit(&u))
                {
                    self.pos += 1;
                }
                Ok(true)
            }
            "NULLS" => {
                if self.peek_is_word("FIRST") || self.peek_is_word("LAST") {
                    self.pos += 1;
                }
                Ok(false)
            }
            "AT" => {
                if self.peek_is_word("TIME")
                    && self.peek_at(1).is_some_and(|t| t.is_word("ZONE"))
                {
                    self.pos += 2;
                }
                Ok(false)
            }
            other => Ok(contains(OPERAND_KEYWORDS, other)),
        }
    }
}

fn is_interval_unit(upper: &str) -> bool {
    let singular = upper.strip_suffix('S').unwrap_or(upper);
    matches!(
        singular,
        "YEAR"
            | "MONTH"
            | "WEEK"
            | "DAY"
            | "HOUR"
            | "MINUTE"
            | "SECOND"
            | "MILLISECOND"
            | "MICROSECOND"
            | "DECADE"
            | "CENTURY"
            | "QUARTER"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_sql(sql: &str) -> Statement {
        parse(&tokenize(sql).unwrap()).unwrap()
    }

    fn select_refs(sql: &str) -> References {
        match parse_sql(sql) {
            Statement::Select(refs) => refs,
            other => panic!("expected SELECT, got {:?}", other),
        }
    }

    fn column_names(refs: &References) -> Vec<String> {
        refs.columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_simple_select() {
        let refs = select_refs("SELECT name, age FROM people WHERE age > 30 ORDER BY age DESC");
        assert_eq!(refs.tables.len(), 1);
        assert_eq!(refs.tables[0].name, "people");
        assert_eq!(column_names(&refs), vec!["name", "age", "age", "age"]);
    }

    #[test]
    fn test_aliases_and_joins() {
        let refs = select_refs(
            "SELECT p.name, COUNT(*) AS orders, SUM(o.total) spent \
             FROM people p LEFT JOIN orders AS o ON p.id = o.person_id \
             GROUP BY p.name HAVING spent > 10",
        );
        let tables: Vec<(&str, Option<&str>)> = refs
            .tables
            .iter()
            .map(|t| (t.name.as_str(), t.alias.as_deref()))
            .collect();
        assert_eq!(tables, vec![("people", Some("p")), ("orders", Some("o"))]);
        assert_eq!(refs.output_aliases, vec!["orders", "spent"]);
        assert_eq!(
            column_names(&refs),
            vec!["p.name", "o.total", "p.id", "o.person_id", "p.name", "spent"]
        );
        assert_eq!(refs.functions, vec!["count", "sum"]);
    }

    #[test]
    fn test_cte_and_subquery() {
        let refs = select_refs(
            "WITH big AS (SELECT * FROM orders WHERE total > 100) \
             SELECT b.total FROM big b WHERE b.person_id IN (SELECT id FROM people)",
        );
        let ctes: Vec<&str> = refs.ctes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(ctes, vec!["big"]);
        let sources: Vec<(&str, TableSource)> = refs
            .tables
            .iter()
            .map(|t| (t.name.as_str(), t.source))
            .collect();
        assert_eq!(
            sources,
            vec![
                ("orders", TableSource::Table),
                ("big", TableSource::Cte),
                ("people", TableSource::Table),
            ]
        );
    }

    #[test]
    fn test_expression_keywords_are_not_columns() {
        let refs = select_refs(
            "SELECT CAST(amount AS DOUBLE PRECISION), EXTRACT(year FROM placed_at), \
             CASE WHEN paid IS NOT NULL THEN 'y' ELSE 'n' END flag, \
             placed_at + INTERVAL 1 DAY, DATE '2024-01-01', amount::BIGINT \
             FROM orders ORDER BY placed_at NULLS LAST",
        );
        assert_eq!(
            column_names(&refs),
            vec!["amount", "placed_at", "paid", "placed_at", "amount", "placed_at"]
        );
        assert_eq!(refs.output_aliases, vec!["flag"]);
    }

    #[test]
    fn test_is_distinct_from_stays_in_where() {
        let refs = select_refs("SELECT a FROM t WHERE a IS DISTINCT FROM b");
        assert_eq!(refs.tables.len(), 1);
        assert_eq!(column_names(&refs), vec!["a", "a", "b"]);
    }

    #[test]
    fn test_table_function_and_file_reference() {
        let refs = select_refs("SELECT * FROM read_csv('/etc/passwd')");
        assert_eq!(refs.table_functions, vec!["read_csv"]);
        assert!(refs.tables.is_empty());

        let refs = select_refs("SELECT * FROM '/etc/passwd'");
        assert_eq!(refs.file_references, vec!["/etc/passwd"]);
    }

    #[test]
    fn test_qualified_table() {
        let refs = select_refs("SELECT * FROM information_schema.tables");
        assert_eq!(refs.qualified_tables, vec!["information_schema.tables"]);
    }

    #[test]
    fn test_insert_update_delete() {
        match parse_sql("INSERT INTO people (id, name) VALUES (3, 'Cy')") {
            Statement::Insert(stmt) => {
                assert_eq!(stmt.table.name, "people");
                assert_eq!(stmt.columns, vec!["id", "name"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_sql("UPDATE people SET name = 'Al', age = age + 1 WHERE id = 1") {
            Statement::Update(stmt) => {
                assert_eq!(stmt.assignments, vec!["name", "age"]);
                assert_eq!(stmt.refs.columns.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_sql("DELETE FROM people WHERE id = 2") {
            Statement::Delete(stmt) => assert_eq!(stmt.table.name, "people"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_statements() {
        assert_eq!(parse_sql("DROP TABLE people"), Statement::Other("DROP".into()));
        assert_eq!(parse_sql("pragma version"), Statement::Other("PRAGMA".into()));
    }

    #[test]
    fn test_union_and_limit() {
        let refs = select_refs("SELECT id FROM a UNION ALL SELECT id FROM b LIMIT 5");
        assert_eq!(refs.tables.len(), 2);
    }

    #[test]
    fn test_columns_are_tagged_with_their_scope() {
        let refs = select_refs(
            "WITH big AS (SELECT person_id FROM orders) \
             SELECT name FROM people p WHERE p.id IN (SELECT person_id FROM big)",
        );
        let scope_of_table = |name: &str| {
            refs.tables
                .iter()
                .find(|t| t.name == name)
                .map(|t| t.scope)
                .unwrap()
        };
        let cte_body = refs.ctes[0].body.unwrap();
        assert_eq!(scope_of_table("orders"), cte_body);
        assert_eq!(refs.columns[0].scope, cte_body);

        let main = scope_of_table("people");
        let inner = scope_of_table("big");
        assert_ne!(main, cte_body);
        assert_eq!(refs.scopes[inner].parent, Some(main));
        assert_eq!(refs.scope_chain(inner), vec![inner, main, 0]);
        let name = refs.columns.iter().find(|c| c.name == "name").unwrap();
        assert_eq!(name.scope, main);
    }

    #[test]
    fn test_select_list_outputs() {
        let refs = select_refs(
            "SELECT s.* FROM (SELECT id, p.name, age + 1 AS next, o.* FROM people p, orders o) s",
        );
        let derived = refs
            .tables
            .iter()
            .find(|t| t.source == TableSource::Derived)
            .unwrap();
        assert_eq!(derived.name, "s");
        let body = derived.body.unwrap();
        assert_eq!(
            refs.scopes[body].outputs,
            Some(vec![
                OutputColumn::Named("id".into()),
                OutputColumn::Named("name".into()),
                OutputColumn::Named("next".into()),
                OutputColumn::Wildcard(Some("o".into())),
            ])
        );

        let refs = select_refs("SELECT x FROM (SELECT count(*) FROM people) t(x)");
        let derived = &refs.tables[1];
        assert_eq!(derived.columns, vec!["x"]);
        assert_eq!(refs.scopes[derived.body.unwrap()].outputs, None);
    }

    #[test]
    fn test_order_by_after_union_uses_first_branch() {
        let refs = select_refs("SELECT a FROM t1 UNION SELECT b FROM t2 ORDER BY a");
        let first = refs.tables[0].scope;
        assert_ne!(first, refs.tables[1].scope);
        assert_eq!(refs.columns.last().unwrap().scope, first);
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let depth = 50_000;
        let sql = format!("SELECT {}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = parse(&tokenize(&sql).unwrap()).unwrap_err();
        assert!(err.message.contains("nesting"), "{err}");

        let sql = format!("SELECT {}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse(&tokenize(&sql).unwrap()).is_ok());
    }

    #[test]
    fn test_unbalanced_parens_fail() {
        let tokens = tokenize("SELECT (a FROM t").unwrap();
        assert!(parse(&tokens).is_err());
        let tokens = tokenize("SELECT a) FROM t").unwrap();
        assert!(parse(&tokens).is_err());
    }
}
