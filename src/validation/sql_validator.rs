use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::FrameError;
use crate::sql::QueryType;

/// SQL validation service: statement classification, placeholder counting and
/// LIMIT enforcement, all before any connection is touched
pub struct SqlValidator;

impl SqlValidator {
    /// Parse the statement and classify it for read/write dispatch.
    pub fn classify(sql: &str) -> Result<QueryType, FrameError> {
        let ast = Self::parse(sql)?;

        // Single-statement execution model; the first statement decides
        let query_type = match &ast[0] {
            Statement::Query(_) => QueryType::Select,
            Statement::Insert { .. } => QueryType::Insert,
            Statement::Update { .. } => QueryType::Update,
            Statement::Delete { .. } => QueryType::Delete,
            _ => QueryType::Other,
        };

        if ast.len() > 1 {
            return Err(FrameError::InvalidSql(
                "multiple statements are not supported; execute them individually".to_string(),
            ));
        }

        Ok(query_type)
    }

    /// Count `?` placeholders in the statement text, skipping string literals,
    /// quoted identifiers and comments.
    pub fn count_placeholders(sql: &str) -> usize {
        let mut count = 0;
        let mut chars = sql.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\'' | '"' | '`' => {
                    let quote = c;
                    while let Some(inner) = chars.next() {
                        if inner == quote {
                            // Doubled quote is an escape, not a terminator
                            if chars.peek() == Some(&quote) {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    for inner in chars.by_ref() {
                        if inner == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    for inner in chars.by_ref() {
                        if prev == '*' && inner == '/' {
                            break;
                        }
                        prev = inner;
                    }
                }
                '?' => count += 1,
                _ => {}
            }
        }

        count
    }

    /// Fail with `ParameterMismatch` when the bound value count does not match
    /// the placeholder count. Runs before any connection is acquired.
    pub fn validate_params(sql: &str, actual: usize) -> Result<(), FrameError> {
        let expected = Self::count_placeholders(sql);
        if expected != actual {
            return Err(FrameError::ParameterMismatch { expected, actual });
        }
        Ok(())
    }

    /// Check if query has LIMIT clause and append if missing.
    /// Uses AST parsing to properly detect LIMIT clauses, avoiding false positives.
    pub fn ensure_limit(sql: &str, default_limit: u64) -> Result<(String, bool), FrameError> {
        let ast = Self::parse(sql)?;

        if Self::check_limit_in_statement(&ast[0]) {
            Ok((sql.to_string(), false))
        } else {
            let trimmed_sql = sql.trim_end_matches(';').trim();
            Ok((format!("{} LIMIT {}", trimmed_sql, default_limit), true))
        }
    }

    fn parse(sql: &str) -> Result<Vec<Statement>, FrameError> {
        let dialect = GenericDialect {};
        let ast = Parser::new(&dialect)
            .try_with_sql(sql)
            .map_err(|e| FrameError::InvalidSql(format!("SQL parsing error: {}", e)))?
            .parse_statements()
            .map_err(|e| FrameError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        if ast.is_empty() {
            return Err(FrameError::InvalidSql("Empty SQL query".to_string()));
        }

        Ok(ast)
    }

    /// Check if a statement has a LIMIT clause using AST analysis
    fn check_limit_in_statement(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some(),
            _ => false,
        }
    }
}
