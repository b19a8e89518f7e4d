// Backend-agnostic SQL statement builders
pub mod builder;
pub mod clause;

pub use builder::{DeleteStatement, InsertStatement, JoinType, SelectStatement, UpdateStatement};
pub use clause::{ComparisonOperator, Condition, OrderByKeyword, WhereClause};

/// Statement families, used by the facade to dispatch reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL and anything else, executed as a write
    Other,
}

impl QueryType {
    pub fn is_read(&self) -> bool {
        matches!(self, QueryType::Select)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Other => "OTHER",
        }
    }
}
