// WHERE clause composition with bound parameters
use crate::models::ParamValue;

/// Comparison operators supported by the condition builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl ComparisonOperator {
    fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "<>",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::NotLike => "NOT LIKE",
            ComparisonOperator::In => "IN",
            ComparisonOperator::NotIn => "NOT IN",
            ComparisonOperator::IsNull => "IS NULL",
            ComparisonOperator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single column comparison. Values are always bound, never inlined into
/// the statement text.
#[derive(Debug, Clone)]
pub struct Condition {
    column: String,
    op: ComparisonOperator,
    values: Vec<ParamValue>,
}

impl Condition {
    fn single(column: impl Into<String>, op: ComparisonOperator, value: impl Into<ParamValue>) -> Self {
        Self {
            column: column.into(),
            op,
            values: vec![value.into()],
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::NotEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::Ge, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::single(column, ComparisonOperator::Le, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(column, ComparisonOperator::Like, pattern.into())
    }

    pub fn not_like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(column, ComparisonOperator::NotLike, pattern.into())
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Self {
            column: column.into(),
            op: ComparisonOperator::In,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Self {
            column: column.into(),
            op: ComparisonOperator::NotIn,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ComparisonOperator::IsNull,
            values: Vec::new(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ComparisonOperator::IsNotNull,
            values: Vec::new(),
        }
    }

    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<ParamValue>) {
        match self.op {
            ComparisonOperator::IsNull | ComparisonOperator::IsNotNull => {
                sql.push_str(&self.column);
                sql.push(' ');
                sql.push_str(self.op.as_sql());
            }
            ComparisonOperator::In | ComparisonOperator::NotIn => {
                if self.values.is_empty() {
                    // Empty IN never matches; empty NOT IN always matches
                    sql.push_str(match self.op {
                        ComparisonOperator::In => "1 = 0",
                        _ => "1 = 1",
                    });
                    return;
                }
                sql.push_str(&self.column);
                sql.push(' ');
                sql.push_str(self.op.as_sql());
                sql.push_str(" (");
                for (i, value) in self.values.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push('?');
                    params.push(value.clone());
                }
                sql.push(')');
            }
            _ => {
                sql.push_str(&self.column);
                sql.push(' ');
                sql.push_str(self.op.as_sql());
                sql.push_str(" ?");
                params.push(self.values[0].clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhereDelimiter {
    And,
    Or,
}

/// Ordered chain of conditions joined by AND / OR
#[derive(Debug, Clone)]
pub struct WhereClause {
    conditions: Vec<(WhereDelimiter, Condition)>,
}

impl WhereClause {
    pub fn new(condition: Condition) -> Self {
        Self {
            conditions: vec![(WhereDelimiter::And, condition)],
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push((WhereDelimiter::And, condition));
        self
    }

    pub fn or(mut self, condition: Condition) -> Self {
        self.conditions.push((WhereDelimiter::Or, condition));
        self
    }

    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<ParamValue>) {
        sql.push_str(" WHERE ");
        for (i, (delimiter, condition)) in self.conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(match delimiter {
                    WhereDelimiter::And => " AND ",
                    WhereDelimiter::Or => " OR ",
                });
            }
            condition.render(sql, params);
        }
    }
}

impl From<Condition> for WhereClause {
    fn from(condition: Condition) -> Self {
        WhereClause::new(condition)
    }
}

/// Sort direction for ORDER BY declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByKeyword {
    Asc,
    Desc,
}

impl OrderByKeyword {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            OrderByKeyword::Asc => "ASC",
            OrderByKeyword::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(clause: &WhereClause) -> (String, Vec<ParamValue>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        clause.render(&mut sql, &mut params);
        (sql, params)
    }

    #[test]
    fn test_simple_comparison() {
        let (sql, params) = render(&WhereClause::new(Condition::eq("age", 21)));
        assert_eq!(sql, " WHERE age = ?");
        assert_eq!(params, vec![ParamValue::Int(21)]);
    }

    #[test]
    fn test_and_or_chain() {
        let clause = WhereClause::new(Condition::gt("age", 18))
            .and(Condition::like("name", "a%"))
            .or(Condition::is_null("deleted_at"));
        let (sql, params) = render(&clause);
        assert_eq!(
            sql,
            " WHERE age > ? AND name LIKE ? OR deleted_at IS NULL"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_in_expands_placeholders() {
        let (sql, params) = render(&WhereClause::new(Condition::is_in("id", [1, 2, 3])));
        assert_eq!(sql, " WHERE id IN (?, ?, ?)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_in_never_matches() {
        let (sql, params) = render(&WhereClause::new(Condition::is_in(
            "id",
            Vec::<i64>::new(),
        )));
        assert_eq!(sql, " WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_null_checks_bind_nothing() {
        let (sql, params) = render(&WhereClause::new(Condition::is_not_null("email")));
        assert_eq!(sql, " WHERE email IS NOT NULL");
        assert!(params.is_empty());
    }
}
