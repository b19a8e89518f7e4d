// Statement builders rendering `?` placeholders with collected bind values
use crate::error::FrameError;
use crate::models::{LogicalQuery, ParamValue};

use super::clause::{OrderByKeyword, WhereClause};

/// Join families supported by the SELECT builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// SELECT statement builder
#[derive(Debug, Clone)]
pub struct SelectStatement {
    table: String,
    columns: Vec<String>,
    joins: Vec<(JoinType, String, String)>,
    where_clause: Option<WhereClause>,
    group_by: Vec<String>,
    order_by: Vec<(String, OrderByKeyword)>,
    limit: Option<u64>,
}

impl SelectStatement {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Projected columns; all columns when never called.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn join(
        mut self,
        join: JoinType,
        table: impl Into<String>,
        on: impl Into<String>,
    ) -> Self {
        self.joins.push((join, table.into(), on.into()));
        self
    }

    pub fn filter(mut self, clause: impl Into<WhereClause>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, keyword: OrderByKeyword) -> Self {
        self.order_by.push((column.into(), keyword));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> LogicalQuery {
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        for (join, table, on) in &self.joins {
            sql.push(' ');
            sql.push_str(join.as_sql());
            sql.push(' ');
            sql.push_str(table);
            sql.push_str(" ON ");
            sql.push_str(on);
        }

        if let Some(clause) = &self.where_clause {
            clause.render(&mut sql, &mut params);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, (column, keyword)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(keyword.as_sql());
            }
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(&limit.to_string());
        }

        LogicalQuery::new(sql).bind_all(params)
    }
}

/// INSERT statement builder; rows are appended with repeated `values` calls
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<ParamValue>>,
}

impl InsertStatement {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<LogicalQuery, FrameError> {
        if self.columns.is_empty() {
            return Err(FrameError::InvalidSql(
                "INSERT requires at least one column".to_string(),
            ));
        }
        if self.rows.is_empty() {
            return Err(FrameError::InvalidSql(
                "INSERT requires at least one row of values".to_string(),
            ));
        }
        for row in &self.rows {
            if row.len() != self.columns.len() {
                return Err(FrameError::InvalidSql(format!(
                    "INSERT row arity mismatch: {} columns, {} values",
                    self.columns.len(),
                    row.len()
                )));
            }
        }

        let mut sql = String::from("INSERT INTO ");
        sql.push_str(&self.table);
        sql.push_str(" (");
        sql.push_str(&self.columns.join(", "));
        sql.push_str(") VALUES ");

        let placeholder_row = format!(
            "({})",
            std::iter::repeat("?")
                .take(self.columns.len())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut params = Vec::new();
        for (i, row) in self.rows.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&placeholder_row);
            params.extend(row);
        }

        Ok(LogicalQuery::new(sql).bind_all(params))
    }
}

/// UPDATE statement builder
#[derive(Debug, Clone)]
pub struct UpdateStatement {
    table: String,
    sets: Vec<(String, ParamValue)>,
    where_clause: Option<WhereClause>,
}

impl UpdateStatement {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            where_clause: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, clause: impl Into<WhereClause>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn build(self) -> Result<LogicalQuery, FrameError> {
        if self.sets.is_empty() {
            return Err(FrameError::InvalidSql(
                "UPDATE requires at least one SET pair".to_string(),
            ));
        }

        let mut sql = String::from("UPDATE ");
        let mut params = Vec::new();
        sql.push_str(&self.table);
        sql.push_str(" SET ");
        for (i, (column, value)) in self.sets.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&column);
            sql.push_str(" = ?");
            params.push(value);
        }

        if let Some(clause) = &self.where_clause {
            clause.render(&mut sql, &mut params);
        }

        Ok(LogicalQuery::new(sql).bind_all(params))
    }
}

/// DELETE statement builder
#[derive(Debug, Clone)]
pub struct DeleteStatement {
    table: String,
    where_clause: Option<WhereClause>,
}

impl DeleteStatement {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    pub fn filter(mut self, clause: impl Into<WhereClause>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn build(self) -> LogicalQuery {
        let mut sql = String::from("DELETE FROM ");
        let mut params = Vec::new();
        sql.push_str(&self.table);
        if let Some(clause) = &self.where_clause {
            clause.render(&mut sql, &mut params);
        }
        LogicalQuery::new(sql).bind_all(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::clause::Condition;

    #[test]
    fn test_select_full_shape() {
        let query = SelectStatement::from("users u")
            .columns(["u.id", "u.name", "COUNT(o.id) AS orders"])
            .join(JoinType::Left, "orders o", "o.user_id = u.id")
            .filter(WhereClause::new(Condition::gt("u.age", 18)).and(Condition::is_null("u.deleted_at")))
            .group_by(["u.id", "u.name"])
            .order_by("u.name", OrderByKeyword::Asc)
            .limit(50)
            .build();

        assert_eq!(
            query.statement,
            "SELECT u.id, u.name, COUNT(o.id) AS orders FROM users u \
             LEFT JOIN orders o ON o.user_id = u.id \
             WHERE u.age > ? AND u.deleted_at IS NULL \
             GROUP BY u.id, u.name ORDER BY u.name ASC LIMIT 50"
        );
        assert_eq!(query.params, vec![ParamValue::Int(18)]);
    }

    #[test]
    fn test_select_defaults_to_star() {
        let query = SelectStatement::from("events").build();
        assert_eq!(query.statement, "SELECT * FROM events");
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_insert_multi_row() {
        let query = InsertStatement::into("users")
            .columns(["name", "age"])
            .values(["alice", "30"])
            .values(["bob", "41"])
            .build()
            .unwrap();

        assert_eq!(
            query.statement,
            "INSERT INTO users (name, age) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(query.params.len(), 4);
    }

    #[test]
    fn test_insert_arity_checked() {
        let result = InsertStatement::into("users")
            .columns(["name", "age"])
            .values(["alice"])
            .build();
        assert!(result.is_err());

        let result = InsertStatement::into("users").columns(["name"]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_update_sets_and_filter() {
        let query = UpdateStatement::table("users")
            .set("name", "dora")
            .set("age", 29)
            .filter(Condition::eq("id", 7))
            .build()
            .unwrap();

        assert_eq!(
            query.statement,
            "UPDATE users SET name = ?, age = ? WHERE id = ?"
        );
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn test_update_without_sets_rejected() {
        assert!(UpdateStatement::table("users").build().is_err());
    }

    #[test]
    fn test_delete() {
        let query = DeleteStatement::from("sessions")
            .filter(Condition::lt("expires_at", 0))
            .build();
        assert_eq!(query.statement, "DELETE FROM sessions WHERE expires_at < ?");
        assert_eq!(query.params.len(), 1);
    }
}
