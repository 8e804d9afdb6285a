//! Statements with structurally bound parameters.
//!
//! Every `push_bind` emits the next PostgreSQL placeholder and records the
//! value at the same position, so SQL text and parameters cannot drift apart.

use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A typed value bound to one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    BigInt(i64),
    Int(i32),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::BigInt(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Int(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_owned())
    }
}

impl From<NaiveDate> for BindValue {
    fn from(value: NaiveDate) -> Self {
        BindValue::Date(value)
    }
}

/// SQL text plus its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<BindValue>,
    returns_rows: bool,
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    /// Rows are fetched for `SELECT` and `... RETURNING` statements; otherwise
    /// only the affected-row count is reported.
    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }

    pub(crate) fn to_query(&self) -> Query<'_, Postgres, PgArguments> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| match value {
                BindValue::BigInt(v) => query.bind(*v),
                BindValue::Int(v) => query.bind(*v),
                BindValue::Bool(v) => query.bind(*v),
                BindValue::Text(v) => query.bind(v.as_str()),
                BindValue::Date(v) => query.bind(*v),
            })
    }
}

/// Incremental builder for a [`Statement`].
///
/// ```ignore
/// let mut builder = StatementBuilder::query("SELECT * FROM books");
/// builder.push(" WHERE id = ").push_bind(7_i64);
/// let statement = builder.build();
/// assert_eq!(statement.sql(), "SELECT * FROM books WHERE id = $1");
/// ```
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<BindValue>,
    returns_rows: bool,
}

impl StatementBuilder {
    /// Start a statement whose rows are fetched.
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: true,
        }
    }

    /// Start a statement that only reports affected rows.
    pub fn command(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: false,
        }
    }

    /// Append raw SQL. Never pass user input here.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append the next placeholder and bind `value` to it.
    pub fn push_bind(&mut self, value: impl Into<BindValue>) -> &mut Self {
        self.params.push(value.into());
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
        self
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
            returns_rows: self.returns_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_bind_order() {
        let mut builder = StatementBuilder::command("UPDATE books SET title = ");
        builder
            .push_bind("Dune")
            .push(", pages = ")
            .push_bind(412_i32)
            .push(" WHERE id = ")
            .push_bind(7_i64);
        let statement = builder.build();

        assert_eq!(
            statement.sql(),
            "UPDATE books SET title = $1, pages = $2 WHERE id = $3"
        );
        assert_eq!(
            statement.params(),
            &[
                BindValue::Text("Dune".into()),
                BindValue::Int(412),
                BindValue::BigInt(7),
            ]
        );
        assert!(!statement.returns_rows());
    }

    #[test]
    fn repeated_values_get_distinct_placeholders() {
        let mut builder = StatementBuilder::query("SELECT ");
        builder.push_bind(1_i64).push(", ").push_bind(1_i64);
        let statement = builder.build();

        assert_eq!(statement.sql(), "SELECT $1, $2");
        assert_eq!(statement.params().len(), 2);
    }

    #[test]
    fn plain_query_has_no_params() {
        let statement = StatementBuilder::query("SELECT 1").build();
        assert!(statement.params().is_empty());
        assert!(statement.returns_rows());
    }
}
