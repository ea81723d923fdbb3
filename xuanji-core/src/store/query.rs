//! SQL construction and execution shared by pooled and transactional access.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use super::error::StoreError;
use super::value::{Row, Value};

/// A read against a single table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub filter: Option<String>,
    pub args: Vec<Value>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `clause` is a SQL boolean expression using `?` placeholders for `args`.
    pub fn filter(mut self, clause: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = Some(clause.into());
        self.args = args;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn to_sql(&self) -> Result<String, StoreError> {
        let table = ident(&self.table)?;
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| ident(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, table);
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_clause(order_by)?);
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        Ok(sql)
    }
}

/// Validates a table or column name and returns it unchanged.
pub(crate) fn ident(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Validates `col [ASC|DESC], ...` and normalizes spacing.
pub(crate) fn order_clause(order_by: &str) -> Result<String, StoreError> {
    let mut terms = Vec::new();
    for term in order_by.split(',') {
        let mut parts = term.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| StoreError::InvalidIdentifier(order_by.to_string()))?;
        ident(column)?;
        let direction = match parts.next().map(|d| d.to_ascii_uppercase()) {
            None => None,
            Some(d) if d == "ASC" || d == "DESC" => Some(d),
            Some(_) => return Err(StoreError::InvalidIdentifier(order_by.to_string())),
        };
        if parts.next().is_some() {
            return Err(StoreError::InvalidIdentifier(order_by.to_string()));
        }
        terms.push(match direction {
            Some(d) => format!("{} {}", column, d),
            None => column.to_string(),
        });
    }
    Ok(terms.join(", "))
}

pub(crate) fn insert_sql(table: &str, row: &Row) -> Result<String, StoreError> {
    let table = ident(table)?;
    let columns = row
        .columns()
        .iter()
        .map(|c| ident(c))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    ))
}

pub(crate) fn update_sql(table: &str, values: &Row, filter: &str) -> Result<String, StoreError> {
    let table = ident(table)?;
    let assignments = values
        .columns()
        .iter()
        .map(|c| ident(c).map(|c| format!("{} = ?", c)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        filter
    ))
}

pub(crate) fn delete_sql(table: &str, filter: &str) -> Result<String, StoreError> {
    Ok(format!("DELETE FROM {} WHERE {}", ident(table)?, filter))
}

pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<i64>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

pub(crate) fn decode_row(row: &SqliteRow) -> Result<Row, StoreError> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let class = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                StorageClass::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => StorageClass::Integer,
                    "REAL" => StorageClass::Real,
                    "BLOB" => StorageClass::Blob,
                    _ => StorageClass::Text,
                }
            }
        };
        let value = match class {
            StorageClass::Null => Value::Null,
            StorageClass::Integer => Value::Integer(row.try_get_unchecked::<i64, _>(idx)?),
            StorageClass::Real => Value::Real(row.try_get_unchecked::<f64, _>(idx)?),
            StorageClass::Text => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
            StorageClass::Blob => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        };
        out.set(column.name(), value);
    }
    Ok(out)
}

pub(crate) async fn fetch_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    args: &[Value],
) -> Result<Vec<Row>, StoreError> {
    let rows = bind_values(sqlx::query(sql), args)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn execute(
    conn: &mut SqliteConnection,
    sql: &str,
    args: &[Value],
) -> Result<u64, StoreError> {
    let result = bind_values(sqlx::query(sql), args)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn insert_row(
    conn: &mut SqliteConnection,
    table: &str,
    row: &Row,
) -> Result<i64, StoreError> {
    let sql = insert_sql(table, row)?;
    let result = bind_values(sqlx::query(&sql), row.values())
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub(crate) async fn update_rows(
    conn: &mut SqliteConnection,
    table: &str,
    values: &Row,
    filter: &str,
    args: &[Value],
) -> Result<u64, StoreError> {
    let sql = update_sql(table, values, filter)?;
    let mut bound: Vec<Value> = values.values().to_vec();
    bound.extend_from_slice(args);
    execute(conn, &sql, &bound).await
}
