//! Persistent store backed by SQLite.
//!
//! The store owns the connection pool and the schema. Every operation works
//! on [`Row`]s of typed [`Value`]s; mapping rows to domain types happens in
//! the repository layer.
//!
//! Writes use upsert semantics (`INSERT OR REPLACE`) so that re-applying the
//! same sync payload converges to the same state.

mod error;
mod query;
mod value;

pub use error::StoreError;
pub use query::Select;
pub use value::{json_text, MappingError, Row, Value};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Sqlite, Transaction};

/// Versioned schema migrations embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Handle to the local database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and migrates it.
    ///
    /// A migration failure is returned as [`StoreError::Migration`] and must
    /// be treated as fatal by the caller.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path.display(), "opened database");
        Self::from_pool(pool).await
    }

    /// Opens a private in-memory database, mainly for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Each in-memory connection is its own database, so the pool must
        // keep exactly one connection alive for the lifetime of the store.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and brings its schema up to date.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Highest applied migration version.
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        let rows = self
            .raw_query(
                "SELECT COALESCE(MAX(version), 0) AS version FROM _sqlx_migrations WHERE success = 1",
                &[],
            )
            .await?;
        Ok(rows.first().map(|r| r.i64("version")).transpose()?.unwrap_or(0))
    }

    pub async fn query(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        let sql = select.to_sql()?;
        let mut conn = self.pool.acquire().await?;
        query::fetch_rows(&mut conn, &sql, &select.args).await
    }

    /// Upserts a single row and returns its rowid.
    pub async fn insert(&self, table: &str, row: &Row) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        query::insert_row(&mut conn, table, row).await
    }

    /// Upserts all rows in one transaction.
    pub async fn batch_insert(&self, table: &str, rows: Vec<Row>) -> Result<usize, StoreError> {
        let table = table.to_string();
        self.transaction(move |tx| {
            Box::pin(async move { tx.batch_insert(&table, &rows).await })
        })
        .await
    }

    pub async fn update(
        &self,
        table: &str,
        values: &Row,
        filter: &str,
        args: &[Value],
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        query::update_rows(&mut conn, table, values, filter, args).await
    }

    pub async fn delete(&self, table: &str, filter: &str, args: &[Value]) -> Result<u64, StoreError> {
        let sql = query::delete_sql(table, filter)?;
        let mut conn = self.pool.acquire().await?;
        query::execute(&mut conn, &sql, args).await
    }

    pub async fn raw_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        query::fetch_rows(&mut conn, sql, args).await
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        query::execute(&mut conn, sql, args).await
    }

    /// Runs `body` inside a write transaction.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so bodies that
    /// read before writing wait on `busy_timeout` instead of failing when
    /// another writer is active. The transaction commits only if `body`
    /// returns `Ok`. On error it is
    /// rolled back explicitly; if the future is dropped midway the
    /// underlying handle rolls back when it is released.
    ///
    /// ```ignore
    /// store.transaction(move |tx| Box::pin(async move {
    ///     tx.insert("settings", &row).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn transaction<T, F>(&self, body: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut StoreTx) -> BoxFuture<'t, Result<T, StoreError>> + Send,
    {
        let mut tx = StoreTx {
            inner: self.pool.begin_with("BEGIN IMMEDIATE").await?,
        };

        match body(&mut tx).await {
            Ok(value) => {
                tx.inner.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.inner.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// An open write transaction. Obtained through [`Store::transaction`].
pub struct StoreTx {
    inner: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn query(&mut self, select: &Select) -> Result<Vec<Row>, StoreError> {
        let sql = select.to_sql()?;
        query::fetch_rows(&mut self.inner, &sql, &select.args).await
    }

    pub async fn insert(&mut self, table: &str, row: &Row) -> Result<i64, StoreError> {
        query::insert_row(&mut self.inner, table, row).await
    }

    pub async fn batch_insert(&mut self, table: &str, rows: &[Row]) -> Result<usize, StoreError> {
        for row in rows {
            query::insert_row(&mut self.inner, table, row).await?;
        }
        Ok(rows.len())
    }

    pub async fn update(
        &mut self,
        table: &str,
        values: &Row,
        filter: &str,
        args: &[Value],
    ) -> Result<u64, StoreError> {
        query::update_rows(&mut self.inner, table, values, filter, args).await
    }

    pub async fn delete(
        &mut self,
        table: &str,
        filter: &str,
        args: &[Value],
    ) -> Result<u64, StoreError> {
        let sql = query::delete_sql(table, filter)?;
        query::execute(&mut self.inner, &sql, args).await
    }

    pub async fn raw_query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        query::fetch_rows(&mut self.inner, sql, args).await
    }

    pub async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, StoreError> {
        query::execute(&mut self.inner, sql, args).await
    }

    /// Looks up a single row by its key column.
    pub async fn find_row(
        &mut self,
        table: &str,
        key_column: &str,
        key: Value,
    ) -> Result<Option<Row>, StoreError> {
        let select = Select::from(table)
            .filter(format!("{} = ?", query::ident(key_column)?), vec![key])
            .limit(1);
        Ok(self.query(&select).await?.into_iter().next())
    }
}
