//! PostgreSQL connection wrapper.

use deadpool_postgres::Object;
use postgres_types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

use crate::error::{PgError, PgResult};

/// Query parameters.
pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// A pooled PostgreSQL connection.
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    /// Execute a query and return all rows.
    pub async fn query(&self, sql: &str, params: Params<'_>) -> PgResult<Vec<Row>> {
        debug!(sql = %sql, "Executing query");
        self.client
            .query(sql, params)
            .await
            .map_err(|e| PgError::statement(sql, e))
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Params<'_>) -> PgResult<u64> {
        debug!(sql = %sql, "Executing statement");
        self.client
            .execute(sql, params)
            .await
            .map_err(|e| PgError::statement(sql, e))
    }

    /// Execute DDL through the simple query protocol, in autocommit.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| PgError::statement(sql, e))
    }

    /// Begin a transaction.
    pub async fn transaction(&mut self) -> PgResult<PgTransaction<'_>> {
        debug!("Beginning transaction");
        let txn = self.client.transaction().await?;
        Ok(PgTransaction { txn })
    }
}

/// A PostgreSQL transaction. Dropped without [`commit`](Self::commit), it
/// rolls back.
pub struct PgTransaction<'a> {
    txn: deadpool_postgres::Transaction<'a>,
}

impl PgTransaction<'_> {
    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Params<'_>) -> PgResult<u64> {
        debug!(sql = %sql, "Executing statement in transaction");
        self.txn
            .execute(sql, params)
            .await
            .map_err(|e| PgError::statement(sql, e))
    }

    /// Execute DDL through the simple query protocol.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "Executing batch in transaction");
        self.txn
            .batch_execute(sql)
            .await
            .map_err(|e| PgError::statement(sql, e))
    }

    /// Commit the transaction.
    pub async fn commit(self) -> PgResult<()> {
        debug!("Committing transaction");
        self.txn.commit().await?;
        Ok(())
    }
}
