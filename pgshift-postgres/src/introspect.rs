//! Catalog queries.
//!
//! Every query reads `pg_catalog` directly and returns definitions in the
//! server's own rendering (`format_type`, `pg_get_constraintdef`,
//! `pg_get_indexdef`, `pg_get_triggerdef`). Hashes are recovered from names
//! and comments by the builder, not here.

use pgshift_migrate::{
    ColumnRecord, ConstraintRecord, ConstraintType, EnumRecord, IndexRecord, Introspector,
    MigrateResult, SchemaRecord, TableRecord, TriggerRecord,
};
use tokio_postgres::Row;
use tracing::debug;

use crate::error::{PgError, PgResult};
use crate::pool::PgPool;

const EXTENSIONS: &str = "SELECT extname::text FROM pg_catalog.pg_extension ORDER BY 1";

const SCHEMAS: &str = "\
SELECT n.nspname::text, obj_description(n.oid, 'pg_namespace')
FROM pg_catalog.pg_namespace n
WHERE n.nspname NOT LIKE 'pg\\_%' AND n.nspname <> 'information_schema'
ORDER BY 1";

const TABLES: &str = "\
SELECT n.nspname::text, c.relname::text
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p') AND n.nspname = ANY($1)
ORDER BY 1, 2";

const COLUMNS: &str = "\
SELECT n.nspname::text, c.relname::text, a.attname::text, a.attnum::int4,
       CASE WHEN t.typtype = 'e' THEN t.typname::text ELSE format_type(a.atttypid, a.atttypmod) END,
       t.typtype = 'e',
       NOT a.attnotnull,
       pg_get_expr(d.adbin, d.adrelid),
       CASE a.attidentity WHEN 'a' THEN 'ALWAYS' WHEN 'd' THEN 'BY DEFAULT' END,
       col_description(c.oid, a.attnum)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped
  AND n.nspname = ANY($1)
ORDER BY 1, 2, 4";

const CONSTRAINTS: &str = "\
SELECT n.nspname::text, c.relname::text, con.conname::text, con.contype::text,
       pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE con.contype IN ('p', 'u', 'f', 'c') AND n.nspname = ANY($1)
ORDER BY 1, 2, 3";

const INDEXES: &str = "\
SELECT n.nspname::text, t.relname::text, i.relname::text, pg_get_indexdef(i.oid)
FROM pg_catalog.pg_index x
JOIN pg_catalog.pg_class i ON i.oid = x.indexrelid
JOIN pg_catalog.pg_class t ON t.oid = x.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname = ANY($1)
  AND NOT EXISTS (
      SELECT 1 FROM pg_catalog.pg_constraint con
      WHERE con.conindid = i.oid AND con.contype IN ('p', 'u', 'x')
  )
ORDER BY 1, 2, 3";

const TRIGGERS: &str = "\
SELECT n.nspname::text, c.relname::text, tg.tgname::text, pg_get_triggerdef(tg.oid),
       obj_description(tg.oid, 'pg_trigger')
FROM pg_catalog.pg_trigger tg
JOIN pg_catalog.pg_class c ON c.oid = tg.tgrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE NOT tg.tgisinternal AND n.nspname = ANY($1)
ORDER BY 1, 2, 3";

const ENUMS: &str = "\
SELECT n.nspname::text, t.typname::text,
       array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
FROM pg_catalog.pg_type t
JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = ANY($1)
GROUP BY 1, 2
ORDER BY 1, 2";

/// Reads the catalog through a pool.
#[derive(Clone)]
pub struct PgIntrospector {
    pool: PgPool,
}

impl PgIntrospector {
    /// Create an introspector.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn rows(&self, sql: &str, schemas: Option<&[String]>) -> PgResult<Vec<Row>> {
        let conn = self.pool.get().await?;
        let rows = match schemas {
            Some(schemas) => {
                let schemas = schemas.to_vec();
                conn.query(sql, &[&schemas]).await?
            }
            None => conn.query(sql, &[]).await?,
        };
        debug!(rows = rows.len(), "Catalog query returned");
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl Introspector for PgIntrospector {
    async fn extensions(&self) -> MigrateResult<Vec<String>> {
        let rows = self.rows(EXTENSIONS, None).await?;
        Ok(decode(&rows, |r| r.try_get(0))?)
    }

    async fn schemas(&self) -> MigrateResult<Vec<SchemaRecord>> {
        let rows = self.rows(SCHEMAS, None).await?;
        Ok(decode(&rows, |r| {
            Ok(SchemaRecord {
                name: r.try_get(0)?,
                comment: r.try_get(1)?,
            })
        })?)
    }

    async fn tables(&self, schemas: &[String]) -> MigrateResult<Vec<TableRecord>> {
        let rows = self.rows(TABLES, Some(schemas)).await?;
        Ok(decode(&rows, |r| {
            Ok(TableRecord {
                schema: r.try_get(0)?,
                name: r.try_get(1)?,
            })
        })?)
    }

    async fn columns(&self, schemas: &[String]) -> MigrateResult<Vec<ColumnRecord>> {
        let rows = self.rows(COLUMNS, Some(schemas)).await?;
        Ok(decode(&rows, |r| {
            Ok(ColumnRecord {
                schema: r.try_get(0)?,
                table: r.try_get(1)?,
                name: r.try_get(2)?,
                ordinal: r.try_get(3)?,
                data_type: r.try_get(4)?,
                is_enum: r.try_get(5)?,
                is_nullable: r.try_get(6)?,
                default: r.try_get(7)?,
                identity: r.try_get(8)?,
                comment: r.try_get(9)?,
            })
        })?)
    }

    async fn constraints(&self, schemas: &[String]) -> MigrateResult<Vec<ConstraintRecord>> {
        let rows = self.rows(CONSTRAINTS, Some(schemas)).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get(3).map_err(PgError::from)?;
            let constraint_type = ConstraintType::from_code(&code)
                .ok_or_else(|| PgError::catalog(format!("unexpected constraint type '{}'", code)))?;
            records.push(ConstraintRecord {
                schema: row.try_get(0).map_err(PgError::from)?,
                table: row.try_get(1).map_err(PgError::from)?,
                name: row.try_get(2).map_err(PgError::from)?,
                constraint_type,
                definition: row.try_get(4).map_err(PgError::from)?,
            });
        }
        Ok(records)
    }

    async fn indexes(&self, schemas: &[String]) -> MigrateResult<Vec<IndexRecord>> {
        let rows = self.rows(INDEXES, Some(schemas)).await?;
        Ok(decode(&rows, |r| {
            Ok(IndexRecord {
                schema: r.try_get(0)?,
                table: r.try_get(1)?,
                name: r.try_get(2)?,
                definition: r.try_get(3)?,
            })
        })?)
    }

    async fn triggers(&self, schemas: &[String]) -> MigrateResult<Vec<TriggerRecord>> {
        let rows = self.rows(TRIGGERS, Some(schemas)).await?;
        Ok(decode(&rows, |r| {
            Ok(TriggerRecord {
                schema: r.try_get(0)?,
                table: r.try_get(1)?,
                name: r.try_get(2)?,
                definition: r.try_get(3)?,
                comment: r.try_get(4)?,
            })
        })?)
    }

    async fn enums(&self, schemas: &[String]) -> MigrateResult<Vec<EnumRecord>> {
        let rows = self.rows(ENUMS, Some(schemas)).await?;
        Ok(decode(&rows, |r| {
            Ok(EnumRecord {
                schema: r.try_get(0)?,
                name: r.try_get(1)?,
                values: r.try_get(2)?,
            })
        })?)
    }
}

fn decode<T>(rows: &[Row], f: impl Fn(&Row) -> Result<T, tokio_postgres::Error>) -> PgResult<Vec<T>> {
    rows.iter().map(|r| f(r).map_err(PgError::from)).collect()
}
