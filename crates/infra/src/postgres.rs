//! Postgres-backed transaction source.
//!
//! Reads the tenant's transaction lines from a single table. The expected
//! layout is:
//!
//! | column | type |
//! |---|---|
//! | `tenant_id` | `uuid not null` |
//! | `occurred_on` | `date not null` |
//! | `product_id` | `uuid not null` |
//! | `category_id` | `uuid null` |
//! | `location_id` | `uuid null` |
//! | `kind` | `text not null` (`sale`, `return`, `receipt`, `adjustment`) |
//! | `quantity` | `double precision not null` |
//! | `unit_cost` | `double precision not null` |
//! | `unit_price` | `double precision null` |
//!
//! ## Error Mapping
//!
//! Every `sqlx::Error` becomes `ForecastError::Storage` carrying the failing
//! operation name. Rows with an unknown `kind` are skipped with a warning.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument, warn};
use uuid::Uuid;

use stockcast_core::{CategoryId, ForecastError, ForecastResult, LocationId, ProductId, TenantId};
use stockcast_forecasting::ports::TransactionSource;
use stockcast_forecasting::timeseries::{TransactionKind, TransactionQuery, TransactionRecord};

const DEFAULT_TABLE: &str = "inventory_transactions";

/// Postgres-backed [`TransactionSource`].
///
/// Every query filters on `tenant_id`, so cross-tenant reads are impossible
/// through this adapter.
#[derive(Debug, Clone)]
pub struct PostgresTransactionSource {
    pool: Arc<PgPool>,
    table: String,
}

impl PostgresTransactionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> ForecastResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Read from another table with the same layout.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

fn select_sql(table: &str) -> String {
    format!(
        r#"
        SELECT occurred_on, product_id, category_id, location_id, kind, quantity, unit_cost, unit_price
        FROM {table}
        WHERE tenant_id = $1
          AND occurred_on BETWEEN $2 AND $3
          AND (cardinality($4::uuid[]) = 0 OR product_id = ANY($4))
          AND ($5::uuid IS NULL OR category_id = $5)
          AND ($6::uuid IS NULL OR location_id = $6)
        ORDER BY occurred_on ASC
        "#
    )
}

#[async_trait]
impl TransactionSource for PostgresTransactionSource {
    #[instrument(
        skip(self, query),
        fields(tenant_id = %tenant_id, start = %query.start, end = %query.end, rows = tracing::field::Empty),
        err
    )]
    async fn fetch_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> ForecastResult<Vec<TransactionRecord>> {
        let product_ids: Vec<Uuid> = query.product_ids.iter().map(|p| *p.as_uuid()).collect();

        let sql = select_sql(&self.table);
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(query.start)
            .bind(query.end)
            .bind(product_ids)
            .bind(query.category_id.map(|c| *c.as_uuid()))
            .bind(query.location_id.map(|l| *l.as_uuid()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_transactions", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = decode_row(row)? {
                records.push(record);
            }
        }
        Span::current().record("rows", records.len());
        Ok(records)
    }
}

fn decode_row(row: &PgRow) -> ForecastResult<Option<TransactionRecord>> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_transaction", e);

    let kind: String = row.try_get("kind").map_err(decode)?;
    let Some(kind) = parse_kind(&kind) else {
        warn!(kind = %kind, "skipping transaction with unknown kind");
        return Ok(None);
    };
    let date: NaiveDate = row.try_get("occurred_on").map_err(decode)?;
    let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
    let category_id: Option<Uuid> = row.try_get("category_id").map_err(decode)?;
    let location_id: Option<Uuid> = row.try_get("location_id").map_err(decode)?;

    Ok(Some(TransactionRecord {
        date,
        product_id: ProductId::from_uuid(product_id),
        category_id: category_id.map(CategoryId::from_uuid),
        location_id: location_id.map(LocationId::from_uuid),
        kind,
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_cost: row.try_get("unit_cost").map_err(decode)?,
        unit_price: row.try_get("unit_price").map_err(decode)?,
    }))
}

fn parse_kind(raw: &str) -> Option<TransactionKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sale" | "sales" => Some(TransactionKind::Sale),
        "return" | "sales_return" => Some(TransactionKind::Return),
        "receipt" | "purchase" => Some(TransactionKind::Receipt),
        "adjustment" => Some(TransactionKind::Adjustment),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ForecastError {
    match err {
        sqlx::Error::Database(db_err) => ForecastError::storage(format!(
            "database error in {operation}: {} (code {})",
            db_err.message(),
            db_err.code().as_deref().unwrap_or("none")
        )),
        sqlx::Error::PoolClosed => ForecastError::storage(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => ForecastError::storage(format!("connection pool timed out in {operation}")),
        other => ForecastError::storage(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(parse_kind("SALE"), Some(TransactionKind::Sale));
        assert_eq!(parse_kind(" sales_return "), Some(TransactionKind::Return));
        assert_eq!(parse_kind("purchase"), Some(TransactionKind::Receipt));
        assert_eq!(parse_kind("transfer"), None);
    }

    #[test]
    fn pool_errors_map_to_storage() {
        let err = map_sqlx_error("fetch_transactions", sqlx::Error::PoolClosed);
        assert_eq!(err.kind(), stockcast_core::ErrorKind::Storage);
        assert!(err.to_string().contains("fetch_transactions"));
    }

    #[test]
    fn query_is_tenant_scoped() {
        let sql = select_sql("txn_lines");
        assert!(sql.contains("FROM txn_lines"));
        assert!(sql.contains("WHERE tenant_id = $1"));
    }
}
