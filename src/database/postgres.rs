//! # PostgreSQL Datastore
//!
//! SQLx-backed implementation of the pool traits. Parameters are bound by
//! their JSON type and result columns are decoded by their PostgreSQL type
//! name into JSON values.

use super::pool::{ConnectionSettings, DatastoreConnection, DatastoreConnector, DatastorePool, Row};
use super::DatastoreError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Opens SQLx PostgreSQL pools
#[derive(Debug, Default, Clone)]
pub struct PgConnector;

impl PgConnector {
    fn connect_options(settings: &ConnectionSettings) -> Result<PgConnectOptions, DatastoreError> {
        if let Some(url) = &settings.url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| DatastoreError::Configuration(e.to_string()));
        }

        let mut options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .ssl_mode(if settings.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        if let Some(password) = &settings.password {
            options = options.password(password);
        }
        Ok(options)
    }
}

#[async_trait]
impl DatastoreConnector for PgConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn DatastorePool>, DatastoreError> {
        let options = Self::connect_options(settings)?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        info!(
            target_db = %settings.target(),
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "🗄️ DATASTORE: PostgreSQL pool opened"
        );

        Ok(Arc::new(PgDatastorePool { pool }))
    }
}

/// SQLx pool wrapper
#[derive(Debug, Clone)]
pub struct PgDatastorePool {
    pool: PgPool,
}

impl PgDatastorePool {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatastorePool for PgDatastorePool {
    async fn acquire(&self) -> Result<Box<dyn DatastoreConnection>, DatastoreError> {
        let connection = self.pool.acquire().await?;
        Ok(Box::new(PgDatastoreConnection { connection }))
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!("PostgreSQL pool closed");
        }
    }

    fn size(&self) -> u32 {
        self.pool.size()
    }

    fn idle(&self) -> usize {
        self.pool.num_idle()
    }
}

struct PgDatastoreConnection {
    connection: PoolConnection<Postgres>,
}

#[async_trait]
impl DatastoreConnection for PgDatastoreConnection {
    async fn execute(&mut self, query: &str, params: &[Value]) -> Result<Vec<Row>, DatastoreError> {
        let mut statement = sqlx::query(query);
        for param in params {
            statement = bind_json(statement, param);
        }

        let rows = statement.fetch_all(&mut *self.connection).await?;
        rows.iter().map(row_to_json).collect()
    }
}

fn bind_json<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    }
}

fn row_to_json(row: &PgRow) -> Result<Row, DatastoreError> {
    let mut map = Row::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, DatastoreError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::from(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::String)
        }
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(|id| Value::String(id.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|at| Value::String(at.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|at| Value::String(at.to_string())),
        // Types without a JSON mapping decode as text when the driver allows it
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}
