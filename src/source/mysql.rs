//! MySQL row source for the control-plane databases

use super::RowSource;
use crate::schema::{Row, ScalarValue};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, Value};
use tracing::{debug, info};

/// Connection settings for a MySQL row source
#[derive(Debug, Clone)]
pub struct MysqlSourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Default schema for the session; queries use qualified table names
    pub database: String,
}

/// Row source backed by a MySQL connection pool
pub struct MysqlRowSource {
    pool: Pool,
    host: String,
}

impl MysqlRowSource {
    /// Create a new source. Connections are opened lazily on first fetch.
    pub fn new(config: &MysqlSourceConfig) -> Self {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Using MySQL row source"
        );

        Self {
            pool: Pool::new(opts),
            host: config.host.clone(),
        }
    }
}

#[async_trait]
impl RowSource for MysqlRowSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Row>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| {
            Error::SourceUnavailable(format!("cannot connect to MySQL at {}: {}", self.host, e))
        })?;

        let raw: Vec<mysql_async::Row> = conn.query(query).await?;
        debug!(rows = raw.len(), "Query returned");

        Ok(raw.iter().map(convert_row).collect())
    }

    async fn close(&self) -> Result<()> {
        self.pool.clone().disconnect().await?;
        Ok(())
    }
}

fn convert_row(row: &mysql_async::Row) -> Row {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let value = row
                .as_ref(index)
                .map(|value| convert_value(value, column.column_type()))
                .unwrap_or(ScalarValue::Null);
            (column.name_str().into_owned(), value)
        })
        .collect()
}

/// Convert a driver value to a scalar, using the declared column type to
/// interpret the text protocol's byte strings.
pub(crate) fn convert_value(value: &Value, column_type: ColumnType) -> ScalarValue {
    match value {
        Value::NULL => ScalarValue::Null,
        Value::Int(v) => ScalarValue::Int(*v),
        Value::UInt(v) => i64::try_from(*v)
            .map(ScalarValue::Int)
            .unwrap_or(ScalarValue::Float(*v as f64)),
        Value::Float(v) => ScalarValue::Float(*v as f64),
        Value::Double(v) => ScalarValue::Float(*v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)
                .and_then(|date| {
                    date.and_hms_micro_opt(*hour as u32, *minute as u32, *second as u32, *micros)
                })
                .map(|dt| ScalarValue::Timestamp(Utc.from_utc_datetime(&dt)))
                .unwrap_or(ScalarValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, _) => {
            let total_hours = *days as u64 * 24 + *hours as u64;
            let sign = if *negative { "-" } else { "" };
            ScalarValue::Str(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
        }
        Value::Bytes(bytes) => convert_text(&String::from_utf8_lossy(bytes), column_type),
    }
}

fn convert_text(text: &str, column_type: ColumnType) -> ScalarValue {
    match column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => text
            .parse::<i64>()
            .map(ScalarValue::Int)
            .or_else(|_| text.parse::<f64>().map(ScalarValue::Float))
            .unwrap_or_else(|_| ScalarValue::Str(text.to_string())),
        ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_FLOAT
        | ColumnType::MYSQL_TYPE_DOUBLE => text
            .parse::<f64>()
            .map(ScalarValue::Float)
            .unwrap_or_else(|_| ScalarValue::Str(text.to_string())),
        ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATE => parse_datetime(text),
        _ => ScalarValue::Str(text.to_string()),
    }
}

fn parse_datetime(text: &str) -> ScalarValue {
    // MySQL zero dates ("0000-00-00 00:00:00") do not parse and become NULL.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| ScalarValue::Timestamp(Utc.from_utc_datetime(&dt)))
        .unwrap_or(ScalarValue::Null)
}
