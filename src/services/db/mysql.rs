//! MySQL-protocol query backend.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Pool, Row};

use super::{QueryBackend, is_unknown_object_message};
use crate::utils::{EngineError, EngineResult};

pub struct MySqlBackend {
    pool: Pool,
}

impl MySqlBackend {
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryBackend for MySqlBackend {
    async fn query(&self, sql: &str) -> EngineResult<(Vec<String>, Vec<Vec<String>>)> {
        let mut conn = self.pool.get_conn().await.map_err(|e| {
            tracing::error!("Failed to get connection from pool: {}", e);
            EngineError::ExecutionError(format!("Failed to get connection: {}", e))
        })?;

        let rows: Vec<Row> = conn.query(sql).await.map_err(|e| {
            let message = e.to_string();
            if is_unknown_object_message(&message) {
                EngineError::SchemaObjectNotFound(message)
            } else {
                tracing::error!("MySQL query execution failed: {}", message);
                EngineError::ExecutionError(format!("SQL execution failed: {}", message))
            }
        })?;

        tracing::debug!("Query returned {} rows", rows.len());

        drop(conn);

        Ok(process_query_result(rows))
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            tracing::warn!("Error disconnecting pool: {}", e);
        }
    }
}

fn process_query_result(rows: Vec<Row>) -> (Vec<String>, Vec<Vec<String>>) {
    if rows.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let col_count = rows[0].columns_ref().len();

    let mut columns = Vec::with_capacity(col_count);
    for col in rows[0].columns_ref().iter() {
        columns.push(col.name_str().to_string());
    }

    let mut result_rows = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let mut row_data = Vec::with_capacity(col_count);
        for col_idx in 0..col_count {
            row_data.push(value_to_string(&row[col_idx]));
        }
        result_rows.push(row_data);
    }

    (columns, result_rows)
}

fn value_to_string(value: &mysql_async::Value) -> String {
    match value {
        mysql_async::Value::NULL => "NULL".to_string(),
        mysql_async::Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).to_string(),
        },
        mysql_async::Value::Int(i) => i.to_string(),
        mysql_async::Value::UInt(u) => u.to_string(),
        mysql_async::Value::Float(f) => f.to_string(),
        mysql_async::Value::Double(d) => d.to_string(),
        mysql_async::Value::Date(year, month, day, hour, minute, second, _micro) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        ),
        mysql_async::Value::Time(_neg, days, hours, minutes, seconds, _micro) => {
            let total_hours = days * 24 + (*hours as u32);
            format!("{}:{:02}:{:02}", total_hours, minutes, seconds)
        },
    }
}
