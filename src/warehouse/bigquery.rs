use super::{ColumnType, LoadReport, LoadSpec, TableRef, Warehouse, WriteDisposition};
use crate::error::PipelineError;
use crate::transform::{Table, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::query::row::Row;
use tracing::{debug, info};

/// BigQuery-backed warehouse. Everything goes through query jobs: an
/// idempotent CREATE TABLE from the load schema, then a single atomic
/// write (one multi-statement transaction for overwrite, one INSERT for
/// append), then a COUNT readback for the report.
pub struct BigQueryWarehouse {
    client: Client,
}

impl BigQueryWarehouse {
    /// Authenticate with application-default credentials.
    pub async fn connect() -> Result<Self> {
        let (config, _) = ClientConfig::new_with_auth()
            .await
            .context("authenticating BigQuery client")?;
        let client = Client::new(config)
            .await
            .context("creating BigQuery client")?;
        Ok(BigQueryWarehouse { client })
    }

    async fn run_query(&self, project: &str, sql: String) -> Result<(), PipelineError> {
        debug!(bytes = sql.len(), "submitting query job");
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            ..Default::default()
        };
        let mut rows = self
            .client
            .query::<Row>(project, request)
            .await
            .map_err(|e| PipelineError::Load(format!("query job failed: {e}")))?;
        while rows
            .next()
            .await
            .map_err(|e| PipelineError::Load(format!("draining query result: {e}")))?
            .is_some()
        {}
        Ok(())
    }

    async fn count_rows(&self, table: &TableRef) -> Result<u64, PipelineError> {
        let request = QueryRequest {
            query: format!("SELECT COUNT(*) FROM {}", qualified(table)),
            use_legacy_sql: false,
            ..Default::default()
        };
        let mut rows = self
            .client
            .query::<Row>(&table.project, request)
            .await
            .map_err(|e| PipelineError::Load(format!("row count query failed: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| PipelineError::Load(format!("reading row count: {e}")))?
            .ok_or_else(|| PipelineError::Load("row count query returned no rows".into()))?;
        let count: i64 = row
            .column(0)
            .map_err(|e| PipelineError::Load(format!("decoding row count: {e}")))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn load(&self, spec: &LoadSpec, table: &Table) -> Result<LoadReport, PipelineError> {
        info!(
            table = %spec.table,
            mode = spec.disposition.as_str(),
            rows = table.num_rows(),
            "submitting load job"
        );

        self.run_query(&spec.table.project, create_table_sql(spec))
            .await?;
        if let Some(script) = write_script_sql(spec, table)? {
            self.run_query(&spec.table.project, script).await?;
        }

        let table_rows = self.count_rows(&spec.table).await?;
        let report = LoadReport {
            table_rows,
            columns: spec.schema.len(),
        };
        info!(
            rows = report.table_rows,
            columns = report.columns,
            "load complete"
        );
        Ok(report)
    }
}

fn qualified(table: &TableRef) -> String {
    format!(
        "`{}.{}.{}`",
        sanitize_identifier(&table.project),
        sanitize_identifier(&table.dataset),
        sanitize_identifier(&table.table)
    )
}

/// Reduce a name to a valid column/table identifier: alphanumerics and
/// underscores, not starting with a digit. Deterministic, so the same
/// export header always maps to the same identifier.
fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// GoogleSQL string literal with backslash escaping.
fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render one cell as a SQL literal of the column's declared type. Empty
/// cells load as NULL for non-string columns.
fn value_literal(value: &str, ty: ColumnType, column: &str) -> Result<String, PipelineError> {
    match ty {
        ColumnType::String => Ok(string_literal(value)),
        ColumnType::Float64 => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok("NULL".into());
            }
            trimmed.parse::<f64>().map_err(|_| {
                PipelineError::Load(format!(
                    "value `{value}` in column `{column}` is not numeric"
                ))
            })?;
            Ok(trimmed.to_string())
        }
        ColumnType::Timestamp => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok("NULL".into());
            }
            NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT).map_err(|_| {
                PipelineError::Load(format!(
                    "value `{value}` in column `{column}` is not a timestamp"
                ))
            })?;
            Ok(format!("TIMESTAMP {}", string_literal(trimmed)))
        }
    }
}

/// Idempotent DDL for the target table, from the explicit load schema.
fn create_table_sql(spec: &LoadSpec) -> String {
    let columns: Vec<String> = spec
        .schema
        .iter()
        .map(|c| format!("`{}` {}", sanitize_identifier(&c.name), c.ty.sql()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(&spec.table),
        columns.join(", ")
    )
}

/// The atomic write for one batch, or `None` when there is nothing to do
/// (append of zero rows). Overwrite wraps the delete and the insert in one
/// transaction so a failed job leaves the table untouched.
fn write_script_sql(spec: &LoadSpec, table: &Table) -> Result<Option<String>, PipelineError> {
    if spec.schema.len() != table.num_columns() {
        return Err(PipelineError::Load(format!(
            "load schema has {} columns but the batch has {}",
            spec.schema.len(),
            table.num_columns()
        )));
    }

    let insert = insert_sql(spec, table)?;
    match (spec.disposition, insert) {
        (WriteDisposition::Append, None) => Ok(None),
        (WriteDisposition::Append, Some(insert)) => Ok(Some(format!("{insert};"))),
        (WriteDisposition::Truncate, insert) => {
            let mut script = String::from("BEGIN TRANSACTION;\n");
            script.push_str(&format!("DELETE FROM {} WHERE TRUE;\n", qualified(&spec.table)));
            if let Some(insert) = insert {
                script.push_str(&insert);
                script.push_str(";\n");
            }
            script.push_str("COMMIT TRANSACTION;");
            Ok(Some(script))
        }
    }
}

fn insert_sql(spec: &LoadSpec, table: &Table) -> Result<Option<String>, PipelineError> {
    if table.num_rows() == 0 {
        return Ok(None);
    }

    let columns: Vec<String> = spec
        .schema
        .iter()
        .map(|c| format!("`{}`", sanitize_identifier(&c.name)))
        .collect();

    let mut tuples = Vec::with_capacity(table.num_rows());
    for row in table.rows() {
        let mut values = Vec::with_capacity(row.len());
        for (cell, column) in row.iter().zip(&spec.schema) {
            values.push(value_literal(cell, column.ty, &column.name)?);
        }
        tuples.push(format!("({})", values.join(", ")));
    }

    Ok(Some(format!(
        "INSERT INTO {} ({}) VALUES\n{}",
        qualified(&spec.table),
        columns.join(", "),
        tuples.join(",\n")
    )))
}
