//! Warehouse side of the pipeline: an explicit load specification and a
//! client that submits one all-or-nothing batch per invocation.

pub mod bigquery;

use crate::error::PipelineError;
use crate::transform::Table;
use async_trait::async_trait;

/// Column types the loader knows how to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Float64,
    Timestamp,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
}

/// Load mode for the target table. `Truncate` replaces all existing rows in
/// the same job that writes the new ones; `Append` only adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Truncate,
    Append,
}

impl WriteDisposition {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "truncate" | "overwrite" | "overwrite-all" | "write_truncate" => {
                Some(WriteDisposition::Truncate)
            }
            "append" | "write_append" => Some(WriteDisposition::Append),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Truncate => "overwrite-all",
            WriteDisposition::Append => "append",
        }
    }
}

/// Fully-qualified target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Everything one load job needs: target, explicit column schema, and
/// write mode. Constructed once per invocation.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub table: TableRef,
    pub schema: Vec<ColumnSpec>,
    pub disposition: WriteDisposition,
}

/// Canonical columns typed STRING; everything else in a normalized table is
/// a value column.
const STRING_COLUMNS: [&str; 6] = ["Name", "Code", "Lvl_Name", "Dim_name", "Period", "Dim"];

impl LoadSpec {
    /// Derive the load schema from a normalized table: canonical dimension
    /// columns stay STRING, the insertion stamp is a TIMESTAMP, and value
    /// columns load as FLOAT64.
    pub fn for_table(table_ref: TableRef, table: &Table, disposition: WriteDisposition) -> Self {
        let schema = table
            .columns()
            .iter()
            .map(|name| {
                let ty = if STRING_COLUMNS.contains(&name.as_str()) {
                    ColumnType::String
                } else if name == "insertion_timestamp" {
                    ColumnType::Timestamp
                } else {
                    ColumnType::Float64
                };
                ColumnSpec {
                    name: name.clone(),
                    ty,
                }
            })
            .collect();
        LoadSpec {
            table: table_ref,
            schema,
            disposition,
        }
    }
}

/// Final state of the target table after a load, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows in the table once the job committed.
    pub table_rows: u64,
    /// Columns in the load schema.
    pub columns: usize,
}

/// A warehouse that accepts one batch per invocation. The job either
/// commits every row or none; a failure surfaces as a load error and is
/// never retried here.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn load(&self, spec: &LoadSpec, table: &Table) -> Result<LoadReport, PipelineError>;
}
