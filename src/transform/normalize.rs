use crate::config::QueryConfig;
use crate::error::PipelineError;
use crate::transform::table::Table;
use crate::vendor::parser::RawExport;
use chrono::Local;
use tracing::debug;

/// Wall-clock format of the derived `insertion_timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Vendor columns that always map to a canonical warehouse identifier.
const CANONICAL_RENAMES: [(&str, &str); 3] = [
    ("Account Name", "Name"),
    ("Account Code", "Code"),
    ("Level Name", "Lvl_Name"),
];

/// Strip the vendor's quote-run artifact (`"""FOO"""` → `FOO`) from the
/// ends of a value. Interior quote characters are left alone, and an
/// unquoted value passes through unchanged.
pub fn strip_quote_artifact(value: &str) -> &str {
    value.trim_matches('"')
}

/// Reshape a parsed export into the canonical warehouse layout.
///
/// Every row comes out with the same column set: the canonical renames of
/// the vendor columns, the value column(s) for the requested period(s), and
/// the derived `Period` / `Dim` / `insertion_timestamp` constants. The
/// column set is deterministic given the export header and the query.
pub fn normalize(export: &RawExport, cfg: &QueryConfig) -> Result<Table, PipelineError> {
    let mut table = Table::new(export.header.clone());
    for row in &export.rows {
        table.push_row(row.clone())?;
    }

    // Quote-run artifacts can show up on any exported value, value columns
    // included; stripping is a no-op on unquoted fields.
    for column in export.header.clone() {
        table.map_column(&column, |v| strip_quote_artifact(v).to_string());
    }

    for (from, to) in CANONICAL_RENAMES {
        rename_required(&mut table, from, to)?;
    }
    rename_required(&mut table, &cfg.dim_label(), "Dim_name")?;

    // In the single-period variant the one value column carries the period
    // label as its name; canonically it is just `Value`. A range export
    // keeps one labeled value column per period.
    if cfg.is_single_period() {
        rename_required(&mut table, &cfg.period(), "Value")?;
    }

    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    table.push_constant_column("Period", &cfg.period())?;
    table.push_constant_column("Dim", &cfg.dim)?;
    table.push_constant_column("insertion_timestamp", &stamp)?;

    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "export normalized"
    );
    Ok(table)
}

fn rename_required(table: &mut Table, from: &str, to: &str) -> Result<(), PipelineError> {
    if table.rename_column(from, to) {
        Ok(())
    } else {
        Err(PipelineError::Parse(format!(
            "expected column `{from}` is missing from the export header"
        )))
    }
}
