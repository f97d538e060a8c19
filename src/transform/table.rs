use crate::error::PipelineError;

/// Flat, uniform tabular batch. Column order is the load order, and every
/// row always has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Append a row, enforcing the arity invariant.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), PipelineError> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::Parse(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Rename a column in place. Returns false when the column is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Apply `f` to every value of the named column. Returns false when the
    /// column is absent.
    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = f(&row[idx]);
                }
                true
            }
            None => false,
        }
    }

    /// Append a column holding the same value in every row. A duplicate
    /// column name would break the uniform-column-set guarantee, so it is
    /// rejected.
    pub fn push_constant_column(&mut self, name: &str, value: &str) -> Result<(), PipelineError> {
        if self.has_column(name) {
            return Err(PipelineError::Parse(format!(
                "derived column `{name}` collides with an export column"
            )));
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
        Ok(())
    }

    /// Value at (row, column name), mainly for assertions in tests.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }
}
