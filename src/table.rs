//! In-memory table: an ordered list of named columns of equal length.

use anyhow::{Result, bail};

use crate::{data::Value, error::EtlError};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.cells.len();
            if let Some(bad) = columns.iter().find(|c| c.cells.len() != expected) {
                bail!(
                    "Column '{}' has {} cell(s) but the table has {} row(s)",
                    bad.name,
                    bad.cells.len(),
                    expected
                );
            }
        }
        Ok(Self { columns })
    }

    /// Builds a table from row-major cells; every row must match the header width.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Option<Value>>>) -> Result<Self> {
        let mut columns = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect::<Vec<_>>();
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                bail!(
                    "Row {} has {} field(s) but {} column(s) were expected",
                    row_idx + 1,
                    row.len(),
                    columns.len()
                );
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.cells.push(cell);
            }
        }
        Ok(Self { columns })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| EtlError::MissingColumn(name.to_string()).into())
    }

    pub fn cell(&self, column: &str, row: usize) -> Option<&Value> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .and_then(|c| c.cells.get(row))
            .and_then(Option::as_ref)
    }

    /// Replaces the named column in place, or appends it when absent.
    pub fn set_column(&mut self, name: &str, cells: Vec<Option<Value>>) -> Result<()> {
        if !self.columns.is_empty() && cells.len() != self.row_count() {
            bail!(
                "Column '{name}' has {} cell(s) but the table has {} row(s)",
                cells.len(),
                self.row_count()
            );
        }
        match self.column_index(name) {
            Some(idx) => self.columns[idx].cells = cells,
            None => self.columns.push(Column::new(name, cells)),
        }
        Ok(())
    }

    /// Assigns the same value to every row of the named column.
    pub fn broadcast(&mut self, name: &str, value: Option<Value>) {
        let cells = vec![value; self.row_count()];
        match self.column_index(name) {
            Some(idx) => self.columns[idx].cells = cells,
            None => self.columns.push(Column::new(name, cells)),
        }
    }

    /// Narrows the table to `names`, in that order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| self.column(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Table { columns })
    }

    /// Keeps only the rows at `indices`, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let cells = indices
                    .iter()
                    .map(|&idx| column.cells.get(idx).cloned().flatten())
                    .collect();
                Column::new(column.name.clone(), cells)
            })
            .collect();
        Table { columns }
    }

    pub fn trim_headers(&mut self) {
        for column in &mut self.columns {
            let trimmed = column.name.trim();
            if trimmed.len() != column.name.len() {
                column.name = trimmed.to_string();
            }
        }
    }

    pub fn row(&self, idx: usize) -> Vec<Option<&Value>> {
        self.columns
            .iter()
            .map(|c| c.cells.get(idx).and_then(Option::as_ref))
            .collect()
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }
}
