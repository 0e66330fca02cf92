use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde_json::Value as JsonValue;

use crate::{
    config::{Section, string_list},
    data::{CellKey, Value},
    error::EtlError,
    storage::{DataStorage, ReadSpec},
    table::{Column, Table},
};

const DEFAULT_FILL_COLUMN: &str = "Region";
const DEFAULT_FILL_VALUE: &str = "Other";

/// The `mapping` section: the reference table to load and how to join it.
#[derive(Debug, Clone)]
pub struct MappingSpec {
    pub read: ReadSpec,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub fill_column: String,
    pub fill_value: String,
}

impl MappingSpec {
    pub fn from_section(section: &Section) -> Result<Self> {
        let read = section.require_section("read")?.deserialize::<ReadSpec>()?;
        let left_on = key_list(section.require("left_on")?, "left_on")?;
        let right_on = key_list(section.require("right_on")?, "right_on")?;
        if left_on.len() != right_on.len() {
            bail!(EtlError::InvalidConfig(
                "Left and right join keys must contain the same number of columns".to_string()
            ));
        }
        Ok(Self {
            read,
            left_on,
            right_on,
            fill_column: section.get_str_or("fill_column", DEFAULT_FILL_COLUMN),
            fill_value: section.get_str_or("fill_value", DEFAULT_FILL_VALUE),
        })
    }
}

fn key_list(value: &JsonValue, key: &str) -> Result<Vec<String>> {
    let keys = string_list(value.clone())
        .map_err(|err| EtlError::InvalidConfig(format!("Key '{key}': {err}")))?;
    if keys.is_empty() {
        bail!(EtlError::InvalidConfig(format!(
            "Join key list '{key}' cannot be empty"
        )));
    }
    Ok(keys)
}

/// Left-joins the mapping table into `table`.
///
/// Every left row is kept (repeated once per matching right row), the fill
/// column's nulls become the fill value, and the right key columns are left
/// out of the result. Overlapping non-key names get `_x` / `_y` suffixes.
pub fn mapping_feature(
    storage: &dyn DataStorage,
    table: Table,
    spec: &MappingSpec,
) -> Result<Table> {
    debug!("Entering mapping_feature");
    let mapping = storage
        .read(&spec.read)
        .context("Loading mapping table")?;

    let left_indices = column_indices(&table, &spec.left_on)?;
    let right_indices = column_indices(&mapping, &spec.right_on)?;
    let lookup = build_right_lookup(&mapping, &right_indices);

    let right_columns = (0..mapping.columns().len())
        .filter(|idx| !right_indices.contains(idx))
        .collect::<Vec<_>>();
    let headers = build_output_headers(&table, &mapping, &right_columns);

    let mut left_rows = Vec::with_capacity(table.row_count());
    let mut right_rows = Vec::with_capacity(table.row_count());
    let mut matched_rows = 0usize;
    for row_idx in 0..table.row_count() {
        let matches = build_key(&table, &left_indices, row_idx).and_then(|key| lookup.get(&key));
        match matches {
            Some(bucket) => {
                for &right_idx in bucket {
                    left_rows.push(row_idx);
                    right_rows.push(Some(right_idx));
                    matched_rows += 1;
                }
            }
            None => {
                left_rows.push(row_idx);
                right_rows.push(None);
            }
        }
    }

    let mut columns = table
        .columns()
        .iter()
        .map(|column| {
            let cells = left_rows.iter().map(|&idx| column.cells[idx].clone()).collect();
            Column::new(column.name.clone(), cells)
        })
        .collect::<Vec<_>>();
    for &col_idx in &right_columns {
        let source = &mapping.columns()[col_idx];
        let cells = right_rows
            .iter()
            .map(|row| row.and_then(|idx| source.cells[idx].clone()))
            .collect();
        columns.push(Column::new(source.name.clone(), cells));
    }
    for (column, header) in columns.iter_mut().zip(headers) {
        column.name = header;
    }

    let mut joined = Table::from_columns(columns)?;
    fill_nulls(&mut joined, &spec.fill_column, &spec.fill_value)?;

    info!(
        "Mapping join complete: {} output row(s), {} matched row(s)",
        joined.row_count(),
        matched_rows
    );
    debug!("Leaving mapping_feature");
    Ok(joined)
}

fn column_indices(table: &Table, columns: &[String]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            Ok(table
                .column_index(name)
                .ok_or_else(|| EtlError::MissingColumn(name.clone()))?)
        })
        .collect()
}

/// Rows with a null in any key column never match.
fn build_key(table: &Table, key_indices: &[usize], row_idx: usize) -> Option<Vec<CellKey>> {
    key_indices
        .iter()
        .map(|&idx| table.columns()[idx].cells[row_idx].as_ref().map(Value::key))
        .collect()
}

fn build_right_lookup(mapping: &Table, key_indices: &[usize]) -> HashMap<Vec<CellKey>, Vec<usize>> {
    let mut lookup: HashMap<Vec<CellKey>, Vec<usize>> = HashMap::new();
    for row_idx in 0..mapping.row_count() {
        if let Some(key) = build_key(mapping, key_indices, row_idx) {
            lookup.entry(key).or_default().push(row_idx);
        }
    }
    lookup
}

fn build_output_headers(left: &Table, right: &Table, right_columns: &[usize]) -> Vec<String> {
    let left_names = left.column_names();
    let right_names = right_columns
        .iter()
        .map(|&idx| right.columns()[idx].name.as_str())
        .collect::<Vec<_>>();
    let overlap = left_names
        .iter()
        .filter(|name| right_names.contains(name))
        .copied()
        .collect::<HashSet<_>>();

    let suffixed = |name: &str, suffix: &str| {
        if overlap.contains(name) {
            format!("{name}{suffix}")
        } else {
            name.to_string()
        }
    };
    left_names
        .iter()
        .map(|name| suffixed(name, "_x"))
        .chain(right_names.iter().map(|name| suffixed(name, "_y")))
        .collect()
}

fn fill_nulls(table: &mut Table, column: &str, fill_value: &str) -> Result<()> {
    let idx = table
        .column_index(column)
        .ok_or_else(|| EtlError::MissingColumn(column.to_string()))?;
    for cell in &mut table.columns_mut()[idx].cells {
        if cell.is_none() {
            *cell = Some(Value::String(fill_value.to_string()));
        }
    }
    Ok(())
}
