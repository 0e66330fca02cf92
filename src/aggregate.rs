//! Per-category aggregation of a value column.
//!
//! Two strategies produce the same `[category, aggregate]` rows:
//!
//! - `groupby` keeps categories in order of first appearance;
//! - `pivot` indexes on the category and therefore sorts it.
//!
//! Rows whose category is null belong to no group.

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::debug;

use crate::{
    data::{CellKey, Value},
    table::{Column, Table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
}

impl FromStr for AggFunc {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggFunc::Sum),
            "mean" | "avg" | "average" => Ok(AggFunc::Mean),
            "median" => Ok(AggFunc::Median),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "count" => Ok(AggFunc::Count),
            other => Err(anyhow!("Unknown aggregation function '{other}'")),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Median => "median",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
        })
    }
}

impl AggFunc {
    /// Aggregates the non-null `values` of one group.
    ///
    /// An empty group sums to zero; the other functions except `count` yield null.
    pub fn apply(self, values: &[&Value]) -> Result<Option<Value>> {
        match self {
            AggFunc::Count => Ok(Some(Value::Integer(values.len() as i64))),
            AggFunc::Min => Ok(values.iter().min_by(|a, b| a.sort_cmp(b)).map(|v| (*v).clone())),
            AggFunc::Max => Ok(values.iter().max_by(|a, b| a.sort_cmp(b)).map(|v| (*v).clone())),
            AggFunc::Sum => {
                let numbers = numeric(values)?;
                Ok(Some(sum(&numbers)))
            }
            AggFunc::Mean => {
                let numbers = floats(values)?;
                if numbers.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Value::Float(
                    numbers.iter().sum::<f64>() / numbers.len() as f64,
                )))
            }
            AggFunc::Median => {
                let mut numbers = floats(values)?;
                if numbers.is_empty() {
                    return Ok(None);
                }
                numbers.sort_by(f64::total_cmp);
                let mid = numbers.len() / 2;
                let median = if numbers.len() % 2 == 0 {
                    (numbers[mid - 1] + numbers[mid]) / 2.0
                } else {
                    numbers[mid]
                };
                Ok(Some(Value::Float(median)))
            }
        }
    }
}

fn numeric(values: &[&Value]) -> Result<Vec<Value>> {
    values.iter().map(|value| value.to_numeric()).collect()
}

fn floats(values: &[&Value]) -> Result<Vec<f64>> {
    Ok(numeric(values)?
        .iter()
        .filter_map(Value::as_f64)
        .collect())
}

fn sum(numbers: &[Value]) -> Value {
    let all_integers = numbers.iter().all(|v| matches!(v, Value::Integer(_)));
    if all_integers {
        let total = numbers.iter().try_fold(0i64, |acc, v| match v {
            Value::Integer(i) => acc.checked_add(*i),
            _ => None,
        });
        if let Some(total) = total {
            return Value::Integer(total);
        }
    }
    Value::Float(numbers.iter().filter_map(Value::as_f64).sum())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggStrategy {
    GroupBy,
    Pivot,
}

impl FromStr for AggStrategy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groupby" => Ok(AggStrategy::GroupBy),
            "pivot" => Ok(AggStrategy::Pivot),
            other => Err(anyhow!("Unknown aggregation type '{other}'")),
        }
    }
}

impl fmt::Display for AggStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggStrategy::GroupBy => "groupby",
            AggStrategy::Pivot => "pivot",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    /// Column whose values are aggregated (the derived column).
    pub value_column: String,
    /// Name given to the aggregated column in the result.
    pub dest_column: String,
    pub func: AggFunc,
    pub strategy: AggStrategy,
}

struct Group {
    category: Value,
    rows: Vec<usize>,
}

/// Aggregates `spec.value_column` per distinct value of `category`.
pub fn aggregate_feature(table: &Table, category: &str, spec: &AggregateSpec) -> Result<Table> {
    debug!(
        "Entering aggregate_feature ({category}, {} via {})",
        spec.func, spec.strategy
    );
    let categories = table.column(category)?;
    let values = table.column(&spec.value_column)?;

    let mut groups: Vec<Group> = Vec::new();
    let mut positions: HashMap<CellKey, usize> = HashMap::new();
    for (row_idx, cell) in categories.cells.iter().enumerate() {
        let Some(category_value) = cell else {
            continue;
        };
        let slot = *positions
            .entry(category_value.key())
            .or_insert_with(|| {
                groups.push(Group {
                    category: category_value.clone(),
                    rows: Vec::new(),
                });
                groups.len() - 1
            });
        groups[slot].rows.push(row_idx);
    }

    let groups = match spec.strategy {
        AggStrategy::GroupBy => groups,
        AggStrategy::Pivot => groups
            .into_iter()
            .sorted_by(|a, b| a.category.sort_cmp(&b.category))
            .collect(),
    };

    let mut category_cells = Vec::with_capacity(groups.len());
    let mut aggregate_cells = Vec::with_capacity(groups.len());
    for group in groups {
        let members = group
            .rows
            .iter()
            .filter_map(|&idx| values.cells[idx].as_ref())
            .collect::<Vec<_>>();
        let aggregate = spec.func.apply(&members).with_context(|| {
            format!(
                "Aggregating '{}' for {category} '{}'",
                spec.value_column, group.category
            )
        })?;
        category_cells.push(Some(group.category));
        aggregate_cells.push(aggregate);
    }

    let result = Table::from_columns(vec![
        Column::new(category, category_cells),
        Column::new(spec.dest_column.clone(), aggregate_cells),
    ])?;
    debug!("Leaving aggregate_feature with {} row(s)", result.row_count());
    Ok(result)
}
