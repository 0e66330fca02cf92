//! Column modifications for the extraction flow and the per-category
//! aggregation pipeline for the transformation flow.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde_json::Value as JsonValue;

use crate::{
    aggregate::{AggFunc, AggStrategy, AggregateSpec, aggregate_feature},
    config::{Section, string_list},
    data::Value,
    derive::DerivedColumn,
    error::EtlError,
    table::Table,
};

/// `output.col_rename` followed by `output.assign_static`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnModifications {
    pub rename: Vec<(String, String)>,
    pub assign_static: Vec<(String, Option<Value>)>,
}

impl ColumnModifications {
    pub fn from_output(output: &Section) -> Result<Self> {
        let rename = match output.get("col_rename") {
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(from, to)| match to.as_str() {
                    Some(to) => Ok((from.clone(), to.to_string())),
                    None => Err(EtlError::InvalidConfig(format!(
                        "col_rename target for '{from}' must be a string"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => bail!(EtlError::InvalidConfig("col_rename must be an object".into())),
            None => Vec::new(),
        };
        let assign_static = match output.get("assign_static") {
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(column, value)| (column.clone(), Value::from_json(value)))
                .collect(),
            Some(_) => bail!(EtlError::InvalidConfig(
                "assign_static must be an object".into()
            )),
            None => Vec::new(),
        };
        Ok(Self {
            rename,
            assign_static,
        })
    }
}

/// Renames columns, then broadcasts static values, in place.
///
/// Renames are applied simultaneously, so `{a: b, b: a}` swaps two columns.
pub fn df_col_mods_feature<'a>(
    table: &'a mut Table,
    mods: &ColumnModifications,
) -> Result<&'a mut Table> {
    debug!("Entering df_col_mods_feature");
    for (from, _) in &mods.rename {
        table.column(from).context("Renaming columns")?;
    }
    for column in table.columns_mut() {
        if let Some((_, to)) = mods.rename.iter().find(|(from, _)| *from == column.name) {
            column.name = to.clone();
        }
    }
    for (column, value) in &mods.assign_static {
        table.broadcast(column, value.clone());
    }
    debug!("Leaving df_col_mods_feature");
    Ok(table)
}

/// Everything `transform_feature` needs from the transformation section.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub derived: DerivedColumn,
    /// Category columns, one output table each; also the worksheet names.
    pub categories: Vec<String>,
    /// Aggregated value column name, then percentage share column name.
    pub dest_cols: (String, String),
    pub aggregate: AggregateSpec,
}

impl TransformSpec {
    pub fn from_section(config: &Section) -> Result<Self> {
        let output = config.require_section("output")?;
        let col_transforms = output.require_section("col_transforms")?;
        let add = col_transforms.require_str("add")?;
        let from = list(col_transforms.require("from")?, "from")?;
        let derived = DerivedColumn::new(add, &from)?;

        let categories = list(output.require("sheet_naming")?, "sheet_naming")?;
        let dest_cols = match list(output.require("dest_cols")?, "dest_cols")?.as_slice() {
            [value, share, ..] => (value.clone(), share.clone()),
            _ => bail!(EtlError::InvalidConfig(
                "dest_cols needs an aggregate column name and a percentage column name".into()
            )),
        };

        let aggregate = config.require_section("aggregate")?;
        let func = aggregate
            .require_str("aggfunc")?
            .parse::<AggFunc>()
            .map_err(|err| EtlError::InvalidConfig(err.to_string()))?;
        let strategy = aggregate
            .require_str("type")?
            .parse::<AggStrategy>()
            .map_err(|err| EtlError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            aggregate: AggregateSpec {
                value_column: derived.name.clone(),
                dest_column: dest_cols.0.clone(),
                func,
                strategy,
            },
            derived,
            categories,
            dest_cols,
        })
    }
}

fn list(value: &JsonValue, key: &str) -> Result<Vec<String>> {
    string_list(value.clone())
        .map_err(|err| EtlError::InvalidConfig(format!("Key '{key}': {err}")).into())
}

/// Adds the derived column to `table`, then aggregates it once per category
/// and appends the percentage share of each aggregate within its result.
pub fn transform_feature(table: &mut Table, spec: &TransformSpec) -> Result<Vec<Table>> {
    debug!("Entering transform_feature");
    spec.derived.apply(table)?;

    let mut results = Vec::with_capacity(spec.categories.len());
    for category in &spec.categories {
        let mut aggregated = aggregate_feature(table, category, &spec.aggregate)
            .with_context(|| format!("Aggregating by '{category}'"))?;
        let shares = percentage_shares(&aggregated, &spec.dest_cols.0)?;
        aggregated.set_column(&spec.dest_cols.1, shares)?;
        info!(
            "Aggregated '{}' by '{category}' into {} row(s)",
            spec.derived.name,
            aggregated.row_count()
        );
        results.push(aggregated);
    }
    debug!("Leaving transform_feature");
    Ok(results)
}

/// `100 * value / sum(values)`; null where the share is undefined.
fn percentage_shares(table: &Table, column: &str) -> Result<Vec<Option<Value>>> {
    let values = table
        .column(column)?
        .cells
        .iter()
        .map(|cell| {
            cell.as_ref()
                .map(|value| value.to_numeric().map(|n| n.as_f64().unwrap_or(f64::NAN)))
                .transpose()
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Computing percentage shares of '{column}'"))?;
    let total = values.iter().flatten().sum::<f64>();
    Ok(values
        .into_iter()
        .map(|value| {
            value
                .map(|v| 100.0 * v / total)
                .filter(|share| share.is_finite())
                .map(Value::Float)
        })
        .collect())
}
