//! Column type declarations and the coercion applied after a read.
//!
//! A read section may carry an `apply_dtype` mapping such as
//!
//! ```json
//! "apply_dtype": { "INSURANCE_CODE": "str", "INSURANCE_AMOUNT": "float", "CLIENT_TYPE": "int" }
//! ```
//!
//! [`apply_dtype_feature`] coerces each declared column and narrows the table
//! to exactly the declared columns, in declaration order.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use log::debug;
use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor},
};

use crate::{
    data::{Value, float_to_i64, parse_naive_datetime},
    error::EtlError,
    table::{Column, Table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Date,
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "str" | "string" => Ok(ColumnType::String),
            "int" | "integer" => Ok(ColumnType::Integer),
            "float" => Ok(ColumnType::Float),
            "date" | "datetime" | "datetime.date" => Ok(ColumnType::Date),
            other => Err(anyhow!("Unknown column type '{other}'")),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::String => "str",
            ColumnType::Integer => "int",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        };
        f.write_str(label)
    }
}

/// Ordered column name to type mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtypeDeclaration(Vec<(String, ColumnType)>);

impl DtypeDeclaration {
    pub fn new(entries: Vec<(String, ColumnType)>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[(String, ColumnType)] {
        &self.0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.0.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl<'de> Deserialize<'de> for DtypeDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DeclarationVisitor;

        impl<'de> Visitor<'de> for DeclarationVisitor {
            type Value = DtypeDeclaration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of column names to type labels")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, ty)) = map.next_entry::<String, ColumnType>()? {
                    entries.push((name, ty));
                }
                Ok(DtypeDeclaration(entries))
            }
        }

        deserializer.deserialize_map(DeclarationVisitor)
    }
}

/// Coerces the declared columns and narrows the table to them.
///
/// Nulls become `""`, `0`, or `0.0` for string, integer, and float columns;
/// date columns keep nulls. Every column is converted before the table is
/// rebuilt, so a failure leaves no partially coerced result.
pub fn apply_dtype_feature(table: Table, declaration: &DtypeDeclaration) -> Result<Table> {
    if declaration.is_empty() {
        return Ok(table);
    }
    debug!("Entering apply_dtype_feature");
    let mut coerced = Vec::with_capacity(declaration.0.len());
    for (name, ty) in &declaration.0 {
        let column = table.column(name)?;
        let cells = column
            .cells
            .iter()
            .map(|cell| coerce_cell(cell.as_ref(), *ty, name))
            .collect::<Result<Vec<_>>>()?;
        coerced.push(Column::new(name.clone(), cells));
    }
    let result = Table::from_columns(coerced)?;
    debug!("Leaving apply_dtype_feature");
    Ok(result)
}

pub fn coerce_cell(cell: Option<&Value>, ty: ColumnType, column: &str) -> Result<Option<Value>> {
    let failure = |value: &Value| EtlError::Coercion {
        column: column.to_string(),
        value: value.as_display(),
        target: ty.to_string(),
    };
    let coerced = match (ty, cell) {
        (ColumnType::String, None) => Some(Value::String(String::new())),
        (ColumnType::String, Some(Value::String(s))) => Some(Value::String(s.clone())),
        (ColumnType::String, Some(other)) => Some(Value::String(other.as_display())),

        (ColumnType::Integer, None) => Some(Value::Integer(0)),
        (ColumnType::Integer, Some(Value::Integer(i))) => Some(Value::Integer(*i)),
        (ColumnType::Integer, Some(value @ Value::Float(f))) => {
            Some(Value::Integer(float_to_i64(*f).ok_or_else(|| failure(value))?))
        }
        (ColumnType::Integer, Some(value @ Value::String(s))) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(Value::Integer(0))
            } else if let Ok(parsed) = trimmed.parse::<i64>() {
                Some(Value::Integer(parsed))
            } else {
                match trimmed.parse::<f64>().ok().filter(|parsed| parsed.fract() == 0.0) {
                    Some(parsed) => {
                        Some(Value::Integer(float_to_i64(parsed).ok_or_else(|| failure(value))?))
                    }
                    None => return Err(failure(value).into()),
                }
            }
        }

        (ColumnType::Float, None) => Some(Value::Float(0.0)),
        (ColumnType::Float, Some(Value::Integer(i))) => Some(Value::Float(*i as f64)),
        (ColumnType::Float, Some(Value::Float(f))) => Some(Value::Float(*f)),
        (ColumnType::Float, Some(value @ Value::String(s))) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(Value::Float(0.0))
            } else {
                let parsed = trimmed.parse::<f64>().map_err(|_| failure(value))?;
                Some(Value::Float(parsed))
            }
        }

        (ColumnType::Date, None) => None,
        (ColumnType::Date, Some(Value::Date(dt))) => Some(Value::Date(*dt)),
        (ColumnType::Date, Some(value @ Value::String(s))) => {
            if s.trim().is_empty() {
                None
            } else {
                let parsed = parse_naive_datetime(s).map_err(|_| failure(value))?;
                Some(Value::Date(parsed))
            }
        }

        (_, Some(other)) => return Err(failure(other).into()),
    };
    Ok(coerced)
}
