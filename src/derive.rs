use anyhow::{Context, Result, anyhow};
use log::debug;

use crate::{data::Value, error::EtlError, table::Table};

/// A column computed as the row-wise product of two existing columns,
/// e.g. `TOTAL = QTY * PRICE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub name: String,
    pub factors: (String, String),
}

impl DerivedColumn {
    pub fn new(name: &str, from: &[String]) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EtlError::InvalidConfig("Derived column is missing a name".into()).into());
        }
        match from {
            [left, right] => Ok(Self {
                name: name.to_string(),
                factors: (left.clone(), right.clone()),
            }),
            other => Err(EtlError::InvalidConfig(format!(
                "Derived column '{name}' needs exactly two source columns, got {}",
                other.len()
            ))
            .into()),
        }
    }

    /// Adds (or replaces) the derived column on `table`.
    pub fn apply(&self, table: &mut Table) -> Result<()> {
        debug!(
            "Deriving '{}' = '{}' * '{}'",
            self.name, self.factors.0, self.factors.1
        );
        let left = table.column(&self.factors.0)?;
        let right = table.column(&self.factors.1)?;
        let cells = left
            .cells
            .iter()
            .zip(&right.cells)
            .enumerate()
            .map(|(row_idx, (a, b))| {
                multiply(a.as_ref(), b.as_ref()).with_context(|| {
                    format!("Computing '{}' for row {}", self.name, row_idx + 1)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        table.set_column(&self.name, cells)
    }
}

/// Null in, null out; integer times integer stays integer unless it overflows.
pub fn multiply(left: Option<&Value>, right: Option<&Value>) -> Result<Option<Value>> {
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(None);
    };
    let product = match (left.to_numeric()?, right.to_numeric()?) {
        (Value::Integer(a), Value::Integer(b)) => match a.checked_mul(b) {
            Some(product) => Value::Integer(product),
            None => Value::Float(a as f64 * b as f64),
        },
        (a, b) => {
            let a = a.as_f64().ok_or_else(|| anyhow!("'{a}' is not numeric"))?;
            let b = b.as_f64().ok_or_else(|| anyhow!("'{b}' is not numeric"))?;
            Value::Float(a * b)
        }
    };
    Ok(Some(product))
}
