//! Post-read hooks named by `input.plugin`.

use std::{collections::BTreeMap, fmt};

use anyhow::Result;
use log::{debug, warn};

use crate::{data::Value, table::Table};

/// A single-argument hook: `table -> table`.
pub type Plugin = Box<dyn Fn(Table) -> Result<Table>>;

pub struct PluginRegistry {
    plugins: BTreeMap<String, Plugin>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("trim_strings", trim_strings);
        registry.register("drop_empty_rows", drop_empty_rows);
        registry
    }
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Registers `plugin` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: &str, plugin: F)
    where
        F: Fn(Table) -> Result<Table> + 'static,
    {
        self.plugins.insert(name.to_string(), Box::new(plugin));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Runs the named hooks in order. Names that resolve to nothing are skipped.
    pub fn apply(&self, names: &[String], mut table: Table) -> Result<Table> {
        for name in names {
            match self.resolve(name) {
                Some(plugin) => {
                    debug!("Applying plugin '{name}'");
                    table = plugin(table)?;
                }
                None => warn!("Plugin '{name}' is not registered; skipping"),
            }
        }
        Ok(table)
    }
}

/// Trims surrounding whitespace from every string cell.
pub fn trim_strings(mut table: Table) -> Result<Table> {
    for column in table.columns_mut() {
        for cell in column.cells.iter_mut() {
            if let Some(Value::String(text)) = cell {
                let trimmed = text.trim();
                if trimmed.len() != text.len() {
                    *text = trimmed.to_string();
                }
            }
        }
    }
    Ok(table)
}

/// Drops rows whose cells are all null or blank strings.
pub fn drop_empty_rows(table: Table) -> Result<Table> {
    let keep = (0..table.row_count())
        .filter(|&idx| {
            table.row(idx).into_iter().any(|cell| match cell {
                None => false,
                Some(Value::String(text)) => !text.trim().is_empty(),
                Some(_) => true,
            })
        })
        .collect::<Vec<_>>();
    if keep.len() == table.row_count() {
        return Ok(table);
    }
    debug!("Dropping {} empty row(s)", table.row_count() - keep.len());
    Ok(table.take_rows(&keep))
}
