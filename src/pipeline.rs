//! The two entry flows: extraction and transformation.
//!
//! The feature section of the process file is a template; run-time arguments
//! override its `path`, `mode` and `description` fields before anything runs.

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value as JsonValue;

use crate::{
    config::{ArgMap, FeatureKind, Section, string_list},
    error::EtlError,
    join::{MappingSpec, mapping_feature},
    plugin::PluginRegistry,
    storage::{DataStorage, Dataset, FileDataStorage, ReadSpec, WriteSpec},
    table::Table,
    transform::{ColumnModifications, TransformSpec, df_col_mods_feature, transform_feature},
    versioning,
};

pub const ARG_INPUT_PATH: &str = "input_path";
pub const ARG_MAPPING_PATH: &str = "mapping_path";
pub const ARG_OUTPUT_PATH: &str = "output_path";
pub const ARG_MODE: &str = "mode";
pub const ARG_DESCRIPTION: &str = "description";

pub struct Pipeline {
    storage: Box<dyn DataStorage>,
    plugins: PluginRegistry,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Box::new(FileDataStorage), PluginRegistry::default())
    }
}

impl Pipeline {
    pub fn new(storage: Box<dyn DataStorage>, plugins: PluginRegistry) -> Self {
        Self { storage, plugins }
    }

    pub fn plugins_mut(&mut self) -> &mut PluginRegistry {
        &mut self.plugins
    }

    pub fn run(&self, kind: FeatureKind, args: &ArgMap, config: &Section) -> Result<Table> {
        match kind {
            FeatureKind::Extraction => self.run_extraction(args, config),
            FeatureKind::Transformation => self.run_transformation(args, config),
        }
    }

    /// read → plugin → mapping join → column modifications → write.
    pub fn run_extraction(&self, args: &ArgMap, config: &Section) -> Result<Table> {
        debug!("Entering run_extraction");
        let description = description(args, config);

        let input = config.require_section("input")?;
        let table = self.read_input(&input, args.get(ARG_INPUT_PATH), &description)?;

        let mapping = config
            .require_section("mapping")?
            .with_nested_updates("read", read_overrides(args.get(ARG_MAPPING_PATH), &description))?;
        let mapping = MappingSpec::from_section(&mapping).context("Reading 'mapping' section")?;
        let mut table = mapping_feature(self.storage.as_ref(), table, &mapping)?;

        let output = config.require_section("output")?;
        let mods = ColumnModifications::from_output(&output)?;
        df_col_mods_feature(&mut table, &mods)?;

        let write = write_spec(&output, args, &description)?;
        self.storage.write(&write, Dataset::Single(&table))?;
        debug!("Leaving run_extraction");
        Ok(table)
    }

    /// read → plugin → per-category aggregation → multi-sheet write.
    ///
    /// Returns the table as it stood before aggregation (carrying the derived
    /// column); the aggregated tables only go to disk.
    pub fn run_transformation(&self, args: &ArgMap, config: &Section) -> Result<Table> {
        debug!("Entering run_transformation");
        let description = description(args, config);

        let input = config.require_section("input")?;
        let mut table = self.read_input(&input, args.get(ARG_INPUT_PATH), &description)?;

        let spec = TransformSpec::from_section(config)?;
        let transformed = transform_feature(&mut table, &spec)?;
        info!(
            "Transformation produced {} table(s) for {:?}",
            transformed.len(),
            spec.categories
        );

        let output = config.require_section("output")?;
        let write = write_spec(&output, args, &description)?;
        self.storage.write(&write, Dataset::Many(&transformed))?;
        debug!("Leaving run_transformation");
        Ok(table)
    }

    fn read_input(
        &self,
        input: &Section,
        path: Option<&String>,
        description: &str,
    ) -> Result<Table> {
        let input = input.with_nested_updates("read", read_overrides(path, description))?;
        let read = input
            .require_section("read")?
            .deserialize::<ReadSpec>()
            .context("Reading 'input.read' section")?;
        let table = self.storage.read(&read)?;

        let plugins = match input.get("plugin") {
            Some(value) => string_list(value.clone())
                .map_err(|err| EtlError::InvalidConfig(format!("Key 'plugin': {err}")))?,
            None => Vec::new(),
        };
        self.plugins.apply(&plugins, table)
    }
}

fn description(args: &ArgMap, config: &Section) -> String {
    args.get(ARG_DESCRIPTION)
        .cloned()
        .unwrap_or_else(|| config.get_str_or("description", ""))
}

fn read_overrides(path: Option<&String>, description: &str) -> Vec<(String, JsonValue)> {
    let mut updates = vec![("description".to_string(), JsonValue::from(description))];
    if let Some(path) = path {
        updates.push(("path".to_string(), JsonValue::from(path.as_str())));
    }
    updates
}

/// Mode precedence: run argument, then `output.mode`, then `new`.
fn write_spec(output: &Section, args: &ArgMap, description: &str) -> Result<WriteSpec> {
    let mut updates = vec![("description".to_string(), JsonValue::from(description))];
    if let Some(path) = args.get(ARG_OUTPUT_PATH) {
        updates.push(("path".to_string(), JsonValue::from(path.as_str())));
    }
    let mode = args
        .get(ARG_MODE)
        .cloned()
        .unwrap_or_else(|| output.get_str_or("mode", versioning::MODE_NEW));
    updates.push(("mode".to_string(), JsonValue::from(mode)));

    let output = output.with_updates(updates);
    output.require("path")?;
    output
        .deserialize::<WriteSpec>()
        .context("Reading 'output' section")
}
