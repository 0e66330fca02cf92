use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::ArgMap,
    pipeline::{ARG_DESCRIPTION, ARG_INPUT_PATH, ARG_MAPPING_PATH, ARG_MODE, ARG_OUTPUT_PATH},
};

#[derive(Debug, Parser)]
#[command(
    name = "etldata",
    author,
    version,
    about = "Run configuration-driven extraction and transformation of tabular files",
    long_about = None
)]
pub struct Cli {
    /// Process to run, `<process name>_<extraction|transformation>`
    #[arg(short, long)]
    pub process: String,
    /// Directory holding `<process name>.json` files
    #[arg(long = "config-dir", default_value = "config")]
    pub config_dir: PathBuf,
    /// Source file for the input section
    #[arg(short = 'i', long = "input-path")]
    pub input_path: Option<String>,
    /// Reference file for the mapping section
    #[arg(long = "mapping-path")]
    pub mapping_path: Option<String>,
    /// Intended destination file
    #[arg(short = 'o', long = "output-path")]
    pub output_path: Option<String>,
    /// Write mode; `new` never overwrites an existing file
    #[arg(short, long)]
    pub mode: Option<String>,
    /// Overrides the feature description used in log records
    #[arg(long)]
    pub description: Option<String>,
    /// Additional feature arguments as `dest=value` (repeatable)
    #[arg(long = "arg", value_parser = parse_key_value, action = clap::ArgAction::Append)]
    pub extra: Vec<(String, String)>,
    /// Append log records to this file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,
}

impl Cli {
    /// Flattens the provided run-time arguments; absent options are omitted.
    pub fn to_arg_map(&self) -> ArgMap {
        let mut args = ArgMap::new();
        let known = [
            (ARG_INPUT_PATH, &self.input_path),
            (ARG_MAPPING_PATH, &self.mapping_path),
            (ARG_OUTPUT_PATH, &self.output_path),
            (ARG_MODE, &self.mode),
            (ARG_DESCRIPTION, &self.description),
        ];
        for (key, value) in known {
            if let Some(value) = value {
                args.insert(key.to_string(), value.clone());
            }
        }
        args.extend(self.extra.iter().cloned());
        args
    }
}

pub fn parse_key_value(value: &str) -> Result<(String, String), String> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected dest=value, got '{value}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("Argument destination cannot be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}
