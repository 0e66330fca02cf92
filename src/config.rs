//! Process configuration files and section lookups.
//!
//! A process file lives at `<config-dir>/<process name>.json` and looks like
//!
//! ```json
//! {
//!   "feature_args": { "-input": { "dest": "input_path", "help": "Source file", "required": true } },
//!   "extraction": { "description": "...", "input": { "read": { ... } }, "mapping": { ... }, "output": { ... } },
//!   "transformation": { "description": "...", "input": { ... }, "output": { ... }, "aggregate": { ... } }
//! }
//! ```
//!
//! Sections are consumed as key/value lookups with default fallback; the few
//! keys a run cannot do without go through [`Section::require`].

use std::{collections::BTreeMap, fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::EtlError;

/// Flat run-time arguments (`input_path`, `mapping_path`, `output_path`, `mode`, ...).
pub type ArgMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Extraction,
    Transformation,
}

impl FeatureKind {
    pub fn section_key(self) -> &'static str {
        match self {
            FeatureKind::Extraction => "extraction",
            FeatureKind::Transformation => "transformation",
        }
    }
}

impl FromStr for FeatureKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "extraction" => Ok(FeatureKind::Extraction),
            "transformation" => Ok(FeatureKind::Transformation),
            other => Err(EtlError::InvalidConfig(format!("Incorrect feature type: [{other}]")).into()),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_key())
    }
}

/// Splits `sales_report_extraction` into (`sales_report`, extraction).
pub fn split_process(process: &str) -> Result<(String, FeatureKind)> {
    let (name, feature) = process.rsplit_once('_').ok_or_else(|| {
        EtlError::InvalidConfig(format!(
            "Process '{process}' must look like <name>_<extraction|transformation>"
        ))
    })?;
    if name.is_empty() {
        bail!(EtlError::InvalidConfig(format!(
            "Process '{process}' is missing a name"
        )));
    }
    Ok((name.to_string(), feature.parse()?))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureArg {
    pub dest: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub feature_args: BTreeMap<String, FeatureArg>,
    #[serde(default)]
    extraction: Option<Value>,
    #[serde(default)]
    transformation: Option<Value>,
}

impl ProcessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EtlError::PathNotFound(path.to_path_buf()).into());
        }
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config JSON {path:?}"))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parsing config JSON")
    }

    pub fn feature(&self, kind: FeatureKind) -> Result<Section> {
        let value = match kind {
            FeatureKind::Extraction => self.extraction.as_ref(),
            FeatureKind::Transformation => self.transformation.as_ref(),
        };
        let value = value.ok_or_else(|| EtlError::MissingKey(kind.section_key().to_string()))?;
        Section::from_value(value.clone()).with_context(|| format!("Reading '{kind}' section"))
    }

    /// Fails on the first `required` argument destination missing from `args`.
    pub fn validate_args(&self, args: &ArgMap) -> Result<()> {
        for (flag, arg) in &self.feature_args {
            if arg.required && !args.contains_key(&arg.dest) {
                return Err(EtlError::MissingKey(arg.dest.clone()))
                    .with_context(|| format!("Argument {flag} ({}) is required", arg.help));
            }
        }
        Ok(())
    }
}

/// One JSON object of the configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section(Map<String, Value>);

impl Section {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(anyhow!("Expected a JSON object, found {other}")),
        }
    }

    /// Absent keys and explicit nulls both read as `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_str_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or(default).to_string()
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| EtlError::MissingKey(key.to_string()).into())
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require(key)?.as_str().ok_or_else(|| {
            EtlError::InvalidConfig(format!("Key '{key}' must be a string")).into()
        })
    }

    pub fn section(&self, key: &str) -> Result<Option<Section>> {
        self.get(key).cloned().map(Section::from_value).transpose()
            .with_context(|| format!("Reading section '{key}'"))
    }

    pub fn require_section(&self, key: &str) -> Result<Section> {
        Section::from_value(self.require(key)?.clone())
            .with_context(|| format!("Reading section '{key}'"))
    }

    /// Copy of this section with `updates` written over it.
    pub fn with_updates<I>(&self, updates: I) -> Section
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut map = self.0.clone();
        map.extend(updates);
        Section(map)
    }

    /// Copy of this section whose nested `key` object carries `updates`.
    pub fn with_nested_updates<I>(&self, key: &str, updates: I) -> Result<Section>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let nested = self.section(key)?.unwrap_or_default().with_updates(updates);
        let mut map = self.0.clone();
        map.insert(key.to_string(), Value::Object(nested.0));
        Ok(Section(map))
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|err| EtlError::InvalidConfig(err.to_string()).into())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Deserializes either a single string or a list of strings.
pub fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
