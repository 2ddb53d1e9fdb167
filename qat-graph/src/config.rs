//! User supplied additions to a backend's quantization rules.

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{graph::FunctionKind, module::ModuleKind};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unable to read quantizer configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid quantizer configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extra exclusions and inclusions layered on top of the backend rule tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraQuantizerConfig {
    /// Module paths whose module-call nodes are never considered
    pub exclude_module_name: Vec<String>,
    /// Functions and methods whose call nodes are never considered
    pub exclude_function_type: Vec<FunctionKind>,
    /// Node names never considered
    pub exclude_node_name: Vec<String>,
    pub additional_module_type: Vec<ModuleKind>,
    pub additional_function_type: Vec<FunctionKind>,
}

impl ExtraQuantizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
