//! Persisted project configuration (`starky.config.json`).
//!
//! Every field is optional. A missing file loads as the default document;
//! an unreadable or malformed file is an error and is never overwritten.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use starknet::core::types::Felt;

pub use crate::resolver::ManualEventMapping;

/// Default file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "starky.config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid contract address {0:?} in config")]
    InvalidAddress(String),
}

/// Per-contract ABI supplied directly in the config (legacy form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractAbiEntry {
    pub address: String,
    #[serde(default)]
    pub abi: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_event_names: Option<Vec<String>>,
    #[serde(
        default,
        rename = "contractABIs",
        skip_serializing_if = "Option::is_none"
    )]
    pub contract_abis: Option<Vec<ContractAbiEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_event_mappings: Option<Vec<ManualEventMapping>>,
}

impl ProjectConfig {
    /// Loads the config, returning the default document when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    target: "starky::config",
                    path = %path.display(),
                    "No config file, using defaults"
                );
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the config as pretty JSON through a temporary sibling file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut body = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        body.push('\n');

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;

        tracing::info!(target: "starky::config", path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn contracts(&self) -> &[String] {
        self.contracts.as_deref().unwrap_or_default()
    }

    pub fn has_contracts(&self) -> bool {
        !self.contracts().is_empty()
    }

    /// Configured contract addresses as field elements.
    pub fn contract_addresses(&self) -> Result<Vec<Felt>, ConfigError> {
        self.contracts()
            .iter()
            .map(|a| Felt::from_hex(a).map_err(|_| ConfigError::InvalidAddress(a.clone())))
            .collect()
    }

    pub fn event_names(&self) -> &[String] {
        self.event_names.as_deref().unwrap_or_default()
    }

    pub fn exclude_event_names(&self) -> &[String] {
        self.exclude_event_names.as_deref().unwrap_or_default()
    }

    pub fn contract_abis(&self) -> &[ContractAbiEntry] {
        self.contract_abis.as_deref().unwrap_or_default()
    }

    pub fn manual_event_mappings(&self) -> &[ManualEventMapping] {
        self.manual_event_mappings.as_deref().unwrap_or_default()
    }

    /// Records the ABI path and the deployed addresses it declares.
    pub fn apply_setup(&mut self, abi_file: &str, addresses: &[Felt]) {
        self.abi_file = Some(abi_file.to_string());
        self.contracts = Some(addresses.iter().map(|a| format!("{a:#x}")).collect());
    }
}
