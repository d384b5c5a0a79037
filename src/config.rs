use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ApiKey;
use crate::error::GearError;

pub const DEFAULT_CONFIG_PATH: &str = "/flywheel/v0/config.json";
pub const DEFAULT_OUTPUT_DIR: &str = "/flywheel/v0/output";

/// On-disk shape of the gear job configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub destination: Destination,
    pub inputs: Inputs,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Destination {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Inputs {
    pub api_key: ApiKeyInput,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiKeyInput {
    pub key: String,
}

/// Validated job configuration. Immutable after load.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub destination_id: String,
    pub destination_kind: Option<String>,
    pub api_key: ApiKey,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<ResolvedConfig, GearError> {
        if !path.is_file() {
            return Err(GearError::ConfigNotFound(path.to_path_buf()));
        }

        let content =
            fs::read_to_string(path).map_err(|_| GearError::ConfigRead(path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GearError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GearError> {
        let destination_id = config.destination.id.trim().to_string();
        if destination_id.is_empty() {
            return Err(GearError::ConfigInvalid(
                "destination.id must not be empty".to_string(),
            ));
        }
        if config.inputs.api_key.key.trim().is_empty() {
            return Err(GearError::ConfigInvalid(
                "inputs.api_key.key must not be empty".to_string(),
            ));
        }
        let api_key = config.inputs.api_key.key.parse()?;

        Ok(ResolvedConfig {
            destination_id,
            destination_kind: config.destination.kind,
            api_key,
        })
    }
}
