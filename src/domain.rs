use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GearError;

/// Platform API key of the form `host[:port]:secret`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    raw: String,
    host: String,
}

impl ApiKey {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Host part of the key, including the port when one is present.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_url(&self) -> String {
        format!("https://{}/api", self.host)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("host", &self.host)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl FromStr for ApiKey {
    type Err = GearError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (host, secret) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| GearError::InvalidApiKey("expected host:key".to_string()))?;
        if host.is_empty() || secret.is_empty() {
            return Err(GearError::InvalidApiKey("expected host:key".to_string()));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            host: host.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "_id")]
    pub id: String,
    pub parent: ContainerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRef {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acquisition {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub classification: Option<BTreeMap<String, Vec<String>>>,
}

impl FileRecord {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    pub fn has_feature(&self, key: &str, feature: &str) -> bool {
        self.classification
            .as_ref()
            .and_then(|classification| classification.get(key))
            .map(|values| values.iter().any(|value| value == feature))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_api_key_with_port() {
        let key: ApiKey = "fw.example.org:8443:s3cr3t".parse().unwrap();
        assert_eq!(key.host(), "fw.example.org:8443");
        assert_eq!(key.base_url(), "https://fw.example.org:8443/api");
        assert_eq!(key.as_str(), "fw.example.org:8443:s3cr3t");
    }

    #[test]
    fn parse_api_key_invalid() {
        let err = "justasecret".parse::<ApiKey>().unwrap_err();
        assert_matches!(err, GearError::InvalidApiKey(_));
        let err = "host:".parse::<ApiKey>().unwrap_err();
        assert_matches!(err, GearError::InvalidApiKey(_));
    }

    #[test]
    fn api_key_debug_hides_secret() {
        let key: ApiKey = "fw.example.org:s3cr3t".parse().unwrap();
        assert!(!format!("{key:?}").contains("s3cr3t"));
    }

    #[test]
    fn acquisition_from_platform_json() {
        let acquisition: Acquisition = serde_json::from_value(serde_json::json!({
            "_id": "acq1",
            "label": "fLoc run 1",
            "timestamp": "2019-03-01T12:30:00+00:00",
            "files": [
                {"name": "run1.par", "type": "parameter", "classification": null},
                {"name": "run1.nii.gz", "type": "nifti",
                 "classification": {"Intent": ["Functional"], "Features": []}}
            ]
        }))
        .unwrap();

        assert_eq!(acquisition.files.len(), 2);
        assert!(acquisition.files[1].is_kind("nifti"));
        assert!(!acquisition.files[0].has_feature("Features", "In-Plane"));
        assert_eq!(
            acquisition.timestamp.unwrap().to_rfc3339(),
            "2019-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn acquisition_without_timestamp() {
        let acquisition: Acquisition =
            serde_json::from_value(serde_json::json!({"_id": "acq2", "timestamp": null})).unwrap();
        assert!(acquisition.timestamp.is_none());
        assert!(acquisition.files.is_empty());
    }
}
