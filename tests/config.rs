use std::fs;

use assert_matches::assert_matches;

use floc_gear::config::ConfigLoader;
use floc_gear::error::GearError;

#[test]
fn load_valid_config() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "config": {"debug": true},
            "destination": {"id": "5c9d1e", "type": "analysis"},
            "inputs": {"api_key": {"base": "api-key", "key": "fw.example.org:s3cr3t"}}
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load(&path).unwrap();
    assert_eq!(config.destination_id, "5c9d1e");
    assert_eq!(config.destination_kind.as_deref(), Some("analysis"));
    assert_eq!(config.api_key.host(), "fw.example.org");
}

#[test]
fn missing_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load(&temp.path().join("absent.json")).unwrap_err();
    assert_matches!(err, GearError::ConfigNotFound(_));
}

#[test]
fn directory_is_not_a_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load(temp.path()).unwrap_err();
    assert_matches!(err, GearError::ConfigNotFound(_));
}

#[test]
fn malformed_json() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::load(&path).unwrap_err();
    assert_matches!(err, GearError::ConfigParse(_));
}

#[test]
fn missing_api_key() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{"destination": {"id": "5c9d1e"}, "inputs": {}}"#).unwrap();
    let err = ConfigLoader::load(&path).unwrap_err();
    assert_matches!(err, GearError::ConfigParse(_));
}

#[test]
fn api_key_without_host() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(
        &path,
        r#"{"destination": {"id": "5c9d1e"}, "inputs": {"api_key": {"key": "s3cr3t"}}}"#,
    )
    .unwrap();
    let err = ConfigLoader::load(&path).unwrap_err();
    assert_matches!(err, GearError::InvalidApiKey(_));
}
