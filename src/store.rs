use std::fs;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::GearError;
use crate::selector::SelectedInput;

pub const DATA_CATEGORY: &str = "fLoc";
pub const MANIFEST_FILE: &str = "input_data.json";

/// Record of the files selected and downloaded for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub session_id: String,
    pub session_label: String,
    pub num_runs: String,
    pub files: Vec<SelectedInput>,
}

/// Where the gear places downloaded data and the manifest.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn data_dir(&self, session_label: &str) -> Result<Utf8PathBuf, GearError> {
        let label = safe_component(session_label)?;
        Ok(self.root.join(DATA_CATEGORY).join(label))
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn ensure_data_dir(&self, session_label: &str) -> Result<Utf8PathBuf, GearError> {
        let dir = self.data_dir(session_label)?;
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| GearError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<Utf8PathBuf, GearError> {
        let path = self.manifest_path();
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| GearError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&path, &content)?;
        Ok(path)
    }

    pub fn read_manifest(&self) -> Result<Manifest, GearError> {
        let path = self.manifest_path();
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| GearError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| GearError::Filesystem(err.to_string()))
    }
}

/// Accepts a platform-supplied name only when it is one plain path component.
pub fn safe_component(name: &str) -> Result<&str, GearError> {
    let unsafe_name = || GearError::UnsafePathComponent(name.to_string());
    if name.contains(['/', '\\', '\0']) {
        return Err(unsafe_name());
    }
    let mut components = Utf8Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Utf8Component::Normal(component)), None) if component == name => Ok(component),
        _ => Err(unsafe_name()),
    }
}

/// Joins a platform-supplied file name onto `dir`, refusing anything that
/// would land outside it.
pub fn join_file(dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf, GearError> {
    Ok(dir.join(safe_component(name)?))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), GearError> {
    let parent = path
        .parent()
        .ok_or_else(|| GearError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GearError::Filesystem(err.to_string()))?;
    let temp = Builder::new()
        .prefix(".floc-gear")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GearError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| GearError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| GearError::Filesystem(err.to_string()))?;
    Ok(())
}
