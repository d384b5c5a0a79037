use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Acquisition, FileRecord};
use crate::error::GearError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Naming and classification conventions used to pick inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRules {
    pub primary_suffix: String,
    pub secondary_kind: String,
    pub secondary_suffix: String,
    pub classification_key: String,
    pub reference_feature: String,
    pub reference_name: String,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            primary_suffix: ".par".to_string(),
            secondary_kind: "nifti".to_string(),
            secondary_suffix: ".nii.gz".to_string(),
            classification_key: "Features".to_string(),
            reference_feature: "In-Plane".to_string(),
            reference_name: "Inplane.nii.gz".to_string(),
        }
    }
}

impl MatchRules {
    pub fn is_primary(&self, file: &FileRecord) -> bool {
        file.name.ends_with(&self.primary_suffix)
    }

    /// Local name for the image paired with `primary_name`.
    pub fn rename(&self, primary_name: &str) -> String {
        let stem = primary_name
            .strip_suffix(&self.primary_suffix)
            .unwrap_or(primary_name);
        format!("{stem}{}", self.secondary_suffix)
    }

    fn single_secondary<'a>(&self, acquisition: &'a Acquisition) -> Result<&'a FileRecord, usize> {
        let mut matches = acquisition
            .files
            .iter()
            .filter(|file| file.is_kind(&self.secondary_kind));
        match (matches.next(), matches.next()) {
            (Some(file), None) => Ok(file),
            (None, _) => Err(0),
            (Some(_), Some(_)) => Err(2 + matches.count()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parfile: Option<String>,
    pub nifti: String,
    pub nifti_out_name: String,
    pub acquisition_id: String,
    pub label: String,
    pub timestamp: Option<String>,
}

impl SelectedInput {
    fn new(
        acquisition: &Acquisition,
        parfile: Option<String>,
        nifti: &FileRecord,
        nifti_out_name: String,
    ) -> Self {
        Self {
            parfile,
            nifti: nifti.name.clone(),
            nifti_out_name,
            acquisition_id: acquisition.id.clone(),
            label: acquisition.label.clone(),
            timestamp: acquisition
                .timestamp
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub runs: Vec<SelectedInput>,
    pub reference: Option<SelectedInput>,
}

impl Selection {
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    /// Runs in acquisition order, followed by the reference anatomy.
    pub fn inputs(&self) -> impl Iterator<Item = &SelectedInput> {
        self.runs.iter().chain(self.reference.iter())
    }

    pub fn into_inputs(self) -> Vec<SelectedInput> {
        let mut inputs = self.runs;
        inputs.extend(self.reference);
        inputs
    }
}

pub fn select_inputs(
    acquisitions: &[Acquisition],
    rules: &MatchRules,
) -> Result<Selection, GearError> {
    let runs = select_runs(acquisitions, rules)?;
    let reference = select_reference(acquisitions, rules);
    Ok(Selection { runs, reference })
}

/// Pairs every primary file with the only secondary-kind file of its acquisition.
///
/// Fails with [`GearError::NoInputFilesFound`] when the session holds no
/// primary file at all; rejected pairings are only logged.
pub fn select_runs(
    acquisitions: &[Acquisition],
    rules: &MatchRules,
) -> Result<Vec<SelectedInput>, GearError> {
    let mut found_primary = false;
    let mut runs = Vec::new();

    for acquisition in acquisitions {
        for file in acquisition.files.iter().filter(|file| rules.is_primary(file)) {
            found_primary = true;
            info!(parfile = %file.name, acquisition = %acquisition.label, "found parfile");

            match rules.single_secondary(acquisition) {
                Ok(nifti) => {
                    let rename = rules.rename(&file.name);
                    info!(nifti = %nifti.name, rename = %rename, "found associated nifti file");
                    runs.push(SelectedInput::new(
                        acquisition,
                        Some(file.name.clone()),
                        nifti,
                        rename,
                    ));
                }
                Err(count) => warn!(
                    parfile = %file.name,
                    candidates = count,
                    "no single {} file to associate with the parfile",
                    rules.secondary_kind
                ),
            }
        }
    }

    if !found_primary {
        return Err(GearError::NoInputFilesFound);
    }
    Ok(runs)
}

/// Picks the reference anatomy image from the latest classified acquisition.
pub fn select_reference(
    acquisitions: &[Acquisition],
    rules: &MatchRules,
) -> Option<SelectedInput> {
    let mut candidates: Vec<&Acquisition> = Vec::new();
    for acquisition in acquisitions {
        let classified = acquisition
            .files
            .iter()
            .any(|file| file.has_feature(&rules.classification_key, &rules.reference_feature));
        if classified && !candidates.iter().any(|seen| seen.id == acquisition.id) {
            candidates.push(acquisition);
        }
    }

    if candidates.len() > 1 {
        warn!(
            count = candidates.len(),
            "more than one {} acquisition was found, using the latest", rules.reference_feature
        );
    }

    // Missing timestamps order first; equal timestamps fall back to the id.
    let Some(chosen) = candidates
        .into_iter()
        .max_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)))
    else {
        warn!("no {} acquisition found", rules.reference_feature);
        return None;
    };

    match rules.single_secondary(chosen) {
        Ok(nifti) => {
            info!(
                nifti = %nifti.name,
                rename = %rules.reference_name,
                "found associated inplane file"
            );
            Some(SelectedInput::new(
                chosen,
                None,
                nifti,
                rules.reference_name.clone(),
            ))
        }
        Err(count) => {
            warn!(
                acquisition = %chosen.label,
                candidates = count,
                "no single {} file in the {} acquisition",
                rules.secondary_kind,
                rules.reference_feature
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_replaces_trailing_suffix_only() {
        let rules = MatchRules::default();
        assert_eq!(rules.rename("scan1.par"), "scan1.nii.gz");
        assert_eq!(rules.rename("a.par.run.par"), "a.par.run.nii.gz");
    }

    #[test]
    fn selection_inputs_put_reference_last() {
        let input = |name: &str| SelectedInput {
            parfile: None,
            nifti: name.to_string(),
            nifti_out_name: name.to_string(),
            acquisition_id: name.to_string(),
            label: String::new(),
            timestamp: None,
        };
        let selection = Selection {
            runs: vec![input("r1"), input("r2")],
            reference: Some(input("ref")),
        };
        let names = selection
            .inputs()
            .map(|item| item.nifti.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["r1", "r2", "ref"]);
        assert_eq!(selection.num_runs(), 2);
        assert_eq!(selection.into_inputs().len(), 3);
    }
}
