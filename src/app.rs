use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::{Acquisition, Session};
use crate::error::GearError;
use crate::flywheel::FlywheelClient;
use crate::selector::{MatchRules, Selection, select_inputs};
use crate::store::{Manifest, OutputLayout, join_file, safe_component};

pub const SESSION_CONTAINER: &str = "session";

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub manifest: Manifest,
    pub data_dir: Utf8PathBuf,
    pub manifest_path: Utf8PathBuf,
}

/// Gathers the inputs of an fLoc analysis from the platform.
pub struct Gear<C: FlywheelClient> {
    client: C,
    rules: MatchRules,
}

impl<C: FlywheelClient> Gear<C> {
    pub fn new(client: C) -> Self {
        Self::with_rules(client, MatchRules::default())
    }

    pub fn with_rules(client: C, rules: MatchRules) -> Self {
        Self { client, rules }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn fetch(
        &self,
        config: &ResolvedConfig,
        layout: &OutputLayout,
    ) -> Result<FetchOutcome, GearError> {
        info!(
            destination = %config.destination_id,
            kind = config.destination_kind.as_deref().unwrap_or("unknown"),
            "resolving destination"
        );
        let session_id = self.resolve_session_id(&config.destination_id)?;
        let session = self.client.get_session(&session_id)?;
        let acquisitions = self.session_acquisitions(&session)?;

        let selection = select_inputs(&acquisitions, &self.rules)?;
        layout.data_dir(&session.label)?;
        check_local_names(&selection)?;

        let data_dir = layout.ensure_data_dir(&session.label)?;
        info!(data_dir = %data_dir, "data dir set");
        self.download(&selection, &data_dir)?;

        let manifest = Manifest {
            session_id: session.id.clone(),
            session_label: session.label.clone(),
            num_runs: selection.num_runs().to_string(),
            files: selection.into_inputs(),
        };
        let manifest_path = layout.write_manifest(&manifest)?;
        info!(manifest = %manifest_path, runs = %manifest.num_runs, "wrote input manifest");

        Ok(FetchOutcome {
            manifest,
            data_dir,
            manifest_path,
        })
    }

    /// Resolves the session an analysis is attached to.
    pub fn resolve_session_id(&self, analysis_id: &str) -> Result<String, GearError> {
        let analysis = self.client.get_analysis(analysis_id)?;
        if analysis.parent.kind != SESSION_CONTAINER {
            return Err(GearError::UnsupportedContainerType(analysis.parent.kind));
        }
        Ok(analysis.parent.id)
    }

    fn session_acquisitions(&self, session: &Session) -> Result<Vec<Acquisition>, GearError> {
        let refs = self.client.list_session_acquisitions(&session.id)?;
        info!(session = %session.label, count = refs.len(), "listing acquisitions");
        refs.iter()
            .map(|acquisition| self.client.get_acquisition(&acquisition.id))
            .collect()
    }

    fn download(&self, selection: &Selection, data_dir: &Utf8Path) -> Result<(), GearError> {
        for input in selection.inputs() {
            if let Some(parfile) = &input.parfile {
                info!(file = %parfile, "downloading");
                self.client.download_file(
                    &input.acquisition_id,
                    parfile,
                    join_file(data_dir, parfile)?.as_std_path(),
                )?;
            }
            info!(file = %input.nifti, rename = %input.nifti_out_name, "downloading");
            self.client.download_file(
                &input.acquisition_id,
                &input.nifti,
                join_file(data_dir, &input.nifti_out_name)?.as_std_path(),
            )?;
        }
        Ok(())
    }
}

/// Every local name must stay inside the data directory.
fn check_local_names(selection: &Selection) -> Result<(), GearError> {
    for input in selection.inputs() {
        if let Some(parfile) = &input.parfile {
            safe_component(parfile)?;
        }
        safe_component(&input.nifti_out_name)?;
    }
    Ok(())
}
