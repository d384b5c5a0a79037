use std::ffi::OsString;
use std::process::Command;

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::error::GearError;

pub const DEFAULT_ANALYSIS_BINARY: &str = "/msa/run_fLoc.sh";
pub const DEFAULT_ANALYSIS_LIBRARY: &str = "/opt/mcr/v93";

/// Invocation of the external fLoc analysis on a populated data directory.
#[derive(Debug, Clone)]
pub struct AnalysisCommand {
    pub binary: Utf8PathBuf,
    pub library: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub config_path: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl AnalysisOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code the gear reports for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self.code {
            Some(0) => 0,
            Some(code) => code.clamp(1, 255) as u8,
            None => 1,
        }
    }
}

impl AnalysisCommand {
    pub fn args(&self) -> Vec<OsString> {
        vec![
            self.library.as_os_str().to_owned(),
            self.data_dir.as_os_str().to_owned(),
            self.config_path.as_os_str().to_owned(),
        ]
    }

    pub fn command_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.binary, self.library, self.data_dir, self.config_path
        )
    }

    /// Runs the analysis in the foreground with inherited stdio.
    pub fn run(&self) -> Result<AnalysisOutcome, GearError> {
        info!(command = %self.command_line(), "running analysis");
        let status = Command::new(self.binary.as_std_path())
            .args(self.args())
            .status()
            .map_err(|err| GearError::AnalysisLaunch(format!("{}: {err}", self.binary)))?;

        let outcome = AnalysisOutcome {
            code: status.code(),
        };
        if outcome.success() {
            info!("analysis finished");
        } else {
            warn!(code = ?outcome.code, "analysis exited unsuccessfully");
        }
        Ok(outcome)
    }
}
