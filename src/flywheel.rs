use std::ffi::OsStr;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Acquisition, AcquisitionRef, Analysis, ApiKey, Session};
use crate::error::GearError;

pub const SKIP_VERSION_CHECK_ENV: &str = "FLYWHEEL_SDK_SKIP_VERSION_CHECK";

/// Remote calls the gear needs from the data platform.
pub trait FlywheelClient {
    fn get_analysis(&self, id: &str) -> Result<Analysis, GearError>;
    fn get_session(&self, id: &str) -> Result<Session, GearError>;
    fn list_session_acquisitions(&self, session_id: &str)
    -> Result<Vec<AcquisitionRef>, GearError>;
    fn get_acquisition(&self, id: &str) -> Result<Acquisition, GearError>;
    fn download_file(
        &self,
        acquisition_id: &str,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), GearError>;
}

#[derive(Clone)]
pub struct FlywheelHttpClient {
    client: Client,
    base_url: Url,
}

impl FlywheelHttpClient {
    pub fn new(api_key: &ApiKey, check_version: bool) -> Result<Self, GearError> {
        let base_url = api_key.base_url();
        let client = Self::with_base_url(api_key, &base_url)?;
        if check_version {
            client.check_version();
        }
        Ok(client)
    }

    pub fn with_base_url(api_key: &ApiKey, base_url: &str) -> Result<Self, GearError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("floc-gear/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GearError::InvalidApiKey(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("scitran-user {}", api_key.as_str()))
            .map_err(|err| GearError::InvalidApiKey(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        // Downloads can be large; only bound the connect phase.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| GearError::RemoteUnavailable(err.to_string()))?;
        let base_url = Url::parse(base_url)
            .map_err(|err| GearError::InvalidApiKey(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GearError::InvalidApiKey(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Appends percent-encoded path segments to the API base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn check_version(&self) {
        let url = self.endpoint(&["version"]);
        match self.get_json::<Value>(url, "server version") {
            Ok(version) => {
                let release = version
                    .get("release")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                info!(release, "connected to Flywheel");
            }
            Err(err) => warn!("Flywheel version check failed: {err}"),
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
        what: &str,
    ) -> Result<reqwest::blocking::Response, GearError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GearError::NotFound(what.to_string()));
        }
        let message = response
            .text()
            .unwrap_or_else(|_| "Flywheel request failed".to_string());
        Err(GearError::RemoteStatus {
            status: status.as_u16(),
            message,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T, GearError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GearError::RemoteUnavailable(err.to_string()))?;
        let response = Self::handle_status(response, what)?;
        response
            .json()
            .map_err(|err| GearError::RemoteUnavailable(format!("{what}: {err}")))
    }
}

impl FlywheelClient for FlywheelHttpClient {
    fn get_analysis(&self, id: &str) -> Result<Analysis, GearError> {
        self.get_json(self.endpoint(&["analyses", id]), &format!("analysis {id}"))
    }

    fn get_session(&self, id: &str) -> Result<Session, GearError> {
        self.get_json(self.endpoint(&["sessions", id]), &format!("session {id}"))
    }

    fn list_session_acquisitions(
        &self,
        session_id: &str,
    ) -> Result<Vec<AcquisitionRef>, GearError> {
        self.get_json(
            self.endpoint(&["sessions", session_id, "acquisitions"]),
            &format!("acquisitions of session {session_id}"),
        )
    }

    fn get_acquisition(&self, id: &str) -> Result<Acquisition, GearError> {
        self.get_json(
            self.endpoint(&["acquisitions", id]),
            &format!("acquisition {id}"),
        )
    }

    fn download_file(
        &self,
        acquisition_id: &str,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), GearError> {
        let url = self.endpoint(&["acquisitions", acquisition_id, "files", file_name]);
        debug!(%url, destination = %destination.display(), "download");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GearError::RemoteUnavailable(err.to_string()))?;
        let mut response = Self::handle_status(
            response,
            &format!("file {file_name} in acquisition {acquisition_id}"),
        )?;
        let mut file = File::create(destination)
            .map_err(|err| GearError::Filesystem(format!("{}: {err}", destination.display())))?;
        copy_stream(&mut response, &mut file, file_name)?;
        Ok(())
    }
}

/// Whether the environment asks for the server version check.
pub fn version_check_enabled() -> bool {
    version_check_requested(std::env::var_os(SKIP_VERSION_CHECK_ENV).as_deref())
}

/// An unset or empty skip flag leaves the check on.
pub fn version_check_requested(skip_flag: Option<&OsStr>) -> bool {
    skip_flag.map(|value| value.is_empty()).unwrap_or(true)
}

/// Streams a download to disk, keeping remote read failures apart from
/// local write failures.
pub fn copy_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    file_name: &str,
) -> Result<u64, GearError> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(GearError::RemoteUnavailable(format!("{file_name}: {err}")));
            }
        };
        writer
            .write_all(&buf[..read])
            .map_err(|err| GearError::Filesystem(format!("{file_name}: {err}")))?;
        written += read as u64;
    }
    writer
        .flush()
        .map_err(|err| GearError::Filesystem(format!("{file_name}: {err}")))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use assert_matches::assert_matches;

    use super::*;

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::StorageFull, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct DroppedConnection;

    impl Read for DroppedConnection {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::ConnectionReset, "connection reset"))
        }
    }

    #[test]
    fn version_check_follows_skip_flag() {
        assert!(version_check_requested(None));
        assert!(version_check_requested(Some(OsStr::new(""))));
        assert!(!version_check_requested(Some(OsStr::new("1"))));
    }

    #[test]
    fn copy_stream_writes_everything() {
        let data = vec![7u8; 200 * 1024];
        let mut out = Vec::new();
        let written = copy_stream(&mut Cursor::new(data.clone()), &mut out, "run1.nii.gz").unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn local_write_failure_is_filesystem_error() {
        let err = copy_stream(&mut Cursor::new(b"nifti".to_vec()), &mut FullDisk, "run1.nii.gz")
            .unwrap_err();
        assert_matches!(err, GearError::Filesystem(_));
    }

    #[test]
    fn read_failure_is_remote_error() {
        let mut out = Vec::new();
        let err = copy_stream(&mut DroppedConnection, &mut out, "run1.nii.gz").unwrap_err();
        assert_matches!(err, GearError::RemoteUnavailable(_));
    }

    fn client() -> FlywheelHttpClient {
        let key: ApiKey = "fw.example.org:s3cr3t".parse().unwrap();
        FlywheelHttpClient::with_base_url(&key, &key.base_url()).unwrap()
    }

    #[test]
    fn endpoint_joins_segments_under_api() {
        let client = client();
        assert_eq!(
            client.endpoint(&["sessions", "abc", "acquisitions"]).as_str(),
            "https://fw.example.org/api/sessions/abc/acquisitions"
        );
    }

    #[test]
    fn endpoint_encodes_file_names() {
        let client = client();
        let url = client.endpoint(&["acquisitions", "a1", "files", "run 1#b.par"]);
        assert_eq!(
            url.as_str(),
            "https://fw.example.org/api/acquisitions/a1/files/run%201%23b.par"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let key: ApiKey = "fw.example.org:s3cr3t".parse().unwrap();
        let client = FlywheelHttpClient::with_base_url(&key, "http://127.0.0.1:8080/api/").unwrap();
        assert_eq!(
            client.endpoint(&["version"]).as_str(),
            "http://127.0.0.1:8080/api/version"
        );
    }
}
