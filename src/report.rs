use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use clap::ValueEnum;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::ReferenceKind;
use crate::error::KiraError;
use crate::fs_util;

pub const NCBI_HOST: &str = "ftp.ncbi.nlm.nih.gov";

/// Retrieves a file under the upstream host into a local directory.
pub trait ReportFetcher: Send + Sync {
    fn fetch(&self, remote_path: &str, destination_dir: &Path) -> Result<(), KiraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportTransport {
    #[default]
    Rsync,
    Https,
}

impl<F: ReportFetcher + ?Sized> ReportFetcher for Box<F> {
    fn fetch(&self, remote_path: &str, destination_dir: &Path) -> Result<(), KiraError> {
        (**self).fetch(remote_path, destination_dir)
    }
}

pub fn fetcher_for(transport: ReportTransport) -> Result<Box<dyn ReportFetcher>, KiraError> {
    Ok(match transport {
        ReportTransport::Rsync => Box::new(RsyncReportFetcher::new()),
        ReportTransport::Https => Box::new(HttpReportFetcher::new()?),
    })
}

#[derive(Clone)]
pub struct RsyncReportFetcher {
    host: String,
    program: Option<PathBuf>,
}

impl RsyncReportFetcher {
    pub fn new() -> Self {
        Self {
            host: NCBI_HOST.to_string(),
            program: fs_util::find_in_path("rsync"),
        }
    }

    pub fn source_url(&self, remote_path: &str) -> String {
        format!("rsync://{}/{}", self.host, remote_path)
    }
}

impl Default for RsyncReportFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFetcher for RsyncReportFetcher {
    fn fetch(&self, remote_path: &str, destination_dir: &Path) -> Result<(), KiraError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| KiraError::MissingTool("rsync".to_string()))?;
        let mut target = destination_dir.as_os_str().to_os_string();
        target.push("/");
        let output = Command::new(program)
            .args(["-t", "-v"])
            .arg(self.source_url(remote_path))
            .arg(&target)
            .output()
            .map_err(|err| unavailable(destination_dir, remote_path, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("rsync exited with {}", output.status)
        } else {
            stderr
        };
        Err(unavailable(destination_dir, remote_path, reason))
    }
}

#[derive(Clone)]
pub struct HttpReportFetcher {
    client: Client,
    base_url: String,
}

impl HttpReportFetcher {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-rg/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::ReportHttp(err.to_string()))?,
        );
        // The body of the GenBank report can take longer than any fixed deadline.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| KiraError::ReportHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("https://{NCBI_HOST}"),
        })
    }
}

impl ReportFetcher for HttpReportFetcher {
    fn fetch(&self, remote_path: &str, destination_dir: &Path) -> Result<(), KiraError> {
        let url = format!("{}/{}", self.base_url, remote_path);
        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| KiraError::ReportHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "report request failed".to_string());
            return Err(KiraError::ReportStatus { status, message });
        }
        let dest = destination_dir.join(file_name(remote_path));
        let written = fs_util::write_atomic_from_reader(&dest, &mut response)?;
        info!(url = %url, bytes = written, "report downloaded");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsuredReport {
    pub reference: ReferenceKind,
    pub path: PathBuf,
    pub fetched: bool,
}

pub struct ReportStore<F: ReportFetcher> {
    dir: PathBuf,
    fetcher: F,
}

impl<F: ReportFetcher> ReportStore<F> {
    pub fn new(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn report_path(&self, kind: ReferenceKind) -> PathBuf {
        self.dir.join(kind.report_file_name())
    }

    /// Returns the local report path, fetching the report first when it is absent.
    /// An existing file is used as-is regardless of age.
    pub fn ensure(&self, kind: ReferenceKind) -> Result<EnsuredReport, KiraError> {
        let path = self.report_path(kind);
        if path.is_file() {
            return Ok(EnsuredReport {
                reference: kind,
                path,
                fetched: false,
            });
        }

        info!("No assembly summary report; downloading the {kind} report");
        fs_util::require_dir(&self.dir).map_err(|_| KiraError::ReportUnavailable {
            path: path.clone(),
            reason: format!("report directory {} is not a directory", self.dir.display()),
        })?;
        self.fetcher.fetch(&kind.remote_path(), &self.dir)?;

        let path = self.report_path(kind);
        if !path.is_file() {
            return Err(KiraError::ReportUnavailable {
                path,
                reason: "fetch completed but the report file is missing".to_string(),
            });
        }
        Ok(EnsuredReport {
            reference: kind,
            path,
            fetched: true,
        })
    }

    /// Parses the reference kind from free text before ensuring the report.
    pub fn ensure_named(&self, reference: &str) -> Result<EnsuredReport, KiraError> {
        self.ensure(reference.parse::<ReferenceKind>()?)
    }
}

fn file_name(remote_path: &str) -> &str {
    remote_path.rsplit('/').next().unwrap_or(remote_path)
}

fn unavailable(destination_dir: &Path, remote_path: &str, reason: String) -> KiraError {
    KiraError::ReportUnavailable {
        path: destination_dir.join(file_name(remote_path)),
        reason,
    }
}
