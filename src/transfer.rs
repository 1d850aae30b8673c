use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{DispatchMode, FileKind};
use crate::error::KiraError;
use crate::fs_util;
use crate::plan::DownloadPlan;

pub const DEFAULT_TRANSFER_CLIENT: &str = "rsync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Failed { code: Option<i32>, message: String },
}

pub trait TransferClient: Send + Sync {
    /// Program name written into emitted scripts.
    fn program(&self) -> &str;
    fn transfer(&self, url: &str, destination: &Path) -> TransferOutcome;
}

#[derive(Clone)]
pub struct RsyncTransferClient {
    program: String,
    executable: PathBuf,
}

impl RsyncTransferClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_program(DEFAULT_TRANSFER_CLIENT)
    }

    pub fn with_program(program: &str) -> Result<Self, KiraError> {
        let executable =
            fs_util::find_in_path(program).ok_or_else(|| KiraError::MissingTool(program.to_string()))?;
        Ok(Self {
            program: program.to_string(),
            executable,
        })
    }

    /// A client for writing scripts only; the program is not required on this host.
    pub fn script_only(program: &str) -> Self {
        Self {
            program: program.to_string(),
            executable: PathBuf::from(program),
        }
    }
}

impl TransferClient for RsyncTransferClient {
    fn program(&self) -> &str {
        &self.program
    }

    fn transfer(&self, url: &str, destination: &Path) -> TransferOutcome {
        let output = Command::new(&self.executable)
            .arg("-q")
            .arg(url)
            .arg(destination)
            .output();
        match output {
            Ok(output) if output.status.success() => TransferOutcome::Completed,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("{} exited with {}", self.program, output.status)
                } else {
                    stderr
                };
                TransferOutcome::Failed {
                    code: output.status.code(),
                    message,
                }
            }
            Err(err) => TransferOutcome::Failed {
                code: None,
                message: format!("failed to start {}: {err}", self.program),
            },
        }
    }
}

/// Shared flag checked between transfer invocations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferFailure {
    pub kind: FileKind,
    pub url: String,
    pub code: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub mode: String,
    pub total: usize,
    pub completed: usize,
    pub failures: Vec<TransferFailure>,
    pub cancelled: bool,
    pub scripts: Vec<String>,
}

impl DispatchReport {
    fn new(mode: &DispatchMode, total: usize) -> Self {
        Self {
            mode: mode.label().to_string(),
            total,
            completed: 0,
            failures: Vec::new(),
            cancelled: false,
            scripts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Converts collected failures into a single error for the caller to surface.
    pub fn into_result(self) -> Result<Self, KiraError> {
        if self.cancelled {
            return Err(KiraError::Cancelled);
        }
        if !self.failures.is_empty() {
            return Err(KiraError::TransferFailed {
                failed: self.failures.len(),
                total: self.total,
            });
        }
        Ok(self)
    }
}

pub struct TransferDispatcher<'a, T: TransferClient> {
    client: &'a T,
    cancel: CancellationToken,
}

impl<'a, T: TransferClient> TransferDispatcher<'a, T> {
    pub fn new(client: &'a T) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creates `fna/` and `gff/` under the destination, which must already be a directory.
    pub fn prepare_destination(destination: &Path) -> Result<(PathBuf, PathBuf), KiraError> {
        fs_util::require_dir(destination)?;
        let fna = destination.join(FileKind::Fna.subdir());
        let gff = destination.join(FileKind::Gff.subdir());
        for dir in [&fna, &gff] {
            fs::create_dir_all(dir).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        Ok((fna, gff))
    }

    pub fn dispatch(
        &self,
        plan: &DownloadPlan,
        destination: &Path,
        mode: &DispatchMode,
        sink: &dyn ProgressSink,
    ) -> Result<DispatchReport, KiraError> {
        let (fna_dir, gff_dir) = Self::prepare_destination(destination)?;
        match mode {
            DispatchMode::EmitScript { script_dir } => {
                fs_util::require_dir(script_dir)?;
                let mut report = DispatchReport::new(mode, plan.len() * 2);
                for (kind, dir) in [(FileKind::Fna, &fna_dir), (FileKind::Gff, &gff_dir)] {
                    let path = script_dir.join(kind.script_name());
                    let body = render_script(self.client.program(), plan.links(kind), dir);
                    fs_util::write_atomic(&path, body.as_bytes())?;
                    fs_util::mark_executable(&path)?;
                    info!(script = %path.display(), lines = plan.links(kind).len(), "wrote transfer script");
                    report.scripts.push(path.display().to_string());
                }
                Ok(report)
            }
            DispatchMode::Execute => {
                let mut report = DispatchReport::new(mode, plan.len() * 2);
                for (kind, dir) in [(FileKind::Fna, &fna_dir), (FileKind::Gff, &gff_dir)] {
                    if !self.run_batch(kind, plan.links(kind), dir, &mut report, sink) {
                        break;
                    }
                }
                info!(
                    completed = report.completed,
                    failed = report.failures.len(),
                    total = report.total,
                    "download finished"
                );
                Ok(report)
            }
        }
    }

    /// Runs one file kind; returns false when cancellation stopped the batch.
    fn run_batch(
        &self,
        kind: FileKind,
        links: &[String],
        dir: &Path,
        report: &mut DispatchReport,
        sink: &dyn ProgressSink,
    ) -> bool {
        let total = links.len();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; downloading {kind} files"),
            elapsed: None,
            position: None,
        });
        for (i, url) in links.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(kind = %kind, remaining = total - i, "transfer cancelled");
                report.cancelled = true;
                return false;
            }
            let start = Instant::now();
            let outcome = self.client.transfer(url, dir);
            sink.event(ProgressEvent {
                message: format!("{kind} {url}"),
                elapsed: Some(start.elapsed()),
                position: Some((i + 1, total)),
            });
            match outcome {
                TransferOutcome::Completed => report.completed += 1,
                TransferOutcome::Failed { code, message } => {
                    warn!(url = %url, code = ?code, "transfer failed: {message}");
                    report.failures.push(TransferFailure {
                        kind,
                        url: url.clone(),
                        code,
                        message,
                    });
                }
            }
        }
        true
    }
}

pub fn render_script(program: &str, links: &[String], destination: &Path) -> String {
    let program = shell_quote(program);
    let destination = shell_quote(&destination.display().to_string());
    let mut out = String::new();
    for link in links {
        out.push_str(&format!("{program} -q {} {destination}\n", shell_quote(link)));
    }
    out
}

/// Single-quotes `value` for a POSIX shell unless it only holds characters
/// that never need quoting.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:=+,@%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}
