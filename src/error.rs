use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid reference database: {0} (expected RefSeq or GenBank)")]
    InvalidReferenceKind(String),

    #[error("invalid download policy: {0} (expected fan-out or collapse)")]
    InvalidPolicy(String),

    #[error("no species queries supplied")]
    EmptyQuery,

    #[error("assembly summary report unavailable at {path}: {reason}")]
    #[diagnostic(help("run `kira-rg report` to fetch it, or pass --report-dir"))]
    ReportUnavailable { path: PathBuf, reason: String },

    #[error(
        "malformed assembly summary record at line {line}: found {fields} fields, expected at least {expected}"
    )]
    MalformedRecord {
        line: usize,
        fields: usize,
        expected: usize,
    },

    #[error("assembly summary record at line {line} is not valid UTF-8")]
    InvalidEncoding { line: usize },

    #[error("destination is not a directory: {0}")]
    DestinationInvalid(PathBuf),

    #[error("{failed} of {total} transfers failed")]
    TransferFailed { failed: usize, total: usize },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("report request failed: {0}")]
    ReportHttp(String),

    #[error("report server returned status {status}: {message}")]
    ReportStatus { status: u16, message: String },

    #[error("missing config file kira-rg.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),
}
