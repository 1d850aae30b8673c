use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const ASSEMBLY_REPORTS_DIR: &str = "genomes/ASSEMBLY_REPORTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    RefSeq,
    GenBank,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::RefSeq => "refseq",
            ReferenceKind::GenBank => "genbank",
        }
    }

    pub fn report_file_name(&self) -> String {
        format!("assembly_summary_{}.txt", self.as_str())
    }

    /// Path of the summary report relative to the upstream host root.
    pub fn remote_path(&self) -> String {
        format!("{ASSEMBLY_REPORTS_DIR}/{}", self.report_file_name())
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::RefSeq => write!(f, "RefSeq"),
            ReferenceKind::GenBank => write!(f, "GenBank"),
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "refseq" => Ok(ReferenceKind::RefSeq),
            "genbank" | "genebank" => Ok(ReferenceKind::GenBank),
            _ => Err(KiraError::InvalidReferenceKind(value.to_string())),
        }
    }
}

/// How a species with several matched assemblies is turned into download targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlanPolicy {
    /// One sequence/annotation pair for every matched assembly.
    #[default]
    FanOut,
    /// One pair per key: the first entry without a strain value, otherwise the last entry.
    Collapse,
}

impl fmt::Display for PlanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanPolicy::FanOut => write!(f, "fan-out"),
            PlanPolicy::Collapse => write!(f, "collapse"),
        }
    }
}

impl FromStr for PlanPolicy {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "fan-out" | "fanout" | "per-strain" => Ok(PlanPolicy::FanOut),
            "collapse" | "per-species" => Ok(PlanPolicy::Collapse),
            _ => Err(KiraError::InvalidPolicy(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    Execute,
    EmitScript { script_dir: PathBuf },
}

impl DispatchMode {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchMode::Execute => "execute",
            DispatchMode::EmitScript { .. } => "script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Fna,
    Gff,
}

impl FileKind {
    pub fn subdir(&self) -> &'static str {
        match self {
            FileKind::Fna => "fna",
            FileKind::Gff => "gff",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            FileKind::Fna => "_genomic.fna.gz",
            FileKind::Gff => "_genomic.gff.gz",
        }
    }

    pub fn script_name(&self) -> &'static str {
        match self {
            FileKind::Fna => "download_fna.sh",
            FileKind::Gff => "download_gff.sh",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subdir())
    }
}

pub fn normalize_query(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Extracts the strain value from an infraspecific descriptor such as `strain=K-12`.
///
/// The descriptor is lower-cased first. When it mentions "strain" the text after
/// the first `=` is taken verbatim, so `strain=a=b` yields `a=b` and `strain=`
/// yields an empty strain. A descriptor mentioning "strain" without any `=` keeps
/// its raw text, as does anything else (`cultivar=x`, `isolate=y`, empty).
pub fn parse_strain(descriptor: &str) -> String {
    let lowered = descriptor.to_lowercase();
    if !lowered.contains("strain") {
        return lowered;
    }
    match lowered.split_once('=') {
        Some((_, value)) => value.to_string(),
        None => lowered,
    }
}

pub fn match_key(species: &str, strain: &str, strain_specific: bool) -> String {
    if strain_specific && !strain.is_empty() {
        format!("{species} {strain}")
    } else {
        species.to_string()
    }
}
