use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::domain::{FileKind, PlanPolicy};
use crate::error::KiraError;
use crate::fs_util;
use crate::search::{ResultSet, StrainHit};

pub const MANIFEST_FILE: &str = "query_results.tsv";
pub const MANIFEST_HEADER: &str = "Species\tStrain\tFolder\tLink";
pub const TRANSFER_SCHEME: &str = "rsync://";

static WEB_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?|ftp)://").expect("scheme pattern"));

/// Rewrites a web-style directory URL to the rsync scheme. URLs with any other
/// scheme are returned unchanged.
pub fn to_transfer_url(url: &str) -> String {
    WEB_SCHEME.replace(url.trim(), TRANSFER_SCHEME).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenomeLinks {
    pub directory: String,
    pub folder: String,
    pub sequence: String,
    pub annotation: String,
}

impl GenomeLinks {
    pub fn from_url(url: &str) -> Self {
        let converted = to_transfer_url(url);
        if !converted.starts_with(TRANSFER_SCHEME) {
            warn!(url = %url, "assembly directory has no web or rsync scheme");
        }
        let directory = converted.trim_end_matches('/').to_string();
        let folder = directory
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let sequence = format!("{directory}/{folder}{}", FileKind::Fna.suffix());
        let annotation = format!("{directory}/{folder}{}", FileKind::Gff.suffix());
        Self {
            directory,
            folder,
            sequence,
            annotation,
        }
    }

    pub fn link(&self, kind: FileKind) -> &str {
        match kind {
            FileKind::Fna => &self.sequence,
            FileKind::Gff => &self.annotation,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadPlan {
    pub sequence: Vec<String>,
    pub annotation: Vec<String>,
}

impl DownloadPlan {
    pub fn links(&self, kind: FileKind) -> &[String] {
        match kind {
            FileKind::Fna => &self.sequence,
            FileKind::Gff => &self.annotation,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    fn push(&mut self, links: &GenomeLinks) {
        self.sequence.push(links.sequence.clone());
        self.annotation.push(links.annotation.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestRow {
    pub species: String,
    pub strain: String,
    pub folder: String,
    pub link: String,
}

impl ManifestRow {
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.species, self.strain, self.folder, self.link
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder {
    policy: PlanPolicy,
}

impl PlanBuilder {
    pub fn new(policy: PlanPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PlanPolicy {
        self.policy
    }

    pub fn build_plan(&self, results: &ResultSet) -> DownloadPlan {
        let mut plan = DownloadPlan::default();
        for entry in results.iter() {
            match self.policy {
                PlanPolicy::FanOut => {
                    for hit in &entry.hits {
                        plan.push(&GenomeLinks::from_url(&hit.url));
                    }
                }
                PlanPolicy::Collapse => {
                    if let Some(hit) = collapse_hits(&entry.hits) {
                        plan.push(&GenomeLinks::from_url(&hit.url));
                    }
                }
            }
        }
        plan
    }

    pub fn build_manifest(results: &ResultSet) -> Vec<ManifestRow> {
        results
            .iter()
            .flat_map(|entry| {
                entry.hits.iter().map(|hit| {
                    let links = GenomeLinks::from_url(&hit.url);
                    ManifestRow {
                        species: entry.key.clone(),
                        strain: hit.strain.clone(),
                        folder: links.folder,
                        link: links.directory,
                    }
                })
            })
            .collect()
    }
}

/// Picks the single entry kept for a key: scanning in report order, the first
/// entry without a strain value stops the scan, otherwise the last entry wins.
pub fn collapse_hits(hits: &[StrainHit]) -> Option<&StrainHit> {
    hits.iter()
        .find(|hit| hit.strain.is_empty())
        .or_else(|| hits.last())
}

pub fn render_manifest(rows: &[ManifestRow]) -> String {
    let mut out = String::from(MANIFEST_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_tsv());
        out.push('\n');
    }
    out
}

pub fn write_manifest(rows: &[ManifestRow], output_dir: &Path) -> Result<PathBuf, KiraError> {
    fs_util::require_dir(output_dir)?;
    let path = output_dir.join(MANIFEST_FILE);
    fs_util::write_atomic(&path, render_manifest(rows).as_bytes())?;
    Ok(path)
}
