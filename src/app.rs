use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{DispatchMode, PlanPolicy, ReferenceKind, normalize_query};
use crate::error::KiraError;
use crate::fs_util;
use crate::plan::{DownloadPlan, PlanBuilder, write_manifest};
use crate::report::{EnsuredReport, ReportFetcher, ReportStore};
use crate::search::{MatchEngine, SearchOptions, SearchOutcome};
use crate::transfer::{CancellationToken, DispatchReport, TransferClient, TransferDispatcher};

pub const MANIFEST_METADATA_FILE: &str = "query_results.json";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub position: Option<(usize, usize)>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub reference: ReferenceKind,
    pub queries: Vec<String>,
    pub options: SearchOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub reference: ReferenceKind,
    pub report_path: String,
    pub options: SearchOptions,
    pub queries: Vec<String>,
    #[serde(flatten)]
    pub outcome: SearchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestResult {
    pub manifest_path: String,
    pub metadata_path: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestMetadata {
    pub tool: String,
    pub generated_at: String,
    pub reference: ReferenceKind,
    pub report_path: String,
    pub full_genome: bool,
    pub strain_specific: bool,
    pub queries: Vec<String>,
    pub found: usize,
    pub strain_hits: usize,
    pub unfound: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub policy: PlanPolicy,
    pub destination: String,
    pub plan: DownloadPlan,
    pub dispatch: DispatchReport,
}

pub struct App<F: ReportFetcher, T: TransferClient> {
    reports: ReportStore<F>,
    transfer: T,
    cancel: CancellationToken,
}

impl<F: ReportFetcher, T: TransferClient> App<F, T> {
    pub fn new(report_dir: impl Into<PathBuf>, fetcher: F, transfer: T) -> Self {
        Self {
            reports: ReportStore::new(report_dir, fetcher),
            transfer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ensure_report(
        &self,
        reference: ReferenceKind,
        sink: &dyn ProgressSink,
    ) -> Result<EnsuredReport, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {reference} assembly summary report"),
            elapsed: None,
            position: None,
        });
        let start = std::time::Instant::now();
        let report = self.reports.ensure(reference)?;
        if report.fetched {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; report saved to {}", report.path.display()),
                elapsed: Some(start.elapsed()),
                position: None,
            });
        }
        Ok(report)
    }

    pub fn search(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<SearchResult, KiraError> {
        if request.queries.iter().all(|query| query.trim().is_empty()) {
            return Err(KiraError::EmptyQuery);
        }
        let report = self.ensure_report(request.reference, sink)?;

        sink.event(ProgressEvent {
            message: format!("phase=Search; scanning {}", report.path.display()),
            elapsed: None,
            position: None,
        });
        let start = std::time::Instant::now();
        let engine = MatchEngine::new(&report.path);
        let outcome = engine.search(&request.queries, request.options)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Search; found {} / {}, strains {}, unfound {}",
                outcome.stats.found,
                outcome.stats.queries,
                outcome.stats.strain_hits,
                outcome.stats.unfound
            ),
            elapsed: Some(start.elapsed()),
            position: None,
        });

        Ok(SearchResult {
            reference: request.reference,
            report_path: report.path.display().to_string(),
            options: request.options,
            queries: request
                .queries
                .iter()
                .map(|query| normalize_query(query))
                .collect(),
            outcome,
        })
    }

    /// Writes `query_results.tsv` plus a JSON sidecar describing how it was produced.
    pub fn save_manifest(
        &self,
        result: &SearchResult,
        output_dir: &Path,
    ) -> Result<ManifestResult, KiraError> {
        let rows = PlanBuilder::build_manifest(&result.outcome.results);
        let metadata = ManifestMetadata {
            tool: format!("kira-rg/{}", env!("CARGO_PKG_VERSION")),
            generated_at: chrono::Utc::now().to_rfc3339(),
            reference: result.reference,
            report_path: result.report_path.clone(),
            full_genome: result.options.require_full_genome,
            strain_specific: result.options.strain_specific,
            queries: result.queries.clone(),
            found: result.outcome.stats.found,
            strain_hits: result.outcome.stats.strain_hits,
            unfound: result.outcome.unfound.iter().cloned().collect(),
        };
        let metadata_path = output_dir.join(MANIFEST_METADATA_FILE);
        let bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        let manifest_path = write_manifest(&rows, output_dir)?;
        if let Err(err) = fs_util::write_atomic(&metadata_path, &bytes) {
            // A manifest without its sidecar must not be left behind.
            if let Err(remove_err) = std::fs::remove_file(&manifest_path) {
                warn!(path = %manifest_path.display(), "failed to remove manifest: {remove_err}");
            }
            return Err(err);
        }

        info!(path = %manifest_path.display(), rows = rows.len(), "wrote query results");
        Ok(ManifestResult {
            manifest_path: manifest_path.display().to_string(),
            metadata_path: metadata_path.display().to_string(),
            rows: rows.len(),
        })
    }

    pub fn download(
        &self,
        result: &SearchResult,
        policy: PlanPolicy,
        destination: &Path,
        mode: &DispatchMode,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; building {policy} download plan"),
            elapsed: None,
            position: None,
        });
        let plan = PlanBuilder::new(policy).build_plan(&result.outcome.results);
        info!(policy = %policy, genomes = plan.len(), "download plan ready");

        let dispatcher =
            TransferDispatcher::new(&self.transfer).with_cancellation(self.cancel.clone());
        let dispatch = dispatcher.dispatch(&plan, destination, mode, sink)?;
        sink.event(ProgressEvent {
            message: "phase=Store; transfers finished".to_string(),
            elapsed: None,
            position: None,
        });

        Ok(DownloadResult {
            policy,
            destination: destination.display().to_string(),
            plan,
            dispatch,
        })
    }
}
