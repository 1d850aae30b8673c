use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use kira_reference_genomes::app::{App, SearchRequest};
use kira_reference_genomes::domain::{DispatchMode, PlanPolicy, ReferenceKind};
use kira_reference_genomes::error::KiraError;
use kira_reference_genomes::output::JsonOutput;
use kira_reference_genomes::plan::MANIFEST_HEADER;
use kira_reference_genomes::report::ReportFetcher;
use kira_reference_genomes::search::SearchOptions;
use kira_reference_genomes::transfer::{CancellationToken, TransferClient, TransferOutcome};

fn row(organism: &str, strain: &str, level: &str, url: &str) -> String {
    let mut fields = vec!["na"; 22];
    fields[7] = organism;
    fields[8] = strain;
    fields[13] = level;
    fields[19] = url;
    fields.join("\t")
}

fn report_body() -> String {
    [
        "# comment".to_string(),
        "#assembly_accession\tetc".to_string(),
        row("Escherichia coli", "strain=K-12", "Full", "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/005/845/GCF_000005845.2_ASM584v2"),
        row("Escherichia coli", "strain=O157:H7", "Full", "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/008/865/GCF_000008865.2_ASM886v2"),
        row("Bacillus subtilis", "strain=168", "Partial", "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/009/045/GCF_000009045.1_ASM904v1"),
    ]
    .join("\n")
        + "\n"
}

struct FixtureFetcher {
    body: String,
    calls: Mutex<usize>,
}

impl ReportFetcher for FixtureFetcher {
    fn fetch(&self, remote_path: &str, destination_dir: &Path) -> Result<(), KiraError> {
        *self.calls.lock().unwrap() += 1;
        let name = remote_path.rsplit('/').next().unwrap();
        std::fs::write(destination_dir.join(name), &self.body).unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct CountingClient {
    urls: Mutex<Vec<String>>,
}

impl TransferClient for CountingClient {
    fn program(&self) -> &str {
        "rsync"
    }

    fn transfer(&self, url: &str, _destination: &Path) -> TransferOutcome {
        self.urls.lock().unwrap().push(url.to_string());
        TransferOutcome::Completed
    }
}

fn app(dir: &Path) -> App<FixtureFetcher, CountingClient> {
    App::new(
        dir,
        FixtureFetcher {
            body: report_body(),
            calls: Mutex::new(0),
        },
        CountingClient::default(),
    )
}

fn request(queries: &[&str]) -> SearchRequest {
    SearchRequest {
        reference: ReferenceKind::RefSeq,
        queries: queries.iter().map(|query| query.to_string()).collect(),
        options: SearchOptions::default(),
    }
}

#[test]
fn search_fetches_missing_report_and_matches() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path());

    let first = app
        .search(&request(&["Escherichia coli", "Bacillus subtilis"]), &JsonOutput)
        .unwrap();
    let second = app.search(&request(&["escherichia coli"]), &JsonOutput).unwrap();

    assert_eq!(first.outcome.stats.found, 1);
    assert_eq!(first.outcome.stats.strain_hits, 2);
    assert!(first.outcome.unfound.contains("bacillus subtilis"));
    assert_eq!(second.outcome.results.total_hits(), 2);
    assert!(temp.path().join("assembly_summary_refseq.txt").is_file());
}

#[test]
fn empty_query_list_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let err = app(temp.path())
        .search(&request(&["  "]), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, KiraError::EmptyQuery);
}

#[test]
fn manifest_rows_match_strain_hits() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path());
    let result = app
        .search(&request(&["Escherichia coli"]), &JsonOutput)
        .unwrap();

    let manifest = app.save_manifest(&result, temp.path()).unwrap();

    assert_eq!(manifest.rows, result.outcome.stats.strain_hits);
    let tsv = std::fs::read_to_string(&manifest.manifest_path).unwrap();
    assert!(tsv.starts_with(MANIFEST_HEADER));
    assert!(tsv.contains(
        "escherichia coli\tk-12\tGCF_000005845.2_ASM584v2\trsync://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/005/845/GCF_000005845.2_ASM584v2"
    ));

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest.metadata_path).unwrap()).unwrap();
    assert_eq!(meta["reference"], "refseq");
    assert_eq!(meta["strain_hits"], 2);
    assert_eq!(meta["full_genome"], true);
}

#[test]
fn download_collapse_issues_one_pair_per_species() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path());
    let result = app
        .search(&request(&["Escherichia coli"]), &JsonOutput)
        .unwrap();

    let download = app
        .download(
            &result,
            PlanPolicy::Collapse,
            temp.path(),
            &DispatchMode::Execute,
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(download.plan.len(), 1);
    assert_eq!(download.dispatch.completed, 2);
    assert!(download.plan.sequence[0].contains("GCF_000008865.2_ASM886v2_genomic.fna.gz"));
}

#[test]
fn download_fan_out_issues_pair_per_strain() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path());
    let result = app
        .search(&request(&["Escherichia coli"]), &JsonOutput)
        .unwrap();

    let download = app
        .download(
            &result,
            PlanPolicy::FanOut,
            temp.path(),
            &DispatchMode::Execute,
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(download.plan.len(), 2);
    assert_eq!(download.dispatch.total, 4);
    assert!(download.dispatch.is_success());
}

#[test]
fn failed_sidecar_leaves_no_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path());
    let result = app
        .search(&request(&["Escherichia coli"]), &JsonOutput)
        .unwrap();
    let out = temp.path().join("out");
    std::fs::create_dir_all(out.join("query_results.json")).unwrap();

    let err = app.save_manifest(&result, &out).unwrap_err();

    assert_matches!(err, KiraError::Filesystem(_));
    assert!(!out.join("query_results.tsv").exists());
}

#[test]
fn cancelled_app_stops_before_first_transfer() {
    let temp = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let app = app(temp.path()).with_cancellation(token.clone());
    let result = app
        .search(&request(&["Escherichia coli"]), &JsonOutput)
        .unwrap();
    token.cancel();

    let download = app
        .download(
            &result,
            PlanPolicy::FanOut,
            temp.path(),
            &DispatchMode::Execute,
            &JsonOutput,
        )
        .unwrap();

    assert!(download.dispatch.cancelled);
    assert_eq!(download.dispatch.completed, 0);
    assert_matches!(download.dispatch.into_result(), Err(KiraError::Cancelled));
}
