use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DownloadResult, ManifestResult, ProgressEvent, ProgressSink, SearchResult};
use crate::report::EnsuredReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &EnsuredReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_search(result: &SearchResult, manifest: Option<&ManifestResult>) -> io::Result<()> {
        #[derive(Serialize)]
        struct Payload<'a> {
            #[serde(flatten)]
            search: &'a SearchResult,
            manifest: Option<&'a ManifestResult>,
        }
        Self::print_json(&Payload {
            search: result,
            manifest,
        })
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Line-oriented progress on stderr for interactive runs.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let mut line = match event.position {
            Some((current, total)) => format!("[{current}/{total}] {}", event.message),
            None => event.message,
        };
        if let Some(elapsed) = event.elapsed {
            line.push_str(&format!(" ({} ms)", elapsed.as_millis()));
        }
        eprintln!("{line}");
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn print_report_summary(result: &EnsuredReport) {
    let action = if result.fetched { "fetched" } else { "present" };
    println!(
        "{CYAN}{} assembly summary report ({action}): {}{RESET}",
        result.reference,
        result.path.display()
    );
}

pub fn print_search_summary(result: &SearchResult, manifest: Option<&ManifestResult>) {
    let stats = &result.outcome.stats;
    println!("{CYAN}Search results: {} / {}{RESET}", stats.found, stats.queries);
    println!("{GREEN}Number of strain: {}{RESET}", stats.strain_hits);
    println!("{YELLOW}Number of unfound species: {}{RESET}", stats.unfound);

    for entry in result.outcome.results.iter() {
        println!("{GREEN}{} ({} assemblies){RESET}", entry.key, entry.hits.len());
        for hit in &entry.hits {
            let strain = if hit.strain.is_empty() { "-" } else { hit.strain.as_str() };
            println!("   {strain}\t{}", hit.url);
        }
    }
    for query in &result.outcome.unfound {
        println!("{YELLOW}not found: {query}{RESET}");
    }
    if let Some(manifest) = manifest {
        println!(
            "{CYAN}Query results: {} ({} rows){RESET}",
            manifest.manifest_path, manifest.rows
        );
    }
}

pub fn print_download_summary(result: &DownloadResult) {
    let dispatch = &result.dispatch;
    println!(
        "{CYAN}Download plan: {} genomes ({}){RESET}",
        result.plan.len(),
        result.policy
    );
    for script in &dispatch.scripts {
        println!("{GREEN}script: {script}{RESET}");
    }
    if dispatch.mode == "execute" {
        println!(
            "{GREEN}Completed transfers: {} / {}{RESET}",
            dispatch.completed, dispatch.total
        );
        let color = if dispatch.failures.is_empty() { YELLOW } else { RED };
        println!("{color}Failed transfers: {}{RESET}", dispatch.failures.len());
        for failure in &dispatch.failures {
            println!("{RED}   {} {}: {}{RESET}", failure.kind, failure.url, failure.message);
        }
        if dispatch.cancelled {
            println!("{RED}Download cancelled{RESET}");
        }
    }
}
