use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{match_key, normalize_query, parse_strain};
use crate::error::KiraError;

/// Leading rows of the summary report that carry comments and column names.
pub const HEADER_LINES: usize = 2;

pub const ORGANISM_FIELD: usize = 7;
pub const STRAIN_FIELD: usize = 8;
pub const COMPLETENESS_FIELD: usize = 13;
pub const URL_FIELD: usize = 19;
pub const MIN_FIELDS: usize = URL_FIELD + 1;

pub const FULL_GENOME: &str = "Full";

/// One data row of the assembly summary report, borrowed from the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRecord<'a> {
    pub organism: &'a str,
    pub strain_descriptor: &'a str,
    pub completeness: &'a str,
    pub url: &'a str,
}

impl<'a> ReportRecord<'a> {
    pub fn parse(line: &'a str, line_number: usize) -> Result<Self, KiraError> {
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < MIN_FIELDS {
            return Err(KiraError::MalformedRecord {
                line: line_number,
                fields: fields.len(),
                expected: MIN_FIELDS,
            });
        }
        Ok(Self {
            organism: fields[ORGANISM_FIELD],
            strain_descriptor: fields[STRAIN_FIELD],
            completeness: fields[COMPLETENESS_FIELD],
            url: fields[URL_FIELD],
        })
    }

    pub fn is_full_genome(&self) -> bool {
        self.completeness == FULL_GENOME
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrainHit {
    pub strain: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMatches {
    pub key: String,
    pub hits: Vec<StrainHit>,
}

/// Matches grouped by key, keeping keys in first-seen order and hits in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    entries: Vec<KeyMatches>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hit under `key`, returning true when the key was seen for the first time.
    pub fn push(&mut self, key: &str, hit: StrainHit) -> bool {
        if let Some(&slot) = self.index.get(key) {
            self.entries[slot].hits.push(hit);
            return false;
        }
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push(KeyMatches {
            key: key.to_string(),
            hits: vec![hit],
        });
        true
    }

    pub fn get(&self, key: &str) -> Option<&[StrainHit]> {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].hits.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyMatches> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_hits(&self) -> usize {
        self.entries.iter().map(|entry| entry.hits.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchOptions {
    pub require_full_genome: bool,
    pub strain_specific: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            require_full_genome: true,
            strain_specific: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub queries: usize,
    pub found: usize,
    pub strain_hits: usize,
    pub unfound: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: ResultSet,
    pub unfound: BTreeSet<String>,
    pub stats: SearchStats,
}

pub struct MatchEngine {
    report_path: PathBuf,
}

impl MatchEngine {
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
        }
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn search<S: AsRef<str>>(
        &self,
        queries: &[S],
        options: SearchOptions,
    ) -> Result<SearchOutcome, KiraError> {
        let active = queries
            .iter()
            .map(|query| normalize_query(query.as_ref()))
            .filter(|query| !query.is_empty())
            .collect::<HashSet<_>>();

        let mut reader = self.open()?;
        let mut results = ResultSet::new();
        let mut stats = SearchStats {
            queries: queries.len(),
            ..SearchStats::default()
        };
        let mut buf = Vec::new();
        let mut line_number = 0usize;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|err| self.unavailable(err.to_string()))?;
            if read == 0 {
                break;
            }
            line_number += 1;
            if line_number <= HEADER_LINES {
                continue;
            }
            let row = std::str::from_utf8(&buf)
                .map_err(|_| KiraError::InvalidEncoding { line: line_number })?
                .trim_end_matches(['\n', '\r']);

            let record = ReportRecord::parse(row, line_number)?;
            if options.require_full_genome && !record.is_full_genome() {
                continue;
            }

            let species = record.organism.to_lowercase();
            let strain = parse_strain(record.strain_descriptor);
            let key = match_key(&species, &strain, options.strain_specific);
            if !active.contains(&key) {
                continue;
            }

            debug!(key = %key, strain = %strain, "matched assembly");
            let is_new = results.push(
                &key,
                StrainHit {
                    strain,
                    url: record.url.to_string(),
                },
            );
            if is_new {
                stats.found += 1;
            }
            stats.strain_hits += 1;
        }

        let unfound = active
            .into_iter()
            .filter(|query| !results.contains_key(query))
            .collect::<BTreeSet<_>>();
        stats.unfound = unfound.len();

        info!(
            "Search results: {} / {}; strains: {}; unfound species: {}",
            stats.found, stats.queries, stats.strain_hits, stats.unfound
        );

        Ok(SearchOutcome {
            results,
            unfound,
            stats,
        })
    }

    fn open(&self) -> Result<Box<dyn BufRead>, KiraError> {
        let file = File::open(&self.report_path).map_err(|err| self.unavailable(err.to_string()))?;
        let is_gzip = self
            .report_path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        if is_gzip {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    fn unavailable(&self, reason: String) -> KiraError {
        KiraError::ReportUnavailable {
            path: self.report_path.clone(),
            reason,
        }
    }
}
