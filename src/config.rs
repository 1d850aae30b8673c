use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{PlanPolicy, ReferenceKind};
use crate::error::KiraError;
use crate::report::ReportTransport;
use crate::search::SearchOptions;
use crate::transfer::DEFAULT_TRANSFER_CLIENT;

pub const CONFIG_FILE: &str = "kira-rg.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub queries: Vec<QueryEntry>,
    #[serde(default)]
    pub full_genome: Option<bool>,
    #[serde(default)]
    pub strain_specific: Option<bool>,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub report_dir: Option<String>,
    #[serde(default)]
    pub report_transport: Option<ReportTransport>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub script_dir: Option<String>,
    #[serde(default)]
    pub transfer_client: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum QueryEntry {
    Shorthand(String),
    Detailed(QueryEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueryEntryObject {
    pub species: String,
    #[serde(default)]
    pub strain: Option<String>,
}

impl QueryEntry {
    pub fn to_query(&self) -> String {
        match self {
            QueryEntry::Shorthand(value) => value.clone(),
            QueryEntry::Detailed(obj) => match obj.strain.as_deref().map(str::trim) {
                Some(strain) if !strain.is_empty() => format!("{} {}", obj.species.trim(), strain),
                _ => obj.species.clone(),
            },
        }
    }
}

/// Fully defaulted settings. The report directory is carried explicitly so the
/// search never depends on the process working directory.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub reference: ReferenceKind,
    pub queries: Vec<String>,
    pub search: SearchOptions,
    pub policy: PlanPolicy,
    pub report_dir: Utf8PathBuf,
    pub report_transport: ReportTransport,
    pub output_dir: Utf8PathBuf,
    pub script_dir: Option<Utf8PathBuf>,
    pub transfer_client: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            reference: ReferenceKind::RefSeq,
            queries: Vec::new(),
            search: SearchOptions::default(),
            policy: PlanPolicy::default(),
            report_dir: Utf8PathBuf::from("."),
            report_transport: ReportTransport::default(),
            output_dir: Utf8PathBuf::from("."),
            script_dir: None,
            transfer_client: DEFAULT_TRANSFER_CLIENT.to_string(),
        }
    }
}

impl ResolvedConfig {
    pub fn report_path(&self) -> Utf8PathBuf {
        self.report_dir.join(self.reference.report_file_name())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], but a missing default config file yields defaults.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        match Self::resolve(path) {
            Err(KiraError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let defaults = ResolvedConfig::default();
        let reference = config
            .reference
            .as_deref()
            .map(str::parse::<ReferenceKind>)
            .transpose()?
            .unwrap_or(defaults.reference);
        let policy = config
            .policy
            .as_deref()
            .map(str::parse::<PlanPolicy>)
            .transpose()?
            .unwrap_or(defaults.policy);

        let queries = config
            .queries
            .iter()
            .map(QueryEntry::to_query)
            .filter(|query| !query.trim().is_empty())
            .collect();

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            reference,
            queries,
            search: SearchOptions {
                require_full_genome: config
                    .full_genome
                    .unwrap_or(defaults.search.require_full_genome),
                strain_specific: config
                    .strain_specific
                    .unwrap_or(defaults.search.strain_specific),
            },
            policy,
            report_dir: config
                .report_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.report_dir),
            report_transport: config.report_transport.unwrap_or(defaults.report_transport),
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_dir),
            script_dir: config.script_dir.map(Utf8PathBuf::from),
            transfer_client: config
                .transfer_client
                .filter(|client| !client.trim().is_empty())
                .unwrap_or(defaults.transfer_client),
        })
    }

    /// Reads one species per line; blank lines and `#` comments are skipped.
    pub fn load_query_file(path: &Path) -> Result<Vec<String>, KiraError> {
        let content =
            fs::read_to_string(path).map_err(|_| KiraError::ConfigRead(path.to_path_buf()))?;
        Ok(parse_query_lines(&content))
    }
}

pub fn parse_query_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
