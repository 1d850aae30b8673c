use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_reference_genomes::app::{App, ProgressSink, SearchRequest, SearchResult};
use kira_reference_genomes::config::{ConfigLoader, ResolvedConfig};
use kira_reference_genomes::domain::{DispatchMode, PlanPolicy, ReferenceKind};
use kira_reference_genomes::error::KiraError;
use kira_reference_genomes::output::{self, ConsoleProgress, JsonOutput, OutputMode};
use kira_reference_genomes::report::{ReportFetcher, ReportTransport, fetcher_for};
use kira_reference_genomes::transfer::RsyncTransferClient;

#[derive(Parser)]
#[command(name = "kira-rg")]
#[command(about = "Find and download NCBI reference genomes by species or strain name")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Make sure the assembly summary report is available locally")]
    Report(SourceArgs),
    #[command(about = "Match species names against the assembly summary report")]
    Search(SearchArgs),
    #[command(about = "Search, then write query_results.tsv without downloading")]
    Manifest(ManifestArgs),
    #[command(about = "Search, then download genome sequences and annotations")]
    Download(DownloadArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long, help = "RefSeq or GenBank")]
    reference: Option<ReferenceKind>,

    #[arg(long)]
    report_dir: Option<String>,

    #[arg(long, value_enum)]
    transport: Option<ReportTransport>,
}

#[derive(Args, Clone)]
struct QueryArgs {
    queries: Vec<String>,

    #[arg(long, help = "File with one species name per line")]
    query_file: Option<PathBuf>,

    #[arg(long, help = "Accept assemblies that are not full genomes")]
    all_levels: bool,

    #[arg(long)]
    strain_specific: bool,
}

#[derive(Args, Clone)]
struct SearchArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    query: QueryArgs,

    #[arg(long, help = "Write query_results.tsv to the output directory")]
    save: bool,

    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Args, Clone)]
struct ManifestArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    query: QueryArgs,

    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Args, Clone)]
struct DownloadArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    query: QueryArgs,

    #[arg(long, help = "Directory receiving fna/ and gff/")]
    dest: Option<String>,

    #[arg(long, value_enum)]
    policy: Option<PlanPolicy>,

    #[arg(long, help = "Write download_fna.sh/download_gff.sh here instead of downloading")]
    emit_script: Option<String>,

    #[arg(long, help = "Transfer client program")]
    client: Option<String>,

    #[arg(long, help = "Also write query_results.tsv to the destination")]
    manifest: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidReferenceKind(_)
        | KiraError::InvalidPolicy(_)
        | KiraError::EmptyQuery
        | KiraError::MissingConfig
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::DestinationInvalid(_) => 2,
        KiraError::ReportHttp(_)
        | KiraError::ReportStatus { .. }
        | KiraError::ReportUnavailable { .. }
        | KiraError::MissingTool(_)
        | KiraError::TransferFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Report(args) => run_report(args, config, output_mode),
        Commands::Search(args) => run_search(args, config, output_mode),
        Commands::Manifest(args) => run_search(
            SearchArgs {
                source: args.source,
                query: args.query,
                save: true,
                output_dir: args.output_dir,
            },
            config,
            output_mode,
        ),
        Commands::Download(args) => run_download(args, config, output_mode),
    }
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Interactive => &ConsoleProgress,
        OutputMode::NonInteractive => &JsonOutput,
    }
}

fn apply_source(config: &mut ResolvedConfig, args: &SourceArgs) {
    if let Some(reference) = args.reference {
        config.reference = reference;
    }
    if let Some(dir) = &args.report_dir {
        config.report_dir = Utf8PathBuf::from(dir.clone());
    }
    if let Some(transport) = args.transport {
        config.report_transport = transport;
    }
}

fn apply_query(config: &mut ResolvedConfig, args: &QueryArgs) -> Result<(), KiraError> {
    let mut queries = args.queries.clone();
    if let Some(path) = &args.query_file {
        queries.extend(ConfigLoader::load_query_file(path)?);
    }
    if !queries.is_empty() {
        config.queries = queries;
    }
    if args.all_levels {
        config.search.require_full_genome = false;
    }
    if args.strain_specific {
        config.search.strain_specific = true;
    }
    Ok(())
}

fn build_app(
    config: &ResolvedConfig,
    transfer: RsyncTransferClient,
) -> Result<App<Box<dyn ReportFetcher>, RsyncTransferClient>, KiraError> {
    let fetcher = fetcher_for(config.report_transport)?;
    Ok(App::new(config.report_dir.as_std_path(), fetcher, transfer))
}

fn run_search_step(
    app: &App<Box<dyn ReportFetcher>, RsyncTransferClient>,
    config: &ResolvedConfig,
    sink: &dyn ProgressSink,
) -> Result<SearchResult, KiraError> {
    let request = SearchRequest {
        reference: config.reference,
        queries: config.queries.clone(),
        options: config.search,
    };
    app.search(&request, sink)
}

fn run_report(
    args: SourceArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    apply_source(&mut config, &args);
    let app = build_app(
        &config,
        RsyncTransferClient::script_only(&config.transfer_client),
    )?;
    let result = app.ensure_report(config.reference, sink_for(output_mode))?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_report(&result).into_diagnostic()?,
        OutputMode::Interactive => output::print_report_summary(&result),
    }
    Ok(())
}

fn run_search(
    args: SearchArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    apply_source(&mut config, &args.source);
    apply_query(&mut config, &args.query)?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = Utf8PathBuf::from(dir.clone());
    }

    let app = build_app(
        &config,
        RsyncTransferClient::script_only(&config.transfer_client),
    )?;
    let sink = sink_for(output_mode);
    let result = run_search_step(&app, &config, sink)?;
    let manifest = if args.save {
        Some(app.save_manifest(&result, config.output_dir.as_std_path())?)
    } else {
        None
    };

    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_search(&result, manifest.as_ref()).into_diagnostic()?
        }
        OutputMode::Interactive => output::print_search_summary(&result, manifest.as_ref()),
    }
    Ok(())
}

fn run_download(
    args: DownloadArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    apply_source(&mut config, &args.source);
    apply_query(&mut config, &args.query)?;
    if let Some(dest) = &args.dest {
        config.output_dir = Utf8PathBuf::from(dest.clone());
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(dir) = &args.emit_script {
        config.script_dir = Some(Utf8PathBuf::from(dir.clone()));
    }
    if let Some(client) = &args.client {
        config.transfer_client = client.clone();
    }

    let mode = match &config.script_dir {
        Some(dir) => DispatchMode::EmitScript {
            script_dir: dir.clone().into_std_path_buf(),
        },
        None => DispatchMode::Execute,
    };
    let transfer = match mode {
        DispatchMode::Execute => RsyncTransferClient::with_program(&config.transfer_client)?,
        DispatchMode::EmitScript { .. } => RsyncTransferClient::script_only(&config.transfer_client),
    };

    let app = build_app(&config, transfer)?;
    let sink = sink_for(output_mode);
    let destination = config.output_dir.as_std_path();
    let search = run_search_step(&app, &config, sink)?;
    if args.manifest {
        app.save_manifest(&search, destination)?;
    }
    let result = app.download(&search, config.policy, destination, &mode, sink)?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_download(&result).into_diagnostic()?,
        OutputMode::Interactive => output::print_download_summary(&result),
    }
    result.dispatch.into_result()?;
    Ok(())
}
