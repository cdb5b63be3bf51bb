//! litsurvey CLI - literature surveys from the terminal
//!
//! Usage: litsurvey [OPTIONS] <COMMAND>
//!
//! Same pipeline as the web UI. Supports JSON output for scripting.

use chrono::Utc;
use clap::{Parser, Subcommand};
use litsurvey_lib::ai_client;
use litsurvey_lib::error::SurveyError;
use litsurvey_lib::papers::arxiv::SortOrder;
use litsurvey_lib::pipeline::{Pipeline, PipelineOutput, RunOptions, SurveyRequest, UploadedDocument};
use litsurvey_lib::query::{synthesize_query, validate_topic};
use litsurvey_lib::settings::{LlmBackend, Settings};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "litsurvey", version, about = "Generate literature surveys from arXiv papers or local PDFs")]
struct Cli {
    /// Settings file (default: <data dir>/litsurvey/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search arXiv for a topic and write a survey of the results
    Run {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Extra instructions for the survey writer
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        /// relevance | lastUpdatedDate | submittedDate
        #[arg(long)]
        sort_by: Option<SortOrder>,
    },
    /// Write a survey of local PDF files
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Only generate the arXiv search query for a topic
    Query {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
    },
    /// Settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print current settings (keys masked)
    Show,
    /// Store an API key for a backend
    SetKey {
        backend: LlmBackend,
        key: String,
    },
    /// Choose the active backend
    SetBackend { backend: LlmBackend },
    /// Print the settings file location
    Path,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    #[serde(flatten)]
    output: &'a PipelineOutput,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

/// 2 = input rejected, 3 = nothing found, 1 = everything else
fn exit_code(err: &SurveyError) -> i32 {
    match err {
        SurveyError::InputRejected(_) => 2,
        SurveyError::NoResults => 3,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn run_cli(cli: Cli) -> Result<(), SurveyError> {
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);

    match cli.command {
        Commands::Run { title, description, instructions, max_results, sort_by } => {
            let settings = Settings::load_with_env(Some(config_path.as_path()));
            let mut options = RunOptions::from_settings(&settings);
            options.instructions = instructions;
            if let Some(n) = max_results {
                options.max_results = n.max(1);
            }
            if let Some(sort) = sort_by {
                options.sort_order = sort;
            }
            run_pipeline(&settings, SurveyRequest::Topic { title, description }, &options, cli.json)
        }
        Commands::Upload { files, instructions } => {
            let settings = Settings::load_with_env(Some(config_path.as_path()));
            let mut documents = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)?;
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                documents.push(UploadedDocument { name, bytes });
            }
            let mut options = RunOptions::from_settings(&settings);
            options.instructions = instructions;
            run_pipeline(&settings, SurveyRequest::Uploads(documents), &options, cli.json)
        }
        Commands::Query { title, description } => {
            validate_topic(&title, &description)?;
            let settings = Settings::load_with_env(Some(config_path.as_path()));
            let model = ai_client::build_model(&settings)?;
            let query = synthesize_query(model.as_ref(), &title, &description)?;
            if cli.json {
                println!("{}", serde_json::json!({ "query": query }));
            } else {
                println!("{}", query);
            }
            Ok(())
        }
        Commands::Config { cmd } => handle_config(cmd, &config_path, cli.json),
    }
}

fn run_pipeline(
    settings: &Settings,
    request: SurveyRequest,
    options: &RunOptions,
    json: bool,
) -> Result<(), SurveyError> {
    request.validate()?;
    let pipeline = Pipeline::from_settings(settings)?;
    let output = pipeline.run(request, options, |stage| {
        if !json {
            eprintln!("{}", stage.label());
        }
    })?;

    if json {
        let report = JsonReport { generated_at: Utc::now().to_rfc3339(), output: &output };
        let text = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    if let Some(query) = &output.query {
        println!("Query: {}", query);
    }
    if !output.papers.is_empty() {
        println!("\nPapers:");
        for (i, paper) in output.papers.iter().enumerate() {
            println!("  {}. {} ({} words)", i + 1, paper.title, paper.words);
            println!("     {}", paper.link);
        }
    }
    if let Some(stats) = &output.stats {
        stats.print_summary();
    }
    println!("\n{}", output.survey.text());
    Ok(())
}

fn handle_config(cmd: ConfigCommands, path: &Path, json: bool) -> Result<(), SurveyError> {
    match cmd {
        ConfigCommands::Show => {
            let settings = Settings::load_with_env(Some(path));
            let key = settings.masked_api_key();
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "path": path.display().to_string(),
                        "backend": settings.llm_backend.as_str(),
                        "model": settings.model_name(),
                        "api_key": key,
                        "max_results": settings.max_results,
                        "sort_order": settings.sort_order,
                        "pdf_dir": settings.pdf_dir,
                        "bind_addr": settings.bind_addr,
                    })
                );
            } else {
                println!("Settings file: {}", path.display());
                println!("Backend:       {}", settings.llm_backend.as_str());
                println!("Model:         {}", settings.model_name());
                println!(
                    "API key:       {}",
                    key.unwrap_or_else(|| format!("(not set, export {})", settings.llm_backend.key_env_var()))
                );
                println!("Max results:   {}", settings.max_results);
                println!("Sort order:    {}", settings.sort_order);
                match &settings.pdf_dir {
                    Some(dir) => println!("PDF dir:       {}", dir.display()),
                    None => println!("PDF dir:       (temporary)"),
                }
                println!("Bind address:  {}", settings.bind_addr);
            }
        }
        ConfigCommands::SetKey { backend, key } => {
            // Stored values only; environment overrides are not written back
            let mut settings = Settings::load(path);
            settings.set_api_key(backend, key.trim().to_string());
            settings.save(path)?;
            println!("Saved {} API key to {}", backend.as_str(), path.display());
        }
        ConfigCommands::SetBackend { backend } => {
            let mut settings = Settings::load(path);
            settings.llm_backend = backend;
            settings.save(path)?;
            println!("Backend set to {}", backend.as_str());
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}
