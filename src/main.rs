//! `regi` CLI - query the registrar catalog and convert its PDFs to JSON

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use regi::{ClientConfig, DocumentRequest, EntityKind, JsonShape, Lookup, RegistrarClient, SearchFilters};

#[derive(Parser)]
#[command(name = "regi")]
#[command(about = "Registrar course catalog client and PDF timetable extractor")]
#[command(version)]
struct Cli {
    /// Request timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Retry once without certificate validation when the certificate chain is incomplete
    #[arg(long, global = true)]
    insecure: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List reference entities, or look one up by ID
    Entities {
        /// semester, school, level, department, subject, instructor or breadth
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,

        /// Return only the entity with this ID
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the newest semester
    LatestSemester {
        /// Use the last semester with a published schedule instead of the catalog's newest
        #[arg(long)]
        published: bool,
    },

    /// Search the course catalog
    Search {
        /// Maximum number of courses per page
        #[arg(short, long)]
        limit: u32,

        /// 1-based result page
        #[arg(short, long)]
        page: Option<u32>,

        #[arg(long)]
        semester: Option<String>,

        #[arg(long)]
        school: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        level: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        instructor: Option<String>,

        #[arg(long)]
        breadth: Option<String>,
    },

    /// Download a registrar PDF and convert its tables to JSON
    Document {
        #[arg(value_enum)]
        kind: DocumentArg,

        /// Semester ID
        #[arg(long)]
        semester: String,

        /// Academic level ID (schedule and requirements only)
        #[arg(long)]
        level: Option<String>,

        /// School ID (required for finals)
        #[arg(long)]
        school: Option<String>,

        /// JSON layout: table or columns
        #[arg(long, default_value = "table")]
        shape: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the raw PDF instead of extracting tables
        #[arg(long)]
        pdf: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DocumentArg {
    Schedule,
    Finals,
    Requirements,
}

fn parse_kind(s: &str) -> Result<EntityKind, String> {
    s.parse().map_err(|e: regi::RegistrarError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean JSON
    let filter = if cli.verbose {
        EnvFilter::new("regi=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load()?;
    if let Some(secs) = cli.timeout {
        config.timeout_secs = secs;
    }
    if cli.insecure {
        config.accept_incomplete_chain = true;
    }
    let client = RegistrarClient::with_config(config)?;

    match cli.command {
        Commands::Entities { kind, id } => cmd_entities(&client, kind, id.as_deref()).await?,
        Commands::LatestSemester { published } => cmd_latest_semester(&client, published).await?,
        Commands::Search {
            limit,
            page,
            semester,
            school,
            department,
            level,
            subject,
            instructor,
            breadth,
        } => {
            let mut filters = SearchFilters::new(limit)?;
            if let Some(page) = page {
                filters = filters.page(page);
            }
            if let Some(id) = semester {
                filters = filters.semester(id);
            }
            if let Some(id) = school {
                filters = filters.school(id);
            }
            if let Some(id) = department {
                filters = filters.department(id);
            }
            if let Some(id) = level {
                filters = filters.level(id);
            }
            if let Some(id) = subject {
                filters = filters.subject(id);
            }
            if let Some(id) = instructor {
                filters = filters.instructor(id);
            }
            if let Some(id) = breadth {
                filters = filters.breadth(id);
            }
            let result = client.search(&filters).await?;
            print_json(&result)?;
        }
        Commands::Document {
            kind,
            semester,
            level,
            school,
            shape,
            output,
            pdf,
        } => {
            let request = match kind {
                DocumentArg::Schedule => DocumentRequest::schedule(semester, level.as_deref(), school.as_deref()),
                DocumentArg::Finals => {
                    let school = school.context("--school is required for final exam schedules")?;
                    DocumentRequest::final_exam_schedule(semester, school)
                }
                DocumentArg::Requirements => {
                    DocumentRequest::requirements(semester, level.as_deref(), school.as_deref())
                }
            };
            cmd_document(&client, &request, &shape, output, pdf).await?;
        }
    }

    Ok(())
}

async fn cmd_entities(client: &RegistrarClient, kind: EntityKind, id: Option<&str>) -> Result<()> {
    let value = match client.fetch_entity(kind, id).await? {
        Lookup::One(entity) => serde_json::to_value(entity)?,
        Lookup::All(entities) => serde_json::to_value(entities)?,
    };
    print_json(&value)
}

async fn cmd_latest_semester(client: &RegistrarClient, published: bool) -> Result<()> {
    let semester = if published {
        client.last_published_semester().await?
    } else {
        client.latest_semester().await?
    };
    print_json(&serde_json::to_value(semester)?)
}

async fn cmd_document(
    client: &RegistrarClient,
    request: &DocumentRequest,
    shape: &str,
    output: Option<PathBuf>,
    pdf: bool,
) -> Result<()> {
    let bytes = if pdf {
        client.fetch_document_pdf(request).await?.to_vec()
    } else {
        let shape: JsonShape = shape.parse()?;
        let mut json = client.fetch_document_json(request, shape).await?;
        json.push('\n');
        json.into_bytes()
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Saved {} bytes to {}", bytes.len(), path.display());
        }
        None => std::io::stdout().lock().write_all(&bytes)?,
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
