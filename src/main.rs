mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ctxmem::config::CtxmemConfig;
use ctxmem::fusion::{DedupeStrategy, OutputFormat};
use ctxmem::memory::RecordType;

#[derive(Parser)]
#[command(name = "ctxmem", version, about = "Per-project context memory for AI coding assistants")]
struct Cli {
    /// Config file (default: ~/.ctxmem/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Operate on every project instead of the current one
    #[arg(long, global = true)]
    global: bool,

    /// Explicit project id instead of the one derived from the working directory
    #[arg(long, global = true)]
    project: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new record
    Add {
        content: String,
        #[arg(long = "type", default_value = "note")]
        record_type: RecordType,
        #[arg(long)]
        source: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// JSON object of extra metadata
        #[arg(long)]
        metadata: Option<String>,
        /// Owning project for the record (global mode only)
        #[arg(long)]
        for_project: Option<String>,
        /// Compute the record's embedding right away
        #[arg(long)]
        embed: bool,
    },
    /// Show one record
    Get { id: i64 },
    /// List records, newest first
    List {
        #[arg(long = "type")]
        record_type: Option<RecordType>,
        /// Case-insensitive tag substring
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Keyword search
    Search {
        query: String,
        #[arg(long = "type")]
        record_type: Option<RecordType>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Semantic search (keyword fallback without an embedding provider)
    Semantic {
        query: String,
        #[arg(long = "type")]
        record_type: Option<RecordType>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Change fields of an existing record
    Update {
        id: i64,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "type")]
        record_type: Option<RecordType>,
        #[arg(long)]
        source: Option<String>,
        /// Replaces all tags
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Delete one record
    Delete { id: i64 },
    /// Delete every record in scope
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show record counts
    Stats,
    /// Rank records by relevance to a task
    Route {
        task: String,
        /// File currently being edited
        #[arg(long)]
        file: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "type")]
        record_type: Option<RecordType>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Merge sources into one token-budgeted context blob
    Fuse {
        /// JSON file with an array of source descriptors ('-' for stdin)
        #[arg(long)]
        sources: Option<PathBuf>,
        /// Keyword query against the store
        #[arg(long = "query")]
        queries: Vec<String>,
        /// Task description to route
        #[arg(long = "task")]
        tasks: Vec<String>,
        /// File to include
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Literal text to include
        #[arg(long = "inline")]
        inline: Vec<String>,
        #[arg(long)]
        max_tokens: Option<usize>,
        #[arg(long)]
        dedupe: Option<DedupeStrategy>,
        #[arg(long)]
        format: Option<OutputFormat>,
    },
    /// Compute missing embeddings
    ReEmbed {
        /// Drop existing vectors first and embed everything
        #[arg(long)]
        all: bool,
    },
    /// Export records as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import records from an export file
    Import { file: PathBuf },
    /// Show the project root and id for a directory
    Project { dir: Option<PathBuf> },
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.ctxmem/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CtxmemConfig::load_from(path)?,
        None => CtxmemConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.storage.db_path = db.to_string_lossy().into_owned();
    }
    if cli.global {
        config.storage.global = true;
    }
    if let Some(project) = &cli.project {
        config.storage.project_id = Some(project.clone());
    }

    // Log to stderr so stdout stays clean for command output.
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match cli.command {
        Command::Add {
            content,
            record_type,
            source,
            tags,
            metadata,
            for_project,
            embed,
        } => {
            let args = cli::records::AddArgs {
                content,
                record_type,
                source,
                tags,
                metadata,
                project: for_project,
                embed,
            };
            cli::records::add(&config, args, json).await?;
        }
        Command::Get { id } => cli::records::get(&config, id, json)?,
        Command::List {
            record_type,
            tag,
            limit,
        } => cli::records::list(&config, record_type, tag, limit, json)?,
        Command::Search {
            query,
            record_type,
            limit,
        } => cli::search::search(&config, &query, record_type, limit, json)?,
        Command::Semantic {
            query,
            record_type,
            limit,
            min_score,
        } => cli::search::semantic(&config, &query, record_type, limit, min_score, json).await?,
        Command::Update {
            id,
            content,
            record_type,
            source,
            tags,
            metadata,
        } => {
            let args = cli::records::UpdateArgs {
                content,
                record_type,
                source,
                tags,
                metadata,
            };
            cli::records::update(&config, id, args)?;
        }
        Command::Delete { id } => cli::records::delete(&config, id)?,
        Command::Clear { yes } => cli::records::clear(&config, yes)?,
        Command::Stats => cli::stats::stats(&config, json)?,
        Command::Route {
            task,
            file,
            tags,
            record_type,
            limit,
        } => {
            let options = ctxmem::router::RouteOptions {
                current_file: file,
                tags,
                record_type,
                limit: limit.unwrap_or(config.router.default_limit),
            };
            cli::route::route(&config, &task, &options, json).await?;
        }
        Command::Fuse {
            sources,
            queries,
            tasks,
            files,
            inline,
            max_tokens,
            dedupe,
            format,
        } => {
            let args = cli::fuse::FuseArgs {
                sources_file: sources,
                queries,
                tasks,
                files,
                inline,
                max_tokens: max_tokens.unwrap_or(config.fusion.max_tokens),
                dedupe: dedupe.unwrap_or(config.fusion.dedupe),
                format: format.unwrap_or(config.fusion.format),
            };
            cli::fuse::fuse(&config, args, json).await?;
        }
        Command::ReEmbed { all } => cli::re_embed::re_embed(&config, all).await?,
        Command::Export { output } => cli::export::export(&config, output.as_deref())?,
        Command::Import { file } => cli::import::import(&config, &file)?,
        Command::Project { dir } => cli::project::project(dir.as_deref(), json)?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
