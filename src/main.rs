use book_tagger::config::{parse_batch_size, Config, ConfigError};
use book_tagger::utils::file::{read_tags_from_json, read_tags_from_text, SourceError};
use book_tagger::{
    Backend, BookSource, BookTagMap, EnrichmentClient, EnrichmentError, JsonArraySource,
    MemoryBackend, MySqlBackend, PipelineError, StorageBackend, StorageError, StoreSource,
    TaggingPipeline, TextPairSource,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid arguments: {0}")]
    Usage(String),
    #[error("loading input: {0}")]
    Source(#[from] SourceError),
    #[error("database: {0}")]
    Storage(#[from] StorageError),
    #[error("remote API: {0}")]
    Remote(#[from] EnrichmentError),
    #[error("tagging: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("writing output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "book-tagger", version, about = "Tag books with a chat completion model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Infer tags for books and store them in BOOK_TAG
    Tag(TagArgs),
    /// Insert books from a file into BOOK
    ImportBooks {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = FileFormat::Text)]
        format: FileFormat,
    },
    /// Insert a tag list from a file into TAG
    ImportTags {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = FileFormat::Text)]
        format: FileFormat,
    },
    /// Upload a file to the remote API
    Upload {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value = "fine-tune")]
        purpose: String,
    },
}

#[derive(Args, Debug)]
struct TagArgs {
    /// Where to read books from
    #[arg(long, value_enum, default_value_t = SourceKind::Store)]
    source: SourceKind,
    /// Book file for the text and json sources
    #[arg(long)]
    path: Option<PathBuf>,
    /// JSON tag vocabulary; the model then picks tag ids from it
    #[arg(long)]
    vocabulary: Option<PathBuf>,
    /// Books per request, overrides BATCH_SIZE
    #[arg(long)]
    batch_size: Option<usize>,
    /// Print the tags instead of writing them to the database
    #[arg(long)]
    dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceKind {
    Store,
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FileFormat {
    Text,
    Json,
}

async fn connect_store(config: &Config) -> Result<Backend, AppError> {
    let database = config.require_database()?;
    info!(
        "Connecting to database {} at {}:{}",
        database.name, database.host, database.port
    );
    let backend = MySqlBackend::new(database.connect_options()).await?;
    info!("Database connection successful");
    Ok(Arc::new(backend))
}

fn file_source(format: FileFormat, path: PathBuf) -> Box<dyn BookSource + Send + Sync> {
    match format {
        FileFormat::Text => Box::new(TextPairSource::new(path)),
        FileFormat::Json => Box::new(JsonArraySource::new(path)),
    }
}

async fn tag(config: Config, args: TagArgs) -> Result<(), AppError> {
    let batch_size = match args.batch_size {
        Some(size) => parse_batch_size(size)?,
        None => config.batch_size,
    };

    let store = if args.source == SourceKind::Store || !args.dry_run {
        Some(connect_store(&config).await?)
    } else {
        None
    };

    let source: Box<dyn BookSource + Send + Sync> = match (args.source, args.path, &store) {
        (SourceKind::Store, _, Some(store)) => Box::new(StoreSource::new(store.clone())),
        (SourceKind::Text, Some(path), _) => file_source(FileFormat::Text, path),
        (SourceKind::Json, Some(path), _) => file_source(FileFormat::Json, path),
        (SourceKind::Store, _, None) => {
            return Err(AppError::Usage("the store source needs a database".to_string()))
        }
        (kind, None, _) => {
            return Err(AppError::Usage(format!("--path is required for the {:?} source", kind)))
        }
    };
    let books = source.load().await?;

    let dry_run_sink = Arc::new(MemoryBackend::new());
    let sink: Backend = match (&store, args.dry_run) {
        (Some(store), false) => store.clone(),
        _ => dry_run_sink.clone() as Backend,
    };

    let client = Arc::new(EnrichmentClient::new(config.api_key.clone(), config.enrichment.clone())?);
    let mut pipeline = TaggingPipeline::new(client, sink, batch_size);
    if let Some(path) = &args.vocabulary {
        let vocabulary = read_tags_from_json(path).await?;
        info!("Using a vocabulary of {} tags", vocabulary.len());
        pipeline = pipeline.with_vocabulary(vocabulary);
    }

    let summary = pipeline.run(&books).await?;
    info!(
        "Run complete: {} batches, {} books tagged",
        summary.batches, summary.tagged_books
    );

    if args.dry_run {
        let mut tags = BookTagMap::new();
        for (title, tag) in dry_run_sink.book_tags().await {
            tags.entry(title).or_default().push(tag);
        }
        println!("{}", serde_json::to_string_pretty(&tags)?);
    }
    Ok(())
}

async fn import_books(config: Config, path: PathBuf, format: FileFormat) -> Result<(), AppError> {
    let books = file_source(format, path).load().await?;
    let store = connect_store(&config).await?;
    store.insert_books(&books).await?;
    info!("Inserted {} books", books.len());
    Ok(())
}

async fn import_tags(config: Config, path: PathBuf, format: FileFormat) -> Result<(), AppError> {
    let tags = match format {
        FileFormat::Text => read_tags_from_text(&path).await?,
        FileFormat::Json => read_tags_from_json(&path)
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect(),
    };
    let store = connect_store(&config).await?;
    store.insert_tags(&tags).await?;
    info!("Inserted {} tags", tags.len());
    Ok(())
}

async fn upload(config: Config, path: PathBuf, purpose: String) -> Result<(), AppError> {
    let client = EnrichmentClient::new(config.api_key, config.enrichment)?;
    let uploaded = client.upload_file(&path, &purpose).await?;
    info!(
        "Uploaded {} as {}",
        uploaded.filename.as_deref().unwrap_or("file"),
        uploaded.id.as_deref().unwrap_or("unknown id")
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env()?;

    match cli.command {
        Command::Tag(args) => tag(config, args).await,
        Command::ImportBooks { path, format } => import_books(config, path, format).await,
        Command::ImportTags { path, format } => import_tags(config, path, format).await,
        Command::Upload { path, purpose } => upload(config, path, purpose).await,
    }
}

#[tokio::main]
async fn main() {
    let env_file = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("book_tagger=info")),
        )
        .init();

    if let Err(e) = env_file {
        warn!("No .env file loaded ({}), using the process environment", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
