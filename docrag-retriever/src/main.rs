use anyhow::Context;
use clap::{Parser, Subcommand};
use docrag_context::tokenizer::source_from_spec;
use docrag_context::{ChunkingConfig, TokenChunker};
use docrag_embed::{EmbeddingProvider, HashingEmbedProvider};
use docrag_retriever::RetrieverConfig;
use docrag_retriever::extract::ExtractorRegistry;
use docrag_retriever::retrieval::{
    CollectionFailure, DocumentIndexer, IndexRequest, SearchHit, delete_collection,
    describe_collection, list_collections_with_counts, render_grounded_context,
    search_all_collections, search_in_collection,
};
use docrag_retriever::storage::sqlite_store::SqliteStore;
use docrag_retriever::storage::{CollectionStore, Metadata, MetadataValue};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Index documents into named collections and search them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults to $DOCRAG_CONFIG when set)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format: summary or json
    #[arg(short, long, global = true, default_value = "summary")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a document into a collection, replacing earlier chunks of the same file
    Add {
        /// Collection name, created if it does not exist
        collection: String,
        /// File to index (txt, md, pdf, docx, pptx, xlsx, xls, hwp)
        file: PathBuf,
        /// Description used when the collection is created
        #[arg(short, long)]
        description: Option<String>,
        /// Extra metadata stored on every chunk, as key=value
        #[arg(short, long = "meta", value_parser = parse_metadata_pair)]
        metadata: Vec<(String, MetadataValue)>,
        /// Tokens per chunk, overrides the configuration
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Tokens shared by consecutive chunks, overrides the configuration
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// List collections with their chunk counts
    List,
    /// Describe a collection and the documents it holds
    Info {
        collection: String,
        /// Number of chunks sampled to list documents
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Delete a collection and all its chunks
    Delete { collection: String },
    /// Search one collection, or all of them
    Search {
        query: String,
        /// Restrict the search to this collection
        #[arg(short, long)]
        collection: Option<String>,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

/// `key=value`. The value becomes an integer, float or bool only when it reads
/// back exactly as typed (`7`, `0.5`, `true`); anything else, such as `007`,
/// `1.10` or `nan`, is kept as text.
fn parse_metadata_pair(s: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), parse_metadata_value(value)))
}

fn parse_metadata_value(value: &str) -> MetadataValue {
    if let Some(i) = value.parse::<i64>().ok().filter(|i| i.to_string() == value) {
        return MetadataValue::Int(i);
    }
    if let Some(x) = value
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite() && x.to_string() == value)
    {
        return MetadataValue::Float(x);
    }
    match value {
        "true" => MetadataValue::Bool(true),
        "false" => MetadataValue::Bool(false),
        _ => MetadataValue::Str(value.to_string()),
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    collection: Option<&'a str>,
    hits: &'a [SearchHit],
    failures: &'a [CollectionFailure],
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = RetrieverConfig::load(args.config.as_deref())?;
    if let Some(db) = &args.db {
        config = config.with_database_path(db);
    }

    match args.command {
        Commands::Add {
            collection,
            file,
            description,
            metadata,
            chunk_size,
            overlap,
        } => {
            if !file.is_file() {
                anyhow::bail!("File not found: {}", file.display());
            }

            let chunking = ChunkingConfig::new(
                chunk_size.unwrap_or(config.chunking.chunk_size),
                overlap.unwrap_or(config.chunking.overlap),
            );
            chunking.validate()?;

            let store = open_store(&config, config.embedding_provider().await?).await?;
            store
                .heartbeat()
                .await
                .with_context(|| format!("store at {} is not reachable", config.database_path.display()))?;

            let source = source_from_spec(&config.tokenizer)?;
            let chunker = TokenChunker::new(source, chunking)?;
            let indexer = DocumentIndexer::new(
                ExtractorRegistry::with_defaults(config.hwp_command.clone()),
                chunker,
            )
            .with_reserved_key_policy(config.reserved_key_policy.clone());

            let mut request = IndexRequest::new(collection, file)
                .with_metadata(metadata.into_iter().collect::<Metadata>());
            if let Some(description) = description {
                request = request.with_description(description);
            }
            let report = indexer.index_document(&store, request).await?;

            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary => {
                    println!("Indexed {} into collection {}", report.file_name, report.collection_name);
                    println!("  Title:  {}", report.title);
                    println!("  Pages:  {}", report.num_pages);
                    println!("  Chunks: {}", report.num_chunks);
                }
            }
            Ok(())
        }
        Commands::List => {
            let store = open_catalog_store(&config).await?;
            let listings = list_collections_with_counts(&store).await?;

            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
                OutputFormat::Summary => {
                    if listings.is_empty() {
                        println!("No collections found.");
                    } else {
                        println!("Found {} collections:", listings.len());
                    }
                    for listing in listings {
                        match (listing.chunk_count, listing.error) {
                            (Some(count), _) => println!("  {} ({} chunks)", listing.name, count),
                            (None, Some(error)) => println!("  {} (error: {})", listing.name, error),
                            (None, None) => println!("  {}", listing.name),
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Info { collection, sample } => {
            let store = open_catalog_store(&config).await?;
            let sample_limit = sample.unwrap_or(config.info_sample_limit);
            let summary = describe_collection(&store, &collection, sample_limit).await?;

            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Summary => {
                    println!("Collection:  {}", summary.name);
                    println!("Description: {}", summary.description);
                    println!("Created:     {}", summary.created_at.to_rfc3339());
                    println!("Distance:    {}", summary.distance);
                    println!("Chunks:      {}", summary.total_chunks);
                    println!(
                        "Documents (from a sample of {} chunks):",
                        summary.sample_size
                    );
                    for doc in summary.documents {
                        println!("  {} ({} chunks)", doc.source, doc.sampled_chunks);
                    }
                }
            }
            Ok(())
        }
        Commands::Delete { collection } => {
            let store = open_catalog_store(&config).await?;
            delete_collection(&store, &collection).await?;
            match args.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "deleted": collection })
                ),
                OutputFormat::Summary => println!("Deleted collection {collection}"),
            }
            Ok(())
        }
        Commands::Search {
            query,
            collection,
            top_k,
        } => {
            let top_k = top_k.unwrap_or(config.default_top_k);
            let store = open_store(&config, config.embedding_provider().await?).await?;

            let (hits, failures) = match &collection {
                Some(name) => (search_in_collection(&store, name, &query, top_k).await?, Vec::new()),
                None => {
                    let aggregated = search_all_collections(&store, &query, top_k).await?;
                    (aggregated.hits, aggregated.failures)
                }
            };

            for failure in &failures {
                eprintln!("Warning: could not search {}: {}", failure.collection, failure.error);
            }

            match args.format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query: &query,
                        collection: collection.as_deref(),
                        hits: &hits,
                        failures: &failures,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    print!("{}", render_grounded_context(&query, collection.as_deref(), &hits));
                }
            }
            Ok(())
        }
    }
}

async fn open_store(
    config: &RetrieverConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.database_path, embedder)
        .await
        .with_context(|| format!("cannot open store at {}", config.database_path.display()))
}

/// Store for commands that never embed, so no model is loaded.
async fn open_catalog_store(config: &RetrieverConfig) -> anyhow::Result<SqliteStore> {
    open_store(config, Arc::new(HashingEmbedProvider::default())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(pair: &str) -> MetadataValue {
        parse_metadata_pair(pair).unwrap().1
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(parsed("year=2024"), MetadataValue::Int(2024));
        assert_eq!(parsed("delta=-3"), MetadataValue::Int(-3));
        assert_eq!(parsed("ratio=0.5"), MetadataValue::Float(0.5));
        assert_eq!(parsed("draft=true"), MetadataValue::Bool(true));
        assert_eq!(parsed("draft=false"), MetadataValue::Bool(false));
        assert_eq!(parsed("author=Kim"), MetadataValue::from("Kim"));
    }

    #[test]
    fn test_values_that_would_change_stay_text() {
        assert_eq!(parsed("zip=01234"), MetadataValue::from("01234"));
        assert_eq!(parsed("version=1.10"), MetadataValue::from("1.10"));
        assert_eq!(parsed("count=+5"), MetadataValue::from("+5"));
        assert_eq!(parsed("flag=TRUE"), MetadataValue::from("TRUE"));
        assert_eq!(parsed("note="), MetadataValue::from(""));
    }

    #[test]
    fn test_non_finite_numbers_stay_text() {
        for text in ["Nan", "nan", "NaN", "inf", "-inf", "Infinity"] {
            let value = parsed(&format!("author={text}"));
            assert_eq!(value, MetadataValue::from(text));

            // Survives the JSON encoding used by the store
            let mut metadata = Metadata::new();
            metadata.insert("author".into(), value.clone());
            let json = serde_json::to_string(&metadata).unwrap();
            let back: Metadata = serde_json::from_str(&json).unwrap();
            assert_eq!(back.get("author"), Some(&value));
        }
    }

    #[test]
    fn test_malformed_pairs() {
        assert!(parse_metadata_pair("novalue").is_err());
        assert!(parse_metadata_pair("=value").is_err());
        assert_eq!(
            parse_metadata_pair("url=https://a.b/?x=1").unwrap(),
            ("url".to_string(), MetadataValue::from("https://a.b/?x=1"))
        );
    }
}
