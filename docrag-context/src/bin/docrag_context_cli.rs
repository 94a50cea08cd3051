use clap::Parser;
use docrag_context::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docrag_context::tokenizer::{DEFAULT_TOKENIZER_MODEL, source_from_spec};
use docrag_context::{ChunkingConfig, TokenChunker};
use std::fs;
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;

/// A CLI tool to split a text file into overlapping token windows, printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Tokenizer: a hub identifier, a path to tokenizer.json, or "chars".
    #[arg(short, long, default_value = DEFAULT_TOKENIZER_MODEL)]
    tokenizer: String,

    /// Maximum number of tokens per chunk.
    #[arg(short = 's', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Tokens shared by consecutive chunks.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let source = source_from_spec(&args.tokenizer)?;
    let chunker = TokenChunker::new(source, ChunkingConfig::new(args.chunk_size, args.overlap))?;
    let chunks = chunker.split(&text)?;

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}
