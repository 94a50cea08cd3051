use anyhow::Result;
use docrag_context::tokenizer::CharTokenizerSource;
use docrag_context::{ChunkingConfig, TokenChunker};
use docrag_embed::HashingEmbedProvider;
use docrag_retriever::extract::{DEFAULT_HWP_COMMAND, ExtractorRegistry};
use docrag_retriever::retrieval::{DocumentIndexer, IndexRequest};
use docrag_retriever::storage::sqlite_store::SqliteStore;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

/// Run the `docrag` binary against the database in `temp_dir`
fn run_cli(temp_dir: &TempDir, args: &[&str]) -> Result<Output> {
    run_cli_with_env(temp_dir, args, &[])
}

fn run_cli_with_env(temp_dir: &TempDir, args: &[&str], envs: &[(&str, &str)]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_docrag"))
        .arg("--db")
        .arg(db_path(temp_dir.path()))
        .args(args)
        .env_remove("DOCRAG_CONFIG")
        .env_remove("DOCRAG_DB")
        .env_remove("DOCRAG_TOKENIZER")
        .env_remove("DOCRAG_EMBED_MODEL")
        .env_remove("DOCRAG_EMBED_BACKEND")
        .envs(envs.iter().copied())
        .env("RUST_LOG", "error")
        .output()?;
    Ok(output)
}

/// Model-free settings so `add` and `search` run without downloads
const OFFLINE: &[(&str, &str)] = &[
    ("DOCRAG_EMBED_BACKEND", "hashing"),
    ("DOCRAG_TOKENIZER", "chars"),
];

fn db_path(dir: &Path) -> std::path::PathBuf {
    dir.join("docrag.db")
}

/// Index two small files into "handbook" and one into "it"
async fn populate(temp_dir: &TempDir) -> Result<()> {
    let store = SqliteStore::open(
        &db_path(temp_dir.path()),
        Arc::new(HashingEmbedProvider::default()),
    )
    .await?;
    let chunker = TokenChunker::new(Arc::new(CharTokenizerSource), ChunkingConfig::new(40, 5))?;
    let indexer = DocumentIndexer::new(ExtractorRegistry::with_defaults(DEFAULT_HWP_COMMAND), chunker);

    let files = [
        ("handbook", "leave.txt", "Paid leave is fifteen days per year for every employee."),
        ("handbook", "hours.txt", "Core hours run from ten to four."),
        ("it", "vpn.txt", "Use the VPN when working remotely."),
    ];
    for (collection, name, text) in files {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, text)?;
        indexer
            .index_document(
                &store,
                IndexRequest::new(collection, &path).with_description("Company handbook"),
            )
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_list_collections() -> Result<()> {
    let temp_dir = tempdir()?;
    populate(&temp_dir).await?;

    let output = run_cli(&temp_dir, &["list"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 2 collections"));
    assert!(stdout.contains("handbook (3 chunks)"));
    assert!(stdout.contains("it (1 chunks)"));

    let output = run_cli(&temp_dir, &["--format", "json", "list"])?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json[0]["name"], "handbook");
    assert_eq!(json[0]["chunk_count"], 3);
    Ok(())
}

#[tokio::test]
async fn test_info_and_delete() -> Result<()> {
    let temp_dir = tempdir()?;
    populate(&temp_dir).await?;

    let output = run_cli(&temp_dir, &["info", "handbook", "--sample", "10"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Description: Company handbook"));
    assert!(stdout.contains("Chunks:      3"));
    assert!(stdout.contains("leave.txt (2 chunks)"));
    assert!(stdout.contains("hours.txt (1 chunks)"));

    let output = run_cli(&temp_dir, &["delete", "it"])?;
    assert!(output.status.success());
    let output = run_cli(&temp_dir, &["--format", "json", "list"])?;
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn test_missing_collection_and_file_fail() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_cli(&temp_dir, &["info", "nowhere"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Collection 'nowhere' not found"));

    let output = run_cli(&temp_dir, &["add", "docs", "/nonexistent/file.pdf"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("File not found"));
    Ok(())
}

#[test]
fn test_invalid_metadata_pair() -> Result<()> {
    let temp_dir = tempdir()?;
    let output = run_cli(&temp_dir, &["add", "docs", "a.txt", "-m", "novalue"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected key=value"));
    Ok(())
}

#[test]
fn test_add_then_search() -> Result<()> {
    let temp_dir = tempdir()?;
    let leave = temp_dir.path().join("leave.txt");
    std::fs::write(&leave, "Paid leave is fifteen days per year for every employee.")?;
    let vpn = temp_dir.path().join("vpn.txt");
    std::fs::write(&vpn, "Use the VPN when working remotely from home.")?;

    for (collection, path) in [("handbook", &leave), ("it", &vpn)] {
        let path = path.to_string_lossy();
        let output = run_cli_with_env(
            &temp_dir,
            &["add", collection, &path, "--chunk-size", "100", "--overlap", "10", "-m", "zip=01234"],
            OFFLINE,
        )?;
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Chunks: 1"));
    }

    let output = run_cli_with_env(&temp_dir, &["search", "paid leave days", "-c", "handbook"], OFFLINE)?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 1 relevant chunks in collection \"handbook\""));
    assert!(stdout.contains("**Source:** leave.txt (chunk #0)"));

    let output = run_cli_with_env(
        &temp_dir,
        &["--format", "json", "search", "paid leave days", "-k", "2"],
        OFFLINE,
    )?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let hits = json["hits"].as_array().cloned().unwrap_or_default();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["metadata"]["source"], "leave.txt");
    assert_eq!(hits[0]["metadata"]["collection"], "handbook");
    assert_eq!(json["failures"].as_array().map(Vec::len), Some(0));
    Ok(())
}
