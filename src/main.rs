//! # copyscan CLI
//!
//! ## Usage
//!
//! ```bash
//! copyscan --config ./config/copyscan.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `copyscan extract` | Flatten repositories into the raw corpus directory |
//! | `copyscan process` | Normalize the raw corpus into the processed directory |
//! | `copyscan normalize <file>` | Print one file after normalization |
//! | `copyscan index build` | Embed the processed corpus and write the index |
//! | `copyscan index stats` | Show the saved index manifest |
//! | `copyscan search <file>` | Top-K similar corpus files |
//! | `copyscan check <file>` | Full plagiarism check (`-` reads stdin) |
//! | `copyscan serve` | Start the HTTP API |
//! | `copyscan evaluate` | Accuracy over labelled sample directories |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use copyscan::checker::PlagiarismChecker;
use copyscan::config::load_config;
use copyscan::corpus::process_corpus;
use copyscan::embedding::create_provider;
use copyscan::evaluate::{evaluate, print_summary};
use copyscan::extract::flatten_repositories;
use copyscan::index::CorpusIndex;
use copyscan::indexer::build_corpus_index;
use copyscan::normalize::normalize;
use copyscan::progress::ProgressMode;
use copyscan::server::run_server;

/// copyscan: code plagiarism detection with embeddings and an LLM verdict.
///
/// All commands except `normalize` read a TOML configuration file. See
/// `config/copyscan.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "copyscan",
    about = "copyscan: code plagiarism detection with embeddings and an LLM verdict",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/copyscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy code files out of every configured repository into one directory.
    ///
    /// Files are renamed on collision (`main.py`, `main_1.py`, ...).
    Extract,

    /// Normalize the raw corpus into the processed corpus.
    Process,

    /// Print a file after comment, docstring and import stripping.
    Normalize {
        /// File to normalize (`-` reads stdin).
        file: PathBuf,
    },

    /// Build or inspect the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show the corpus files most similar to a submission.
    Search {
        /// Submission file (`-` reads stdin).
        file: PathBuf,
    },

    /// Run the full check and print the report as JSON.
    Check {
        /// Submission file (`-` reads stdin).
        file: PathBuf,
    },

    /// Start the HTTP API.
    Serve,

    /// Check every file of two labelled directories and report accuracy.
    Evaluate {
        /// Files expected to pass.
        #[arg(long)]
        original: PathBuf,
        /// Files expected to be flagged.
        #[arg(long)]
        plagiarized: PathBuf,
        /// Write per-file records as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed the processed corpus and write the index artifacts.
    Build {
        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print the saved index manifest.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize { file } => {
            let text = read_input(&file)?;
            println!("{}", normalize(&text));
        }
        Commands::Extract => {
            let config = load_config(&cli.config)?;
            let stats = flatten_repositories(
                &config.extract.repos_dir,
                &config.extract.repos,
                &config.extract.extensions,
                &config.corpus.raw_dir,
            )?;
            println!("extract");
            println!("  repositories: {}", stats.repositories);
            println!("  missing: {}", stats.repositories_missing);
            println!("  files copied: {}", stats.files_copied);
        }
        Commands::Process => {
            let config = load_config(&cli.config)?;
            let stats = process_corpus(&config.corpus.raw_dir, &config.corpus.processed_dir)?;
            println!("process");
            println!("  processed: {}", stats.processed);
            println!("  empty after normalization: {}", stats.empty);
            println!("  unreadable: {}", stats.unreadable);
        }
        Commands::Index { action } => {
            let config = load_config(&cli.config)?;
            match action {
                IndexAction::Build {
                    batch_size,
                    progress,
                } => {
                    let embedder = create_provider(&config.embedding)?;
                    let reporter = progress
                        .unwrap_or_else(ProgressMode::default_for_tty)
                        .reporter();
                    let stats = build_corpus_index(
                        &config.corpus.processed_dir,
                        &config.index.dir,
                        embedder.as_ref(),
                        batch_size.unwrap_or(config.embedding.batch_size),
                        reporter.as_ref(),
                    )
                    .await?;
                    println!("index build");
                    println!("  files: {}", stats.files);
                    println!("  embedded: {}", stats.embedded);
                    println!("  zero-filled: {}", stats.zero_filled);
                    println!("  failed batches: {}", stats.failed_batches);
                    println!("  dims: {}", stats.manifest.dims);
                    if stats.all_zero() {
                        eprintln!(
                            "warning: no file was embedded; every index row is a zero vector. \
                             Check the [embedding] backend and rebuild."
                        );
                    }
                }
                IndexAction::Stats => {
                    let (_, manifest) = CorpusIndex::load(&config.index.dir)?;
                    println!("index stats");
                    println!("  dir: {}", config.index.dir.display());
                    println!("  files: {}", manifest.count);
                    println!("  dims: {}", manifest.dims);
                    println!("  model: {}", manifest.model);
                    println!("  metric: {}", manifest.metric);
                    println!("  created: {}", manifest.created_at.to_rfc3339());
                }
            }
        }
        Commands::Search { file } => {
            let config = load_config(&cli.config)?;
            let code = read_input(&file)?;
            let checker = PlagiarismChecker::from_config(&config)?;
            let outcome = checker.searcher().search(&code).await?;
            println!("search");
            if outcome.similar_files.is_empty() {
                println!("  no similar files");
            }
            for (i, hit) in outcome.similar_files.iter().enumerate() {
                println!(
                    "  {}. {} (score: {:.4})",
                    i + 1,
                    hit.file_path,
                    hit.similarity_score
                );
            }
        }
        Commands::Check { file } => {
            let config = load_config(&cli.config)?;
            let code = read_input(&file)?;
            let checker = PlagiarismChecker::from_config(&config)?;
            let report = checker.check_text(&code).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            run_server(&config).await?;
        }
        Commands::Evaluate {
            original,
            plagiarized,
            output,
        } => {
            let config = load_config(&cli.config)?;
            let checker = PlagiarismChecker::from_config(&config)?;
            let summary = evaluate(&checker, &original, &plagiarized).await?;
            print_summary(&summary);
            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("\nresults written to {}", path.display());
            }
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
