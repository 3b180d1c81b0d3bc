use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docindex_core::config::Config;
use docindex_core::pages::PageReader;
use docindex_core::{Error, IndexStats};
use docindex_embed::get_default_embedder;
use docindex_vector::DocumentIndex;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when a delete matched nothing.
const EXIT_NO_MATCH: u8 = 3;

#[derive(Parser)]
#[command(name = "docindex", version, about = "Manage documents in a local vector index")]
struct Cli {
    /// Index root; overrides `index.root` from configuration.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty index if none exists.
    Init,
    /// Index text files (pages separated by form feeds), or every .txt file in a directory.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Source name to record instead of the file name (single file only).
        #[arg(long)]
        source: Option<String>,
    },
    /// Remove documents, pages, or matching content and rebuild the index.
    Delete {
        #[command(subcommand)]
        target: DeleteTarget,
    },
    /// Show indexed documents and their pages.
    List,
    /// Show document and page counts.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DeleteTarget {
    Source { name: String },
    Page { name: String, page: u32 },
    Content { query: String },
    All {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(err) if err.is_no_match() => {
                warn!(error = %err, "nothing to delete");
                ExitCode::from(EXIT_NO_MATCH)
            }
            _ => {
                error!(error = %format!("{e:#}"), "command failed");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| { error!(error = %e, "loading config failed"); e })?;
    let mut settings = config.settings()?;
    if let Some(root) = cli.root {
        settings.index.root = root.to_string_lossy().into_owned();
    }
    let embedder = get_default_embedder(&settings.embedder)?;
    debug!(root = %settings.index.root, embedder = embedder.embedder_id(), "index configured");
    let index = DocumentIndex::from_settings(&settings.index, embedder);

    match cli.command {
        Command::Init => {
            if index.initialize().await? {
                println!("✅ Created index at {}", index.store().root().display());
            } else {
                println!("Index already exists at {}", index.store().root().display());
            }
        }
        Command::Add { paths, source } => {
            if source.is_some() && (paths.len() != 1 || paths[0].is_dir()) {
                anyhow::bail!("--source can only name a single file");
            }
            let reader = PageReader::new();
            let mut documents = Vec::new();
            for path in &paths {
                if path.is_dir() { documents.extend(reader.read_directory(path)?); } else { documents.push(reader.read_file(path)?); }
            }
            if let Some(name) = source {
                for doc in &mut documents { doc.source = name.clone(); }
            }
            let mut stats = index.get_statistics().await.unwrap_or_default();
            for doc in documents {
                let pages = doc.pages.len();
                stats = index.add_document(&doc.source, doc.pages).await?;
                println!("📄 Added {} ({} pages)", doc.source, pages);
            }
            print_stats(&stats);
        }
        Command::Delete { target } => {
            let stats = match target {
                DeleteTarget::Source { name } => index.delete_by_source(&name).await?,
                DeleteTarget::Page { name, page } => index.delete_by_source_and_page(&name, page).await?,
                DeleteTarget::Content { query } => index.delete_by_content(&query).await?,
                DeleteTarget::All { yes } => {
                    if !yes { anyhow::bail!("refusing to delete everything without --yes"); }
                    index.delete_all().await?
                }
            };
            println!("✅ Delete complete");
            print_stats(&stats);
        }
        Command::List => {
            let listing = index.list_documents().await?;
            if listing.is_empty() { println!("No documents indexed"); }
            for (source, pages) in listing {
                let pages: Vec<String> = pages.iter().map(u32::to_string).collect();
                println!("{source}: pages {}", pages.join(", "));
            }
        }
        Command::Stats { json } => {
            let stats = index.get_statistics().await?;
            if json { println!("{}", serde_json::to_string_pretty(&stats)?); } else { print_stats(&stats); }
        }
    }
    Ok(())
}

fn print_stats(stats: &IndexStats) {
    println!("📊 {} documents, {} pages, index size {}", stats.total_documents, stats.total_pages, stats.index_size);
}
