//! magicword - vocabulary import, review and library sharing from the terminal
//!
//! **Usage:**
//! ```bash
//! magicword import --library 1 --file article.txt
//! magicword import --word-list --text "give up, look forward to"
//! magicword review
//! magicword catalog browse --tag exam
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mw_ai::{BulkImporter, ChatCompletionClient, GenerationClient, ImportSession};
use mw_catalog::package::{export_libraries, install_package, InstalledLibrary};
use mw_catalog::{CatalogPaginator, ExportPackage, HttpCatalogClient, UploadRequest};
use mw_common::config::{default_config_path, load_config, resolve_config_path, write_toml_config, TomlConfig};
use mw_common::db::{history, init_database_pool};
use mw_common::events::{EventBus, MwEvent};
use mw_common::models::TestType;
use mw_common::time::{format_millis, now_millis};
use mw_common::{normalize_term, EntryStore, SqliteEntryStore};
use mw_srs::scheduler::preview_intervals;
use mw_srs::stats::TestTally;
use mw_srs::{Grade, StudyService};

#[derive(Parser, Debug)]
#[clap(name = "magicword", version)]
#[clap(about = "Build vocabulary libraries with a text generation service and review them with SM-2")]
struct Cli {
    /// Config file (default: $MAGICWORD_CONFIG, then ~/.config/magicword/config.toml)
    #[clap(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage local libraries
    #[clap(subcommand)]
    Library(LibraryCommand),

    /// Extract vocabulary from text (or a word list) and enrich it into a library
    Import(ImportArgs),

    /// List entries due for review
    Due(SelectArgs),

    /// Review due entries interactively
    Review {
        #[clap(flatten)]
        select: SelectArgs,

        /// Stop after this many entries
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Spelling test over due entries; counts answers without rescheduling
    Quiz {
        #[clap(flatten)]
        select: SelectArgs,

        #[clap(long, default_value = "10")]
        count: usize,
    },

    /// Show recent test results
    History {
        #[clap(long, default_value = "10")]
        limit: i64,
    },

    /// Browse, publish and install shared libraries
    #[clap(subcommand)]
    Catalog(CatalogCommand),

    /// Write libraries to a package file
    Export {
        #[clap(long = "library", required = true)]
        libraries: Vec<i64>,

        #[clap(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Install libraries from a package file
    Install {
        #[clap(long, value_name = "FILE")]
        file: PathBuf,

        /// Keep review counters from the package
        #[clap(long)]
        keep_progress: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryCommand {
    List,
    Create {
        name: String,
        #[clap(long, default_value = "")]
        description: String,
    },
    /// Delete a library and all of its entries
    Delete { id: i64 },
    /// Make a library the default for import and review
    Use { id: i64 },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Target library (default: study.current_library_id)
    #[clap(long)]
    library: Option<i64>,

    #[clap(long, value_name = "FILE", conflicts_with = "text")]
    file: Option<PathBuf>,

    #[clap(long)]
    text: Option<String>,

    /// Treat the input as a comma/newline separated word list (no extraction)
    #[clap(long)]
    word_list: bool,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// Libraries to study (repeatable; default: study.current_library_id)
    #[clap(long = "library")]
    libraries: Vec<i64>,
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// List shared libraries, filtered locally
    Browse {
        #[clap(long)]
        query: Option<String>,

        #[clap(long)]
        tag: Option<String>,

        /// Number of batches to fetch
        #[clap(long, default_value = "1")]
        batches: usize,
    },

    /// Publish a local library
    Upload {
        #[clap(long)]
        library: i64,

        /// Catalog name (default: the library name)
        #[clap(long)]
        name: Option<String>,

        #[clap(long)]
        description: Option<String>,

        /// Comma separated tags
        #[clap(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Download a shared library into a new local library
    Install { id: String },
}

/// Line-oriented prompt over async stdin
struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines() }
    }

    /// `None` on end of input
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.next_line().await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let db_path = config.database_path();
    info!(path = %db_path.display(), "Opening database");
    let pool = init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let store: Arc<dyn EntryStore> = Arc::new(SqliteEntryStore::new(pool.clone()));

    match cli.command {
        Command::Library(command) => library(command, &config, cli.config.as_deref(), store.as_ref()).await,
        Command::Import(args) => import(args, &config, store).await,
        Command::Due(select) => due(&select, &config, store).await,
        Command::Review { select, limit } => review(&select, limit, &config, store).await,
        Command::Quiz { select, count } => quiz(&select, count, &config, store, &pool).await,
        Command::History { limit } => show_history(&pool, limit).await,
        Command::Catalog(command) => catalog(command, &config, store.as_ref()).await,
        Command::Export { libraries, out } => export(&libraries, &out, store.as_ref()).await,
        Command::Install { file, keep_progress } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let package = ExportPackage::from_json(&raw)?;
            let installed = install_package(store.as_ref(), &package, keep_progress).await?;
            print_installed(&installed);
            Ok(())
        }
    }
}

async fn library(
    command: LibraryCommand,
    config: &TomlConfig,
    config_arg: Option<&Path>,
    store: &dyn EntryStore,
) -> Result<()> {
    match command {
        LibraryCommand::List => {
            let current = config.study.current_library_id;
            for library in store.list_libraries().await? {
                let words = store.entries_in_library(library.id).await?.len();
                let marker = if Some(library.id) == current { "*" } else { " " };
                println!("{} {:>4}  {:<24} {:>5} words  {}", marker, library.id, library.name, words, library.description);
            }
        }
        LibraryCommand::Create { name, description } => {
            let id = store.create_library(&name, &description).await?;
            println!("Created library {} ({})", id, name);
        }
        LibraryCommand::Delete { id } => {
            store.delete_library(id).await?;
            println!("Deleted library {}", id);
        }
        LibraryCommand::Use { id } => {
            if !store.list_libraries().await?.iter().any(|l| l.id == id) {
                bail!("No library with id {}", id);
            }
            let path = resolve_config_path(config_arg)
                .or_else(default_config_path)
                .ok_or_else(|| anyhow!("No config directory available; pass --config"))?;
            let mut updated = config.clone();
            updated.study.current_library_id = Some(id);
            write_toml_config(&updated, &path)?;
            println!("Current library is now {} ({})", id, path.display());
        }
    }
    Ok(())
}

fn target_library(requested: Option<i64>, config: &TomlConfig) -> Result<i64> {
    requested
        .or(config.study.current_library_id)
        .ok_or_else(|| anyhow!("No library selected; pass --library or run `magicword library use <id>`"))
}

async fn import(args: ImportArgs, config: &TomlConfig, store: Arc<dyn EntryStore>) -> Result<()> {
    let library_id = target_library(args.library, config)?;
    let text = match (&args.file, args.text) {
        (Some(path), _) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => bail!("Nothing to import; pass --file or --text"),
    };

    let client: Arc<dyn GenerationClient> =
        Arc::new(ChatCompletionClient::new(&config.generation, config.resolve_api_key())?);
    let event_bus = Arc::new(EventBus::new(256));
    let importer = BulkImporter::new(client, store, &config.import, config.generation.temperature)
        .with_event_bus(Arc::clone(&event_bus));

    let progress = tokio::spawn(print_progress(event_bus.subscribe()));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Stopping after the current wave...");
                cancel.cancel();
            }
        })
    };

    let result = if args.word_list {
        importer.import_word_list(&text, library_id, &cancel).await
    } else {
        importer.import_text(&text, library_id, &cancel).await
    };

    ctrl_c.abort();
    // Closing the bus lets the printer drain buffered events and exit
    drop(importer);
    drop(event_bus);
    if let Err(e) = progress.await {
        warn!(error = %e, "Progress printer stopped");
    }

    print_session(&result?);
    Ok(())
}

async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<MwEvent>) {
    loop {
        match rx.recv().await {
            Ok(MwEvent::ImportCandidatesExtracted { candidates, chunks, .. }) => {
                println!("Found {} candidates in {} chunks", candidates, chunks);
            }
            Ok(MwEvent::ImportProgress { imported, pending_chunks, message, .. }) => {
                println!("[{} imported, {} queued] {}", imported, pending_chunks, message);
            }
            Ok(MwEvent::ImportChunkFailed { terms, error, .. }) => {
                println!("Gave up on {}: {}", terms.join(", "), error);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_session(session: &ImportSession) {
    println!();
    println!(
        "Import {:?}: {} imported, {} duplicates skipped, {} chunks failed ({}s)",
        session.state,
        session.imported.len(),
        session.skipped_duplicates,
        session.failures.len(),
        session.duration_seconds()
    );
    for failure in &session.failures {
        println!(
            "  not imported after {} attempts: {} ({})",
            failure.attempts,
            failure.terms.join(", "),
            failure.last_error
        );
    }
}

async fn due(select: &SelectArgs, config: &TomlConfig, store: Arc<dyn EntryStore>) -> Result<()> {
    let service = StudyService::new(store, config.study.clone());
    let queue = service.queue(&select.libraries, now_millis()).await?;

    if queue.replayed {
        println!("Nothing due; replaying every entry");
    }
    for entry in &queue.entries {
        println!(
            "{:<24} due {:<16} interval {:>3}d  EF {:.2}",
            entry.term,
            format_millis(entry.next_review_time),
            entry.interval,
            entry.easiness_factor
        );
    }
    println!("{} entries", queue.len());
    Ok(())
}

async fn review(
    select: &SelectArgs,
    limit: Option<usize>,
    config: &TomlConfig,
    store: Arc<dyn EntryStore>,
) -> Result<()> {
    let service = StudyService::new(store, config.study.clone());
    let queue = service.queue(&select.libraries, now_millis()).await?;
    if queue.is_empty() {
        println!("Nothing due. All caught up!");
        return Ok(());
    }

    let mut prompt = Prompt::new();
    let mut reviewed = 0;
    for entry in queue.entries.iter().take(limit.unwrap_or(usize::MAX)) {
        println!();
        println!("{}  {}", entry.term, entry.phonetic.as_deref().unwrap_or_default());
        if prompt.ask("(enter to reveal, q to quit) ").await?.as_deref().map(str::trim) == Some("q") {
            break;
        }

        println!("{}", entry.definition);
        if let Some(example) = &entry.example {
            println!("  e.g. {}", example);
        }
        let choices: Vec<String> = preview_intervals(entry)
            .iter()
            .enumerate()
            .map(|(i, (grade, days))| format!("{}={} ({}d)", i + 1, grade.label(), days))
            .collect();

        let grade = loop {
            let Some(answer) = prompt.ask(&format!("{}: ", choices.join("  "))).await? else {
                return Ok(());
            };
            if let Some(grade) = Grade::parse(&answer) {
                break grade;
            }
        };

        let next = service.record_grade(entry, grade, now_millis()).await?;
        println!("next review {}", format_millis(next.next_review_time));
        reviewed += 1;
    }

    println!("Reviewed {} of {} entries", reviewed, queue.len());
    Ok(())
}

async fn quiz(
    select: &SelectArgs,
    count: usize,
    config: &TomlConfig,
    store: Arc<dyn EntryStore>,
    pool: &SqlitePool,
) -> Result<()> {
    let service = StudyService::new(store, config.study.clone());
    let queue = service.queue(&select.libraries, now_millis()).await?;
    if queue.is_empty() {
        println!("Nothing to test.");
        return Ok(());
    }

    let mut prompt = Prompt::new();
    let mut tally = TestTally::new(TestType::Spell, now_millis());
    for entry in queue.entries.iter().take(count) {
        println!();
        let Some(answer) = prompt.ask(&format!("{}\n> ", entry.definition)).await? else {
            break;
        };
        let correct = normalize_term(&answer) == entry.key();
        if correct {
            println!("correct");
        } else {
            println!("answer: {}", entry.term);
        }
        service.record_test_answer(entry, correct, now_millis()).await?;
        tally.record(correct);
    }

    if tally.total() > 0 {
        let result = tally.finish(now_millis());
        history::insert_history(pool, &result).await?;
        println!(
            "{}/{} correct ({:.0}%)",
            result.correct_count,
            result.total_questions,
            result.accuracy() * 100.0
        );
    }
    Ok(())
}

async fn show_history(pool: &SqlitePool, limit: i64) -> Result<()> {
    for run in history::recent_history(pool, limit).await? {
        println!(
            "{}  {:<6} {:>3}/{:<3} {:>5.1}%  {}s",
            format_millis(run.timestamp),
            run.test_type.as_str(),
            run.correct_count,
            run.total_questions,
            run.accuracy() * 100.0,
            run.duration_seconds
        );
    }
    Ok(())
}

async fn catalog(command: CatalogCommand, config: &TomlConfig, store: &dyn EntryStore) -> Result<()> {
    let client = Arc::new(HttpCatalogClient::new(&config.catalog)?);

    match command {
        CatalogCommand::Browse { query, tag, batches } => {
            let mut paginator = CatalogPaginator::with_config(client, &config.catalog);
            let mut shown = 0;
            for _ in 0..batches.max(1) {
                for record in paginator.fetch_page(query.as_deref(), tag.as_deref()).await? {
                    println!(
                        "{:<16} {:<28} [{}] {}",
                        record.id,
                        record.name,
                        record.tags.join(", "),
                        record.description
                    );
                    shown += 1;
                }
                if paginator.is_exhausted() {
                    break;
                }
            }
            let more = if paginator.is_exhausted() { "" } else { " (more available with --batches)" };
            println!("{} libraries{}", shown, more);
        }
        CatalogCommand::Upload { library, name, description, tags } => {
            let package = export_libraries(store, &[library]).await?;
            let exported = package
                .libraries
                .first()
                .ok_or_else(|| anyhow!("Library {} exported nothing", library))?;
            let request = UploadRequest::from_package(
                &package,
                name.unwrap_or_else(|| exported.name.clone()),
                description.unwrap_or_else(|| exported.description.clone()),
                tags,
            )?;
            let id = client.upload(&request).await?;
            println!("Published {} as {}", request.name, id);
        }
        CatalogCommand::Install { id } => {
            let record = client
                .find(&id)
                .await?
                .ok_or_else(|| anyhow!("No shared library with id {}", id))?;
            let package = client.download(&record).await?;
            let installed = install_package(store, &package, false).await?;
            print_installed(&installed);
        }
    }
    Ok(())
}

async fn export(libraries: &[i64], out: &Path, store: &dyn EntryStore) -> Result<()> {
    let package = export_libraries(store, libraries).await?;
    tokio::fs::write(out, package.to_json()?)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Exported {} libraries ({} words) to {}",
        package.libraries.len(),
        package.word_count(),
        out.display()
    );
    Ok(())
}

fn print_installed(installed: &[InstalledLibrary]) {
    for library in installed {
        println!(
            "Installed {} as library {} ({} words, {} skipped)",
            library.name, library.library_id, library.words, library.skipped
        );
    }
}
