use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::cli::config::{AppConfig, Cli, Commands, SnapshotCommand};
use crate::diff::structural::diff_markup;
use crate::dom::extractor::{extract_interactive_elements, get_form_fields, get_page_sections};
use crate::heal::completion::{
    DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL, OllamaBackend, TextCompletion,
};
use crate::heal::heal_model::SelectorFailure;
use crate::heal::healer::SelectorHealer;
use crate::snapshot::backend::FsBackend;
use crate::snapshot::store::SnapshotStore;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// Composition root
// ============================================================================

/// Everything the commands share, built once from CLI flags and config.
pub struct Runtime {
    pub store: SnapshotStore,
    pub healer: SelectorHealer,
    pub retention_days: u32,
}

/// Resolve settings (CLI > config > defaults) and wire the collaborators.
pub fn build_runtime(cli: &Cli, config: &AppConfig) -> Runtime {
    let snapshot_dir = cli
        .snapshot_dir
        .as_deref()
        .unwrap_or(&config.snapshots.dir);
    let endpoint = cli
        .ollama_endpoint
        .as_deref()
        .or(config.ollama.endpoint.as_deref());
    let model = cli
        .ollama_model
        .as_deref()
        .or(config.ollama.model.as_deref());

    Runtime {
        store: build_store(snapshot_dir),
        healer: SelectorHealer::new(
            build_completion(endpoint, model),
            config.heal.to_healer_config(),
        ),
        retention_days: config.snapshots.retention_days,
    }
}

pub fn build_store(dir: &str) -> SnapshotStore {
    SnapshotStore::new(Arc::new(FsBackend::new(dir)))
}

pub fn build_completion(endpoint: Option<&str>, model: Option<&str>) -> Arc<dyn TextCompletion> {
    let endpoint = endpoint.unwrap_or(DEFAULT_OLLAMA_ENDPOINT);
    let model = model.unwrap_or(DEFAULT_OLLAMA_MODEL);
    Arc::new(OllamaBackend::new(endpoint, model))
}

// ============================================================================
// Dispatch
// ============================================================================

pub async fn run(cli: Cli, config: AppConfig) -> CmdResult {
    let runtime = build_runtime(&cli, &config);

    match cli.command {
        Commands::Extract { file } => {
            print_json(&extract_interactive_elements(&read(&file)?))
        }
        Commands::Sections { file } => print_json(&get_page_sections(&read(&file)?)),
        Commands::Forms { file } => print_json(&get_form_fields(&read(&file)?)),
        Commands::Diff { before, after } => {
            print_json(&diff_markup(&read(&before)?, &read(&after)?))
        }
        Commands::Snapshot { action } => cmd_snapshot(&runtime, action).await,
        Commands::Heal {
            selector,
            description,
            url,
            file,
            previous,
        } => cmd_heal(&runtime, selector, description, url, file, previous).await,
        Commands::HealBatch { failures } => cmd_heal_batch(&runtime, &failures).await,
    }
}

// ============================================================================
// snapshot subcommand
// ============================================================================

async fn cmd_snapshot(runtime: &Runtime, action: SnapshotCommand) -> CmdResult {
    let store = &runtime.store;

    match action {
        SnapshotCommand::Save {
            url,
            file,
            test_file,
        } => {
            let snapshot = store
                .save(&url, &read(&file)?, test_file.as_deref(), BTreeMap::new())
                .await?;
            println!("{}", snapshot.id);
        }
        SnapshotCommand::List { url } => {
            let mut snapshots = store.list_by_url(&url).await?;
            snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            for s in &snapshots {
                println!("{}  {}  {}", s.id, s.timestamp.to_rfc3339(), s.url);
            }
        }
        SnapshotCommand::Latest { url, previous } => {
            match store.get_previous(&url, previous).await? {
                Some(snapshot) => print_json(&snapshot)?,
                None => return Err(format!("no snapshot #{previous} for {url}").into()),
            }
        }
        SnapshotCommand::Compare { from, to } => match store.compare(&from, &to).await? {
            Some(diff) => {
                println!("{}", diff.summary());
                for line in &diff.removed {
                    println!("- {line}");
                }
                for line in &diff.added {
                    println!("+ {line}");
                }
            }
            None => return Err(format!("unknown snapshot: {from} or {to}").into()),
        },
        SnapshotCommand::Cleanup { days } => {
            let days = days.unwrap_or(runtime.retention_days);
            let deleted = store.cleanup(days).await?;
            println!("Deleted {deleted} snapshots older than {days} days");
        }
        SnapshotCommand::Delete { id } => {
            if !store.delete(&id).await? {
                return Err(format!("unknown snapshot: {id}").into());
            }
        }
    }

    Ok(())
}

// ============================================================================
// heal subcommands
// ============================================================================

async fn cmd_heal(
    runtime: &Runtime,
    selector: String,
    description: Option<String>,
    url: Option<String>,
    file: Option<String>,
    previous: Option<String>,
) -> CmdResult {
    let mut failure = SelectorFailure::new(selector);
    failure.description = description;

    let (current, previous) = match (file, url) {
        (Some(file), _) => {
            let previous = previous.as_deref().map(read).transpose()?;
            (read(&file)?, previous)
        }
        (None, Some(url)) => {
            let current = runtime
                .store
                .get_latest(&url)
                .await?
                .ok_or_else(|| format!("no snapshot for {url}"))?;
            let previous = runtime.store.get_before(&current).await?;
            failure.url = Some(url);
            (current.markup, previous.map(|p| p.markup))
        }
        (None, None) => return Err("heal needs --file or --url".into()),
    };

    let result = runtime
        .healer
        .heal_selector(&failure, &current, previous.as_deref())
        .await;
    print_json(&result)
}

async fn cmd_heal_batch(runtime: &Runtime, path: &str) -> CmdResult {
    let failures: Vec<SelectorFailure> = serde_json::from_str(&read(path)?)?;
    let results = runtime.healer.heal_batch(&runtime.store, &failures).await;
    print_json(&results)
}

// ============================================================================
// Helpers
// ============================================================================

fn read(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}").into())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
