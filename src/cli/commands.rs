//! Command dispatch: each tree command opens a store on the dump file,
//! applies one operation, waits for the save and reports the outcome.

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::{ContentTreeStore, Snapshot};
use crate::cli::args::{Cli, Commands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::{default_types, ContentNodeValue, TreeNodeConvert};
use crate::infrastructure::{read_dump, FileDumpSink, InfraError};

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Ok(());
    };
    match command {
        Commands::Show => cmd_show(cli),
        Commands::Dump { pretty } => cmd_dump(cli, *pretty),
        Commands::Add {
            parent,
            node_type,
            label,
            value,
        } => cmd_add(cli, parent.as_deref(), node_type.as_deref(), label.as_deref(), value.as_deref()),
        Commands::Remove { key } => cmd_remove(cli, key),
        Commands::Duplicate { key } => cmd_duplicate(cli, key),
        Commands::Move { src, target, index } => cmd_move(cli, src, target, *index),
        Commands::Edit { key, value } => cmd_edit(cli, key, value),
        Commands::Restore { source } => cmd_restore(cli, source),
        Commands::Types => cmd_types(),
        Commands::Config => cmd_config(),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_settings() -> CliResult<Settings> {
    let cwd = std::env::current_dir().ok();
    Ok(Settings::load(cwd.as_deref())?)
}

fn resolve(cli: &Cli) -> CliResult<(Settings, PathBuf)> {
    let settings = load_settings()?;
    let path = cli.file.clone().unwrap_or_else(|| settings.dump_path.clone());
    debug!(path = %path.display(), "resolved dump file");
    Ok((settings, path))
}

fn ensure_clean(snapshot: &Snapshot) -> CliResult<()> {
    if snapshot.has_error() {
        return Err(CliError::Operation(snapshot.error.clone()));
    }
    Ok(())
}

/// Open a store hydrated from `path`; with `persist`, changes are saved back to it.
fn open_store(settings: &Settings, path: &Path, persist: bool) -> CliResult<ContentTreeStore> {
    let initial = read_dump(path)?;
    let mut options = settings.store_options();
    if persist {
        options = options.with_save(FileDumpSink::new(path));
    }
    let store = ContentTreeStore::create(initial.as_deref(), options);
    ensure_clean(&store.get())?;
    Ok(store)
}

/// Apply one mutation on a current-thread runtime and wait for its save.
fn with_store<T>(
    cli: &Cli,
    apply: impl FnOnce(&ContentTreeStore, &Settings) -> CliResult<T>,
) -> CliResult<T> {
    let (settings, path) = resolve(cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(InfraError::Runtime)?;
    runtime.block_on(async {
        let store = open_store(&settings, &path, true)?;
        let result = apply(&store, &settings)?;
        store.settled().await;
        ensure_clean(&store.get())?;
        Ok::<T, CliError>(result)
    })
}

#[instrument(skip(cli))]
fn cmd_show(cli: &Cli) -> CliResult<()> {
    let (settings, path) = resolve(cli)?;
    let snapshot = open_store(&settings, &path, false)?.get();
    output::header(&path.display());
    output::info(&snapshot.data.to_tree_string());
    output::detail(&format!("{} nodes", snapshot.size));
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_dump(cli: &Cli, pretty: bool) -> CliResult<()> {
    let (settings, path) = resolve(cli)?;
    let snapshot = open_store(&settings, &path, false)?.get();
    let json = if pretty {
        serde_json::to_string_pretty(&snapshot.data)
    } else {
        serde_json::to_string(&snapshot.data)
    }
    .map_err(|e| CliError::Operation(e.to_string()))?;
    output::info(&json);
    Ok(())
}

fn build_value(
    settings: &Settings,
    node_type: Option<&str>,
    label: Option<&str>,
    value: Option<&str>,
) -> CliResult<Option<ContentNodeValue>> {
    if let Some(json) = value {
        return serde_json::from_str(json)
            .map(Some)
            .map_err(|e| CliError::InvalidArgs(format!("--value: {}", e)));
    }
    if node_type.is_none() && label.is_none() {
        return Ok(None);
    }
    let mut built = settings.default_node_value();
    if let Some(node_type) = node_type {
        built.node_type = node_type.to_string();
    }
    built.label = label.map(str::to_string);
    Ok(Some(built))
}

#[instrument(skip(cli))]
fn cmd_add(
    cli: &Cli,
    parent: Option<&str>,
    node_type: Option<&str>,
    label: Option<&str>,
    value: Option<&str>,
) -> CliResult<()> {
    let key = with_store(cli, |store, settings| {
        let value = build_value(settings, node_type, label, value)?;
        Ok(store.add(parent, value))
    })?;
    if let Some(key) = key {
        output::action("Added", &key);
    }
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_remove(cli: &Cli, key: &str) -> CliResult<()> {
    with_store(cli, |store, _| {
        store.remove(key);
        Ok(())
    })?;
    output::action("Removed", key);
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_duplicate(cli: &Cli, key: &str) -> CliResult<()> {
    let copy = with_store(cli, |store, _| Ok(store.duplicate(key)))?;
    if let Some(copy) = copy {
        output::action("Duplicated", &format!("{} -> {}", key, copy));
    }
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_move(cli: &Cli, src: &str, target: &str, index: usize) -> CliResult<()> {
    with_store(cli, |store, _| {
        store.move_node(src, target, index);
        Ok(())
    })?;
    output::action("Moved", &format!("{} -> {}[{}]", src, target, index));
    Ok(())
}

#[instrument(skip(cli, value))]
fn cmd_edit(cli: &Cli, key: &str, value: &str) -> CliResult<()> {
    with_store(cli, |store, _| {
        store.edit(key, value);
        Ok(())
    })?;
    output::action("Edited", key);
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_restore(cli: &Cli, source: &Path) -> CliResult<()> {
    let dump = std::fs::read_to_string(source)
        .map_err(|e| InfraError::io(format!("read {}", source.display()), e))?;
    let size = with_store(cli, |store, _| {
        store.restore(&dump);
        Ok(store.get().size)
    })?;
    output::action("Restored", &format!("{} nodes from {}", size, source.display()));
    Ok(())
}

fn cmd_types() -> CliResult<()> {
    for config in default_types() {
        let title = match &config.label {
            Some(label) => format!("{} ({})", config.value, label),
            None => config.value.clone(),
        };
        output::header(&title);
        for prop in config.props.iter().flatten() {
            output::detail(&format!("{}: {}", prop.name, prop.input_type));
        }
        if let Some(inner) = config.allow_inner_blocks {
            output::detail(&format!("inner blocks: {}", inner.value));
        }
    }
    Ok(())
}

fn cmd_config() -> CliResult<()> {
    let settings = load_settings()?;
    match global_config_path() {
        Some(path) if path.exists() => output::header(&format!("# {}", path.display())),
        Some(path) => output::warning(&format!("no global config at {}", path.display())),
        None => output::warning("no config directory available"),
    }
    output::info(&settings.to_toml()?);
    Ok(())
}
