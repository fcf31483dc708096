use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use notekeep::{
    BackendKind, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteFilter, NoteId, NoteStore,
    NoteUpdate, StoreConfig, StoreError,
};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

/// notekeep - offline note storage with interchangeable backends
#[derive(Parser)]
#[command(name = "notekeep")]
#[command(about = "Offline note storage and query engine")]
#[command(version)]
struct Cli {
    /// Storage backend (key-value, file-tree, relational)
    #[arg(long, global = true, env = "NOTEKEEP_BACKEND")]
    backend: Option<BackendKind>,

    /// Directory holding the store's files
    #[arg(long, global = true, value_name = "DIR", env = "NOTEKEEP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Session key for encrypted notes
    #[arg(long, global = true, env = "NOTEKEEP_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Add a new note
    Add(AddCommand),
    /// Show one note
    Show { id: NoteId },
    /// List notes, pinned first then most recently updated
    List(ListCommand),
    /// Change fields of an existing note
    Edit(EditCommand),
    /// Delete a note
    Delete { id: NoteId },
    /// List tags ranked by usage
    Tags,
    /// Manage folders
    #[command(subcommand)]
    Folder(FolderCommand),
    /// Write every note as JSON to stdout
    Export,
    /// Read notes from a JSON array file
    Import {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct AddCommand {
    /// The title of the note
    #[arg(value_name = "TITLE")]
    title: String,

    /// The body of the note
    #[arg(value_name = "CONTENT", default_value = "")]
    content: String,

    /// Comma-separated tags to apply to the note
    #[arg(short, long, value_name = "TAGS")]
    tags: Option<String>,

    /// Pin the note
    #[arg(long)]
    pin: bool,

    /// Encrypt the body with the session key
    #[arg(long)]
    encrypt: bool,

    /// Folder to place the note in
    #[arg(long, value_name = "ID")]
    folder: Option<FolderId>,
}

#[derive(Args)]
struct ListCommand {
    /// Case-insensitive text to look for in title or content
    #[arg(short, long)]
    query: Option<String>,

    /// Only notes carrying this tag; repeat to match any of several
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Only pinned notes
    #[arg(long)]
    pinned: bool,

    /// Only notes in this folder
    #[arg(long, value_name = "ID")]
    folder: Option<FolderId>,

    /// Maximum number of notes to show
    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct EditCommand {
    id: NoteId,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    content: Option<String>,

    /// Replacement comma-separated tag list; empty clears all tags
    #[arg(long, value_name = "TAGS")]
    tags: Option<String>,

    #[arg(long, conflicts_with = "unpin")]
    pin: bool,

    #[arg(long)]
    unpin: bool,

    #[arg(long, conflicts_with = "decrypt")]
    encrypt: bool,

    #[arg(long)]
    decrypt: bool,

    /// Move the note into this folder
    #[arg(long, value_name = "ID", conflicts_with = "no_folder")]
    folder: Option<FolderId>,

    /// Take the note out of its folder
    #[arg(long)]
    no_folder: bool,
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Create a folder
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// List folders by name
    List,
    /// Rename a folder or change its color
    Edit {
        id: FolderId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "no_color")]
        color: Option<String>,
        #[arg(long)]
        no_color: bool,
    },
    /// Delete a folder; its notes are kept
    Delete { id: FolderId },
}

/// Errors raised by the command layer itself.
#[derive(Debug, Error)]
enum CliError {
    #[error("note {0} not found")]
    NoteNotFound(NoteId),

    #[error("folder {0} not found")]
    FolderNotFound(FolderId),

    #[error("nothing to update: pass at least one field to change")]
    NothingToUpdate,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.backend, cli.data_dir)?;
    let mut store = NoteStore::open(&config).context("Failed to open note store")?;
    if let Some(key) = cli.key.as_deref() {
        store.set_key(key).context("Invalid session key")?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&mut store, cli.command, &mut out)?;

    store.close().context("Failed to close note store")
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors include validation failures, missing keys and unknown ids.
/// Internal errors include database failures and I/O errors.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<CliError>()
            || cause
                .downcast_ref::<StoreError>()
                .is_some_and(StoreError::is_user_error)
    })
}

/// Builds the store configuration, letting flags override the environment.
fn resolve_config(backend: Option<BackendKind>, data_dir: Option<PathBuf>) -> Result<StoreConfig> {
    match (backend, data_dir) {
        (Some(backend), Some(data_dir)) => Ok(StoreConfig::new(backend, data_dir)),
        (backend, data_dir) => {
            let mut config = StoreConfig::from_env().context("Failed to read configuration")?;
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            Ok(config)
        }
    }
}

/// Runs one command against an open store, writing output to `out`.
///
/// Separated from `run` to allow testing with in-memory stores.
fn execute(store: &mut NoteStore, command: Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Add(cmd) => execute_add(store, cmd, out),
        Commands::Show { id } => {
            let note = store
                .get_note(id)
                .context("Failed to read note")?
                .ok_or(CliError::NoteNotFound(id))?;
            print_note(&note, out)
        }
        Commands::List(cmd) => execute_list(store, cmd, out),
        Commands::Edit(cmd) => execute_edit(store, cmd, out),
        Commands::Delete { id } => {
            if !store.delete_note(id).context("Failed to delete note")? {
                return Err(CliError::NoteNotFound(id).into());
            }
            writeln!(out, "Note {id} deleted")?;
            Ok(())
        }
        Commands::Tags => {
            for tag in store.tags().context("Failed to derive tags")? {
                writeln!(out, "{}\t{}", tag.usage_count(), tag.name())?;
            }
            Ok(())
        }
        Commands::Folder(cmd) => execute_folder(store, cmd, out),
        Commands::Export => {
            let notes = store.export_notes().context("Failed to export notes")?;
            serde_json::to_writer_pretty(&mut *out, &notes)?;
            writeln!(out)?;
            Ok(())
        }
        Commands::Import { path } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let notes: Vec<Note> = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array of notes", path.display()))?;
            let imported = store.import_notes(notes).context("Failed to import notes")?;
            writeln!(out, "Imported {} notes", imported.len())?;
            Ok(())
        }
    }
}

fn execute_add(store: &mut NoteStore, cmd: AddCommand, out: &mut impl Write) -> Result<()> {
    let parsed_tags = cmd.tags.as_deref().map(parse_tags).unwrap_or_default();

    let mut input = NewNote::new(cmd.title, cmd.content)
        .with_tags(parsed_tags.clone())
        .pinned(cmd.pin)
        .encrypted(cmd.encrypt);
    input.folder_id = cmd.folder;

    let note = store.create_note(input).context("Failed to create note")?;

    // Output success message
    write!(out, "Note created (id: {})", note.id())?;
    if !parsed_tags.is_empty() {
        write!(out, " with tags: {}", parsed_tags.join(", "))?;
    }
    writeln!(out)?;

    Ok(())
}

fn execute_list(store: &NoteStore, cmd: ListCommand, out: &mut impl Write) -> Result<()> {
    let filter = NoteFilter {
        query: cmd.query,
        pinned: cmd.pinned.then_some(true),
        tags: (!cmd.tags.is_empty()).then_some(cmd.tags),
        folder_id: cmd.folder,
        limit: cmd.limit,
    };

    for note in store.list_notes(&filter).context("Failed to list notes")? {
        let marker = if note.pinned() { "*" } else { " " };
        write!(out, "{marker} {:>4}  {}", note.id(), note.title())?;
        if !note.tags().is_empty() {
            write!(out, "  [{}]", note.tags().join(", "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn execute_edit(store: &mut NoteStore, cmd: EditCommand, out: &mut impl Write) -> Result<()> {
    let update = NoteUpdate {
        title: cmd.title,
        content: cmd.content,
        tags: cmd.tags.as_deref().map(parse_tags),
        pinned: flag_pair(cmd.pin, cmd.unpin),
        folder_id: if cmd.no_folder {
            Some(None)
        } else {
            cmd.folder.map(Some)
        },
        encrypted: flag_pair(cmd.encrypt, cmd.decrypt),
    };
    if update.is_empty() {
        return Err(CliError::NothingToUpdate.into());
    }

    let note = store
        .update_note(cmd.id, update)
        .context("Failed to update note")?
        .ok_or(CliError::NoteNotFound(cmd.id))?;
    writeln!(out, "Note {} updated", note.id())?;
    Ok(())
}

fn execute_folder(store: &mut NoteStore, cmd: FolderCommand, out: &mut impl Write) -> Result<()> {
    match cmd {
        FolderCommand::Add { name, color } => {
            let folder = store
                .create_folder(NewFolder { name, color })
                .context("Failed to create folder")?;
            writeln!(out, "Folder created (id: {})", folder.id())?;
        }
        FolderCommand::List => {
            for folder in store.list_folders().context("Failed to list folders")? {
                write!(out, "{:>4}  {}", folder.id(), folder.name())?;
                if let Some(color) = folder.color() {
                    write!(out, "  ({color})")?;
                }
                writeln!(out)?;
            }
        }
        FolderCommand::Edit {
            id,
            name,
            color,
            no_color,
        } => {
            let update = FolderUpdate {
                name,
                color: if no_color { Some(None) } else { color.map(Some) },
            };
            if update == FolderUpdate::default() {
                return Err(CliError::NothingToUpdate.into());
            }
            store
                .update_folder(id, update)
                .context("Failed to update folder")?
                .ok_or(CliError::FolderNotFound(id))?;
            writeln!(out, "Folder {id} updated")?;
        }
        FolderCommand::Delete { id } => {
            if !store.delete_folder(id).context("Failed to delete folder")? {
                return Err(CliError::FolderNotFound(id).into());
            }
            writeln!(out, "Folder {id} deleted")?;
        }
    }
    Ok(())
}

fn print_note(note: &Note, out: &mut impl Write) -> Result<()> {
    write!(out, "#{} {}", note.id(), note.title())?;
    if note.pinned() {
        write!(out, " [pinned]")?;
    }
    if note.encrypted() {
        write!(out, " [encrypted]")?;
    }
    writeln!(out)?;
    if !note.tags().is_empty() {
        writeln!(out, "tags: {}", note.tags().join(", "))?;
    }
    if let Some(folder) = note.folder_id() {
        writeln!(out, "folder: {folder}")?;
    }
    writeln!(
        out,
        "created: {}  updated: {}",
        note.created_at().format(&Rfc3339)?,
        note.updated_at().format(&Rfc3339)?
    )?;
    writeln!(out)?;
    writeln!(out, "{}", note.content())?;
    Ok(())
}

/// Folds an on/off flag pair into an optional boolean.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Parses comma-separated tags from a string.
///
/// Splits on commas, trims whitespace from each tag, and filters out empty strings.
fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
