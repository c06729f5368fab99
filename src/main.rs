use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use zettelbot::{
    ApiClientBuilder, ChatId, Config, DialogStep, DialogStore, NoteId, NotePatch, NoteStore,
    OwnerId,
};

/// zettelbot - note service client with a local fallback
#[derive(Parser)]
#[command(name = "zettelbot")]
#[command(about = "Manage linked notes against a remote store, degrading to local storage")]
#[command(version)]
struct Cli {
    /// Owner ID the operation is scoped to (falls back to ZETTEL_OWNER)
    #[arg(short, long, value_name = "ID", global = true)]
    owner: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a note interactively (title, content, tags over three prompts)
    New,
    /// List all notes
    List,
    /// Search notes by substring over title, content and tags
    Search {
        /// The query text
        query: String,
    },
    /// Show one note
    Show {
        /// Note ID
        id: i64,
    },
    /// Update fields of an existing note
    Edit {
        /// Note ID
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete a note
    Delete {
        /// Note ID
        id: i64,
    },
    /// Link two notes
    Link {
        /// Source note ID
        from: i64,
        /// Target note ID
        to: i64,
    },
    /// Print the note graph as a text tree
    Tree,
    /// Print the note graph as an adjacency matrix
    Matrix,
    /// Check whether the remote note service is reachable
    Health,
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::from_env();
    let owner = resolve_owner(cli, &config)?;

    let client = ApiClientBuilder::new()
        .base_url(&config.api_url)
        .request_timeout(config.request_timeout)
        .build()
        .context("failed to build API client")?;
    let store = NoteStore::new(Box::new(client));

    match &cli.command {
        Commands::New => handle_new(&store, owner),
        Commands::List => handle_list(&store, owner),
        Commands::Search { query } => handle_search(&store, owner, query),
        Commands::Show { id } => handle_show(&store, owner, NoteId::new(*id)),
        Commands::Edit {
            id,
            title,
            content,
            tags,
        } => handle_edit(
            &store,
            owner,
            NoteId::new(*id),
            NotePatch {
                title: title.clone(),
                content: content.clone(),
                tags: tags.clone(),
            },
        ),
        Commands::Delete { id } => handle_delete(&store, owner, NoteId::new(*id)),
        Commands::Link { from, to } => {
            handle_link(&store, owner, NoteId::new(*from), NoteId::new(*to))
        }
        Commands::Tree => handle_tree(&store, owner),
        Commands::Matrix => handle_matrix(&store, owner),
        Commands::Health => handle_health(&store),
    }
}

fn resolve_owner(cli: &Cli, config: &Config) -> Result<OwnerId> {
    cli.owner
        .map(OwnerId::new)
        .or(config.default_owner)
        .context("no owner given: pass --owner or set ZETTEL_OWNER")
}

/// Drives the conversation state machine over stdin, one line per turn.
///
/// The same machine serves the chat transport; this is the CLI stand-in.
fn handle_new(store: &NoteStore, owner: OwnerId) -> Result<()> {
    let dialog = DialogStore::new();
    let chat = ChatId::new(owner.get());

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut step = dialog.begin(chat);

    loop {
        match step {
            DialogStep::PromptTitle => print!("Title: "),
            DialogStep::PromptContent => print!("Content: "),
            DialogStep::PromptTags => print!("Tags (optional, comma-separated): "),
            DialogStep::RejectedEmpty => print!("Cannot be empty, try again: "),
            DialogStep::Cancelled => {
                println!("Cancelled.");
                return Ok(());
            }
            DialogStep::Committed(note) => {
                let origin = if zettelbot::FallbackCache::is_local_id(note.id) {
                    " (stored locally, note service unavailable)"
                } else {
                    ""
                };
                println!("Note created (id: {}){origin}", note.id);
                return Ok(());
            }
            DialogStep::NotActive => unreachable!("entry started above"),
        }
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            // stdin closed mid-entry, same as a cancel
            dialog.cancel(chat);
            println!();
            return Ok(());
        };
        step = dialog.handle_message(chat, owner, &line?, store);
    }
}

fn handle_list(store: &NoteStore, owner: OwnerId) -> Result<()> {
    let notes = store.list(owner);
    if notes.is_empty() {
        println!("No notes.");
        return Ok(());
    }
    println!("{} note(s):", notes.len());
    for note in notes {
        let tags = note
            .tags
            .as_deref()
            .map(|t| format!(" [{t}]"))
            .unwrap_or_default();
        println!("{:>14}  {}{}", note.id, note.title, tags);
    }
    Ok(())
}

fn handle_search(store: &NoteStore, owner: OwnerId, query: &str) -> Result<()> {
    let notes = store.search(owner, query);
    if notes.is_empty() {
        println!("Nothing found for '{query}'.");
        return Ok(());
    }
    println!("{} match(es) for '{query}':", notes.len());
    for note in notes {
        println!("{:>14}  {}", note.id, note.title);
    }
    Ok(())
}

fn handle_show(store: &NoteStore, owner: OwnerId, id: NoteId) -> Result<()> {
    match store.get(id, owner) {
        Some(note) => {
            println!("{} (id: {})", note.title, note.id);
            println!("{}", note.content);
            if let Some(tags) = &note.tags {
                println!("tags: {tags}");
            }
        }
        None => println!("Note {id} not found."),
    }
    Ok(())
}

fn handle_edit(store: &NoteStore, owner: OwnerId, id: NoteId, patch: NotePatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("nothing to change: pass --title, --content or --tags");
    }
    if store.update(id, owner, &patch) {
        println!("Note {id} updated.");
    } else {
        println!("Could not update note {id}.");
    }
    Ok(())
}

fn handle_delete(store: &NoteStore, owner: OwnerId, id: NoteId) -> Result<()> {
    if store.delete(id, owner) {
        println!("Note {id} deleted.");
    } else {
        println!("Note {id} not found.");
    }
    Ok(())
}

fn handle_link(store: &NoteStore, owner: OwnerId, from: NoteId, to: NoteId) -> Result<()> {
    if store.link(from, to, owner) {
        println!("Linked {from} -> {to}.");
    } else {
        println!("Could not link {from} -> {to}.");
    }
    Ok(())
}

fn handle_tree(store: &NoteStore, owner: OwnerId) -> Result<()> {
    match store.graph(owner).render_tree() {
        Some(tree) => print!("{tree}"),
        None => println!("No notes to build a graph from."),
    }
    Ok(())
}

fn handle_matrix(store: &NoteStore, owner: OwnerId) -> Result<()> {
    match store.graph(owner).render_matrix() {
        Some(matrix) => print!("{matrix}"),
        None => println!("No notes to build a graph from."),
    }
    Ok(())
}

fn handle_health(store: &NoteStore) -> Result<()> {
    if store.remote_healthy() {
        println!("Note service is reachable.");
    } else {
        println!("Note service is unreachable; operations will degrade to local storage.");
    }
    Ok(())
}
