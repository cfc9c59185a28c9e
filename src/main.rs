//! # DocChat CLI (`docchat`)
//!
//! The `docchat` binary is the primary interface to the service. It
//! provides commands for initializing the data directories, managing
//! chat sessions, uploading documents, asking questions, and starting
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the data directories |
//! | `docchat serve` | Start the HTTP server |
//! | `docchat chat create [--name <name>]` | Create a session |
//! | `docchat chat list` | List session ids |
//! | `docchat chat rename <old> <new>` | Rename a session |
//! | `docchat upload <chat> <files…>` | Upload and index PDFs |
//! | `docchat ask <chat> "<question>"` | Ask a question |
//! | `docchat history <chat>` | Print the conversation log |
//! | `docchat clear-all --yes` | Delete all sessions and data |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docchat::config;
use docchat::models::ChatMessage;
use docchat::server;
use docchat::service::ChatService;

/// DocChat — document-grounded question answering over local PDFs.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "DocChat — multi-session question answering over local PDF documents",
    version,
    long_about = "DocChat lets you create chat sessions, upload PDF documents into them, \
    and ask questions answered strictly from the uploaded documents and prior conversation. \
    Embeddings and generation are served by a local Ollama instance."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories (index, uploads, history).
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP server on the configured bind address.
    Serve,

    /// Manage chat sessions.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Upload PDF files into a session and index them.
    ///
    /// Files are copied into the session's upload store first; paths that
    /// are missing or not PDFs are skipped with a warning.
    Upload {
        /// Session id.
        chat: String,
        /// PDF files to upload.
        files: Vec<PathBuf>,
    },

    /// Ask a question against a session's documents.
    Ask {
        /// Session id.
        chat: String,
        /// The question text.
        question: String,
    },

    /// Print a session's conversation history.
    History {
        /// Session id.
        chat: String,
    },

    /// Delete all sessions, uploads, indexes, and histories.
    ///
    /// Irreversible. Requires `--yes`.
    ClearAll {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
}

/// Session management subcommands.
#[derive(Subcommand)]
enum ChatAction {
    /// Create a new session, named or with a generated id.
    Create {
        /// Desired session name; a unique id is generated when omitted.
        #[arg(long)]
        name: Option<String>,
    },
    /// List all session ids.
    List,
    /// Rename a session, moving all of its data to the new name.
    Rename {
        /// Current session id.
        old: String,
        /// New session name.
        new: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let service = Arc::new(ChatService::from_config(cfg)?);

    match cli.command {
        Commands::Init => {
            service.init_dirs()?;
            println!("Data directories initialized.");
        }
        Commands::Serve => {
            service.init_dirs()?;
            server::run_server(service).await?;
        }
        Commands::Chat { action } => match action {
            ChatAction::Create { name } => {
                let chat_id = service.create(name.as_deref()).await?;
                println!("{}", chat_id);
            }
            ChatAction::List => {
                for id in service.list()? {
                    println!("{}", id);
                }
            }
            ChatAction::Rename { old, new } => {
                let new_id = service.rename(&old, &new).await?;
                println!("renamed to {}", new_id);
            }
        },
        Commands::Upload { chat, files } => {
            let report = service.upload_files(&chat, &files).await?;
            println!("upload {}", chat);
            println!("  files indexed: {}", report.files_indexed);
            println!("  files skipped: {}", report.files_skipped);
            println!("  chunks committed: {}", report.chunks_committed);
        }
        Commands::Ask { chat, question } => {
            let answer = service.ask(&chat, &question).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for meta in &answer.sources {
                    println!("  {} (chunk {})", meta.source_file, meta.chunk);
                }
            }
        }
        Commands::History { chat } => {
            for entry in service.load_history(&chat).await? {
                match entry {
                    ChatMessage::Human(text) => println!("Human: {}", text),
                    ChatMessage::Ai(text) => println!("AI: {}", text),
                }
            }
        }
        Commands::ClearAll { yes } => {
            if !yes {
                anyhow::bail!("clear-all deletes every session; pass --yes to confirm");
            }
            service.clear_all().await?;
            println!("All chat data cleared.");
        }
    }

    Ok(())
}
