//! # RepoLens CLI (`rlens`)
//!
//! ## Usage
//!
//! ```bash
//! rlens --config ./config/repolens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rlens init` | Create the SQLite database and tables |
//! | `rlens project create <name> <url>` | Link a GitHub repository, index it, summarize commits |
//! | `rlens project list` | List projects |
//! | `rlens project archive <id>` | Archive a project |
//! | `rlens index <id>` | Re-index a project's files |
//! | `rlens commits <id> [--poll]` | Show (and optionally fetch) commit summaries |
//! | `rlens ask <id> "<question>" [--rewrite]` | Answer a question about the code |
//! | `rlens questions <id>` | Saved question history |
//! | `rlens tree <id>` | Show the indexed file tree |
//! | `rlens serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! export GEMINI_API_KEY_1=... GEMINI_API_KEY_2=... GROQ_API_KEY_1=...
//! rlens init
//! rlens project create widgets https://github.com/acme/widgets --branch main
//! rlens ask 3f2a... "where is the login token validated?" --save
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use repolens::app::AppContext;
use repolens::progress::ProgressMode;
use repolens::{ask, commits, config, ingest, migrate, projects, server};

/// RepoLens: ask questions about a GitHub repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repolens.example.toml` for a full example. API keys
/// are read from the environment variables named in that file.
#[derive(Parser)]
#[command(name = "rlens", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repolens.toml")]
    config: PathBuf,

    /// Indexing progress on stderr: `off`, `human` or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Create, list and archive projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Re-index a project's files.
    ///
    /// Every eligible file is fetched, summarized and embedded again; the
    /// new chunks are added next to the existing ones.
    Index { project_id: String },

    /// Show a project's commit summaries.
    Commits {
        project_id: String,

        /// Fetch and summarize new commits first.
        #[arg(long)]
        poll: bool,
    },

    /// Answer a question from the project's indexed files.
    Ask {
        project_id: String,
        question: String,

        /// Number of files to retrieve (defaults to `[retrieval].final_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Save the question and answer to the project's history.
        #[arg(long)]
        save: bool,

        /// Rewrite the question into a clearer one before asking it.
        #[arg(long)]
        rewrite: bool,
    },

    /// List saved questions, newest first.
    Questions { project_id: String },

    /// Print the indexed file tree.
    Tree { project_id: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Link a repository, index its files and summarize recent commits.
    Create {
        name: String,
        github_url: String,

        /// Branch to index (defaults to `[github].default_branch`).
        #[arg(long)]
        branch: Option<String>,
    },
    /// List projects.
    List {
        /// Include archived projects.
        #[arg(long)]
        all: bool,
    },
    /// Archive a project. It disappears from `project list`.
    Archive { id: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let ctx = AppContext::open(cfg).await?;
    let progress = ctx.progress_with(
        cli.progress
            .unwrap_or_else(ProgressMode::default_for_tty)
            .reporter(),
    );

    match cli.command {
        Commands::Init => {}
        Commands::Project { action } => match action {
            ProjectAction::Create {
                name,
                github_url,
                branch,
            } => {
                projects::run_create(&ctx, &name, &github_url, branch.as_deref(), &progress)
                    .await?;
            }
            ProjectAction::List { all } => {
                projects::run_list(&ctx, all).await?;
            }
            ProjectAction::Archive { id } => {
                projects::run_archive(&ctx, &id).await?;
            }
        },
        Commands::Index { project_id } => {
            ingest::run_index(&ctx, &project_id, &progress).await?;
        }
        Commands::Commits { project_id, poll } => {
            commits::run_commits(&ctx, &project_id, poll).await?;
        }
        Commands::Ask {
            project_id,
            question,
            limit,
            save,
            rewrite,
        } => {
            ask::run_ask(&ctx, &project_id, &question, limit, save, rewrite).await?;
        }
        Commands::Questions { project_id } => {
            ask::run_questions(&ctx, &project_id).await?;
        }
        Commands::Tree { project_id } => {
            projects::run_tree(&ctx, &project_id).await?;
        }
        Commands::Serve => {
            server::run_server(Arc::new(ctx)).await?;
        }
    }

    Ok(())
}
