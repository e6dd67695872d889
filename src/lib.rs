//! # RepoLens
//!
//! Ask questions about a GitHub repository.
//!
//! RepoLens links a repository to a *project*, has every file and recent
//! commit summarized by a hosted LLM, stores one retrieval unit per file
//! (source, summary, embedding of the summary) in SQLite, and answers
//! questions with retrieval-augmented generation over those units.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Ingest: summarize +  │──▶│  SQLite  │
//! │ REST API │   │ embed (key rotation) │   │  chunks  │
//! └──────────┘   └──────────────────────┘   └────┬─────┘
//!                                                │
//!                      ┌─────────────────────────┤
//!                      ▼                         ▼
//!                 ┌──────────┐             ┌──────────┐
//!                 │   CLI    │             │   HTTP   │
//!                 │ (rlens)  │             │  (axum)  │
//!                 └──────────┘             └──────────┘
//! ```
//!
//! Ranking, key rotation, prompts and the store trait live in
//! `repolens-core`; this crate wires them to the network, the database and
//! the user.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite [`Store`](repolens_core::store::Store) backend |
//! | [`upstream`] | Key pools from the environment, rotation-aware retries |
//! | [`embedding`] | Gemini / OpenAI-compatible embedding providers |
//! | [`generation`] | Gemini / OpenAI-compatible generation providers |
//! | [`github`] | GitHub REST client |
//! | [`progress`] | Indexing progress reporters and status board |
//! | [`app`] | Shared application context |
//! | [`ingest`] | File indexing pipeline |
//! | [`commits`] | Commit polling and summaries |
//! | [`ask`] | Question answering and history |
//! | [`projects`] | Project commands |
//! | [`server`] | HTTP API |

pub mod app;
pub mod ask;
pub mod commits;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod github;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod projects;
pub mod server;
pub mod sqlite_store;
pub mod upstream;

#[cfg(test)]
mod test_support;
