//! # RepoLens Core
//!
//! Shared logic for RepoLens: data models, the API-key rotation manager,
//! lexical scoring, the hybrid retrieval ranker, answer-context assembly,
//! file trees, the store abstraction, and the provider traits.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Time is read through the [`clock::Clock`] trait so cooldown and throttle
//! behaviour can be tested deterministically.

pub mod clock;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod keyring;
pub mod lexical;
pub mod models;
pub mod search;
pub mod store;
pub mod text;
pub mod tree;
