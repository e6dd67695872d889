//! Commit polling.
//!
//! Fetches the newest commits of a project's branch, drops the ones already
//! stored, summarizes each remaining diff one at a time with a pause between
//! generation calls, and inserts the results.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use repolens_core::generation::commit_summary_prompt;
use repolens_core::models::{CommitRecord, Project};

use crate::app::AppContext;
use crate::github::RepoRef;

/// Stored in place of a summary when the diff could not be summarized.
pub const SUMMARY_ERROR: &str = "Error generating summary for commit";

/// Summarize and store unprocessed commits. Returns how many were inserted.
pub async fn poll_commits(ctx: &AppContext, project: &Project) -> Result<usize> {
    let repo = RepoRef::parse(&project.github_url)?;
    let limit = ctx.config.github.commit_limit;
    let generation = &ctx.config.generation;

    let latest = ctx
        .source
        .list_commits(&repo, &project.branch, limit)
        .await?;
    let known: HashSet<String> = ctx
        .store
        .list_commits(&project.id)
        .await?
        .into_iter()
        .map(|c| c.commit_hash)
        .collect();
    let fresh: Vec<_> = latest
        .into_iter()
        .filter(|c| !known.contains(&c.sha))
        .collect();

    tracing::info!(project_id = %project.id, new_commits = fresh.len(), "polling commits");

    let pause = Duration::from_millis(generation.commit_pause_ms);
    let mut records = Vec::with_capacity(fresh.len());
    for (i, commit) in fresh.into_iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let summary = match summarize(ctx, &repo, &commit.sha).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(sha = %commit.sha, error = %e, "commit summary failed");
                SUMMARY_ERROR.to_string()
            }
        };

        records.push(CommitRecord {
            project_id: project.id.clone(),
            commit_hash: commit.sha,
            message: commit.message,
            author_name: commit.author_name,
            author_avatar: commit.author_avatar,
            committed_at: commit.date,
            summary,
        });
    }

    ctx.store.insert_commits(&records).await
}

async fn summarize(ctx: &AppContext, repo: &RepoRef, sha: &str) -> Result<String> {
    let diff = ctx.source.fetch_diff(repo, sha).await?;
    let prompt = commit_summary_prompt(&diff, ctx.config.generation.max_diff_chars);
    Ok(ctx.generator.generate(&prompt).await?.trim().to_string())
}

/// `rlens commits <project-id> [--poll]`.
pub async fn run_commits(ctx: &AppContext, project_id: &str, poll: bool) -> Result<()> {
    let project = ctx.project(project_id).await?;
    if poll {
        let inserted = poll_commits(ctx, &project).await?;
        println!("commits {}", project.name);
        println!("  new commits summarized: {}", inserted);
    }

    for c in ctx.store.list_commits(&project.id).await? {
        let subject = c.message.lines().next().unwrap_or("");
        println!(
            "{}  {}  {}  {}",
            &c.commit_hash[..c.commit_hash.len().min(7)],
            c.committed_at.format("%Y-%m-%d"),
            c.author_name,
            subject
        );
        for line in c.summary.lines().filter(|l| !l.trim().is_empty()) {
            println!("    {}", line);
        }
    }
    if poll {
        println!("ok");
    }
    Ok(())
}
