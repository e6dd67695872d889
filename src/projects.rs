//! Project commands: create, list, archive, and file tree display.

use anyhow::{bail, Result};
use repolens_core::models::Project;
use repolens_core::tree::render_file_tree;

use crate::app::{AppContext, ProjectNotFound};
use crate::commits::poll_commits;
use crate::github::RepoRef;
use crate::ingest::{index_project, print_report};
use crate::progress::IngestProgressReporter;

/// Create a project, index its files, then summarize its latest commits.
pub async fn run_create(
    ctx: &AppContext,
    name: &str,
    github_url: &str,
    branch: Option<&str>,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Project name must not be empty");
    }
    let repo = RepoRef::parse(github_url)?;
    let branch = branch.unwrap_or(&ctx.config.github.default_branch);

    let project = Project::new(name.trim(), github_url, branch);
    ctx.store.create_project(&project).await?;
    println!("project {} ({}, branch {})", project.id, repo, project.branch);

    let stats = index_project(ctx, &project, progress).await?;
    print_report(&project, &stats);

    // Indexing already succeeded; a commit failure only loses the history.
    match poll_commits(ctx, &project).await {
        Ok(n) => println!("  commits summarized: {}", n),
        Err(e) => {
            tracing::warn!(project_id = %project.id, error = %e, "commit polling failed");
            println!("  commits summarized: 0 (polling failed: {})", e);
        }
    }
    Ok(())
}

pub async fn run_list(ctx: &AppContext, all: bool) -> Result<()> {
    let projects = ctx.store.list_projects(all).await?;
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  {:<10}  URL", "ID", "NAME", "CREATED");
    for p in projects {
        let name = if p.is_archived() {
            format!("{} (archived)", p.name)
        } else {
            p.name.clone()
        };
        println!(
            "{:<36}  {:<20}  {:<10}  {}",
            p.id,
            name,
            p.created_at.format("%Y-%m-%d"),
            p.github_url
        );
    }
    Ok(())
}

pub async fn run_archive(ctx: &AppContext, id: &str) -> Result<()> {
    if !ctx.store.archive_project(id).await? {
        return Err(ProjectNotFound(id.to_string()).into());
    }
    println!("archived {}", id);
    Ok(())
}

pub async fn run_tree(ctx: &AppContext, id: &str) -> Result<()> {
    let project = ctx.project(id).await?;
    match ctx.store.get_file_tree(&project.id).await? {
        Some(tree) if !tree.is_empty() => {
            println!("{}", project.name);
            print!("{}", render_file_tree(&tree));
        }
        _ => println!("No file tree stored for {}. Run `rlens index {}`.", project.name, project.id),
    }
    Ok(())
}
