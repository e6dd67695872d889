//! Repository ingestion pipeline.
//!
//! Lists a project's files through the [`RepoSource`], skips ignored and
//! oversize paths, then for each remaining file in order: fetch → summarize
//! → embed → store one [`ContentChunk`]. Files are processed sequentially so
//! the progress marker always names the file being worked on.
//!
//! Per-file failures never abort the run. A failed summary becomes an empty
//! summary and the source head is embedded instead; a failed embedding
//! skips the file and is counted.

use anyhow::Result;
use repolens_core::generation::file_summary_prompt;
use repolens_core::models::{ContentChunk, Project};
use repolens_core::text::truncate_utf8;
use repolens_core::tree::build_file_tree;

use crate::app::AppContext;
use crate::github::{IgnoreRules, RepoRef};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_listed: u64,
    /// Matched an ignore glob or exceeded `max_file_bytes`.
    pub files_ignored: u64,
    pub files_indexed: u64,
    /// Could not be fetched or is not UTF-8 text.
    pub files_skipped: u64,
    pub summary_failures: u64,
    pub embed_failures: u64,
}

/// Index every eligible file of `project` and store the file tree.
pub async fn index_project(
    ctx: &AppContext,
    project: &Project,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestStats> {
    let repo = RepoRef::parse(&project.github_url)?;
    let github = &ctx.config.github;
    let generation = &ctx.config.generation;
    let ignore = IgnoreRules::new(&github.ignore_globs)?;

    progress.report(IngestProgressEvent::Discovering {
        project_id: project.id.clone(),
    });

    let listed = ctx.source.list_files(&repo, &project.branch).await?;
    let mut stats = IngestStats {
        files_listed: listed.len() as u64,
        ..IngestStats::default()
    };

    let eligible: Vec<_> = listed
        .into_iter()
        .filter(|f| !ignore.is_ignored(&f.path) && f.size <= github.max_file_bytes)
        .collect();
    stats.files_ignored = stats.files_listed - eligible.len() as u64;

    tracing::info!(
        project_id = %project.id,
        repo = %repo,
        files = eligible.len(),
        ignored = stats.files_ignored,
        "indexing repository"
    );

    let total = eligible.len() as u64;
    for (i, file) in eligible.iter().enumerate() {
        progress.report(IngestProgressEvent::FileStarted {
            project_id: project.id.clone(),
            file: file.path.clone(),
            n: i as u64 + 1,
            total,
        });

        let source = match ctx.source.fetch_file(&repo, &file.path, &project.branch).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!(file = %file.path, "skipping non-text file");
                stats.files_skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "failed to fetch file");
                stats.files_skipped += 1;
                continue;
            }
        };

        let prompt = file_summary_prompt(&file.path, &source, generation.max_source_chars);
        let summary = match ctx.generator.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "summary failed, storing without one");
                stats.summary_failures += 1;
                String::new()
            }
        };

        let embed_input = if summary.is_empty() {
            truncate_utf8(&source, generation.max_source_chars)
        } else {
            summary.as_str()
        };
        let embedding = match ctx.embedder.embed(embed_input).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "embedding failed, skipping file");
                stats.embed_failures += 1;
                continue;
            }
        };

        let chunk = ContentChunk::new(&project.id, &file.path, source, summary, embedding);
        ctx.store.insert_chunk(&chunk).await?;
        stats.files_indexed += 1;
    }

    let tree = build_file_tree(eligible.iter().map(|f| f.path.as_str()));
    ctx.store.set_file_tree(&project.id, &tree).await?;

    progress.report(IngestProgressEvent::Finished {
        project_id: project.id.clone(),
        files_indexed: stats.files_indexed,
        files_skipped: stats.files_skipped,
        embed_failures: stats.embed_failures,
    });

    Ok(stats)
}

/// `rlens index <project-id>`: index and print a report.
pub async fn run_index(
    ctx: &AppContext,
    project_id: &str,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let project = ctx.project(project_id).await?;
    let stats = index_project(ctx, &project, progress).await?;
    print_report(&project, &stats);
    Ok(())
}

pub fn print_report(project: &Project, stats: &IngestStats) {
    println!("index {}", project.name);
    println!("  files listed: {}", stats.files_listed);
    println!("  files ignored: {}", stats.files_ignored);
    println!("  files indexed: {}", stats.files_indexed);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  summary failures: {}", stats.summary_failures);
    println!("  embedding failures: {}", stats.embed_failures);
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{IngestPhase, NoProgress};
    use crate::test_support::*;
    use repolens_core::tree::NodeKind;
    use std::sync::Arc;

    async fn seeded(repo: FakeRepo) -> (AppContext, Project, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new(&["login", "token"]));
        let generator = Arc::new(ScriptedGenerator::new("Handles login tokens."));
        let ctx = context(repo, embedder.clone(), generator);
        let project = Project::new("widgets", REPO_URL, "main");
        ctx.store.create_project(&project).await.unwrap();
        (ctx, project, embedder)
    }

    #[tokio::test]
    async fn indexes_files_and_stores_tree() {
        let repo = FakeRepo::with_files(&[
            ("src/auth.ts", "export function login() {}"),
            ("src/util/token.ts", "export const token = 1;"),
            ("package-lock.json", "{}"),
            ("assets/logo.png", "png"),
        ]);
        let (ctx, project, embedder) = seeded(repo).await;

        let stats = index_project(&ctx, &project, &NoProgress).await.unwrap();
        assert_eq!(stats.files_listed, 4);
        assert_eq!(stats.files_ignored, 2);
        assert_eq!(stats.files_indexed, 2);

        let chunks = ctx.store.list_chunks(&project.id).await.unwrap();
        let names: Vec<_> = chunks.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["src/auth.ts", "src/util/token.ts"]);
        assert_eq!(chunks[0].summary, "Handles login tokens.");
        // The summary is what gets embedded.
        assert_eq!(embedder.calls.lock().unwrap()[0], "Handles login tokens.");

        let tree = ctx.store.get_file_tree(&project.id).await.unwrap().unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "src");
        assert_eq!(tree[0].kind, NodeKind::Folder);
    }

    #[tokio::test]
    async fn summary_failure_embeds_source_head() {
        let repo = FakeRepo::with_files(&[("src/a.ts", "// FAIL_SUMMARY\nlogin()")]);
        let (ctx, project, embedder) = seeded(repo).await;

        let stats = index_project(&ctx, &project, &NoProgress).await.unwrap();
        assert_eq!(stats.summary_failures, 1);
        assert_eq!(stats.files_indexed, 1);

        let chunks = ctx.store.list_chunks(&project.id).await.unwrap();
        assert_eq!(chunks[0].summary, "");
        assert_eq!(embedder.calls.lock().unwrap()[0], "// FAIL_SUMMARY\nlogin()");
    }

    #[tokio::test]
    async fn embedding_failure_skips_file_but_run_continues() {
        let repo = FakeRepo::with_files(&[
            ("bad.ts", "FAIL_SUMMARY FAIL_EMBED"),
            ("good.ts", "login"),
        ]);
        let (ctx, project, _) = seeded(repo).await;

        let stats = index_project(&ctx, &project, &NoProgress).await.unwrap();
        assert_eq!(stats.embed_failures, 1);
        assert_eq!(stats.files_indexed, 1);
        let chunks = ctx.store.list_chunks(&project.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_name, "good.ts");
    }

    #[tokio::test]
    async fn binary_and_oversize_files_are_not_indexed() {
        let mut repo = FakeRepo::with_files(&[("ok.rs", "fn main() {}")]);
        repo.files.push(("blob.bin".into(), None));
        repo.files.push(("huge.rs".into(), Some("x".repeat(300_000))));
        let (ctx, project, _) = seeded(repo).await;

        let stats = index_project(&ctx, &project, &NoProgress).await.unwrap();
        assert_eq!(stats.files_ignored, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.files_indexed, 1);
    }

    #[tokio::test]
    async fn status_board_ends_finished() {
        let repo = FakeRepo::with_files(&[("a.rs", "fn a() {}"), ("b.rs", "fn b() {}")]);
        let (ctx, project, _) = seeded(repo).await;

        index_project(&ctx, &project, ctx.status.as_ref()).await.unwrap();
        let status = ctx.status.get(&project.id).unwrap();
        assert_eq!(status.phase, IngestPhase::Finished);
        assert_eq!(status.current_file, None);
        assert_eq!((status.n, status.total), (2, 2));
        assert_eq!(status.files_indexed, 2);
    }
}
