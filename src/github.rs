//! GitHub REST client.
//!
//! Covers the four reads RepoLens needs: the recursive file tree of a
//! branch, a file's contents, the latest commits, and a commit's diff.
//! Authenticates with a personal access token when `[github] token_env`
//! names a set variable; public repositories work without one.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;

use crate::config::GithubConfig;

/// Shown for commits whose author has no GitHub account.
pub const DEFAULT_AVATAR: &str = "https://avatars.githubusercontent.com/u/19948365?v=4";

/// `owner/repo` parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Accepts `https://github.com/owner/repo`, with or without a trailing
    /// slash or `.git` suffix, and extra path segments after the repo.
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        let path = trimmed
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(trimmed);
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        let host = segments.next().unwrap_or_default();
        if !host.contains("github") {
            bail!("Not a GitHub URL: {}", url);
        }
        let owner = segments.next();
        let repo = segments.next().map(|r| r.trim_end_matches(".git"));
        match (owner, repo) {
            (Some(owner), Some(repo)) if !repo.is_empty() => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => bail!("Invalid GitHub URL (expected https://github.com/<owner>/<repo>): {}", url),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A blob entry of a repository tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub size: u64,
}

/// Commit metadata as listed by the commits API.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    pub date: DateTime<Utc>,
}

/// Path filter built from `[github] ignore_globs`.
pub struct IgnoreRules {
    set: GlobSet,
}

impl IgnoreRules {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(
                Glob::new(pattern).with_context(|| format!("Invalid ignore glob: {}", pattern))?,
            );
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

/// Read access to a hosted repository.
///
/// [`GithubClient`] is the production implementation; the ingestion and
/// commit pipelines take `&dyn RepoSource` so they can run against fixtures.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// All blobs of `branch`, in tree order.
    async fn list_files(&self, repo: &RepoRef, branch: &str) -> Result<Vec<RepoFile>>;

    /// Text content of one file, or `None` for non-UTF-8 content.
    async fn fetch_file(&self, repo: &RepoRef, path: &str, branch: &str)
        -> Result<Option<String>>;

    /// The latest commits of `branch`, newest first, at most `limit`.
    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
    ) -> Result<Vec<CommitInfo>>;

    /// Unified diff of one commit.
    async fn fetch_diff(&self, repo: &RepoRef, sha: &str) -> Result<String>;
}

pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    web_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::with_token(config, token)
    }

    pub fn with_token(config: &GithubConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        let mut req = self.client.get(url).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, url, body.trim());
        }
        Ok(resp)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self.get(url, "application/vnd.github+json").await?;
        resp.json()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))
    }
}

#[async_trait]
impl RepoSource for GithubClient {
    async fn list_files(&self, repo: &RepoRef, branch: &str) -> Result<Vec<RepoFile>> {
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_url, repo, branch
        );
        let json = self.get_json(&url).await?;
        if json.get("truncated").and_then(Value::as_bool) == Some(true) {
            tracing::warn!(repo = %repo, "GitHub truncated the file tree; some files will be missing");
        }
        parse_tree(&json)
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/contents/{}?ref={}",
            self.api_url, repo, path, branch
        );
        let json = self.get_json(&url).await?;
        decode_content(&json)
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        let url = format!(
            "{}/repos/{}/commits?sha={}&per_page={}",
            self.api_url,
            repo,
            branch,
            limit.clamp(1, 100)
        );
        let json = self.get_json(&url).await?;
        let mut commits = parse_commits(&json)?;
        commits.sort_by(|a, b| b.date.cmp(&a.date));
        commits.truncate(limit);
        Ok(commits)
    }

    async fn fetch_diff(&self, repo: &RepoRef, sha: &str) -> Result<String> {
        let url = format!("{}/{}/commit/{}.diff", self.web_url, repo, sha);
        let resp = self.get(&url, "application/vnd.github.v3.diff").await?;
        Ok(resp.text().await?)
    }
}

fn parse_tree(json: &Value) -> Result<Vec<RepoFile>> {
    let entries = json
        .get("tree")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid tree response: missing tree array"))?;

    Ok(entries
        .iter()
        .filter(|e| e.get("type").and_then(Value::as_str) == Some("blob"))
        .filter_map(|e| {
            Some(RepoFile {
                path: e.get("path")?.as_str()?.to_string(),
                size: e.get("size").and_then(Value::as_u64).unwrap_or(0),
            })
        })
        .collect())
}

fn decode_content(json: &Value) -> Result<Option<String>> {
    let encoding = json.get("encoding").and_then(Value::as_str).unwrap_or("");
    let content = json
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Invalid contents response: missing content"))?;

    if encoding != "base64" {
        return Ok(Some(content.to_string()));
    }

    // GitHub wraps base64 at 60 columns.
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .with_context(|| "Invalid base64 in contents response")?;
    Ok(String::from_utf8(bytes).ok())
}

fn parse_commits(json: &Value) -> Result<Vec<CommitInfo>> {
    let items = json
        .as_array()
        .ok_or_else(|| anyhow!("Invalid commits response: expected an array"))?;

    items
        .iter()
        .map(|item| {
            let sha = item
                .get("sha")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Invalid commits response: missing sha"))?;
            let commit = item.get("commit");
            let author = commit.and_then(|c| c.get("author"));
            let str_at = |v: Option<&Value>, key: &str| {
                v.and_then(|v| v.get(key))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            };

            let date = author
                .and_then(|a| a.get("date"))
                .and_then(Value::as_str)
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_default();
            let avatar = item
                .get("author")
                .and_then(|a| a.get("avatar_url"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_AVATAR)
                .to_string();

            Ok(CommitInfo {
                sha: sha.to_string(),
                message: str_at(commit, "message"),
                author_name: str_at(author, "name"),
                author_avatar: avatar,
                date,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_repo_urls() {
        let expected = RepoRef {
            owner: "acme".into(),
            repo: "widgets".into(),
        };
        assert_eq!(RepoRef::parse("https://github.com/acme/widgets").unwrap(), expected);
        assert_eq!(RepoRef::parse("https://github.com/acme/widgets/").unwrap(), expected);
        assert_eq!(RepoRef::parse("https://github.com/acme/widgets.git").unwrap(), expected);
        assert_eq!(
            RepoRef::parse("github.com/acme/widgets/tree/main").unwrap(),
            expected
        );
        assert_eq!(expected.to_string(), "acme/widgets");
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(RepoRef::parse("https://github.com/acme").is_err());
        assert!(RepoRef::parse("https://gitlab.com/acme/widgets").is_err());
        assert!(RepoRef::parse("").is_err());
    }

    #[test]
    fn default_ignores_skip_locks_and_media() {
        let rules = IgnoreRules::new(&crate::config::GithubConfig::default().ignore_globs).unwrap();
        assert!(rules.is_ignored("package-lock.json"));
        assert!(rules.is_ignored("web/yarn.lock"));
        assert!(rules.is_ignored("node_modules/react/index.js"));
        assert!(rules.is_ignored("dist/bundle.js"));
        assert!(rules.is_ignored("assets/logo.png"));
        assert!(rules.is_ignored("reports/sales.pbix"));
        assert!(!rules.is_ignored("src/main.rs"));
        assert!(!rules.is_ignored("README.md"));
    }

    #[test]
    fn tree_keeps_only_blobs() {
        let json = json!({
            "tree": [
                { "path": "src", "type": "tree" },
                { "path": "src/lib.rs", "type": "blob", "size": 120 },
                { "path": "README.md", "type": "blob" }
            ],
            "truncated": false
        });
        let files = parse_tree(&json).unwrap();
        assert_eq!(
            files,
            vec![
                RepoFile { path: "src/lib.rs".into(), size: 120 },
                RepoFile { path: "README.md".into(), size: 0 },
            ]
        );
        assert!(parse_tree(&json!({})).is_err());
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = STANDARD.encode("fn main() {}\n");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        let json = json!({ "encoding": "base64", "content": wrapped });
        assert_eq!(decode_content(&json).unwrap().as_deref(), Some("fn main() {}\n"));

        let binary = json!({ "encoding": "base64", "content": STANDARD.encode([0xff, 0xfe, 0x00]) });
        assert_eq!(decode_content(&binary).unwrap(), None);
    }

    #[test]
    fn parses_commit_list() {
        let json = json!([
            {
                "sha": "abc123",
                "commit": {
                    "message": "Fix login",
                    "author": { "name": "Ada", "date": "2024-05-01T10:00:00Z" }
                },
                "author": { "avatar_url": "https://avatars/ada" }
            },
            {
                "sha": "def456",
                "commit": { "message": "Init", "author": { "name": "Bob", "date": "2024-04-01T10:00:00Z" } },
                "author": null
            }
        ]);
        let commits = parse_commits(&json).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abc123");
        assert_eq!(commits[0].author_name, "Ada");
        assert_eq!(commits[0].author_avatar, "https://avatars/ada");
        assert_eq!(commits[1].author_avatar, DEFAULT_AVATAR);
        assert!(commits[0].date > commits[1].date);
    }
}
