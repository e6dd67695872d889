//! TOML configuration.
//!
//! Loaded once per command from `--config` (default `./config/repolens.toml`)
//! and validated in [`load_config`]. API keys are never stored in the file;
//! each key pool names the environment variables to read them from.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use repolens_core::context::DEFAULT_CONTEXT_BUDGET_CHARS;
use repolens_core::search::{
    RankMode, RankParams, DEFAULT_COSINE_FLOOR, DEFAULT_FINAL_LIMIT, DEFAULT_LEXICAL_WEIGHT,
    DEFAULT_SEMANTIC_WEIGHT,
};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    /// Environment variable holding a personal access token. Optional;
    /// unauthenticated requests work for public repositories.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_ignore_globs")]
    pub ignore_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_commit_limit")]
    pub commit_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            default_branch: default_branch(),
            ignore_globs: default_ignore_globs(),
            max_file_bytes: default_max_file_bytes(),
            commit_limit: default_commit_limit(),
            timeout_secs: default_timeout_secs(),
            api_url: default_api_url(),
            web_url: default_web_url(),
        }
    }
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_ignore_globs() -> Vec<String> {
    [
        "**/package-lock.json",
        "**/yarn.lock",
        "**/pnpm-lock.yaml",
        "**/bun.lockb",
        "**/Cargo.lock",
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/*.{png,jpg,jpeg,gif,svg,ico,webp,bmp}",
        "**/*.{mp4,mp3,wav,mov,avi}",
        "**/*.{pdf,zip,gz,tar,pbix}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_bytes() -> u64 {
    200_000
}
fn default_commit_limit() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_web_url() -> String {
    "https://github.com".to_string()
}

/// Where a provider's API keys come from.
///
/// Keys are read from `{env_prefix}1` through `{env_prefix}{max_keys}`;
/// unset or empty variables are skipped.
#[derive(Debug, Deserialize, Clone)]
pub struct KeyPoolConfig {
    pub env_prefix: String,
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    #[serde(default)]
    pub fallback_env: Option<String>,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// How long a caller may sleep for a key to free up before giving up
    /// with `quota_exhausted`. Zero means fail immediately.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl KeyPoolConfig {
    fn gemini() -> Self {
        Self {
            env_prefix: "GEMINI_API_KEY_".to_string(),
            max_keys: default_max_keys(),
            fallback_env: Some("GEMINI_GOLDEN_KEY".to_string()),
            cooldown_secs: default_cooldown_secs(),
            throttle_ms: default_throttle_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }

    fn groq() -> Self {
        Self {
            env_prefix: "GROQ_API_KEY_".to_string(),
            fallback_env: Some("GROQ_API_KEY".to_string()),
            ..Self::gemini()
        }
    }
}

pub const MAX_COOLDOWN_SECS: u64 = 86_400;
pub const MAX_THROTTLE_MS: u64 = 60_000;

fn default_max_keys() -> usize {
    23
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_throttle_ms() -> u64 {
    1000
}
fn default_max_wait_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Overrides the provider's default API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "KeyPoolConfig::gemini")]
    pub keys: KeyPoolConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            keys: KeyPoolConfig::gemini(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_base(&self) -> &str {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url,
            (None, "gemini") => GEMINI_API_URL,
            (None, _) => OPENAI_API_URL,
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_embedding_dims() -> usize {
    768
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    /// Overrides the provider's default API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
    #[serde(default = "default_commit_pause_ms")]
    pub commit_pause_ms: u64,
    #[serde(default = "KeyPoolConfig::groq")]
    pub keys: KeyPoolConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            max_source_chars: default_max_source_chars(),
            max_diff_chars: default_max_diff_chars(),
            commit_pause_ms: default_commit_pause_ms(),
            keys: KeyPoolConfig::groq(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_base(&self) -> &str {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url,
            (None, "gemini") => GEMINI_API_URL,
            (None, _) => GROQ_API_URL,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "moonshotai/kimi-k2-instruct".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_source_chars() -> usize {
    40_000
}
fn default_max_diff_chars() -> usize {
    8_000
}
fn default_commit_pause_ms() -> u64 {
    2_500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_cosine_floor")]
    pub cosine_floor: f64,
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            final_limit: default_final_limit(),
            mode: default_mode(),
            cosine_floor: default_cosine_floor(),
            context_budget_chars: default_context_budget(),
        }
    }
}

impl RetrievalConfig {
    /// Ranking parameters, with `limit` overriding `final_limit` when given.
    pub fn rank_params(&self, limit: Option<usize>) -> Result<RankParams> {
        Ok(RankParams {
            semantic_weight: self.semantic_weight,
            lexical_weight: self.lexical_weight,
            limit: limit.unwrap_or(self.final_limit),
            mode: self.mode.parse::<RankMode>()?,
            cosine_floor: self.cosine_floor,
        })
    }
}

fn default_semantic_weight() -> f64 {
    DEFAULT_SEMANTIC_WEIGHT
}
fn default_lexical_weight() -> f64 {
    DEFAULT_LEXICAL_WEIGHT
}
fn default_final_limit() -> usize {
    DEFAULT_FINAL_LIMIT
}
fn default_mode() -> String {
    RankMode::Hybrid.to_string()
}
fn default_cosine_floor() -> f64 {
    DEFAULT_COSINE_FLOOR
}
fn default_context_budget() -> usize {
    DEFAULT_CONTEXT_BUDGET_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.final_limit < 1 {
        bail!("retrieval.final_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.semantic_weight) {
        bail!("retrieval.semantic_weight must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.lexical_weight) {
        bail!("retrieval.lexical_weight must be in [0.0, 1.0]");
    }
    if r.semantic_weight == 0.0 && r.lexical_weight == 0.0 {
        bail!("retrieval.semantic_weight and retrieval.lexical_weight must not both be 0");
    }
    if r.context_budget_chars == 0 {
        bail!("retrieval.context_budget_chars must be > 0");
    }
    r.mode
        .parse::<RankMode>()
        .with_context(|| "Invalid retrieval.mode")?;

    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    for (name, keys) in [
        ("embedding", &config.embedding.keys),
        ("generation", &config.generation.keys),
    ] {
        if keys.env_prefix.trim().is_empty() {
            bail!("{}.keys.env_prefix must not be empty", name);
        }
        if keys.cooldown_secs > MAX_COOLDOWN_SECS {
            bail!(
                "{}.keys.cooldown_secs must be <= {} (one day)",
                name,
                MAX_COOLDOWN_SECS
            );
        }
        if keys.throttle_ms > MAX_THROTTLE_MS {
            bail!(
                "{}.keys.throttle_ms must be <= {} (one minute)",
                name,
                MAX_THROTTLE_MS
            );
        }
    }

    if config.github.commit_limit == 0 {
        bail!("github.commit_limit must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse("[db]\npath = \"./data/r.sqlite\"\n").unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.retrieval.final_limit, 10);
        assert_eq!(cfg.embedding.keys.env_prefix, "GEMINI_API_KEY_");
        assert_eq!(cfg.embedding.keys.max_keys, 23);
        assert_eq!(
            cfg.embedding.keys.fallback_env.as_deref(),
            Some("GEMINI_GOLDEN_KEY")
        );
        assert_eq!(cfg.generation.keys.env_prefix, "GROQ_API_KEY_");
        assert_eq!(cfg.generation.commit_pause_ms, 2500);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.generation.api_base(), GROQ_API_URL);

        let params = cfg.retrieval.rank_params(None).unwrap();
        assert_eq!(params, RankParams::default());
        assert_eq!(cfg.retrieval.rank_params(Some(3)).unwrap().limit, 3);
    }

    #[test]
    fn rejects_bad_retrieval() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        assert!(parse(&format!("{}[retrieval]\nfinal_limit = 0\n", base)).is_err());
        assert!(parse(&format!("{}[retrieval]\nsemantic_weight = 1.5\n", base)).is_err());
        assert!(parse(&format!(
            "{}[retrieval]\nsemantic_weight = 0.0\nlexical_weight = 0.0\n",
            base
        ))
        .is_err());
        assert!(parse(&format!("{}[retrieval]\nmode = \"fuzzy\"\n", base)).is_err());
        assert!(parse(&format!("{}[retrieval]\nmode = \"cosine-threshold\"\n", base)).is_ok());
    }

    #[test]
    fn rejects_unknown_providers() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        let err = parse(&format!("{}[embedding]\nprovider = \"magic\"\n", base)).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
        assert!(parse(&format!("{}[generation]\nprovider = \"magic\"\n", base)).is_err());
        assert!(parse(&format!(
            "{}[embedding]\nprovider = \"gemini\"\ndims = 0\n",
            base
        ))
        .is_err());
    }

    #[test]
    fn rejects_out_of_range_key_timings() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        let err = parse(&format!(
            "{}[embedding.keys]\ncooldown_secs = 86401\n",
            base
        ))
        .unwrap_err();
        assert!(err.to_string().contains("embedding.keys.cooldown_secs"), "{}", err);

        let err = parse(&format!("{}[generation.keys]\nthrottle_ms = 60001\n", base)).unwrap_err();
        assert!(err.to_string().contains("generation.keys.throttle_ms"), "{}", err);

        let cfg = parse(&format!(
            "{}[embedding.keys]\ncooldown_secs = 86400\nthrottle_ms = 60000\n",
            base
        ))
        .unwrap();
        assert_eq!(cfg.embedding.keys.cooldown_secs, MAX_COOLDOWN_SECS);
    }

    #[test]
    fn key_pool_overrides() {
        let cfg = parse(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[embedding.keys]
env_prefix = "OPENAI_KEY_"
max_keys = 4
cooldown_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(cfg.embedding.keys.env_prefix, "OPENAI_KEY_");
        assert_eq!(cfg.embedding.keys.max_keys, 4);
        assert_eq!(cfg.embedding.keys.cooldown_secs, 30);
        assert_eq!(cfg.embedding.keys.throttle_ms, 1000);
        assert_eq!(cfg.embedding.keys.fallback_env, None);
        assert_eq!(cfg.embedding.api_base(), OPENAI_API_URL);
    }
}
