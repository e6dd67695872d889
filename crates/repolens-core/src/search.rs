//! Hybrid retrieval ranker.
//!
//! Scores every chunk of a project against a question and returns the best
//! matches in rank order. Works entirely through the [`Store`] and
//! [`EmbeddingProvider`] traits; the caller supplies both.
//!
//! # Scoring
//!
//! ```text
//! semantic = cosine(query_vec, chunk.embedding)          0 for degenerate vectors
//! lexical  = bm25(query, chunk.source + " " + summary)   squashed to [0, 1)
//! score    = 0.6 × semantic + 0.4 × lexical              weights configurable
//! ```
//!
//! Results are stably sorted by `score` descending (equal scores keep corpus
//! order) and truncated to the limit.
//!
//! [`RankMode::CosineThreshold`] is the alternate mode: pure cosine score,
//! chunks at or below the floor (default `0.1`) dropped.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::lexical::LexicalIndex;
use crate::models::{ContentChunk, FileReference};
use crate::store::Store;

pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.6;
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 0.4;
pub const DEFAULT_FINAL_LIMIT: usize = 10;
pub const DEFAULT_COSINE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankMode {
    #[default]
    Hybrid,
    CosineThreshold,
}

impl FromStr for RankMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hybrid" => Ok(RankMode::Hybrid),
            "cosine-threshold" => Ok(RankMode::CosineThreshold),
            other => bail!(
                "Unknown retrieval mode: {}. Use hybrid or cosine-threshold.",
                other
            ),
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankMode::Hybrid => write!(f, "hybrid"),
            RankMode::CosineThreshold => write!(f, "cosine-threshold"),
        }
    }
}

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RankParams {
    pub semantic_weight: f64,
    pub lexical_weight: f64,
    /// Maximum results returned.
    pub limit: usize,
    pub mode: RankMode,
    /// Only used by [`RankMode::CosineThreshold`].
    pub cosine_floor: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
            limit: DEFAULT_FINAL_LIMIT,
            mode: RankMode::Hybrid,
            cosine_floor: DEFAULT_COSINE_FLOOR,
        }
    }
}

/// A chunk with its per-query scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ContentChunk,
    pub semantic_score: f64,
    pub lexical_score: f64,
    pub score: f64,
}

impl ScoredChunk {
    pub fn to_reference(&self) -> FileReference {
        FileReference {
            file_name: self.chunk.file_name.clone(),
            source_code: self.chunk.source_code.clone(),
            summary: self.chunk.summary.clone(),
            score: self.score,
        }
    }
}

/// Weighted blend of the two signals.
pub fn blend(semantic: f64, lexical: f64, params: &RankParams) -> f64 {
    params.semantic_weight * semantic + params.lexical_weight * lexical
}

/// Score every chunk of `corpus`, preserving corpus order.
///
/// In [`RankMode::CosineThreshold`] chunks with cosine `<= cosine_floor`
/// are dropped and the lexical score is not computed.
pub fn score_corpus(
    query: &str,
    query_vec: &[f32],
    corpus: Vec<ContentChunk>,
    params: &RankParams,
) -> Vec<ScoredChunk> {
    if corpus.is_empty() {
        return Vec::new();
    }
    match params.mode {
        RankMode::Hybrid => {
            let texts: Vec<String> = corpus.iter().map(ContentChunk::lexical_text).collect();
            let index = LexicalIndex::build(texts.iter().map(String::as_str));
            let terms = index.query(query);

            corpus
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let semantic_score = cosine_similarity(query_vec, &chunk.embedding);
                    let lexical_score = index.relevance(i, &terms);
                    ScoredChunk {
                        score: blend(semantic_score, lexical_score, params),
                        chunk,
                        semantic_score,
                        lexical_score,
                    }
                })
                .collect()
        }
        RankMode::CosineThreshold => corpus
            .into_iter()
            .filter_map(|chunk| {
                let semantic_score = cosine_similarity(query_vec, &chunk.embedding);
                (semantic_score > params.cosine_floor).then_some(ScoredChunk {
                    chunk,
                    semantic_score,
                    lexical_score: 0.0,
                    score: semantic_score,
                })
            })
            .collect(),
    }
}

/// Stable descending sort by `score`, then truncate to `limit`.
pub fn order_by_score(mut scored: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Score and order an already loaded corpus.
pub fn rank(
    query: &str,
    query_vec: &[f32],
    corpus: Vec<ContentChunk>,
    params: &RankParams,
) -> Vec<ScoredChunk> {
    order_by_score(score_corpus(query, query_vec, corpus, params), params.limit)
}

/// Rank a project's stored chunks for `query`.
///
/// A blank query or an empty corpus yields an empty result without calling
/// the embedding provider. Embedding failures (including
/// [`UpstreamError::QuotaExhausted`](crate::error::UpstreamError::QuotaExhausted))
/// propagate and can be recovered with `downcast_ref`.
pub async fn rank_project<S, E>(
    store: &S,
    embedder: &E,
    project_id: &str,
    query: &str,
    params: &RankParams,
) -> Result<Vec<ScoredChunk>>
where
    S: Store + ?Sized,
    E: EmbeddingProvider + ?Sized,
{
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let corpus = store.list_chunks(project_id).await?;
    if corpus.is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embedder.embed(query).await?;
    tracing::debug!(
        project_id,
        corpus = corpus.len(),
        mode = %params.mode,
        "ranking chunks"
    );

    Ok(rank(query, &query_vec, corpus, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(name: &str, source: &str, embedding: Vec<f32>) -> ContentChunk {
        ContentChunk::new("p", name, source.to_string(), String::new(), embedding)
    }

    fn scored(name: &str, semantic: f64, lexical: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk(name, "", vec![]),
            semantic_score: semantic,
            lexical_score: lexical,
            score: blend(semantic, lexical, &RankParams::default()),
        }
    }

    fn names(ranked: &[ScoredChunk]) -> Vec<&str> {
        ranked.iter().map(|s| s.chunk.file_name.as_str()).collect()
    }

    #[test]
    fn blend_uses_default_weights() {
        let p = RankParams::default();
        assert!((blend(0.9, 0.2, &p) - 0.62).abs() < 1e-9);
        assert!((blend(0.1, 0.9, &p) - 0.42).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_keep_corpus_order() {
        let ranked = order_by_score(
            vec![scored("a", 0.5, 0.5), scored("b", 0.5, 0.5), scored("c", 0.9, 0.0)],
            10,
        );
        assert_eq!(names(&ranked), vec!["c", "a", "b"]);
    }

    #[test]
    fn nan_score_does_not_disturb_order() {
        let mut broken = scored("nan", 0.0, 0.0);
        broken.score = f64::NAN;
        let ranked = order_by_score(
            vec![scored("a", 0.2, 0.0), broken, scored("b", 0.8, 0.0), scored("c", 0.2, 0.0)],
            10,
        );
        let finite: Vec<&str> = names(&ranked)
            .into_iter()
            .filter(|n| *n != "nan")
            .collect();
        assert_eq!(finite, vec!["b", "a", "c"]);
    }

    #[test]
    fn truncates_to_limit() {
        let all: Vec<ScoredChunk> = (0..15)
            .map(|i| scored(&format!("f{}", i), i as f64 / 15.0, 0.0))
            .collect();
        let ranked = order_by_score(all, DEFAULT_FINAL_LIMIT);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].chunk.file_name, "f14");
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let corpus = vec![
            chunk("auth.ts", "export function login(user) { return token }", vec![1.0, 0.0]),
            chunk("db.ts", "connect to postgres", vec![0.0, 1.0]),
            chunk("zero.ts", "login login login", vec![0.0, 0.0]),
        ];
        let ranked = rank("login", &[1.0, 0.0], corpus, &RankParams::default());
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk.file_name, "auth.ts");
        for s in &ranked {
            assert!((0.0..=1.0).contains(&s.score), "score {}", s.score);
            assert!(s.lexical_score < 1.0);
        }
        let zero = ranked.iter().find(|s| s.chunk.file_name == "zero.ts").unwrap();
        assert_eq!(zero.semantic_score, 0.0);
        assert!(zero.lexical_score > 0.0);
    }

    #[test]
    fn cosine_threshold_drops_weak_matches() {
        let params = RankParams {
            mode: RankMode::CosineThreshold,
            ..RankParams::default()
        };
        let corpus = vec![
            chunk("near.ts", "", vec![1.0, 0.1]),
            chunk("orthogonal.ts", "", vec![0.0, 1.0]),
            chunk("mismatched.ts", "", vec![1.0]),
        ];
        let ranked = rank("anything", &[1.0, 0.0], corpus, &params);
        assert_eq!(names(&ranked), vec!["near.ts"]);
        assert_eq!(ranked[0].score, ranked[0].semantic_score);
    }

    #[test]
    fn empty_corpus_ranks_nothing() {
        assert!(rank("q", &[1.0], Vec::new(), &RankParams::default()).is_empty());
    }

    #[test]
    fn mode_parses_and_displays() {
        assert_eq!("hybrid".parse::<RankMode>().unwrap(), RankMode::Hybrid);
        assert_eq!(
            "cosine-threshold".parse::<RankMode>().unwrap(),
            RankMode::CosineThreshold
        );
        assert!("fuzzy".parse::<RankMode>().is_err());
        assert_eq!(RankMode::CosineThreshold.to_string(), "cosine-threshold");
    }
}
