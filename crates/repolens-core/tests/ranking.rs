//! Ranking, context assembly and prompt building end to end.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use repolens_core::context::{build_answer_context, DEFAULT_CONTEXT_BUDGET_CHARS};
use repolens_core::embedding::EmbeddingProvider;
use repolens_core::error::UpstreamError;
use repolens_core::generation::{answer_prompt, NO_ANSWER};
use repolens_core::models::ContentChunk;
use repolens_core::search::{blend, order_by_score, rank_project, RankParams, ScoredChunk};
use repolens_core::store::memory::InMemoryStore;
use repolens_core::store::Store;

struct FixedEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dims(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

struct ExhaustedEmbedder;

#[async_trait]
impl EmbeddingProvider for ExhaustedEmbedder {
    fn model_name(&self) -> &str {
        "exhausted"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, UpstreamError> {
        Err(UpstreamError::QuotaExhausted)
    }
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    let chunks = [
        ("src/auth.ts", "export function login(user, password)", "Handles login.", vec![1.0, 0.0]),
        ("src/db.ts", "export const pool = createPool()", "Database pool.", vec![0.0, 1.0]),
        ("README.md", "# Demo", "Project readme.", vec![0.7, 0.7]),
    ];
    for (name, source, summary, embedding) in chunks {
        let c = ContentChunk::new("p1", name, source.into(), summary.into(), embedding);
        store.insert_chunk(&c).await.unwrap();
    }
    store
}

#[test]
fn test_blended_scenario_orders_by_score() {
    let params = RankParams::default();
    let make = |name: &str, semantic: f64, lexical: f64| ScoredChunk {
        chunk: ContentChunk::new("p1", name, String::new(), String::new(), vec![]),
        semantic_score: semantic,
        lexical_score: lexical,
        score: blend(semantic, lexical, &params),
    };

    let ranked = order_by_score(vec![make("b.ts", 0.1, 0.9), make("a.ts", 0.9, 0.2)], 10);
    assert_eq!(ranked[0].chunk.file_name, "a.ts");
    assert!((ranked[0].score - 0.62).abs() < 1e-9);
    assert_eq!(ranked[1].chunk.file_name, "b.ts");
    assert!((ranked[1].score - 0.42).abs() < 1e-9);
}

#[tokio::test]
async fn test_rank_project_prefers_semantic_and_lexical_match() {
    let store = seeded_store().await;
    let embedder = FixedEmbedder::new(vec![1.0, 0.0]);

    let ranked = rank_project(&store, &embedder, "p1", "how does login work", &RankParams::default())
        .await
        .unwrap();

    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].chunk.file_name, "src/auth.ts");
    assert_eq!(ranked[2].chunk.file_name, "src/db.ts");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_query_skips_embedding() {
    let store = seeded_store().await;
    let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
    let ranked = rank_project(&store, &embedder, "p1", "   ", &RankParams::default())
        .await
        .unwrap();
    assert!(ranked.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_corpus_still_yields_prompt_with_fallback_instruction() {
    let store = InMemoryStore::new();
    let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
    let ranked = rank_project(&store, &embedder, "nothing", "where is main?", &RankParams::default())
        .await
        .unwrap();
    assert!(ranked.is_empty());

    let ctx = build_answer_context(&ranked, DEFAULT_CONTEXT_BUDGET_CHARS);
    assert!(ctx.is_empty());

    let prompt = answer_prompt("where is main?", &ctx.text);
    assert!(prompt.contains(NO_ANSWER));
}

#[tokio::test]
async fn test_quota_exhaustion_propagates_typed() {
    let store = seeded_store().await;
    let err = rank_project(&store, &ExhaustedEmbedder, "p1", "login", &RankParams::default())
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<UpstreamError>(),
        Some(&UpstreamError::QuotaExhausted)
    );
}

#[tokio::test]
async fn test_limit_applies() {
    let store = seeded_store().await;
    let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
    let params = RankParams {
        limit: 1,
        ..RankParams::default()
    };
    let ranked = rank_project(&store, &embedder, "p1", "login", &params)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 1);
}
