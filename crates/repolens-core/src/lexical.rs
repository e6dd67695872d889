//! Lexical relevance scoring (BM25) over a project's chunks.
//!
//! Each chunk is scored against the query using Okapi BM25 fitted to the
//! project corpus (the `bm25` crate's embedder and scorer), then squashed
//! into `[0, 1)` with `s / (s + 1)` so it can be blended with cosine
//! similarity.
//!
//! Tokenization is tuned for source code: identifiers are split at
//! underscores and camelCase boundaries while the whole identifier is kept
//! as well, so `getUserName` matches queries for `user` and `getusername`.

use bm25::{Embedder, EmbedderBuilder, Embedding, Scorer, Tokenizer};

/// Term-frequency saturation.
pub const BM25_K1: f32 = 1.2;
/// Length normalization.
pub const BM25_B: f32 = 0.75;

const MIN_TOKEN_LEN: usize = 2;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "does", "do", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with",
];

/// Splits source text into lowercase search terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeTokenizer;

impl Tokenizer for CodeTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for word in input_text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            let parts = split_identifier(word);
            if parts.len() > 1 {
                push_term(&mut out, &word.replace('_', ""));
            }
            for part in parts {
                push_term(&mut out, part);
            }
        }
        out
    }
}

fn push_term(out: &mut Vec<String>, raw: &str) {
    let term = raw.to_lowercase();
    if term.chars().count() < MIN_TOKEN_LEN || STOPWORDS.contains(&term.as_str()) {
        return;
    }
    out.push(term);
}

/// `get_userName2` → `["get", "user", "Name2"]`.
fn split_identifier(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for piece in word.split('_').filter(|p| !p.is_empty()) {
        let mut start = 0;
        let mut prev: Option<char> = None;
        for (i, c) in piece.char_indices() {
            if let Some(p) = prev {
                if p.is_lowercase() && c.is_uppercase() {
                    parts.push(&piece[start..i]);
                    start = i;
                }
            }
            prev = Some(c);
        }
        parts.push(&piece[start..]);
    }
    parts
}

/// A query embedded against one [`LexicalIndex`].
pub struct LexicalQuery(Embedding<u32>);

/// BM25 statistics for one corpus, built once per query.
///
/// Document `i` is the `i`-th text passed to [`LexicalIndex::build`].
pub struct LexicalIndex {
    embedder: Embedder<u32, CodeTokenizer>,
    scorer: Scorer<usize, u32>,
    len: usize,
}

impl LexicalIndex {
    pub fn build<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let corpus: Vec<&str> = texts.into_iter().collect();
        let embedder =
            EmbedderBuilder::<u32, CodeTokenizer>::with_tokenizer_and_fit_to_corpus(
                CodeTokenizer,
                &corpus,
            )
            .k1(BM25_K1)
            .b(BM25_B)
            .build();

        let mut scorer = Scorer::<usize, u32>::new();
        for (i, text) in corpus.iter().enumerate() {
            scorer.upsert(&i, embedder.embed(text));
        }

        Self {
            embedder,
            scorer,
            len: corpus.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn query(&self, text: &str) -> LexicalQuery {
        LexicalQuery(self.embedder.embed(text))
    }

    /// Raw BM25 score of document `doc`. Zero for an out-of-range document
    /// or when no query term occurs in it.
    pub fn bm25(&self, doc: usize, query: &LexicalQuery) -> f64 {
        self.scorer
            .score(&doc, &query.0)
            .map(f64::from)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(0.0)
    }

    /// BM25 squashed into `[0, 1)`.
    pub fn relevance(&self, doc: usize, query: &LexicalQuery) -> f64 {
        let s = self.bm25(doc, query);
        s / (s + 1.0)
    }
}
