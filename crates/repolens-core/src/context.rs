//! Answer-context assembly.
//!
//! Ranked chunks are rendered one block each and joined with blank lines.
//! A byte budget caps the total: blocks are appended in rank order until
//! the next one would overflow, so the lowest-ranked chunks go first. If the
//! top chunk alone is over budget it is cut at a char boundary.

use crate::models::ContentChunk;
use crate::search::ScoredChunk;
use crate::text::truncate_utf8;

pub const DEFAULT_CONTEXT_BUDGET_CHARS: usize = 60_000;

const SEPARATOR: &str = "\n\n";

/// The prompt context and the chunks that made it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerContext {
    pub text: String,
    /// Number of leading ranked chunks included (the last one possibly cut).
    pub included: usize,
}

impl AnswerContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One chunk as it appears in the prompt.
pub fn format_chunk(chunk: &ContentChunk) -> String {
    format!(
        "source: {}\ncode content: {}\nsummary of the file: {}",
        chunk.file_name, chunk.source_code, chunk.summary
    )
}

/// Concatenate ranked chunks into one context block under `budget` bytes.
pub fn build_answer_context(ranked: &[ScoredChunk], budget: usize) -> AnswerContext {
    let mut ctx = AnswerContext::default();

    for scored in ranked {
        let block = format_chunk(&scored.chunk);
        let sep = if ctx.text.is_empty() { "" } else { SEPARATOR };

        if ctx.text.len() + sep.len() + block.len() > budget {
            if ctx.included == 0 {
                ctx.text = truncate_utf8(&block, budget).to_string();
                ctx.included = usize::from(!ctx.text.is_empty());
            }
            break;
        }

        ctx.text.push_str(sep);
        ctx.text.push_str(&block);
        ctx.included += 1;
    }

    ctx
}
