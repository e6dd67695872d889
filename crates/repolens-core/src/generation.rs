//! Text generation provider trait and the prompt templates RepoLens sends.
//!
//! Concrete providers (Gemini `generateContent`, OpenAI-compatible chat
//! completions) live in the `repolens` app crate.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::text::truncate_utf8;

/// The reply the model is told to give when the context has no answer.
pub const NO_ANSWER: &str = "I'm sorry, but I don't know the answer based on the given context.";

/// Inserted in place of the context block when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "(no context available for this project)";

/// A text generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// Prompt for answering `question` strictly from `context`.
///
/// An empty context is replaced by [`NO_CONTEXT_MARKER`]; the instruction to
/// reply with [`NO_ANSWER`] is always present.
pub fn answer_prompt(question: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context
    };

    format!(
        "You are a code assistant answering questions about a single software repository.\n\
         Your audience is a developer who is new to the codebase. Be precise and, where it \
         helps, give step-by-step instructions and code snippets in markdown.\n\
         \n\
         START CONTEXT BLOCK\n\
         {context}\n\
         END OF CONTEXT BLOCK\n\
         \n\
         START QUESTION\n\
         {question}\n\
         END OF QUESTION\n\
         \n\
         Use only the CONTEXT BLOCK above. If it does not contain the answer, reply exactly: \
         \"{no_answer}\"\n\
         Do not apologize for previous responses and do not invent anything that is not \
         drawn directly from the context.",
        context = context,
        question = question.trim(),
        no_answer = NO_ANSWER,
    )
}

/// Prompt that turns a rough user question into a clear one before it is
/// asked. Non-English input keeps its language through an
/// `Answer in <language>:` prefix.
pub fn rewrite_prompt(text: &str) -> String {
    format!(
        "You are a prompt writing assistant. Rewrite the user text below into a clearer, \
         more polished version while keeping its meaning and intent.\n\
         \n\
         Guidelines:\n\
         - Detect the language of the text. If it is not English, start with \
         \"Answer in <detected language>:\" and then write the rewritten text in English.\n\
         - Keep it natural and concise, and match the formality of the original.\n\
         - If the text is vague or incomplete, make it coherent without changing the message.\n\
         - The text is a question about the code of a GitHub repository; the result should \
         contain a question.\n\
         - Do not answer it. Reply with the rewritten text only.\n\
         \n\
         START TEXT\n\
         {text}\n\
         END OF TEXT",
        text = text.trim(),
    )
}

/// Prompt for a short onboarding summary of one source file.
///
/// `source` is cut to `max_source_bytes` before it is embedded in the prompt.
pub fn file_summary_prompt(file_name: &str, source: &str, max_source_bytes: usize) -> String {
    format!(
        "You are a senior software engineer onboarding a junior engineer onto a project.\n\
         Explain the purpose of the file {file_name}.\n\
         Here is the code:\n\
         ---\n\
         {code}\n\
         ---\n\
         Give a summary of no more than 200 words of the code above.",
        file_name = file_name,
        code = truncate_utf8(source, max_source_bytes),
    )
}

/// Prompt for summarizing a unified git diff.
pub fn commit_summary_prompt(diff: &str, max_diff_bytes: usize) -> String {
    format!(
        "You are an expert programmer summarizing a git diff.\n\
         Reminders about the diff format:\n\
         - Each file section starts with a line like `diff --git a/lib/index.js b/lib/index.js`.\n\
         - A line starting with `+` was added, `-` was deleted, anything else is context.\n\
         \n\
         Write a short bullet list of the meaningful changes, mentioning file names in \
         brackets where relevant, for example:\n\
         * Raised the returned recordings limit from `10` to `100` [packages/server/recordings_api.ts]\n\
         Do not repeat these examples and do not list changes that are not in the diff.\n\
         \n\
         Please summarize the following diff:\n\
         \n\
         {diff}",
        diff = truncate_utf8(diff, max_diff_bytes),
    )
}
