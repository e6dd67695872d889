//! Question answering over a project's indexed files.
//!
//! `rank → build context → prompt → generate`. Ranking and generation errors
//! propagate; an empty corpus is not an error and still produces a prompt,
//! which tells the model to say it does not know.

use anyhow::{bail, Result};
use repolens_core::context::build_answer_context;
use repolens_core::generation::{answer_prompt, rewrite_prompt};
use repolens_core::models::{FileReference, QuestionRecord};
use repolens_core::search::rank_project;
use serde::Serialize;

use crate::app::AppContext;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub files_referenced: Vec<FileReference>,
    /// Set when the question was saved to the history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
}

pub async fn ask(
    ctx: &AppContext,
    project_id: &str,
    question: &str,
    limit: Option<usize>,
    save: bool,
) -> Result<Answer> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let project = ctx.project(project_id).await?;
    let retrieval = &ctx.config.retrieval;
    let params = retrieval.rank_params(limit)?;

    let ranked = rank_project(
        ctx.store.as_ref(),
        ctx.embedder.as_ref(),
        &project.id,
        question,
        &params,
    )
    .await?;
    let context = build_answer_context(&ranked, retrieval.context_budget_chars);
    tracing::debug!(
        project_id = %project.id,
        ranked = ranked.len(),
        included = context.included,
        context_bytes = context.text.len(),
        "answer context built"
    );

    let prompt = answer_prompt(question, &context.text);
    let answer = ctx.generator.generate(&prompt).await?.trim().to_string();
    // Only chunks that made it into the prompt count as referenced.
    let files_referenced: Vec<FileReference> = ranked[..context.included]
        .iter()
        .map(|s| s.to_reference())
        .collect();

    let question_id = if save {
        let record = QuestionRecord::new(
            &project.id,
            question.trim(),
            &answer,
            files_referenced.iter().map(|f| f.file_name.clone()).collect(),
        );
        ctx.store.save_question(&record).await?;
        Some(record.id)
    } else {
        None
    };

    Ok(Answer {
        answer,
        files_referenced,
        question_id,
    })
}

/// Rewrite a rough question into a clearer one with the generation
/// provider. An empty reply keeps the original text.
pub async fn rewrite_question(ctx: &AppContext, text: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("text must not be empty");
    }
    let reply = ctx.generator.generate(&rewrite_prompt(text)).await?;
    let reply = reply.trim();
    if reply.is_empty() {
        tracing::debug!("rewrite returned nothing, keeping the original question");
        return Ok(text.trim().to_string());
    }
    Ok(reply.to_string())
}

/// `rlens ask`: print the answer followed by the referenced files.
///
/// With `rewrite`, the question is first rewritten and the rewritten text
/// is printed and asked instead.
pub async fn run_ask(
    ctx: &AppContext,
    project_id: &str,
    question: &str,
    limit: Option<usize>,
    save: bool,
    rewrite: bool,
) -> Result<()> {
    let question = if rewrite {
        ctx.project(project_id).await?;
        let rewritten = rewrite_question(ctx, question).await?;
        println!("question: {}", rewritten);
        println!();
        rewritten
    } else {
        question.to_string()
    };
    let result = ask(ctx, project_id, &question, limit, save).await?;

    println!("{}", result.answer);
    if !result.files_referenced.is_empty() {
        println!();
        println!("files referenced:");
        for (i, f) in result.files_referenced.iter().enumerate() {
            println!("  {}. {} (score: {:.2})", i + 1, f.file_name, f.score);
        }
    }
    if let Some(id) = result.question_id {
        println!();
        println!("saved question {}", id);
    }
    Ok(())
}

/// `rlens questions <project-id>`.
pub async fn run_questions(ctx: &AppContext, project_id: &str) -> Result<()> {
    let project = ctx.project(project_id).await?;
    let questions = ctx.store.list_questions(&project.id).await?;
    if questions.is_empty() {
        println!("No saved questions.");
        return Ok(());
    }

    for q in questions {
        println!("[{}] {}", q.created_at.format("%Y-%m-%d %H:%M"), q.question);
        for line in q.answer.lines() {
            println!("    {}", line);
        }
        if !q.files_referenced.is_empty() {
            println!("    files: {}", q.files_referenced.join(", "));
        }
        println!();
    }
    Ok(())
}
