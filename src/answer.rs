//! Answer engine.
//!
//! A question moves through a fixed sequence of stages:
//!
//! ```text
//! Idle → IndexLoading → Embedding → Retrieving → PromptAssembly → Generating → Done
//! ```
//!
//! Any non-terminal stage may fall into `Errored`. [`AnswerRun`] tracks the
//! current stage, logs every transition, and records the stage a failure
//! happened in, so a failed question is always reported as a typed
//! [`QaError`] and never as a fabricated answer.

use std::time::Duration;

use docqa_core::embedding::EmbeddingProvider;
use docqa_core::error::QaError;
use docqa_core::generation::GenerationProvider;
use docqa_core::index::SemanticIndex;
use docqa_core::models::Answer;
use docqa_core::prompt::build_prompt;

use crate::indexer::embed_batched;
use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStage {
    Idle,
    IndexLoading,
    Embedding,
    Retrieving,
    PromptAssembly,
    Generating,
    Done,
    Errored,
}

impl AnswerStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStage::Idle => "idle",
            AnswerStage::IndexLoading => "index_loading",
            AnswerStage::Embedding => "embedding",
            AnswerStage::Retrieving => "retrieving",
            AnswerStage::PromptAssembly => "prompt_assembly",
            AnswerStage::Generating => "generating",
            AnswerStage::Done => "done",
            AnswerStage::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnswerStage::Done | AnswerStage::Errored)
    }
}

impl std::fmt::Display for AnswerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage tracker for one question.
#[derive(Debug)]
pub struct AnswerRun {
    document_id: String,
    stage: AnswerStage,
    failed_in: Option<AnswerStage>,
}

impl AnswerRun {
    pub fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            stage: AnswerStage::Idle,
            failed_in: None,
        }
    }

    pub fn stage(&self) -> AnswerStage {
        self.stage
    }

    /// Stage the run was in when it failed, if it failed.
    pub fn failed_in(&self) -> Option<AnswerStage> {
        self.failed_in
    }

    pub fn advance(&mut self, next: AnswerStage) {
        if self.stage.is_terminal() {
            return;
        }
        tracing::debug!(
            document_id = %self.document_id,
            from = %self.stage,
            to = %next,
            "answer stage"
        );
        self.stage = next;
    }

    /// Move to `Errored`, log the failure, and hand the error back.
    pub fn fail(&mut self, err: QaError) -> QaError {
        if !self.stage.is_terminal() {
            tracing::warn!(
                document_id = %self.document_id,
                stage = %self.stage,
                code = err.code(),
                error = %err,
                "question failed"
            );
            self.failed_in = Some(self.stage);
            self.stage = AnswerStage::Errored;
        }
        err
    }
}

/// Reject blank questions before any provider is called.
pub fn validate_question(question: &str) -> Result<(), QaError> {
    if question.trim().is_empty() {
        return Err(QaError::InvalidInput(
            "question must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Run the stages after the index is loaded: embed the question, retrieve
/// the top-K chunks, assemble the prompt, and generate the answer.
pub async fn answer_with_index(
    run: &mut AnswerRun,
    index: &SemanticIndex,
    question: &str,
    settings: &PipelineSettings,
    embedder: &dyn EmbeddingProvider,
    generator: &dyn GenerationProvider,
) -> Result<Answer, QaError> {
    run.advance(AnswerStage::Embedding);
    let query = vec![question.trim().to_string()];
    let query_vector = embed_batched(embedder, &query, 1, settings.embedding_deadline)
        .await
        .map_err(|e| run.fail(e))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            run.fail(QaError::EmbeddingProvider(
                "no vector returned for the question".to_string(),
            ))
        })?;

    run.advance(AnswerStage::Retrieving);
    let context = index
        .search(&query_vector, settings.top_k)
        .map_err(|e| run.fail(e))?;
    tracing::debug!(
        retrieved = context.len(),
        best_score = context.first().map(|c| c.score).unwrap_or(0.0),
        "context retrieved"
    );

    run.advance(AnswerStage::PromptAssembly);
    let prompt = build_prompt(&context, question);

    run.advance(AnswerStage::Generating);
    let text = generate_with_deadline(
        generator,
        &prompt,
        settings.temperature,
        settings.generation_deadline,
    )
    .await
    .map_err(|e| run.fail(e))?;

    run.advance(AnswerStage::Done);
    Ok(Answer { text, context })
}

async fn generate_with_deadline(
    generator: &dyn GenerationProvider,
    prompt: &str,
    temperature: f32,
    deadline: Duration,
) -> Result<String, QaError> {
    tokio::time::timeout(deadline, generator.generate(prompt, temperature))
        .await
        .map_err(|_| {
            QaError::AnswerGeneration(format!(
                "{} did not respond within {}s",
                generator.model_name(),
                deadline.as_secs()
            ))
        })?
        .map_err(|e| QaError::AnswerGeneration(format!("{:#}", e)))
}
