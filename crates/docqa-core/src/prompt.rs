//! Grounded prompt assembly for the answer engine.

use crate::models::RetrievedChunk;

/// Fixed instruction placed at the top of every prompt.
pub const INSTRUCTION: &str = "You are an AI assistant that helps users understand PDF documents.\n\
Use the following pieces of context to answer the question at the end.\n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Separator placed between retrieved chunk texts in the context block.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Build the prompt from retrieved chunks (most similar first) and the question.
///
/// ```rust
/// use docqa_core::models::RetrievedChunk;
/// use docqa_core::prompt::build_prompt;
///
/// let ctx = vec![RetrievedChunk { index: 0, score: 0.9, text: "Paris is in France.".into() }];
/// let prompt = build_prompt(&ctx, "Where is Paris?");
/// assert!(prompt.contains("Context:\nParis is in France."));
/// assert!(prompt.ends_with("Question: Where is Paris?\n\nAnswer:"));
/// ```
pub fn build_prompt(context: &[RetrievedChunk], question: &str) -> String {
    let context_text = context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        INSTRUCTION,
        context_text,
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            index,
            score: 1.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_prompt_starts_with_instruction() {
        let prompt = build_prompt(&[chunk(0, "alpha")], "q?");
        assert!(prompt.starts_with(INSTRUCTION));
        assert!(prompt.contains("say that you don't know"));
    }

    #[test]
    fn test_context_keeps_retrieval_order() {
        let prompt = build_prompt(&[chunk(3, "second best"), chunk(1, "third")], "q?");
        let a = prompt.find("second best").unwrap();
        let b = prompt.find("third").unwrap();
        assert!(a < b);
        assert!(prompt.contains("second best\n\nthird"));
    }

    #[test]
    fn test_question_is_trimmed() {
        let prompt = build_prompt(&[], "  What is this?  \n");
        assert!(prompt.ends_with("Question: What is this?\n\nAnswer:"));
    }
}
