//! Prompt assembly for answer generation.

use crate::document::SearchResult;
use crate::llm::{ChatMessage, ChatRequest};

/// Context text used when retrieval found nothing.
pub const NO_CONTEXT: &str = "No relevant documents found.";

/// Render retrieved chunks as numbered, source-labelled context blocks.
pub fn prepare_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let source = result.chunk.source().unwrap_or("Unknown");
            format!("Document {} (Source: {source}):\n{}", i + 1, result.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instructions carrying the retrieved context.
pub fn system_message(context: &str) -> String {
    format!(
        r#"You are an AI assistant that answers questions based on the provided documents.
Your responses must be in JSON format with the following structure:
{{
  "answer": "Your concise and informative answer",
  "reasoning": "Your step-by-step reasoning explaining how you arrived at the answer (optional)"
}}

If you're uncertain or if the information is ambiguous, note this in your reasoning.
Base your answers primarily on the provided context documents, but you can use your general knowledge for clarification.

### Context Documents:
{context}

### Instructions:
1. Answer questions using ONLY the provided documents and your general knowledge when necessary.
2. Include specific document references in your reasoning.
3. If the documents contain conflicting information, note this and explain your conclusion.
4. If the documents don't contain the answer, state that clearly.
5. Your response must be a JSON object with "answer" and "reasoning" fields.
"#
    )
}

/// The user turn carrying the question.
pub fn user_message(query: &str) -> String {
    format!(
        "Please answer the following question based on the context documents:\n\n{query}\n\n\
         Provide your answer in JSON format with \"answer\" and \"reasoning\" fields."
    )
}

/// The full chat request for `query` over `results`.
pub fn answer_request(query: &str, results: &[SearchResult]) -> ChatRequest {
    let context = prepare_context(results);
    ChatRequest::new(vec![
        ChatMessage::system(system_message(&context)),
        ChatMessage::user(user_message(query)),
    ])
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;
    use crate::llm::Role;

    fn result(text: &str, source: Option<&str>) -> SearchResult {
        let metadata =
            source.map(|s| HashMap::from([("source".into(), s.into())])).unwrap_or_default();
        SearchResult {
            chunk: Chunk {
                id: "x_0".into(),
                text: text.into(),
                embedding: vec![],
                metadata,
                document_id: "x".into(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn empty_retrieval_has_placeholder_context() {
        assert_eq!(prepare_context(&[]), "No relevant documents found.");
    }

    #[test]
    fn context_numbers_documents_and_names_sources() {
        let context =
            prepare_context(&[result("Alpha text.", Some("a.pdf")), result("Beta text.", None)]);
        assert_eq!(
            context,
            "Document 1 (Source: a.pdf):\nAlpha text.\n\nDocument 2 (Source: Unknown):\nBeta text."
        );
    }

    #[test]
    fn request_has_system_then_user_turns() {
        let request = answer_request("What is X?", &[]);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        let system = &request.messages[0].content;
        assert!(system.contains("### Context Documents:\nNo relevant documents found."));
        assert!(system.contains(r#""answer": "Your concise and informative answer""#));
        assert_eq!(request.messages[1].role, Role::User);
        assert!(request.messages[1].content.contains("\n\nWhat is X?\n\n"));
        assert!(request.json_response);
        assert_eq!(request.max_tokens, 1000);
    }
}
