//! Plain-text rendering of engine results.

use std::fmt::Write;

use docrag::{IndexReport, QueryResponse, StoreStats};

pub fn response(response: &QueryResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Answer: {}", response.answer_text());
    if let Some(reasoning) = &response.reasoning {
        let _ = writeln!(out, "\nReasoning: {reasoning}");
    }
    let entities = response.entities();
    if !entities.is_empty() {
        let _ = writeln!(out, "\nEntities:");
        for entity in entities {
            let _ = writeln!(
                out,
                "  - {} ({}) {:.2}",
                entity.text, entity.entity_type, entity.score
            );
        }
    }
    out
}

pub fn index_report(report: &IndexReport) -> String {
    match report {
        IndexReport::Success { document, chunks, .. } => {
            format!("Indexed {document}: {chunks} chunks")
        }
        IndexReport::Error { document, error } => format!("Failed to index {document}: {error}"),
    }
}

pub fn stats(stats: &StoreStats) -> String {
    format!("Collection '{}': {} chunks", stats.collection_name, stats.count)
}

/// Most recent queries first, at most `limit`.
pub fn history(queries: &[String], limit: usize) -> String {
    if queries.is_empty() {
        return "No queries yet.".to_string();
    }
    queries
        .iter()
        .rev()
        .take(limit)
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use docrag::Entity;

    use super::*;

    #[test]
    fn renders_answer_reasoning_and_entities() {
        let response = QueryResponse {
            answer: Some("Paris".into()),
            reasoning: Some("Document 1 names the capital.".into()),
            entities: Some(vec![Entity {
                entity_type: "LOC".into(),
                text: "Paris".into(),
                score: 0.987,
                start: None,
                end: None,
            }]),
            ..Default::default()
        };
        assert_eq!(
            super::response(&response),
            "Answer: Paris\n\nReasoning: Document 1 names the capital.\n\nEntities:\n  - Paris (LOC) 0.99\n"
        );
    }

    #[test]
    fn missing_answer_has_placeholder() {
        assert_eq!(super::response(&QueryResponse::default()), "Answer: No answer generated\n");
    }

    #[test]
    fn history_is_newest_first_and_bounded() {
        let queries: Vec<String> = (1..=7).map(|i| format!("q{i}")).collect();
        assert_eq!(history(&queries, 5), "1. q7\n2. q6\n3. q5\n4. q4\n5. q3");
        assert_eq!(history(&[], 5), "No queries yet.");
    }

    #[test]
    fn index_report_lines() {
        let ok = IndexReport::Success { document: "a.pdf".into(), chunks: 4, total_documents: 9 };
        assert_eq!(index_report(&ok), "Indexed a.pdf: 4 chunks");
        let err = IndexReport::Error {
            document: "b.exe".into(),
            error: "Unsupported file type: .exe".into(),
        };
        assert_eq!(index_report(&err), "Failed to index b.exe: Unsupported file type: .exe");
    }
}
