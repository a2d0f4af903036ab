//! Property tests for vector store search ordering.

use std::collections::HashMap;

use docrag::document::Chunk;
use docrag::inmemory::InMemoryVectorStore;
use docrag::local::LocalVectorStore;
use docrag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a chunk with a normalized embedding.
fn arb_chunk(dim: usize) -> impl Strategy<Value = Chunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(source, text, embedding)| Chunk {
            id: format!("{source}_0"),
            text,
            embedding,
            metadata: HashMap::from([("source".to_string(), source.clone())]),
            document_id: source,
        },
    )
}

fn dedupe(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut deduped: HashMap<String, Chunk> = HashMap::new();
    for chunk in chunks {
        deduped.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }
    deduped.into_values().collect()
}

async fn search_all(
    store: &dyn VectorStore,
    chunks: &[Chunk],
    query: &[f32],
    top_k: usize,
) -> (Vec<docrag::SearchResult>, usize) {
    store.create_collection("test", query.len()).await.unwrap();
    store.upsert("test", chunks).await.unwrap();
    let count = store.count("test").await.unwrap();
    (store.search("test", query, top_k).await.unwrap(), count)
}

/// Searching either local store returns at most `top_k` results ordered by
/// descending cosine similarity, and the count matches the distinct ids.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let unique_chunks = dedupe(&chunks);
            let unique_count = unique_chunks.len();
            let rt = tokio::runtime::Runtime::new().unwrap();

            let (memory, local) = rt.block_on(async {
                let memory = InMemoryVectorStore::new();
                let dir = tempfile::tempdir().unwrap();
                let local = LocalVectorStore::open(dir.path()).await.unwrap();
                (
                    search_all(&memory, &unique_chunks, &query, top_k).await,
                    search_all(&local, &unique_chunks, &query, top_k).await,
                )
            });

            for (results, count) in [memory, local] {
                prop_assert_eq!(count, unique_count);
                prop_assert!(results.len() <= top_k);
                prop_assert_eq!(results.len(), top_k.min(unique_count));

                for window in results.windows(2) {
                    prop_assert!(
                        window[0].score >= window[1].score,
                        "results not in descending order: {} < {}",
                        window[0].score,
                        window[1].score,
                    );
                }
                for result in &results {
                    prop_assert!((result.distance() - (1.0 - result.score)).abs() < 1e-6);
                }
            }
        }
    }
}

#[tokio::test]
async fn local_store_survives_reopen_with_same_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = vec![
        Chunk {
            id: "a.txt_0".into(),
            text: "alpha".into(),
            embedding: vec![1.0, 0.0],
            metadata: HashMap::new(),
            document_id: "a.txt".into(),
        },
        Chunk {
            id: "a.txt_1".into(),
            text: "beta".into(),
            embedding: vec![0.0, 1.0],
            metadata: HashMap::new(),
            document_id: "a.txt".into(),
        },
    ];

    {
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();
        store.upsert("docs", &chunks).await.unwrap();
    }

    let store = LocalVectorStore::open(dir.path()).await.unwrap();
    assert_eq!(store.count("docs").await.unwrap(), 2);
    let results = store.search("docs", &[0.1, 0.9], 2).await.unwrap();
    assert_eq!(results[0].chunk.id, "a.txt_1");
    assert_eq!(results[1].chunk.id, "a.txt_0");
}

#[tokio::test]
async fn search_on_missing_collection_is_an_error() {
    let store = InMemoryVectorStore::new();
    assert!(store.search("nope", &[1.0], 3).await.is_err());
}

#[tokio::test]
async fn delete_removes_only_named_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalVectorStore::open(dir.path()).await.unwrap();
    let memory = InMemoryVectorStore::new();
    let stores: [&dyn VectorStore; 2] = [&memory, &local];

    for store in stores {
        store.create_collection("docs", 1).await.unwrap();
        let chunks: Vec<Chunk> = (0..3)
            .map(|i| Chunk {
                id: format!("a.txt_{i}"),
                text: format!("part {i}"),
                embedding: vec![1.0],
                metadata: HashMap::new(),
                document_id: "a.txt".into(),
            })
            .collect();
        store.upsert("docs", &chunks).await.unwrap();

        store.delete("docs", &["a.txt_1", "missing"]).await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 2);
        let ids: Vec<String> =
            store.search("docs", &[1.0], 5).await.unwrap().into_iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec!["a.txt_0", "a.txt_2"]);
    }
}
