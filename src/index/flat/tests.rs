use super::*;
use crate::documents::Metadata;
use proptest::prelude::*;

fn chunk(text: &str, product: &str) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert("product".to_string(), product.to_string());
    Chunk {
        text: text.to_string(),
        metadata,
        chunk_index: 0,
        total_chunks: 1,
        sentence_start: 0,
        sentence_count: 1,
    }
}

fn sample_index() -> FlatIndex {
    let mut index = FlatIndex::new();
    index
        .add(
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.6, 0.8, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            vec![
                chunk("a", "Credit card"),
                chunk("b", "Mortgage"),
                chunk("c", "Credit card"),
                chunk("d", "Mortgage"),
            ],
        )
        .expect("should add entries");
    index
}

fn slots(hits: &[SearchHit]) -> Vec<usize> {
    hits.iter().map(|hit| hit.slot).collect()
}

#[test]
fn dimension_fixed_by_first_insert() {
    let mut index = FlatIndex::new();
    assert_eq!(index.dimension(), None);
    assert!(index.is_empty());

    let slots = index
        .add(vec![vec![1.0, 0.0]], vec![chunk("a", "x")])
        .expect("should add");
    assert_eq!(slots, 0..1);
    assert_eq!(index.dimension(), Some(2));

    let slots = index
        .add(vec![vec![0.0, 1.0], vec![1.0, 0.0]], vec![chunk("b", "x"), chunk("c", "x")])
        .expect("should add");
    assert_eq!(slots, 1..3);
    assert_eq!(index.len(), 3);
    assert_eq!(index.vector(1), Some(&[0.0, 1.0][..]));
    assert_eq!(index.vector(3), None);
}

#[test]
fn length_mismatch_leaves_index_unchanged() {
    let mut index = sample_index();
    let before = index.clone();

    let result = index.add(vec![vec![1.0, 0.0, 0.0]], Vec::new());
    assert!(matches!(
        result,
        Err(RetrievalError::LengthMismatch {
            vectors: 1,
            metadata: 0
        })
    ));
    assert_eq!(index, before);
}

#[test]
fn dimension_mismatch_leaves_index_unchanged() {
    let mut index = sample_index();
    let before = index.clone();

    // Second vector is wrong, so nothing from the batch may land
    let result = index.add(
        vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]],
        vec![chunk("e", "x"), chunk("f", "x")],
    );
    assert!(matches!(
        result,
        Err(RetrievalError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(index.len(), 4);
    assert_eq!(index, before);
}

#[test]
fn explicit_dimension_is_enforced_on_first_insert() {
    let mut index = FlatIndex::with_dimension(4);
    let result = index.add(vec![vec![1.0, 0.0]], vec![chunk("a", "x")]);
    assert!(matches!(result, Err(RetrievalError::DimensionMismatch { .. })));
    assert!(index.is_empty());
}

#[test]
fn empty_add_is_a_no_op() {
    let mut index = sample_index();
    assert_eq!(index.add(Vec::new(), Vec::new()).expect("should add"), 4..4);
    assert_eq!(index.len(), 4);
}

#[test]
fn search_orders_by_score() {
    let index = sample_index();
    let hits = index.search(&[0.8, 0.6, 0.0], 3).expect("should search");

    assert_eq!(slots(&hits), vec![2, 0, 1]);
    assert!((hits[0].score - 0.96).abs() < 1e-6);
    assert!((hits[1].score - 0.8).abs() < 1e-6);
    assert_eq!(hits[0].chunk.text, "c");
}

#[test]
fn search_length_is_bounded() {
    let index = sample_index();
    assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).expect("search").len(), 4);
    assert!(index.search(&[1.0, 0.0, 0.0], 0).expect("search").is_empty());
    assert!(
        FlatIndex::new()
            .search(&[1.0, 0.0], 5)
            .expect("search")
            .is_empty()
    );
}

#[test]
fn ties_break_by_slot() {
    let mut index = FlatIndex::new();
    index
        .add(
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
            vec![chunk("a", "x"), chunk("b", "x"), chunk("c", "x"), chunk("d", "x")],
        )
        .expect("should add");

    let hits = index.search(&[1.0, 0.0], 4).expect("should search");
    assert_eq!(slots(&hits), vec![1, 3, 0, 2]);

    let hits = index.search(&[1.0, 0.0], 1).expect("should search");
    assert_eq!(slots(&hits), vec![1]);
}

#[test]
fn signed_zero_scores_tie_by_slot() {
    let mut index = FlatIndex::with_dimension(2);
    index
        .add(
            vec![vec![-1.0, 0.0], vec![1.0, 0.0]],
            vec![chunk("a", "x"), chunk("b", "x")],
        )
        .expect("should add");

    // Both products are zero, one of them negative zero
    let hits = index.search(&[0.0, -1.0], 2).expect("should search");
    assert_eq!(slots(&hits), vec![0, 1]);
    assert!(hits.iter().all(|hit| hit.score.is_sign_positive()));

    let hits = index.search(&[0.0, -1.0], 1).expect("should search");
    assert_eq!(slots(&hits), vec![0]);

    let filter = MetadataFilter::new("product", "x");
    let hits = index
        .search_filtered(&[0.0, -1.0], 2, &filter)
        .expect("should search");
    assert_eq!(slots(&hits), vec![0, 1]);
}

#[test]
fn query_dimension_is_checked() {
    let index = sample_index();
    assert!(matches!(
        index.search(&[1.0, 0.0], 2),
        Err(RetrievalError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    let filter = MetadataFilter::new("product", "Mortgage");
    assert!(index.search_filtered(&[1.0], 2, &filter).is_err());
}

#[test]
fn filtered_search_keeps_matching_entries_only() {
    let index = sample_index();
    let filter = MetadataFilter::new("product", "Mortgage");

    // Slot 0 and 2 score highest overall but are filtered out
    let hits = index
        .search_filtered(&[1.0, 0.0, 0.0], 5, &filter)
        .expect("should search");
    assert_eq!(slots(&hits), vec![1, 3]);
    assert!(hits.iter().all(|h| h.chunk.metadata["product"] == "Mortgage"));

    let none = MetadataFilter::new("product", "Student loan");
    assert!(
        index
            .search_filtered(&[1.0, 0.0, 0.0], 5, &none)
            .expect("should search")
            .is_empty()
    );
}

#[test]
fn filtered_search_reports_missing_key() {
    let mut index = sample_index();
    let mut unlabeled = chunk("e", "x");
    unlabeled.metadata.clear();
    index
        .add(vec![vec![0.0, 0.0, 1.0]], vec![unlabeled])
        .expect("should add");

    let result = index.search_filtered(&[1.0, 0.0, 0.0], 2, &MetadataFilter::new("product", "x"));
    assert!(matches!(
        result,
        Err(RetrievalError::MissingMetadataKey { ref key, slot: 4 }) if key == "product"
    ));
}

#[test]
fn from_parts_checks_lengths() {
    assert!(FlatIndex::from_parts(2, vec![1.0, 0.0], vec![chunk("a", "x")]).is_ok());
    assert!(FlatIndex::from_parts(2, vec![1.0, 0.0, 1.0], vec![chunk("a", "x")]).is_err());
    assert!(FlatIndex::from_parts(2, vec![1.0, 0.0], Vec::new()).is_err());
    assert!(FlatIndex::from_parts(0, Vec::new(), Vec::new()).is_err());
}

fn index_strategy() -> impl Strategy<Value = (FlatIndex, Vec<f32>)> {
    (1usize..6, 0usize..40).prop_flat_map(|(dimension, count)| {
        (
            prop::collection::vec(prop::collection::vec(-3i8..=3, dimension), count),
            prop::collection::vec(0u8..3, count),
            prop::collection::vec(-3i8..=3, dimension),
        )
            .prop_map(move |(rows, labels, query)| {
                let mut index = FlatIndex::with_dimension(dimension);
                let vectors = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(f32::from).collect())
                    .collect();
                let chunks = labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| chunk(&i.to_string(), &format!("p{label}")))
                    .collect();
                index.add(vectors, chunks).expect("generated entries are consistent");
                (index, query.into_iter().map(f32::from).collect())
            })
    })
}

proptest! {
    #[test]
    fn search_is_ordered_and_bounded((index, query) in index_strategy(), k in 0usize..50) {
        let hits = index.search(&query, k).expect("should search");

        prop_assert_eq!(hits.len(), k.min(index.len()));
        for pair in hits.windows(2) {
            prop_assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].slot < pair[1].slot)
            );
        }
    }

    #[test]
    fn filtered_search_equals_filtering_full_ranking(
        (index, query) in index_strategy(),
        k in 0usize..50,
        label in 0u8..3,
    ) {
        let filter = MetadataFilter::new("product", format!("p{label}"));
        let filtered = index.search_filtered(&query, k, &filter).expect("should search");

        let expected: Vec<SearchHit> = index
            .search(&query, index.len())
            .expect("should search")
            .into_iter()
            .filter(|hit| hit.chunk.metadata["product"] == filter.value)
            .take(k)
            .collect();

        prop_assert_eq!(filtered, expected);
    }
}
