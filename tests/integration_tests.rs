//! Integration tests for the aknn search engine.

use aknn::{
    exact_knn, Aknn, AknnError, Config, CreateModelRequest, CreateOutcome, DocLocation,
    DocSearchRequest, DocumentStore, IndexDocument, IndexRequest, MemoryStore, ModelBasis,
    ModelKey, ModelLoader, RescoreMode, Result, SearchParams, SearchRequest, SearchResponse,
    SortOrder, Source, StoreModelLoader,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde_json::json;
use std::collections::HashSet;
use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;
use tempfile::tempdir;

const INDEX: &str = "vectors";
const TYPE: &str = "vector";

fn model_key() -> ModelKey {
    ModelKey::new("aknn_models", "aknn_model", "test")
}

fn service() -> (Arc<MemoryStore>, Aknn) {
    let store = Arc::new(MemoryStore::new());
    let aknn = Aknn::new(store.clone(), Config::default()).unwrap();
    (store, aknn)
}

fn create_random(aknn: &Aknn, nb_tables: usize, nb_bits: usize, dims: Option<usize>) {
    let outcome = aknn
        .create_model(CreateModelRequest {
            location: model_key(),
            nb_tables,
            nb_bits_per_table: nb_bits,
            description: "integration".into(),
            basis: ModelBasis::Random {
                nb_dimensions: dims,
                seed: Some(2018),
            },
        })
        .unwrap();
    assert_eq!(outcome, CreateOutcome::Created);
}

/// A 2 x 2 model whose hyperplanes put every test vector on the
/// non-negative side, so all documents get identical codes.
fn create_flat(aknn: &Aknn) {
    aknn.create_model(CreateModelRequest {
        location: model_key(),
        nb_tables: 2,
        nb_bits_per_table: 2,
        description: String::new(),
        basis: ModelBasis::Sample {
            vectors: vec![
                vec![1.0, 1.0, 1.0],
                vec![1.0, 0.0, 1.0],
                vec![2.0, 1.0, 1.0],
                vec![1.0, 1.0, 0.0],
            ],
        },
    })
    .unwrap();
}

fn document(id: &str, vector: &[f64]) -> IndexDocument {
    let mut source = Source::new();
    source.insert("_aknn_vector".into(), json!(vector));
    source.insert("name".into(), json!(format!("doc-{id}")));
    IndexDocument {
        id: id.to_string(),
        source,
    }
}

fn index(aknn: &Aknn, docs: Vec<IndexDocument>) -> Result<usize> {
    aknn.index(IndexRequest {
        model: model_key(),
        index: INDEX.into(),
        doc_type: TYPE.into(),
        docs,
    })
    .map(|r| r.size)
}

fn four_documents() -> Vec<IndexDocument> {
    vec![
        document("1", &[1.0, 0.0, 0.0]),
        document("2", &[1.0, 1.0, 0.0]),
        document("3", &[0.0, 1.0, 0.0]),
        document("4", &[0.0, 1.0, 1.0]),
    ]
}

fn search(aknn: &Aknn, vector: &[f64], params: SearchParams) -> Result<SearchResponse> {
    aknn.search(SearchRequest {
        model: model_key(),
        index: INDEX.into(),
        doc_type: TYPE.into(),
        vector: vector.to_vec(),
        params,
    })
}

#[test]
fn test_four_vectors_ranked_by_cosine() {
    let (_, aknn) = service();
    create_flat(&aknn);
    assert_eq!(index(&aknn, four_documents()).unwrap(), 4);

    let params = SearchParams {
        k1: 1000,
        k2: 10,
        rescore: RescoreMode::Cosine,
        order: SortOrder::Desc,
        ..SearchParams::default()
    };
    let response = search(&aknn, &[1.0, 0.0, 0.0], params).unwrap();
    assert_eq!(response.ids(), vec!["1", "2", "3", "4"]);
    assert!((response.hits[0].score - 1.0).abs() < 1e-12);
    assert!((response.hits[1].score - FRAC_1_SQRT_2).abs() < 1e-12);
    assert_eq!(response.hits[2].score, 0.0);
    assert_eq!(response.hits[3].score, 0.0);

    let source = &response.hits[0].source;
    assert_eq!(source["name"], json!("doc-1"));
    assert!(!source.contains_key("_aknn_vector"));
    assert!(!source.contains_key("_aknn_hashes"));
}

#[test]
fn test_random_model_finds_neighbors() {
    let (_, aknn) = service();
    create_random(&aknn, 64, 2, None);
    index(&aknn, four_documents()).unwrap();

    let params = SearchParams {
        k1: 1000,
        k2: 10,
        ..SearchParams::default()
    };
    let response = search(&aknn, &[1.0, 0.0, 0.0], params).unwrap();
    assert_eq!(response.total, 4);
    let ids = response.ids();
    assert_eq!(&ids[..2], &["1", "2"]);

    // 3 and 4 both score 0, so their order is the store's.
    let tail: HashSet<&str> = ids[2..].iter().copied().collect();
    assert_eq!(tail, HashSet::from(["3", "4"]));
    assert_eq!(response.hits[2].score, 0.0);
    assert_eq!(response.hits[3].score, 0.0);
}

#[test]
fn test_orderings() {
    let (_, aknn) = service();
    create_flat(&aknn);
    index(&aknn, four_documents()).unwrap();

    let asc = SearchParams {
        order: SortOrder::Asc,
        ..SearchParams::default()
    };
    let response = search(&aknn, &[1.0, 0.0, 0.0], asc).unwrap();
    assert_eq!(response.ids(), vec!["3", "4", "2", "1"]);

    let unscored = SearchParams {
        rescore: RescoreMode::None,
        k2: 3,
        ..SearchParams::default()
    };
    let response = search(&aknn, &[0.0, 0.0, 1.0], unscored).unwrap();
    assert_eq!(response.ids(), vec!["1", "2", "3"]);
    assert_eq!(response.candidates, 4);
}

#[test]
fn test_model_without_bases_returns_nothing() {
    let (_, aknn) = service();
    create_random(&aknn, 10, 8, None);

    let response = search(&aknn, &[0.3, 0.4], SearchParams::default()).unwrap();
    assert!(response.hits.is_empty());
    assert_eq!(response.total, 0);
    assert!(!response.timed_out);
}

#[test]
fn test_lazy_bases_fix_dimensionality() {
    let (store, aknn) = service();
    create_random(&aknn, 8, 4, None);
    index(&aknn, vec![document("a", &[0.5, 0.5, 0.1])]).unwrap();

    let model = StoreModelLoader::new(store.clone()).load(&model_key()).unwrap();
    assert!(model.has_bases());
    assert_eq!(model.nb_dimensions(), Some(3));

    let err = index(&aknn, vec![document("b", &[0.5, 0.5])]).unwrap_err();
    assert!(matches!(err, AknnError::Validation(_)));
    assert_eq!(store.count(INDEX, TYPE), 1);

    let err = search(&aknn, &[0.5, 0.5], SearchParams::default()).unwrap_err();
    assert!(matches!(err, AknnError::Validation(_)));
}

#[test]
fn test_upsert_replaces_vector() {
    let (store, aknn) = service();
    create_flat(&aknn);
    index(&aknn, four_documents()).unwrap();
    index(&aknn, vec![document("3", &[1.0, 0.0, 0.0])]).unwrap();
    assert_eq!(store.count(INDEX, TYPE), 4);

    let response = search(&aknn, &[1.0, 0.0, 0.0], SearchParams::default()).unwrap();
    assert_eq!(response.ids(), vec!["1", "3", "2", "4"]);
}

#[test]
fn test_search_by_id_matches_vector_search() {
    let (_, aknn) = service();
    create_random(&aknn, 32, 3, Some(3));
    index(&aknn, four_documents()).unwrap();

    let by_id = aknn
        .search_by_id(DocSearchRequest {
            location: DocLocation::new(INDEX, TYPE, "2"),
            params: SearchParams::default(),
        })
        .unwrap();
    let by_vector = search(&aknn, &[1.0, 1.0, 0.0], SearchParams::default()).unwrap();
    assert_eq!(by_id.ids(), by_vector.ids());
    assert_eq!(by_id.hits[0].id, "2");

    let err = aknn
        .search_by_id(DocSearchRequest {
            location: DocLocation::new(INDEX, TYPE, "missing"),
            params: SearchParams::default(),
        })
        .unwrap_err();
    assert!(matches!(err, AknnError::Store(_)));
}

#[test]
fn test_create_is_idempotent() {
    let (_, aknn) = service();
    create_random(&aknn, 4, 4, Some(2));
    let outcome = aknn
        .create_model(CreateModelRequest {
            location: model_key(),
            nb_tables: 9,
            nb_bits_per_table: 9,
            description: "other".into(),
            basis: ModelBasis::Random {
                nb_dimensions: Some(5),
                seed: None,
            },
        })
        .unwrap();
    assert_eq!(outcome, CreateOutcome::AlreadyExists);

    index(&aknn, vec![document("a", &[1.0, 2.0])]).unwrap();
}

#[test]
fn test_filter_restricts_candidates() {
    let (_, aknn) = service();
    create_flat(&aknn);
    index(&aknn, four_documents()).unwrap();

    let params = SearchParams {
        filter: Some(json!({"bool": {"must_not": [{"term": {"name": "doc-1"}}]}})),
        ..SearchParams::default()
    };
    let response = search(&aknn, &[1.0, 0.0, 0.0], params).unwrap();
    assert_eq!(response.ids(), vec!["2", "3", "4"]);
}

#[test]
fn test_recall_against_exact_search() {
    let (_, aknn) = service();
    create_random(&aknn, 16, 4, None);

    let dims = 16;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut sample = |n: usize| -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| (0..dims).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect()
    };
    let corpus = sample(200);
    let queries = sample(20);

    let docs = corpus
        .iter()
        .enumerate()
        .map(|(i, v)| document(&i.to_string(), v))
        .collect();
    index(&aknn, docs).unwrap();

    let ids: Vec<String> = (0..corpus.len()).map(|i| i.to_string()).collect();
    let params = SearchParams {
        k1: 200,
        k2: 10,
        ..SearchParams::default()
    };

    let mut found = 0;
    for query in &queries {
        let truth: HashSet<String> = exact_knn(
            query,
            ids.iter().map(String::as_str).zip(corpus.iter().map(Vec::as_slice)),
            10,
        )
        .into_iter()
        .map(|s| s.id)
        .collect();

        let response = search(&aknn, query, params.clone()).unwrap();
        found += response.hits.iter().filter(|h| truth.contains(&h.id)).count();
    }

    let recall = found as f64 / (queries.len() * 10) as f64;
    assert!(recall >= 0.8, "recall@10 was {recall}");
}

#[test]
fn test_snapshot_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let (store, aknn) = service();
        create_flat(&aknn);
        index(&aknn, four_documents()).unwrap();
        store.save_snapshot(&path).unwrap();
    }

    let store = Arc::new(MemoryStore::load_snapshot(&path).unwrap());
    assert!(store.get(&model_key()).unwrap().is_some());
    let aknn = Aknn::new(store, Config::default()).unwrap();
    let response = search(&aknn, &[1.0, 0.0, 0.0], SearchParams::default()).unwrap();
    assert_eq!(response.ids(), vec!["1", "2", "3", "4"]);
}
