//! 向量服务与 AstraDB 客户端：对接用 axum 写的假上游

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

use study_tutor::clients::{AstraClient, Embedder, EmbeddingClient};
use study_tutor::error::{ApiError, AppError, StoreError};
use study_tutor::models::{ChunkMetadata, DocumentChunk, MetadataFilter};
use study_tutor::store::ChunkStore;

const TOKEN: &str = "AstraCS:test-token";
const COLLECTION_PATH: &str = "/api/json/v1/study/document_chunks";

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", address)
}

// ========== 向量服务 ==========

async fn fake_embed(Json(body): Json<Value>) -> impl IntoResponse {
    let texts: Vec<String> = serde_json::from_value(body["texts"].clone()).unwrap_or_default();
    if texts.iter().any(|t| t == "explode") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded").into_response();
    }
    let mut embeddings: Vec<Vec<f32>> = texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect();
    if texts.iter().any(|t| t == "short") {
        embeddings.pop();
    }
    Json(json!({ "embeddings": embeddings, "model_name": "all-MiniLM-L6-v2" })).into_response()
}

#[tokio::test]
async fn test_embedding_client_returns_vectors_in_order() {
    let base_url = spawn(Router::new().route("/embed", post(fake_embed))).await;
    let client = assert_ok!(EmbeddingClient::with_base_url(&format!("{}/", base_url)));

    let vectors = assert_ok!(
        client
            .embed(&["ab".to_string(), "abcd".to_string()])
            .await
    );
    assert_eq!(vectors, vec![vec![2.0, 1.0], vec![4.0, 1.0]]);

    let single = assert_ok!(client.embed_one("buffer").await);
    assert_eq!(single, vec![6.0, 1.0]);
}

#[tokio::test]
async fn test_embedding_client_reports_upstream_errors() {
    let base_url = spawn(Router::new().route("/embed", post(fake_embed))).await;
    let client = EmbeddingClient::with_base_url(&base_url).unwrap();

    let err = assert_err!(client.embed(&["explode".to_string()]).await);
    assert!(matches!(
        err,
        AppError::Api(ApiError::BadResponse { status: 500, ref message, .. })
            if message.as_deref() == Some("model not loaded")
    ));

    let err = assert_err!(client.embed(&["a".to_string(), "short".to_string()]).await);
    assert!(matches!(err, AppError::Api(ApiError::EmptyResponse { .. })));
}

// ========== AstraDB ==========

#[derive(Clone, Default)]
struct AstraState {
    delete_calls: Arc<AtomicUsize>,
}

fn astra_doc(id: &str, similarity: Option<f64>) -> Value {
    let mut doc = json!({
        "_id": id,
        "document_id": "doc-buffers",
        "chunk_index": 0,
        "chunk_text": format!("chunk {}", id),
        "metadata": { "professorName": "Odumosu", "courseCode": "PCH201" }
    });
    if let Some(similarity) = similarity {
        doc["$similarity"] = json!(similarity);
    }
    doc
}

async fn fake_astra(
    State(state): State<AstraState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if headers.get("Token").and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }

    if let Some(find) = body.get("find") {
        if find["filter"]["metadata.professorName"] == "broken" {
            return Json(json!({
                "errors": [{ "message": "bad filter", "errorCode": "INVALID_FILTER" }]
            }))
            .into_response();
        }
        if find.get("sort").is_some() {
            assert_eq!(find["options"]["includeSimilarity"], true);
            return Json(json!({
                "data": { "documents": [astra_doc("a", Some(0.93)), astra_doc("b", Some(0.71))] }
            }))
            .into_response();
        }
        // 分页读取
        let page = match find["options"]["pageState"].as_str() {
            None => json!({ "documents": [astra_doc("a", None)], "nextPageState": "page-2" }),
            Some("page-2") => json!({ "documents": [astra_doc("b", None)], "nextPageState": null }),
            Some(_) => json!({ "documents": [] }),
        };
        return Json(json!({ "data": page })).into_response();
    }

    if let Some(insert) = body.get("insertMany") {
        let ids: Vec<Value> = insert["documents"]
            .as_array()
            .map(|docs| docs.iter().map(|d| d["_id"].clone()).collect())
            .unwrap_or_default();
        assert!(insert["documents"][0].get("$vector").is_some());
        return Json(json!({ "status": { "insertedIds": ids } })).into_response();
    }

    if body.get("deleteMany").is_some() {
        let call = state.delete_calls.fetch_add(1, Ordering::SeqCst);
        let status = if call == 0 {
            json!({ "deletedCount": 20, "moreData": true })
        } else {
            json!({ "deletedCount": 3 })
        };
        return Json(json!({ "status": status })).into_response();
    }

    (StatusCode::BAD_REQUEST, "unknown command").into_response()
}

async fn spawn_astra() -> (AstraClient, AstraState, String) {
    let state = AstraState::default();
    let app = Router::new()
        .route(COLLECTION_PATH, post(fake_astra))
        .with_state(state.clone());
    let endpoint = spawn(app).await;
    let client = AstraClient::with_parts(&endpoint, TOKEN, "study", "document_chunks").unwrap();
    (client, state, endpoint)
}

#[tokio::test]
async fn test_astra_vector_search_reads_similarity() {
    let (client, _, _) = spawn_astra().await;

    let mut filter = MetadataFilter::new();
    filter.set("metadata.courseCode", "PCH201");
    let hits = assert_ok!(client.vector_search(&filter, &[0.1, 0.2], 5).await);

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.id, "a");
    assert_eq!(hits[0].similarity, Some(0.93));
    assert_eq!(hits[1].chunk.metadata.get_str("professorName"), Some("Odumosu"));
}

#[tokio::test]
async fn test_astra_find_all_follows_page_state() {
    let (client, _, _) = spawn_astra().await;

    let chunks = assert_ok!(client.find_all(&MetadataFilter::new()).await);
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_astra_delete_repeats_while_more_data() {
    let (client, state, _) = spawn_astra().await;

    let deleted = assert_ok!(client.delete_document("doc-buffers").await);
    assert_eq!(deleted, 23);
    assert_eq!(state.delete_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_astra_insert_counts_inserted_ids() {
    let (client, _, _) = spawn_astra().await;

    let chunks: Vec<DocumentChunk> = (0..3)
        .map(|i| DocumentChunk {
            id: format!("doc-buffers_1_chunk_{}", i),
            document_id: "doc-buffers".to_string(),
            chunk_index: i,
            chunk_text: format!("paragraph {}", i),
            vector: vec![0.5, 0.5],
            created_at: None,
            metadata: ChunkMetadata::default(),
        })
        .collect();

    assert_eq!(assert_ok!(client.insert_chunks(chunks).await), 3);
}

#[tokio::test]
async fn test_astra_command_errors_and_bad_token() {
    let (client, _, endpoint) = spawn_astra().await;

    let mut filter = MetadataFilter::new();
    filter.set("metadata.professorName", "broken");
    let err = assert_err!(client.find_all(&filter).await);
    assert!(matches!(
        err,
        AppError::Store(StoreError::CommandFailed { ref command, ref message })
            if command == "find" && message == "INVALID_FILTER: bad filter"
    ));

    let wrong = AstraClient::with_parts(&endpoint, "nope", "study", "document_chunks").unwrap();
    let err = assert_err!(wrong.find_all(&MetadataFilter::new()).await);
    assert!(matches!(err, AppError::Api(ApiError::BadResponse { status: 401, .. })));
}
