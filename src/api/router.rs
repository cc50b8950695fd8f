//! API router. Routes mirror the service surface: search, chat with
//! session history, drug catalog reads, admin operations and the
//! graph endpoints.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(endpoints::search::search))
        .route("/chat", post(endpoints::chat::chat))
        .route(
            "/chat/history/{session_id}",
            get(endpoints::chat::history).delete(endpoints::chat::clear_history),
        )
        .route("/drugs", get(endpoints::drugs::list))
        .route("/drugs/{id}", get(endpoints::drugs::detail))
        .route("/admin/sync", post(endpoints::admin::sync))
        .route(
            "/admin/rebuild-vectors",
            post(endpoints::admin::rebuild_vectors),
        )
        .route("/admin/stats", get(endpoints::admin::stats))
        .route("/admin/health", get(endpoints::admin::health))
        .route("/graph/health", get(endpoints::graph::health))
        .route("/graph/stats", get(endpoints::graph::stats))
        .route("/graph/interactions", get(endpoints::graph::cross_interactions))
        .route(
            "/graph/drug/{id}/interactions",
            get(endpoints::graph::interactions),
        )
        .route("/graph/drug/{id}/related", get(endpoints::graph::related))
        .route("/graph/drug/{id}/graph", get(endpoints::graph::drug_graph))
        .route(
            "/graph/disease/{id}/drugs",
            get(endpoints::graph::disease_drugs),
        )
        .route(
            "/graph/symptom/{symptom}/drugs",
            get(endpoints::graph::symptom_drugs),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::api::types::ApiLimits;
    use crate::db::{repository, Database};
    use crate::external::catalog::CatalogClient;
    use crate::external::ExternalError;
    use crate::graph::testing::StaticGraph;
    use crate::graph::{CrossInteraction, GraphSource};
    use crate::ingest::sync::SyncService;
    use crate::memory::embedded::EmbeddedStore;
    use crate::memory::service::MemoryService;
    use crate::models::{Disease, Drug};
    use crate::search::bm25::Bm25Index;
    use crate::search::dense::{DenseIndex, NewVector};
    use crate::search::orchestrator::{EngineOptions, RetrievalEngine};
    use crate::search::reranker::{RerankHit, RerankModel, Reranker};
    use crate::search::sparse::{SparseEncode, SparseVector};
    use crate::search::{AnswerModel, Embedder};

    const DIM: usize = 3;

    fn keyword_axis(text: &str) -> Vec<f32> {
        let mut v = vec![0.05f32; DIM];
        if text.contains("두통") || text.contains("머리") {
            v[0] = 1.0;
        }
        if text.contains("감기") || text.contains("콧물") {
            v[1] = 1.0;
        }
        if text.contains("소화") || text.contains("복통") {
            v[2] = 1.0;
        }
        v
    }

    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
            Ok(keyword_axis(text))
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
            Ok(texts.iter().map(|t| keyword_axis(t)).collect())
        }
        fn dimension(&self) -> usize {
            DIM
        }
    }

    struct NoSparse;

    #[async_trait]
    impl SparseEncode for NoSparse {
        fn is_available(&self) -> bool {
            false
        }
        async fn encode(&self, _text: &str, _expand: bool) -> SparseVector {
            SparseVector::default()
        }
        async fn encode_batch(&self, texts: &[String], _batch: usize) -> Vec<SparseVector> {
            vec![SparseVector::default(); texts.len()]
        }
    }

    struct DisabledRerank;

    #[async_trait]
    impl RerankModel for DisabledRerank {
        fn is_enabled(&self) -> bool {
            false
        }
        async fn rerank(
            &self,
            _query: &str,
            _documents: &[String],
            _top_n: usize,
        ) -> Result<Vec<RerankHit>, ExternalError> {
            Ok(Vec::new())
        }
    }

    /// Records every prompt it sees, returns a canned answer.
    struct CapturingAnswer {
        prompts: Mutex<Vec<String>>,
    }

    impl CapturingAnswer {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnswerModel for CapturingAnswer {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, ExternalError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("증상에 맞는 의약품 안내입니다.".to_string())
        }
    }

    async fn seed_corpus(db: &Database, dense: &DenseIndex) {
        let conn = db.connect().unwrap();
        for (id, name, efficacy) in [
            ("D1", "두통엔정", "두통, 치통, 발열 완화"),
            ("D2", "콜드콜시럽", "감기 증상 완화, 콧물, 기침"),
            ("D3", "소화엔정", "소화불량, 복통 개선"),
        ] {
            repository::upsert_drug(
                &conn,
                &Drug {
                    id: id.to_string(),
                    item_name: name.to_string(),
                    entp_name: Some("한국제약".to_string()),
                    efficacy: Some(efficacy.to_string()),
                    use_method: Some("1일 3회".to_string()),
                    warning_info: None,
                    caution_info: None,
                    interaction: None,
                    side_effects: None,
                    storage_method: None,
                    data_source: "seed".to_string(),
                },
            )
            .unwrap();
        }
        repository::upsert_disease(
            &conn,
            &Disease {
                id: "DIS1".to_string(),
                name: "긴장성 두통".to_string(),
                name_en: None,
                category: None,
                description: None,
                causes: Some("스트레스".to_string()),
                symptoms: Some("두통".to_string()),
                diagnosis: None,
                treatment: Some("진통제".to_string()),
                prevention: None,
                related_drugs: None,
            },
        )
        .unwrap();
        drop(conn);

        dense
            .insert_drug_vectors(vec![
                NewVector {
                    owner_id: "D1".to_string(),
                    embedding: keyword_axis("두통"),
                    document: "두통 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
                NewVector {
                    owner_id: "D2".to_string(),
                    embedding: keyword_axis("감기"),
                    document: "감기 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
                NewVector {
                    owner_id: "D3".to_string(),
                    embedding: keyword_axis("소화"),
                    document: "소화 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
            ])
            .await
            .unwrap();
        dense
            .insert_disease_vectors(vec![NewVector {
                owner_id: "DIS1".to_string(),
                embedding: keyword_axis("두통"),
                document: "증상 청크".to_string(),
                chunk_index: 0,
                chunk_type: Some("symptoms".to_string()),
            }])
            .await
            .unwrap();
    }

    async fn test_state(
        dir: &tempfile::TempDir,
        graph: Option<Arc<dyn GraphSource>>,
        answerer: Arc<dyn AnswerModel>,
    ) -> AppState {
        let db = Database::open(dir.path().join("api.db")).unwrap();
        let dense = DenseIndex::new(db.clone(), DIM);
        seed_corpus(&db, &dense).await;

        let bm25 = Arc::new(Bm25Index::new(db.clone()));
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
        let sparse: Arc<dyn SparseEncode> = Arc::new(NoSparse);

        let engine = Arc::new(RetrievalEngine::new(
            dense.clone(),
            bm25.clone(),
            embedder.clone(),
            sparse.clone(),
            Reranker::new(Arc::new(DisabledRerank)),
            answerer,
            None,
            graph.clone(),
            EngineOptions::default(),
        ));

        let store = EmbeddedStore::connect(dir.path().join("memory.db"))
            .await
            .unwrap();
        let memory = Arc::new(MemoryService::new(Arc::new(store), None));

        let sync = Arc::new(SyncService::new(
            db.clone(),
            CatalogClient::new("http://127.0.0.1:1/", ""),
            embedder,
            sparse,
            dense,
            None,
            bm25,
        ));

        AppState {
            db,
            engine,
            memory,
            graph,
            sync,
            limits: ApiLimits::default(),
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── /search ─────────────────────────────────────────────────

    #[tokio::test]
    async fn search_ranks_headache_drug_first() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/search",
                serde_json::json!({
                    "query": "머리가 아파요",
                    "top_k": 3,
                    "include_ai_response": false,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["results"][0]["item_name"], "두통엔정");
        assert!(body["data"]["results"][0]["similarity"].as_f64().unwrap() > 0.0);
        assert!(body["meta"]["response_time_ms"].is_u64());
        assert_eq!(body["meta"]["query"], "머리가 아파요");

        // The analytics row is written once per request.
        let conn = state.db.connect().unwrap();
        assert_eq!(repository::count_search_logs(&conn).unwrap(), 1);
    }

    #[tokio::test]
    async fn search_synonym_expansion_finds_stomach_drug() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json(
                "/search",
                serde_json::json!({
                    "query": "배가 아파요",
                    "top_k": 3,
                    "include_ai_response": false,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let names: Vec<&str> = body["data"]["results"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["item_name"].as_str())
            .collect();
        assert!(names.contains(&"소화엔정"), "missing in {names:?}");
    }

    #[tokio::test]
    async fn search_rejects_out_of_range_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json(
                "/search",
                serde_json::json!({"query": "두통", "top_k": 25}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json("/search", serde_json::json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_with_answer_includes_context_sections() {
        let dir = tempfile::tempdir().unwrap();
        let answerer = Arc::new(CapturingAnswer::new());
        let state = test_state(&dir, None, answerer.clone()).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json(
                "/search",
                serde_json::json!({"query": "머리가 아파요", "top_k": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["data"]["ai_response"], "증상에 맞는 의약품 안내입니다.");
        assert!(body["data"]["disclaimer"].as_str().unwrap().contains("참고용"));

        let prompts = answerer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("=== 추천 의약품 정보 ==="));
        assert!(prompts[0].contains("=== 관련 질병 정보 ==="));
    }

    #[tokio::test]
    async fn search_with_graph_appends_interaction_block() {
        let dir = tempfile::tempdir().unwrap();
        let graph: Arc<dyn GraphSource> = Arc::new(StaticGraph::with_interaction(
            CrossInteraction {
                drug_id_1: "D1".to_string(),
                item_name_1: "두통엔정".to_string(),
                drug_id_2: "D3".to_string(),
                item_name_2: "소화엔정".to_string(),
                interaction_type: "caution".to_string(),
                severity: 4,
                description: String::new(),
            },
        ));
        let answerer = Arc::new(CapturingAnswer::new());
        let state = test_state(&dir, Some(graph), answerer.clone()).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json(
                "/search",
                serde_json::json!({"query": "두통", "top_k": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let prompts = answerer.prompts.lock().unwrap();
        assert!(prompts[0].contains("[약물 관계 정보]"));
        assert!(prompts[0].contains("두통엔정 ↔ 소화엔정: caution (위험도: 경고)"));
    }

    // ── /chat ───────────────────────────────────────────────────

    #[tokio::test]
    async fn chat_caches_and_counts_turns() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let first = app
            .clone()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "두통약 추천", "session_id": "S"}),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;
        assert_eq!(first["from_cache"], false);
        assert_eq!(first["conversation_turn"], 1);
        assert_eq!(first["session_id"], "S");
        assert!(!first["sources"].as_array().unwrap().is_empty());

        let second = app
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "두통약 추천", "session_id": "S"}),
            ))
            .await
            .unwrap();
        let second = json_body(second).await;
        assert_eq!(second["from_cache"], true);
        assert_eq!(second["conversation_turn"], 2);
        assert_eq!(second["message"], first["message"]);
    }

    #[tokio::test]
    async fn chat_generates_session_id_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"message": "두통약"})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert!(uuid::Uuid::parse_str(body["session_id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn chat_rejects_invalid_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        for top_k in [0, 11] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/chat",
                    serde_json::json!({"message": "두통", "top_k": top_k}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "top_k={top_k}");
        }
    }

    #[tokio::test]
    async fn chat_history_keeps_ring_window() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state.clone());

        for i in 1..=25 {
            state
                .memory
                .add_to_history("S", &format!("질문 {i}"), &format!("응답 {i}"), &[])
                .await
                .unwrap();
        }

        let response = app
            .oneshot(get("/chat/history/S"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 20);
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns[0]["query"], "질문 6");
        assert_eq!(turns[19]["query"], "질문 25");
    }

    #[tokio::test]
    async fn chat_history_delete_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state.clone());

        let _ = state.memory.add_to_history("S", "q", "r", &[]).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/chat/history/S")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/chat/history/S")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 0);
    }

    // ── /drugs ──────────────────────────────────────────────────

    #[tokio::test]
    async fn drugs_list_and_detail() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app.clone().oneshot(get("/drugs?limit=2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["drugs"].as_array().unwrap().len(), 2);

        let response = app.clone().oneshot(get("/drugs/D1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["drug"]["item_name"], "두통엔정");

        let response = app.oneshot(get("/drugs/NOPE")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ── /admin ──────────────────────────────────────────────────

    #[tokio::test]
    async fn admin_health_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app.clone().oneshot(get("/admin/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");

        let response = app.oneshot(get("/admin/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["drugs_count"], 3);
        assert_eq!(body["graph_enabled"], false);
    }

    #[tokio::test]
    async fn admin_rebuild_vectors_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/rebuild-vectors")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["vectors_created"], 3);
    }

    #[tokio::test]
    async fn admin_sync_validates_page_bound() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .oneshot(post_json(
                "/admin/sync",
                serde_json::json!({"max_pages": 500}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── /graph ──────────────────────────────────────────────────

    #[tokio::test]
    async fn graph_routes_answer_503_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, None, Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app.clone().oneshot(get("/graph/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .clone()
            .oneshot(get("/graph/drug/D1/interactions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Health reports the flag instead of failing.
        let response = app.oneshot(get("/graph/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["enabled"], false);
    }

    #[tokio::test]
    async fn graph_interaction_route_validates_depth() {
        let dir = tempfile::tempdir().unwrap();
        let graph: Arc<dyn GraphSource> = Arc::new(StaticGraph::default());
        let state = test_state(&dir, Some(graph), Arc::new(CapturingAnswer::new())).await;
        let app = api_router(state);

        let response = app
            .clone()
            .oneshot(get("/graph/drug/D1/interactions?depth=7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get("/graph/drug/D1/interactions?depth=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
