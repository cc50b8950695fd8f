//! API server entry point.
//!
//! Builds every process-lifecycle resource once (relational store,
//! lexical index, model clients, memory fabric, vector store, graph),
//! wires them into the retrieval engine and serves the router until
//! shutdown. No work happens at import time; everything is explicit
//! here.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mediseek::api::router::api_router;
use mediseek::api::types::{ApiLimits, AppState};
use mediseek::config::{MemoryBackendKind, Settings};
use mediseek::db::Database;
use mediseek::external::catalog::CatalogClient;
use mediseek::external::cohere::CohereReranker;
use mediseek::external::openai::OpenAiClient;
use mediseek::graph::neo4j::Neo4jGraph;
use mediseek::graph::GraphSource;
use mediseek::ingest::sync::SyncService;
use mediseek::memory::embedded::EmbeddedStore;
use mediseek::memory::redis_store::RedisStore;
use mediseek::memory::service::MemoryService;
use mediseek::memory::store::{MemoryStore, NullStore};
use mediseek::search::bm25::Bm25Index;
use mediseek::search::dense::DenseIndex;
use mediseek::search::fusion::FusionWeights;
use mediseek::search::orchestrator::{EngineOptions, RetrievalEngine};
use mediseek::search::reranker::Reranker;
use mediseek::search::sparse::LexicalWeightEncoder;
use mediseek::search::vector_store::{QdrantStore, VectorStoreBackend};
use mediseek::search::{AnswerModel, Embedder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(
        hybrid = settings.enable_hybrid_search,
        reranking = settings.enable_reranking,
        native_store = settings.enable_native_vector_store,
        graph = settings.enable_neo4j,
        memory = settings.enable_memory,
        "starting mediseek"
    );

    let db = Database::open(settings.database_path.clone())?;
    let dense = DenseIndex::new(db.clone(), settings.embedding_dimensions);
    let bm25 = Arc::new(Bm25Index::new(db.clone()));

    let openai = Arc::new(OpenAiClient::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.embedding_model,
        settings.embedding_dimensions,
        &settings.llm_model,
    ));
    let embedder: Arc<dyn Embedder> = openai.clone();
    let answerer: Arc<dyn AnswerModel> = openai;

    let reranker = Reranker::new(Arc::new(CohereReranker::new(
        &settings.cohere_base_url,
        &settings.cohere_api_key,
        &settings.cohere_rerank_model,
        settings.enable_reranking,
    )));

    let sparse_encoder = Arc::new(LexicalWeightEncoder::new(
        &settings.sparse_encoder_url,
        &settings.splade_model,
    ));

    let native_store: Option<Arc<dyn VectorStoreBackend>> = if settings.enable_native_vector_store
    {
        match QdrantStore::connect(
            &settings.vector_store_url,
            &settings.vector_store_collection,
            settings.embedding_dimensions,
            settings.splade_max_score,
        )
        .await
        {
            Ok(store) => Some(Arc::new(store)),
            Err(error) => {
                tracing::warn!(%error, "vector store unreachable; using fallback retrieval");
                None
            }
        }
    } else {
        None
    };

    let graph: Option<Arc<dyn GraphSource>> = if settings.enable_neo4j {
        match Neo4jGraph::connect(
            &settings.neo4j_uri,
            &settings.neo4j_user,
            &settings.neo4j_password,
        )
        .await
        {
            Ok(graph) => Some(Arc::new(graph)),
            Err(error) => {
                tracing::warn!(%error, "graph store unreachable; enrichment disabled");
                None
            }
        }
    } else {
        None
    };

    let memory_store: Arc<dyn MemoryStore> = if !settings.enable_memory {
        Arc::new(NullStore)
    } else {
        match settings.memory_backend {
            MemoryBackendKind::NetworkKv => {
                Arc::new(RedisStore::connect(&settings.redis_url).await)
            }
            MemoryBackendKind::EmbeddedDb => {
                match EmbeddedStore::connect(settings.memory_db_path.clone()).await {
                    Ok(store) => Arc::new(store),
                    Err(error) => {
                        tracing::warn!(%error, "embedded memory store failed; memory disabled");
                        Arc::new(NullStore)
                    }
                }
            }
        }
    };
    let mirror = settings.enable_persistent_memory.then(|| db.clone());
    let memory = Arc::new(MemoryService::new(memory_store, mirror));

    let engine = Arc::new(RetrievalEngine::new(
        dense.clone(),
        bm25.clone(),
        embedder.clone(),
        sparse_encoder.clone(),
        reranker,
        answerer,
        native_store.clone(),
        graph.clone(),
        EngineOptions {
            enable_hybrid: settings.enable_hybrid_search,
            weights: FusionWeights {
                dense: settings.dense_weight,
                sparse: settings.sparse_weight,
            },
            bm25_max_score: settings.bm25_max_score,
        },
    ));

    let sync = Arc::new(SyncService::new(
        db.clone(),
        CatalogClient::new(&settings.catalog_base_url, &settings.catalog_api_key),
        embedder,
        sparse_encoder,
        dense,
        native_store,
        bm25,
    ));

    let state = AppState {
        db,
        engine,
        memory,
        graph,
        sync,
        limits: ApiLimits {
            default_top_k: settings.default_top_k,
            max_top_k: settings.max_top_k,
        },
    };

    let app = api_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
