//! Environment-driven settings.
//!
//! Every recognized key has a default suitable for local development;
//! the few that gate external collaborators (API keys, URLs) disable
//! the collaborator when absent instead of failing, except for the
//! embedding credential which the pipeline cannot run without.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("DENSE_WEIGHT + SPARSE_WEIGHT must sum to 1.0 (got {0})")]
    WeightSum(f64),
}

/// Which memory-store backend serves the cache/history fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBackendKind {
    NetworkKv,
    EmbeddedDb,
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Server
    pub bind_addr: String,
    pub database_path: PathBuf,

    // Dense embedding + answer model (OpenAI-style API)
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub llm_model: String,

    // Reranker (Cohere-style API)
    pub cohere_api_key: String,
    pub cohere_base_url: String,
    pub cohere_rerank_model: String,
    pub enable_reranking: bool,
    pub rerank_top_n: usize,

    // Sparse encoder (lexical-weight inference server)
    pub splade_model: String,
    pub sparse_encoder_url: String,
    pub splade_max_score: f32,

    // Hybrid fusion
    pub enable_hybrid_search: bool,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub bm25_max_score: f32,

    // Native multi-vector store
    pub enable_native_vector_store: bool,
    pub vector_store_url: String,
    pub vector_store_collection: String,

    // Graph store
    pub enable_neo4j: bool,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Memory fabric
    pub enable_memory: bool,
    pub memory_backend: MemoryBackendKind,
    pub enable_persistent_memory: bool,
    pub redis_url: String,
    pub memory_db_path: PathBuf,

    // Search constants
    pub default_top_k: usize,
    pub max_top_k: usize,

    // Upstream drug catalog
    pub catalog_base_url: String,
    pub catalog_api_key: String,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Returns an error for fatal misconfiguration: missing embedding
    /// credential, malformed numbers, or fusion weights that do not
    /// sum to 1.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var("MEDISEEK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let openai_api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ConfigError::Missing("OPENAI_API_KEY"))?;

        let dense_weight = parse_f32("DENSE_WEIGHT", 0.7)?;
        let sparse_weight = parse_f32("SPARSE_WEIGHT", 0.3)?;
        if ((dense_weight + sparse_weight) as f64 - 1.0).abs() >= 1e-9 {
            return Err(ConfigError::WeightSum((dense_weight + sparse_weight) as f64));
        }

        let memory_backend = match env_or("MEMORY_BACKEND", "embedded-db").as_str() {
            "network-kv" => MemoryBackendKind::NetworkKv,
            "embedded-db" => MemoryBackendKind::EmbeddedDb,
            other => {
                return Err(ConfigError::Invalid {
                    key: "MEMORY_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let embedding_dimensions = parse_usize("EMBEDDING_DIMENSIONS", 1536)?;
        if embedding_dimensions == 0 {
            return Err(ConfigError::Invalid {
                key: "EMBEDDING_DIMENSIONS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8000"),
            database_path: data_dir.join("mediseek.db"),

            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions,
            llm_model: env_or("LLM_MODEL", "gpt-4o-mini"),

            cohere_api_key: env_or("COHERE_API_KEY", ""),
            cohere_base_url: env_or("COHERE_BASE_URL", "https://api.cohere.com"),
            cohere_rerank_model: env_or("COHERE_RERANK_MODEL", "rerank-multilingual-v3.0"),
            enable_reranking: parse_bool("ENABLE_RERANKING", true)?,
            rerank_top_n: parse_usize("RERANK_TOP_N", 5)?,

            splade_model: env_or("SPLADE_MODEL", "BAAI/bge-m3"),
            sparse_encoder_url: env_or("SPARSE_ENCODER_URL", ""),
            splade_max_score: parse_f32("SPLADE_MAX_SCORE", 10.0)?,

            enable_hybrid_search: parse_bool("ENABLE_HYBRID_SEARCH", true)?,
            dense_weight,
            sparse_weight,
            bm25_max_score: parse_f32("BM25_MAX_SCORE", 30.0)?,

            enable_native_vector_store: parse_bool("ENABLE_NATIVE_VECTOR_STORE", false)?,
            vector_store_url: env_or("VECTOR_STORE_URL", "http://localhost:6334"),
            vector_store_collection: env_or("VECTOR_STORE_COLLECTION", "drugs"),

            enable_neo4j: parse_bool("ENABLE_NEO4J", false)?,
            neo4j_uri: env_or("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: env_or("NEO4J_USER", "neo4j"),
            neo4j_password: env_or("NEO4J_PASSWORD", ""),

            enable_memory: parse_bool("ENABLE_MEMORY", true)?,
            memory_backend,
            enable_persistent_memory: parse_bool("ENABLE_PERSISTENT_MEMORY", false)?,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            memory_db_path: data_dir.join("memory.db"),

            default_top_k: parse_usize("DEFAULT_TOP_K", 5)?,
            max_top_k: parse_usize("MAX_TOP_K", 20)?,

            catalog_base_url: env_or(
                "CATALOG_BASE_URL",
                "http://apis.data.go.kr/1471000/DrbEasyDrugInfoService/getDrbEasyDrugList",
            ),
            catalog_api_key: env_or("CATALOG_API_KEY", ""),
        })
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediseek")
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
    }
}

fn parse_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn parse_f32(key: &'static str, default: f32) -> Result<f32, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        std::env::set_var("MEDISEEK_TEST_BOOL", "true");
        assert!(parse_bool("MEDISEEK_TEST_BOOL", false).unwrap());
        std::env::set_var("MEDISEEK_TEST_BOOL", "0");
        assert!(!parse_bool("MEDISEEK_TEST_BOOL", true).unwrap());
        std::env::remove_var("MEDISEEK_TEST_BOOL");
        assert!(parse_bool("MEDISEEK_TEST_BOOL", true).unwrap());
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        std::env::set_var("MEDISEEK_TEST_BOOL2", "maybe");
        assert!(parse_bool("MEDISEEK_TEST_BOOL2", true).is_err());
        std::env::remove_var("MEDISEEK_TEST_BOOL2");
    }

    #[test]
    fn parse_usize_uses_default_when_unset() {
        assert_eq!(parse_usize("MEDISEEK_TEST_UNSET", 5).unwrap(), 5);
    }
}
