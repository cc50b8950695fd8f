//! mediseek: symptom-to-drug retrieval service.
//!
//! Hybrid dense+sparse retrieval over a curated drug/disease corpus,
//! with cross-encoder reranking, graph enrichment, session memory and
//! an answer model on top. The HTTP surface lives in `api`; everything
//! else is the retrieval core.

pub mod api;
pub mod config;
pub mod db;
pub mod external;
pub mod graph;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod search;
