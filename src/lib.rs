//! `genome-gateway`: MCP tool gateway for genomic prediction.
//!
//! Exposes a fixed catalogue of genomic-analysis operations over the Model
//! Context Protocol (stdio, JSON-RPC 2.0, newline-delimited). Each call is
//! validated, then either answered in-process or forwarded to an external
//! prediction engine that runs as one process per invocation.
//!
//! # Operations
//!
//! - Prediction: `predict_sequence`, `predict_interval`, `predict_variant`
//!   and their batches `predict_sequences`, `predict_intervals`, `predict_variants`
//! - Scoring: `score_variant`, `score_variants`, `score_interval`,
//!   `score_intervals`, `score_ism_variants`
//! - Composites: `compare_sequences`, `rank_variants_by_impact`
//! - Engine utilities: `get_metadata`, `analyze_gene_region`
//! - Local utilities: `parse_variant_string`, `validate_genomic_data`,
//!   `get_supported_outputs`, `calculate_genomic_overlap`, `get_sequence_info`
//!
//! # Architecture
//!
//! ```text
//! stdin (JSON-RPC) → server → ToolRouter → registry → validate → Plan
//!                                                               ↓
//!                                            engine (one process per call)
//!                                            batch  (bounded worker pool)
//! stdout (JSON-RPC) ←───────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod genome;
pub mod server;
pub mod tools;

pub use config::GatewayConfig;
pub use error::{ConfigError, ErrorKind, GatewayError, GatewayResult};
pub use server::{run_mcp_server, serve};
