//! Personal knowledge base with memory evolution, served over MCP.
//!
//! Noesis stores notes in SQLite, keeps an in-memory similarity index over
//! them, and, when both an embedding model and a completion model are
//! available, lets every new note reshape its semantic neighbours: proposing
//! bidirectional links, propagating tags, and refreshing context summaries.
//! Every `threshold` notes the index is rebuilt from the full store.
//!
//! # Architecture
//!
//! - **Storage**: SQLite via `rusqlite`; notes, tags, and tag membership
//! - **Embeddings**: local ONNX Runtime (all-MiniLM-L6-v2) or an offline
//!   feature-hashing embedder
//! - **Index**: exhaustive cosine scan over an `ndarray` matrix, with an
//!   atomic `bincode` snapshot on disk
//! - **Completions**: OpenAI-compatible chat API with JSON-schema responses
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, and migrations
//! - [`notes`]: note and tag records and the document store
//! - [`embedding`]: text-to-vector capability
//! - [`completion`]: prompt-to-text capability
//! - [`index`]: the similarity index and its snapshot
//! - [`evolution`]: relation analysis, suggestion application, consolidation
//! - [`enrich`]: keyword, context, and importance extraction for new notes
//! - [`search`]: text, semantic, and hybrid search
//! - [`knowledge`]: the composition root used by the tools and the CLI

pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod evolution;
pub mod index;
pub mod knowledge;
pub mod notes;
pub mod search;
pub mod server;
pub mod tools;
