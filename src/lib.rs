//! # DocChat
//!
//! A multi-session, document-grounded question answering service over
//! local PDFs.
//!
//! Users create named chat sessions, upload PDF documents into them, and
//! ask questions whose answers are constrained to the uploaded documents
//! plus the prior conversation. Embeddings and answer generation come
//! from a local Ollama server; everything else — chunking, the
//! per-session vector index, history, retrieval, orchestration — is
//! local.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌────────────────────┐
//! │ PDF      │──▶│ Pipeline       │──▶│ Per-session SQLite │
//! │ uploads  │   │ Chunk + Embed │   │ vector index       │
//! └──────────┘   └───────────────┘   └─────────┬──────────┘
//!                                              │  MMR top-k
//!                ┌──────────────┐    ┌─────────▼──────────┐
//!                │ History log  │◀──▶│ Answer pipeline     │──▶ Ollama
//!                │ (JSONL)      │    │ (prompt + generate) │
//!                └──────────────┘    └────────────────────┘
//! ```
//!
//! Each session owns three co-located artifacts keyed by its id: an index
//! directory, an uploads directory, and a history log. They move together
//! on rename and die together on clear.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`name`] | Session name validation |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language model client |
//! | [`index`] | Per-session persistent vector index |
//! | [`indexer`] | Document indexing pipeline |
//! | [`retriever`] | Diversity-aware top-k retrieval |
//! | [`history`] | Durable conversation log |
//! | [`registry`] | In-memory session registry |
//! | [`service`] | Session operations and answering |
//! | [`server`] | HTTP JSON API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod history;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod name;
pub mod registry;
pub mod retriever;
pub mod server;
pub mod service;
