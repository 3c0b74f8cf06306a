//! # CaseLens
//!
//! A semantic search engine for legal case law.
//!
//! CaseLens ingests a corpus of court decisions, splits each decision into
//! overlapping word windows, embeds every window through an external
//! embedding provider, and persists the result as a single JSON vector
//! store. At query time the engine embeds the query, cosine-scores every
//! stored chunk, applies structured metadata filters (year range, court,
//! keywords), collapses hits to the best chunk per case, and returns the
//! top-ranked cases with display snippets — via a CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│   Pipeline    │──▶│ Vector store │
//! │  (JSON)  │   │ Chunk+Embed  │   │   (JSON)     │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(caselens)│       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! caselens ingest --input data/cases.json   # chunk + embed the corpus
//! caselens search "duty of care" --court SCC --year-from 2015
//! caselens stats                            # summarize the store
//! caselens serve                            # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the persisted store shape |
//! | [`errors`] | Boundary error taxonomy |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`embedding`] | Embedding provider abstraction and batch client |
//! | [`store`] | Store persistence and the swappable serving snapshot |
//! | [`search`] | Filter, score, rank, and format |
//! | [`ingest`] | Corpus ingestion pipeline |
//! | [`stats`] | Store summary |
//! | [`server`] | JSON HTTP API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod ingest;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
