//! Core of a local-first, multi-tenant retrieval-augmented memory server.
//!
//! This crate owns the pure, storage-agnostic half of the system: the
//! query result cache (C2), the conversation analyzer (C7), the
//! authority-weighted memory reader (C8), the context assembler (C9), and
//! the trait contracts a storage backend must satisfy for the symbolic
//! (C4), episodic (C5) and semantic (C6) substrates, the per-project
//! vector index manager (C3) and the project registry (C10). The
//! [`engine::MemoryEngine`] composes all of the above behind the external
//! tool surface.
//!
//! Concrete storage is provided by separate crates: `memory-storage-redb`
//! (the per-project vector index and root project registry) and
//! `memory-storage-sqlite` (the connection pool and relational
//! symbolic/episodic/semantic stores, which depends on
//! `memory-storage-redb` for vector operations).
//!
//! # Quick start
//!
//! ```
//! use memory_core::config::MemoryConfig;
//! use memory_core::embeddings::{cosine_similarity, MockEmbedder};
//!
//! let config = MemoryConfig::default();
//! assert_eq!(config.pool_size, 5);
//!
//! let v = vec![1.0_f32, 0.0, 0.0];
//! assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
//!
//! let embedder = MockEmbedder::new(config.embedding_dim);
//! assert_eq!(embedder.dimension(), 384);
//! # use memory_core::embeddings::Embedder as _;
//! ```
//!
//! Wiring a full [`engine::MemoryEngine`] requires concrete
//! [`symbolic::SymbolicStore`], [`episodic::EpisodicStore`],
//! [`semantic::SemanticStore`] and [`registry::ProjectRegistry`]
//! implementations; see `memory-storage-redb` and `memory-storage-sqlite`
//! for the ones this server ships with.

#![allow(clippy::cast_precision_loss, clippy::module_name_repetitions)]

pub mod analyzer;
pub mod assembler;
pub mod cache;
pub mod completion;
pub mod config;
pub mod constants;
pub mod embeddings;
pub mod engine;
pub mod episodic;
pub mod error;
pub mod index;
pub mod project;
pub mod reader;
pub mod registry;
pub mod semantic;
pub mod symbolic;

pub use config::MemoryConfig;
pub use engine::MemoryEngine;
pub use error::{Error, Result};
