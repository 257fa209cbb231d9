//! Default tunables for the memory server.
//!
//! Every default here is overridable through [`crate::config::MemoryConfig`];
//! this module exists so the numbers have one authoritative home instead of
//! being scattered as magic literals across the crate.

/// Connections opened per project by the connection pool (C1).
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Maximum entries retained by the query result cache (C2).
pub const DEFAULT_CACHE_MAX_SIZE: usize = 500;

/// Time-to-live, in seconds, of a query result cache entry (C2).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Word-window size used when chunking documents (C6).
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Word overlap between consecutive chunks (C6).
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Expected dense-vector dimension (C6). Must match the embedding function
/// in use; a mismatch aborts the ingesting document.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Facts below this confidence are dropped at extraction time (C7).
pub const DEFAULT_MIN_FACT_CONFIDENCE: f32 = 0.7;

/// Episodes below this confidence are dropped at extraction time (C7/C5).
pub const DEFAULT_MIN_EPISODE_CONFIDENCE: f32 = 0.6;

/// Messages shorter than this are skipped by the conversation analyzer (C7).
pub const DEFAULT_MIN_MESSAGE_LENGTH: usize = 10;

/// Authority weight applied to symbolic facts when merging results (C8).
pub const DEFAULT_AUTHORITY_SYMBOLIC: f32 = 1.00;

/// Authority weight applied to episodic lessons when merging results (C8).
pub const DEFAULT_AUTHORITY_EPISODIC: f32 = 0.85;

/// Authority weight scale applied to clipped semantic similarity (C8).
pub const DEFAULT_AUTHORITY_SEMANTIC: f32 = 0.90;

/// Advisory confidence ceiling applied to newly recorded episodes (C5).
pub const DEFAULT_EPISODE_CONFIDENCE_CEILING: f32 = 0.85;

/// Default per-section character cap in the assembled context payload (C9).
pub const DEFAULT_SECTION_CAP_CHARS: usize = 2_000;

/// Upper bound on a configured skip-pattern's source length, guarding
/// against pathological regex compilation cost (C7).
pub const MAX_SKIP_PATTERN_LENGTH: usize = 1_000;

/// Default `top_k` used when a caller omits it.
pub const DEFAULT_TOP_K: usize = 5;
