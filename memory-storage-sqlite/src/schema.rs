//! Relational schema for the symbolic (C4), episodic (C5) and semantic (C6)
//! memory substrates.

/// Facts table: one row per current value of `(project_id, scope,
/// category, key)`. The unique index makes upsert-on-conflict the natural
/// way to express "replace if present".
pub const CREATE_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    scope TEXT NOT NULL,
    category TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    confidence REAL NOT NULL,
    source TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// Enforces "at most one current value" per `(project_id, scope, category,
/// key)`; the store's `add_fact` relies on this to detect replace-vs-insert.
pub const CREATE_FACTS_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_facts_identity
ON facts(project_id, scope, category, key)
"#;

pub const CREATE_FACTS_PROJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_facts_project
ON facts(project_id)
"#;

/// One row per historical mutation of a fact, for audit completeness.
/// Carries `project_id` directly (rather than requiring a join back to
/// `facts`) so project deletion can clear history for facts that have
/// themselves already been deleted.
pub const CREATE_FACT_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fact_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    at INTEGER NOT NULL,
    prev_value TEXT NOT NULL,
    prev_confidence REAL NOT NULL,
    reason TEXT NOT NULL
)
"#;

pub const CREATE_FACT_HISTORY_FACT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_fact_history_fact
ON fact_history(fact_id)
"#;

pub const CREATE_FACT_HISTORY_PROJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_fact_history_project
ON fact_history(project_id)
"#;

/// `session_id` is nullable: only [`memory_core::config::DeduplicationMode::PerSession`]
/// consults it, and callers outside a session omit it.
pub const CREATE_EPISODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    situation TEXT NOT NULL,
    action TEXT NOT NULL,
    outcome TEXT NOT NULL,
    lesson TEXT NOT NULL,
    lesson_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    quality REAL NOT NULL,
    fingerprint TEXT NOT NULL,
    ref_count INTEGER NOT NULL DEFAULT 1,
    session_id TEXT
)
"#;

/// Backs the dedup-window lookup: "has this exact fingerprint been seen in
/// this project within the active window".
pub const CREATE_EPISODES_FINGERPRINT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_episodes_fingerprint
ON episodes(project_id, fingerprint)
"#;

pub const CREATE_EPISODES_RECENCY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_episodes_recency
ON episodes(project_id, created_at DESC)
"#;

pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    doc_id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    source_type TEXT NOT NULL,
    metadata TEXT NOT NULL,
    ingested_at INTEGER NOT NULL
)
"#;

pub const CREATE_DOCUMENTS_PROJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_documents_project
ON documents(project_id)
"#;

/// Relational half of a chunk (text + metadata); the embedding itself lives
/// only in the project's [`memory_core::index::VectorIndex`], not here —
/// this table exists so `get_chunk_by_id`/`list_documents` never need to
/// open the vector index for text-only lookups.
pub const CREATE_CHUNKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY NOT NULL,
    doc_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    text TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    metadata TEXT NOT NULL
)
"#;

pub const CREATE_CHUNKS_DOC_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chunks_doc
ON chunks(doc_id)
"#;

pub const CREATE_CHUNKS_PROJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chunks_project
ON chunks(project_id)
"#;

/// Every DDL statement, in dependency order (tables before their indexes).
/// `init_schema` runs these in sequence against a fresh connection.
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_FACTS_TABLE,
    CREATE_FACTS_UNIQUE_INDEX,
    CREATE_FACTS_PROJECT_INDEX,
    CREATE_FACT_HISTORY_TABLE,
    CREATE_FACT_HISTORY_FACT_INDEX,
    CREATE_FACT_HISTORY_PROJECT_INDEX,
    CREATE_EPISODES_TABLE,
    CREATE_EPISODES_FINGERPRINT_INDEX,
    CREATE_EPISODES_RECENCY_INDEX,
    CREATE_DOCUMENTS_TABLE,
    CREATE_DOCUMENTS_PROJECT_INDEX,
    CREATE_CHUNKS_TABLE,
    CREATE_CHUNKS_DOC_INDEX,
    CREATE_CHUNKS_PROJECT_INDEX,
];

/// Run every DDL statement against `connection`. Idempotent: every
/// statement is `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns a storage-backend error if any statement fails.
pub async fn init_schema(connection: &libsql::Connection) -> memory_core::error::Result<()> {
    for statement in ALL_STATEMENTS {
        connection
            .execute(statement, ())
            .await
            .map_err(|e| memory_core::error::Error::Storage(e.into()))?;
    }
    Ok(())
}
