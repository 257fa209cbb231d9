//! Memory Engine (C11): the composition root exposing the tool surface.
//!
//! `MemoryEngine::init` wires the query cache, conversation analyzer and
//! memory reader/assembler (all owned, pure logic) around injected
//! storage-backend implementations of [`SymbolicStore`], [`EpisodicStore`],
//! [`SemanticStore`] and [`ProjectRegistry`]. Multiple engines may coexist
//! in one process; there is no global or static state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::{self, AnalysisResult};
use crate::cache::{CacheKey, QueryCache};
use crate::config::MemoryConfig;
use crate::embeddings::Embedder;
use crate::episodic::{AddEpisodeOutcome, Episode, EpisodeFilter, EpisodicStore};
use crate::error::Result;
use crate::project::{validate_project_id, Project};
use crate::reader::{self, MergedView};
use crate::registry::ProjectRegistry;
use crate::semantic::{Document, MetadataFilter, SemanticHit, SemanticStore};
use crate::symbolic::{AddFactOutcome, FactFilter, Source, SymbolicStore};

/// Which memory substrate a `mem.search` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// C4.
    Symbolic,
    /// C5.
    Episodic,
    /// C6.
    Semantic,
}

/// One document's inventory row, as returned by `src.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceListing {
    /// The document.
    pub document: Document,
    /// Number of chunks this document was split into.
    pub chunk_count: usize,
}

/// Cacheable payload: either a `ctx.get` merge or one memory type's search
/// hits from `mem.search`. Stored behind one [`QueryCache`] keyed with a
/// kind discriminant so the two call shapes never collide.
#[derive(Debug, Clone)]
enum CachedAnswer {
    Context(MergedView),
    SymbolicSearch(Vec<crate::symbolic::Fact>),
    EpisodicSearch(Vec<Episode>),
    SemanticSearch(Vec<SemanticHit>),
}

/// The composition root. See the module documentation for the wiring
/// contract.
pub struct MemoryEngine {
    config: MemoryConfig,
    symbolic: Arc<dyn SymbolicStore>,
    episodic: Arc<dyn EpisodicStore>,
    semantic: Arc<dyn SemanticStore>,
    registry: Arc<dyn ProjectRegistry>,
    embedder: Arc<dyn Embedder>,
    cache: QueryCache<CachedAnswer>,
}

impl MemoryEngine {
    /// Wire a new engine around the given configuration and storage-backend
    /// implementations.
    #[must_use]
    pub fn init(
        config: MemoryConfig,
        symbolic: Arc<dyn SymbolicStore>,
        episodic: Arc<dyn EpisodicStore>,
        semantic: Arc<dyn SemanticStore>,
        registry: Arc<dyn ProjectRegistry>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let cache = QueryCache::with_capacity_and_ttl(
            config.cache_max_size,
            std::time::Duration::from_secs(config.cache_ttl_seconds),
        );
        Self {
            config,
            symbolic,
            episodic,
            semantic,
            registry,
            embedder,
            cache,
        }
    }

    /// `proj.list`: every project known to this host.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    #[tracing::instrument(skip(self))]
    pub async fn proj_list(&self) -> Result<Vec<Project>> {
        self.registry.list().await
    }

    /// `src.list`: the document inventory for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    #[tracing::instrument(skip(self))]
    pub async fn src_list(&self, project_id: &str) -> Result<Vec<SourceListing>> {
        validate_project_id(project_id)?;
        let docs = self.semantic.list_documents(project_id).await?;
        Ok(docs
            .into_iter()
            .map(|(document, chunk_count)| SourceListing {
                document,
                chunk_count,
            })
            .collect())
    }

    /// `ctx.get`: the merged, authority-ranked view for `query`, served
    /// from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation, or any error surfaced by the underlying stores or the
    /// embedder.
    #[tracing::instrument(skip(self, query))]
    pub async fn ctx_get(
        &self,
        project_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<MergedView> {
        validate_project_id(project_id)?;
        let top_k = top_k.unwrap_or(crate::constants::DEFAULT_TOP_K);
        let cache_query = format!("ctx|{query}");
        let key = CacheKey::new(project_id, &cache_query, top_k);

        if let Some(CachedAnswer::Context(view)) = self.cache.get(&key) {
            return Ok(view);
        }

        let facts = self
            .symbolic
            .query_facts(project_id, &FactFilter::default())
            .await?;
        let episodes = self
            .episodic
            .query_episodes(project_id, &EpisodeFilter::default(), top_k)
            .await?;
        let query_embedding = self.embedder.embed(query).await?;
        let semantic_hits = self
            .semantic
            .search(project_id, &query_embedding, top_k, None)
            .await?;

        let view = reader::merge(&facts, &episodes, &semantic_hits, self.config.authority);
        self.cache
            .put(project_id, key, CachedAnswer::Context(view.clone()));
        Ok(view)
    }

    /// `mem.search`: typed hits from exactly one memory substrate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation, or any error surfaced by the targeted store.
    #[tracing::instrument(skip(self, query))]
    pub async fn mem_search_semantic(
        &self,
        project_id: &str,
        query: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SemanticHit>> {
        validate_project_id(project_id)?;
        let top_k = top_k.unwrap_or(crate::constants::DEFAULT_TOP_K);
        let cache_query = format!("search:semantic|{query}");
        let key = CacheKey::new(project_id, &cache_query, top_k);
        if let Some(CachedAnswer::SemanticSearch(hits)) = self.cache.get(&key) {
            return Ok(hits);
        }
        let query_embedding = self.embedder.embed(query).await?;
        let hits = self
            .semantic
            .search(project_id, &query_embedding, top_k, filter)
            .await?;
        self.cache
            .put(project_id, key, CachedAnswer::SemanticSearch(hits.clone()));
        Ok(hits)
    }

    /// `mem.search` over the symbolic substrate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    #[tracing::instrument(skip(self))]
    pub async fn mem_search_symbolic(
        &self,
        project_id: &str,
        filter: &FactFilter,
    ) -> Result<Vec<crate::symbolic::Fact>> {
        validate_project_id(project_id)?;
        self.symbolic.query_facts(project_id, filter).await
    }

    /// `mem.search` over the episodic substrate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    #[tracing::instrument(skip(self))]
    pub async fn mem_search_episodic(
        &self,
        project_id: &str,
        filter: &EpisodeFilter,
        top_k: usize,
    ) -> Result<Vec<Episode>> {
        validate_project_id(project_id)?;
        self.episodic.query_episodes(project_id, filter, top_k).await
    }

    /// `mem.ingest`: chunk, embed and store `text` as a new document,
    /// invalidating this project's cached answers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Corruption`] if an embedded chunk's
    /// dimension does not match the configured dimension.
    #[tracing::instrument(skip(self, text))]
    pub async fn mem_ingest(
        &self,
        project_id: &str,
        source_path: &str,
        source_type: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(Uuid, usize)> {
        validate_project_id(project_id)?;
        self.registry.register(project_id).await?;
        let document = self
            .semantic
            .add_document(
                project_id,
                source_path,
                source_type,
                text,
                self.config.chunk_size,
                self.config.chunk_overlap,
                metadata,
            )
            .await?;
        self.cache.invalidate_project(project_id);
        let chunk_count =
            crate::semantic::chunk_text(text, self.config.chunk_size, self.config.chunk_overlap).len();
        Ok((document.doc_id, chunk_count))
    }

    /// `mem.fact.add`: upsert a fact, invalidating this project's cached
    /// answers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if any field fails
    /// validation.
    #[tracing::instrument(skip(self, value))]
    #[allow(clippy::too_many_arguments)]
    pub async fn mem_fact_add(
        &self,
        project_id: &str,
        scope: &str,
        category: &str,
        key: &str,
        value: &str,
        confidence: f32,
        source: Source,
    ) -> Result<AddFactOutcome> {
        validate_project_id(project_id)?;
        self.registry.register(project_id).await?;
        let outcome = self
            .symbolic
            .add_fact(project_id, scope, category, key, value, confidence, source)
            .await?;
        self.cache.invalidate_project(project_id);
        Ok(outcome)
    }

    /// `mem.ep.add`: record an episode, invalidating this project's cached
    /// answers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    #[tracing::instrument(skip(self, episode))]
    pub async fn mem_ep_add(
        &self,
        project_id: &str,
        episode: Episode,
        session_id: Option<&str>,
    ) -> Result<AddEpisodeOutcome> {
        validate_project_id(project_id)?;
        self.registry.register(project_id).await?;
        let outcome = self
            .episodic
            .add_episode(project_id, episode, self.config.deduplication_mode, session_id)
            .await?;
        self.cache.invalidate_project(project_id);
        Ok(outcome)
    }

    /// Analyze a conversation turn into candidate facts/episodes, without
    /// committing them. Callers decide whether to forward the candidates to
    /// [`MemoryEngine::mem_fact_add`] / [`MemoryEngine::mem_ep_add`].
    ///
    /// # Errors
    ///
    /// Propagates any error from [`analyzer::analyze`].
    pub fn analyze_conversation(
        &self,
        user_message: &str,
        agent_response: &str,
    ) -> Result<AnalysisResult> {
        analyzer::analyze(user_message, agent_response, &self.config)
    }

    /// Delete a project and every entity rooted under it. The registry
    /// entry is removed first, so a crash mid-cascade never leaves an
    /// orphaned registry entry pointing at a half-deleted project.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    #[tracing::instrument(skip(self))]
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        validate_project_id(project_id)?;
        self.registry.remove(project_id).await?;
        self.symbolic.delete_project(project_id).await?;
        self.episodic.delete_project(project_id).await?;
        self.semantic.delete_project(project_id).await?;
        self.cache.invalidate_project(project_id);
        Ok(())
    }

    /// Current query-cache metrics, exposed for observability.
    #[must_use]
    pub fn cache_metrics(&self) -> crate::cache::CacheMetrics {
        self.cache.metrics()
    }
}
