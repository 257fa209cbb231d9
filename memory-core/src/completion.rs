//! The completion function boundary (out of scope: the chat/summarization
//! model runtime itself). Used only by
//! [`crate::config::ExtractionMode::Model`]-mode conversation analysis.

use async_trait::async_trait;

use crate::error::Result;

/// External text-completion provider, used for model-assisted extraction.
/// A caller operating in [`crate::config::ExtractionMode::Model`] calls
/// this directly with its own prompt and schema, then falls back to
/// [`crate::analyzer::analyze`] (which is always heuristic) on a parse
/// failure, per the component design.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ExternalTimeout`] or
    /// [`crate::error::Error::ExternalFailure`] if the underlying model
    /// call fails or exceeds its deadline.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
