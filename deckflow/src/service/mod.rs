//! The seam between the orchestration core and a generative backend.
//!
//! Stages never talk to a model directly; they build a prompt, hand it
//! to a [`ContentService`], and parse the raw text it returns. The
//! trait is intentionally narrow so tests can script it.

mod json;

pub use json::extract_json;

use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// One generation request: a role identifying which agent persona is
/// speaking, and the fully assembled prompt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Agent role, e.g. `"outline_generator"` or `"outline_critic"`.
    pub role: String,
    /// The full prompt text, including any retry feedback sections.
    pub prompt: String,
}

impl GenerationRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(role: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            prompt: prompt.into(),
        }
    }
}

/// Trait for generative content backends.
///
/// Implementations return raw text; callers run it through
/// [`extract_json`] when structured output is expected. Transport
/// failures surface as [`StageError::Transport`] so the executor's
/// retry policy can distinguish them from bad content.
#[async_trait]
pub trait ContentService: Send + Sync + Debug {
    /// Generates content for the given request.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Transport`] or [`StageError::Timeout`] for
    /// transient failures eligible for retry.
    async fn generate(&self, request: GenerationRequest) -> Result<String, StageError>;
}
