//! The generation-backend contract.
//!
//! The backend itself (prompt construction, model selection, transport) is
//! an external collaborator; this module fixes the call contract and the
//! retry envelope around it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use farcast_core::SpecKind;

use crate::validate::validate_generated_source;

/// Everything the backend is given to generate one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub kind: SpecKind,
    /// Spec unit being built.
    pub unit: String,
    /// Dotted name of the generated counterpart. The backend must never
    /// import from it: that would be a self-reference.
    pub generated_unit: String,
    /// Top-level names the generated source must define.
    pub expected_names: Vec<String>,
    /// Spec source blocks by rendered spec ref.
    pub spec_sources: BTreeMap<String, String>,
    /// Free-form per-spec guidance by rendered spec ref.
    pub extra_directives: BTreeMap<String, String>,
    /// API surface (source spans, intent text included) of dependency
    /// specs, by rendered spec ref.
    pub dependency_apis: BTreeMap<String, String>,
    /// Full generated source of dependency units, where available. Units
    /// absent here fall back to their intent text in `dependency_apis`.
    pub dependency_sources: BTreeMap<String, String>,
    /// Prior error context: upstream dependency failures plus problems
    /// with this unit's previous attempts.
    pub error_context: Vec<String>,
}

/// Token counts from a single backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    fn accumulate(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// A successful backend response.
#[derive(Debug, Clone)]
pub struct GeneratedSource {
    pub source: String,
    pub usage: Option<TokenUsage>,
}

/// Structured backend failure. Transient failures are retried with
/// backoff; permanent ones fail the attempt loop immediately.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend rate limited")]
    RateLimited,

    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transport(_) | BackendError::RateLimited)
    }
}

/// The generation backend. The scheduler is the only caller.
#[async_trait]
pub trait GeneratorBackend: Send + Sync {
    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;

    /// Generate source for one unit.
    async fn generate_unit(&self, request: &GenerateRequest)
        -> Result<GeneratedSource, BackendError>;
}

/// Outcome of the retry envelope for one unit.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub attempts: u32,
    /// Accepted source, if any attempt validated.
    pub source: Option<String>,
    /// Errors from the last attempt when no source was accepted.
    pub errors: Vec<String>,
    pub usage: TokenUsage,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        self.source.is_some()
    }
}

/// Generate with validation and retry.
///
/// Transient backend failures and validation failures both consume an
/// attempt; each retry waits `base_delay * 2^(attempt-1)` and carries the
/// previous attempt's problems as error context. A permanent backend
/// failure stops immediately.
pub async fn generate_with_retry(
    backend: &dyn GeneratorBackend,
    request: &GenerateRequest,
    max_attempts: u32,
    base_delay: Duration,
) -> GenerationOutcome {
    let max_attempts = max_attempts.max(1);
    let mut request = request.clone();
    let mut usage = TokenUsage::default();
    let mut last_errors: Vec<String> = Vec::new();

    for attempt in 1..=max_attempts {
        match backend.generate_unit(&request).await {
            Ok(generated) => {
                if let Some(call_usage) = generated.usage {
                    usage.accumulate(call_usage);
                }
                let problems = validate_generated_source(
                    &generated.source,
                    &request.expected_names,
                    &request.unit,
                    &request.generated_unit,
                );
                if problems.is_empty() {
                    return GenerationOutcome {
                        attempts: attempt,
                        source: Some(generated.source),
                        errors: Vec::new(),
                        usage,
                    };
                }
                tracing::debug!(
                    unit = %request.unit,
                    attempt,
                    problems = problems.len(),
                    "generated source failed validation"
                );
                request.error_context.extend(
                    problems
                        .iter()
                        .map(|p| format!("previous output error: {p}")),
                );
                last_errors = problems;
            }
            Err(err) => {
                last_errors = vec![err.to_string()];
                if !err.is_transient() {
                    return GenerationOutcome {
                        attempts: attempt,
                        source: None,
                        errors: last_errors,
                        usage,
                    };
                }
                tracing::warn!(unit = %request.unit, attempt, error = %err, "transient backend failure");
            }
        }
        if attempt < max_attempts {
            let delay = base_delay.saturating_mul(1 << (attempt - 1).min(16));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    GenerationOutcome {
        attempts: max_attempts,
        source: None,
        errors: if last_errors.is_empty() {
            vec!["no source returned".to_string()]
        } else {
            last_errors
        },
        usage,
    }
}
