//! Iterative answer-refinement harness for OpenRouter chat models.
//!
//! `whet-rs` drives an automated, multi-round "now improve your previous
//! answer" loop against the [OpenRouter](https://openrouter.ai/) chat
//! completions API. The core abstraction is the
//! [`Refiner`](agent::harness::Refiner), a round loop that appends a fixed
//! refinement instruction to the dialogue, sends it, appends the model's
//! reply, and hands each completed exchange to observers, while a budget
//! enforcer keeps the ever-growing dialogue inside the model's context
//! window by evicting the oldest exchange pairs.
//!
//! # Getting started
//!
//! Add `whet-rs` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! whet-rs = { path = "../whet-rs" }
//! ```
//!
//! Then run a refinement loop:
//!
//! ```ignore
//! use whet_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key).unwrap();
//!
//!     let config = RefinerConfig::new(
//!         "openai/gpt-4o-mini",
//!         "Thank you, but make it better.",
//!     )
//!     .with_rounds(10);
//!
//!     let history = DialogueHistory::new(
//!         "You are a helpful programming assistant.",
//!         "Write Hello World in Python.",
//!     );
//!
//!     let summary = Refiner::new(&client, config).run(history).await;
//!     println!("{}", summary.final_answer.unwrap_or_default());
//! }
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Run the refinement loop:** see [`Refiner`](agent::harness::Refiner)
//!   and [`RefinerConfig`](agent::config::RefinerConfig). Use
//!   [`RefinerConfig::new()`](agent::config::RefinerConfig::new) for the
//!   basics, or set struct fields directly for budget and retry control.
//!
//! - **Keep the dialogue inside the context window:** see
//!   [`DialogueHistory`](context::history::DialogueHistory) for the turn
//!   container with its protected prefix,
//!   [`BudgetPolicy`](context::budget::BudgetPolicy) for the size limits,
//!   and [`enforce`](context::eviction::enforce) for the eviction loop.
//!   All of this runs automatically inside the
//!   [`Refiner`](agent::harness::Refiner).
//!
//! - **Observe rounds:** implement [`EventHandler`](agent::events::EventHandler)
//!   to react to loop events (round start, eviction, retries, completion).
//!   Use [`LoggingHandler`](agent::events::LoggingHandler) for tracing-based
//!   logging, [`TranscriptWriter`](agent::transcript::TranscriptWriter) to
//!   persist exchanges, [`ProgressHandler`](ui::progress::ProgressHandler)
//!   for a terminal progress bar, and
//!   [`CompositeEventHandler`](agent::events::CompositeEventHandler) to
//!   combine them.
//!
//! - **Swap the completion capability:** implement [`CompletionBackend`]
//!   (the refiner is generic over it; tests use a scripted in-process fake).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Refiner`](agent::harness::Refiner) round loop, config, events, request retry, transcript persistence |
//! | [`context`] | [`DialogueHistory`](context::history::DialogueHistory), size metrics, budget enforcement |
//! | [`api`] | Retry configuration |
//! | [`analysis`] | Answer-delta analysis between consecutive rounds |
//! | [`ui`] | Progress bar and error-log file collaborators |
//!
//! # Design principles
//!
//! 1. **The dialogue is the only shared state.** One
//!    [`DialogueHistory`](context::history::DialogueHistory) per run, one
//!    writer, and exactly one destructive operation (oldest-pair eviction).
//!    Everything else observes.
//!
//! 2. **The context window is a budget.** Every request is preceded by an
//!    enforcement pass; when the provider still rejects a request as too
//!    large, recovery evicts exactly one more pair and resends.
//!
//! 3. **Failures are typed.** [`CompletionError`] distinguishes the three
//!    failure kinds structurally (status codes and machine-readable error
//!    codes, never message prose), because each kind has a different
//!    recovery: shrink, wait, or stop.
//!
//! 4. **Observability over magic.** The harness decides evictions and
//!    retries automatically but reports every decision through
//!    [`EventHandler`](agent::events::EventHandler) and `tracing`.

pub mod agent;
pub mod analysis;
pub mod api;
pub mod context;
pub mod prelude;
pub mod ui;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for completion calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

// ── Turn types ─────────────────────────────────────────────────────

/// Role of a turn in the dialogue.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::System => write!(f, "system"),
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One immutable message in the dialogue. Created once, never mutated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Generation parameters for a single completion call.
///
/// `max_output` doubles as the budget reservation for the reply: the same
/// number is sent as the request's `max_tokens` and subtracted from the
/// context budget by [`BudgetPolicy`](context::budget::BudgetPolicy).
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    /// Model identifier (e.g. `"openai/gpt-4o-mini"`).
    pub model: String,
    /// Maximum size of the generated reply.
    pub max_output: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output: 16_000,
            temperature: 0.7,
        }
    }
}

/// Chat completion request body. Zero-valued generation parameters are
/// omitted from serialization so the provider applies its own defaults.
#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Turn>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorBody>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error envelope the API attaches to rejected requests. OpenRouter also
/// returns this on HTTP 200 when an upstream provider fails mid-request,
/// with a numeric `code` standing in for the status.
#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
    code: Option<serde_json::Value>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Clean return type of a completion call: the generated content and the
/// total size the provider reported consuming for the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub cost_consumed: u32,
}

// ── Failure taxonomy ───────────────────────────────────────────────

/// Typed failure of a completion call.
///
/// The three kinds exist because each demands a different recovery:
/// [`SizeExceeded`](CompletionError::SizeExceeded) is recovered by evicting
/// dialogue pairs, [`Transient`](CompletionError::Transient) by waiting and
/// resending, and [`Fatal`](CompletionError::Fatal) not at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The combined input and reserved output exceed the model's context
    /// limit.
    #[error("request too large: {message}")]
    SizeExceeded { status: u16, message: String },
    /// Network or service failure that an unmodified retry may recover
    /// from (connection errors, timeouts, rate limits, 5xx).
    #[error("transient failure: {message}")]
    Transient { status: Option<u16>, message: String },
    /// Malformed request or configuration error. Retrying cannot help.
    #[error("fatal failure: {message}")]
    Fatal { status: Option<u16>, message: String },
}

impl CompletionError {
    /// Whether evicting dialogue pairs can recover this failure.
    pub fn is_size_exceeded(&self) -> bool {
        matches!(self, CompletionError::SizeExceeded { .. })
    }

    /// Whether waiting and resending can recover this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transient { .. })
    }
}

/// Map an HTTP-level failure to the typed taxonomy.
///
/// Classification is structural: the status and the machine-readable
/// `error.code` field decide the kind. The message is carried along for
/// diagnostics but never inspected.
fn classify_failure(status: u16, error: Option<&ApiErrorBody>, raw_body: &str) -> CompletionError {
    let message = match error {
        Some(e) => e.message.clone(),
        None => preview(raw_body, 300),
    };
    let code = error.and_then(|e| e.code.as_ref());

    if status == 413 || code.and_then(|c| c.as_str()) == Some("context_length_exceeded") {
        return CompletionError::SizeExceeded { status, message };
    }

    let effective = if (200..300).contains(&status) {
        code.and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(status)
    } else {
        status
    };

    if is_transient_status(effective) {
        CompletionError::Transient {
            status: Some(effective),
            message,
        }
    } else {
        CompletionError::Fatal {
            status: Some(effective),
            message,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ── Backend seam ───────────────────────────────────────────────────

/// Boxed future returned by [`CompletionBackend::complete`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, CompletionError>> + Send + 'a>>;

/// A remote completion capability: dialogue turns in, generated content
/// and consumed cost out.
///
/// Implementations must not mutate the dialogue; a call is a pure
/// projection of turns + policy to a result. Uses a boxed future so that
/// the trait is dyn-compatible (object-safe).
///
/// # Example
///
/// ```ignore
/// struct CannedBackend;
///
/// impl CompletionBackend for CannedBackend {
///     fn complete<'a>(
///         &'a self,
///         turns: &'a [Turn],
///         policy: &'a GenerationPolicy,
///     ) -> CompletionFuture<'a> {
///         Box::pin(async move {
///             Ok(Completion { content: "ok".into(), cost_consumed: 1 })
///         })
///     }
/// }
/// ```
pub trait CompletionBackend: Send + Sync {
    /// Send the ordered dialogue turns with the given generation policy.
    fn complete<'a>(
        &'a self,
        turns: &'a [Turn],
        policy: &'a GenerationPolicy,
    ) -> CompletionFuture<'a>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/tacryt-socryp/whet-rs", "whet")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("whet-client/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    async fn send_chat(
        &self,
        turns: &[Turn],
        policy: &GenerationPolicy,
    ) -> Result<Completion, CompletionError> {
        let body = ChatRequest {
            model: Some(policy.model.clone()),
            messages: turns.to_vec(),
            max_tokens: policy.max_output,
            temperature: policy.temperature,
        };

        debug!(
            "Completion request: model={}, turns={}, max_tokens={}, temp={}",
            policy.model,
            turns.len(),
            policy.max_output,
            policy.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transient {
                status: None,
                message: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| CompletionError::Transient {
            status: Some(status.as_u16()),
            message: format!("failed to read response: {e}"),
        })?;

        let elapsed = start.elapsed();
        debug!(
            "Completion response: HTTP {} in {:.1}s ({} bytes)",
            status,
            elapsed.as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            let parsed = serde_json::from_str::<RawChatResponse>(&text).ok();
            let error = parsed.as_ref().and_then(|p| p.error.as_ref());
            return Err(classify_failure(status.as_u16(), error, &text));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| CompletionError::Fatal {
                status: Some(status.as_u16()),
                message: format!("failed to parse response: {e}"),
            })?;

        if let Some(ref err) = parsed.error {
            return Err(classify_failure(status.as_u16(), Some(err), &text));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let cost_consumed = match parsed.usage.as_ref().and_then(|u| u.total_tokens) {
            Some(total) => total,
            None => {
                debug!("Provider omitted usage; reporting zero cost for this call");
                0
            }
        };

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Fatal {
                status: Some(status.as_u16()),
                message: "response contained no choices".to_string(),
            })?;

        debug!("Completion output: {} chars", content.len());

        Ok(Completion {
            content,
            cost_consumed,
        })
    }
}

impl CompletionBackend for OpenRouterClient {
    fn complete<'a>(
        &'a self,
        turns: &'a [Turn],
        policy: &'a GenerationPolicy,
    ) -> CompletionFuture<'a> {
        Box::pin(self.send_chat(turns, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_constructors() {
        let sys = Turn::system("hello");
        assert_eq!(sys.role, TurnRole::System);
        assert_eq!(sys.content, "hello");

        let user = Turn::user("world");
        assert_eq!(user.role, TurnRole::User);

        let assist = Turn::assistant("reply");
        assert_eq!(assist.role, TurnRole::Assistant);
        assert_eq!(assist.content, "reply");
    }

    #[test]
    fn turn_role_serializes_lowercase() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn chat_request_skips_zero_generation_params() {
        let req = ChatRequest {
            model: None,
            messages: vec![Turn::user("hi")],
            max_tokens: 0,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());

        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Turn::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["max_tokens"], 100);
    }

    fn body(message: &str, code: serde_json::Value) -> ApiErrorBody {
        ApiErrorBody {
            message: message.to_string(),
            code: Some(code),
        }
    }

    #[test]
    fn status_413_classified_as_size_exceeded() {
        let err = classify_failure(413, None, "payload too large");
        assert!(err.is_size_exceeded());
    }

    #[test]
    fn context_length_code_classified_as_size_exceeded() {
        let b = body("maximum context length exceeded", "context_length_exceeded".into());
        let err = classify_failure(400, Some(&b), "");
        assert!(err.is_size_exceeded());
    }

    #[test]
    fn transient_statuses_detected() {
        for status in [408, 429, 500, 502, 503, 504] {
            let err = classify_failure(status, None, "boom");
            assert!(err.is_transient(), "HTTP {status} should be transient");
        }
    }

    #[test]
    fn client_errors_classified_as_fatal() {
        for status in [400, 401, 403, 404, 422] {
            let err = classify_failure(status, None, "bad request");
            assert!(
                matches!(err, CompletionError::Fatal { .. }),
                "HTTP {status} should be fatal"
            );
        }
    }

    #[test]
    fn error_code_overrides_success_status() {
        // OpenRouter reports upstream failures inside an HTTP 200 body.
        let b = body("provider unavailable", 502.into());
        let err = classify_failure(200, Some(&b), "");
        assert_eq!(
            err,
            CompletionError::Transient {
                status: Some(502),
                message: "provider unavailable".to_string(),
            }
        );
    }

    #[test]
    fn error_body_without_code_on_success_status_is_fatal() {
        let b = ApiErrorBody {
            message: "unexpected".to_string(),
            code: None,
        };
        let err = classify_failure(200, Some(&b), "");
        assert!(matches!(err, CompletionError::Fatal { .. }));
    }

    #[test]
    fn raw_body_preview_is_bounded() {
        let long = "x".repeat(5_000);
        let err = classify_failure(500, None, &long);
        match err {
            CompletionError::Transient { message, .. } => assert_eq!(message.len(), 300),
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
