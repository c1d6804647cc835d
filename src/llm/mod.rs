//! Hosted text-completion service.
//!
//! The rest of the crate only sees [`CompletionService`]: prompt in, text out.
//! [`complete_with_policy`] layers a per-attempt timeout and a bounded retry on
//! top of any implementation; callers own their own fallback.

mod gemini;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

pub use gemini::{GeminiClient, DEFAULT_MODEL as DEFAULT_GEMINI_MODEL};

/// Failure modes of a single completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service is not configured")]
    Unavailable,

    #[error("completion call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion service returned no text")]
    EmptyResponse,
}

impl CompletionError {
    /// Retrying cannot help when the service is absent or rejects the request.
    fn is_retryable(&self) -> bool {
        // ---
        match self {
            CompletionError::Unavailable => false,
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => true,
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Default)]
pub struct UnavailableCompletion;

#[async_trait]
impl CompletionService for UnavailableCompletion {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable)
    }
}

/// Timeout and retry settings applied around every completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Call `service` with a timeout per attempt, retrying transient failures.
///
/// Backoff doubles after each failed attempt. Returns the last error once the
/// retries are spent.
pub async fn complete_with_policy(
    service: &dyn CompletionService,
    prompt: &str,
    policy: CompletionPolicy,
) -> Result<String, CompletionError> {
    // ---
    let mut backoff = policy.backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, service.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(text) => {
                debug!(provider = service.name(), attempt, "completion succeeded");
                return Ok(text);
            }
            Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                warn!(
                    provider = service.name(),
                    attempt,
                    error = %e,
                    "completion failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extract the outermost `open`..`close` span, e.g. the JSON object buried in
/// prose or a fenced code block.
pub fn extract_delimited(text: &str, open: char, close: char) -> Option<&str> {
    // ---
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
pub mod testing {
    //! Completion-service doubles shared by the unit tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Replies with scripted results in order, repeating the last one.
    pub struct ScriptedCompletion {
        replies: Mutex<Vec<Result<String, u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedCompletion {
        pub fn replying(text: &str) -> Self {
            Self::script(vec![Ok(text.to_string())])
        }

        /// `Err(status)` entries become [`CompletionError::Api`].
        pub fn script(replies: Vec<Result<String, u16>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            // ---
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let next = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            next.map_err(|status| CompletionError::Api {
                status,
                message: "scripted failure".to_string(),
            })
        }
    }

    /// Fails every call with a server error.
    pub struct FailingCompletion;

    #[async_trait]
    impl CompletionService for FailingCompletion {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            Err(CompletionError::Api {
                status: 503,
                message: "service down".to_string(),
            })
        }
    }

    /// Never answers within any reasonable timeout.
    pub struct StalledCompletion;

    #[async_trait]
    impl CompletionService for StalledCompletion {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    pub fn fast_policy() -> CompletionPolicy {
        CompletionPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        }
    }
}
