use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, TextChunkStream};

/// Maximum attempts per request: 3 total, exponential backoff
/// starting at 1s and doubling between attempts.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Wraps an `LlmProvider` with the retry policy: retries the
/// *connection* attempt (the call that establishes the stream) on transport
/// timeout, HTTP 429, or any 5xx; never retries a 4xx other than 429, and
/// never retries once chunks have started flowing — a mid-body stream error
/// is surfaced to the caller as-is.
pub struct RetryingProvider {
    inner: Box<dyn LlmProvider>,
}

impl RetryingProvider {
    pub fn new(inner: Box<dyn LlmProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate_stream(
        &self,
        system_prompt: &str,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<TextChunkStream, LlmError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err: Option<LlmError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .inner
                .generate_stream(system_prompt, messages, max_tokens)
                .await
            {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    let retryable = e.kind.is_retryable();
                    warn!(
                        provider = self.inner.name(),
                        attempt, retryable, error = %e, "LLM connection attempt failed"
                    );
                    if !retryable || attempt + 1 == MAX_ATTEMPTS {
                        return Err(e);
                    }
                    last_err = Some(e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            LlmError::new(
                crate::error::LlmErrorKind::Malformed,
                self.inner.name(),
                "retry loop exited without a result",
            )
        }))
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmErrorKind;
    use futures_util::stream;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenOk {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for FlakyThenOk {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate_stream(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<TextChunkStream, LlmError> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(LlmError::new(LlmErrorKind::Upstream5xx, "flaky", "boom"));
            }
            Ok(Box::pin(stream::iter(vec![Ok("hi".to_string())])))
        }
    }

    struct AlwaysFourOhFour;

    #[async_trait]
    impl LlmProvider for AlwaysFourOhFour {
        fn name(&self) -> &str {
            "broken"
        }

        async fn generate_stream(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<TextChunkStream, LlmError> {
            Err(LlmError::new(LlmErrorKind::Upstream4xx, "broken", "bad request"))
        }
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let provider = RetryingProvider::new(Box::new(FlakyThenOk {
            failures_left: AtomicU32::new(1),
        }));
        let mut stream = provider.generate_stream("sys", &[], 100).await.unwrap();
        use futures_util::StreamExt;
        assert_eq!(stream.next().await.unwrap().unwrap(), "hi");
    }

    #[tokio::test]
    async fn does_not_retry_non_429_4xx() {
        let provider = RetryingProvider::new(Box::new(AlwaysFourOhFour));
        let err = provider.generate_stream("sys", &[], 100).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Upstream4xx);
    }
}
