//! Wraps an `LlmProvider` with a per-dependency circuit breaker (§4.2, §5:
//! "per-LLM-call soft timeouts may trip the circuit breaker"). A decorator
//! rather than a change to `complete_stream`'s call sites, so the
//! Classifier/Research/Writer/Follow-up modules stay unaware of admission
//! concerns entirely — they just receive a provider.

use async_trait::async_trait;
use futures::StreamExt;
use searchagent_admission::CircuitBreaker;
use searchagent_llm::{LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct BreakerGuardedProvider {
    inner: Arc<dyn LlmProvider>,
    breaker: Arc<CircuitBreaker>,
}

impl BreakerGuardedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl LlmProvider for BreakerGuardedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn models(&self) -> &[&str] {
        self.inner.models()
    }

    async fn complete_stream(&self, request: LlmRequest, cancel: Option<CancellationToken>) -> LlmResult<LlmStream> {
        if !self.breaker.allow_call() {
            return Err(LlmError::RequestFailed(format!("circuit open for dependency '{}'", self.inner.name())));
        }

        let stream = match self.inner.complete_stream(request, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                self.breaker.record_failure();
                return Err(e);
            }
        };

        let breaker = self.breaker.clone();
        let guarded = async_stream::stream! {
            tokio::pin!(stream);
            let mut failed = false;
            while let Some(item) = stream.next().await {
                if matches!(item, Err(_) | Ok(searchagent_llm::StreamDelta::Error(_))) {
                    failed = true;
                }
                yield item;
            }
            if failed {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
        };
        Ok(Box::pin(guarded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchagent_admission::BreakerState;
    use searchagent_llm::StreamDelta;
    use std::time::Duration;

    struct FailingStreamProvider;

    #[async_trait]
    impl LlmProvider for FailingStreamProvider {
        fn name(&self) -> &str {
            "test"
        }
        fn models(&self) -> &[&str] {
            &[]
        }
        async fn complete_stream(&self, _request: LlmRequest, _cancel: Option<CancellationToken>) -> LlmResult<LlmStream> {
            let deltas = vec![Ok(StreamDelta::Text("hi".to_string())), Ok(StreamDelta::Error("boom".to_string()))];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    #[tokio::test]
    async fn records_failure_on_stream_level_error() {
        let breaker = Arc::new(CircuitBreaker::new("test", 1, Duration::from_secs(30), Duration::from_millis(10)));
        let provider = BreakerGuardedProvider::new(Arc::new(FailingStreamProvider), breaker.clone());

        let mut stream = provider.complete_stream(LlmRequest::default(), None).await.unwrap();
        while stream.next().await.is_some() {}

        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn rejects_calls_while_open() {
        let breaker = Arc::new(CircuitBreaker::new("test", 1, Duration::from_secs(30), Duration::from_secs(30)));
        breaker.record_failure();
        let provider = BreakerGuardedProvider::new(Arc::new(FailingStreamProvider), breaker);

        let err = provider.complete_stream(LlmRequest::default(), None).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }
}
