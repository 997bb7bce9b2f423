use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use chgd_core::chat::ChatMessage;
use chgd_core::errors::GatewayError;
use chgd_core::generate::{GenerateOptions, TextGenerator};

/// Pre-programmed replies for deterministic testing without API calls.
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Return an error from the generate() call.
    Error(GatewayError),
    /// Wait a duration, then yield the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock generator that consumes pre-programmed replies in sequence.
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    call_count: AtomicUsize,
    last_system: Mutex<Option<String>>,
}

impl MockGenerator {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            call_count: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// System prompt from the most recent call, for grounding assertions.
    pub fn last_system(&self) -> Option<String> {
        self.last_system.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        system: &str,
        _messages: &[ChatMessage],
        _options: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        let count = self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_system.lock() = Some(system.to_string());

        let Some(reply) = self.replies.lock().pop_front() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockGenerator: no reply configured for call {count}"
            )));
        };

        let mut current = reply;
        loop {
            match current {
                MockReply::Text(text) => return Ok(text),
                MockReply::Error(e) => return Err(e),
                MockReply::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
