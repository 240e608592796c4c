use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{LlmError, LlmProvider, Message};

type Handler = Box<dyn Fn(&[Message]) -> Result<String, LlmError> + Send + Sync>;

/// A mock provider that returns pre-configured responses.
///
/// Queued responses are served first, in order. Once the queue is empty the
/// optional handler answers, which lets a test route on prompt content
/// (e.g. fail every call mentioning "part 3/10").
pub struct MockLlmProvider {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    handler: Option<Handler>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            handler: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// Queue a successful response.
    pub fn push_ok(&self, text: &str) {
        self.queue.lock().unwrap().push_back(Ok(text.to_string()));
    }

    /// Queue a failure.
    pub fn push_err(&self, err: LlmError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Text of every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|msgs| msgs.iter().map(Message::text).collect::<Vec<_>>().join("\n"))
            .collect()
    }

    /// Raw messages of every call, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        let queued = self.queue.lock().unwrap().pop_front();
        let result = match queued {
            Some(result) => result,
            None => match &self.handler {
                Some(handler) => handler(&messages),
                None => Err(LlmError::ParseError("mock response queue exhausted".into())),
            },
        };
        self.calls.lock().unwrap().push(messages);
        result
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
