use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use sim_agents::{LlmClient, LlmError, LlmRequest, LlmResponse, Purpose, TokenUsage};

/// Computes a JSON answer from the request.
pub type JsonHandler = Arc<dyn Fn(&LlmRequest) -> Result<Value, LlmError> + Send + Sync>;

/// Advisor text returned when no text answer is queued.
pub const DEFAULT_ADVISOR_REPLY: &str = "Let's look at what you know so far. What stands out?";

/// LLM double answering from per-purpose queues, falling back to handlers.
#[derive(Default)]
pub struct ScriptedLlm {
    json: Mutex<HashMap<Purpose, VecDeque<Result<Value, LlmError>>>>,
    text: Mutex<HashMap<Purpose, VecDeque<Result<String, LlmError>>>>,
    handlers: Mutex<HashMap<Purpose, JsonHandler>>,
    delay: Mutex<Option<Duration>>,
    cost_per_call: Mutex<f64>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    /// Double with no scripted answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for use as an `Arc<dyn LlmClient>`.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Queue one JSON answer for `purpose`.
    #[must_use]
    pub fn with_json(self, purpose: Purpose, value: Value) -> Self {
        self.push_json(purpose, value);
        self
    }

    /// Answer `purpose` calls with `handler` once queued answers run out.
    #[must_use]
    pub fn with_handler(
        self,
        purpose: Purpose,
        handler: impl Fn(&LlmRequest) -> Result<Value, LlmError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.lock().insert(purpose, Arc::new(handler));
        self
    }

    /// Answer every `purpose` call with `value` once queued answers run out.
    #[must_use]
    pub fn always(self, purpose: Purpose, value: Value) -> Self {
        self.with_handler(purpose, move |_| Ok(value.clone()))
    }

    /// Sleep `delay` before every answer.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    /// Charge `cost_usd` per call.
    #[must_use]
    pub fn with_cost(self, cost_usd: f64) -> Self {
        *self.cost_per_call.lock() = cost_usd;
        self
    }

    /// Queue one JSON answer on a shared double.
    pub fn push_json(&self, purpose: Purpose, value: Value) {
        self.json.lock().entry(purpose).or_default().push_back(Ok(value));
    }

    /// Queue one JSON failure.
    pub fn push_json_error(&self, purpose: Purpose, error: LlmError) {
        self.json.lock().entry(purpose).or_default().push_back(Err(error));
    }

    /// Queue one text answer.
    pub fn push_text(&self, purpose: Purpose, text: impl Into<String>) {
        self.text
            .lock()
            .entry(purpose)
            .or_default()
            .push_back(Ok(text.into()));
    }

    /// Queue one text failure.
    pub fn push_text_error(&self, purpose: Purpose, error: LlmError) {
        self.text.lock().entry(purpose).or_default().push_back(Err(error));
    }

    /// Change or clear the per-call delay.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Every request seen, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    /// Requests seen for `purpose`.
    pub fn requests_for(&self, purpose: Purpose) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.purpose == purpose)
            .cloned()
            .collect()
    }

    /// Number of requests seen for `purpose`.
    pub fn calls(&self, purpose: Purpose) -> usize {
        self.requests_for(purpose).len()
    }

    /// Most recent request for `purpose`.
    pub fn last_request(&self, purpose: Purpose) -> Option<LlmRequest> {
        self.requests_for(purpose).pop()
    }

    async fn begin(&self, request: &LlmRequest) -> TokenUsage {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        TokenUsage {
            prompt_tokens: (request.prompt_chars() / 4) as u64,
            completion_tokens: 50,
            cost_usd: *self.cost_per_call.lock(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_json(&self, request: LlmRequest) -> Result<LlmResponse<Value>, LlmError> {
        let usage = self.begin(&request).await;
        let queued = self
            .json
            .lock()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);
        let result = match queued {
            Some(result) => result,
            None => {
                let handler = self.handlers.lock().get(&request.purpose).cloned();
                match handler {
                    Some(handler) => handler(&request),
                    None => Err(LlmError::Transport(format!(
                        "no scripted response for {}",
                        request.purpose
                    ))),
                }
            }
        };
        result.map(|value| LlmResponse::new(value).with_usage(usage))
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse<String>, LlmError> {
        let usage = self.begin(&request).await;
        let queued = self
            .text
            .lock()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);
        queued
            .unwrap_or_else(|| Ok(DEFAULT_ADVISOR_REPLY.to_string()))
            .map(|text| LlmResponse::new(text).with_usage(usage))
    }
}
