use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult,
    ToolCallRequest,
};
use crate::notify::{NotificationError, Notifier};

/// Replays queued responses in order and records every request it sees.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    responses: Arc<Mutex<VecDeque<LlmResult<CompletionResponse>>>>,
    seen: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LlmResult<CompletionResponse>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().expect("lock").clone()
    }
}

impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.seen.lock().expect("lock").push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Err(LlmError::Transport("no scripted response left".to_string())))
    }
}

pub fn text_response(text: &str) -> LlmResult<CompletionResponse> {
    Ok(CompletionResponse {
        finish_reason: FinishReason::Stop,
        content: Some(text.to_string()),
        tool_calls: vec![],
    })
}

pub fn tool_response(calls: &[(&str, &str, &str)]) -> LlmResult<CompletionResponse> {
    Ok(CompletionResponse {
        finish_reason: FinishReason::ToolCalls,
        content: None,
        tool_calls: calls
            .iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            })
            .collect(),
    })
}

/// Captures pushed messages; optionally fails every push after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn push(&self, message: &str) -> Result<(), NotificationError> {
        self.messages.lock().expect("lock").push(message.to_string());
        if self.fail {
            Err(NotificationError::HttpStatus(500))
        } else {
            Ok(())
        }
    }
}
