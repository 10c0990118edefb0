use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::agent::dispatch::ToolRegistry;
use crate::agent::evaluator::{Evaluation, evaluation_format, parse_evaluation};
use crate::agent::prompt::{PromptMode, build_system_prompt, evaluator_user_prompt};
use crate::config::{AppConfig, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::context::IdentityContext;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub chat_model: String,
    pub evaluator_model: String,
    pub evaluate: bool,
    pub max_tool_rounds: usize,
    pub request_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            chat_model: DEFAULT_MODEL.to_string(),
            evaluator_model: DEFAULT_MODEL.to_string(),
            evaluate: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl From<&AppConfig> for ChatConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chat_model: config.llm_model.clone(),
            evaluator_model: config.evaluator_model.clone(),
            evaluate: config.evaluate,
            max_tool_rounds: config.max_tool_rounds,
            request_timeout_ms: config.request_timeout_ms,
        }
    }
}

/// Which completion call of a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chat,
    Evaluate,
    Revise,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Chat => "chat",
            Self::Evaluate => "evaluate",
            Self::Revise => "revise",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("{stage} request failed: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: LlmError,
    },
    #[error("{stage} request timed out after {timeout_ms} ms")]
    Timeout { stage: Stage, timeout_ms: u64 },
    #[error("model kept requesting tools after {limit} rounds")]
    TooManyToolRounds { limit: usize },
    #[error("evaluator returned an unusable verdict: {0}")]
    EvaluationParse(String),
}

/// Progress notifications for one turn, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ToolRequest {
        round: usize,
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        round: usize,
        id: String,
        content: String,
    },
    Evaluated {
        is_acceptable: bool,
        feedback: String,
    },
    Revised,
}

pub struct Chatbot<P> {
    provider: P,
    identity: Arc<IdentityContext>,
    tools: ToolRegistry,
    config: ChatConfig,
}

impl<P: LlmProvider> Chatbot<P> {
    pub fn new(
        provider: P,
        identity: Arc<IdentityContext>,
        tools: ToolRegistry,
        config: ChatConfig,
    ) -> Self {
        Self {
            provider,
            identity,
            tools,
            config,
        }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Runs one visitor turn. `history` is the prior conversation and is only read.
    pub async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        self.chat_with_events(message, history, &mut |_| {}).await
    }

    pub async fn chat_with_events<F: FnMut(ChatEvent) + Send>(
        &self,
        message: &str,
        history: &[ChatMessage],
        on_event: &mut F,
    ) -> Result<String, ChatError> {
        let reply = self.answer(message, history, on_event).await?;
        if !self.config.evaluate {
            return Ok(reply);
        }

        let verdict = self.evaluate(&reply, message, history).await?;
        on_event(ChatEvent::Evaluated {
            is_acceptable: verdict.is_acceptable,
            feedback: verdict.feedback.clone(),
        });
        if verdict.is_acceptable {
            return Ok(reply);
        }

        tracing::debug!(feedback = %verdict.feedback, "reply rejected, revising once");
        let revised = self
            .revise(&reply, &verdict.feedback, message, history)
            .await?;
        on_event(ChatEvent::Revised);
        Ok(revised)
    }

    async fn answer<F: FnMut(ChatEvent) + Send>(
        &self,
        message: &str,
        history: &[ChatMessage],
        on_event: &mut F,
    ) -> Result<String, ChatError> {
        let system = build_system_prompt(&self.identity, &PromptMode::Chat);
        let mut messages = turn_messages(system, history, message);
        let tools = self.tools.declarations();
        let mut rounds = 0usize;

        loop {
            let response = self
                .complete(
                    Stage::Chat,
                    CompletionRequest {
                        model: self.config.chat_model.clone(),
                        messages: messages.clone(),
                        tools: tools.clone(),
                        response_format: None,
                    },
                )
                .await?;

            if response.tool_calls.is_empty() {
                return final_text(Stage::Chat, &response);
            }

            rounds += 1;
            if rounds > self.config.max_tool_rounds {
                return Err(ChatError::TooManyToolRounds {
                    limit: self.config.max_tool_rounds,
                });
            }

            for call in &response.tool_calls {
                on_event(ChatEvent::ToolRequest {
                    round: rounds,
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }

            let results = self.tools.dispatch_calls(&response.tool_calls).await;
            for result in &results {
                if let ChatMessage::Tool {
                    tool_call_id,
                    content,
                } = result
                {
                    on_event(ChatEvent::ToolResult {
                        round: rounds,
                        id: tool_call_id.clone(),
                        content: content.clone(),
                    });
                }
            }

            let request = ChatMessage::Assistant {
                content: response.content.clone(),
                tool_calls: response.tool_calls,
            };
            messages = [messages.as_slice(), &[request], results.as_slice()].concat();
        }
    }

    async fn evaluate(
        &self,
        reply: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<Evaluation, ChatError> {
        let response = self
            .complete(
                Stage::Evaluate,
                CompletionRequest {
                    model: self.config.evaluator_model.clone(),
                    messages: vec![
                        ChatMessage::system(build_system_prompt(
                            &self.identity,
                            &PromptMode::Evaluate,
                        )),
                        ChatMessage::user(evaluator_user_prompt(reply, message, history)),
                    ],
                    tools: vec![],
                    response_format: Some(evaluation_format()),
                },
            )
            .await?;

        let content = final_text(Stage::Evaluate, &response)?;
        parse_evaluation(&content).map_err(ChatError::EvaluationParse)
    }

    async fn revise(
        &self,
        rejected_reply: &str,
        feedback: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String, ChatError> {
        let system = build_system_prompt(
            &self.identity,
            &PromptMode::Revise {
                rejected_reply: rejected_reply.to_string(),
                feedback: feedback.to_string(),
            },
        );
        // No tools here: the revised reply never re-enters the tool loop.
        let response = self
            .complete(
                Stage::Revise,
                CompletionRequest {
                    model: self.config.chat_model.clone(),
                    messages: turn_messages(system, history, message),
                    tools: vec![],
                    response_format: None,
                },
            )
            .await?;

        final_text(Stage::Revise, &response)
    }

    async fn complete(
        &self,
        stage: Stage,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ChatError> {
        let timeout_ms = self.config.request_timeout_ms;
        match timeout(
            Duration::from_millis(timeout_ms),
            self.provider.complete(request),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(ChatError::Upstream { stage, source }),
            Err(_) => Err(ChatError::Timeout { stage, timeout_ms }),
        }
    }
}

fn turn_messages(system: String, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(message));
    messages
}

fn final_text(stage: Stage, response: &CompletionResponse) -> Result<String, ChatError> {
    if response.finish_reason == FinishReason::ToolCalls && response.tool_calls.is_empty() {
        return Err(ChatError::Upstream {
            stage,
            source: LlmError::Parse("finish reason tool_calls without any tool call".to_string()),
        });
    }

    response
        .text()
        .map(str::to_string)
        .ok_or(ChatError::Upstream {
            stage,
            source: LlmError::EmptyResponse,
        })
}
