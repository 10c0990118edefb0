use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    LlmResult, ResponseFormat, ToolCallRequest, ToolDeclaration,
};
use crate::http::HttpClient;

const ERROR_BODY_MAX_CHARS: usize = 400;

/// Any endpoint speaking the OpenAI `chat/completions` shape, including
/// Gemini's OpenAI-compatible surface.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: HttpClient,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// A missing key is not an error here; the upstream rejects the call instead.
    pub fn new(client: HttpClient, api_key: Option<String>, base_url: String) -> Self {
        Self {
            client,
            api_key: api_key.filter(|v| !v.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(request: &CompletionRequest) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request.tools.iter().map(WireTool::from).collect(),
            response_format: request.response_format.as_ref().map(WireResponseFormat::from),
        }
    }

    fn parse_response(body: &str) -> LlmResult<CompletionResponse> {
        let parsed = serde_json::from_str::<WireResponse>(body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCallRequest {
                id: if call.id.trim().is_empty() {
                    format!("call_{}", index + 1)
                } else {
                    call.id
                },
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(CompletionResponse {
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
            content: choice.message.content,
            tool_calls,
        })
    }
}

impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let payload = Self::build_request(&request);
        let resp = self
            .client
            .post_json(&self.endpoint(), self.api_key.as_deref(), &payload)
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !resp.is_success() {
            let body = resp.body.chars().take(ERROR_BODY_MAX_CHARS).collect::<String>();
            return Err(LlmError::HttpStatus {
                status: resp.status,
                body,
            });
        }

        Self::parse_response(&resp.body)
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = message.role();
        match message {
            ChatMessage::System { content } | ChatMessage::User { content } => Self {
                role,
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => Self {
                role,
                content: content.clone(),
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(WireToolCall::from).collect()),
                tool_call_id: None,
            },
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => Self {
                role,
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    // Some compatible endpoints leave this out; a positional id is filled in.
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDeclaration> for WireTool {
    fn from(decl: &ToolDeclaration) -> Self {
        Self {
            kind: "function",
            function: WireToolFunction {
                name: decl.name.clone(),
                description: decl.description.clone(),
                parameters: decl.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: WireJsonSchema,
}

#[derive(Debug, Serialize)]
struct WireJsonSchema {
    name: String,
    schema: Value,
    strict: bool,
}

impl From<&ResponseFormat> for WireResponseFormat {
    fn from(format: &ResponseFormat) -> Self {
        Self {
            kind: "json_schema",
            json_schema: WireJsonSchema {
                name: format.name.clone(),
                schema: format.schema.clone(),
                strict: true,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    finish_reason: Option<String>,
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}
