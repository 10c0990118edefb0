use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::llm::provider::{ChatMessage, ToolCallRequest, ToolDeclaration};
use crate::notify::Notifier;

pub const RECORD_USER_DETAILS: &str = "record_user_details";
pub const RECORD_UNKNOWN_QUESTION: &str = "record_unknown_question";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_args",
        }
    }

    /// Error envelope handed back to the model in place of a tool result.
    pub fn to_payload(&self) -> Value {
        json!({
            "ok": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;

    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Name-keyed set of tools offered to the model.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// The two contact-recording tools, both reporting through `notifier`.
    pub fn with_contact_tools(notifier: Arc<dyn Notifier>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RecordUserDetails::new(Arc::clone(&notifier))));
        registry.register(Box::new(RecordUnknownQuestion::new(notifier)));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.declaration().name;
        self.tools.insert(name, tool);
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|tool| tool.declaration()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub async fn execute(&self, call: &ToolCallRequest) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let arguments = decode_arguments(call)?;
        tool.call(arguments).await
    }

    /// One tool-result message per call, in request order, each carrying the
    /// originating call id.
    pub async fn dispatch_calls(&self, calls: &[ToolCallRequest]) -> Vec<ChatMessage> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let payload = match self.execute(call).await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(tool = %call.name, error = %err, "tool call rejected");
                    err.to_payload()
                }
            };
            results.push(ChatMessage::tool_result(call.id.clone(), payload.to_string()));
        }
        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_arguments(call: &ToolCallRequest) -> Result<Value, ToolError> {
    // Some providers send an empty string for argument-less calls.
    if call.arguments.trim().is_empty() {
        return Ok(json!({}));
    }

    serde_json::from_str(&call.arguments).map_err(|err| ToolError::InvalidArguments {
        tool: call.name.clone(),
        message: err.to_string(),
    })
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn recorded() -> Value {
    json!({"recorded": "ok"})
}

/// Delivery is best effort: a failed push is logged and the tool still succeeds.
async fn push_best_effort(notifier: &dyn Notifier, tool: &str, text: &str) {
    if let Err(err) = notifier.push(text).await {
        tracing::warn!(tool, error = %err, "notification delivery failed");
    }
}

#[derive(Debug, Deserialize)]
struct UserDetailsArgs {
    email: String,
    name: Option<String>,
    notes: Option<String>,
}

pub struct RecordUserDetails {
    notifier: Arc<dyn Notifier>,
}

impl RecordUserDetails {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

pub fn user_details_message(email: &str, name: Option<&str>, notes: Option<&str>) -> String {
    format!(
        "Recording {} with email {email} and notes {}",
        name.unwrap_or("Name not provided"),
        notes.unwrap_or("not provided")
    )
}

#[async_trait]
impl Tool for RecordUserDetails {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: RECORD_USER_DETAILS.to_string(),
            description: "Use this tool to record that a user is interested in being in touch and provided an email address".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "email": {
                        "type": "string",
                        "description": "The email address of this user"
                    },
                    "name": {
                        "type": "string",
                        "description": "The user's name, if they provided it"
                    },
                    "notes": {
                        "type": "string",
                        "description": "Any additional information about the conversation that's worth recording to give context"
                    }
                },
                "required": ["email"],
                "additionalProperties": false
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: UserDetailsArgs = parse_args(RECORD_USER_DETAILS, arguments)?;
        let text = user_details_message(&args.email, args.name.as_deref(), args.notes.as_deref());
        push_best_effort(self.notifier.as_ref(), RECORD_USER_DETAILS, &text).await;
        Ok(recorded())
    }
}

#[derive(Debug, Deserialize)]
struct UnknownQuestionArgs {
    question: String,
}

pub struct RecordUnknownQuestion {
    notifier: Arc<dyn Notifier>,
}

impl RecordUnknownQuestion {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for RecordUnknownQuestion {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: RECORD_UNKNOWN_QUESTION.to_string(),
            description: "Always use this tool to record any question that couldn't be answered as you didn't know the answer".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The question that couldn't be answered"
                    }
                },
                "required": ["question"],
                "additionalProperties": false
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: UnknownQuestionArgs = parse_args(RECORD_UNKNOWN_QUESTION, arguments)?;
        let text = format!("Recording {}", args.question);
        push_best_effort(self.notifier.as_ref(), RECORD_UNKNOWN_QUESTION, &text).await;
        Ok(recorded())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::{
        RECORD_UNKNOWN_QUESTION, RECORD_USER_DETAILS, ToolError, ToolRegistry,
        user_details_message,
    };
    use crate::llm::provider::{ChatMessage, ToolCallRequest};
    use crate::test_support::RecordingNotifier;

    fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn user_details_message_uses_literal_defaults() {
        assert_eq!(
            user_details_message("a@b.com", None, None),
            "Recording Name not provided with email a@b.com and notes not provided"
        );
        assert_eq!(
            user_details_message("a@b.com", Some("Ana"), Some("wants a call")),
            "Recording Ana with email a@b.com and notes wants a call"
        );
    }

    #[test]
    fn registry_declares_both_contact_tools_in_stable_order() {
        let registry = ToolRegistry::with_contact_tools(Arc::new(RecordingNotifier::default()));
        assert_eq!(
            registry.names(),
            vec![RECORD_UNKNOWN_QUESTION, RECORD_USER_DETAILS]
        );
        let decls = registry.declarations();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].parameters["required"], json!(["email"]));
        assert_eq!(decls[0].parameters["required"], json!(["question"]));
    }

    #[tokio::test]
    async fn record_user_details_pushes_defaults_and_acknowledges() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = ToolRegistry::with_contact_tools(notifier.clone());

        let results = registry
            .dispatch_calls(&[call("c1", RECORD_USER_DETAILS, r#"{"email":"a@b.com"}"#)])
            .await;

        assert_eq!(
            results,
            vec![ChatMessage::tool_result("c1", r#"{"recorded":"ok"}"#)]
        );
        assert_eq!(
            notifier.messages(),
            vec!["Recording Name not provided with email a@b.com and notes not provided"]
        );
    }

    #[tokio::test]
    async fn record_unknown_question_pushes_question_text() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = ToolRegistry::with_contact_tools(notifier.clone());

        let results = registry
            .dispatch_calls(&[call(
                "c9",
                RECORD_UNKNOWN_QUESTION,
                r#"{"question":"What is your shoe size?"}"#,
            )])
            .await;

        assert_eq!(
            results,
            vec![ChatMessage::tool_result("c9", r#"{"recorded":"ok"}"#)]
        );
        assert_eq!(notifier.messages(), vec!["Recording What is your shoe size?"]);
    }

    #[tokio::test]
    async fn failed_notification_still_acknowledges() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let registry = ToolRegistry::with_contact_tools(notifier.clone());

        let results = registry
            .dispatch_calls(&[call("c1", RECORD_UNKNOWN_QUESTION, r#"{"question":"q"}"#)])
            .await;

        assert_eq!(
            results,
            vec![ChatMessage::tool_result("c1", r#"{"recorded":"ok"}"#)]
        );
        assert_eq!(notifier.messages(), vec!["Recording q"]);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_payload() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = ToolRegistry::with_contact_tools(notifier.clone());

        let err = registry
            .execute(&call("c1", "delete_everything", "{}"))
            .await
            .expect_err("unknown tool");
        assert_eq!(err, ToolError::UnknownTool("delete_everything".to_string()));

        let results = registry
            .dispatch_calls(&[call("c1", "delete_everything", "{}")])
            .await;
        let ChatMessage::Tool {
            tool_call_id,
            content,
        } = &results[0]
        else {
            panic!("expected tool result message");
        };
        assert_eq!(tool_call_id, "c1");
        let payload: Value = serde_json::from_str(content).expect("json payload");
        assert_eq!(payload["ok"], json!(false));
        assert_eq!(payload["error"]["code"], json!("unknown_tool"));
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_payload() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = ToolRegistry::with_contact_tools(notifier.clone());

        let results = registry
            .dispatch_calls(&[
                call("c1", RECORD_USER_DETAILS, "{not json"),
                call("c2", RECORD_USER_DETAILS, r#"{"name":"no email"}"#),
            ])
            .await;

        assert_eq!(results.len(), 2);
        for (message, expected_id) in results.iter().zip(["c1", "c2"]) {
            let ChatMessage::Tool {
                tool_call_id,
                content,
            } = message
            else {
                panic!("expected tool result message");
            };
            assert_eq!(tool_call_id, expected_id);
            let payload: Value = serde_json::from_str(content).expect("json payload");
            assert_eq!(payload["error"]["code"], json!("invalid_args"));
        }
        assert!(notifier.messages().is_empty());
    }
}
